use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TasqueError {
    #[error("job reference must not be empty")]
    InvalidArgument,

    #[error("duplicate handler for job={0}")]
    DuplicateHandler(String),

    /// Queue member without an attribute record. The engine writes both in
    /// one batch, so this indicates outside interference or store corruption.
    #[error("no attributes recorded for task id={0}")]
    MissingAttributes(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
