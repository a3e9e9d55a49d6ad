use thiserror::Error;

use crate::api::ApiError;
use crate::models::PayloadError;

/// Why a sync attempt did not produce a stored snapshot.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Response contained no valid entries")]
    NoValidEntries,

    #[error("Failed to persist catalog to local store")]
    Storage,
}
