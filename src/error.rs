use thiserror::Error;

use crate::models::{Endpoint, MoveId, UserId};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

/// Failures a lifecycle transition can surface to the initiating user.
///
/// "Already acknowledged" is deliberately absent: it is a control-flow
/// outcome carried by [`crate::engine::Acknowledgement`], not an error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("move {0} not found")]
    NotFound(MoveId),
    #[error("actor {actor} is not bound to the point this action requires")]
    Unauthorized { actor: UserId },
    #[error("move {0} has an incomplete route; choose both endpoints first")]
    IncompleteRoute(MoveId),
    #[error("move {0} has no invoice photos; add a photo first")]
    NoPhotos(MoveId),
    #[error("an invoice photo set must contain at least one photo")]
    EmptyPhotoSet,
    #[error("no identities are bound to the {0} point; have its staff register first")]
    NoRecipients(Endpoint),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
