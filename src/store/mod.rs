use std::sync::Arc;

use crate::config::{BackendKind, Config};
use crate::directory::{BindingService, DirectoryService};
use crate::error::StorageError;
use crate::models::{Move, MoveId, MoveStatus, PointId, UserId};

pub mod postgres;
pub mod sqlite;

/// Outcome of a conditional acknowledgement write.
///
/// The branch is decided by the affected-row count of a single
/// `UPDATE ... WHERE handed_at IS NULL` statement, so two near-simultaneous
/// acknowledgements cannot both observe "not yet set".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckWrite {
    /// The timestamp was null and this call set it.
    Applied,
    /// The timestamp was already set; nothing changed.
    AlreadyAcked,
    /// No move with that id exists.
    Missing,
}

/// Persistence contract for the move record.
///
/// All mutators bump `updated_at`. Mutators returning `bool` report whether
/// the row existed.
pub trait MoveStore: Send + Sync {
    fn create(&self, created_by: UserId) -> Result<Move, StorageError>;
    fn get(&self, id: MoveId) -> Result<Option<Move>, StorageError>;
    fn list_recent(&self, limit: i64) -> Result<Vec<Move>, StorageError>;
    fn list_active(&self, limit: i64) -> Result<Vec<Move>, StorageError>;
    fn list_closed(&self, limit: i64) -> Result<Vec<Move>, StorageError>;

    fn set_from_point(&self, id: MoveId, point: PointId) -> Result<bool, StorageError>;
    fn set_to_point(&self, id: MoveId, point: PointId) -> Result<bool, StorageError>;
    fn set_note(&self, id: MoveId, note: Option<&str>) -> Result<bool, StorageError>;
    fn set_preview(&self, id: MoveId, photo: &str) -> Result<bool, StorageError>;
    fn set_status(&self, id: MoveId, status: MoveStatus) -> Result<bool, StorageError>;
    fn clear_handoff_state(&self, id: MoveId) -> Result<bool, StorageError>;

    fn mark_handed(&self, id: MoveId, actor: UserId) -> Result<AckWrite, StorageError>;
    fn mark_received(&self, id: MoveId, actor: UserId) -> Result<AckWrite, StorageError>;

    fn request_correction(
        &self,
        id: MoveId,
        actor: UserId,
        note: &str,
        photo: Option<&str>,
    ) -> Result<bool, StorageError>;
    fn resolve_correction(&self, id: MoveId) -> Result<bool, StorageError>;

    /// Returns the new version, or `None` when the move does not exist.
    fn bump_invoice_version(&self, id: MoveId) -> Result<Option<i32>, StorageError>;
    fn reset_for_reinvoice(&self, id: MoveId) -> Result<bool, StorageError>;
}

/// Persistence contract for versioned invoice photo sets.
pub trait PhotoStore: Send + Sync {
    /// Atomically overwrites the set stored under `(move_id, version)`,
    /// preserving the input order.
    fn replace_photos(
        &self,
        move_id: MoveId,
        version: i32,
        refs: &[String],
    ) -> Result<(), StorageError>;
    /// Ordered refs for one version; empty when none are stored.
    fn list_photos(&self, move_id: MoveId, version: i32) -> Result<Vec<String>, StorageError>;
    /// Ascending version numbers that have photo sets.
    fn list_versions(&self, move_id: MoveId) -> Result<Vec<i32>, StorageError>;
}

/// The trait objects the engine is wired with, all backed by one store
/// selected at startup.
pub struct Stores {
    pub moves: Arc<dyn MoveStore>,
    pub photos: Arc<dyn PhotoStore>,
    pub directory: Arc<dyn DirectoryService>,
    pub bindings: Arc<dyn BindingService>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: MoveStore + PhotoStore + DirectoryService + BindingService + 'static,
    {
        Self {
            moves: backend.clone(),
            photos: backend.clone(),
            directory: backend.clone(),
            bindings: backend,
        }
    }
}

/// Opens the store the database URL selects. The engine never branches on
/// the backend; this is the only place the choice is made.
pub fn open(config: &Config) -> anyhow::Result<Stores> {
    match config.backend_kind() {
        BackendKind::Postgres => {
            let store = postgres::PgStore::connect(
                &config.database_url,
                config.database_max_pool_size,
            )?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
        BackendKind::Sqlite => {
            let store = sqlite::SqliteStore::connect(
                &config.database_url,
                config.database_max_pool_size,
            )?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
    }
}
