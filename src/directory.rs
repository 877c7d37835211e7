use crate::error::StorageError;
use crate::models::{CityId, PointId, PointSummary, UserId};

/// Read side of the city/point directory, consulted for routing choices
/// and for naming endpoints on rendered cards. The engine only ever stores
/// opaque point ids.
pub trait DirectoryService: Send + Sync {
    fn list_points(&self, city: CityId) -> Result<Vec<PointSummary>, StorageError>;
    fn point_name(&self, point: PointId) -> Result<Option<String>, StorageError>;
}

/// Identity-to-point binding: one identity belongs to at most one point,
/// one point to any number of identities.
pub trait BindingService: Send + Sync {
    fn bound_point(&self, identity: UserId) -> Result<Option<PointId>, StorageError>;
    fn bound_identities(&self, point: PointId) -> Result<Vec<UserId>, StorageError>;
}
