use crate::error::StorageError;
use ontograph_schema::Edge;

/// Queries over existing, non-archived edges.
#[async_trait::async_trait]
pub trait EdgeLookup: Send + Sync {
    async fn edges_by_pair_and_origin(
        &self,
        pair_id: &str,
        origin_id: &str,
    ) -> Result<Vec<Edge>, StorageError>;

    async fn edges_by_pair_and_destination(
        &self,
        pair_id: &str,
        destination_id: &str,
    ) -> Result<Vec<Edge>, StorageError>;

    async fn edges_by_pair_origin_destination(
        &self,
        pair_id: &str,
        origin_id: &str,
        destination_id: &str,
    ) -> Result<Vec<Edge>, StorageError>;
}
