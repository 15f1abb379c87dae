//! Request/response boundary to the metadata service.

use crate::entity::{EntityRef, NamespaceRef};
use crate::error::ApiError;
use crate::record::{BulkResult, MetadataFetch, MetadataRecord, SchemaDocument, UpdateMode};
use async_trait::async_trait;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[async_trait]
pub trait MetadataApi: Send + Sync {
    async fn fetch_metadata(&self, entity: &EntityRef) -> ApiResult<MetadataFetch>;

    /// Schema documents declared in one namespace (possibly none).
    async fn fetch_schema(&self, namespace: &NamespaceRef) -> ApiResult<Vec<SchemaDocument>>;

    async fn create_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
    ) -> ApiResult<BulkResult>;

    /// `ReplaceAll` makes `records` the complete metadata of the entity.
    async fn update_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
        mode: UpdateMode,
    ) -> ApiResult<BulkResult>;

    async fn delete_metadata(&self, entity: &EntityRef, keys: Vec<String>) -> ApiResult<BulkResult>;
}
