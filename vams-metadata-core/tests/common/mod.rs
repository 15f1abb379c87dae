use anyhow::Result;
use async_trait::async_trait;
use opendal::services::Memory;
use opendal::Operator;
use std::sync::Mutex;
use vams_metadata_core::{
    ApiResult, BulkResult, EditorConfig, EntityRef, MetadataApi, MetadataFetch, MetadataRecord,
    MetadataSchemaField, MetadataValueType, NamespaceRef, OpendalMetadataStore, SchemaDocument,
    SchemaProvenance, UpdateMode,
};

#[allow(dead_code)]
pub fn setup_operator() -> Result<Operator> {
    let builder = Memory::default();
    let op = Operator::new(builder)?.finish();
    Ok(op)
}

#[allow(dead_code)]
pub fn setup_store() -> Result<OpendalMetadataStore> {
    Ok(OpendalMetadataStore::new(
        setup_operator()?,
        &EditorConfig::default(),
    ))
}

#[allow(dead_code)]
pub fn asset(asset_id: &str) -> EntityRef {
    EntityRef::Asset {
        database_id: "db1".to_string(),
        asset_id: asset_id.to_string(),
    }
}

#[allow(dead_code)]
pub fn record(key: &str, value: &str, value_type: MetadataValueType) -> MetadataRecord {
    MetadataRecord::new(key, value, value_type)
}

/// A record as it arrives from a fetch that attached schema provenance.
#[allow(dead_code)]
pub fn schema_record(
    key: &str,
    value: &str,
    value_type: MetadataValueType,
    provenance: SchemaProvenance,
) -> MetadataRecord {
    MetadataRecord {
        schema: Some(provenance),
        ..MetadataRecord::new(key, value, value_type)
    }
}

#[allow(dead_code)]
pub fn schema_doc(name: &str, database_id: &str, fields: Vec<MetadataSchemaField>) -> SchemaDocument {
    SchemaDocument {
        schema_name: name.to_string(),
        database_id: database_id.to_string(),
        fields,
        file_extension_restriction: None,
    }
}

#[allow(dead_code)]
pub fn asset_namespace(database_id: &str) -> NamespaceRef {
    NamespaceRef::new(database_id, vams_metadata_core::MetadataEntityType::AssetMetadata)
}

/// Forwards to a store and records the name of every call.
#[allow(dead_code)]
pub struct RecordingApi {
    pub inner: OpendalMetadataStore,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingApi {
    pub fn new(inner: OpendalMetadataStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl MetadataApi for RecordingApi {
    async fn fetch_metadata(&self, entity: &EntityRef) -> ApiResult<MetadataFetch> {
        self.record("fetch_metadata");
        self.inner.fetch_metadata(entity).await
    }

    async fn fetch_schema(&self, namespace: &NamespaceRef) -> ApiResult<Vec<SchemaDocument>> {
        self.record("fetch_schema");
        self.inner.fetch_schema(namespace).await
    }

    async fn create_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
    ) -> ApiResult<BulkResult> {
        self.record("create_metadata");
        self.inner.create_metadata(entity, records).await
    }

    async fn update_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
        mode: UpdateMode,
    ) -> ApiResult<BulkResult> {
        self.record(match mode {
            UpdateMode::Update => "update_metadata",
            UpdateMode::ReplaceAll => "replace_all_metadata",
        });
        self.inner.update_metadata(entity, records, mode).await
    }

    async fn delete_metadata(&self, entity: &EntityRef, keys: Vec<String>) -> ApiResult<BulkResult> {
        self.record("delete_metadata");
        self.inner.delete_metadata(entity, keys).await
    }
}
