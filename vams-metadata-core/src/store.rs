use crate::api::{ApiResult, MetadataApi};
use crate::config::EditorConfig;
use crate::entity::{EntityRef, NamespaceRef};
use crate::error::ApiError;
use crate::record::{
    BulkResult, FailedItem, MetadataFetch, MetadataRecord, SchemaDocument, UpdateMode,
};
use crate::schema::{aggregate_for_entity, enrich_records, AggregatedSchema};
use crate::storage::{operator_from_uri, read_json, write_json};
use crate::validation::{validate_deletion, MAX_KEY_LENGTH};
use crate::validator::validate_value;
use crate::value_type::MetadataValueType;
use anyhow::Result;
use async_trait::async_trait;
use opendal::Operator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub restrict_metadata_outside_schemas: bool,
}

/// Metadata service backed by an OpenDAL operator.
///
/// Layout under the operator root:
/// - `metadata/<entity>.json`: stored records of one entity
/// - `schemas/<database>/<entityType>.json`: schema documents of one namespace
/// - `databases/<database>/settings.json`: per-database settings
#[derive(Clone)]
pub struct OpendalMetadataStore {
    op: Operator,
    fallback_database_id: String,
    replace_all_limit: usize,
}

fn records_path(entity: &EntityRef) -> String {
    format!("metadata/{}.json", entity.storage_key())
}

fn schema_path(namespace: &NamespaceRef) -> String {
    format!(
        "schemas/{}/{}.json",
        namespace.database_id, namespace.entity_type
    )
}

fn settings_path(database_id: &str) -> String {
    format!("databases/{}/settings.json", database_id)
}

/// Server-side normalization applied to every stored record.
fn normalize(record: &MetadataRecord) -> MetadataRecord {
    let mut stored = record.without_schema();
    stored.key = stored.key.trim().to_string();
    if stored.value_type == MetadataValueType::Boolean {
        stored.value = stored.value.trim().to_ascii_lowercase();
    }
    stored
}

fn check_record(
    record: &MetadataRecord,
    schema: &AggregatedSchema,
    restrict: bool,
) -> std::result::Result<(), String> {
    if record.key.is_empty() || record.key.chars().count() > MAX_KEY_LENGTH {
        return Err(format!(
            "metadataKey must be between 1 and {} characters",
            MAX_KEY_LENGTH
        ));
    }
    let checked = validate_value(&record.value, record.value_type);
    if !checked.is_valid {
        return Err(checked.errors.join("; "));
    }
    match schema.field(&record.key) {
        Some(field) => {
            if field.value_type != record.value_type {
                return Err(format!(
                    "Field '{}' has incorrect type. Expected '{}', got '{}'",
                    record.key, field.value_type, record.value_type
                ));
            }
            if field.value_type == MetadataValueType::InlineControlledList
                && !record.value.is_empty()
                && !field.controlled_list_keys.is_empty()
                && !field.controlled_list_keys.contains(&record.value)
            {
                return Err(format!(
                    "Field '{}' value '{}' is not in controlled list",
                    record.key, record.value
                ));
            }
        }
        None if restrict => {
            return Err(format!(
                "Field '{}' is not defined in the metadata schema",
                record.key
            ));
        }
        None => {}
    }
    Ok(())
}

impl OpendalMetadataStore {
    pub fn new(op: Operator, config: &EditorConfig) -> Self {
        Self {
            op,
            fallback_database_id: config.fallback_database_id.clone(),
            replace_all_limit: config.replace_all_limit,
        }
    }

    pub fn from_config(config: &EditorConfig) -> Result<Self> {
        let uri = config.storage_uri.as_deref().unwrap_or("memory://default");
        Ok(Self::new(operator_from_uri(uri)?, config))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub async fn put_schemas(&self, namespace: &NamespaceRef, documents: &[SchemaDocument]) -> Result<()> {
        write_json(&self.op, &schema_path(namespace), &documents).await
    }

    pub async fn put_database_settings(&self, database_id: &str, settings: &DatabaseSettings) -> Result<()> {
        write_json(&self.op, &settings_path(database_id), settings).await
    }

    /// Records as stored, without schema enrichment.
    pub async fn stored_records(&self, entity: &EntityRef) -> Result<Vec<MetadataRecord>> {
        Ok(read_json(&self.op, &records_path(entity))
            .await?
            .unwrap_or_default())
    }

    async fn save_records(&self, entity: &EntityRef, records: &[MetadataRecord]) -> Result<()> {
        write_json(&self.op, &records_path(entity), &records).await
    }

    async fn namespace_documents(&self, namespace: &NamespaceRef) -> Result<Vec<SchemaDocument>> {
        Ok(read_json(&self.op, &schema_path(namespace))
            .await?
            .unwrap_or_default())
    }

    async fn schema_for(&self, entity: &EntityRef) -> Result<AggregatedSchema> {
        let mut documents = Vec::new();
        for namespace in entity.schema_namespaces(&self.fallback_database_id) {
            documents.extend(self.namespace_documents(&namespace).await?);
        }
        Ok(aggregate_for_entity(&documents, entity))
    }

    async fn restrict_for(&self, entity: &EntityRef) -> Result<bool> {
        let Some(database_id) = entity.database_id() else {
            return Ok(false);
        };
        let settings: DatabaseSettings = read_json(&self.op, &settings_path(database_id))
            .await?
            .unwrap_or_default();
        Ok(settings.restrict_metadata_outside_schemas)
    }

    /// Write valid records one by one, reporting the rest as failed items.
    async fn write_items(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
        allow_existing: bool,
    ) -> ApiResult<BulkResult> {
        let schema = self.schema_for(entity).await?;
        let restrict = self.restrict_for(entity).await? && !schema.is_empty();
        let mut stored = self.stored_records(entity).await?;
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut in_request = HashSet::new();

        for record in records.iter().map(normalize) {
            if !in_request.insert(record.key.clone()) {
                failed.push(FailedItem {
                    key: record.key.clone(),
                    error: "Duplicate metadata key in request".to_string(),
                });
                continue;
            }
            if let Err(error) = check_record(&record, &schema, restrict) {
                failed.push(FailedItem {
                    key: record.key.clone(),
                    error,
                });
                continue;
            }
            match stored.iter_mut().find(|r| r.key == record.key) {
                Some(_) if !allow_existing => failed.push(FailedItem {
                    key: record.key.clone(),
                    error: format!("Metadata key '{}' already exists", record.key),
                }),
                Some(existing) => {
                    *existing = record.clone();
                    successful.push(record.key);
                }
                None => {
                    successful.push(record.key.clone());
                    stored.push(record);
                }
            }
        }

        if !successful.is_empty() {
            self.save_records(entity, &stored).await?;
        }
        Ok(BulkResult::from_items(successful, failed))
    }

    async fn replace_all(&self, entity: &EntityRef, records: Vec<MetadataRecord>) -> ApiResult<BulkResult> {
        if records.len() > self.replace_all_limit {
            return Err(ApiError::status(
                400,
                format!(
                    "REPLACE_ALL operations are limited to {} metadata items",
                    self.replace_all_limit
                ),
            ));
        }
        let schema = self.schema_for(entity).await?;
        let restrict = self.restrict_for(entity).await? && !schema.is_empty();

        let mut replacement = Vec::with_capacity(records.len());
        let mut keys = HashSet::new();
        let mut errors = Vec::new();
        for record in records.iter().map(normalize) {
            if !keys.insert(record.key.clone()) {
                errors.push(format!("Duplicate metadata key '{}'", record.key));
            } else if let Err(error) = check_record(&record, &schema, restrict) {
                errors.push(format!("{}: {}", record.key, error));
            }
            replacement.push(record);
        }
        if !errors.is_empty() {
            return Err(ApiError::status(400, errors.join("; ")));
        }

        debug!(entity = %entity, count = replacement.len(), "replacing metadata");
        self.save_records(entity, &replacement).await?;
        let keys = replacement.into_iter().map(|r| r.key).collect();
        Ok(BulkResult::from_items(keys, Vec::new()))
    }
}

#[async_trait]
impl MetadataApi for OpendalMetadataStore {
    async fn fetch_metadata(&self, entity: &EntityRef) -> ApiResult<MetadataFetch> {
        let schema = self.schema_for(entity).await?;
        let restrict = self.restrict_for(entity).await?;
        let stored = self.stored_records(entity).await?;
        Ok(MetadataFetch {
            records: enrich_records(&stored, &schema),
            restrict_to_schema_fields: restrict && !schema.is_empty(),
        })
    }

    async fn fetch_schema(&self, namespace: &NamespaceRef) -> ApiResult<Vec<SchemaDocument>> {
        Ok(self.namespace_documents(namespace).await?)
    }

    async fn create_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
    ) -> ApiResult<BulkResult> {
        self.write_items(entity, records, false).await
    }

    async fn update_metadata(
        &self,
        entity: &EntityRef,
        records: Vec<MetadataRecord>,
        mode: UpdateMode,
    ) -> ApiResult<BulkResult> {
        match mode {
            UpdateMode::Update => self.write_items(entity, records, true).await,
            UpdateMode::ReplaceAll => self.replace_all(entity, records).await,
        }
    }

    async fn delete_metadata(&self, entity: &EntityRef, keys: Vec<String>) -> ApiResult<BulkResult> {
        let schema = self.schema_for(entity).await?;
        let stored = self.stored_records(entity).await?;
        let remaining: Vec<MetadataRecord> = stored
            .iter()
            .filter(|r| !keys.contains(&r.key))
            .cloned()
            .collect();

        let check = validate_deletion(&keys, &remaining, &schema);
        if !check.is_valid {
            return Err(ApiError::status(400, check.errors.join("; ")));
        }

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for key in keys {
            if stored.iter().any(|r| r.key == key) {
                successful.push(key);
            } else {
                failed.push(FailedItem {
                    error: format!("Metadata key '{}' not found", key),
                    key,
                });
            }
        }

        if !successful.is_empty() {
            self.save_records(entity, &remaining).await?;
        }
        Ok(BulkResult::from_items(successful, failed))
    }
}
