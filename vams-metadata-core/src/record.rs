use crate::value_type::MetadataValueType;
use serde::{Deserialize, Serialize};

/// Schema provenance attached to a record whose key is declared by a schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SchemaProvenance {
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sequence: Option<u32>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub controlled_list_keys: Vec<String>,
    #[serde(default)]
    pub conflict: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub value_type: MetadataValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaProvenance>,
}

impl MetadataRecord {
    pub fn new(key: &str, value: &str, value_type: MetadataValueType) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            value_type,
            schema: None,
        }
    }

    pub fn is_schema_field(&self) -> bool {
        self.schema.is_some()
    }

    pub fn without_schema(&self) -> Self {
        Self {
            schema: None,
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetadataSchemaField {
    pub key: String,
    pub value_type: MetadataValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sequence: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub controlled_list_keys: Vec<String>,
    #[serde(default)]
    pub conflict: bool,
}

impl MetadataSchemaField {
    pub fn new(key: &str, value_type: MetadataValueType) -> Self {
        Self {
            key: key.to_string(),
            value_type,
            required: false,
            sequence: None,
            depends_on: Vec::new(),
            default_value: None,
            controlled_list_keys: Vec::new(),
            conflict: false,
        }
    }

    /// Neutral definition used when schema sources disagree on a field.
    pub fn conflicted(key: &str) -> Self {
        Self {
            conflict: true,
            ..Self::new(key, MetadataValueType::String)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub schema_name: String,
    pub database_id: String,
    #[serde(default)]
    pub fields: Vec<MetadataSchemaField>,
    /// Comma-separated file extensions this schema is limited to (file entities only).
    #[serde(default)]
    pub file_extension_restriction: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Update,
    ReplaceAll,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub key: String,
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BulkResult {
    pub success: bool,
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(default)]
    pub successful_items: Vec<String>,
    #[serde(default)]
    pub failed_items: Vec<FailedItem>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
}

impl BulkResult {
    pub fn from_items(successful_items: Vec<String>, failed_items: Vec<FailedItem>) -> Self {
        let success_count = successful_items.len();
        let failure_count = failed_items.len();
        let total_items = success_count + failure_count;
        let message = if failure_count == 0 {
            format!("Successfully processed {} items", success_count)
        } else {
            format!(
                "Processed {} of {} items, {} failed",
                success_count, total_items, failure_count
            )
        };
        Self {
            success: success_count > 0 || total_items == 0,
            total_items,
            success_count,
            failure_count,
            successful_items,
            failed_items,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.failure_count > 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MetadataFetch {
    pub records: Vec<MetadataRecord>,
    #[serde(default)]
    pub restrict_to_schema_fields: bool,
}

/// Pending writes derived from the difference between the baseline and the live rows.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct MetadataChanges {
    pub added: Vec<MetadataRecord>,
    pub updated: Vec<MetadataRecord>,
    pub deleted: Vec<String>,
}

impl MetadataChanges {
    pub fn total(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
