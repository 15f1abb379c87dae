use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_FALLBACK_DATABASE: &str = "GLOBAL";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataEntityType {
    #[serde(rename = "databaseMetadata")]
    DatabaseMetadata,
    #[serde(rename = "assetMetadata")]
    AssetMetadata,
    #[serde(rename = "fileMetadata")]
    FileMetadata,
    #[serde(rename = "assetLinkMetadata")]
    AssetLinkMetadata,
}

impl MetadataEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataEntityType::DatabaseMetadata => "databaseMetadata",
            MetadataEntityType::AssetMetadata => "assetMetadata",
            MetadataEntityType::FileMetadata => "fileMetadata",
            MetadataEntityType::AssetLinkMetadata => "assetLinkMetadata",
        }
    }
}

impl fmt::Display for MetadataEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The thing a metadata set is attached to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    Database {
        database_id: String,
    },
    Asset {
        database_id: String,
        asset_id: String,
    },
    AssetFile {
        database_id: String,
        asset_id: String,
        file_path: String,
    },
    AssetLink {
        asset_link_id: String,
    },
}

impl EntityRef {
    pub fn entity_type(&self) -> MetadataEntityType {
        match self {
            EntityRef::Database { .. } => MetadataEntityType::DatabaseMetadata,
            EntityRef::Asset { .. } => MetadataEntityType::AssetMetadata,
            EntityRef::AssetFile { .. } => MetadataEntityType::FileMetadata,
            EntityRef::AssetLink { .. } => MetadataEntityType::AssetLinkMetadata,
        }
    }

    pub fn database_id(&self) -> Option<&str> {
        match self {
            EntityRef::Database { database_id }
            | EntityRef::Asset { database_id, .. }
            | EntityRef::AssetFile { database_id, .. } => Some(database_id),
            EntityRef::AssetLink { .. } => None,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            EntityRef::AssetFile { file_path, .. } => Some(file_path),
            _ => None,
        }
    }

    /// Stable identity used for storage paths and in-flight bookkeeping.
    pub fn storage_key(&self) -> String {
        match self {
            EntityRef::Database { database_id } => format!("databases/{}", database_id),
            EntityRef::Asset {
                database_id,
                asset_id,
            } => format!("databases/{}/assets/{}", database_id, asset_id),
            EntityRef::AssetFile {
                database_id,
                asset_id,
                file_path,
            } => format!(
                "databases/{}/assets/{}/files/{}",
                database_id,
                asset_id,
                file_path.trim_start_matches('/')
            ),
            EntityRef::AssetLink { asset_link_id } => format!("asset_links/{}", asset_link_id),
        }
    }

    /// Schema namespaces to query: the entity's own database, then the fallback.
    pub fn schema_namespaces(&self, fallback_database_id: &str) -> Vec<NamespaceRef> {
        let entity_type = self.entity_type();
        let mut namespaces = Vec::new();
        if let Some(db) = self.database_id() {
            namespaces.push(NamespaceRef::new(db, entity_type));
        }
        if self.database_id() != Some(fallback_database_id) {
            namespaces.push(NamespaceRef::new(fallback_database_id, entity_type));
        }
        namespaces
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespaceRef {
    pub database_id: String,
    pub entity_type: MetadataEntityType,
}

impl NamespaceRef {
    pub fn new(database_id: &str, entity_type: MetadataEntityType) -> Self {
        Self {
            database_id: database_id.to_string(),
            entity_type,
        }
    }
}

impl fmt::Display for NamespaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.database_id, self.entity_type)
    }
}

pub fn file_extension(file_path: &str) -> Option<String> {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_lowercase()))
}
