use crate::entity::{file_extension, EntityRef};
use crate::record::{MetadataRecord, MetadataSchemaField, SchemaDocument, SchemaProvenance};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::info;

impl SchemaDocument {
    pub fn source_label(&self) -> String {
        format!("{} ({})", self.schema_name, self.database_id)
    }

    /// Whether this schema governs a file with the given path.
    ///
    /// Schemas without a restriction, or listing `.all`, apply to every file.
    pub fn applies_to_file(&self, file_path: &str) -> bool {
        let restriction = match self.file_extension_restriction.as_deref() {
            Some(r) if !r.trim().is_empty() => r,
            _ => return true,
        };
        let allowed: Vec<String> = restriction
            .split(',')
            .map(|ext| ext.trim().to_lowercase())
            .collect();
        if allowed.iter().any(|ext| ext == ".all") {
            return true;
        }
        match file_extension(file_path) {
            Some(ext) => allowed.contains(&ext),
            None => false,
        }
    }
}

enum FieldResolution {
    Declared {
        field: MetadataSchemaField,
        sources: Vec<String>,
    },
    Conflict {
        sources: Vec<String>,
    },
}

fn same_shape(a: &MetadataSchemaField, b: &MetadataSchemaField) -> bool {
    a.value_type == b.value_type
        && a.required == b.required
        && a.sequence == b.sequence
        && a.depends_on == b.depends_on
        && a.default_value == b.default_value
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct AggregatedSchema {
    pub fields: Vec<MetadataSchemaField>,
    pub schema_names: Vec<String>,
    #[serde(default)]
    pub field_sources: BTreeMap<String, Vec<String>>,
}

impl AggregatedSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, key: &str) -> Option<&MetadataSchemaField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub fn provenance(&self, key: &str) -> Option<SchemaProvenance> {
        let field = self.field(key)?;
        let schema_name = self
            .field_sources
            .get(key)
            .filter(|sources| !sources.is_empty())
            .map(|sources| sources.join(", "));
        Some(SchemaProvenance {
            schema_name,
            required: field.required,
            sequence: field.sequence,
            default_value: field.default_value.clone(),
            depends_on: field.depends_on.clone(),
            controlled_list_keys: field.controlled_list_keys.clone(),
            conflict: field.conflict,
        })
    }
}

fn field_order(a: &MetadataSchemaField, b: &MetadataSchemaField) -> Ordering {
    match (a.sequence, b.sequence) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.key.cmp(&b.key)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.key.cmp(&b.key),
    }
}

/// Merge schema documents from several namespaces into one field list.
///
/// A key declared twice with a different shape is never resolved in favour of
/// either source: it falls back to a neutral, optional string field flagged
/// as a conflict.
pub fn aggregate(documents: &[SchemaDocument]) -> AggregatedSchema {
    let mut resolved: BTreeMap<String, FieldResolution> = BTreeMap::new();
    let mut schema_names: Vec<String> = Vec::new();

    for doc in documents {
        let label = doc.source_label();
        if !schema_names.contains(&label) {
            schema_names.push(label.clone());
        }

        for field in &doc.fields {
            let next = match resolved.remove(&field.key) {
                None => FieldResolution::Declared {
                    field: MetadataSchemaField {
                        conflict: false,
                        ..field.clone()
                    },
                    sources: vec![label.clone()],
                },
                Some(FieldResolution::Declared {
                    field: existing,
                    mut sources,
                }) => {
                    sources.push(label.clone());
                    if same_shape(&existing, field) {
                        FieldResolution::Declared {
                            field: existing,
                            sources,
                        }
                    } else {
                        info!(
                            field = %field.key,
                            sources = ?sources,
                            "schema conflict detected, falling back to permissive defaults"
                        );
                        FieldResolution::Conflict { sources }
                    }
                }
                Some(FieldResolution::Conflict { mut sources }) => {
                    sources.push(label.clone());
                    FieldResolution::Conflict { sources }
                }
            };
            resolved.insert(field.key.clone(), next);
        }
    }

    let mut fields = Vec::with_capacity(resolved.len());
    let mut field_sources = BTreeMap::new();
    for (key, resolution) in resolved {
        let (field, sources) = match resolution {
            FieldResolution::Declared { field, sources } => (field, sources),
            FieldResolution::Conflict { sources } => (MetadataSchemaField::conflicted(&key), sources),
        };
        field_sources.insert(key, sources);
        fields.push(field);
    }
    fields.sort_by(field_order);

    AggregatedSchema {
        fields,
        schema_names,
        field_sources,
    }
}

/// Aggregate only the documents that govern `entity`.
pub fn aggregate_for_entity(documents: &[SchemaDocument], entity: &EntityRef) -> AggregatedSchema {
    match entity.file_path() {
        Some(path) => {
            let applicable: Vec<SchemaDocument> = documents
                .iter()
                .filter(|doc| doc.applies_to_file(path))
                .cloned()
                .collect();
            aggregate(&applicable)
        }
        None => aggregate(documents),
    }
}

/// Attach schema provenance to stored records and fill in absent schema fields.
///
/// Schema fields come first, ordered by sequence then key; everything else
/// keeps its stored order after them.
pub fn enrich_records(records: &[MetadataRecord], schema: &AggregatedSchema) -> Vec<MetadataRecord> {
    let mut schema_rows = Vec::new();
    let mut other_rows = Vec::new();
    let mut seen = HashSet::new();

    for record in records {
        seen.insert(record.key.clone());
        match schema.provenance(&record.key) {
            Some(provenance) => schema_rows.push(MetadataRecord {
                schema: Some(provenance),
                ..record.clone()
            }),
            None => other_rows.push(record.without_schema()),
        }
    }

    for field in &schema.fields {
        if seen.contains(&field.key) {
            continue;
        }
        schema_rows.push(MetadataRecord {
            key: field.key.clone(),
            value: field.default_value.clone().unwrap_or_default(),
            value_type: field.value_type,
            schema: schema.provenance(&field.key),
        });
    }

    schema_rows.sort_by(|a, b| {
        let seq = |r: &MetadataRecord| r.schema.as_ref().and_then(|s| s.sequence);
        match (seq(a), seq(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.key.cmp(&b.key)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.key.cmp(&b.key),
        }
    });

    schema_rows.extend(other_rows);
    schema_rows
}
