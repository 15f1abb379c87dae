mod common;
use common::{record, schema_doc};
use vams_metadata_core::schema::{aggregate, aggregate_for_entity, enrich_records};
use vams_metadata_core::{
    EntityRef, MetadataEntityType, MetadataSchemaField, MetadataValueType, NamespaceRef,
    SchemaDocument,
};

fn field(key: &str, value_type: MetadataValueType, required: bool, sequence: Option<u32>) -> MetadataSchemaField {
    MetadataSchemaField {
        required,
        sequence,
        ..MetadataSchemaField::new(key, value_type)
    }
}

#[test]
fn test_schema_conflicting_declarations_fall_back_to_safe_defaults() {
    let specific = schema_doc(
        "Asset Schema",
        "db1",
        vec![MetadataSchemaField {
            default_value: Some("Draft".to_string()),
            ..field("Status", MetadataValueType::String, true, Some(1))
        }],
    );
    let fallback = schema_doc(
        "Global Schema",
        "GLOBAL",
        vec![field("Status", MetadataValueType::Number, false, None)],
    );

    let schema = aggregate(&[specific.clone(), fallback]);
    let status = schema.field("Status").expect("status field");
    assert!(status.conflict);
    assert_eq!(status.value_type, MetadataValueType::String);
    assert!(!status.required);
    assert_eq!(status.sequence, None);
    assert!(status.depends_on.is_empty());
    assert_eq!(status.default_value, None);
    assert_eq!(
        schema.field_sources["Status"],
        vec!["Asset Schema (db1)".to_string(), "Global Schema (GLOBAL)".to_string()]
    );
    assert_eq!(schema.schema_names.len(), 2);

    // Agreeing with one side later does not undo the conflict.
    let again = aggregate(&[
        specific.clone(),
        schema_doc("Global Schema", "GLOBAL", vec![field("Status", MetadataValueType::Number, false, None)]),
        schema_doc("Other", "db2", specific.fields.clone()),
    ]);
    assert!(again.field("Status").expect("status field").conflict);
}

#[test]
fn test_schema_identical_declarations_merge_without_conflict() {
    let declared = field("Depth", MetadataValueType::Number, true, Some(3));
    let schema = aggregate(&[
        schema_doc("A", "db1", vec![declared.clone()]),
        schema_doc("B", "GLOBAL", vec![declared.clone()]),
    ]);

    assert_eq!(schema.fields, vec![declared]);
    let provenance = schema.provenance("Depth").expect("provenance");
    assert_eq!(provenance.schema_name.as_deref(), Some("A (db1), B (GLOBAL)"));
    assert!(provenance.required);
    assert!(!provenance.conflict);
}

#[test]
fn test_schema_fields_sorted_by_sequence_then_key() {
    let schema = aggregate(&[schema_doc(
        "A",
        "db1",
        vec![
            field("zulu", MetadataValueType::String, false, None),
            field("bravo", MetadataValueType::String, false, Some(2)),
            field("alpha", MetadataValueType::String, false, None),
            field("charlie", MetadataValueType::String, false, Some(1)),
        ],
    )]);
    let keys: Vec<&str> = schema.fields.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["charlie", "bravo", "alpha", "zulu"]);
}

#[test]
fn test_schema_namespaces_include_fallback_once() {
    let asset = EntityRef::Asset {
        database_id: "db1".to_string(),
        asset_id: "a1".to_string(),
    };
    assert_eq!(
        asset.schema_namespaces("GLOBAL"),
        vec![
            NamespaceRef::new("db1", MetadataEntityType::AssetMetadata),
            NamespaceRef::new("GLOBAL", MetadataEntityType::AssetMetadata),
        ]
    );

    let global = EntityRef::Database {
        database_id: "GLOBAL".to_string(),
    };
    assert_eq!(
        global.schema_namespaces("GLOBAL"),
        vec![NamespaceRef::new("GLOBAL", MetadataEntityType::DatabaseMetadata)]
    );

    let link = EntityRef::AssetLink {
        asset_link_id: "link-1".to_string(),
    };
    assert_eq!(
        link.schema_namespaces("GLOBAL"),
        vec![NamespaceRef::new("GLOBAL", MetadataEntityType::AssetLinkMetadata)]
    );
}

#[test]
fn test_schema_file_extension_restriction() {
    let restricted = |name: &str, restriction: &str, key: &str| SchemaDocument {
        file_extension_restriction: Some(restriction.to_string()),
        ..schema_doc(name, "db1", vec![field(key, MetadataValueType::String, false, None)])
    };
    let documents = vec![
        restricted("Mesh", ".obj, .STL", "Vertices"),
        restricted("Image", ".png", "Resolution"),
        restricted("Anything", ".all", "Owner"),
        schema_doc("Unrestricted", "db1", vec![field("Source", MetadataValueType::String, false, None)]),
    ];

    let file = EntityRef::AssetFile {
        database_id: "db1".to_string(),
        asset_id: "a1".to_string(),
        file_path: "/models/part.Stl".to_string(),
    };
    let schema = aggregate_for_entity(&documents, &file);
    assert!(schema.contains("Vertices"));
    assert!(schema.contains("Owner"));
    assert!(schema.contains("Source"));
    assert!(!schema.contains("Resolution"));

    let asset = EntityRef::Asset {
        database_id: "db1".to_string(),
        asset_id: "a1".to_string(),
    };
    assert_eq!(aggregate_for_entity(&documents, &asset).fields.len(), 4);
}

#[test]
fn test_schema_enrich_records_fills_missing_fields() {
    let schema = aggregate(&[schema_doc(
        "S",
        "db1",
        vec![
            field("Status", MetadataValueType::String, false, Some(1)),
            MetadataSchemaField {
                default_value: Some("Untitled".to_string()),
                ..field("Title", MetadataValueType::String, true, Some(0))
            },
        ],
    )]);
    let stored = vec![
        record("Notes", "free text", MetadataValueType::String),
        record("Status", "Final", MetadataValueType::String),
    ];

    let enriched = enrich_records(&stored, &schema);
    let summary: Vec<(&str, &str, bool)> = enriched
        .iter()
        .map(|r| (r.key.as_str(), r.value.as_str(), r.is_schema_field()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Title", "Untitled", true),
            ("Status", "Final", true),
            ("Notes", "free text", false),
        ]
    );
    let title = enriched[0].schema.as_ref().expect("title provenance");
    assert_eq!(title.schema_name.as_deref(), Some("S (db1)"));
    assert!(title.required);
}
