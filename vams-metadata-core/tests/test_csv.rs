mod common;
use common::{record, schema_doc, schema_record, setup_operator};
use vams_metadata_core::csv_codec::{
    check_import_file, export_csv, merge_import, parse_csv, read_import_file, CsvImportContext,
};
use vams_metadata_core::schema::aggregate;
use vams_metadata_core::{
    MetadataSchemaField, MetadataValueType, RowSet, RowState, SchemaProvenance,
};

const HEADER: &str = "Metadata Key,Value Type,Metadata Value";

fn status_provenance() -> SchemaProvenance {
    SchemaProvenance {
        schema_name: Some("Asset Schema (db1)".to_string()),
        sequence: Some(1),
        controlled_list_keys: vec!["Draft".to_string(), "Final".to_string()],
        ..SchemaProvenance::default()
    }
}

#[test]
fn test_csv_export_quotes_and_joins_lists() -> anyhow::Result<()> {
    let rows = RowSet::initialize(&[
        schema_record("Status", "Draft", MetadataValueType::InlineControlledList, status_provenance()),
        record("Quote", r#"He said "hi", then left"#, MetadataValueType::String),
    ]);

    let text = export_csv(rows.rows())?;
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Metadata Key,Value Type,Metadata Value,Schema Name,Schema Field,Required,Sequence,Default Value,Depends On,Controlled List Values,Conflict")
    );
    assert_eq!(
        lines.next(),
        Some("Status,inline_controlled_list,Draft,Asset Schema (db1),true,false,1,,,Draft; Final,false")
    );
    assert_eq!(
        lines.next(),
        Some(r#"Quote,string,"He said ""hi"", then left",,false,false,,,,,false"#)
    );
    Ok(())
}

#[test]
fn test_csv_round_trip_core_columns() -> anyhow::Result<()> {
    let originals = vec![
        record("Color", "red", MetadataValueType::String),
        record("Notes", "line one\nline two, with comma", MetadataValueType::MultilineString),
        record("Origin", r#"{"x":1,"y":2,"z":3}"#, MetadataValueType::Xyz),
        record("Scanned", "true", MetadataValueType::Boolean),
        record("Weight", "12.5", MetadataValueType::Number),
    ];
    let rows = RowSet::initialize(&originals);

    let text = export_csv(rows.rows())?;
    let import = parse_csv(&text, &CsvImportContext::default());
    assert!(import.is_ok(), "{:?}", import.errors);
    assert_eq!(import.records, originals);
    Ok(())
}

#[test]
fn test_csv_wrong_header_is_rejected_whole() {
    let import = parse_csv("Key,Type,Value\nA,string,1\n", &CsvImportContext::default());
    assert!(import.records.is_empty());
    assert_eq!(import.errors.len(), 1);
    assert!(import.errors[0].starts_with("Invalid CSV format"));
}

#[test]
fn test_csv_header_match_ignores_case_bom_and_extra_columns() {
    let text = "\u{feff}metadata key,VALUE TYPE,Metadata Value,Schema Name\nA,string,1,Whatever\n";
    let import = parse_csv(text, &CsvImportContext::default());
    assert!(import.is_ok(), "{:?}", import.errors);
    assert_eq!(import.records, vec![record("A", "1", MetadataValueType::String)]);
}

#[test]
fn test_csv_collects_line_numbered_errors() {
    let text = format!(
        "{}\nA,string\n,string,x\nB,bogus,1\nC,number,abc\nC,string,ok\nD,string,fine\n",
        HEADER
    );
    let import = parse_csv(&text, &CsvImportContext::default());

    assert!(import.records.is_empty());
    assert_eq!(import.errors.len(), 5, "{:?}", import.errors);
    assert!(import.errors[0].starts_with("Line 2:"));
    assert!(import.errors[1].starts_with("Line 3:") && import.errors[1].contains("empty"));
    assert!(import.errors[2].starts_with("Line 4:") && import.errors[2].contains("bogus"));
    assert!(import.errors[3].starts_with("Line 5:") && import.errors[3].contains("number"));
    assert!(import.errors[4].starts_with("Line 6:") && import.errors[4].contains("duplicate"));
}

#[test]
fn test_csv_schema_types_are_immutable() {
    let rows = RowSet::initialize(&[schema_record(
        "Status",
        "Draft",
        MetadataValueType::InlineControlledList,
        status_provenance(),
    )]);
    let ctx = CsvImportContext::new(&rows, None, false);

    let import = parse_csv(&format!("{}\nStatus,number,5\n", HEADER), &ctx);
    assert_eq!(import.errors.len(), 1);
    assert!(import.errors[0].contains("schema field 'Status'"));

    let import = parse_csv(&format!("{}\nStatus,inline_controlled_list,Final\n", HEADER), &ctx);
    assert!(import.is_ok());
}

#[test]
fn test_csv_restrict_to_schema_fields() {
    let schema = aggregate(&[schema_doc(
        "S",
        "db1",
        vec![MetadataSchemaField::new("Status", MetadataValueType::String)],
    )]);
    let ctx = CsvImportContext::new(&RowSet::default(), Some(&schema), true);

    let import = parse_csv(&format!("{}\nStatus,string,ok\nFree,string,x\n", HEADER), &ctx);
    assert_eq!(import.errors.len(), 1);
    assert!(import.errors[0].starts_with("Line 3:"));
    assert!(import.errors[0].contains("not defined in the metadata schema"));
}

#[test]
fn test_csv_merge_replaces_non_schema_rows() -> anyhow::Result<()> {
    let mut rows = RowSet::initialize(&[
        schema_record("Status", "Draft", MetadataValueType::InlineControlledList, status_provenance()),
        record("Color", "red", MetadataValueType::String),
        record("Size", "L", MetadataValueType::String),
    ]);

    merge_import(
        &mut rows,
        &[
            record("Status", "Final", MetadataValueType::InlineControlledList),
            record("Color", "blue", MetadataValueType::String),
            record("Weight", "5", MetadataValueType::Number),
        ],
    )?;

    let states: Vec<(&str, RowState)> = rows
        .rows()
        .iter()
        .map(|r| (r.staged.key.as_str(), r.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("Status", RowState::Dirty),
            ("Color", RowState::Dirty),
            ("Size", RowState::SoftDeleted),
            ("Weight", RowState::New),
        ]
    );

    let changes = rows.changes();
    let updated: Vec<&str> = changes.updated.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(updated, vec!["Status", "Color"]);
    assert_eq!(changes.added, vec![record("Weight", "5", MetadataValueType::Number)]);
    assert_eq!(changes.deleted, vec!["Size".to_string()]);
    Ok(())
}

#[test]
fn test_csv_import_file_checks() {
    const LIMIT: u64 = 5 * 1024 * 1024;
    assert!(check_import_file("data.csv", None, 100, LIMIT).is_valid);
    assert!(check_import_file("DATA.CSV", None, 100, LIMIT).is_valid);
    assert!(check_import_file("export", Some("text/csv"), 100, LIMIT).is_valid);
    assert!(!check_import_file("data.txt", Some("text/plain"), 100, LIMIT).is_valid);

    let too_big = check_import_file("data.csv", Some("text/csv"), LIMIT + 1, LIMIT);
    assert_eq!(too_big.errors.len(), 1);
    assert!(too_big.errors[0].contains("maximum"));
}

#[tokio::test]
async fn test_csv_read_import_file_through_operator() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let content = format!("{}\nA,string,1\n", HEADER);
    op.write("imports/meta.csv", content.clone().into_bytes()).await?;

    assert_eq!(read_import_file(&op, "imports/meta.csv", 1024).await?, content);
    assert!(read_import_file(&op, "imports/meta.csv", 10).await.is_err());
    assert!(read_import_file(&op, "imports/missing.csv", 1024).await.is_err());

    op.write("imports/meta.txt", content.into_bytes()).await?;
    assert!(read_import_file(&op, "imports/meta.txt", 1024).await.is_err());
    Ok(())
}
