use crate::error::RowEditError;
use crate::record::MetadataRecord;
use crate::row::{MetadataRow, RowPatch, RowSet, RowValues};
use crate::schema::AggregatedSchema;
use crate::validator::{validate_value, ValidationResult};
use crate::value_type::MetadataValueType;
use anyhow::{anyhow, Context, Result};
use opendal::Operator;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub const CORE_HEADER: [&str; 3] = ["Metadata Key", "Value Type", "Metadata Value"];

pub const EXPORT_HEADER: [&str; 11] = [
    "Metadata Key",
    "Value Type",
    "Metadata Value",
    "Schema Name",
    "Schema Field",
    "Required",
    "Sequence",
    "Default Value",
    "Depends On",
    "Controlled List Values",
    "Conflict",
];

const LIST_SEPARATOR: &str = "; ";

fn export_line(row: &MetadataRow) -> Vec<String> {
    let record = row.staged_record();
    let schema = record.schema.clone().unwrap_or_default();
    vec![
        record.key,
        record.value_type.to_string(),
        record.value,
        schema.schema_name.unwrap_or_default(),
        row.is_schema_field().to_string(),
        schema.required.to_string(),
        schema.sequence.map(|s| s.to_string()).unwrap_or_default(),
        schema.default_value.unwrap_or_default(),
        schema.depends_on.join(LIST_SEPARATOR),
        schema.controlled_list_keys.join(LIST_SEPARATOR),
        schema.conflict.to_string(),
    ]
}

/// Serialize the live rows, quoting fields that contain a comma, quote or newline.
pub fn export_csv(rows: &[MetadataRow]) -> Result<String> {
    let mut writer = ::csv::WriterBuilder::new()
        .quote_style(::csv::QuoteStyle::Necessary)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(EXPORT_HEADER)?;
    for row in rows.iter().filter(|r| !r.is_deleted()) {
        writer.write_record(export_line(row))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush CSV export: {}", e))?;
    String::from_utf8(bytes).context("CSV export produced invalid UTF-8")
}

/// What an import is checked against.
#[derive(Debug, Clone, Default)]
pub struct CsvImportContext {
    pub schema_types: HashMap<String, MetadataValueType>,
    pub restrict_to_schema: bool,
}

impl CsvImportContext {
    pub fn new(rows: &RowSet, schema: Option<&AggregatedSchema>, restrict_to_schema: bool) -> Self {
        let mut schema_types = HashMap::new();
        if let Some(schema) = schema {
            for field in &schema.fields {
                schema_types.insert(field.key.clone(), field.value_type);
            }
        }
        for row in rows.rows().iter().filter(|r| r.is_schema_field()) {
            schema_types.insert(row.committed.key.clone(), row.committed.value_type);
        }
        Self {
            schema_types,
            restrict_to_schema,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvImport {
    pub records: Vec<MetadataRecord>,
    pub errors: Vec<String>,
}

impl CsvImport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn rejected(message: String) -> Self {
        Self {
            records: Vec::new(),
            errors: vec![message],
        }
    }
}

fn header_matches(header: &::csv::StringRecord) -> bool {
    header.len() >= CORE_HEADER.len()
        && CORE_HEADER
            .iter()
            .zip(header.iter())
            .all(|(expected, actual)| actual.trim().eq_ignore_ascii_case(expected))
}

/// Parse an uploaded CSV document.
///
/// Every problem is collected with its line number; the import is only usable
/// when no line was rejected.
pub fn parse_csv(text: &str, ctx: &CsvImportContext) -> CsvImport {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header_error = format!(
        "Invalid CSV format: the header must start with '{}'",
        CORE_HEADER.join(",")
    );
    match records.next() {
        Some(Ok(header)) if header_matches(&header) => {}
        Some(Err(e)) => return CsvImport::rejected(format!("{} ({})", header_error, e)),
        _ => return CsvImport::rejected(header_error),
    }

    let mut import = CsvImport::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, result) in records.enumerate() {
        let fallback_line = idx as u64 + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
                import.errors.push(format!("Line {}: {}", line, e));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(fallback_line);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        match parse_line(&record, ctx, &mut seen) {
            Ok(parsed) => import.records.push(parsed),
            Err(messages) => import
                .errors
                .extend(messages.into_iter().map(|m| format!("Line {}: {}", line, m))),
        }
    }

    if !import.is_ok() {
        info!(errors = import.errors.len(), "CSV import rejected");
        import.records.clear();
    } else {
        debug!(records = import.records.len(), "CSV import parsed");
    }
    import
}

fn parse_line(
    record: &::csv::StringRecord,
    ctx: &CsvImportContext,
    seen: &mut HashSet<String>,
) -> std::result::Result<MetadataRecord, Vec<String>> {
    if record.len() < CORE_HEADER.len() {
        return Err(vec![format!(
            "expected at least {} columns, found {}",
            CORE_HEADER.len(),
            record.len()
        )]);
    }

    let key = record[0].trim();
    let raw_type = record[1].trim();
    let value = &record[2];

    if key.is_empty() {
        return Err(vec!["metadata key is empty".to_string()]);
    }
    if !seen.insert(key.to_string()) {
        return Err(vec![format!("duplicate metadata key '{}'", key)]);
    }

    let value_type: MetadataValueType = raw_type
        .parse()
        .map_err(|_| vec![format!("invalid value type '{}' for key '{}'", raw_type, key)])?;

    let mut errors = Vec::new();
    match ctx.schema_types.get(key) {
        Some(declared) if *declared != value_type => errors.push(format!(
            "schema field '{}' has type '{}' and cannot be imported as '{}'",
            key, declared, value_type
        )),
        None if ctx.restrict_to_schema => errors.push(format!(
            "key '{}' is not defined in the metadata schema and only schema fields are allowed",
            key
        )),
        _ => {}
    }

    let ValidationResult { errors: value_errors, .. } = validate_value(value, value_type);
    errors.extend(value_errors.into_iter().map(|m| format!("'{}': {}", key, m)));

    if errors.is_empty() {
        Ok(MetadataRecord::new(key, value, value_type))
    } else {
        Err(errors)
    }
}

/// Apply a successful import to the live rows.
///
/// Schema rows stay in place and only take the imported value. Other rows are
/// replaced by the imported set: matching keys are updated, unmatched ones are
/// deleted and new keys are appended as new rows.
pub fn merge_import(rows: &mut RowSet, records: &[MetadataRecord]) -> std::result::Result<(), RowEditError> {
    let imported: HashMap<&str, &MetadataRecord> =
        records.iter().map(|r| (r.key.as_str(), r)).collect();
    let mut matched: HashSet<String> = HashSet::new();
    let mut stale = Vec::new();

    let current: Vec<(usize, bool, String)> = rows
        .visible()
        .map(|(idx, r)| (idx, r.is_schema_field(), r.staged.key.trim().to_string()))
        .collect();

    for (index, is_schema, key) in current {
        match imported.get(key.as_str()) {
            Some(record) => {
                let patch = if is_schema {
                    RowPatch::value(&record.value)
                } else {
                    RowPatch::value(&record.value).with_type(record.value_type)
                };
                rows.update_row(index, patch)?;
                matched.insert(key);
            }
            None if !is_schema => stale.push(index),
            None => {}
        }
    }

    for index in stale.into_iter().rev() {
        rows.delete_row(index)?;
    }

    for record in records.iter().filter(|r| !matched.contains(&r.key)) {
        rows.push_new(RowValues {
            key: record.key.clone(),
            value: record.value.clone(),
            value_type: record.value_type,
        });
    }
    Ok(())
}

/// Reject uploads that are too large or are not CSV.
pub fn check_import_file(
    file_name: &str,
    mime_type: Option<&str>,
    size: u64,
    max_bytes: u64,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    if size > max_bytes {
        result.push(format!(
            "File is {} bytes, the maximum accepted size is {} bytes",
            size, max_bytes
        ));
    }
    let is_csv_name = file_name.to_lowercase().ends_with(".csv");
    let is_csv_mime = mime_type.is_some_and(|m| m.eq_ignore_ascii_case("text/csv"));
    if !is_csv_name && !is_csv_mime {
        result.push(format!("File '{}' is not a CSV file", file_name));
    }
    result
}

pub async fn read_import_file(op: &Operator, path: &str, max_bytes: u64) -> Result<String> {
    let meta = op
        .stat(path)
        .await
        .context(format!("Import file {} not found", path))?;
    let check = check_import_file(path, meta.content_type(), meta.content_length(), max_bytes);
    if !check.is_valid {
        return Err(anyhow!(check.errors.join("; ")));
    }
    let bytes = op.read(path).await?;
    String::from_utf8(bytes.to_vec()).context("Import file is not valid UTF-8")
}
