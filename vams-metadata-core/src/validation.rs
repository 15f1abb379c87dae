use crate::record::MetadataRecord;
use crate::row::MetadataRow;
use crate::schema::AggregatedSchema;
use crate::validator::{validate_value, ValidationResult};
use crate::value_type::MetadataValueType;
use std::collections::HashMap;

pub const MAX_KEY_LENGTH: usize = 256;

fn label(row: &MetadataRow) -> &str {
    row.staged.key.trim()
}

fn find_live<'a>(rows: &'a [MetadataRow], key: &str) -> Option<&'a MetadataRow> {
    rows.iter()
        .find(|r| !r.is_deleted() && r.staged.key.trim() == key)
}

/// Checks that only need the row itself plus lookups of its dependencies.
fn check_row(row: &MetadataRow, rows: &[MetadataRow]) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let key = label(row);
    let value = row.staged.value.trim();

    if key.is_empty() {
        result.push("Metadata key is required");
    } else if key.chars().count() > MAX_KEY_LENGTH {
        result.push(format!(
            "Metadata key '{}' exceeds {} characters",
            key, MAX_KEY_LENGTH
        ));
    }

    if let Some(schema) = &row.schema {
        if schema.required && value.is_empty() {
            result.push(format!("Field '{}' is required and cannot be empty", key));
        }

        // A blank dependent field is exempt until it gets a value.
        if !value.is_empty() {
            for dependency in &schema.depends_on {
                match find_live(rows, dependency) {
                    None => result.push(format!(
                        "Field '{}' depends on '{}', which is not present",
                        key, dependency
                    )),
                    Some(dep) if dep.staged.value.trim().is_empty() => result.push(format!(
                        "Field '{}' depends on '{}', which has no value",
                        key, dependency
                    )),
                    Some(_) => {}
                }
            }
        }
    }

    for message in validate_value(&row.staged.value, row.staged.value_type).errors {
        result.push(format!("Field '{}': {}", key, message));
    }

    if row.staged.value_type == MetadataValueType::InlineControlledList && !value.is_empty() {
        let allowed = row
            .schema
            .as_ref()
            .map(|s| s.controlled_list_keys.as_slice())
            .unwrap_or_default();
        if !allowed.is_empty() && !allowed.iter().any(|a| a == value) {
            result.push(format!(
                "Field '{}' value '{}' is not in controlled list: [{}]",
                key,
                value,
                allowed.join(", ")
            ));
        }
    }

    result
}

fn duplicate_message(key: &str) -> String {
    format!("Duplicate metadata key '{}'", key)
}

/// Validate one row in the context of the whole row set.
pub fn validate_row(row: &MetadataRow, rows: &[MetadataRow]) -> ValidationResult {
    let mut result = check_row(row, rows);
    let key = label(row);
    if !key.is_empty()
        && rows
            .iter()
            .any(|other| other.id != row.id && !other.is_deleted() && label(other) == key)
    {
        result.push(duplicate_message(key));
    }
    result
}

/// Validate every live row; a commit is allowed only when this is clean.
///
/// Each duplicated key is reported once, however many rows share it.
pub fn validate_all(rows: &[MetadataRow]) -> ValidationResult {
    let mut result = ValidationResult::ok();
    let mut key_counts: HashMap<&str, usize> = HashMap::new();
    let mut key_order: Vec<&str> = Vec::new();

    for row in rows.iter().filter(|r| !r.is_deleted()) {
        result.merge(check_row(row, rows));
        let key = label(row);
        if key.is_empty() {
            continue;
        }
        let count = key_counts.entry(key).or_insert(0);
        if *count == 0 {
            key_order.push(key);
        }
        *count += 1;
    }

    for key in key_order {
        if key_counts.get(key).copied().unwrap_or(0) > 1 {
            result.push(duplicate_message(key));
        }
    }

    result
}

/// Check that removing `keys` leaves the remaining metadata consistent with the schema.
pub fn validate_deletion(
    keys: &[String],
    remaining: &[MetadataRecord],
    schema: &AggregatedSchema,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for key in keys {
        let Some(field) = schema.field(key) else {
            continue;
        };
        if field.required {
            result.push(format!(
                "Cannot delete required field '{}'. Required fields must always have a value.",
                key
            ));
        }
        for dependent in &schema.fields {
            let remains = remaining.iter().any(|r| r.key == dependent.key);
            if remains && dependent.depends_on.iter().any(|d| d == key) {
                result.push(format!(
                    "Cannot delete field '{}' because field '{}' depends on it",
                    key, dependent.key
                ));
            }
        }
    }
    result
}
