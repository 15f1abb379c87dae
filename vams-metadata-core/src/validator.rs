use crate::value_type::MetadataValueType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn merge(&mut self, other: ValidationResult) {
        for message in other.errors {
            self.push(message);
        }
    }
}

/// Check a raw value against its declared type.
///
/// Blank values always pass; whether a field may be blank is decided by the
/// schema checks in `validation`. Controlled-list membership needs the field's
/// allowed values and is checked there as well.
pub fn validate_value(raw: &str, value_type: MetadataValueType) -> ValidationResult {
    if raw.trim().is_empty() {
        return ValidationResult::ok();
    }

    let errors = match value_type {
        MetadataValueType::String
        | MetadataValueType::MultilineString
        | MetadataValueType::InlineControlledList => Vec::new(),
        MetadataValueType::Number => check_number(raw),
        MetadataValueType::Boolean => check_boolean(raw),
        MetadataValueType::Date => check_date(raw),
        json_type => match serde_json::from_str::<Value>(raw) {
            Ok(doc) => check_json_shape(&doc, json_type),
            Err(_) => vec![format!(
                "metadataValue must be valid JSON for type '{}'",
                json_type
            )],
        },
    };

    ValidationResult::from_errors(errors)
}

fn check_number(raw: &str) -> Vec<String> {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Vec::new(),
        _ => vec!["metadataValue must be a valid number for type 'number'".to_string()],
    }
}

fn check_boolean(raw: &str) -> Vec<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered == "true" || lowered == "false" {
        Vec::new()
    } else {
        vec!["metadataValue must be 'true' or 'false' for type 'boolean'".to_string()]
    }
}

pub(crate) fn parse_iso_date(raw: &str) -> bool {
    let s = raw.trim();
    if DateTime::parse_from_rfc3339(s).is_ok() {
        return true;
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    if NAIVE_FORMATS
        .iter()
        .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
    {
        return true;
    }
    if DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%:z").is_ok() {
        return true;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn check_date(raw: &str) -> Vec<String> {
    if parse_iso_date(raw) {
        Vec::new()
    } else {
        vec!["metadataValue must be a valid ISO date format for type 'date'".to_string()]
    }
}

fn check_json_shape(doc: &Value, value_type: MetadataValueType) -> Vec<String> {
    match value_type {
        MetadataValueType::Xyz => check_numeric_object(doc, "XYZ", &["x", "y", "z"]),
        MetadataValueType::Wxyz => check_numeric_object(doc, "WXYZ", &["w", "x", "y", "z"]),
        MetadataValueType::Matrix4x4 => check_matrix(doc),
        MetadataValueType::Lla => check_lla(doc),
        MetadataValueType::GeoPoint => check_geopoint(doc),
        MetadataValueType::GeoJson => check_geojson(doc),
        _ => Vec::new(),
    }
}

fn check_numeric_object(doc: &Value, label: &str, keys: &[&str]) -> Vec<String> {
    let Some(obj) = doc.as_object() else {
        return vec![format!("{} data must be a JSON object", label)];
    };
    if keys.iter().any(|k| !obj.contains_key(*k)) {
        let quoted: Vec<String> = keys.iter().map(|k| format!("'{}'", k)).collect();
        return vec![format!(
            "{} data must contain {} keys",
            label,
            quoted.join(", ")
        )];
    }
    keys.iter()
        .filter(|k| !obj[**k].is_number())
        .map(|k| format!("{} coordinate '{}' must be a number", label, k))
        .collect()
}

fn check_matrix(doc: &Value) -> Vec<String> {
    let Some(rows) = doc.as_array() else {
        return vec!["MATRIX4X4 data must be a JSON array".to_string()];
    };
    if rows.len() != 4 {
        return vec!["MATRIX4X4 must be a 4x4 matrix (4 rows)".to_string()];
    }

    let mut errors = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let Some(cells) = row.as_array() else {
            errors.push(format!("MATRIX4X4 row {} must be an array", i));
            continue;
        };
        if cells.len() != 4 {
            errors.push(format!("MATRIX4X4 row {} must contain exactly 4 elements", i));
            continue;
        }
        for (j, cell) in cells.iter().enumerate() {
            if !cell.is_number() {
                errors.push(format!("MATRIX4X4 element at [{}][{}] must be a number", i, j));
            }
        }
    }
    errors
}

fn bounded_number(
    obj: &Map<String, Value>,
    key: &str,
    label: &str,
    bounds: Option<(f64, f64)>,
) -> Option<String> {
    let Some(n) = obj.get(key).and_then(Value::as_f64) else {
        return Some(format!("LLA {} must be a number", label));
    };
    match bounds {
        Some((lo, hi)) if n < lo || n > hi => {
            Some(format!("LLA {} must be between {} and {}", label, lo, hi))
        }
        _ => None,
    }
}

fn check_lla(doc: &Value) -> Vec<String> {
    let Some(obj) = doc.as_object() else {
        return vec!["LLA data must be a JSON object".to_string()];
    };
    if ["lat", "long", "alt"].iter().any(|k| !obj.contains_key(*k)) {
        return vec!["LLA data must contain 'lat', 'long', and 'alt' keys".to_string()];
    }
    [
        bounded_number(obj, "lat", "latitude", Some((-90.0, 90.0))),
        bounded_number(obj, "long", "longitude", Some((-180.0, 180.0))),
        bounded_number(obj, "alt", "altitude", None),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn check_geopoint(doc: &Value) -> Vec<String> {
    let Some(obj) = doc.as_object() else {
        return vec!["GEOPOINT data must be a JSON object".to_string()];
    };
    if obj.get("type").and_then(Value::as_str) != Some("Point") {
        return vec!["GEOPOINT type must be 'Point'".to_string()];
    }
    match obj.get("coordinates").and_then(Value::as_array) {
        Some(coords) if coords.len() == 2 && coords.iter().all(Value::is_number) => Vec::new(),
        _ => vec!["GEOPOINT coordinates must be an array of 2 numbers".to_string()],
    }
}

fn check_geojson(doc: &Value) -> Vec<String> {
    let has_type = doc
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    if has_type {
        Vec::new()
    } else {
        vec!["GEOJSON validation failed: object must have a non-empty 'type' property".to_string()]
    }
}
