use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetadataValueType {
    #[default]
    String,
    MultilineString,
    InlineControlledList,
    Number,
    Boolean,
    Date,
    Xyz,
    Wxyz,
    Matrix4x4,
    GeoPoint,
    GeoJson,
    Lla,
    Json,
}

const ALL_VALUE_TYPES: [MetadataValueType; 13] = [
    MetadataValueType::String,
    MetadataValueType::MultilineString,
    MetadataValueType::InlineControlledList,
    MetadataValueType::Number,
    MetadataValueType::Boolean,
    MetadataValueType::Date,
    MetadataValueType::Xyz,
    MetadataValueType::Wxyz,
    MetadataValueType::Matrix4x4,
    MetadataValueType::GeoPoint,
    MetadataValueType::GeoJson,
    MetadataValueType::Lla,
    MetadataValueType::Json,
];

impl MetadataValueType {
    pub fn all() -> &'static [MetadataValueType] {
        &ALL_VALUE_TYPES
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataValueType::String => "string",
            MetadataValueType::MultilineString => "multiline_string",
            MetadataValueType::InlineControlledList => "inline_controlled_list",
            MetadataValueType::Number => "number",
            MetadataValueType::Boolean => "boolean",
            MetadataValueType::Date => "date",
            MetadataValueType::Xyz => "xyz",
            MetadataValueType::Wxyz => "wxyz",
            MetadataValueType::Matrix4x4 => "matrix4x4",
            MetadataValueType::GeoPoint => "geopoint",
            MetadataValueType::GeoJson => "geojson",
            MetadataValueType::Lla => "lla",
            MetadataValueType::Json => "json",
        }
    }
}

impl fmt::Display for MetadataValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataValueType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim();
        ALL_VALUE_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                anyhow!(
                    "Invalid metadata value type: {}. Supported types are: {}",
                    s,
                    list_value_types().join(", ")
                )
            })
    }
}

impl Serialize for MetadataValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetadataValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub fn list_value_types() -> Vec<String> {
    ALL_VALUE_TYPES
        .iter()
        .map(|t| t.as_str().to_string())
        .collect()
}
