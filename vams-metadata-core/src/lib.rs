#![warn(warnings)]
#![deny(clippy::all)]

//! Typed metadata editing for digital assets: value validation, staged row
//! edits, schema aggregation, CSV import/export and commit reconciliation
//! against a metadata service.

pub mod api;
pub mod changes;
pub mod config;
pub mod csv_codec;
pub mod editor;
pub mod entity;
pub mod error;
pub mod logging;
pub mod record;
pub mod row;
pub mod schema;
pub mod storage;
pub mod store;
pub mod validation;
pub mod validator;
pub mod value_type;

pub use api::{ApiResult, MetadataApi};
pub use config::EditorConfig;
pub use editor::{CommitMode, CommitReport, InFlightRegistry, LoadTicket, MetadataEditor};
pub use entity::{EntityRef, MetadataEntityType, NamespaceRef};
pub use error::{ApiError, EditorError, ErrorBanner, RowEditError};
pub use record::{
    BulkResult, FailedItem, MetadataChanges, MetadataFetch, MetadataRecord, MetadataSchemaField,
    SchemaDocument, SchemaProvenance, UpdateMode,
};
pub use row::{MetadataRow, RowPatch, RowSet, RowState};
pub use schema::AggregatedSchema;
pub use store::{DatabaseSettings, OpendalMetadataStore};
pub use validator::{validate_value, ValidationResult};
pub use value_type::MetadataValueType;
