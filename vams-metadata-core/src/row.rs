use crate::changes;
use crate::error::RowEditError;
use crate::record::{MetadataChanges, MetadataRecord, SchemaProvenance};
use crate::value_type::MetadataValueType;
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowValues {
    pub key: String,
    pub value: String,
    pub value_type: MetadataValueType,
}

impl RowValues {
    fn from_record(record: &MetadataRecord) -> Self {
        Self {
            key: record.key.clone(),
            value: record.value.clone(),
            value_type: record.value_type,
        }
    }
}

/// Lifecycle of a row within one edit session.
///
/// `Clean -> Dirty` on any edit, back to `Clean` on commit or revert.
/// `New` rows never reached the server and vanish when deleted;
/// every other row becomes `SoftDeleted` until the next commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Clean,
    Dirty,
    New,
    SoftDeleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub id: Uuid,
    pub committed: RowValues,
    pub staged: RowValues,
    pub state: RowState,
    pub schema: Option<SchemaProvenance>,
}

impl MetadataRow {
    pub fn from_record(record: &MetadataRecord) -> Self {
        let values = RowValues::from_record(record);
        Self {
            id: Uuid::new_v4(),
            committed: values.clone(),
            staged: values,
            state: RowState::Clean,
            schema: record.schema.clone(),
        }
    }

    fn blank() -> Self {
        Self {
            id: Uuid::new_v4(),
            committed: RowValues::default(),
            staged: RowValues::default(),
            state: RowState::New,
            schema: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == RowState::New
    }

    pub fn is_deleted(&self) -> bool {
        self.state == RowState::SoftDeleted
    }

    pub fn has_changes(&self) -> bool {
        self.state != RowState::Clean
    }

    pub fn is_schema_field(&self) -> bool {
        self.schema.is_some()
    }

    pub fn is_required(&self) -> bool {
        self.schema.as_ref().is_some_and(|s| s.required)
    }

    pub fn staged_record(&self) -> MetadataRecord {
        MetadataRecord {
            key: self.staged.key.trim().to_string(),
            value: self.staged.value.clone(),
            value_type: self.staged.value_type,
            schema: self.schema.clone(),
        }
    }
}

/// Partial edit applied to a row's staged values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
    pub key: Option<String>,
    pub value: Option<String>,
    pub value_type: Option<MetadataValueType>,
}

impl RowPatch {
    pub fn key(key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn value(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::default()
        }
    }

    pub fn value_type(value_type: MetadataValueType) -> Self {
        Self {
            value_type: Some(value_type),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_type(mut self, value_type: MetadataValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

fn display_order(a: &MetadataRow, b: &MetadataRow) -> Ordering {
    match (&a.schema, &b.schema) {
        (Some(sa), Some(sb)) => match (sa.sequence, sb.sequence) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.committed.key.cmp(&b.committed.key)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.committed.key.cmp(&b.committed.key),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.committed.key.cmp(&b.committed.key),
    }
}

/// Live rows of one entity together with the last committed baseline.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    rows: Vec<MetadataRow>,
    baseline: Vec<MetadataRow>,
}

impl RowSet {
    pub fn initialize(records: &[MetadataRecord]) -> Self {
        let mut rows: Vec<MetadataRow> = records.iter().map(MetadataRow::from_record).collect();
        rows.sort_by(display_order);
        Self {
            baseline: rows.clone(),
            rows,
        }
    }

    pub fn rows(&self) -> &[MetadataRow] {
        &self.rows
    }

    pub fn baseline(&self) -> &[MetadataRow] {
        &self.baseline
    }

    pub fn get(&self, index: usize) -> Option<&MetadataRow> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows shown to the user, with their index into `rows()`.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &MetadataRow)> {
        self.rows.iter().enumerate().filter(|(_, r)| !r.is_deleted())
    }

    pub fn find_by_key(&self, key: &str) -> Option<usize> {
        self.visible()
            .find(|(_, r)| r.staged.key.trim() == key)
            .map(|(idx, _)| idx)
    }

    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(MetadataRow::has_changes)
    }

    pub fn add_new_row(&mut self) -> usize {
        self.rows.push(MetadataRow::blank());
        self.rows.len() - 1
    }

    pub(crate) fn push_new(&mut self, values: RowValues) -> usize {
        let index = self.add_new_row();
        self.rows[index].staged = values;
        index
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut MetadataRow, RowEditError> {
        self.rows
            .get_mut(index)
            .ok_or(RowEditError::IndexOutOfRange(index))
    }

    pub fn update_row(&mut self, index: usize, patch: RowPatch) -> Result<(), RowEditError> {
        let row = self.row_mut(index)?;
        if row.is_deleted() {
            return Err(RowEditError::RowDeleted(row.committed.key.clone()));
        }
        if row.is_schema_field() {
            if patch.key.as_ref().is_some_and(|k| *k != row.staged.key) {
                return Err(RowEditError::SchemaFieldLocked {
                    key: row.committed.key.clone(),
                    attribute: "key",
                });
            }
            if patch.value_type.is_some_and(|t| t != row.staged.value_type) {
                return Err(RowEditError::SchemaFieldLocked {
                    key: row.committed.key.clone(),
                    attribute: "type",
                });
            }
        }

        if let Some(key) = patch.key {
            row.staged.key = key;
        }
        if let Some(value) = patch.value {
            row.staged.value = value;
        }
        if let Some(value_type) = patch.value_type {
            row.staged.value_type = value_type;
        }
        self.refresh_state(index);
        Ok(())
    }

    fn refresh_state(&mut self, index: usize) {
        let row = &self.rows[index];
        if row.is_new() || row.is_deleted() {
            return;
        }
        let dirty = match self
            .baseline
            .iter()
            .find(|b| b.committed.key == row.committed.key)
        {
            Some(original) => original.committed != row.staged,
            None => true,
        };
        self.rows[index].state = if dirty {
            RowState::Dirty
        } else {
            RowState::Clean
        };
    }

    pub fn delete_row(&mut self, index: usize) -> Result<(), RowEditError> {
        let row = self.row_mut(index)?;
        if row.is_new() {
            self.rows.remove(index);
            return Ok(());
        }
        if row.is_schema_field() {
            if row.staged.value.is_empty() {
                return Ok(());
            }
            row.staged.value.clear();
            self.refresh_state(index);
            return Ok(());
        }
        row.state = RowState::SoftDeleted;
        Ok(())
    }

    /// Drop pending edits on a single row.
    pub fn revert_row(&mut self, index: usize) -> Result<(), RowEditError> {
        let row = self.row_mut(index)?;
        if row.is_new() {
            self.rows.remove(index);
            return Ok(());
        }
        row.staged = row.committed.clone();
        row.state = RowState::Clean;
        Ok(())
    }

    pub fn reset_changes(&mut self) {
        self.rows = self.baseline.clone();
    }

    /// Promote staged values to committed ones and take a new baseline.
    pub fn commit(&mut self) {
        self.rows.retain(|r| !r.is_deleted());
        for row in &mut self.rows {
            row.staged.key = row.staged.key.trim().to_string();
            row.committed = row.staged.clone();
            row.state = RowState::Clean;
        }
        self.baseline = self.rows.clone();
    }

    pub fn changes(&self) -> MetadataChanges {
        changes::diff(&self.baseline, &self.rows)
    }

    /// Staged records of every row that is not deleted, in display order.
    pub fn records(&self) -> Vec<MetadataRecord> {
        self.visible().map(|(_, r)| r.staged_record()).collect()
    }
}
