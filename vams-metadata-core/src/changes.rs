use crate::record::{MetadataChanges, MetadataRecord};
use crate::row::{MetadataRow, RowState};
use std::collections::HashSet;
use uuid::Uuid;

/// Compute the writes needed to move the server from `baseline` to `current`.
///
/// New rows that were deleted before commit are gone from `current` and never
/// appear in the baseline, so they produce nothing. Renaming a committed row
/// is a delete of the old key plus a create of the new one.
///
/// A key that is both deleted and added in one session is written as an
/// update, so the server never receives a create and a delete for the same key.
pub fn diff(baseline: &[MetadataRow], current: &[MetadataRow]) -> MetadataChanges {
    let mut changes = MetadataChanges::default();
    let mut deleted_seen: HashSet<String> = HashSet::new();

    let mut push_delete = |changes: &mut MetadataChanges, key: &str| {
        if !key.is_empty() && deleted_seen.insert(key.to_string()) {
            changes.deleted.push(key.to_string());
        }
    };

    for row in current {
        match row.state {
            RowState::Clean => {}
            RowState::New => changes.added.push(upload_record(row)),
            RowState::SoftDeleted => push_delete(&mut changes, &row.committed.key),
            RowState::Dirty => {
                let record = upload_record(row);
                if record.key != row.committed.key {
                    push_delete(&mut changes, &row.committed.key);
                    changes.added.push(record);
                } else {
                    changes.updated.push(record);
                }
            }
        }
    }

    let live: HashSet<Uuid> = current.iter().map(|r| r.id).collect();
    for row in baseline {
        if !live.contains(&row.id) {
            push_delete(&mut changes, &row.committed.key);
        }
    }

    let deleted: HashSet<String> = changes.deleted.iter().cloned().collect();
    let (recreated, added): (Vec<_>, Vec<_>) = changes
        .added
        .into_iter()
        .partition(|record| deleted.contains(&record.key));
    changes.added = added;
    changes
        .deleted
        .retain(|key| !recreated.iter().any(|record| record.key == *key));
    changes.updated.extend(recreated);

    changes
}

fn upload_record(row: &MetadataRow) -> MetadataRecord {
    row.staged_record().without_schema()
}
