use crate::api::{ApiResult, MetadataApi};
use crate::config::EditorConfig;
use crate::csv_codec::{export_csv, merge_import, parse_csv, read_import_file, CsvImportContext};
use crate::entity::{EntityRef, NamespaceRef};
use crate::error::{ApiError, EditorError, ErrorBanner};
use crate::record::{
    BulkResult, FailedItem, MetadataChanges, MetadataFetch, MetadataRecord, UpdateMode,
};
use crate::row::{RowPatch, RowSet};
use crate::schema::{aggregate_for_entity, AggregatedSchema};
use crate::validation::{validate_all, validate_row};
use crate::validator::ValidationResult;
use futures::future::join_all;
use opendal::Operator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, EditorError>;

/// Receives the reconciled record list after every commit.
pub type CommitCallback = Box<dyn FnMut(&[MetadataRecord]) + Send>;

pub fn commit_request_key(entity: &EntityRef) -> String {
    format!("commit:{}", entity)
}

pub fn fetch_request_key(entity: &EntityRef) -> String {
    format!("fetch:{}", entity)
}

pub fn schema_request_key(entity: &EntityRef, namespace: &NamespaceRef) -> String {
    format!("schema:{}|{}", entity, namespace)
}

/// Requests currently outstanding, shared by every editor that clones it.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<Mutex<HashMap<String, usize>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as in flight, or `None` if it already is.
    pub fn try_begin(&self, key: impl Into<String>) -> Option<InFlightGuard> {
        let key = key.into();
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if keys.contains_key(&key) {
            return None;
        }
        keys.insert(key.clone(), 1);
        Some(self.guard(key))
    }

    /// Mark `key` as in flight even if other holders already have it.
    pub fn track(&self, key: impl Into<String>) -> InFlightGuard {
        let key = key.into();
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        *keys.entry(key.clone()).or_insert(0) += 1;
        self.guard(key)
    }

    fn guard(&self, key: String) -> InFlightGuard {
        InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Whether any request key starting with `prefix` is outstanding.
    pub fn any_in_flight(&self, prefix: &str) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .any(|key| key.starts_with(prefix))
    }
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashMap<String, usize>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = keys.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                keys.remove(&self.key);
            }
        }
    }
}

/// A metadata fetch issued for one editor generation.
///
/// The fetch can run without holding the editor; `apply_load` drops the
/// response if the editor moved on in the meantime.
#[derive(Clone)]
pub struct LoadTicket {
    generation: u64,
    entity: EntityRef,
    api: Arc<dyn MetadataApi>,
    in_flight: InFlightRegistry,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub async fn fetch(&self) -> ApiResult<MetadataFetch> {
        let _guard = self.in_flight.track(fetch_request_key(&self.entity));
        self.api.fetch_metadata(&self.entity).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Separate create, update and delete calls for the pending changes.
    Incremental,
    /// The current rows become the entity's complete metadata.
    ReplaceAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub mode: CommitMode,
    pub results: Vec<BulkResult>,
    pub failed_items: Vec<FailedItem>,
    /// Whether the rows were re-initialized from a server fetch.
    pub refreshed: bool,
}

impl CommitReport {
    fn new(mode: CommitMode, results: Vec<BulkResult>, refreshed: bool) -> Self {
        let failed_items = results
            .iter()
            .flat_map(|r| r.failed_items.iter().cloned())
            .collect();
        Self {
            mode,
            results,
            failed_items,
            refreshed,
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_items.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().map(|r| r.success_count).sum()
    }
}

enum EditorMode {
    Online {
        api: Arc<dyn MetadataApi>,
        entity: EntityRef,
    },
    Offline,
}

/// Edit session over the metadata of one entity.
pub struct MetadataEditor {
    mode: EditorMode,
    config: EditorConfig,
    rows: RowSet,
    schema: Option<AggregatedSchema>,
    restrict_to_schema: bool,
    generation: u64,
    in_flight: InFlightRegistry,
    banner: Option<ErrorBanner>,
    on_commit: Option<CommitCallback>,
}

impl MetadataEditor {
    pub fn online(api: Arc<dyn MetadataApi>, entity: EntityRef, config: EditorConfig) -> Self {
        Self::with_mode(EditorMode::Online { api, entity }, config, RowSet::default())
    }

    /// Editor over an in-memory record list that never talks to a server.
    pub fn offline(records: &[MetadataRecord], config: EditorConfig) -> Self {
        Self::with_mode(EditorMode::Offline, config, RowSet::initialize(records))
    }

    fn with_mode(mode: EditorMode, config: EditorConfig, rows: RowSet) -> Self {
        Self {
            mode,
            config,
            rows,
            schema: None,
            restrict_to_schema: false,
            generation: 0,
            in_flight: InFlightRegistry::new(),
            banner: None,
            on_commit: None,
        }
    }

    pub fn with_registry(mut self, registry: InFlightRegistry) -> Self {
        self.in_flight = registry;
        self
    }

    pub fn with_commit_callback(mut self, callback: CommitCallback) -> Self {
        self.on_commit = Some(callback);
        self
    }

    pub fn entity(&self) -> Option<&EntityRef> {
        match &self.mode {
            EditorMode::Online { entity, .. } => Some(entity),
            EditorMode::Offline => None,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.mode, EditorMode::Offline)
    }

    pub fn rows(&self) -> &RowSet {
        &self.rows
    }

    pub fn schema(&self) -> Option<&AggregatedSchema> {
        self.schema.as_ref()
    }

    /// Schema used for CSV checks when there is no server to ask.
    pub fn set_schema(&mut self, schema: AggregatedSchema, restrict_to_schema: bool) {
        self.restrict_to_schema = restrict_to_schema && !schema.is_empty();
        self.schema = Some(schema);
    }

    pub fn restrict_to_schema(&self) -> bool {
        self.restrict_to_schema
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn banner(&self) -> Option<&ErrorBanner> {
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Whether any commit, metadata fetch or schema fetch for the entity is outstanding.
    pub fn is_busy(&self) -> bool {
        self.entity()
            .is_some_and(|entity| self.entity_in_flight(entity))
    }

    fn entity_in_flight(&self, entity: &EntityRef) -> bool {
        self.in_flight.is_in_flight(&commit_request_key(entity))
            || self.in_flight.is_in_flight(&fetch_request_key(entity))
            || self
                .in_flight
                .any_in_flight(&format!("schema:{}|", entity))
    }

    fn connection(&self) -> Result<(Arc<dyn MetadataApi>, EntityRef)> {
        match &self.mode {
            EditorMode::Online { api, entity } => Ok((Arc::clone(api), entity.clone())),
            EditorMode::Offline => Err(EditorError::Offline),
        }
    }

    fn fail(&mut self, err: ApiError) -> EditorError {
        warn!(error = %err, "metadata request failed");
        self.banner = Some(ErrorBanner::from_api(&err));
        EditorError::Api(err)
    }

    /// Point the editor at another entity; pending responses for the old one are discarded.
    pub fn set_entity(&mut self, entity: EntityRef) -> Result<()> {
        let EditorMode::Online { entity: current, .. } = &mut self.mode else {
            return Err(EditorError::Offline);
        };
        *current = entity;
        self.generation += 1;
        self.rows = RowSet::default();
        self.schema = None;
        self.restrict_to_schema = false;
        self.banner = None;
        Ok(())
    }

    /// Start a fetch; only the newest ticket can still be applied.
    pub fn begin_load(&mut self) -> Result<LoadTicket> {
        let (api, entity) = self.connection()?;
        self.generation += 1;
        Ok(LoadTicket {
            generation: self.generation,
            entity,
            api,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Apply a fetch response, returning `false` when the ticket is stale.
    pub fn apply_load(&mut self, ticket: &LoadTicket, response: ApiResult<MetadataFetch>) -> Result<bool> {
        if ticket.generation != self.generation || self.entity() != Some(&ticket.entity) {
            debug!(
                entity = %ticket.entity,
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale metadata response"
            );
            return Ok(false);
        }
        let fetched = response.map_err(|e| self.fail(e))?;
        self.install(fetched);
        Ok(true)
    }

    pub async fn load(&mut self) -> Result<()> {
        let ticket = self.begin_load()?;
        let response = ticket.fetch().await;
        self.apply_load(&ticket, response)?;
        Ok(())
    }

    fn install(&mut self, fetched: MetadataFetch) {
        self.rows = RowSet::initialize(&fetched.records);
        self.restrict_to_schema = fetched.restrict_to_schema_fields;
    }

    /// Fetch and aggregate the schema namespaces of the current entity.
    ///
    /// Returns `false` without fetching when the same entity's schema is already
    /// being fetched through the shared registry.
    pub async fn load_schema(&mut self) -> Result<bool> {
        let (api, entity) = self.connection()?;
        let namespaces = entity.schema_namespaces(&self.config.fallback_database_id);

        let mut guards = Vec::with_capacity(namespaces.len());
        for namespace in &namespaces {
            match self.in_flight.try_begin(schema_request_key(&entity, namespace)) {
                Some(guard) => guards.push(guard),
                None => {
                    debug!(entity = %entity, namespace = %namespace, "schema fetch already in flight");
                    return Ok(false);
                }
            }
        }

        let responses = join_all(namespaces.iter().map(|ns| api.fetch_schema(ns))).await;
        drop(guards);

        let mut documents = Vec::new();
        for response in responses {
            documents.extend(response.map_err(|e| self.fail(e))?);
        }
        let schema = aggregate_for_entity(&documents, &entity);
        debug!(
            entity = %entity,
            fields = schema.fields.len(),
            schemas = schema.schema_names.len(),
            "schema loaded"
        );
        self.schema = Some(schema);
        Ok(true)
    }

    pub fn add_row(&mut self) -> usize {
        self.rows.add_new_row()
    }

    pub fn update_row(&mut self, index: usize, patch: RowPatch) -> Result<()> {
        Ok(self.rows.update_row(index, patch)?)
    }

    pub fn delete_row(&mut self, index: usize) -> Result<()> {
        Ok(self.rows.delete_row(index)?)
    }

    pub fn revert_row(&mut self, index: usize) -> Result<()> {
        Ok(self.rows.revert_row(index)?)
    }

    pub fn reset_changes(&mut self) {
        self.rows.reset_changes();
    }

    pub fn changes(&self) -> MetadataChanges {
        self.rows.changes()
    }

    pub fn validate(&self) -> ValidationResult {
        validate_all(self.rows.rows())
    }

    pub fn validate_row(&self, index: usize) -> Option<ValidationResult> {
        let row = self.rows.get(index)?;
        Some(validate_row(row, self.rows.rows()))
    }

    pub fn export_csv(&self) -> Result<String> {
        Ok(export_csv(self.rows.rows())?)
    }

    /// Merge a CSV document into the rows; nothing changes unless every line is valid.
    pub fn import_csv(&mut self, text: &str) -> Result<usize> {
        let ctx = CsvImportContext::new(&self.rows, self.schema.as_ref(), self.restrict_to_schema);
        let import = parse_csv(text, &ctx);
        if !import.is_ok() {
            return Err(EditorError::CsvRejected(import.errors));
        }
        merge_import(&mut self.rows, &import.records)?;
        info!(records = import.records.len(), "CSV import merged");
        Ok(import.records.len())
    }

    pub async fn import_csv_file(&mut self, op: &Operator, path: &str) -> Result<usize> {
        let text = read_import_file(op, path, self.config.max_import_bytes).await?;
        self.import_csv(&text)
    }

    /// Validate, write and reconcile the pending edits.
    ///
    /// Online commits always end with a re-fetch, also after a failed or
    /// partially failed write, so the rows mirror what the server kept.
    pub async fn commit(&mut self, mode: CommitMode) -> Result<CommitReport> {
        let validation = self.validate();
        if !validation.is_valid {
            return Err(EditorError::Validation(validation.errors));
        }

        if mode == CommitMode::ReplaceAll {
            let count = self.rows.visible().count();
            if count > self.config.replace_all_limit {
                return Err(EditorError::ReplaceAllLimit {
                    count,
                    limit: self.config.replace_all_limit,
                });
            }
        }

        let (api, entity) = match self.connection() {
            Ok(connection) => connection,
            Err(EditorError::Offline) => return Ok(self.commit_offline(mode)),
            Err(e) => return Err(e),
        };

        let changes = self.rows.changes();
        if mode == CommitMode::Incremental && changes.is_empty() {
            debug!(entity = %entity, "nothing to commit");
            return Ok(CommitReport::new(mode, Vec::new(), false));
        }

        if self.entity_in_flight(&entity) {
            return Err(EditorError::Busy(entity.to_string()));
        }
        let Some(_guard) = self.in_flight.try_begin(commit_request_key(&entity)) else {
            return Err(EditorError::Busy(entity.to_string()));
        };

        let written = match mode {
            CommitMode::Incremental => write_incremental(api.as_ref(), &entity, changes).await,
            CommitMode::ReplaceAll => {
                let records = self
                    .rows
                    .records()
                    .iter()
                    .map(MetadataRecord::without_schema)
                    .collect();
                api.update_metadata(&entity, records, UpdateMode::ReplaceAll)
                    .await
                    .map(|result| vec![result])
            }
        };

        let results = match written {
            Ok(results) => results,
            Err(err) => {
                let err = self.fail(err);
                if let Err(refresh_err) = self.refresh(api.as_ref(), &entity).await {
                    warn!(error = %refresh_err, "re-fetch after failed commit also failed");
                }
                return Err(err);
            }
        };

        let report = CommitReport::new(mode, results, true);
        if report.is_partial() {
            warn!(
                entity = %entity,
                failed = report.failed_items.len(),
                "metadata commit partially failed"
            );
            self.banner = Some(partial_failure_banner(&report.failed_items));
        } else {
            info!(entity = %entity, items = report.success_count(), "metadata committed");
        }

        self.refresh(api.as_ref(), &entity)
            .await
            .map_err(|e| self.fail(e))?;
        self.notify();
        Ok(report)
    }

    fn commit_offline(&mut self, mode: CommitMode) -> CommitReport {
        let changes = self.rows.changes();
        self.rows.commit();
        debug!(changes = changes.total(), "offline commit");
        self.notify();
        CommitReport::new(mode, Vec::new(), false)
    }

    async fn refresh(&mut self, api: &dyn MetadataApi, entity: &EntityRef) -> ApiResult<()> {
        let fetched = {
            let _guard = self.in_flight.track(fetch_request_key(entity));
            api.fetch_metadata(entity).await?
        };
        self.install(fetched);
        Ok(())
    }

    fn notify(&mut self) {
        if let Some(callback) = self.on_commit.as_mut() {
            let records = self.rows.records();
            callback(&records);
        }
    }
}

async fn write_incremental(
    api: &dyn MetadataApi,
    entity: &EntityRef,
    changes: MetadataChanges,
) -> ApiResult<Vec<BulkResult>> {
    let mut results = Vec::new();
    if !changes.added.is_empty() {
        results.push(api.create_metadata(entity, changes.added).await?);
    }
    if !changes.updated.is_empty() {
        results.push(
            api.update_metadata(entity, changes.updated, UpdateMode::Update)
                .await?,
        );
    }
    if !changes.deleted.is_empty() {
        results.push(api.delete_metadata(entity, changes.deleted).await?);
    }
    Ok(results)
}

fn partial_failure_banner(failed: &[FailedItem]) -> ErrorBanner {
    let details: Vec<String> = failed
        .iter()
        .map(|item| format!("{}: {}", item.key, item.error))
        .collect();
    ErrorBanner {
        status: None,
        message: format!(
            "{} metadata item(s) failed to save: {}",
            failed.len(),
            details.join("; ")
        ),
    }
}
