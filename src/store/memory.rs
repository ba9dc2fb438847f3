// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory Store
//!
//! Each transaction works on a private copy of the tables and publishes it
//! on commit. A commit whose base revision is stale fails with
//! [`InventoryError::WriteConflict`], which gives the same first-committer-wins
//! behavior a serializable database shows under contention.
//!
//! Committed outbox rows are delivered to an optional [`EventEmitter`], in
//! the role a CDC reader plays for Postgres.
//!
//! Fault injection hooks (`inject_commit_conflicts`,
//! `fail_next_outbox_writes`) exist for retry and atomicity tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{change_tuples, previous_common_version, ResourceRepository, Store, Tx};
use crate::aggregate::{ReporterResource, Resource};
use crate::domain::{
    CommonRepresentation, ConsistencyToken, ReporterRepresentation, ReporterResourceId,
    ReporterResourceKey, Representations, ResourceId, ResourceType, TransactionId, Version,
};
use crate::errors::{InventoryError, InventoryResult};
use crate::events::{EventEmitter, OperationType, OutboxEvent};

#[derive(Debug, Clone)]
struct ResourceRow {
    resource_type: ResourceType,
    common_version: Version,
    consistency_token: Option<ConsistencyToken>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    resources: HashMap<ResourceId, ResourceRow>,
    reporter_resources: HashMap<ReporterResourceId, ReporterResource>,
    reporter_representations: Vec<ReporterRepresentation>,
    common_representations: Vec<CommonRepresentation>,
    outbox: Vec<OutboxEvent>,
    revision: u64,
}

#[derive(Debug, Default)]
struct Faults {
    commit_conflicts: u32,
    outbox_failures: u32,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    faults: Faults,
    wal: Vec<OutboxEvent>,
    commits: u64,
    emitter: Option<EventEmitter>,
}

/// Row counts, for assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub resources: usize,
    pub reporter_resources: usize,
    pub reporter_representations: usize,
    pub common_representations: usize,
    pub outbox: usize,
}

/// In-memory [`Store`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver committed outbox rows to `emitter`
    pub async fn attach_emitter(&self, emitter: EventEmitter) {
        self.shared.lock().await.emitter = Some(emitter);
    }

    /// Fail the next `n` commits with a write conflict
    pub async fn inject_commit_conflicts(&self, n: u32) {
        self.shared.lock().await.faults.commit_conflicts = n;
    }

    /// Fail the outbox insert of the next `n` transactions
    pub async fn fail_next_outbox_writes(&self, n: u32) {
        self.shared.lock().await.faults.outbox_failures = n;
    }

    /// Outbox rows observed by a log reader, in commit order
    pub async fn committed_events(&self) -> Vec<OutboxEvent> {
        self.shared.lock().await.wal.clone()
    }

    /// Number of successful commits that changed data
    pub async fn commit_count(&self) -> u64 {
        self.shared.lock().await.commits
    }

    pub async fn table_counts(&self) -> TableCounts {
        let shared = self.shared.lock().await;
        let t = &shared.tables;
        TableCounts {
            resources: t.resources.len(),
            reporter_resources: t.reporter_resources.len(),
            reporter_representations: t.reporter_representations.len(),
            common_representations: t.common_representations.len(),
            outbox: t.outbox.len(),
        }
    }

    /// Reporter snapshots for a key, ordered by generation then version
    pub async fn reporter_history(&self, key: &ReporterResourceKey) -> Vec<ReporterRepresentation> {
        let shared = self.shared.lock().await;
        let ids: Vec<ReporterResourceId> = shared
            .tables
            .reporter_resources
            .values()
            .filter(|rr| key.matches(&rr.key))
            .map(|rr| rr.id)
            .collect();
        let mut history: Vec<ReporterRepresentation> = shared
            .tables
            .reporter_representations
            .iter()
            .filter(|r| ids.contains(&r.reporter_resource_id))
            .cloned()
            .collect();
        history.sort_by_key(|r| (r.generation, r.version));
        history
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> InventoryResult<Box<dyn Tx>> {
        let mut shared = self.shared.lock().await;
        let fail_outbox = if shared.faults.outbox_failures > 0 {
            shared.faults.outbox_failures -= 1;
            true
        } else {
            false
        };
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            base_revision: shared.tables.revision,
            tables: shared.tables.clone(),
            wal: Vec::new(),
            dirty: false,
            fail_outbox,
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<Shared>>,
    base_revision: u64,
    tables: Tables,
    wal: Vec<OutboxEvent>,
    dirty: bool,
    fail_outbox: bool,
}

#[async_trait]
impl Tx for MemoryTx {
    fn repository(&mut self) -> &mut dyn ResourceRepository {
        self
    }

    async fn commit(self: Box<Self>) -> InventoryResult<()> {
        let handle = Arc::clone(&self.shared);
        let mut shared = handle.lock().await;
        if shared.faults.commit_conflicts > 0 {
            shared.faults.commit_conflicts -= 1;
            return Err(InventoryError::WriteConflict("injected conflict".into()));
        }
        if !self.dirty {
            return Ok(());
        }
        if shared.tables.revision != self.base_revision {
            return Err(InventoryError::WriteConflict(format!(
                "concurrent commit moved revision {} to {}",
                self.base_revision, shared.tables.revision
            )));
        }

        let MemoryTx {
            mut tables, wal, ..
        } = *self;
        tables.revision += 1;
        shared.tables = tables;
        shared.commits += 1;
        for event in &wal {
            if let Some(emitter) = &shared.emitter {
                emitter.emit(event.clone());
            }
        }
        shared.wal.extend(wal);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> InventoryResult<()> {
        debug!(dirty = self.dirty, "rolling back in-memory transaction");
        Ok(())
    }
}

impl MemoryTx {
    fn matching(&self, key: &ReporterResourceKey, tombstone: bool) -> Option<&ReporterResource> {
        self.tables
            .reporter_resources
            .values()
            .filter(|rr| rr.tombstone == tombstone && key.matches(&rr.key))
            .max_by_key(|rr| (rr.generation, rr.representation_version))
    }

    fn any_matching(&self, key: &ReporterResourceKey) -> Option<&ReporterResource> {
        self.matching(key, false).or_else(|| self.matching(key, true))
    }

    fn load(&self, resource_id: ResourceId) -> InventoryResult<Resource> {
        let row = self
            .tables
            .resources
            .get(&resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;
        let mut reporters: Vec<ReporterResource> = self
            .tables
            .reporter_resources
            .values()
            .filter(|rr| rr.resource_id == resource_id)
            .cloned()
            .collect();
        reporters.sort_by_key(|rr| rr.id.as_uuid());
        Ok(Resource::from_parts(
            resource_id,
            row.resource_type.clone(),
            row.common_version,
            row.consistency_token.clone(),
            reporters,
        ))
    }

    fn common_at(&self, resource_id: ResourceId, version: Version) -> Option<&CommonRepresentation> {
        self.tables
            .common_representations
            .iter()
            .find(|c| c.resource_id == resource_id && c.version == version)
    }
}

#[async_trait]
impl ResourceRepository for MemoryTx {
    async fn find_resource_by_keys(&mut self, key: &ReporterResourceKey) -> InventoryResult<Resource> {
        let resource_id = self
            .matching(key, false)
            .map(|rr| rr.resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;
        self.load(resource_id)
    }

    async fn find_tombstoned_resource_by_keys(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Resource>> {
        if self.matching(key, false).is_some() {
            return Ok(None);
        }
        match self.matching(key, true).map(|rr| rr.resource_id) {
            Some(resource_id) => self.load(resource_id).map(Some),
            None => Ok(None),
        }
    }

    async fn save(
        &mut self,
        resource: &Resource,
        operation: OperationType,
        txid: &TransactionId,
    ) -> InventoryResult<()> {
        let event = resource
            .pending_event()
            .ok_or_else(|| InventoryError::Generic("resource has no pending change".into()))?;
        let rr = &event.reporter_resource;

        let duplicate = self.tables.reporter_resources.values().any(|other| {
            other.id != rr.id
                && other.key.normalized() == rr.key.normalized()
        });
        if duplicate {
            return Err(InventoryError::Generic(format!(
                "duplicate key violation: reporter resource {} already exists",
                rr.key
            )));
        }

        let reporter_rep = event.reporter_representation();
        if self.tables.reporter_representations.iter().any(|r| {
            r.reporter_resource_id == reporter_rep.reporter_resource_id
                && r.version == reporter_rep.version
                && r.generation == reporter_rep.generation
        }) {
            return Err(InventoryError::Generic(format!(
                "duplicate reporter representation {} v{} g{}",
                reporter_rep.reporter_resource_id, reporter_rep.version, reporter_rep.generation
            )));
        }
        if let Some(common) = event.common_representation() {
            if self.common_at(common.resource_id, common.version).is_some() {
                return Err(InventoryError::Generic(format!(
                    "duplicate common representation {} v{}",
                    common.resource_id, common.version
                )));
            }
        }

        let previous = previous_common_version(event, operation)
            .and_then(|v| self.common_at(event.resource_id, v))
            .map(|c| (c.data.clone(), c.version));
        let tuples = change_tuples(event, previous);

        let consistency_token = self
            .tables
            .resources
            .get(&event.resource_id)
            .and_then(|row| row.consistency_token.clone())
            .or_else(|| resource.consistency_token().cloned());
        self.tables.resources.insert(
            event.resource_id,
            ResourceRow {
                resource_type: event.resource_type.clone(),
                common_version: event.common_version,
                consistency_token,
            },
        );
        self.tables.reporter_resources.insert(rr.id, rr.clone());
        self.tables.reporter_representations.push(reporter_rep.clone());
        if let Some(common) = event.common_representation() {
            self.tables.common_representations.push(common.clone());
        }

        if self.fail_outbox {
            return Err(InventoryError::Generic("failed to insert outbox event".into()));
        }
        for row in OutboxEvent::for_change(event, operation, txid.as_str(), tuples)? {
            self.tables.outbox.push(row.clone());
            self.tables.outbox.retain(|r| r.id != row.id);
            self.wal.push(row);
        }

        self.dirty = true;
        Ok(())
    }

    async fn contains_event_for_transaction_id(&mut self, txid: &str) -> InventoryResult<bool> {
        if txid.is_empty() {
            return Ok(false);
        }
        Ok(self
            .tables
            .reporter_representations
            .iter()
            .any(|r| r.transaction_id.as_str() == txid)
            || self
                .tables
                .common_representations
                .iter()
                .any(|c| c.transaction_id.as_str() == txid))
    }

    async fn find_current_and_previous_versioned_representations(
        &mut self,
        key: &ReporterResourceKey,
        current_version: Option<Version>,
        _operation: OperationType,
    ) -> InventoryResult<(Option<Representations>, Option<Representations>)> {
        let Some(current_version) = current_version else {
            return Ok((None, None));
        };
        let resource_id = self
            .any_matching(key)
            .map(|rr| rr.resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;

        let to_reps = |c: &CommonRepresentation| Representations::common(c.data.clone(), c.version).ok();
        let current = self.common_at(resource_id, current_version).and_then(to_reps);
        let previous = current_version
            .previous()
            .and_then(|v| self.common_at(resource_id, v))
            .and_then(to_reps);
        Ok((current, previous))
    }

    async fn find_latest_representations(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Representations>> {
        let resource_id = self
            .any_matching(key)
            .map(|rr| rr.resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;
        let latest = self
            .tables
            .common_representations
            .iter()
            .filter(|c| c.resource_id == resource_id)
            .max_by_key(|c| c.version)
            .ok_or(InventoryError::ResourceNotFound)?;
        Ok(Representations::common(latest.data.clone(), latest.version).ok())
    }

    async fn update_consistency_token(
        &mut self,
        key: &ReporterResourceKey,
        token: &ConsistencyToken,
    ) -> InventoryResult<()> {
        let resource_id = self
            .any_matching(key)
            .map(|rr| rr.resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;
        let row = self
            .tables
            .resources
            .get_mut(&resource_id)
            .ok_or(InventoryError::ResourceNotFound)?;
        row.consistency_token = Some(token.clone());
        self.dirty = true;
        Ok(())
    }
}
