// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Aggregate
//!
//! The aggregate root owns a `common_version` counter and one
//! [`ReporterResource`] per reporter that has reported the resource.
//! Every mutation records a [`ResourceEvent`] holding the snapshots the
//! repository must append; the aggregate itself never touches storage.
//!
//! ```text
//! new()    → common v0, reporter v0 gen 0          → Reported event
//! update() → common +1, reporter +1 (or revive)   → Reported event
//! delete() → reporter +1, tombstone               → Deleted event
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::commands::ResourceReport;
use super::reporter_resource::ReporterResource;
use crate::domain::{
    CommonRepresentation, ConsistencyToken, ReporterRepresentation, ReporterResourceId,
    ReporterResourceKey, ResourceId, ResourceType, TransactionId, Version,
};

/// Aggregate invariant violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no reporter resource for key {0}")]
    ReporterResourceNotFound(String),
}

/// Snapshots produced by one mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceChange {
    Reported {
        reporter_representation: ReporterRepresentation,
        common_representation: CommonRepresentation,
    },
    Deleted {
        reporter_representation: ReporterRepresentation,
    },
}

/// Pending change awaiting `Save`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub resource_id: ResourceId,
    pub resource_type: ResourceType,
    pub common_version: Version,
    pub reporter_resource: ReporterResource,
    pub change: ResourceChange,
}

impl ResourceEvent {
    pub fn reporter_representation(&self) -> &ReporterRepresentation {
        match &self.change {
            ResourceChange::Reported {
                reporter_representation,
                ..
            }
            | ResourceChange::Deleted {
                reporter_representation,
            } => reporter_representation,
        }
    }

    pub fn common_representation(&self) -> Option<&CommonRepresentation> {
        match &self.change {
            ResourceChange::Reported {
                common_representation,
                ..
            } => Some(common_representation),
            ResourceChange::Deleted { .. } => None,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.reporter_representation().transaction_id
    }
}

/// Aggregate root
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    id: ResourceId,
    resource_type: ResourceType,
    common_version: Version,
    consistency_token: Option<ConsistencyToken>,
    reporter_resources: Vec<ReporterResource>,
    events: Vec<ResourceEvent>,
}

impl Resource {
    /// First report for a key
    pub fn new(
        id: ResourceId,
        key: ReporterResourceKey,
        reporter_resource_id: ReporterResourceId,
        report: ResourceReport,
        transaction_id: TransactionId,
    ) -> Self {
        let transaction_id = if transaction_id.is_empty() {
            TransactionId::generate()
        } else {
            transaction_id
        };
        let reporter_resource = ReporterResource::new(
            reporter_resource_id,
            key.clone(),
            id,
            report.api_href.clone(),
            report.console_href.clone(),
        );
        let mut resource = Self {
            id,
            resource_type: key.resource_type.clone(),
            common_version: Version::initial(),
            consistency_token: None,
            reporter_resources: vec![reporter_resource.clone()],
            events: Vec::new(),
        };
        resource.record_report(reporter_resource, report, transaction_id);
        resource
    }

    /// Rebuild from stored rows; no pending events
    pub fn from_parts(
        id: ResourceId,
        resource_type: ResourceType,
        common_version: Version,
        consistency_token: Option<ConsistencyToken>,
        reporter_resources: Vec<ReporterResource>,
    ) -> Self {
        Self {
            id,
            resource_type,
            common_version,
            consistency_token,
            reporter_resources,
            events: Vec::new(),
        }
    }

    /// Subsequent report for a key; revives a tombstoned reporter resource
    pub fn update(
        &mut self,
        key: &ReporterResourceKey,
        report: ResourceReport,
        transaction_id: TransactionId,
    ) -> Result<(), AggregateError> {
        let transaction_id = if transaction_id.is_empty() {
            TransactionId::generate()
        } else {
            transaction_id
        };
        let index = self.reporter_index(key)?;
        self.common_version = self.common_version.next();

        let reporter_resource = &mut self.reporter_resources[index];
        reporter_resource.update(&report.api_href, report.console_href.clone());
        let snapshot = reporter_resource.clone();

        self.record_report(snapshot, report, transaction_id);
        Ok(())
    }

    /// Tombstone the reporter resource for `key`; already tombstoned is a no-op
    pub fn delete(
        &mut self,
        key: &ReporterResourceKey,
        transaction_id: TransactionId,
    ) -> Result<(), AggregateError> {
        let index = self.reporter_index(key)?;
        let reporter_resource = &mut self.reporter_resources[index];
        if reporter_resource.tombstone {
            return Ok(());
        }
        reporter_resource.delete();
        let snapshot = reporter_resource.clone();

        let representation = ReporterRepresentation::deleted(
            snapshot.id,
            snapshot.representation_version,
            snapshot.generation,
            self.common_version,
            transaction_id,
        );
        self.events = vec![ResourceEvent {
            resource_id: self.id,
            resource_type: self.resource_type.clone(),
            common_version: self.common_version,
            reporter_resource: snapshot,
            change: ResourceChange::Deleted {
                reporter_representation: representation,
            },
        }];
        Ok(())
    }

    fn reporter_index(&self, key: &ReporterResourceKey) -> Result<usize, AggregateError> {
        self.reporter_resources
            .iter()
            .position(|rr| key.matches(&rr.key))
            .ok_or_else(|| AggregateError::ReporterResourceNotFound(key.to_string()))
    }

    fn record_report(
        &mut self,
        reporter_resource: ReporterResource,
        report: ResourceReport,
        transaction_id: TransactionId,
    ) {
        let reporter_representation = ReporterRepresentation::reported(
            reporter_resource.id,
            reporter_resource.representation_version,
            reporter_resource.generation,
            report.reporter_data,
            self.common_version,
            report.reporter_version,
            transaction_id.clone(),
        );
        let common_representation = CommonRepresentation {
            resource_id: self.id,
            data: report.common_data,
            version: self.common_version,
            reported_by_reporter_type: reporter_resource.key.reporter_type.clone(),
            reported_by_reporter_instance: reporter_resource.key.reporter_instance_id.clone(),
            transaction_id,
        };
        self.events = vec![ResourceEvent {
            resource_id: self.id,
            resource_type: self.resource_type.clone(),
            common_version: self.common_version,
            reporter_resource,
            change: ResourceChange::Reported {
                reporter_representation,
                common_representation,
            },
        }];
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub fn common_version(&self) -> Version {
        self.common_version
    }

    pub fn consistency_token(&self) -> Option<&ConsistencyToken> {
        self.consistency_token.as_ref()
    }

    pub fn reporter_resources(&self) -> &[ReporterResource] {
        &self.reporter_resources
    }

    pub fn reporter_resource(&self, key: &ReporterResourceKey) -> Option<&ReporterResource> {
        self.reporter_resources.iter().find(|rr| key.matches(&rr.key))
    }

    /// Change recorded by the last mutation, if any
    pub fn pending_event(&self) -> Option<&ResourceEvent> {
        self.events.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Generation, Representation};
    use serde_json::json;

    fn key() -> ReporterResourceKey {
        ReporterResourceKey::parse("host-1", "host", "hbi", "inst-1").unwrap()
    }

    fn report(workspace: &str) -> ResourceReport {
        ResourceReport {
            api_href: "https://api/host-1".into(),
            console_href: None,
            reporter_version: Some("2.1".into()),
            reporter_data: Representation::from_value(json!({"satellite_id": "s1"})).unwrap(),
            common_data: Representation::from_value(json!({"workspace_id": workspace})).unwrap(),
        }
    }

    fn new_resource() -> Resource {
        Resource::new(
            ResourceId::generate(),
            key(),
            ReporterResourceId::generate(),
            report("ws-1"),
            TransactionId::new("tx-1"),
        )
    }

    #[test]
    fn test_new_resource_starts_at_zero() {
        let resource = new_resource();
        assert_eq!(resource.common_version(), Version::initial());
        assert_eq!(resource.resource_type().as_str(), "host");

        let event = resource.pending_event().unwrap();
        assert_eq!(event.reporter_representation().version, Version::initial());
        assert_eq!(event.transaction_id().as_str(), "tx-1");
        let common = event.common_representation().unwrap();
        assert_eq!(common.data.workspace_id(), "ws-1");
        assert_eq!(common.reported_by_reporter_type.as_str(), "hbi");
    }

    #[test]
    fn test_new_resource_generates_missing_txid() {
        let resource = Resource::new(
            ResourceId::generate(),
            key(),
            ReporterResourceId::generate(),
            report("ws-1"),
            TransactionId::default(),
        );
        assert!(!resource.pending_event().unwrap().transaction_id().is_empty());
    }

    #[test]
    fn test_update_increments_both_versions() {
        let mut resource = new_resource();
        resource
            .update(&key(), report("ws-2"), TransactionId::new("tx-2"))
            .unwrap();

        assert_eq!(resource.common_version(), Version::new(1));
        let event = resource.pending_event().unwrap();
        assert_eq!(event.reporter_representation().version, Version::new(1));
        assert_eq!(event.reporter_representation().common_version, Version::new(1));
        assert_eq!(event.common_representation().unwrap().data.workspace_id(), "ws-2");
    }

    #[test]
    fn test_update_with_unknown_key_fails() {
        let mut resource = new_resource();
        let other = ReporterResourceKey::parse("host-1", "host", "acm", "inst-1").unwrap();
        let err = resource
            .update(&other, report("ws"), TransactionId::new("tx"))
            .unwrap_err();
        assert!(matches!(err, AggregateError::ReporterResourceNotFound(_)));
    }

    #[test]
    fn test_delete_tombstones_and_keeps_common_version() {
        let mut resource = new_resource();
        resource.delete(&key(), TransactionId::new("tx-d")).unwrap();

        assert_eq!(resource.common_version(), Version::initial());
        let event = resource.pending_event().unwrap();
        assert!(event.reporter_representation().tombstone);
        assert!(event.common_representation().is_none());
        assert!(resource.reporter_resource(&key()).unwrap().tombstone);
    }

    #[test]
    fn test_delete_of_tombstoned_is_noop() {
        let mut resource = new_resource();
        resource.delete(&key(), TransactionId::new("tx-d")).unwrap();
        let before = resource.clone();
        resource.delete(&key(), TransactionId::new("tx-d2")).unwrap();
        assert_eq!(resource, before);
    }

    #[test]
    fn test_update_after_delete_revives_new_generation() {
        let mut resource = new_resource();
        resource.delete(&key(), TransactionId::new("tx-d")).unwrap();
        resource
            .update(&key(), report("ws-3"), TransactionId::new("tx-r"))
            .unwrap();

        let rr = resource.reporter_resource(&key()).unwrap();
        assert!(!rr.tombstone);
        assert_eq!(rr.generation, Generation::new(1));
        assert_eq!(rr.representation_version, Version::initial());
        assert_eq!(resource.common_version(), Version::new(1));
    }
}
