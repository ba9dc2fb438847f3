// Copyright (c) 2025 - Cowboy AI, Inc.
//! Representation Value Objects
//!
//! A representation is an opaque JSON object reported about a resource.
//! Representations are append-only snapshots addressed by version:
//!
//! - [`ReporterRepresentation`] holds reporter-specific fields and is
//!   versioned per reporter resource and generation.
//! - [`CommonRepresentation`] holds reporter-agnostic fields (notably
//!   `workspace_id`) and is versioned per resource.
//! - [`Representations`] is the read-side pairing of a common and/or
//!   reporter snapshot used by the tuple diff.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::ids::{Generation, ReporterResourceId, ResourceId, TransactionId, Version};
use super::keys::{ReporterInstanceId, ReporterType};

/// Key of the common field that carries workspace membership
pub const WORKSPACE_ID_FIELD: &str = "workspace_id";

/// Opaque JSON document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Representation(Map<String, Value>);

impl Representation {
    pub fn new(data: Map<String, Value>) -> Self {
        Self(data)
    }

    pub fn empty() -> Self {
        Self(Map::new())
    }

    /// Build from any JSON value; non-objects yield `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::empty()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// `workspace_id` as a string, or `""` when absent or not a string
    pub fn workspace_id(&self) -> &str {
        self.0
            .get(WORKSPACE_ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Representation {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Reporter-specific snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterRepresentation {
    pub reporter_resource_id: ReporterResourceId,
    pub data: Representation,
    pub version: Version,
    pub generation: Generation,
    /// Reporter's own software version, if it sent one
    pub reporter_version: Option<String>,
    /// Common version current when this snapshot was taken
    pub common_version: Version,
    pub transaction_id: TransactionId,
    pub tombstone: bool,
}

impl ReporterRepresentation {
    /// Snapshot produced by a report
    pub fn reported(
        reporter_resource_id: ReporterResourceId,
        version: Version,
        generation: Generation,
        data: Representation,
        common_version: Version,
        reporter_version: Option<String>,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            reporter_resource_id,
            data,
            version,
            generation,
            reporter_version,
            common_version,
            transaction_id,
            tombstone: false,
        }
    }

    /// Tombstone snapshot produced by a delete
    pub fn deleted(
        reporter_resource_id: ReporterResourceId,
        version: Version,
        generation: Generation,
        common_version: Version,
        transaction_id: TransactionId,
    ) -> Self {
        Self {
            reporter_resource_id,
            data: Representation::empty(),
            version,
            generation,
            reporter_version: None,
            common_version,
            transaction_id,
            tombstone: true,
        }
    }
}

/// Reporter-agnostic snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonRepresentation {
    pub resource_id: ResourceId,
    pub data: Representation,
    pub version: Version,
    pub reported_by_reporter_type: ReporterType,
    pub reported_by_reporter_instance: ReporterInstanceId,
    pub transaction_id: TransactionId,
}

/// Errors constructing a [`Representations`] pairing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepresentationsError {
    #[error("at least one of common or reporter representation must be present")]
    Missing,

    #[error("common data and common version must both be present or both be absent")]
    CommonMismatch,

    #[error("reporter data and reporter representation version must both be present or both be absent")]
    ReporterMismatch,
}

/// Common and/or reporter snapshot at a given version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Representations {
    common_data: Option<Representation>,
    common_version: Option<Version>,
    reporter_data: Option<Representation>,
    reporter_version: Option<Version>,
}

impl Representations {
    /// Data counts as present only when non-empty; each side needs its data
    /// and version together and at least one side must be present
    pub fn new(
        common_data: Option<Representation>,
        common_version: Option<Version>,
        reporter_data: Option<Representation>,
        reporter_version: Option<Version>,
    ) -> Result<Self, RepresentationsError> {
        let common_data = common_data.filter(|d| !d.is_empty());
        let reporter_data = reporter_data.filter(|d| !d.is_empty());

        if common_data.is_some() != common_version.is_some() {
            return Err(RepresentationsError::CommonMismatch);
        }
        if reporter_data.is_some() != reporter_version.is_some() {
            return Err(RepresentationsError::ReporterMismatch);
        }
        if common_data.is_none() && reporter_data.is_none() {
            return Err(RepresentationsError::Missing);
        }

        Ok(Self {
            common_data,
            common_version,
            reporter_data,
            reporter_version,
        })
    }

    /// Common-only pairing, the shape the tuple diff reads
    pub fn common(data: Representation, version: Version) -> Result<Self, RepresentationsError> {
        Self::new(Some(data), Some(version), None, None)
    }

    pub fn common_data(&self) -> Option<&Representation> {
        self.common_data.as_ref()
    }

    pub fn common_version(&self) -> Option<Version> {
        self.common_version
    }

    pub fn reporter_data(&self) -> Option<&Representation> {
        self.reporter_data.as_ref()
    }

    pub fn reporter_version(&self) -> Option<Version> {
        self.reporter_version
    }

    pub fn has_common(&self) -> bool {
        self.common_data.is_some()
    }

    /// Workspace of the common side, or `""`
    pub fn workspace_id(&self) -> &str {
        self.common_data
            .as_ref()
            .map(Representation::workspace_id)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Representation {
        Representation::from_value(value).unwrap()
    }

    #[test]
    fn test_workspace_id_accessor() {
        assert_eq!(doc(json!({"workspace_id": "ws-1"})).workspace_id(), "ws-1");
        assert_eq!(doc(json!({"workspace_id": 42})).workspace_id(), "");
        assert_eq!(doc(json!({})).workspace_id(), "");
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Representation::from_value(json!([1, 2])).is_none());
        assert_eq!(Representation::from_value(Value::Null), Some(Representation::empty()));
    }

    #[test]
    fn test_representations_require_one_side() {
        assert_eq!(
            Representations::new(None, None, None, None),
            Err(RepresentationsError::Missing)
        );
        assert_eq!(
            Representations::new(Some(Representation::empty()), Some(Version::new(1)), None, None),
            Err(RepresentationsError::CommonMismatch)
        );
    }

    #[test]
    fn test_representations_require_paired_version() {
        let data = doc(json!({"workspace_id": "ws"}));
        assert_eq!(
            Representations::new(Some(data.clone()), None, None, None),
            Err(RepresentationsError::CommonMismatch)
        );
        assert_eq!(
            Representations::new(Some(data.clone()), Some(Version::new(1)), Some(data.clone()), None),
            Err(RepresentationsError::ReporterMismatch)
        );

        let reps = Representations::common(data, Version::new(3)).unwrap();
        assert!(reps.has_common());
        assert_eq!(reps.common_version(), Some(Version::new(3)));
        assert_eq!(reps.workspace_id(), "ws");
    }

    #[test]
    fn test_deleted_reporter_representation() {
        let rep = ReporterRepresentation::deleted(
            ReporterResourceId::generate(),
            Version::new(2),
            Generation::initial(),
            Version::new(1),
            TransactionId::new("tx"),
        );
        assert!(rep.tombstone);
        assert!(rep.data.is_empty());
    }
}
