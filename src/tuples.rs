// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relation Tuples
//!
//! Workspace membership is the only authorization fact derived from a
//! resource. A change of the common representation's `workspace_id` turns
//! into tuple mutations for the relations service:
//!
//! ```text
//! hbi/host:host-1 #workspace @ rbac/workspace:ws-1
//! └ resource ──┘  └relation┘  └ subject ───────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{ReporterResourceKey, Representations};

/// Relation written for workspace membership
pub const WORKSPACE_RELATION: &str = "workspace";
/// Namespace of workspace subjects
pub const RBAC_NAMESPACE: &str = "rbac";
/// Type name of workspace subjects
pub const WORKSPACE_TYPE: &str = "workspace";

/// `namespace/name` pair naming an object type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectType {
    pub namespace: String,
    pub name: String,
}

/// Typed object id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub object_type: ObjectType,
    pub id: String,
}

impl ObjectReference {
    /// Resource side of a tuple: `lower(reporter_type)/lower(resource_type):local_id`
    pub fn resource(key: &ReporterResourceKey) -> Self {
        Self {
            object_type: ObjectType {
                namespace: key.reporter_type.as_str().to_lowercase(),
                name: key.resource_type.as_str().to_lowercase(),
            },
            id: key.local_resource_id.as_str().to_string(),
        }
    }

    /// Subject side of a workspace tuple: `rbac/workspace:<id>`
    pub fn workspace(workspace_id: &str) -> Self {
        Self {
            object_type: ObjectType {
                namespace: RBAC_NAMESPACE.to_string(),
                name: WORKSPACE_TYPE.to_string(),
            },
            id: workspace_id.to_string(),
        }
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}",
            self.object_type.namespace, self.object_type.name, self.id
        )
    }
}

/// `(resource, relation, subject)` fact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationsTuple {
    pub resource: ObjectReference,
    pub relation: String,
    pub subject: ObjectReference,
}

impl RelationsTuple {
    pub fn workspace(key: &ReporterResourceKey, workspace_id: &str) -> Self {
        Self {
            resource: ObjectReference::resource(key),
            relation: WORKSPACE_RELATION.to_string(),
            subject: ObjectReference::workspace(workspace_id),
        }
    }
}

impl fmt::Display for RelationsTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.resource, self.relation, self.subject)
    }
}

/// Tuple mutations produced by one write
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TuplesToReplicate {
    #[serde(default)]
    pub tuples_to_create: Vec<RelationsTuple>,
    #[serde(default)]
    pub tuples_to_delete: Vec<RelationsTuple>,
}

impl TuplesToReplicate {
    pub fn is_empty(&self) -> bool {
        self.tuples_to_create.is_empty() && self.tuples_to_delete.is_empty()
    }
}

/// Diff workspace membership between two snapshots.
///
/// `current == None` is a delete and `previous == None` a create.
pub fn calculate_tuples(
    current: Option<&Representations>,
    previous: Option<&Representations>,
    key: &ReporterResourceKey,
) -> TuplesToReplicate {
    let current_workspace = current.map(Representations::workspace_id).unwrap_or("");
    let previous_workspace = previous.map(Representations::workspace_id).unwrap_or("");

    let mut tuples = TuplesToReplicate::default();
    if !previous_workspace.is_empty() && previous_workspace == current_workspace {
        return tuples;
    }
    if !current_workspace.is_empty() {
        tuples
            .tuples_to_create
            .push(RelationsTuple::workspace(key, current_workspace));
    }
    if !previous_workspace.is_empty() {
        tuples
            .tuples_to_delete
            .push(RelationsTuple::workspace(key, previous_workspace));
    }
    tuples
}
