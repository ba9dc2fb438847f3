// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reporter Resource Key Value Objects
//!
//! A reporter's claim about a resource is addressed by the natural key
//! `(local_resource_id, resource_type, reporter_type, reporter_instance_id)`.
//!
//! # Normalization
//!
//! - `ResourceType` and `ReporterType` are lower-cased on construction.
//! - `LocalResourceId` and `ReporterInstanceId` keep the reporter's casing
//!   (the local id flows into relation tuples verbatim) and are compared
//!   case-insensitively.
//! - An empty `ReporterInstanceId` is a lookup wildcard and never stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Key construction error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("{0} is required")]
    Empty(&'static str),

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },
}

fn validated(field: &'static str, value: String, max: usize) -> Result<String, KeyError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(KeyError::Empty(field));
    }
    if value.len() > max {
        return Err(KeyError::TooLong { field, max });
    }
    Ok(value)
}

/// Identifier of the resource inside the reporting system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalResourceId(String);

impl LocalResourceId {
    pub const MAX_LENGTH: usize = 256;

    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        validated("local_resource_id", value.into(), Self::MAX_LENGTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of resource, e.g. `host` or `k8s_cluster`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub const MAX_LENGTH: usize = 128;

    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        validated("resource_type", value.into(), Self::MAX_LENGTH).map(|v| Self(v.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of reporting system, e.g. `hbi` or `acm`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReporterType(String);

impl ReporterType {
    pub const MAX_LENGTH: usize = 128;

    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        validated("reporter_type", value.into(), Self::MAX_LENGTH).map(|v| Self(v.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Instance of a reporting system; empty means "any instance" in lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReporterInstanceId(String);

impl ReporterInstanceId {
    pub const MAX_LENGTH: usize = 256;

    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        validated("reporter_instance_id", value.into(), Self::MAX_LENGTH).map(Self)
    }

    /// Wildcard instance used by lookups that do not care which instance reported
    pub fn any() -> Self {
        Self(String::new())
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_as_str!(LocalResourceId, ResourceType, ReporterType, ReporterInstanceId);

/// Natural key of one reporter's claim about one resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReporterResourceKey {
    pub local_resource_id: LocalResourceId,
    pub resource_type: ResourceType,
    pub reporter_type: ReporterType,
    pub reporter_instance_id: ReporterInstanceId,
}

impl ReporterResourceKey {
    pub fn new(
        local_resource_id: LocalResourceId,
        resource_type: ResourceType,
        reporter_type: ReporterType,
        reporter_instance_id: ReporterInstanceId,
    ) -> Self {
        Self {
            local_resource_id,
            resource_type,
            reporter_type,
            reporter_instance_id,
        }
    }

    /// Build a key from raw strings; an empty instance id yields the wildcard
    pub fn parse(
        local_resource_id: &str,
        resource_type: &str,
        reporter_type: &str,
        reporter_instance_id: &str,
    ) -> Result<Self, KeyError> {
        let instance = if reporter_instance_id.trim().is_empty() {
            ReporterInstanceId::any()
        } else {
            ReporterInstanceId::new(reporter_instance_id)?
        };
        Ok(Self::new(
            LocalResourceId::new(local_resource_id)?,
            ResourceType::new(resource_type)?,
            ReporterType::new(reporter_type)?,
            instance,
        ))
    }

    /// Case-insensitive match used for lookup; a wildcard instance on either
    /// side matches any instance
    pub fn matches(&self, other: &ReporterResourceKey) -> bool {
        self.local_resource_id
            .as_str()
            .eq_ignore_ascii_case(other.local_resource_id.as_str())
            && self.resource_type == other.resource_type
            && self.reporter_type == other.reporter_type
            && (self.reporter_instance_id.is_any()
                || other.reporter_instance_id.is_any()
                || self
                    .reporter_instance_id
                    .as_str()
                    .eq_ignore_ascii_case(other.reporter_instance_id.as_str()))
    }

    /// Lower-cased `local|resource|reporter|instance` form
    pub fn normalized(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.local_resource_id.as_str().to_lowercase(),
            self.resource_type,
            self.reporter_type,
            self.reporter_instance_id.as_str().to_lowercase()
        )
    }
}

impl fmt::Display for ReporterResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{}@{}",
            self.resource_type, self.local_resource_id, self.reporter_type, self.reporter_instance_id
        )
    }
}
