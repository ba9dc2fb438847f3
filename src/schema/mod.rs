// Copyright (c) 2025 - Cowboy AI, Inc.
//! Schema Service
//!
//! Shallow validation of reported documents against registered schemas,
//! and the entry point for tuple calculation per resource type.
//!
//! # Rules
//!
//! - a reporter may only report resource types it is declared for
//! - the common representation must satisfy the resource type's schema
//! - a reporter without a schema may only send an empty representation
//!   (abstract reporter representation)

pub mod repository;
pub mod validator;

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::domain::{ReporterResourceKey, ReporterType, Representation, Representations, ResourceType};
use crate::tuples::{calculate_tuples, TuplesToReplicate};

pub use repository::{InMemorySchemaRepository, ReporterSchema, ResourceSchema, SchemaRepository};
pub use validator::{FieldType, RequiredFieldsValidator, SchemaValidator};

/// Schema lookup and validation failures; all are client-visible
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("resource schema not found for '{0}'")]
    ResourceSchemaNotFound(String),

    #[error("reporter schema not found for '{0}:{1}'")]
    ReporterSchemaNotFound(String, String),

    #[error("no schema found for '{0}'")]
    NoSchema(String),

    #[error("no schema found for '{0}:{1}', but reporter representation was provided. Submission is not allowed")]
    AbstractReporterWithData(String, String),

    #[error("missing 'common' field in payload - schema for '{0}' has required fields: {1}")]
    MissingCommon(String, String),

    #[error("missing 'reporter' field in payload - schema for '{0}:{1}' has required fields: {2}")]
    MissingReporter(String, String, String),

    #[error("{0}")]
    Invalid(String),
}

/// Validation front door used by the write path
#[derive(Clone)]
pub struct SchemaService {
    repository: Arc<dyn SchemaRepository>,
}

impl SchemaService {
    pub fn new(repository: Arc<dyn SchemaRepository>) -> Self {
        Self { repository }
    }

    /// Unknown resource or reporter type yields `false`
    pub fn is_reporter_for_resource(&self, resource_type: &ResourceType, reporter_type: &ReporterType) -> bool {
        self.repository
            .reporter_schema(resource_type, reporter_type)
            .is_ok()
    }

    pub fn common_shallow_validate(
        &self,
        resource_type: &ResourceType,
        common: &Representation,
    ) -> Result<(), SchemaError> {
        let schema = self.repository.resource_schema(resource_type)?;
        let validator = schema
            .validator
            .ok_or_else(|| SchemaError::NoSchema(resource_type.to_string()))?;

        validator.validate(common.as_map()).map_err(|reason| {
            if common.is_empty() {
                SchemaError::MissingCommon(resource_type.to_string(), reason)
            } else {
                SchemaError::Invalid(reason)
            }
        })
    }

    pub fn reporter_shallow_validate(
        &self,
        resource_type: &ResourceType,
        reporter_type: &ReporterType,
        reporter: &Representation,
    ) -> Result<(), SchemaError> {
        let schema = self.repository.reporter_schema(resource_type, reporter_type)?;
        let Some(validator) = schema.validator else {
            if !reporter.is_empty() {
                return Err(SchemaError::AbstractReporterWithData(
                    resource_type.to_string(),
                    reporter_type.to_string(),
                ));
            }
            debug!(%resource_type, %reporter_type, "no reporter schema, treating as abstract representation");
            return Ok(());
        };

        validator.validate(reporter.as_map()).map_err(|reason| {
            if reporter.is_empty() {
                SchemaError::MissingReporter(
                    resource_type.to_string(),
                    reporter_type.to_string(),
                    reason,
                )
            } else {
                SchemaError::Invalid(reason)
            }
        })
    }

    /// Tuples for a change, using the resource type's validator when it has one
    pub fn calculate_tuples_for_resource(
        &self,
        current: Option<&Representations>,
        previous: Option<&Representations>,
        key: &ReporterResourceKey,
    ) -> TuplesToReplicate {
        match self.repository.resource_schema(&key.resource_type) {
            Ok(ResourceSchema {
                validator: Some(validator),
                ..
            }) => validator.calculate_tuples(current, previous, key),
            _ => calculate_tuples(current, previous, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> SchemaService {
        let host = ResourceType::new("host").unwrap();
        let repo = InMemorySchemaRepository::new()
            .with_resource(
                host.clone(),
                Some(Arc::new(
                    RequiredFieldsValidator::new().require("workspace_id", FieldType::String),
                )),
            )
            .with_reporter(
                host.clone(),
                ReporterType::new("hbi").unwrap(),
                Some(Arc::new(
                    RequiredFieldsValidator::new().require("satellite_id", FieldType::String),
                )),
            )
            .with_reporter(host, ReporterType::new("abstract").unwrap(), None)
            .with_resource(ResourceType::new("policy").unwrap(), None);
        SchemaService::new(Arc::new(repo))
    }

    fn doc(value: serde_json::Value) -> Representation {
        Representation::from_value(value).unwrap()
    }

    fn rt(s: &str) -> ResourceType {
        ResourceType::new(s).unwrap()
    }

    fn rp(s: &str) -> ReporterType {
        ReporterType::new(s).unwrap()
    }

    #[test]
    fn test_is_reporter_for_resource() {
        let svc = service();
        assert!(svc.is_reporter_for_resource(&rt("host"), &rp("hbi")));
        assert!(svc.is_reporter_for_resource(&rt("HOST"), &rp("HBI")));
        assert!(!svc.is_reporter_for_resource(&rt("host"), &rp("acm")));
        assert!(!svc.is_reporter_for_resource(&rt("cluster"), &rp("hbi")));
    }

    #[test]
    fn test_common_validation() {
        let svc = service();
        assert!(svc
            .common_shallow_validate(&rt("host"), &doc(json!({"workspace_id": "ws"})))
            .is_ok());
        assert!(matches!(
            svc.common_shallow_validate(&rt("host"), &Representation::empty()),
            Err(SchemaError::MissingCommon(_, _))
        ));
        assert!(matches!(
            svc.common_shallow_validate(&rt("host"), &doc(json!({"workspace_id": 3}))),
            Err(SchemaError::Invalid(_))
        ));
        assert_eq!(
            svc.common_shallow_validate(&rt("policy"), &doc(json!({}))),
            Err(SchemaError::NoSchema("policy".into()))
        );
    }

    #[test]
    fn test_reporter_validation() {
        let svc = service();
        assert!(svc
            .reporter_shallow_validate(&rt("host"), &rp("hbi"), &doc(json!({"satellite_id": "s"})))
            .is_ok());
        assert!(matches!(
            svc.reporter_shallow_validate(&rt("host"), &rp("hbi"), &Representation::empty()),
            Err(SchemaError::MissingReporter(_, _, _))
        ));
    }

    #[test]
    fn test_abstract_reporter() {
        let svc = service();
        assert!(svc
            .reporter_shallow_validate(&rt("host"), &rp("abstract"), &Representation::empty())
            .is_ok());
        assert!(matches!(
            svc.reporter_shallow_validate(&rt("host"), &rp("abstract"), &doc(json!({"x": 1}))),
            Err(SchemaError::AbstractReporterWithData(_, _))
        ));
    }
}
