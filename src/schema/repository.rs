// Copyright (c) 2025 - Cowboy AI, Inc.
//! Schema registry

use std::collections::HashMap;
use std::sync::Arc;

use super::validator::SchemaValidator;
use super::SchemaError;
use crate::domain::{ReporterType, ResourceType};

/// Common schema of a resource type
#[derive(Clone)]
pub struct ResourceSchema {
    pub resource_type: ResourceType,
    pub validator: Option<Arc<dyn SchemaValidator>>,
}

/// Reporter schema of a `(resource type, reporter type)` pair
#[derive(Clone)]
pub struct ReporterSchema {
    pub resource_type: ResourceType,
    pub reporter_type: ReporterType,
    /// `None` marks an abstract reporter representation
    pub validator: Option<Arc<dyn SchemaValidator>>,
}

/// Lookup of registered schemas
pub trait SchemaRepository: Send + Sync {
    fn resource_schema(&self, resource_type: &ResourceType) -> Result<ResourceSchema, SchemaError>;

    fn reporter_schema(
        &self,
        resource_type: &ResourceType,
        reporter_type: &ReporterType,
    ) -> Result<ReporterSchema, SchemaError>;
}

#[derive(Clone, Default)]
struct ResourceEntry {
    validator: Option<Arc<dyn SchemaValidator>>,
    reporters: HashMap<ReporterType, Option<Arc<dyn SchemaValidator>>>,
}

/// Schemas registered at startup
#[derive(Clone, Default)]
pub struct InMemorySchemaRepository {
    resources: HashMap<ResourceType, ResourceEntry>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the common schema of a resource type
    pub fn with_resource(
        mut self,
        resource_type: ResourceType,
        validator: Option<Arc<dyn SchemaValidator>>,
    ) -> Self {
        self.resources.entry(resource_type).or_default().validator = validator;
        self
    }

    /// Declare `reporter_type` as a reporter of `resource_type`
    pub fn with_reporter(
        mut self,
        resource_type: ResourceType,
        reporter_type: ReporterType,
        validator: Option<Arc<dyn SchemaValidator>>,
    ) -> Self {
        self.resources
            .entry(resource_type)
            .or_default()
            .reporters
            .insert(reporter_type, validator);
        self
    }
}

impl SchemaRepository for InMemorySchemaRepository {
    fn resource_schema(&self, resource_type: &ResourceType) -> Result<ResourceSchema, SchemaError> {
        self.resources
            .get(resource_type)
            .map(|entry| ResourceSchema {
                resource_type: resource_type.clone(),
                validator: entry.validator.clone(),
            })
            .ok_or_else(|| SchemaError::ResourceSchemaNotFound(resource_type.to_string()))
    }

    fn reporter_schema(
        &self,
        resource_type: &ResourceType,
        reporter_type: &ReporterType,
    ) -> Result<ReporterSchema, SchemaError> {
        let entry = self
            .resources
            .get(resource_type)
            .ok_or_else(|| SchemaError::ResourceSchemaNotFound(resource_type.to_string()))?;
        let validator = entry.reporters.get(reporter_type).ok_or_else(|| {
            SchemaError::ReporterSchemaNotFound(resource_type.to_string(), reporter_type.to_string())
        })?;
        Ok(ReporterSchema {
            resource_type: resource_type.clone(),
            reporter_type: reporter_type.clone(),
            validator: validator.clone(),
        })
    }
}
