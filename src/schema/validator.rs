// Copyright (c) 2025 - Cowboy AI, Inc.
//! Representation validators
//!
//! JSON-Schema evaluation is pluggable through [`SchemaValidator`]. The
//! in-tree [`RequiredFieldsValidator`] covers the shallow checks the write
//! path needs: required keys and their JSON types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::{ReporterResourceKey, Representations};
use crate::tuples::{calculate_tuples, TuplesToReplicate};

/// Validates one representation document
pub trait SchemaValidator: Send + Sync {
    /// Check `data`, returning a human readable reason on failure
    fn validate(&self, data: &serde_json::Map<String, Value>) -> Result<(), String>;

    /// Tuples implied by a representation change
    fn calculate_tuples(
        &self,
        current: Option<&Representations>,
        previous: Option<&Representations>,
        key: &ReporterResourceKey,
    ) -> TuplesToReplicate {
        calculate_tuples(current, previous, key)
    }
}

/// JSON type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Any => true,
        }
    }
}

/// Required/optional keys with type checks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredFieldsValidator {
    required: BTreeMap<String, FieldType>,
    optional: BTreeMap<String, FieldType>,
}

impl RequiredFieldsValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.required.insert(field.into(), field_type);
        self
    }

    pub fn optional(mut self, field: impl Into<String>, field_type: FieldType) -> Self {
        self.optional.insert(field.into(), field_type);
        self
    }
}

impl SchemaValidator for RequiredFieldsValidator {
    fn validate(&self, data: &serde_json::Map<String, Value>) -> Result<(), String> {
        for (field, field_type) in &self.required {
            match data.get(field) {
                None | Some(Value::Null) => return Err(format!("'{field}' is required")),
                Some(value) if !field_type.accepts(value) => {
                    return Err(format!("'{field}' must be of type {field_type:?}"))
                }
                Some(_) => {}
            }
        }
        for (field, field_type) in &self.optional {
            if let Some(value) = data.get(field) {
                if !value.is_null() && !field_type.accepts(value) {
                    return Err(format!("'{field}' must be of type {field_type:?}"));
                }
            }
        }
        Ok(())
    }
}
