// Copyright (c) 2025 - Cowboy AI, Inc.
//! ReporterResource entity: one reporter's claim about a resource

use serde::{Deserialize, Serialize};

use crate::domain::{Generation, ReporterResourceId, ReporterResourceKey, ResourceId, Version};

/// One reporter's row for a resource
///
/// `representation_version` counts snapshots within the current
/// `generation`. A tombstoned row is hidden from lookups; reviving it
/// starts a new generation at version 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReporterResource {
    pub id: ReporterResourceId,
    pub key: ReporterResourceKey,
    pub resource_id: ResourceId,
    pub api_href: String,
    pub console_href: Option<String>,
    pub representation_version: Version,
    pub generation: Generation,
    pub tombstone: bool,
}

impl ReporterResource {
    pub fn new(
        id: ReporterResourceId,
        key: ReporterResourceKey,
        resource_id: ResourceId,
        api_href: impl Into<String>,
        console_href: Option<String>,
    ) -> Self {
        Self {
            id,
            key,
            resource_id,
            api_href: api_href.into(),
            console_href,
            representation_version: Version::initial(),
            generation: Generation::initial(),
            tombstone: false,
        }
    }

    /// Advance to the next snapshot; a tombstoned row is revived instead
    pub(crate) fn update(&mut self, api_href: &str, console_href: Option<String>) {
        if self.tombstone {
            self.generation = self.generation.next();
            self.representation_version = Version::initial();
            self.tombstone = false;
        } else {
            self.representation_version = self.representation_version.next();
        }
        self.api_href = api_href.to_string();
        self.console_href = console_href;
    }

    pub(crate) fn delete(&mut self) {
        self.representation_version = self.representation_version.next();
        self.tombstone = true;
    }
}
