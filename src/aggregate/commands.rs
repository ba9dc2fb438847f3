// Copyright (c) 2025 - Cowboy AI, Inc.
//! Write Commands
//!
//! Commands express a reporter's intent. They arrive already parsed by the
//! transport layer and are validated by the service before any transaction
//! is opened.

use serde::{Deserialize, Serialize};

use crate::domain::{Representation, ReporterResourceKey};

/// Caller-requested visibility of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteVisibility {
    #[default]
    Unspecified,
    MinimizeLatency,
    /// Wait for the write to be replicated before returning
    Consistent,
}

/// Report (create or update) one reporter's view of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResourceCommand {
    pub key: ReporterResourceKey,
    pub api_href: String,
    pub console_href: Option<String>,
    pub reporter_version: Option<String>,
    pub reporter_representation: Representation,
    pub common_representation: Representation,
    /// Client-supplied idempotency key
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub write_visibility: WriteVisibility,
    /// Identity of the calling reporter, checked against the read-after-write allowlist
    pub reporter_principal: String,
}

/// Tombstone one reporter's view of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResourceCommand {
    pub key: ReporterResourceKey,
    pub reporter_principal: String,
}

/// Payload shared by create and update
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub api_href: String,
    pub console_href: Option<String>,
    pub reporter_version: Option<String>,
    pub reporter_data: Representation,
    pub common_data: Representation,
}

impl From<&ReportResourceCommand> for ResourceReport {
    fn from(command: &ReportResourceCommand) -> Self {
        Self {
            api_href: command.api_href.clone(),
            console_href: command.console_href.clone(),
            reporter_version: command.reporter_version.clone(),
            reporter_data: command.reporter_representation.clone(),
            common_data: command.common_representation.clone(),
        }
    }
}
