// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber
///
/// The filter comes from `RUST_LOG`; `default_directive` (for example
/// `"info"` or `"cim_inventory=debug"`) is added on top. Calling this more
/// than once is harmless: later calls leave the first subscriber in place
/// and return `false`.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = match default_directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
