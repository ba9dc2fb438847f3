// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Entry Point
//!
//! This test suite uses proptest to verify version bookkeeping over
//! arbitrary sequences of reports and deletes.

mod fixtures;
mod property;
