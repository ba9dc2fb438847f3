// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Monotonic Versioning
//!
//! A small reference model predicts the `(generation, version, tombstone)`
//! snapshot each command appends and the resulting common version; the
//! service running against the in-memory store must agree with it.

use proptest::prelude::*;

use cim_inventory::service::{ResourceService, ServiceError};
use cim_inventory::store::Store;
use cim_inventory::InventoryConfig;

use crate::fixtures::*;

#[derive(Debug, Clone)]
enum Command {
    Report(u8),
    Delete,
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        3 => (0u8..3).prop_map(Command::Report),
        1 => Just(Command::Delete),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Model {
    Absent,
    Active { generation: u64, version: u64 },
    Tombstoned { generation: u64, version: u64 },
}

/// Expected snapshots and final common version, or `None` for not found
struct Expectation {
    history: Vec<(u64, u64, bool)>,
    common_version: Option<u64>,
    deletes_not_found: usize,
}

fn expect(commands: &[Command]) -> Expectation {
    let mut model = Model::Absent;
    let mut history = Vec::new();
    let mut common_version: Option<u64> = None;
    let mut deletes_not_found = 0;

    for command in commands {
        model = match (command, model) {
            (Command::Report(_), Model::Absent) => {
                common_version = Some(0);
                history.push((0, 0, false));
                Model::Active { generation: 0, version: 0 }
            }
            (Command::Report(_), Model::Active { generation, version }) => {
                common_version = common_version.map(|v| v + 1);
                history.push((generation, version + 1, false));
                Model::Active { generation, version: version + 1 }
            }
            (Command::Report(_), Model::Tombstoned { generation, .. }) => {
                common_version = common_version.map(|v| v + 1);
                history.push((generation + 1, 0, false));
                Model::Active { generation: generation + 1, version: 0 }
            }
            (Command::Delete, Model::Active { generation, version }) => {
                history.push((generation, version + 1, true));
                Model::Tombstoned { generation, version: version + 1 }
            }
            (Command::Delete, unchanged) => {
                deletes_not_found += 1;
                unchanged
            }
        };
    }

    Expectation {
        history,
        common_version,
        deletes_not_found,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_versions_follow_model(commands in prop::collection::vec(command_strategy(), 1..24)) {
        let expected = expect(&commands);

        let (history, common_version, deletes_not_found) = tokio_test::block_on(async {
            let harness = Harness::new(&InventoryConfig::default());
            let mut deletes_not_found = 0;
            for command in &commands {
                match command {
                    Command::Report(workspace) => {
                        harness
                            .service
                            .report_resource(report(&format!("workspace-{workspace}")))
                            .await
                            .unwrap();
                    }
                    Command::Delete => match harness.service.delete_resource(delete()).await {
                        Ok(_) => {}
                        Err(ServiceError::NotFound(_)) => deletes_not_found += 1,
                        Err(other) => panic!("unexpected delete failure: {other}"),
                    },
                }
            }

            let history: Vec<(u64, u64, bool)> = harness
                .store
                .reporter_history(&key())
                .await
                .iter()
                .map(|s| (s.generation.value(), s.version.value(), s.tombstone))
                .collect();

            let mut tx = harness.store.begin().await.unwrap();
            let repo = tx.repository();
            let resource = match repo.find_resource_by_keys(&key()).await {
                Ok(resource) => Some(resource),
                Err(err) if err.is_not_found() => {
                    repo.find_tombstoned_resource_by_keys(&key()).await.unwrap()
                }
                Err(err) => panic!("lookup failed: {err}"),
            };
            (
                history,
                resource.map(|r| r.common_version().value()),
                deletes_not_found,
            )
        });

        prop_assert_eq!(history, expected.history);
        prop_assert_eq!(common_version, expected.common_version);
        prop_assert_eq!(deletes_not_found, expected.deletes_not_found);
    }

    #[test]
    fn prop_versions_never_repeat_within_generation(commands in prop::collection::vec(command_strategy(), 1..24)) {
        let history = expect(&commands).history;
        for pair in history.windows(2) {
            let (g0, v0, _) = pair[0];
            let (g1, v1, _) = pair[1];
            if g0 == g1 {
                prop_assert_eq!(v1, v0 + 1);
            } else {
                prop_assert_eq!((g1, v1), (g0 + 1, 0));
            }
        }
    }
}
