// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory relations service

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::RelationsReplicator;
use crate::domain::ConsistencyToken;
use crate::errors::{InventoryError, InventoryResult};
use crate::tuples::RelationsTuple;

#[derive(Debug, Default)]
struct State {
    tuples: HashSet<RelationsTuple>,
    revision: u64,
    mutations: u64,
    failures: u32,
}

/// Tuple set with a revision counter; each mutation returns `ktn-<revision>`
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelations {
    state: Arc<Mutex<State>>,
}

impl InMemoryRelations {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the next `n` mutations
    pub fn fail_next(&self, n: u32) {
        self.lock().failures = n;
    }

    /// Seed a tuple without counting a mutation
    pub fn insert(&self, tuple: RelationsTuple) {
        self.lock().tuples.insert(tuple);
    }

    pub fn contains(&self, tuple: &RelationsTuple) -> bool {
        self.lock().tuples.contains(tuple)
    }

    pub fn tuples(&self) -> Vec<RelationsTuple> {
        self.lock().tuples.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tuples.is_empty()
    }

    /// Successful `replicate_tuples` calls
    pub fn mutations(&self) -> u64 {
        self.lock().mutations
    }
}

#[async_trait]
impl RelationsReplicator for InMemoryRelations {
    async fn replicate_tuples(
        &self,
        creates: &[RelationsTuple],
        deletes: &[RelationsTuple],
    ) -> InventoryResult<ConsistencyToken> {
        let mut state = self.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(InventoryError::Replication("relations service unavailable".into()));
        }
        state.tuples.extend(creates.iter().cloned());
        for tuple in deletes {
            state.tuples.remove(tuple);
        }
        state.revision += 1;
        state.mutations += 1;
        Ok(ConsistencyToken::new(format!("ktn-{}", state.revision)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReporterResourceKey;

    fn tuple(ws: &str) -> RelationsTuple {
        RelationsTuple::workspace(
            &ReporterResourceKey::parse("h1", "host", "hbi", "i1").unwrap(),
            ws,
        )
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let relations = InMemoryRelations::new();
        let token = relations.replicate_tuples(&[tuple("a")], &[]).await.unwrap();
        assert_eq!(token.as_str(), "ktn-1");
        relations
            .replicate_tuples(&[tuple("b")], &[tuple("a")])
            .await
            .unwrap();
        assert_eq!(relations.tuples(), vec![tuple("b")]);
        assert_eq!(relations.mutations(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let relations = InMemoryRelations::new();
        relations.fail_next(1);
        assert!(relations.replicate_tuples(&[tuple("a")], &[]).await.is_err());
        assert!(relations.replicate_tuples(&[tuple("a")], &[]).await.is_ok());
    }
}
