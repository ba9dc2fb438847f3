// Copyright (c) 2025 - Cowboy AI, Inc.
//! Postgres Store
//!
//! Every transaction runs at `SERIALIZABLE`; conflicting writers surface
//! as SQLSTATE `40001` on a statement or on commit, which the
//! [`crate::transaction::TransactionManager`] retries.
//!
//! All SQL is runtime-checked (`sqlx::query`) so building the crate does
//! not need a live database.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::migrations::run_migrations;
use super::{change_tuples, previous_common_version, ResourceRepository, Store, Tx};
use crate::aggregate::{ReporterResource, Resource};
use crate::config::DatabaseConfig;
use crate::domain::{
    ConsistencyToken, Generation, LocalResourceId, ReporterInstanceId, ReporterResourceId,
    ReporterResourceKey, ReporterType, Representation, Representations, ResourceId, ResourceType,
    TransactionId, Version,
};
use crate::errors::{InventoryError, InventoryResult};
use crate::events::{OperationType, OutboxEvent};

const SET_SERIALIZABLE: &str = "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE";

/// Matches `$1..$4` against a reporter resource key; empty `$4` is any instance
const KEY_PREDICATE: &str = "lower(local_resource_id) = lower($1) \
     AND resource_type = $2 \
     AND reporter_type = $3 \
     AND ($4 = '' OR lower(reporter_instance_id) = lower($4))";

const REPORTER_RESOURCE_COLUMNS: &str = "id, local_resource_id, resource_type, reporter_type, \
     reporter_instance_id, resource_id, api_href, console_href, representation_version, \
     generation, tombstone";

fn to_db(value: u64) -> InventoryResult<i64> {
    i64::try_from(value).map_err(|_| InventoryError::Generic(format!("counter {value} out of range")))
}

fn from_db(value: i64) -> InventoryResult<u64> {
    u64::try_from(value).map_err(|_| InventoryError::Generic(format!("negative counter {value}")))
}

fn reporter_resource_from_row(row: &PgRow) -> InventoryResult<ReporterResource> {
    let instance: String = row.try_get("reporter_instance_id")?;
    let key = ReporterResourceKey::new(
        LocalResourceId::new(row.try_get::<String, _>("local_resource_id")?)?,
        ResourceType::new(row.try_get::<String, _>("resource_type")?)?,
        ReporterType::new(row.try_get::<String, _>("reporter_type")?)?,
        ReporterInstanceId::new(instance)?,
    );
    Ok(ReporterResource {
        id: ReporterResourceId::from_uuid(row.try_get::<Uuid, _>("id")?),
        key,
        resource_id: ResourceId::from_uuid(row.try_get::<Uuid, _>("resource_id")?),
        api_href: row.try_get("api_href")?,
        console_href: row.try_get("console_href")?,
        representation_version: Version::new(from_db(row.try_get("representation_version")?)?),
        generation: Generation::new(from_db(row.try_get("generation")?)?),
        tombstone: row.try_get("tombstone")?,
    })
}

fn common_from_row(row: &PgRow) -> InventoryResult<(Representation, Version)> {
    let data: Option<Value> = row.try_get("data")?;
    let data = data
        .and_then(Representation::from_value)
        .unwrap_or_default();
    Ok((data, Version::new(from_db(row.try_get("version")?)?)))
}

/// Postgres-backed [`Store`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool sized by `config`
    pub async fn connect(config: &DatabaseConfig) -> InventoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "connected to Postgres");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> InventoryResult<()> {
        run_migrations(&self.pool).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> InventoryResult<Box<dyn Tx>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SET_SERIALIZABLE).execute(&mut *tx).await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Tx for PgTx {
    fn repository(&mut self) -> &mut dyn ResourceRepository {
        self
    }

    async fn commit(self: Box<Self>) -> InventoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> InventoryResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl PgTx {
    /// Resource id owning the reporter resource for `key`
    async fn resource_id_for(
        &mut self,
        key: &ReporterResourceKey,
        tombstone: Option<bool>,
    ) -> InventoryResult<Option<Uuid>> {
        let sql = format!(
            "SELECT resource_id FROM reporter_resources WHERE {KEY_PREDICATE} \
             AND ($5::boolean IS NULL OR tombstone = $5) \
             ORDER BY tombstone ASC, generation DESC, representation_version DESC LIMIT 1"
        );
        let id = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(key.local_resource_id.as_str())
            .bind(key.resource_type.as_str())
            .bind(key.reporter_type.as_str())
            .bind(key.reporter_instance_id.as_str())
            .bind(tombstone)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn load(&mut self, resource_id: Uuid) -> InventoryResult<Resource> {
        let row = sqlx::query("SELECT type, common_version, ktn FROM resource WHERE id = $1")
            .bind(resource_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(InventoryError::ResourceNotFound)?;
        let resource_type = ResourceType::new(row.try_get::<String, _>("type")?)?;
        let common_version = Version::new(from_db(row.try_get("common_version")?)?);
        let token = row
            .try_get::<Option<String>, _>("ktn")?
            .filter(|t| !t.is_empty())
            .map(ConsistencyToken::new);

        let sql = format!(
            "SELECT {REPORTER_RESOURCE_COLUMNS} FROM reporter_resources \
             WHERE resource_id = $1 ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(resource_id)
            .fetch_all(&mut *self.tx)
            .await?;
        let reporters = rows
            .iter()
            .map(reporter_resource_from_row)
            .collect::<InventoryResult<Vec<_>>>()?;

        Ok(Resource::from_parts(
            ResourceId::from_uuid(resource_id),
            resource_type,
            common_version,
            token,
            reporters,
        ))
    }

    async fn common_at(
        &mut self,
        resource_id: Uuid,
        version: Version,
    ) -> InventoryResult<Option<(Representation, Version)>> {
        let row = sqlx::query(
            "SELECT data, version FROM common_representations \
             WHERE resource_id = $1 AND version = $2",
        )
        .bind(resource_id)
        .bind(to_db(version.value())?)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(common_from_row).transpose()
    }

    async fn publish_outbox_event(&mut self, event: &OutboxEvent) -> InventoryResult<()> {
        sqlx::query(
            "INSERT INTO outbox_events (id, aggregatetype, aggregateid, operation, txid, payload) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id)
        .bind(event.aggregate_type.as_str())
        .bind(&event.aggregate_id)
        .bind(event.operation.as_str())
        .bind(&event.txid)
        .bind(&event.payload)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("DELETE FROM outbox_events WHERE id = $1")
            .bind(event.id)
            .execute(&mut *self.tx)
            .await?;
        debug!(txid = %event.txid, aggregate = event.aggregate_type.as_str(), "outbox event published");
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for PgTx {
    async fn find_resource_by_keys(&mut self, key: &ReporterResourceKey) -> InventoryResult<Resource> {
        let resource_id = self
            .resource_id_for(key, Some(false))
            .await?
            .ok_or(InventoryError::ResourceNotFound)?;
        self.load(resource_id).await
    }

    async fn find_tombstoned_resource_by_keys(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Resource>> {
        if self.resource_id_for(key, Some(false)).await?.is_some() {
            return Ok(None);
        }
        match self.resource_id_for(key, Some(true)).await? {
            Some(resource_id) => self.load(resource_id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn save(
        &mut self,
        resource: &Resource,
        operation: OperationType,
        txid: &TransactionId,
    ) -> InventoryResult<()> {
        let event = resource
            .pending_event()
            .ok_or_else(|| InventoryError::Generic("resource has no pending change".into()))?;
        let rr = &event.reporter_resource;
        let resource_id = event.resource_id.as_uuid();

        let previous = match previous_common_version(event, operation) {
            Some(version) => self.common_at(resource_id, version).await?,
            None => None,
        };
        let tuples = change_tuples(event, previous);

        sqlx::query(
            "INSERT INTO resource (id, type, common_version) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET common_version = EXCLUDED.common_version, updated_at = now()",
        )
        .bind(resource_id)
        .bind(event.resource_type.as_str())
        .bind(to_db(event.common_version.value())?)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query(
            "INSERT INTO reporter_resources (id, local_resource_id, resource_type, reporter_type, \
             reporter_instance_id, resource_id, api_href, console_href, representation_version, \
             generation, tombstone) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET api_href = EXCLUDED.api_href, \
             console_href = EXCLUDED.console_href, \
             representation_version = EXCLUDED.representation_version, \
             generation = EXCLUDED.generation, tombstone = EXCLUDED.tombstone, updated_at = now()",
        )
        .bind(rr.id.as_uuid())
        .bind(rr.key.local_resource_id.as_str())
        .bind(rr.key.resource_type.as_str())
        .bind(rr.key.reporter_type.as_str())
        .bind(rr.key.reporter_instance_id.as_str())
        .bind(resource_id)
        .bind(&rr.api_href)
        .bind(rr.console_href.as_deref())
        .bind(to_db(rr.representation_version.value())?)
        .bind(to_db(rr.generation.value())?)
        .bind(rr.tombstone)
        .execute(&mut *self.tx)
        .await?;

        let reporter = event.reporter_representation();
        sqlx::query(
            "INSERT INTO reporter_representations (reporter_resource_id, version, generation, data, \
             reporter_version, common_version, transaction_id, tombstone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(reporter.reporter_resource_id.as_uuid())
        .bind(to_db(reporter.version.value())?)
        .bind(to_db(reporter.generation.value())?)
        .bind(reporter.data.to_value())
        .bind(reporter.reporter_version.as_deref())
        .bind(to_db(reporter.common_version.value())?)
        .bind(reporter.transaction_id.as_str())
        .bind(reporter.tombstone)
        .execute(&mut *self.tx)
        .await?;

        if let Some(common) = event.common_representation() {
            sqlx::query(
                "INSERT INTO common_representations (resource_id, version, data, \
                 reported_by_reporter_type, reported_by_reporter_instance, transaction_id) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(common.resource_id.as_uuid())
            .bind(to_db(common.version.value())?)
            .bind(common.data.to_value())
            .bind(common.reported_by_reporter_type.as_str())
            .bind(common.reported_by_reporter_instance.as_str())
            .bind(common.transaction_id.as_str())
            .execute(&mut *self.tx)
            .await?;
        }

        for outbox_event in OutboxEvent::for_change(event, operation, txid.as_str(), tuples)? {
            self.publish_outbox_event(&outbox_event).await?;
        }
        Ok(())
    }

    async fn contains_event_for_transaction_id(&mut self, txid: &str) -> InventoryResult<bool> {
        if txid.is_empty() {
            return Ok(false);
        }
        let found = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reporter_representations WHERE transaction_id = $1) \
             OR EXISTS (SELECT 1 FROM common_representations WHERE transaction_id = $1)",
        )
        .bind(txid)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(found)
    }

    async fn find_current_and_previous_versioned_representations(
        &mut self,
        key: &ReporterResourceKey,
        current_version: Option<Version>,
        _operation: OperationType,
    ) -> InventoryResult<(Option<Representations>, Option<Representations>)> {
        let Some(current_version) = current_version else {
            return Ok((None, None));
        };
        let resource_id = self
            .resource_id_for(key, None)
            .await?
            .ok_or(InventoryError::ResourceNotFound)?;

        let current = self.common_at(resource_id, current_version).await?;
        let previous = match current_version.previous() {
            Some(version) => self.common_at(resource_id, version).await?,
            None => None,
        };
        let to_reps = |pair: Option<(Representation, Version)>| {
            pair.and_then(|(data, version)| Representations::common(data, version).ok())
        };
        Ok((to_reps(current), to_reps(previous)))
    }

    async fn find_latest_representations(
        &mut self,
        key: &ReporterResourceKey,
    ) -> InventoryResult<Option<Representations>> {
        let resource_id = self
            .resource_id_for(key, None)
            .await?
            .ok_or(InventoryError::ResourceNotFound)?;
        let row = sqlx::query(
            "SELECT data, version FROM common_representations \
             WHERE resource_id = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(resource_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(InventoryError::ResourceNotFound)?;
        let (data, version) = common_from_row(&row)?;
        Ok(Representations::common(data, version).ok())
    }

    async fn update_consistency_token(
        &mut self,
        key: &ReporterResourceKey,
        token: &ConsistencyToken,
    ) -> InventoryResult<()> {
        let resource_id = self
            .resource_id_for(key, None)
            .await?
            .ok_or(InventoryError::ResourceNotFound)?;
        sqlx::query("UPDATE resource SET ktn = $1, updated_at = now() WHERE id = $2")
            .bind(token.as_str())
            .bind(resource_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_conversion() {
        assert_eq!(to_db(7).unwrap(), 7);
        assert!(to_db(u64::MAX).is_err());
        assert_eq!(from_db(3).unwrap(), 3);
        assert!(from_db(-1).is_err());
    }

    #[test]
    fn test_key_predicate_binds_four_parameters() {
        for param in ["$1", "$2", "$3", "$4"] {
            assert!(KEY_PREDICATE.contains(param));
        }
        assert!(!KEY_PREDICATE.contains("$5"));
        assert!(SET_SERIALIZABLE.ends_with("SERIALIZABLE"));
    }
}
