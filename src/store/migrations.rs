// Copyright (c) 2025 - Cowboy AI, Inc.
//! Postgres schema
//!
//! Four tables hold the inventory; `outbox_events` only ever holds rows
//! inside an open transaction and is read through the WAL by CDC.

use sqlx::PgPool;
use tracing::info;

use crate::errors::InventoryResult;

/// Idempotent DDL, applied in order
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS resource (
        id             UUID PRIMARY KEY,
        type           VARCHAR(128) NOT NULL,
        common_version BIGINT NOT NULL CHECK (common_version >= 0),
        ktn            VARCHAR(1024),
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reporter_resources (
        id                     UUID PRIMARY KEY,
        local_resource_id      VARCHAR(256) NOT NULL,
        reporter_type          VARCHAR(128) NOT NULL,
        resource_type          VARCHAR(128) NOT NULL,
        reporter_instance_id   VARCHAR(256) NOT NULL,
        resource_id            UUID NOT NULL REFERENCES resource (id),
        api_href               VARCHAR(512) NOT NULL,
        console_href           VARCHAR(512),
        representation_version BIGINT NOT NULL CHECK (representation_version >= 0),
        generation             BIGINT NOT NULL CHECK (generation >= 0),
        tombstone              BOOLEAN NOT NULL,
        created_at             TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at             TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS reporter_resource_key_idx ON reporter_resources (
        lower(local_resource_id), resource_type, reporter_type, lower(reporter_instance_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS reporter_resource_resource_id_idx
        ON reporter_resources (resource_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reporter_representations (
        reporter_resource_id UUID NOT NULL REFERENCES reporter_resources (id)
                             ON UPDATE CASCADE ON DELETE CASCADE,
        version              BIGINT NOT NULL CHECK (version >= 0),
        generation           BIGINT NOT NULL CHECK (generation >= 0),
        data                 JSONB,
        reporter_version     VARCHAR(128),
        common_version       BIGINT NOT NULL CHECK (common_version >= 0),
        transaction_id       VARCHAR(128),
        tombstone            BOOLEAN NOT NULL,
        created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (reporter_resource_id, version, generation)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_reporter_reps_txid_nn
        ON reporter_representations (transaction_id)
        WHERE transaction_id IS NOT NULL AND transaction_id <> ''
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS common_representations (
        resource_id                   UUID NOT NULL,
        version                       BIGINT NOT NULL CHECK (version >= 0),
        data                          JSONB,
        reported_by_reporter_type     VARCHAR(128),
        reported_by_reporter_instance VARCHAR(128),
        transaction_id                VARCHAR(128),
        created_at                    TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (resource_id, version)
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS ux_common_reps_txid_nn
        ON common_representations (transaction_id)
        WHERE transaction_id IS NOT NULL AND transaction_id <> ''
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS outbox_events (
        id            UUID PRIMARY KEY,
        aggregatetype VARCHAR(255) NOT NULL,
        aggregateid   VARCHAR(255) NOT NULL,
        operation     VARCHAR(255) NOT NULL,
        txid          VARCHAR(255),
        payload       JSONB
    )
    "#,
];

/// Apply [`SCHEMA`]
pub async fn run_migrations(pool: &PgPool) -> InventoryResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = SCHEMA.len(), "inventory schema applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent_ddl() {
        for statement in SCHEMA {
            let s = statement.trim_start();
            assert!(
                s.starts_with("CREATE TABLE IF NOT EXISTS")
                    || s.starts_with("CREATE INDEX IF NOT EXISTS")
                    || s.starts_with("CREATE UNIQUE INDEX IF NOT EXISTS"),
                "not idempotent: {s}"
            );
        }
    }

    #[test]
    fn test_four_tables_plus_outbox() {
        let tables: Vec<_> = SCHEMA
            .iter()
            .filter(|s| s.trim_start().starts_with("CREATE TABLE"))
            .collect();
        assert_eq!(tables.len(), 5);
        assert!(tables.iter().any(|s| s.contains("outbox_events")));
    }
}
