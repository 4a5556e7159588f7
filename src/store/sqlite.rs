// src/store/sqlite.rs
//! Durable gateway on SQLite.
//!
//! Times are stored as unix milliseconds so validity comparisons can run in SQL.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{IncidentRecord, PersistenceGateway, ReportId, StorageId, Validity};
use crate::error::StoreError;
use crate::report::{ContentHash, IncidentKey, Report, UpdatedAt};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS incidents (
        storage_id    TEXT PRIMARY KEY,
        incident_key  INTEGER NOT NULL UNIQUE,
        is_current    INTEGER NOT NULL DEFAULT 1,
        valid_from_ms INTEGER NOT NULL,
        valid_to_ms   INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS reports (
        report_id       TEXT PRIMARY KEY,
        storage_id      TEXT NOT NULL REFERENCES incidents(storage_id),
        seq             INTEGER NOT NULL,
        hash            TEXT NOT NULL,
        external_id     TEXT NOT NULL,
        title           TEXT NOT NULL,
        category        TEXT NOT NULL,
        link            TEXT NOT NULL,
        published_ms    INTEGER NOT NULL,
        updated_ms      INTEGER,
        updated_raw     TEXT,
        description     TEXT NOT NULL,
        attributes      TEXT NOT NULL,
        geometry        TEXT NOT NULL,
        geometry_wkt    TEXT NOT NULL,
        imported_ms     INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_reports_incident_hash ON reports(storage_id, hash)",
    "CREATE INDEX IF NOT EXISTS idx_incidents_current ON incidents(is_current)",
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate. `sqlite::memory:` keeps a single
    /// connection so every query sees the same database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let mut opts = SqliteConnectOptions::from_str(url)?
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(target: "store", %url, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// All incidents ordered by key.
    pub async fn incidents(&self) -> Result<Vec<IncidentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT storage_id, incident_key, is_current, valid_from_ms, valid_to_ms
             FROM incidents ORDER BY incident_key",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(incident_from_row).collect()
    }

    /// Report hashes of one incident, in arrival order.
    pub async fn report_hashes(&self, id: StorageId) -> Result<Vec<ContentHash>, StoreError> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT hash FROM reports WHERE storage_id = ? ORDER BY seq")
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(hashes.into_iter().map(ContentHash).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::StoreUnavailable(format!("corrupt timestamp {ms}")))
}

fn parse_id(s: &str) -> Result<StorageId, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::StoreUnavailable(format!("corrupt storage id {s}: {e}")))
}

fn incident_from_row(row: &SqliteRow) -> Result<IncidentRecord, StoreError> {
    let id: String = row.try_get("storage_id")?;
    Ok(IncidentRecord {
        storage_id: parse_id(&id)?,
        key: IncidentKey(row.try_get("incident_key")?),
        is_current: row.try_get::<i64, _>("is_current")? != 0,
        validity: Validity {
            from: from_millis(row.try_get("valid_from_ms")?)?,
            to: from_millis(row.try_get("valid_to_ms")?)?,
        },
    })
}

async fn insert_incident_row(
    conn: &mut SqliteConnection,
    key: IncidentKey,
    first_seen: DateTime<Utc>,
) -> Result<StorageId, StoreError> {
    let id = Uuid::new_v4();
    let res = sqlx::query(
        "INSERT INTO incidents (storage_id, incident_key, is_current, valid_from_ms, valid_to_ms)
         VALUES (?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(key.0)
    .bind(millis(first_seen))
    .bind(millis(first_seen))
    .execute(&mut *conn)
    .await;

    match res {
        Ok(_) => Ok(id),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            let existing: String =
                sqlx::query_scalar("SELECT storage_id FROM incidents WHERE incident_key = ?")
                    .bind(key.0)
                    .fetch_one(&mut *conn)
                    .await?;
            Err(StoreError::DuplicateInsertAttempted {
                key: key.0,
                storage_id: existing,
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn insert_report_row(
    conn: &mut SqliteConnection,
    id: StorageId,
    report: &Report,
) -> Result<ReportId, StoreError> {
    let report_id = Uuid::new_v4();
    let (updated_ms, updated_raw) = match &report.updated_at {
        UpdatedAt::Absent => (None, None),
        UpdatedAt::Unparsed(raw) => (None, Some(raw.clone())),
        UpdatedAt::At(t) => (Some(millis(*t)), None),
    };

    sqlx::query(
        "INSERT INTO reports (
            report_id, storage_id, seq, hash, external_id, title, category, link,
            published_ms, updated_ms, updated_raw, description, attributes,
            geometry, geometry_wkt, imported_ms
         ) VALUES (?, ?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM reports),
                   ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(report_id.to_string())
    .bind(id.to_string())
    .bind(report.content_hash.as_str())
    .bind(&report.external_id)
    .bind(&report.title)
    .bind(&report.category)
    .bind(&report.link)
    .bind(millis(report.published_at))
    .bind(updated_ms)
    .bind(updated_raw)
    .bind(&report.description_raw)
    .bind(serde_json::to_string(&report.attributes)?)
    .bind(serde_json::to_string(&report.geometry)?)
    .bind(report.geometry.to_wkt())
    .bind(millis(Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(report_id)
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn lookup_incident_by_key(
        &self,
        key: IncidentKey,
    ) -> Result<Option<IncidentRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT storage_id, incident_key, is_current, valid_from_ms, valid_to_ms
             FROM incidents WHERE incident_key = ?",
        )
        .bind(key.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(incident_from_row).transpose()
    }

    async fn insert_incident(
        &self,
        key: IncidentKey,
        first_seen: DateTime<Utc>,
    ) -> Result<StorageId, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_incident_row(&mut *conn, key, first_seen).await
    }

    async fn create_incident(
        &self,
        key: IncidentKey,
        first: &Report,
    ) -> Result<StorageId, StoreError> {
        // Dropping `tx` on any early return rolls both rows back.
        let mut tx = self.pool.begin().await?;
        let id = insert_incident_row(&mut *tx, key, first.published_at).await?;
        insert_report_row(&mut *tx, id, first).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn set_incident_current(&self, id: StorageId) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE incidents SET is_current = 1 WHERE storage_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::UnknownIncident(id.to_string()));
        }
        Ok(())
    }

    async fn extend_incident_validity_upper(
        &self,
        id: StorageId,
        new_upper: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE incidents SET valid_to_ms = ? WHERE storage_id = ? AND valid_to_ms < ?")
            .bind(millis(new_upper))
            .bind(id.to_string())
            .bind(millis(new_upper))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lookup_report_hash(
        &self,
        id: StorageId,
        hash: &ContentHash,
    ) -> Result<bool, StoreError> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM reports WHERE storage_id = ? AND hash = ? LIMIT 1")
                .bind(id.to_string())
                .bind(hash.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn insert_report(&self, id: StorageId, report: &Report) -> Result<ReportId, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_report_row(&mut *conn, id, report).await
    }

    async fn mark_not_current_except(&self, keep: &HashSet<StorageId>) -> Result<u64, StoreError> {
        // One statement; the id set travels as a single JSON array parameter.
        let ids: Vec<String> = keep.iter().map(Uuid::to_string).collect();
        let res = sqlx::query(
            "UPDATE incidents SET is_current = 0
             WHERE is_current = 1
               AND storage_id NOT IN (SELECT value FROM json_each(?))",
        )
        .bind(serde_json::to_string(&ids)?)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}
