//! Reasoning trace log
//!
//! Append-only. Traces are stored whole as JSON next to the columns used for
//! lookup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::capability::TraceLog;
use sdk::errors::StoreError;
use sdk::types::ReasoningTrace;
use sqlx::SqlitePool;

use super::backend;

/// SQLite-backed [`TraceLog`]
pub struct TraceRepository {
    pool: SqlitePool,
}

impl TraceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, session_id: &str, trace: &ReasoningTrace) -> Result<()> {
        let json = serde_json::to_string(trace).context("Failed to encode trace")?;

        sqlx::query(
            "INSERT INTO traces (id, session_id, action, trace_json, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&trace.id)
        .bind(session_id)
        .bind(&trace.action)
        .bind(json)
        .bind(trace.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to append trace")?;

        Ok(())
    }

    /// Most recent `limit` traces of a session, oldest first
    pub async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ReasoningTrace>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT trace_json FROM traces WHERE session_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list traces")?;

        rows.iter()
            .rev()
            .map(|json| serde_json::from_str(json).context("Failed to decode trace"))
            .collect()
    }
}

#[async_trait]
impl TraceLog for TraceRepository {
    async fn append(&self, session_id: &str, trace: &ReasoningTrace) -> Result<(), StoreError> {
        self.insert(session_id, trace).await.map_err(backend)
    }

    async fn list(&self, session_id: &str, limit: usize) -> Result<Vec<ReasoningTrace>, StoreError> {
        self.recent(session_id, limit).await.map_err(backend)
    }
}
