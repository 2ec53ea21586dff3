//! Agent Memory Repository
//!
//! Stores episodic and semantic memories. Retrieval returns the most recent
//! matches in chronological order; an empty query matches everything in scope.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::capability::AgentMemoryStore;
use sdk::errors::StoreError;
use sdk::helpers::now_millis;
use sdk::types::{MemoryContext, MemoryKind, MemoryRecord};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::backend;

/// SQLite-backed [`AgentMemoryStore`]
pub struct MemoryRepository {
    pool: SqlitePool,
}

impl MemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a memory and return its id
    pub async fn insert(
        &self,
        content: &str,
        kind: MemoryKind,
        context: &MemoryContext,
        metadata: &Value,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let metadata_json = serde_json::to_string(metadata).context("Failed to encode metadata")?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, user_id, session_id, kind, content, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&context.user_id)
        .bind(context.session_id.as_deref())
        .bind(kind.as_str())
        .bind(content)
        .bind(metadata_json)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to store memory")?;

        Ok(id)
    }

    /// Search memories in scope
    ///
    /// `query` is matched as a case-insensitive substring of the content.
    pub async fn search(
        &self,
        query: &str,
        context: &MemoryContext,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let query = query.trim();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, session_id, kind, content, metadata_json, created_at
            FROM memories
            WHERE user_id = ?
              AND (? IS NULL OR session_id = ?)
              AND kind = ?
              AND (? = '' OR instr(lower(content), lower(?)) > 0)
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(&context.user_id)
        .bind(context.session_id.as_deref())
        .bind(context.session_id.as_deref())
        .bind(kind.as_str())
        .bind(query)
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query memories")?;

        let mut records = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>>>()?;
        records.reverse();

        Ok(records)
    }

    /// Count memories of a kind for a user
    pub async fn count(&self, user_id: &str, kind: MemoryKind) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE user_id = ? AND kind = ?")
            .bind(user_id)
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count memories")?;

        Ok(count)
    }
}

fn decode_row(row: &SqliteRow) -> Result<MemoryRecord> {
    let kind: String = row.get("kind");
    let metadata_json: String = row.get("metadata_json");

    Ok(MemoryRecord {
        id: row.get("id"),
        content: row.get("content"),
        kind: MemoryKind::parse(&kind)
            .with_context(|| format!("Unknown memory kind '{}'", kind))?,
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        metadata: serde_json::from_str(&metadata_json).context("Failed to decode metadata")?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl AgentMemoryStore for MemoryRepository {
    async fn store(
        &self,
        content: &str,
        kind: MemoryKind,
        context: &MemoryContext,
        metadata: Value,
    ) -> Result<String, StoreError> {
        self.insert(content, kind, context, &metadata)
            .await
            .map_err(backend)
    }

    async fn retrieve(
        &self,
        query: &str,
        context: &MemoryContext,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        self.search(query, context, kind, limit)
            .await
            .map_err(backend)
    }
}
