//! Human review queue
//!
//! Items escalated by the verification pipeline wait here until a person
//! approves or rejects them.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sdk::capability::HumanReviewSink;
use sdk::errors::StoreError;
use sdk::helpers::now_millis;
use sdk::types::{ReviewItem, VerifiableContent};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use super::backend;

/// A queued review item
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReview {
    pub id: String,
    pub item: VerifiableContent,
    pub reason: String,
    pub confidence: f64,
    pub created_at: i64,
}

/// SQLite-backed [`HumanReviewSink`]
pub struct ReviewQueue {
    pool: SqlitePool,
}

impl ReviewQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn push(&self, item: &ReviewItem) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let item_json = serde_json::to_string(&item.item).context("Failed to encode review item")?;

        sqlx::query(
            r#"
            INSERT INTO review_queue (id, content_type, item_json, reason, confidence, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&item.item.content_type)
        .bind(item_json)
        .bind(&item.reason)
        .bind(item.confidence)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to enqueue review item")?;

        Ok(id)
    }

    /// Pending items, oldest first
    pub async fn pending(&self, limit: usize) -> Result<Vec<PendingReview>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT id, item_json, reason, confidence, created_at
            FROM review_queue
            WHERE status = 'pending'
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending reviews")?;

        rows.iter()
            .map(|row| {
                let item_json: String = row.get("item_json");
                Ok(PendingReview {
                    id: row.get("id"),
                    item: serde_json::from_str(&item_json).context("Failed to decode review item")?,
                    reason: row.get("reason"),
                    confidence: row.get("confidence"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    /// Record a human decision on a pending item
    pub async fn resolve(&self, id: &str, approved: bool) -> Result<()> {
        let status = if approved { "approved" } else { "rejected" };

        let result = sqlx::query(
            "UPDATE review_queue SET status = ?, resolved_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to resolve review item")?;

        if result.rows_affected() == 0 {
            bail!("No pending review item with id {}", id);
        }

        info!(review_id = id, status, "Review item resolved");
        Ok(())
    }
}

#[async_trait]
impl HumanReviewSink for ReviewQueue {
    async fn enqueue(&self, item: ReviewItem) -> Result<(), StoreError> {
        self.push(&item).await.map(|_| ()).map_err(backend)
    }
}
