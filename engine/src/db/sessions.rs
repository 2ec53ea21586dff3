//! Session state persistence
//!
//! Each session is stored as one JSON document, history included, so rollback
//! survives restarts. All queries use parameterized queries.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::capability::SessionStateStore;
use sdk::errors::StoreError;
use sdk::helpers::now_millis;
use sdk::session::{SessionPatch, SessionState};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::backend;

/// SQLite-backed [`SessionStateStore`]
pub struct SessionRepository {
    pool: SqlitePool,
    history_limit: usize,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool, history_limit: usize) -> Self {
        Self {
            pool,
            history_limit,
        }
    }

    /// Load a session
    pub async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let row = sqlx::query("SELECT state_json FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load session")?;

        row.map(|row| self.decode(row.get("state_json"))).transpose()
    }

    /// List session ids of a user, most recently updated first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar(
            "SELECT session_id FROM sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        Ok(ids)
    }

    fn decode(&self, json: String) -> Result<SessionState> {
        let state: SessionState =
            serde_json::from_str(&json).context("Failed to decode session state")?;
        Ok(state.with_history_limit(self.history_limit))
    }

    async fn fetch_in(
        tx: &mut Transaction<'_, Sqlite>,
        session_id: &str,
    ) -> Result<Option<String>> {
        let json = sqlx::query_scalar("SELECT state_json FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to load session")?;
        Ok(json)
    }

    async fn write_in(tx: &mut Transaction<'_, Sqlite>, state: &SessionState) -> Result<()> {
        let json = serde_json::to_string(state).context("Failed to encode session state")?;
        let now = now_millis();

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, user_id, phase, state_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                phase = excluded.phase,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.session_id)
        .bind(&state.user_id)
        .bind(state.phase().as_str())
        .bind(json)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .context("Failed to save session")?;

        Ok(())
    }

    /// Read, modify and write one session inside a transaction
    async fn update<F>(&self, session_id: &str, mutate: F) -> Result<SessionState, StoreError>
    where
        F: FnOnce(&mut SessionState) -> Result<(), StoreError> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(|e| backend(e.into()))?;

        let json = Self::fetch_in(&mut tx, session_id).await.map_err(backend)?;
        let Some(json) = json else {
            return Err(StoreError::NotFound(session_id.to_string()));
        };
        let mut state = self.decode(json).map_err(backend)?;

        mutate(&mut state)?;

        Self::write_in(&mut tx, &state).await.map_err(backend)?;
        tx.commit().await.map_err(|e| backend(e.into()))?;

        Ok(state)
    }
}

#[async_trait]
impl SessionStateStore for SessionRepository {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        self.load(session_id).await.map_err(backend)
    }

    async fn set(&self, state: &SessionState) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| backend(e.into()))?;

        let mut incoming = state.clone().with_history_limit(self.history_limit);
        if let Some(json) = Self::fetch_in(&mut tx, &state.session_id)
            .await
            .map_err(backend)?
        {
            let prior = self.decode(json).map_err(backend)?;
            incoming.absorb_prior(&prior);
        }

        Self::write_in(&mut tx, &incoming).await.map_err(backend)?;
        tx.commit().await.map_err(|e| backend(e.into()))?;

        debug!(session_id = %state.session_id, revision = incoming.revision(), "Session saved");
        Ok(())
    }

    async fn patch(&self, session_id: &str, patch: SessionPatch) -> Result<SessionState, StoreError> {
        self.update(session_id, |state| {
            state.apply_patch(patch)?;
            Ok(())
        })
        .await
    }

    async fn rollback(&self, session_id: &str, steps: usize) -> Result<SessionState, StoreError> {
        self.update(session_id, |state| {
            let undone = state.rollback(steps);
            debug!(session_id = %state.session_id, requested = steps, undone, "Session rolled back");
            Ok(())
        })
        .await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}
