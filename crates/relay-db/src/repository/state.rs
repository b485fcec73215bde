//! # State Document Repository
//!
//! Key-value access to the durable state subset.
//!
//! ## The Document Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Persistence                                    │
//! │                                                                         │
//! │  IN-MEMORY MUTATION (router / automation tick)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Durable snapshot (PersistedState) handed to persistence worker        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  save("main_state", doc) ── UPSERT one JSON row                        │
//! │                                                                         │
//! │  PROCESS RESTART                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load("main_state") → Some(doc) | None (first boot)                    │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • Memory state is mutated first; the durable write is best-effort     │
//! │  • physical / hardware-online are never stored                         │
//! │  • A write failure only costs the delta since the last good write      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use relay_core::PersistedState;

/// Repository for the durable state document.
#[derive(Debug, Clone)]
pub struct StateRepository {
    pool: SqlitePool,
}

impl StateRepository {
    /// Creates a new StateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StateRepository { pool }
    }

    /// Loads the document stored under `key`.
    ///
    /// ## Returns
    /// * `Ok(Some(doc))` - a document exists and decoded cleanly
    /// * `Ok(None)` - first boot, nothing stored yet
    /// * `Err(..)` - query failure or an undecodable stored document
    pub async fn load(&self, key: &str) -> DbResult<Option<PersistedState>> {
        let row = sqlx::query("SELECT document FROM hub_state WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            debug!(key = %key, "No stored document");
            return Ok(None);
        };

        let document: String = row.try_get("document")?;
        let state =
            serde_json::from_str::<PersistedState>(&document).map_err(|e| {
                DbError::CorruptDocument {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;

        debug!(key = %key, "Loaded stored document");
        Ok(Some(state))
    }

    /// Upserts the document stored under `key`.
    pub async fn save(&self, key: &str, state: &PersistedState) -> DbResult<()> {
        let document = serde_json::to_string(state).map_err(|e| DbError::Internal(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO hub_state (key, document, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&document)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(key = %key, bytes = document.len(), "Saved document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use relay_core::{LabelId, StateDocument, SwitchId, STATE_DOCUMENT_KEY};

    async fn test_repo() -> StateRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.state()
    }

    #[tokio::test]
    async fn test_load_absent() {
        let repo = test_repo().await;
        assert!(repo.load(STATE_DOCUMENT_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let repo = test_repo().await;

        let mut doc = StateDocument::default();
        doc.switches.insert(SwitchId::Switch1, true);
        doc.names.insert(LabelId::Name3, "Water heater".to_string());
        let state = PersistedState::from(&doc);

        repo.save(STATE_DOCUMENT_KEY, &state).await.unwrap();
        let loaded = repo.load(STATE_DOCUMENT_KEY).await.unwrap().unwrap();

        assert_eq!(loaded, state);
        assert_eq!(loaded.names[&LabelId::Name3], "Water heater");
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let repo = test_repo().await;

        let first = PersistedState::from(&StateDocument::default());
        repo.save(STATE_DOCUMENT_KEY, &first).await.unwrap();

        let mut doc = StateDocument::default();
        doc.switches.insert(SwitchId::Switch4, true);
        let second = PersistedState::from(&doc);
        repo.save(STATE_DOCUMENT_KEY, &second).await.unwrap();

        let loaded = repo.load(STATE_DOCUMENT_KEY).await.unwrap().unwrap();
        assert_eq!(loaded.switches[&SwitchId::Switch4], true);
    }
}
