use crate::error::Result;
use crate::history::HistoryRepository;
use crate::models::{ChatMessage, SessionRecord};
use chrono::{SubsecRound, Utc};
use kaiwa_types::SessionConfig;
use serde_json::Value;
use sqlx::MySqlPool;
use uuid::Uuid;

/// History window loaded when a session is re-attached.
const BOOTSTRAP_HISTORY_LIMIT: u32 = 100;

/// What a client gets back from `init`.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub config: SessionConfig,
}

/// Creates and loads `sessions` rows.
#[derive(Clone)]
pub struct SessionRepository {
    pool: MySqlPool,
    history: HistoryRepository,
    defaults: SessionConfig,
}

impl SessionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        let history = HistoryRepository::new(pool.clone());
        Self {
            pool,
            history,
            defaults: SessionConfig::default(),
        }
    }

    /// Config snapshot handed to sessions created from here on. Existing
    /// rows keep whatever they stored.
    pub fn with_defaults(mut self, defaults: SessionConfig) -> Self {
        self.defaults = defaults;
        self
    }

    fn parse_config(&self, raw: Option<&str>) -> SessionConfig {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Create-or-load for `init`.
    ///
    /// An empty or unknown `session_id` creates a fresh session with the
    /// default config; a known id loads the stored config snapshot and the
    /// recent history. Existing rows are never rewritten with defaults.
    pub async fn ensure(
        &self,
        session_id: Option<&str>,
        user_id: &str,
    ) -> Result<SessionBootstrap> {
        let proposed = session_id.map(str::trim).filter(|s| !s.is_empty());

        if let Some(id) = proposed {
            if let Some(record) = self.find(id).await? {
                let config = self.parse_config(record.config.as_deref());
                let messages = self.history.recent(id, BOOTSTRAP_HISTORY_LIMIT).await?;
                tracing::info!(session_id = %id, count = messages.len(), "loaded existing session");
                return Ok(SessionBootstrap {
                    session_id: record.session_id,
                    messages,
                    config,
                });
            }
            tracing::info!(session_id = %id, "unknown session id, creating a fresh session");
        }

        let fresh = Uuid::new_v4().to_string();
        self.create(&fresh, user_id).await
    }

    async fn create(&self, session_id: &str, user_id: &str) -> Result<SessionBootstrap> {
        let config = self.defaults.clone();
        let now = Utc::now().trunc_subsecs(0);

        sqlx::query(
            "INSERT INTO sessions \
             (session_id, user_id, config, status, session_name, created_at, updated_at) \
             VALUES (?, ?, ?, 'active', 'new chat', ?, ?)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(serde_json::to_string(&config)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(session_id, user_id, "created session");
        Ok(SessionBootstrap {
            session_id: session_id.to_string(),
            messages: Vec::new(),
            config,
        })
    }

    pub async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let record = sqlx::query_as(
            "SELECT id, session_id, user_id, config, status, session_name, summary, \
             created_at, updated_at FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Deep-merge `patch` into the stored config snapshot and persist the
    /// result. Returns the updated config.
    pub async fn update_config(&self, session_id: &str, patch: &Value) -> Result<SessionConfig> {
        let record = self.find(session_id).await?;
        let mut config = self.parse_config(record.as_ref().and_then(|r| r.config.as_deref()));
        config.merge_patch(patch);

        let now = Utc::now().trunc_subsecs(0);
        sqlx::query("UPDATE sessions SET config = ?, updated_at = ? WHERE session_id = ?")
            .bind(serde_json::to_string(&config)?)
            .bind(now)
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(session_id, "updated session config");
        Ok(config)
    }
}
