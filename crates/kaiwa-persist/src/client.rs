use crate::error::{PersistError, Result};
use crate::history::HistoryRepository;
use crate::session::SessionRepository;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry point for everything persistent: owns the MySQL pool and hands
/// out the repositories. Safe to share across connections behind an `Arc`.
pub struct PersistClient {
    history: HistoryRepository,
    sessions: SessionRepository,
}

impl PersistClient {
    /// Connect, then run idempotent migrations so a fresh database is
    /// usable immediately.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        migrate(&pool).await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self {
            history: HistoryRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool),
        }
    }

    /// Set the config snapshot used for newly created sessions.
    pub fn with_default_config(mut self, config: kaiwa_types::SessionConfig) -> Self {
        self.sessions = self.sessions.with_defaults(config);
        self
    }

    pub fn history(&self) -> &HistoryRepository {
        &self.history
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }
}

async fn migrate(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            session_id VARCHAR(128) NOT NULL,
            user_id VARCHAR(128) NOT NULL,
            config TEXT,
            status VARCHAR(50) DEFAULT 'active',
            session_name VARCHAR(128) DEFAULT 'new chat',
            summary VARCHAR(2048),
            created_at TIMESTAMP NULL,
            updated_at TIMESTAMP NULL,
            UNIQUE KEY idx_sessions_session_id (session_id)
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS chat_history (
            id BIGINT PRIMARY KEY AUTO_INCREMENT,
            session_id VARCHAR(128) NOT NULL,
            role VARCHAR(32),
            content TEXT,
            `type` VARCHAR(50),
            status VARCHAR(50),
            message_id VARCHAR(128),
            tool_calls TEXT,
            meta_data TEXT,
            `timestamp` TIMESTAMP NULL,
            updated_at TIMESTAMP NULL,
            INDEX idx_chat_history_session_time (session_id, `timestamp`)
        )
        ",
    )
    .execute(pool)
    .await?;

    tracing::debug!("persistence migrations applied");
    Ok(())
}
