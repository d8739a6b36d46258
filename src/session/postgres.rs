//! Postgres-backed session records (`account_sessions`).
//!
//! Keys are stored with the `sess:` prefix; rows past `expires_at` are treated
//! as absent and removed by [`spawn_expiry_sweeper`].

use super::{
    SessionRecord, SessionRecordStore, StoreError, UserSession, session_key, strip_session_prefix,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info_span};

const SELECT_SESSION: &str = r"
    SELECT data
    FROM account_sessions
    WHERE id = $1
      AND expires_at > NOW()
";

const UPSERT_SESSION: &str = r"
    INSERT INTO account_sessions (id, subject_id, data, expires_at)
    VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))
    ON CONFLICT (id) DO UPDATE
    SET subject_id = EXCLUDED.subject_id,
        data = EXCLUDED.data,
        expires_at = EXCLUDED.expires_at
";

const UPDATE_SESSION: &str = r"
    UPDATE account_sessions
    SET subject_id = $2,
        data = $3,
        expires_at = NOW() + make_interval(secs => $4)
    WHERE id = $1
      AND expires_at > NOW()
";

const DELETE_SESSION: &str = "DELETE FROM account_sessions WHERE id = $1";

const SELECT_SUBJECT_SESSIONS: &str = r"
    SELECT id
    FROM account_sessions
    WHERE subject_id = $1
      AND expires_at > NOW()
";

const DELETE_EXPIRED: &str = "DELETE FROM account_sessions WHERE expires_at <= NOW()";

#[derive(Debug, Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresSessionStore {
    #[must_use]
    pub const fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    fn ttl_seconds(&self) -> f64 {
        self.ttl.as_secs_f64()
    }

    /// Delete every expired row, returning how many were removed.
    ///
    /// # Errors
    /// Returns the database error from the delete.
    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = DELETE_EXPIRED
        );
        let result = sqlx::query(DELETE_EXPIRED)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }

    async fn write(
        &self,
        operation: &'static str,
        query: &'static str,
        record: &SessionRecord,
    ) -> Result<u64, StoreError> {
        let data = serde_json::to_value(&record.session)?;
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_key(&record.id))
            .bind(&record.subject_id)
            .bind(data)
            .bind(self.ttl_seconds())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Spawn a background task that removes expired sessions every `period`.
pub fn spawn_expiry_sweeper(
    store: PostgresSessionStore,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(period).await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired sessions"),
                Err(err) => error!("session sweep failed: {err}"),
            }
        }
    })
}

#[async_trait]
impl SessionRecordStore for PostgresSessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = SELECT_SESSION
        );
        let row = sqlx::query(SELECT_SESSION)
            .bind(session_key(session_id))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let data: serde_json::Value = row.try_get("data")?;
        let session: UserSession = serde_json::from_value(data)?;
        Ok(Some(SessionRecord::new(session_id, session)))
    }

    async fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        self.write("INSERT", UPSERT_SESSION, &record).await?;
        Ok(())
    }

    async fn update(&self, record: SessionRecord) -> Result<bool, StoreError> {
        Ok(self.write("UPDATE", UPDATE_SESSION, &record).await? > 0)
    }

    async fn delete_by_id(&self, session_id: &str) -> Result<(), StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = DELETE_SESSION
        );
        sqlx::query(DELETE_SESSION)
            .bind(session_key(session_id))
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn list_ids_by_subject(&self, subject_id: &str) -> Result<Vec<String>, StoreError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = SELECT_SUBJECT_SESSIONS
        );
        let rows = sqlx::query(SELECT_SUBJECT_SESSIONS)
            .bind(subject_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        rows.iter()
            .map(|row| {
                let key: String = row.try_get("id")?;
                Ok(strip_session_prefix(&key).to_string())
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::Connection::ping(&mut *conn)
            .instrument(ping_span)
            .await?;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "postgres"
    }
}
