//! Postgres host store.
//!
//! Reads the site's `users`, `user_roles`, `host_sessions` and
//! `user_credentials` tables and owns `sso_settings` and `pages`. See
//! `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{Instrument, info_span};

use super::{ChatPage, HostStore, PageOutcome, StoredSettings};
use crate::sso::{Identity, Settings, SubjectId};

const SETTING_WEBUI_URL: &str = "webui_url";
const SETTING_API_URL: &str = "api_url";
const SETTING_API_KEY: &str = "api_key";

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Debug, Clone)]
pub struct PostgresHostStore {
    pool: PgPool,
}

impl PostgresHostStore {
    /// Connect with the service's pool settings.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HostStore for PostgresHostStore {
    async fn resolve_session(&self, token_hash: &[u8]) -> Result<Option<SubjectId>> {
        let query = r"
            SELECT host_sessions.user_id
            FROM host_sessions
            JOIN users ON users.id = host_sessions.user_id
            WHERE host_sessions.session_hash = $1
              AND host_sessions.expires_at > NOW()
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup session")?;

        row.map(|row| row.try_get::<SubjectId, _>("user_id"))
            .transpose()
            .context("failed to decode session row")
    }

    async fn identity(&self, subject: SubjectId) -> Result<Option<Identity>> {
        let query = r"
            SELECT email, display_name
            FROM users
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(subject)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load user")?;
        let Some(row) = row else {
            return Ok(None);
        };
        let email: String = row.try_get("email")?;
        let display_name: String = row.try_get("display_name")?;

        let query = r"
            SELECT role
            FROM user_roles
            WHERE user_id = $1
            ORDER BY position, role
        ";
        let rows = sqlx::query(query)
            .bind(subject)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load user roles")?;
        let roles = rows
            .iter()
            .map(|row| row.try_get::<String, _>("role"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Identity::new(subject, email, display_name, roles)))
    }

    async fn credential(&self, subject: SubjectId) -> Result<Option<String>> {
        let query = r"
            SELECT api_key
            FROM user_credentials
            WHERE user_id = $1
        ";
        let row = sqlx::query(query)
            .bind(subject)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load credential")?;

        row.map(|row| row.try_get::<String, _>("api_key"))
            .transpose()
            .context("failed to decode credential row")
    }

    async fn load_settings(&self) -> Result<StoredSettings> {
        let query = r"
            SELECT name, value
            FROM sso_settings
            WHERE name = ANY($1)
        ";
        let rows = sqlx::query(query)
            .bind(vec![SETTING_WEBUI_URL, SETTING_API_URL, SETTING_API_KEY])
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to load settings")?;

        let mut stored = StoredSettings::default();
        for row in rows {
            let name: String = row.try_get("name")?;
            let value: String = row.try_get("value")?;
            match name.as_str() {
                SETTING_WEBUI_URL => stored.webui_url = Some(value),
                SETTING_API_URL => stored.api_url = Some(value),
                SETTING_API_KEY => stored.api_key = Some(value),
                _ => {}
            }
        }
        Ok(stored)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let query = r"
            INSERT INTO sso_settings (name, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE
            SET value = EXCLUDED.value, updated_at = NOW()
        ";
        let mut tx = self.pool.begin().await?;
        for (name, value) in [
            (SETTING_WEBUI_URL, &settings.webui_url),
            (SETTING_API_URL, &settings.api_url),
            (SETTING_API_KEY, &settings.api_key),
        ] {
            sqlx::query(query)
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .instrument(query_span("UPSERT", query))
                .await
                .with_context(|| format!("failed to save setting {name}"))?;
        }
        tx.commit().await.context("failed to commit settings")?;
        Ok(())
    }

    async fn ensure_page(&self, page: &ChatPage) -> Result<PageOutcome> {
        let query = r"
            INSERT INTO pages (slug, title, status, content)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(&page.slug)
            .bind(&page.title)
            .bind(&page.status)
            .bind(&page.content)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to ensure page")?;

        if result.rows_affected() == 0 {
            Ok(PageOutcome::Exists)
        } else {
            Ok(PageOutcome::Created)
        }
    }

    async fn health_check(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
