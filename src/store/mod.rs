//! Read access to the host's sessions and users, plus the little state this
//! service owns (settings and the chat page record).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::sso::{Identity, Settings, SubjectId};

pub mod memory;
pub mod postgres;

/// Settings row as stored; any field may be unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredSettings {
    pub webui_url: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

/// Page published by the install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPage {
    pub slug: String,
    pub title: String,
    pub status: String,
    pub content: String,
}

impl Default for ChatPage {
    fn default() -> Self {
        Self {
            slug: "ai-chat".to_string(),
            title: "AI Chat".to_string(),
            status: "publish".to_string(),
            content: "<!-- Redirects to WebUI -->".to_string(),
        }
    }
}

impl ChatPage {
    /// Default page published under another slug.
    #[must_use]
    pub fn for_slug(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Created,
    Exists,
}

impl PageOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Exists => "exists",
        }
    }
}

#[async_trait]
pub trait HostStore: Send + Sync {
    /// Subject for an unexpired session with this token hash.
    async fn resolve_session(&self, token_hash: &[u8]) -> Result<Option<SubjectId>>;
    /// Identity with roles in stored order.
    async fn identity(&self, subject: SubjectId) -> Result<Option<Identity>>;
    async fn credential(&self, subject: SubjectId) -> Result<Option<String>>;
    async fn load_settings(&self) -> Result<StoredSettings>;
    /// Upsert all three settings in one write.
    async fn save_settings(&self, settings: &Settings) -> Result<()>;
    async fn ensure_page(&self, page: &ChatPage) -> Result<PageOutcome>;
    async fn health_check(&self) -> Result<()>;
    fn backend(&self) -> &'static str;
}

/// Postgres when a DSN is given, otherwise an empty in-memory store.
///
/// # Errors
/// Returns an error if the database is unreachable.
pub async fn open(dsn: Option<&str>) -> Result<Arc<dyn HostStore>> {
    match dsn {
        Some(dsn) => {
            let store = postgres::PostgresHostStore::connect(dsn).await?;
            info!("Using postgres host store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No DSN configured, using an empty in-memory host store");
            Ok(Arc::new(memory::InMemoryHostStore::new()))
        }
    }
}
