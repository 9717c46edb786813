//! In-memory host store.
//!
//! Used for tests and local development when no `--dsn` is given. Nothing
//! survives a restart. Sessions are keyed by the SHA-256 hash of the token,
//! same as the Postgres backend.

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ChatPage, HostStore, PageOutcome, StoredSettings};
use crate::sso::{Identity, Settings, SubjectId, session::hash_session_token};

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<Vec<u8>, SubjectId>,
    users: HashMap<SubjectId, Identity>,
    credentials: HashMap<SubjectId, String>,
    settings: StoredSettings,
    pages: HashMap<String, ChatPage>,
}

#[derive(Debug, Default)]
pub struct InMemoryHostStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl InMemoryHostStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, identity: Identity) {
        self.state
            .write()
            .await
            .users
            .insert(identity.subject_id, identity);
    }

    /// Register a raw session token for `subject`. Only the hash is kept.
    pub async fn insert_session(&self, token: &str, subject: SubjectId) {
        self.state
            .write()
            .await
            .sessions
            .insert(hash_session_token(token), subject);
    }

    pub async fn revoke_session(&self, token: &str) {
        self.state
            .write()
            .await
            .sessions
            .remove(&hash_session_token(token));
    }

    pub async fn insert_credential(&self, subject: SubjectId, api_key: &str) {
        self.state
            .write()
            .await
            .credentials
            .insert(subject, api_key.to_string());
    }

    pub async fn page(&self, slug: &str) -> Option<ChatPage> {
        self.state.read().await.pages.get(slug).cloned()
    }

    /// Make every call fail, to exercise fail-closed paths.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("in-memory store marked unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl HostStore for InMemoryHostStore {
    async fn resolve_session(&self, token_hash: &[u8]) -> Result<Option<SubjectId>> {
        self.check()?;
        Ok(self.state.read().await.sessions.get(token_hash).copied())
    }

    async fn identity(&self, subject: SubjectId) -> Result<Option<Identity>> {
        self.check()?;
        Ok(self.state.read().await.users.get(&subject).cloned())
    }

    async fn credential(&self, subject: SubjectId) -> Result<Option<String>> {
        self.check()?;
        Ok(self.state.read().await.credentials.get(&subject).cloned())
    }

    async fn load_settings(&self) -> Result<StoredSettings> {
        self.check()?;
        Ok(self.state.read().await.settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.check()?;
        let mut state = self.state.write().await;
        state.settings = StoredSettings {
            webui_url: Some(settings.webui_url.clone()),
            api_url: Some(settings.api_url.clone()),
            api_key: Some(settings.api_key.clone()),
        };
        Ok(())
    }

    async fn ensure_page(&self, page: &ChatPage) -> Result<PageOutcome> {
        self.check()?;
        let mut state = self.state.write().await;
        if state.pages.contains_key(&page.slug) {
            debug!("Page {} already exists", page.slug);
            return Ok(PageOutcome::Exists);
        }
        state.pages.insert(page.slug.clone(), page.clone());
        Ok(PageOutcome::Created)
    }

    async fn health_check(&self) -> Result<()> {
        self.check()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn ensure_page_is_idempotent() -> Result<()> {
        let store = InMemoryHostStore::new();
        let page = ChatPage::default();
        assert_eq!(store.ensure_page(&page).await?, PageOutcome::Created);
        assert_eq!(store.ensure_page(&page).await?, PageOutcome::Exists);
        assert_eq!(store.page("ai-chat").await, Some(page));
        Ok(())
    }

    #[tokio::test]
    async fn sessions_are_hashed() -> Result<()> {
        let store = InMemoryHostStore::new();
        let subject = Uuid::from_u128(42);
        store.insert_session("raw-token", subject).await;

        assert_eq!(store.resolve_session(b"raw-token").await?, None);
        assert_eq!(
            store
                .resolve_session(&hash_session_token("raw-token"))
                .await?,
            Some(subject)
        );

        store.revoke_session("raw-token").await;
        assert_eq!(
            store
                .resolve_session(&hash_session_token("raw-token"))
                .await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn settings_round_trip() -> Result<()> {
        let store = InMemoryHostStore::new();
        assert_eq!(store.load_settings().await?, StoredSettings::default());

        let settings = Settings {
            webui_url: "https://a.example/".to_string(),
            api_url: "https://b.example/v1".to_string(),
            api_key: "k1".to_string(),
        };
        store.save_settings(&settings).await?;

        let stored = store.load_settings().await?;
        assert_eq!(stored.webui_url.as_deref(), Some("https://a.example/"));
        assert_eq!(stored.api_url.as_deref(), Some("https://b.example/v1"));
        assert_eq!(stored.api_key.as_deref(), Some("k1"));
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = InMemoryHostStore::new();
        store.set_unavailable(true);
        assert!(store.health_check().await.is_err());
        assert!(store.identity(Uuid::nil()).await.is_err());
    }
}
