//! Process-wide WebUI/backend configuration.
//!
//! The in-memory copy is loaded once at startup and only replaced by an admin
//! save, after the store has accepted the write.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::{fmt, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use url::Url;
use utoipa::ToSchema;

use super::SsoError;
use crate::store::{HostStore, StoredSettings};

pub const DEFAULT_WEBUI_URL: &str = "https://webui.ai.cryptolabs.co.za";
pub const DEFAULT_API_URL: &str = "https://api.ai.cryptolabs.co.za/v1";

static TAGS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[^>]*>").ok());

#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub webui_url: String,
    pub api_url: String,
    pub api_key: String,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("webui_url", &self.webui_url)
            .field("api_url", &self.api_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl Settings {
    /// `scheme://host[:port]` of the WebUI URL.
    #[must_use]
    pub fn webui_origin(&self) -> Option<String> {
        origin_of(&self.webui_url)
    }

    /// Fill unset or blank stored values from `defaults`. Stored URLs that no
    /// longer validate are logged and replaced by the default.
    #[must_use]
    pub fn merged(stored: StoredSettings, defaults: &Self) -> Self {
        let pick = |value: Option<String>, default: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let pick_url = |field: &'static str, value: Option<String>, default: &str| {
            let value = pick(value, default);
            match validate_url(field, &value) {
                Ok(()) => value,
                Err(err) => {
                    warn!("Ignoring stored {field}: {err}");
                    default.to_string()
                }
            }
        };
        Self {
            webui_url: pick_url("webui_url", stored.webui_url, &defaults.webui_url),
            api_url: pick_url("api_url", stored.api_url, &defaults.api_url),
            api_key: pick(stored.api_key, &defaults.api_key),
        }
    }
}

/// Raw admin form input.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsForm {
    #[serde(default)]
    pub webui_url: String,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl SettingsForm {
    /// Sanitize and validate into [`Settings`].
    ///
    /// # Errors
    /// Returns `SsoError::ConfigurationInvalid` naming the first bad field.
    pub fn validate(&self) -> Result<Settings, SsoError> {
        let webui_url = sanitize_text(&self.webui_url);
        validate_url("webui_url", &webui_url)?;

        let api_url = sanitize_text(&self.api_url);
        validate_url("api_url", &api_url)?;

        let api_key = sanitize_text(&self.api_key);
        if api_key.is_empty() {
            return Err(SsoError::invalid("api_key", "must not be empty"));
        }

        Ok(Settings {
            webui_url,
            api_url,
            api_key,
        })
    }
}

/// Strip tags, drop control characters and collapse whitespace runs.
#[must_use]
pub fn sanitize_text(value: &str) -> String {
    let stripped = match TAGS.as_ref() {
        Some(re) => re.replace_all(value, ""),
        None => value.into(),
    };
    stripped
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Absolute `http`/`https` URL with a host and no spaces.
///
/// # Errors
/// Returns `SsoError::ConfigurationInvalid` for `field` describing the problem.
pub fn validate_url(field: &'static str, value: &str) -> Result<(), SsoError> {
    if value.is_empty() {
        return Err(SsoError::invalid(field, "must not be empty"));
    }
    let parsed = Url::parse(value).map_err(|err| SsoError::invalid(field, err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SsoError::invalid(field, "scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(SsoError::invalid(field, "must include a host"));
    }
    if value.contains(' ') {
        return Err(SsoError::invalid(field, "must not contain spaces"));
    }
    Ok(())
}

/// `scheme://host[:port]` for an absolute URL.
#[must_use]
pub fn origin_of(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    Some(format!("{}://{}{}", parsed.scheme(), host, port))
}

pub struct SettingsService {
    store: Arc<dyn HostStore>,
    current: RwLock<Settings>,
}

impl SettingsService {
    /// Load settings, falling back to `defaults` for anything unset. A store
    /// error is logged and the defaults are used as-is.
    pub async fn load(store: Arc<dyn HostStore>, defaults: Settings) -> Self {
        let current = match store.load_settings().await {
            Ok(stored) => Settings::merged(stored, &defaults),
            Err(err) => {
                warn!("Failed to load settings, using defaults: {err:#}");
                defaults
            }
        };

        Self {
            store,
            current: RwLock::new(current),
        }
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Validate, persist, then swap the in-memory copy. The write lock is held
    /// across the store write so concurrent saves land in the same order in
    /// both places.
    ///
    /// # Errors
    /// `ConfigurationInvalid` for bad input, `Store` if the write fails. In both
    /// cases the previous values stay in effect.
    #[instrument(skip_all)]
    pub async fn set(&self, form: &SettingsForm) -> Result<Settings, SsoError> {
        let settings = form.validate()?;

        let mut current = self.current.write().await;
        self.store.save_settings(&settings).await?;
        current.clone_from(&settings);
        info!(webui_url = %settings.webui_url, api_url = %settings.api_url, "Settings updated");

        Ok(settings)
    }
}

impl fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsService")
            .field("backend", &self.store.backend())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sso::{Identity, SubjectId},
        store::{ChatPage, PageOutcome, memory::InMemoryHostStore},
    };
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    /// Memory store whose first settings write returns late.
    struct SlowFirstSave {
        inner: InMemoryHostStore,
        delayed: AtomicBool,
    }

    #[async_trait]
    impl HostStore for SlowFirstSave {
        async fn resolve_session(&self, token_hash: &[u8]) -> anyhow::Result<Option<SubjectId>> {
            self.inner.resolve_session(token_hash).await
        }

        async fn identity(&self, subject: SubjectId) -> anyhow::Result<Option<Identity>> {
            self.inner.identity(subject).await
        }

        async fn credential(&self, subject: SubjectId) -> anyhow::Result<Option<String>> {
            self.inner.credential(subject).await
        }

        async fn load_settings(&self) -> anyhow::Result<StoredSettings> {
            self.inner.load_settings().await
        }

        async fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
            self.inner.save_settings(settings).await?;
            if !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(())
        }

        async fn ensure_page(&self, page: &ChatPage) -> anyhow::Result<PageOutcome> {
            self.inner.ensure_page(page).await
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            self.inner.health_check().await
        }

        fn backend(&self) -> &'static str {
            "slow"
        }
    }

    fn defaults() -> Settings {
        Settings {
            webui_url: DEFAULT_WEBUI_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
        }
    }

    fn form(webui_url: &str, api_url: &str, api_key: &str) -> SettingsForm {
        SettingsForm {
            webui_url: webui_url.to_string(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    #[test]
    fn sanitize_strips_tags_and_controls() {
        assert_eq!(sanitize_text("  <b>sk-1</b>\t\n "), "sk-1");
        assert_eq!(sanitize_text("a\u{0007}b   c"), "ab c");
        assert_eq!(sanitize_text("<script>x</script>"), "x");
    }

    #[test]
    fn origin_keeps_port_and_drops_path() {
        assert_eq!(
            origin_of("https://webui.example:8443/chat?x=1").as_deref(),
            Some("https://webui.example:8443")
        );
        assert_eq!(
            origin_of("https://webui.example/").as_deref(),
            Some("https://webui.example")
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let err = form("javascript:alert(1)", "https://b.example/v1", "k").validate();
        assert!(matches!(
            err,
            Err(SsoError::ConfigurationInvalid { field: "webui_url", .. })
        ));

        let err = form("https://a.example", "ftp://b.example", "k").validate();
        assert!(matches!(
            err,
            Err(SsoError::ConfigurationInvalid { field: "api_url", .. })
        ));

        let err = form("https://a.example", "https://b.example", "  ").validate();
        assert!(matches!(
            err,
            Err(SsoError::ConfigurationInvalid { field: "api_key", .. })
        ));
    }

    #[test]
    fn merged_prefers_stored_values() {
        let stored = StoredSettings {
            webui_url: Some("https://a.example/".to_string()),
            api_url: Some(" ".to_string()),
            api_key: None,
        };
        let merged = Settings::merged(stored, &defaults());
        assert_eq!(merged.webui_url, "https://a.example/");
        assert_eq!(merged.api_url, DEFAULT_API_URL);
        assert_eq!(merged.api_key, "");
    }

    #[test]
    fn merged_ignores_invalid_stored_urls() {
        let stored = StoredSettings {
            webui_url: Some("webui.example.com".to_string()),
            api_url: Some("ftp://api.example.com".to_string()),
            api_key: Some("k".to_string()),
        };
        let merged = Settings::merged(stored, &defaults());
        assert_eq!(merged.webui_url, DEFAULT_WEBUI_URL);
        assert_eq!(merged.api_url, DEFAULT_API_URL);
        assert_eq!(merged.api_key, "k");
    }

    #[test]
    fn validate_url_requires_scheme() {
        assert!(validate_url("webui_url", "https://webui.example.com").is_ok());
        assert!(matches!(
            validate_url("webui_url", "webui.example.com"),
            Err(SsoError::ConfigurationInvalid { field: "webui_url", .. })
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let settings = Settings {
            api_key: "sk-secret".to_string(),
            ..defaults()
        };
        assert!(!format!("{settings:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() -> Result<(), SsoError> {
        let store = Arc::new(InMemoryHostStore::new());
        let service = SettingsService::load(store.clone(), defaults()).await;

        let saved = service
            .set(&form("https://a.example/", "https://b.example/v1", "k1"))
            .await?;
        let current = service.get().await;
        assert_eq!(saved, current);
        assert_eq!(current.webui_url, "https://a.example/");
        assert_eq!(current.api_url, "https://b.example/v1");
        assert_eq!(current.api_key, "k1");

        let reloaded = SettingsService::load(store, defaults()).await;
        assert_eq!(reloaded.get().await, current);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_set_keeps_previous_values() {
        let service = SettingsService::load(Arc::new(InMemoryHostStore::new()), defaults()).await;
        let result = service.set(&form("", "https://b.example/v1", "k1")).await;
        assert!(result.is_err());
        assert_eq!(service.get().await, defaults());
    }

    #[tokio::test]
    async fn store_failure_keeps_previous_values() {
        let store = Arc::new(InMemoryHostStore::new());
        let service = SettingsService::load(store.clone(), defaults()).await;
        store.set_unavailable(true);

        let result = service
            .set(&form("https://a.example/", "https://b.example/v1", "k1"))
            .await;
        assert!(matches!(result, Err(SsoError::Store(_))));
        assert_eq!(service.get().await, defaults());
    }

    #[tokio::test]
    async fn overlapping_sets_keep_store_and_memory_in_step() -> anyhow::Result<()> {
        let store = Arc::new(SlowFirstSave {
            inner: InMemoryHostStore::new(),
            delayed: AtomicBool::new(false),
        });
        let service = SettingsService::load(store.clone(), defaults()).await;

        let first = form("https://a.example/", "https://api.example/v1", "k1");
        let second = form("https://b.example/", "https://api.example/v1", "k2");
        let (a, b) = tokio::join!(service.set(&first), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            service.set(&second).await
        });
        a?;
        b?;

        let persisted = store.load_settings().await?;
        let current = service.get().await;
        assert_eq!(persisted.webui_url.as_deref(), Some(current.webui_url.as_str()));
        assert_eq!(current.webui_url, "https://b.example/");
        Ok(())
    }

    #[tokio::test]
    async fn load_survives_store_failure() {
        let store = Arc::new(InMemoryHostStore::new());
        store.set_unavailable(true);
        let service = SettingsService::load(store, defaults()).await;
        assert_eq!(service.get().await, defaults());
    }
}
