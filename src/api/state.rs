//! Shared request state and runtime configuration.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{fmt, sync::Arc, time::Duration};

use super::handlers::ajax::ActionRegistry;
use crate::{
    APP_USER_AGENT,
    sso::{
        AssertionSigner, CredentialPolicy, HeaderInjector, SettingsService,
        session::DEFAULT_SESSION_COOKIE,
    },
    store::HostStore,
};

pub const DEFAULT_CHAT_PATH: &str = "ai-chat";
pub const DEFAULT_LOGIN_URL: &str = "/wp-login.php";
pub const DEFAULT_LOGIN_RETURN_PARAM: &str = "redirect_to";
pub const DEFAULT_ADMIN_ROLE: &str = "administrator";
const DOWNSTREAM_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct SsoConfig {
    chat_path: String,
    login_url: String,
    login_return_param: String,
    session_cookie: String,
    admin_role: String,
    credential_policy: CredentialPolicy,
    gateway_secret: Option<SecretString>,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SsoConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            login_return_param: DEFAULT_LOGIN_RETURN_PARAM.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            credential_policy: CredentialPolicy::default(),
            gateway_secret: None,
        }
    }

    /// Path segment(s) of the protected route, without surrounding slashes.
    #[must_use]
    pub fn with_chat_path(mut self, path: &str) -> Self {
        let trimmed = path.trim().trim_matches('/');
        if !trimmed.is_empty() {
            self.chat_path = trimmed.to_string();
        }
        self
    }

    #[must_use]
    pub fn with_login_url(mut self, url: String) -> Self {
        self.login_url = url;
        self
    }

    #[must_use]
    pub fn with_login_return_param(mut self, param: String) -> Self {
        self.login_return_param = param;
        self
    }

    #[must_use]
    pub fn with_session_cookie(mut self, name: String) -> Self {
        self.session_cookie = name;
        self
    }

    #[must_use]
    pub fn with_admin_role(mut self, role: String) -> Self {
        self.admin_role = role;
        self
    }

    #[must_use]
    pub const fn with_credential_policy(mut self, policy: CredentialPolicy) -> Self {
        self.credential_policy = policy;
        self
    }

    #[must_use]
    pub fn with_gateway_secret(mut self, secret: Option<SecretString>) -> Self {
        self.gateway_secret = secret;
        self
    }

    #[must_use]
    pub fn chat_path(&self) -> &str {
        &self.chat_path
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    #[must_use]
    pub fn login_return_param(&self) -> &str {
        &self.login_return_param
    }

    #[must_use]
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    #[must_use]
    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    #[must_use]
    pub const fn credential_policy(&self) -> CredentialPolicy {
        self.credential_policy
    }

    #[must_use]
    pub const fn gateway_secret(&self) -> Option<&SecretString> {
        self.gateway_secret.as_ref()
    }
}

impl fmt::Debug for SsoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsoConfig")
            .field("chat_path", &self.chat_path)
            .field("login_url", &self.login_url)
            .field("login_return_param", &self.login_return_param)
            .field("session_cookie", &self.session_cookie)
            .field("admin_role", &self.admin_role)
            .field("credential_policy", &self.credential_policy)
            .field("gateway_secret", &self.gateway_secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Everything a handler needs, shared behind an `Arc`.
pub struct AppState {
    config: SsoConfig,
    store: Arc<dyn HostStore>,
    settings: Arc<SettingsService>,
    signer: Arc<AssertionSigner>,
    injector: HeaderInjector,
    actions: ActionRegistry,
    http: reqwest::Client,
}

impl AppState {
    /// # Errors
    /// Returns an error if the outbound HTTP client cannot be built.
    pub fn new(
        config: SsoConfig,
        store: Arc<dyn HostStore>,
        settings: Arc<SettingsService>,
        signer: Arc<AssertionSigner>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(DOWNSTREAM_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build HTTP client")?;
        let injector =
            HeaderInjector::new(store.clone(), settings.clone(), config.credential_policy());

        Ok(Self {
            config,
            store,
            settings,
            signer,
            injector,
            actions: ActionRegistry::with_defaults(),
            http,
        })
    }

    /// Replace the AJAX action registry built by [`AppState::new`].
    #[must_use]
    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &SsoConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn HostStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    #[must_use]
    pub fn signer(&self) -> &AssertionSigner {
        &self.signer
    }

    #[must_use]
    pub const fn injector(&self) -> &HeaderInjector {
        &self.injector
    }

    #[must_use]
    pub const fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store.backend())
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_path_is_trimmed() {
        let config = SsoConfig::new().with_chat_path("/chat/ai/");
        assert_eq!(config.chat_path(), "chat/ai");

        let config = SsoConfig::new().with_chat_path("///");
        assert_eq!(config.chat_path(), DEFAULT_CHAT_PATH);
    }

    #[test]
    fn debug_hides_gateway_secret() {
        let config =
            SsoConfig::new().with_gateway_secret(Some(SecretString::from("s3cret".to_string())));
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }
}
