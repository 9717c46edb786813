use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};

use super::install::ensure_chat_page;
use crate::{
    api::{self, AppState, SsoConfig},
    cli::telemetry,
    sso::{AssertionSigner, CredentialPolicy, Settings, SettingsService},
    store,
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub public_url: String,
    pub chat_path: String,
    pub login_url: String,
    pub login_return_param: String,
    pub session_cookie: String,
    pub admin_role: String,
    pub ensure_page: bool,
    pub webui_url: String,
    pub api_url: String,
    pub api_key: Option<SecretString>,
    pub credential_policy: CredentialPolicy,
    pub assertion_ttl_seconds: i64,
    pub assertion_signing_seed: Option<SecretString>,
    pub gateway_secret: Option<SecretString>,
}

impl Args {
    fn settings_defaults(&self) -> Settings {
        Settings {
            webui_url: self.webui_url.clone(),
            api_url: self.api_url.clone(),
            api_key: self
                .api_key
                .as_ref()
                .map(|key| key.expose_secret().to_string())
                .unwrap_or_default(),
        }
    }

    fn sso_config(&self) -> SsoConfig {
        SsoConfig::new()
            .with_chat_path(&self.chat_path)
            .with_login_url(self.login_url.clone())
            .with_login_return_param(self.login_return_param.clone())
            .with_session_cookie(self.session_cookie.clone())
            .with_admin_role(self.admin_role.clone())
            .with_credential_policy(self.credential_policy)
            .with_gateway_secret(self.gateway_secret.clone())
    }
}

fn signer(args: &Args) -> Result<AssertionSigner> {
    let issuer = args.public_url.clone();
    match &args.assertion_signing_seed {
        Some(seed) => AssertionSigner::from_seed_base64(
            seed.expose_secret(),
            issuer,
            args.assertion_ttl_seconds,
        )
        .context("Invalid --assertion-signing-seed"),
        None => {
            warn!(
                "No assertion signing seed configured, generated an ephemeral key; assertions will not verify after a restart"
            );
            AssertionSigner::generate(issuer, args.assertion_ttl_seconds)
                .context("Failed to generate assertion signing key")
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, the signing key is invalid, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = store::open(args.dsn.as_deref()).await?;

    if args.ensure_page {
        ensure_chat_page(store.as_ref(), &args.chat_path).await?;
    }

    let settings = Arc::new(SettingsService::load(store.clone(), args.settings_defaults()).await);
    let signer = Arc::new(signer(&args)?);
    info!(kid = signer.kid(), issuer = signer.issuer(), "Assertion signer ready");

    let config = args.sso_config();
    if config.gateway_secret().is_none() {
        info!("No gateway secret configured, /internal/gateway-headers is disabled");
    }
    let state = Arc::new(AppState::new(config, store, settings, signer)?);

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            port: 8080,
            dsn: None,
            public_url: "https://sso.example.com".to_string(),
            chat_path: "ai-chat".to_string(),
            login_url: "/wp-login.php".to_string(),
            login_return_param: "redirect_to".to_string(),
            session_cookie: "sso_session".to_string(),
            admin_role: "administrator".to_string(),
            ensure_page: true,
            webui_url: "https://webui.example.com".to_string(),
            api_url: "https://api.example.com/v1".to_string(),
            api_key: Some(SecretString::from("sk-shared".to_string())),
            credential_policy: CredentialPolicy::Required,
            assertion_ttl_seconds: 120,
            assertion_signing_seed: None,
            gateway_secret: None,
        }
    }

    #[test]
    fn settings_defaults_expose_key_to_service_only() {
        let defaults = args().settings_defaults();
        assert_eq!(defaults.api_key, "sk-shared");
        assert!(!format!("{defaults:?}").contains("sk-shared"));
    }

    #[test]
    fn config_carries_policy() {
        let config = args().sso_config();
        assert_eq!(config.credential_policy(), CredentialPolicy::Required);
        assert_eq!(config.chat_path(), "ai-chat");
        assert!(config.gateway_secret().is_none());
    }

    #[test]
    fn signer_uses_public_url_as_issuer() {
        let signer = signer(&args()).expect("generated signer");
        assert_eq!(signer.issuer(), "https://sso.example.com");
        assert_eq!(signer.ttl_seconds(), 120);
    }

    #[test]
    fn bad_seed_is_rejected() {
        let mut args = args();
        args.assertion_signing_seed = Some(SecretString::from("not base64!".to_string()));
        assert!(signer(&args).is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let mut args = args();
        args.gateway_secret = Some(SecretString::from("gw-secret".to_string()));
        let rendered = format!("{args:?}");
        assert!(!rendered.contains("sk-shared"));
        assert!(!rendered.contains("gw-secret"));
    }
}
