//! Trusted identity headers for the AI gateway.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{Credential, CredentialPolicy, Identity, SettingsService, SsoError, SubjectId};
use crate::store::HostStore;

pub const HEADER_EMAIL: HeaderName = HeaderName::from_static("x-webui-email");
pub const HEADER_NAME: HeaderName = HeaderName::from_static("x-webui-name");
pub const HEADER_GROUPS: HeaderName = HeaderName::from_static("x-webui-groups");
pub const HEADER_API_KEY: HeaderName = HeaderName::from_static("x-user-api-key");

/// Set the four identity headers on `headers`, replacing any existing values.
///
/// If any value is not a valid header value the input is returned untouched.
#[must_use]
pub fn apply_identity_headers(
    headers: HeaderMap,
    identity: &Identity,
    credential: &Credential,
) -> HeaderMap {
    let values = (
        HeaderValue::from_str(&identity.email),
        HeaderValue::from_str(&identity.display_name),
        HeaderValue::from_str(&identity.groups()),
        HeaderValue::from_str(credential.expose()),
    );
    let (Ok(email), Ok(name), Ok(groups), Ok(mut api_key)) = values else {
        warn!(subject = %identity.subject_id, "Identity has a value that is not a valid header value");
        return headers;
    };
    api_key.set_sensitive(true);

    let mut headers = headers;
    headers.insert(HEADER_EMAIL, email);
    headers.insert(HEADER_NAME, name);
    headers.insert(HEADER_GROUPS, groups);
    headers.insert(HEADER_API_KEY, api_key);
    headers
}

/// Resolve the credential for `subject` under `policy`.
///
/// # Errors
/// `Store` if the lookup fails, `CredentialMissing` if the policy yields nothing.
pub async fn lookup_credential(
    store: &dyn HostStore,
    settings: &SettingsService,
    policy: CredentialPolicy,
    subject: SubjectId,
) -> Result<Credential, SsoError> {
    let user_key = store.credential(subject).await?;
    let shared_key = settings.get().await.api_key;
    let credential = policy.resolve(user_key.as_deref(), &shared_key)?;
    debug!(%subject, source = credential.source().as_str(), "Resolved credential");
    Ok(credential)
}

pub struct HeaderInjector {
    store: Arc<dyn HostStore>,
    settings: Arc<SettingsService>,
    policy: CredentialPolicy,
}

impl HeaderInjector {
    #[must_use]
    pub fn new(
        store: Arc<dyn HostStore>,
        settings: Arc<SettingsService>,
        policy: CredentialPolicy,
    ) -> Self {
        Self {
            store,
            settings,
            policy,
        }
    }

    /// Add identity headers for a server-resolved subject.
    ///
    /// Unknown subjects, lookup failures and missing credentials leave the
    /// headers unchanged.
    #[instrument(skip(self, headers))]
    pub async fn augment(&self, headers: HeaderMap, subject: SubjectId) -> HeaderMap {
        let identity = match self.store.identity(subject).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!("Unknown subject, headers unchanged");
                return headers;
            }
            Err(err) => {
                warn!("Identity lookup failed, headers unchanged: {err:#}");
                return headers;
            }
        };

        match lookup_credential(self.store.as_ref(), &self.settings, self.policy, subject).await {
            Ok(credential) => apply_identity_headers(headers, &identity, &credential),
            Err(err) => {
                warn!("No credential for subject, headers unchanged: {err}");
                headers
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::{CredentialSource, Settings};
    use crate::store::memory::InMemoryHostStore;
    use uuid::Uuid;

    fn alice() -> Identity {
        Identity::new(
            Uuid::from_u128(1),
            "alice@example.com".to_string(),
            "Alice Example".to_string(),
            ["editor", "subscriber"],
        )
    }

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert(HEADER_EMAIL, HeaderValue::from_static("mallory@example.com"));
        headers
    }

    async fn injector(policy: CredentialPolicy, shared_key: &str) -> (Arc<InMemoryHostStore>, HeaderInjector) {
        let store = Arc::new(InMemoryHostStore::new());
        store.insert_user(alice()).await;
        let settings = SettingsService::load(
            store.clone(),
            Settings {
                webui_url: "https://webui.example".to_string(),
                api_url: "https://api.example/v1".to_string(),
                api_key: shared_key.to_string(),
            },
        )
        .await;
        let injector = HeaderInjector::new(store.clone(), Arc::new(settings), policy);
        (store, injector)
    }

    #[test]
    fn apply_replaces_smuggled_values() {
        let credential = Credential::new("sk-alice", CredentialSource::User);
        let out = apply_identity_headers(inbound(), &alice(), &credential);

        assert_eq!(out.get_all(HEADER_EMAIL).iter().count(), 1);
        assert_eq!(out.get(HEADER_EMAIL), Some(&HeaderValue::from_static("alice@example.com")));
        assert_eq!(out.get(HEADER_NAME), Some(&HeaderValue::from_static("Alice Example")));
        assert_eq!(out.get(HEADER_GROUPS), Some(&HeaderValue::from_static("editor,subscriber")));
        assert_eq!(out.get(HEADER_API_KEY), Some(&HeaderValue::from_static("sk-alice")));
        assert_eq!(out.get("content-type"), Some(&HeaderValue::from_static("application/json")));
    }

    #[test]
    fn apply_with_invalid_value_is_noop() {
        let identity = Identity::new(
            Uuid::from_u128(2),
            "bob@example.com".to_string(),
            "Bob\nInjected: yes".to_string(),
            ["editor"],
        );
        let credential = Credential::new("sk-bob", CredentialSource::User);
        let out = apply_identity_headers(inbound(), &identity, &credential);
        assert_eq!(out, inbound());
    }

    #[tokio::test]
    async fn augment_uses_user_key() {
        let (store, injector) = injector(CredentialPolicy::Shared, "sk-shared").await;
        store.insert_credential(Uuid::from_u128(1), "sk-alice").await;

        let out = injector.augment(inbound(), Uuid::from_u128(1)).await;
        assert_eq!(out.get(HEADER_API_KEY), Some(&HeaderValue::from_static("sk-alice")));
        for (name, value) in &inbound() {
            if name != HEADER_EMAIL {
                assert_eq!(out.get(name), Some(value));
            }
        }
    }

    #[tokio::test]
    async fn augment_falls_back_to_shared_key() {
        let (_store, injector) = injector(CredentialPolicy::Shared, "sk-shared").await;
        let out = injector.augment(HeaderMap::new(), Uuid::from_u128(1)).await;
        assert_eq!(out.get(HEADER_API_KEY), Some(&HeaderValue::from_static("sk-shared")));
        assert_eq!(out.len(), 4);
    }

    #[tokio::test]
    async fn augment_unknown_subject_is_noop() {
        let (_store, injector) = injector(CredentialPolicy::Shared, "sk-shared").await;
        let out = injector.augment(inbound(), Uuid::from_u128(99)).await;
        assert_eq!(out, inbound());
    }

    #[tokio::test]
    async fn augment_required_without_key_is_noop() {
        let (_store, injector) = injector(CredentialPolicy::Required, "sk-shared").await;
        let out = injector.augment(inbound(), Uuid::from_u128(1)).await;
        assert_eq!(out, inbound());
    }

    #[tokio::test]
    async fn augment_store_failure_is_noop() {
        let (store, injector) = injector(CredentialPolicy::Shared, "sk-shared").await;
        store.set_unavailable(true);
        let out = injector.augment(inbound(), Uuid::from_u128(1)).await;
        assert_eq!(out, inbound());
    }
}
