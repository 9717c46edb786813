//! Resolve the caller's host session into an [`Identity`].
//!
//! The raw token is read from the `Authorization: Bearer` header or the session
//! cookie and only its SHA-256 hash is sent to the store.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use super::{Identity, SsoError};
use crate::store::HostStore;

pub const DEFAULT_SESSION_COOKIE: &str = "sso_session";

#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Bearer token first, then the named cookie.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }

    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            let val = val.trim();
            if key.trim() == cookie_name && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }

    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the current session to an identity.
///
/// Returns `Ok(None)` when there is no token, the session is unknown or
/// expired, or the user row is gone.
///
/// # Errors
/// Returns `SsoError::Store` if the store cannot answer. Callers treat that as
/// unauthenticated.
pub async fn authenticate(
    headers: &HeaderMap,
    cookie_name: &str,
    store: &dyn HostStore,
) -> Result<Option<Identity>, SsoError> {
    let Some(token) = extract_session_token(headers, cookie_name) else {
        return Ok(None);
    };
    let token_hash = hash_session_token(&token);

    let subject = store.resolve_session(&token_hash).await.map_err(|err| {
        error!("Failed to lookup session: {err:#}");
        SsoError::Store(err)
    })?;
    let Some(subject) = subject else {
        debug!("Session token did not match an active session");
        return Ok(None);
    };

    store.identity(subject).await.map_err(|err| {
        error!("Failed to load identity for {subject}: {err:#}");
        SsoError::Store(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryHostStore;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            if let (Ok(name), Ok(value)) = (
                name.parse::<axum::http::HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }

    #[test]
    fn token_from_cookie() {
        let map = headers(&[("cookie", "theme=dark; sso_session=abc123; other=1")]);
        assert_eq!(
            extract_session_token(&map, DEFAULT_SESSION_COOKIE).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let map = headers(&[
            ("authorization", "Bearer tok-1"),
            ("cookie", "sso_session=tok-2"),
        ]);
        assert_eq!(
            extract_session_token(&map, DEFAULT_SESSION_COOKIE).as_deref(),
            Some("tok-1")
        );
    }

    #[test]
    fn other_cookie_names_ignored() {
        let map = headers(&[("cookie", "sso_session_old=abc; flag")]);
        assert_eq!(extract_session_token(&map, DEFAULT_SESSION_COOKIE), None);
    }

    #[test]
    fn empty_values_ignored() {
        let map = headers(&[("authorization", "Bearer   "), ("cookie", "sso_session=")]);
        assert_eq!(extract_session_token(&map, DEFAULT_SESSION_COOKIE), None);
    }

    #[test]
    fn second_cookie_header_is_read() {
        let map = headers(&[("cookie", "a=1"), ("cookie", "sso_session=later")]);
        assert_eq!(
            extract_session_token(&map, DEFAULT_SESSION_COOKIE).as_deref(),
            Some("later")
        );
    }

    #[test]
    fn hash_is_sha256() {
        let hash = hash_session_token("abc");
        assert_eq!(hash.len(), 32);
        assert_ne!(hash, hash_session_token("abd"));
    }

    #[tokio::test]
    async fn authenticate_resolves_identity() -> Result<(), SsoError> {
        let store = InMemoryHostStore::new();
        let subject = Uuid::from_u128(1);
        store.insert_user(Identity::new(
            subject,
            "alice@example.com".to_string(),
            "Alice".to_string(),
            ["editor"],
        ))
        .await;
        store.insert_session("tok-alice", subject).await;

        let map = headers(&[("cookie", "sso_session=tok-alice")]);
        let identity = authenticate(&map, DEFAULT_SESSION_COOKIE, &store).await?;
        assert_eq!(identity.map(|id| id.email), Some("alice@example.com".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn authenticate_unknown_token_is_none() -> Result<(), SsoError> {
        let store = InMemoryHostStore::new();
        let map = headers(&[("cookie", "sso_session=nope")]);
        assert!(authenticate(&map, DEFAULT_SESSION_COOKIE, &store).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn authenticate_fails_closed_on_store_error() {
        let store = InMemoryHostStore::new();
        store.set_unavailable(true);
        let map = headers(&[("cookie", "sso_session=tok")]);
        let result = authenticate(&map, DEFAULT_SESSION_COOKIE, &store).await;
        assert!(matches!(result, Err(SsoError::Store(_))));
    }
}
