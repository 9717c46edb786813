//! # webui-sso (session bridge for WebUI)
//!
//! `webui-sso` lets users who are already signed in to a host site reach a
//! separate chat WebUI without logging in again. It never authenticates anyone
//! itself: the host site's session cookie is the only source of identity.
//!
//! ## Flows
//!
//! - **Protected route** (`/ai-chat`): anonymous visitors are redirected to the
//!   host login page with a return URL. Signed-in visitors get a handoff page
//!   that stores a short-lived signed identity assertion in `sessionStorage`
//!   and in the URL fragment, then moves to the WebUI.
//! - **Session validator** (`/admin-ajax?action=cryptolabs_validate_session`):
//!   the WebUI calls back with the browser's cookies and receives the user's
//!   identity and API key. CORS is restricted to the configured WebUI origin.
//! - **Gateway headers** (`/internal/gateway-headers`): a reverse proxy holding
//!   the shared secret gets `X-WebUI-*` identity headers for a subject.
//!
//! ## Assertions
//!
//! Assertions are `PASETO v4.public` tokens signed with Ed25519. The public key
//! is published as a `PASERK` keyset at `/paserk.json`, so the WebUI can verify
//! them offline or through `/v1/assertions/verify`.
//!
//! ## Credentials
//!
//! Each user's API key is looked up server-side. When a user has none, the
//! configured [`sso::CredentialPolicy`] decides whether the shared backend key
//! is used or the request is refused.

pub mod api;
pub mod cli;
pub mod sso;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
