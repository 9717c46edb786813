//! Identity and credential types shared by the bridge, validator and injector.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::SsoError;

/// Host user id. Always resolved server-side, never taken from the client.
pub type SubjectId = Uuid;

/// Snapshot of a host user for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject_id: SubjectId,
    pub email: String,
    pub display_name: String,
    roles: Vec<String>,
}

impl Identity {
    /// Build an identity, keeping role order and dropping blanks and repeats.
    pub fn new<I, S>(subject_id: SubjectId, email: String, display_name: String, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for role in roles {
            let role = role.as_ref().trim();
            if role.is_empty() || unique.iter().any(|seen| seen == role) {
                continue;
            }
            unique.push(role.to_string());
        }

        Self {
            subject_id,
            email,
            display_name,
            roles: unique,
        }
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Roles joined with `,` as the downstream expects for groups.
    #[must_use]
    pub fn groups(&self) -> String {
        self.roles.join(",")
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Key stored for this user.
    User,
    /// Configured backend key used as the shared tier.
    Shared,
}

impl CredentialSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Shared => "shared",
        }
    }
}

/// API key scoped to one identity.
#[derive(Clone)]
pub struct Credential {
    value: SecretString,
    source: CredentialSource,
}

impl Credential {
    #[must_use]
    pub fn new(value: &str, source: CredentialSource) -> Self {
        Self {
            value: SecretString::from(value.to_string()),
            source,
        }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    #[must_use]
    pub const fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"***")
            .field("source", &self.source)
            .finish()
    }
}

/// What to do when a user has no stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPolicy {
    /// Fall back to the configured backend key.
    #[default]
    Shared,
    /// No fallback; a missing key is an error.
    Required,
}

impl CredentialPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Required => "required",
        }
    }

    /// Pick the credential for a user according to this policy.
    ///
    /// # Errors
    /// Returns `SsoError::CredentialMissing` when no usable key exists.
    pub fn resolve(self, user_key: Option<&str>, shared_key: &str) -> Result<Credential, SsoError> {
        if let Some(key) = user_key.map(str::trim).filter(|key| !key.is_empty()) {
            return Ok(Credential::new(key, CredentialSource::User));
        }

        match self {
            Self::Shared if !shared_key.trim().is_empty() => {
                Ok(Credential::new(shared_key.trim(), CredentialSource::Shared))
            }
            Self::Shared | Self::Required => Err(SsoError::CredentialMissing),
        }
    }
}

impl FromStr for CredentialPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "required" => Ok(Self::Required),
            other => Err(format!("unknown credential policy: {other}")),
        }
    }
}
