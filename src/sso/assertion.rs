//! Signed identity assertions handed from the bridge to WebUI.
//!
//! Assertions are PASETO `v4.public` tokens signed with an in-process Ed25519
//! key. The footer carries the PASERK id (`k4.pid.*`) of the signing key so the
//! downstream service can pick the right key out of `/paserk.json` and verify
//! offline. Nothing about an assertion is stored server-side.

use base64ct::{Base64, Encoding};
use ed25519_dalek::SigningKey;
use pasetors::{
    Public,
    errors::Error as PasetorsError,
    keys::{AsymmetricPublicKey, AsymmetricSecretKey},
    paserk::{FormatAsPaserk, Id},
    token::UntrustedToken,
    version4::{PublicToken, V4},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use ulid::Ulid;
use utoipa::ToSchema;

use super::Identity;

pub const MIN_TTL_SECONDS: i64 = 30;
pub const MAX_TTL_SECONDS: i64 = 600;
pub const DEFAULT_TTL_SECONDS: i64 = 120;

const KEYSET_VERSION: &str = "v4";
const KEYSET_PURPOSE: &str = "public";

#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid footer")]
    InvalidFooter,
    #[error("missing footer")]
    MissingFooter,
    #[error("invalid base64 encoding")]
    Base64,
    #[error("invalid signing key")]
    InvalidKey,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unknown key id: {0}")]
    UnknownKid(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("invalid issued-at")]
    InvalidIat,
    #[error("invalid expiration")]
    InvalidExp,
    #[error("assertion expired")]
    Expired,
    #[error("invalid assertion ttl")]
    InvalidTtl,
    #[error("time format error")]
    TimeFormat,
}

/// Claims carried by an identity assertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct AssertionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub iat: String,
    pub exp: String,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct AssertionFooter {
    kid: String,
}

/// Public keys published for offline verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PaserkKeySet {
    pub version: String,
    pub purpose: String,
    pub active_kid: String,
    pub keys: Vec<PaserkKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PaserkKey {
    pub kid: String,
    pub paserk: String,
}

impl PaserkKeySet {
    /// Serialize this PASERK keyset to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Mints and verifies assertions with a single Ed25519 key.
pub struct AssertionSigner {
    secret_key: AsymmetricSecretKey<V4>,
    public_key: AsymmetricPublicKey<V4>,
    kid: String,
    paserk: String,
    issuer: String,
    ttl_seconds: i64,
}

impl AssertionSigner {
    /// Build a signer from a raw 32-byte Ed25519 seed.
    ///
    /// # Errors
    /// Returns an error if the TTL is out of range or the key cannot be encoded.
    pub fn from_seed(seed: &[u8; 32], issuer: String, ttl_seconds: i64) -> Result<Self, AssertionError> {
        if !(MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(AssertionError::InvalidTtl);
        }

        let signing_key = SigningKey::from_bytes(seed);
        let secret_key = AsymmetricSecretKey::<V4>::from(&signing_key.to_keypair_bytes())
            .map_err(|_| AssertionError::InvalidKey)?;
        let public_key =
            AsymmetricPublicKey::<V4>::from(signing_key.verifying_key().to_bytes().as_slice())
                .map_err(|_| AssertionError::InvalidKey)?;
        let paserk = format_paserk(&public_key)?;
        let kid = format_kid(&public_key)?;

        Ok(Self {
            secret_key,
            public_key,
            kid,
            paserk,
            issuer,
            ttl_seconds,
        })
    }

    /// Build a signer from a standard base64 32-byte seed.
    ///
    /// # Errors
    /// Returns an error if the seed is not valid base64 or not 32 bytes.
    pub fn from_seed_base64(seed_b64: &str, issuer: String, ttl_seconds: i64) -> Result<Self, AssertionError> {
        let raw = Base64::decode_vec(seed_b64.trim()).map_err(|_| AssertionError::Base64)?;
        let seed: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| AssertionError::InvalidKey)?;
        Self::from_seed(&seed, issuer, ttl_seconds)
    }

    /// Build a signer with a fresh random key.
    ///
    /// # Errors
    /// Returns an error if the OS RNG fails or the TTL is out of range.
    pub fn generate(issuer: String, ttl_seconds: i64) -> Result<Self, AssertionError> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|_| AssertionError::InvalidKey)?;
        Self::from_seed(&seed, issuer, ttl_seconds)
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn keyset(&self) -> PaserkKeySet {
        PaserkKeySet {
            version: KEYSET_VERSION.to_string(),
            purpose: KEYSET_PURPOSE.to_string(),
            active_kid: self.kid.clone(),
            keys: vec![PaserkKey {
                kid: self.kid.clone(),
                paserk: self.paserk.clone(),
            }],
        }
    }

    /// Build claims for `identity`, valid from `now` for the configured TTL.
    ///
    /// # Errors
    /// Returns an error if the timestamps cannot be formatted.
    pub fn make_claims(
        &self,
        identity: &Identity,
        audience: &str,
        now_unix_seconds: i64,
    ) -> Result<AssertionClaims, AssertionError> {
        Ok(AssertionClaims {
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            sub: identity.subject_id.to_string(),
            email: identity.email.clone(),
            name: identity.display_name.clone(),
            roles: identity.roles().to_vec(),
            iat: rfc3339_from_unix(now_unix_seconds)?,
            exp: rfc3339_from_unix(now_unix_seconds + self.ttl_seconds)?,
            jti: Ulid::new().to_string(),
        })
    }

    /// Sign an assertion for `identity` addressed to `audience`.
    ///
    /// # Errors
    /// Returns an error if claims cannot be built or signing fails.
    pub fn sign(
        &self,
        identity: &Identity,
        audience: &str,
        now_unix_seconds: i64,
    ) -> Result<String, AssertionError> {
        let claims = self.make_claims(identity, audience, now_unix_seconds)?;
        self.sign_claims(&claims)
    }

    fn sign_claims(&self, claims: &AssertionClaims) -> Result<String, AssertionError> {
        let payload = serde_json::to_vec(claims)?;
        let footer = serde_json::to_vec(&AssertionFooter {
            kid: self.kid.clone(),
        })?;
        PublicToken::sign(&self.secret_key, &payload, Some(footer.as_slice()), None)
            .map_err(|err| map_paseto_error(&err))
    }

    /// Verify a token minted by this signer and return its claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, signed by another key, or
    /// fails claim validation (`iss`, `aud`, `iat`, `exp`, ttl).
    pub fn verify(
        &self,
        token: &str,
        expected_audience: &str,
        now_unix_seconds: i64,
    ) -> Result<AssertionClaims, AssertionError> {
        let untrusted = UntrustedToken::<Public, V4>::try_from(token.trim())
            .map_err(|err| map_paseto_error(&err))?;
        let footer_bytes = untrusted.untrusted_footer();
        if footer_bytes.is_empty() {
            return Err(AssertionError::MissingFooter);
        }
        let footer: AssertionFooter =
            serde_json::from_slice(footer_bytes).map_err(|_| AssertionError::InvalidFooter)?;
        if footer.kid != self.kid {
            return Err(AssertionError::UnknownKid(footer.kid));
        }

        let trusted = PublicToken::verify(&self.public_key, &untrusted, None, None)
            .map_err(|err| map_paseto_error(&err))?;
        let claims: AssertionClaims = serde_json::from_str(trusted.payload())?;
        self.validate_claims(&claims, expected_audience, now_unix_seconds)?;
        Ok(claims)
    }

    fn validate_claims(
        &self,
        claims: &AssertionClaims,
        expected_audience: &str,
        now_unix_seconds: i64,
    ) -> Result<(), AssertionError> {
        if claims.iss != self.issuer {
            return Err(AssertionError::InvalidIssuer);
        }
        if claims.aud != expected_audience {
            return Err(AssertionError::InvalidAudience);
        }

        let iat = unix_from_rfc3339(&claims.iat).map_err(|_| AssertionError::InvalidIat)?;
        let exp = unix_from_rfc3339(&claims.exp).map_err(|_| AssertionError::InvalidExp)?;

        if iat > now_unix_seconds {
            return Err(AssertionError::InvalidIat);
        }
        if exp <= now_unix_seconds {
            return Err(AssertionError::Expired);
        }
        if exp <= iat || exp - iat > MAX_TTL_SECONDS {
            return Err(AssertionError::InvalidTtl);
        }

        Ok(())
    }
}

impl fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionSigner")
            .field("kid", &self.kid)
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("secret_key", &"***")
            .finish_non_exhaustive()
    }
}

#[must_use]
pub fn now_unix_seconds() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Convert a unix timestamp to RFC3339.
///
/// # Errors
/// Returns an error if formatting fails.
pub fn rfc3339_from_unix(unix_seconds: i64) -> Result<String, AssertionError> {
    let dt = OffsetDateTime::from_unix_timestamp(unix_seconds)
        .map_err(|_| AssertionError::TimeFormat)?;
    dt.format(&Rfc3339).map_err(|_| AssertionError::TimeFormat)
}

/// Parse an RFC3339 timestamp into unix seconds.
///
/// # Errors
/// Returns an error if parsing fails.
pub fn unix_from_rfc3339(value: &str) -> Result<i64, AssertionError> {
    let dt = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| AssertionError::TimeFormat)?;
    Ok(dt.unix_timestamp())
}

fn format_paserk(key: &AsymmetricPublicKey<V4>) -> Result<String, AssertionError> {
    let mut paserk = String::new();
    key.fmt(&mut paserk)
        .map_err(|_| AssertionError::InvalidKey)?;
    Ok(paserk)
}

fn format_kid(key: &AsymmetricPublicKey<V4>) -> Result<String, AssertionError> {
    let id = Id::from(key);
    let mut kid = String::new();
    id.fmt(&mut kid).map_err(|_| AssertionError::InvalidKey)?;
    Ok(kid)
}

fn map_paseto_error(err: &PasetorsError) -> AssertionError {
    match err {
        PasetorsError::Base64 => AssertionError::Base64,
        PasetorsError::TokenValidation => AssertionError::InvalidSignature,
        PasetorsError::FooterParsing => AssertionError::InvalidFooter,
        PasetorsError::Key => AssertionError::InvalidKey,
        _ => AssertionError::TokenFormat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000;
    const ISSUER: &str = "https://sso.example.test";
    const AUDIENCE: &str = "https://webui.example.test";

    fn signer(seed: u8) -> Result<AssertionSigner, AssertionError> {
        AssertionSigner::from_seed(&[seed; 32], ISSUER.to_string(), DEFAULT_TTL_SECONDS)
    }

    fn alice() -> Identity {
        Identity::new(
            Uuid::from_u128(7),
            "alice@example.com".to_string(),
            "Alice Example".to_string(),
            ["administrator", "editor"],
        )
    }

    #[test]
    fn sign_and_verify() -> Result<(), AssertionError> {
        let signer = signer(7)?;
        let token = signer.sign(&alice(), AUDIENCE, NOW)?;
        assert!(token.starts_with("v4.public."));

        let claims = signer.verify(&token, AUDIENCE, NOW + 1)?;
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.name, "Alice Example");
        assert_eq!(claims.roles, vec!["administrator", "editor"]);
        assert_eq!(claims.sub, Uuid::from_u128(7).to_string());
        assert_eq!(claims.iss, ISSUER);
        Ok(())
    }

    #[test]
    fn verify_rejects_expired() -> Result<(), AssertionError> {
        let signer = signer(7)?;
        let token = signer.sign(&alice(), AUDIENCE, NOW)?;
        let result = signer.verify(&token, AUDIENCE, NOW + DEFAULT_TTL_SECONDS);
        assert!(matches!(result, Err(AssertionError::Expired)));
        Ok(())
    }

    #[test]
    fn verify_rejects_future_iat() -> Result<(), AssertionError> {
        let signer = signer(7)?;
        let token = signer.sign(&alice(), AUDIENCE, NOW)?;
        let result = signer.verify(&token, AUDIENCE, NOW - 10);
        assert!(matches!(result, Err(AssertionError::InvalidIat)));
        Ok(())
    }

    #[test]
    fn verify_rejects_other_audience() -> Result<(), AssertionError> {
        let signer = signer(7)?;
        let token = signer.sign(&alice(), AUDIENCE, NOW)?;
        let result = signer.verify(&token, "https://evil.example.test", NOW);
        assert!(matches!(result, Err(AssertionError::InvalidAudience)));
        Ok(())
    }

    #[test]
    fn verify_rejects_foreign_key() -> Result<(), AssertionError> {
        let ours = signer(7)?;
        let theirs = signer(9)?;
        let token = theirs.sign(&alice(), AUDIENCE, NOW)?;
        let result = ours.verify(&token, AUDIENCE, NOW);
        assert!(matches!(result, Err(AssertionError::UnknownKid(kid)) if kid == theirs.kid()));
        Ok(())
    }

    #[test]
    fn verify_rejects_garbage() -> Result<(), AssertionError> {
        let signer = signer(7)?;
        assert!(signer.verify("not-a-token", AUDIENCE, NOW).is_err());
        assert!(signer.verify("", AUDIENCE, NOW).is_err());
        Ok(())
    }

    #[test]
    fn ttl_out_of_range_rejected() {
        let result = AssertionSigner::from_seed(&[1; 32], ISSUER.to_string(), MAX_TTL_SECONDS + 1);
        assert!(matches!(result, Err(AssertionError::InvalidTtl)));
        let result = AssertionSigner::from_seed(&[1; 32], ISSUER.to_string(), MIN_TTL_SECONDS - 1);
        assert!(matches!(result, Err(AssertionError::InvalidTtl)));
    }

    #[test]
    fn seed_base64_must_be_32_bytes() {
        let short = Base64::encode_string(&[1u8; 16]);
        let result = AssertionSigner::from_seed_base64(&short, ISSUER.to_string(), 120);
        assert!(matches!(result, Err(AssertionError::InvalidKey)));

        let result = AssertionSigner::from_seed_base64("%%%", ISSUER.to_string(), 120);
        assert!(matches!(result, Err(AssertionError::Base64)));
    }

    #[test]
    fn same_seed_same_kid() -> Result<(), AssertionError> {
        let seed = Base64::encode_string(&[3u8; 32]);
        let first = AssertionSigner::from_seed_base64(&seed, ISSUER.to_string(), 120)?;
        let second = AssertionSigner::from_seed(&[3u8; 32], ISSUER.to_string(), 60)?;
        assert_eq!(first.kid(), second.kid());
        assert!(first.kid().starts_with("k4.pid."));
        Ok(())
    }

    #[test]
    fn keyset_lists_active_key() -> Result<(), AssertionError> {
        let signer = signer(5)?;
        let keyset = signer.keyset();
        assert_eq!(keyset.version, "v4");
        assert_eq!(keyset.purpose, "public");
        assert_eq!(keyset.active_kid, signer.kid());
        assert_eq!(keyset.keys.len(), 1);
        assert!(keyset.keys[0].paserk.starts_with("k4.public."));
        Ok(())
    }

    #[test]
    fn debug_hides_secret() -> Result<(), AssertionError> {
        let rendered = format!("{:?}", signer(5)?);
        assert!(rendered.contains("***"));
        Ok(())
    }

    #[test]
    fn rfc3339_round_trip() -> Result<(), AssertionError> {
        let formatted = rfc3339_from_unix(NOW)?;
        assert_eq!(unix_from_rfc3339(&formatted)?, NOW);
        Ok(())
    }
}
