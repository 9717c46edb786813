//! Identity handoff between the host site and WebUI.
//!
//! Everything in here is request-scoped except the [`settings::SettingsService`],
//! which holds the process-wide configuration, and the
//! [`assertion::AssertionSigner`], which holds the signing key.

pub mod assertion;
mod error;
pub mod identity;
pub mod injector;
pub mod session;
pub mod settings;

pub use assertion::{AssertionClaims, AssertionError, AssertionSigner, PaserkKeySet};
pub use error::SsoError;
pub use identity::{Credential, CredentialPolicy, CredentialSource, Identity, SubjectId};
pub use injector::HeaderInjector;
pub use settings::{Settings, SettingsForm, SettingsService};
