//! Modelgate auth: stored OAuth / token credentials and their lifecycle.
//!
//! - [`credential`]: the credential record and its freshness status.
//! - [`store`]: persistence behind the [`CredentialStore`] trait.
//! - [`oauth`]: per-provider OAuth dialects and the HTTP exchanges.
//! - [`login`]: interactive login flows producing new credentials.
//! - [`manager`]: [`CredentialManager`], the refresh-on-read front door.

pub mod credential;
pub mod login;
pub mod manager;
pub mod oauth;
pub mod store;

pub use credential::{AuthCredential, CredentialStatus};
pub use manager::{CredentialManager, CredentialReport};
pub use oauth::{AntigravityModel, OAuthClient, OAuthProviderConfig};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
