use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider refused the request; the message is safe to show users.
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Service(String),
}

/// Account as known to the identity provider.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUser {
    pub id: String,
    pub email: String,
    /// Whether the provider has seen proof of ownership of `email`.
    pub email_verified: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

/// Third-party identity provider. Password storage and session issuance live
/// entirely on the provider side.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when the token is invalid or expired.
    async fn resolve_token(&self, token: &str) -> Result<Option<IdentityUser>, IdentityError>;

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<IdentityUser, IdentityError>;

    async fn login(&self, email: &str, password: &str) -> Result<TokenSet, IdentityError>;

    async fn refresh(&self, email: &str, refresh_token: &str) -> Result<TokenSet, IdentityError>;
}
