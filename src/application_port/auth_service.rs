use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => AuthError::EmailTaken,
            StoreError::Unavailable(e) => AuthError::Unavailable(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: UserRecord,
    pub tokens: TokenPair,
}

/// A token whose signature and expiry have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub subject: TokenSubject,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError>;
    async fn verify_access_token(&self, token: &AccessToken) -> Result<VerifiedToken, AuthError>;
    async fn verify_refresh_token(&self, token: &RefreshToken)
    -> Result<VerifiedToken, AuthError>;
    /// Signed expiry of an access token, even if it already passed.
    async fn access_token_expiry(&self, token: &AccessToken) -> Option<DateTime<Utc>>;
    /// Signed expiry of a refresh token, even if it already passed.
    async fn refresh_token_expiry(&self, token: &RefreshToken) -> Option<DateTime<Utc>>;
    fn access_ttl(&self) -> std::time::Duration;
    fn refresh_ttl(&self) -> std::time::Duration;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn register(&self, input: RegisterInput) -> Result<AuthSession, AuthError>;
    async fn login(&self, input: LoginInput) -> Result<AuthSession, AuthError>;
    /// Always succeeds for already-invalid tokens.
    async fn logout(
        &self,
        user_id: UserId,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<(), AuthError>;
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AuthSession, AuthError>;
    async fn validate_access(
        &self,
        user_id: UserId,
        access_token: &AccessToken,
    ) -> Result<bool, AuthError>;
    /// Verify a bearer token and check it against the ledger.
    async fn authenticate(&self, bearer: &str) -> Result<Principal, AuthError>;
    async fn logout_all_devices(&self, user_id: UserId) -> Result<(), AuthError>;
}

pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&principal.subject.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
