use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub enum RefreshTokenChange<'a> {
    Add(&'a RefreshToken),
    Remove(&'a RefreshToken),
    Clear,
}

#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StoreError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn find_credentials_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CredentialRecord>, StoreError>;

    /// Apply `change` to the persisted refresh-token list.
    ///
    /// Returns whether the list changed. A `Remove` of a token that is not
    /// listed returns `false`, and of two concurrent removes of the same token
    /// exactly one returns `true`.
    async fn update_refresh_tokens(
        &self,
        user_id: UserId,
        change: RefreshTokenChange<'_>,
    ) -> Result<bool, StoreError>;

    async fn set_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}
