use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    password_hash: String,
    refresh_tokens: Vec<String>,
}

impl StoredUser {
    fn credentials(&self) -> CredentialRecord {
        CredentialRecord {
            user: self.record.clone(),
            password_hash: self.password_hash.clone(),
            refresh_tokens: self.refresh_tokens.clone(),
        }
    }
}

/// In-process [`UserRepo`] for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepo {
    users: Arc<DashMap<UserId, StoredUser>>,
    by_email: Arc<DashMap<String, UserId>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the active flag, as an operator would.
    pub fn set_active(&self, user_id: UserId, active: bool) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.record.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_role(&self, user_id: UserId, role: Role) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.record.role = role;
                true
            }
            None => false,
        }
    }

    fn id_for_email(&self, email: &str) -> Option<UserId> {
        self.by_email
            .get(&normalize_email(email))
            .map(|id| *id.value())
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = normalize_email(&user.email);
        let record = UserRecord {
            user_id: user.user_id,
            email: email.clone(),
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        };

        match self.by_email.entry(email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate(email)),
            Entry::Vacant(slot) => {
                slot.insert(user.user_id);
            }
        }
        self.users.insert(
            user.user_id,
            StoredUser {
                record: record.clone(),
                password_hash: user.password_hash,
                refresh_tokens: Vec::new(),
            },
        );
        Ok(record)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(id) = self.id_for_email(email) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.record.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let Some(id) = self.id_for_email(email) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.credentials()))
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.record.clone()))
    }

    async fn find_credentials_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.users.get(&user_id).map(|u| u.credentials()))
    }

    async fn update_refresh_tokens(
        &self,
        user_id: UserId,
        change: RefreshTokenChange<'_>,
    ) -> Result<bool, StoreError> {
        let Some(mut user) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };
        let tokens = &mut user.refresh_tokens;
        let changed = match change {
            RefreshTokenChange::Add(token) => {
                tokens.push(token.0.clone());
                true
            }
            RefreshTokenChange::Remove(token) => {
                let before = tokens.len();
                tokens.retain(|t| t != &token.0);
                tokens.len() != before
            }
            RefreshTokenChange::Clear => {
                let had_any = !tokens.is_empty();
                tokens.clear();
                had_any
            }
        };
        Ok(changed)
    }

    async fn set_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.record.last_login = Some(at);
        }
        Ok(())
    }
}
