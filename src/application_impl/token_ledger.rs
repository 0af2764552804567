use crate::application_port::AuthError;
use crate::domain_model::{UserId, token_digest};
use crate::domain_port::{KvError, KvStore};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("token ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<KvError> for LedgerError {
    fn from(err: KvError) -> Self {
        LedgerError::Unavailable(err.to_string())
    }
}

impl From<LedgerError> for AuthError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unavailable(e) => AuthError::Unavailable(e),
        }
    }
}

/// TTL-bound token state kept in a [`KvStore`].
///
/// Keys are built from the SHA-256 digest of the token, never the token itself:
///
/// ```text
/// {prefix}:access:{subject}:{digest}   -> "1"
/// {prefix}:access-index:{subject}      -> set of access digests (no TTL)
/// {prefix}:refresh:{digest}            -> owning subject
/// {prefix}:blacklist:{digest}          -> "1"
/// ```
#[derive(Clone)]
pub struct TokenLedger {
    kv: Arc<dyn KvStore>,
    prefix: String,
}

impl TokenLedger {
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        TokenLedger {
            kv,
            prefix: prefix.into(),
        }
    }

    fn access_key(&self, subject: UserId, digest: &str) -> String {
        format!("{}:access:{subject}:{digest}", self.prefix)
    }

    fn access_index_key(&self, subject: UserId) -> String {
        format!("{}:access-index:{subject}", self.prefix)
    }

    fn refresh_key(&self, digest: &str) -> String {
        format!("{}:refresh:{digest}", self.prefix)
    }

    fn blacklist_key(&self, digest: &str) -> String {
        format!("{}:blacklist:{digest}", self.prefix)
    }

    pub async fn record_access_issued(
        &self,
        subject: UserId,
        token: &str,
        ttl_secs: u64,
    ) -> Result<(), LedgerError> {
        let digest = token_digest(token);
        self.kv
            .set_ex(&self.access_key(subject, &digest), "1", ttl_secs)
            .await?;

        let index = self.access_index_key(subject);
        for member in self.kv.set_members(&index).await? {
            if member != digest && !self.kv.exists(&self.access_key(subject, &member)).await? {
                self.kv.set_remove(&index, &member).await?;
            }
        }
        self.kv.set_add(&index, &digest).await?;
        Ok(())
    }

    pub async fn is_access_valid(&self, subject: UserId, token: &str) -> Result<bool, LedgerError> {
        let digest = token_digest(token);
        Ok(self.kv.exists(&self.access_key(subject, &digest)).await?)
    }

    pub async fn revoke_access(&self, subject: UserId, token: &str) -> Result<(), LedgerError> {
        let digest = token_digest(token);
        self.kv.del(&self.access_key(subject, &digest)).await?;
        self.kv
            .set_remove(&self.access_index_key(subject), &digest)
            .await?;
        Ok(())
    }

    /// Revoke every indexed access token of `subject` and blacklist each one.
    pub async fn revoke_all_access(
        &self,
        subject: UserId,
        blacklist_ttl_secs: u64,
    ) -> Result<usize, LedgerError> {
        let index = self.access_index_key(subject);
        let digests = self.kv.set_members(&index).await?;
        let mut revoked = 0;
        for digest in &digests {
            if self.kv.del(&self.access_key(subject, digest)).await? {
                revoked += 1;
            }
            self.kv
                .set_ex(&self.blacklist_key(digest), "1", blacklist_ttl_secs)
                .await?;
            self.kv.set_remove(&index, digest).await?;
        }
        Ok(revoked)
    }

    pub async fn record_refresh_issued(
        &self,
        token: &str,
        subject: UserId,
        ttl_secs: u64,
    ) -> Result<(), LedgerError> {
        let digest = token_digest(token);
        self.kv
            .set_ex(&self.refresh_key(&digest), &subject.to_string(), ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn resolve_refresh_owner(&self, token: &str) -> Result<Option<UserId>, LedgerError> {
        let digest = token_digest(token);
        let owner = self.kv.get(&self.refresh_key(&digest)).await?;
        Ok(owner.and_then(|s| Self::parse_owner(&digest, &s)))
    }

    /// Atomically read and delete the refresh entry. Of two concurrent callers
    /// with the same token, at most one sees the owner.
    pub async fn consume_refresh(&self, token: &str) -> Result<Option<UserId>, LedgerError> {
        let digest = token_digest(token);
        let owner = self.kv.take(&self.refresh_key(&digest)).await?;
        Ok(owner.and_then(|s| Self::parse_owner(&digest, &s)))
    }

    pub async fn revoke_refresh(&self, token: &str) -> Result<(), LedgerError> {
        let digest = token_digest(token);
        self.kv.del(&self.refresh_key(&digest)).await?;
        Ok(())
    }

    pub async fn blacklist(&self, token: &str, ttl_secs: u64) -> Result<(), LedgerError> {
        let digest = token_digest(token);
        self.kv
            .set_ex(&self.blacklist_key(&digest), "1", ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn is_blacklisted(&self, token: &str) -> Result<bool, LedgerError> {
        let digest = token_digest(token);
        Ok(self.kv.exists(&self.blacklist_key(&digest)).await?)
    }

    pub async fn ping(&self) -> Result<(), LedgerError> {
        Ok(self.kv.ping().await?)
    }

    fn parse_owner(digest: &str, raw: &str) -> Option<UserId> {
        match raw.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(digest, error = %e, "refresh entry holds a malformed owner");
                None
            }
        }
    }
}
