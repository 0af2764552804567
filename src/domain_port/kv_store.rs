#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Minimal key-value surface the token ledger needs.
///
/// Every call is atomic on its own; nothing here composes calls into a
/// transaction.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Set `key` to `value`, replacing any previous value and TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError>;

    /// Delete `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically read and delete `key`.
    async fn take(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), KvError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), KvError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}
