use crate::domain_port::*;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`KvStore`] with lazy TTL expiry.
///
/// Expiry uses tokio's clock, so tests can drive it with `tokio::time::pause`
/// and `advance`. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn live_value(&self, key: &str) -> Option<Value> {
        self.evict_if_expired(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn wrong_type(key: &str) -> KvError {
        KvError::Corrupt {
            key: key.to_string(),
            reason: "operation against a key holding the wrong kind of value".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        match self.live_value(key) {
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(Value::Set(_)) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let entry = Entry {
            value: Value::Str(value.to_string()),
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.live_value(key).is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) if entry.is_expired(now) => Ok(None),
            Some((_, Entry { value: Value::Str(s), .. })) => Ok(Some(s)),
            Some((k, entry)) => {
                self.entries.insert(k, entry);
                Err(Self::wrong_type(key))
            }
            None => Ok(None),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), KvError> {
        self.evict_if_expired(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Value::Str(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), KvError> {
        self.evict_if_expired(key);
        let now_empty = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                Value::Str(_) => return Err(Self::wrong_type(key)),
            },
            None => false,
        };
        if now_empty {
            self.entries
                .remove_if(key, |_, entry| matches!(&entry.value, Value::Set(m) if m.is_empty()));
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        match self.live_value(key) {
            Some(Value::Set(members)) => Ok(members.into_iter().collect()),
            Some(Value::Str(_)) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let kv = MemoryKvStore::new();
        kv.set_ex("k", "v", 10).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(kv.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!kv.exists("k").await.unwrap());
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(kv.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resetting_a_key_resets_its_ttl() {
        let kv = MemoryKvStore::new();
        kv.set_ex("k", "v", 10).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        kv.set_ex("k", "v", 10).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(kv.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn take_returns_value_once() {
        let kv = MemoryKvStore::new();
        kv.set_ex("k", "owner", 60).await.unwrap();
        assert_eq!(kv.take("k").await.unwrap().as_deref(), Some("owner"));
        assert_eq!(kv.take("k").await.unwrap(), None);
        assert!(!kv.del("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn take_ignores_expired_values() {
        let kv = MemoryKvStore::new();
        kv.set_ex("k", "owner", 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(kv.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sets_track_members() {
        let kv = MemoryKvStore::new();
        kv.set_add("s", "a").await.unwrap();
        kv.set_add("s", "b").await.unwrap();
        kv.set_add("s", "a").await.unwrap();

        let mut members = kv.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        kv.set_remove("s", "a").await.unwrap();
        kv.set_remove("s", "b").await.unwrap();
        assert!(kv.set_members("s").await.unwrap().is_empty());
        assert!(!kv.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn mixing_kinds_is_rejected() {
        let kv = MemoryKvStore::new();
        kv.set_ex("k", "v", 60).await.unwrap();
        assert!(matches!(
            kv.set_add("k", "m").await,
            Err(KvError::Corrupt { .. })
        ));
        kv.set_add("s", "m").await.unwrap();
        assert!(matches!(kv.get("s").await, Err(KvError::Corrupt { .. })));
        assert!(matches!(kv.take("s").await, Err(KvError::Corrupt { .. })));
        assert!(kv.exists("s").await.unwrap());
    }
}
