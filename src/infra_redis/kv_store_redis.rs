use crate::domain_port::*;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// [`KvStore`] over a multiplexed Redis connection.
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    pub fn new(conn: ConnectionManager) -> Self {
        RedisKvStore { conn }
    }

    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::new(conn))
    }
}

fn unavailable(err: redis::RedisError) -> KvError {
    KvError::Unavailable(err.to_string())
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await.map_err(unavailable)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(unavailable)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        // GETDEL (Redis >= 6.2) so that concurrent takers see the value at most once
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.sadd(key, member).await.map_err(unavailable)?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: u64 = conn.srem(key, member).await.map_err(unavailable)?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(unavailable)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
