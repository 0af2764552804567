use crate::api::v1::ApiConfig;
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_fs::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use anyhow::{Context, anyhow};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// Storage the services run on. Chosen from settings by `Server::try_new`,
/// or handed in directly by tests.
pub struct Backends {
    pub kv: Arc<dyn KvStore>,
    pub users: Arc<dyn UserRepo>,
    pub media: Arc<dyn MediaRepo>,
    pub blobs: Arc<dyn BlobStore>,
    pub hasher: Arc<dyn CredentialHasher>,
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub media_service: Arc<dyn MediaService>,
    pub file_service: Arc<dyn FileService>,
    pub ledger: TokenLedger,
    pub api_config: ApiConfig,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let kv: Arc<dyn KvStore> = match settings.ledger.backend.as_str() {
            "memory" => {
                warn!("token ledger is in-process; revocations are lost on restart");
                Arc::new(MemoryKvStore::new())
            }
            "redis" => {
                let url = settings
                    .ledger
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("ledger.redis_url is required for the redis backend"))?;
                Arc::new(RedisKvStore::connect(url).await.context("connecting to redis")?)
            }
            other => return Err(anyhow!("Unknown ledger backend: {}", other)),
        };

        let mut pool = None;
        let (users, media): (Arc<dyn UserRepo>, Arc<dyn MediaRepo>) =
            match settings.metadata.backend.as_str() {
                "memory" => (
                    Arc::new(MemoryUserRepo::new()),
                    Arc::new(MemoryMediaRepo::new()),
                ),
                "mysql" => {
                    let url = settings.metadata.mysql_url.as_deref().ok_or_else(|| {
                        anyhow!("metadata.mysql_url is required for the mysql backend")
                    })?;
                    let mysql = MySqlPoolOptions::new()
                        .acquire_timeout(Duration::from_secs(5))
                        .connect(url)
                        .await
                        .context("connecting to mysql")?;
                    if settings.metadata.run_migrations {
                        MIGRATOR.run(&mysql).await.context("running migrations")?;
                        info!("metadata migrations applied");
                    }
                    pool = Some(mysql.clone());
                    (
                        Arc::new(MySqlUserRepo::new(mysql.clone())),
                        Arc::new(MySqlMediaRepo::new(mysql)),
                    )
                }
                other => return Err(anyhow!("Unknown metadata backend: {}", other)),
            };

        let blobs: Arc<dyn BlobStore> = Arc::new(
            FsBlobStore::open(&settings.blob.root)
                .await
                .context("opening blob root")?,
        );

        let backends = Backends {
            kv,
            users,
            media,
            blobs,
            hasher: Arc::new(Argon2PasswordHasher::new()),
        };
        let server = Self::assemble(settings, backends, pool);
        info!(
            ledger = %settings.ledger.backend,
            metadata = %settings.metadata.backend,
            "server started"
        );
        Ok(server)
    }

    pub fn assemble(settings: &Settings, backends: Backends, pool: Option<Pool<MySql>>) -> Self {
        let ledger = TokenLedger::new(backends.kv, settings.ledger.prefix.clone());

        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            audience: settings.auth.audience.clone(),
            access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
            refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
            access_secret: settings.auth.access_secret.clone().into_bytes(),
            refresh_secret: settings.auth.refresh_secret.clone().into_bytes(),
        }));

        let auth_service: Arc<dyn AuthService> = Arc::new(
            RealAuthService::new(
                backends.users,
                backends.hasher,
                token_codec,
                ledger.clone(),
            )
            .blacklist_on_rotation(settings.auth.blacklist_on_rotation),
        );

        let media_service: Arc<dyn MediaService> = Arc::new(RealMediaService::new(
            backends.media.clone(),
            backends.blobs.clone(),
        ));

        let file_service: Arc<dyn FileService> = Arc::new(RealFileService::new(
            backends.media,
            backends.blobs,
            FileLimits {
                upload_limit_bytes: settings.upload_limit_bytes(),
                quota_bytes: settings.quota_bytes(),
            },
        ));

        Self {
            auth_service,
            media_service,
            file_service,
            ledger,
            api_config: ApiConfig::from(settings),
            pool,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
