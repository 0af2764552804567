use anyhow::{Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub auth: Auth,
    pub ledger: Ledger,
    pub metadata: Metadata,
    pub blob: Blob,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    /// TLS is enabled when both paths are set.
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default)]
    pub expose_internal_errors: bool,
    #[serde(default = "default_upload_limit_mb")]
    pub upload_limit_mb: u64,
    #[serde(default)]
    pub cors_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Deserialize)]
pub struct Auth {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_true")]
    pub blacklist_on_rotation: bool,
}

// secrets stay out of the startup log
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("blacklist_on_rotation", &self.blacklist_on_rotation)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
pub struct Ledger {
    pub backend: String, // "redis" or "memory"
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_ledger_prefix")]
    pub prefix: String,
}

#[derive(Deserialize)]
pub struct Metadata {
    pub backend: String, // "mysql" or "memory"
    #[serde(default)]
    pub mysql_url: Option<String>,
    #[serde(default)]
    pub run_migrations: bool,
}

// connection urls carry credentials
fn redacted(url: &Option<String>) -> Option<&'static str> {
    url.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("backend", &self.backend)
            .field("redis_url", &redacted(&self.redis_url))
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("backend", &self.backend)
            .field("mysql_url", &redacted(&self.mysql_url))
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Blob {
    pub root: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_quota_mb")]
    pub quota_mb: u64,
}

fn default_upload_limit_mb() -> u64 {
    100
}

fn default_access_ttl_secs() -> u64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_issuer() -> String {
    "mediavault".to_string()
}

fn default_audience() -> String {
    "mediavault-clients".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ledger_prefix() -> String {
    "mediavault".to_string()
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_quota_mb() -> u64 {
    1024
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Load settings from a TOML file, then apply `MEDIAVAULT_<SECTION>__<KEY>`
/// environment overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix("MEDIAVAULT")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

/// Settings from an inline TOML document, without environment overrides.
pub fn settings_from_toml(body: &str) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from_str(body, FileFormat::Toml))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if self.auth.access_secret.is_empty() || self.auth.refresh_secret.is_empty() {
            return Err(anyhow!("auth secrets must be set"));
        }
        if self.auth.access_secret == self.auth.refresh_secret {
            return Err(anyhow!("access and refresh secrets must differ"));
        }
        if self.http.cert_path.is_some() != self.http.key_path.is_some() {
            return Err(anyhow!("http.cert_path and http.key_path must be set together"));
        }
        if self.blob.chunk_size == 0 {
            return Err(anyhow!("blob.chunk_size must be positive"));
        }
        Ok(())
    }

    pub fn upload_limit_bytes(&self) -> u64 {
        self.http.upload_limit_mb * 1024 * 1024
    }

    pub fn quota_bytes(&self) -> u64 {
        self.blob.quota_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[http]
address = "127.0.0.1:0"

[log]
filter = "info"

[auth]
access_secret = "a"
refresh_secret = "b"

[ledger]
backend = "memory"

[metadata]
backend = "memory"

[blob]
root = "data/blobs"
"#;

    fn write_toml(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let file = write_toml(MINIMAL);
        let settings = parse_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.auth.access_ttl_secs, 900);
        assert_eq!(settings.auth.refresh_ttl_secs, 604_800);
        assert!(settings.auth.blacklist_on_rotation);
        assert_eq!(settings.blob.chunk_size, 65_536);
        assert_eq!(settings.ledger.prefix, "mediavault");
        assert_eq!(settings.upload_limit_bytes(), 100 * 1024 * 1024);
        assert!(settings.http.cert_path.is_none());
    }

    #[test]
    fn identical_secrets_are_rejected() {
        let file = write_toml(&MINIMAL.replace("refresh_secret = \"b\"", "refresh_secret = \"a\""));
        assert!(parse_settings(file.path().to_str()).is_err());
    }

    #[test]
    fn inline_toml_is_validated() {
        let settings = settings_from_toml(MINIMAL).unwrap();
        assert_eq!(settings.metadata.backend, "memory");
        let broken = MINIMAL.replace("[http]\naddress", "[http]\ncert_path = \"c.pem\"\naddress");
        assert!(settings_from_toml(&broken).is_err());
    }

    #[test]
    fn secrets_are_not_debug_printed() {
        let body = MINIMAL
            .replace(
                "backend = \"memory\"\n\n[metadata]",
                "backend = \"redis\"\nredis_url = \"redis://:hunter2@cache:6379\"\n\n[metadata]",
            )
            .replace(
                "[metadata]\nbackend = \"memory\"",
                "[metadata]\nbackend = \"mysql\"\nmysql_url = \"mysql://app:s3cret@db/vault\"",
            );
        let settings = settings_from_toml(&body).unwrap();
        assert_eq!(
            settings.metadata.mysql_url.as_deref(),
            Some("mysql://app:s3cret@db/vault")
        );

        let printed = format!("{settings:?}");
        assert!(!printed.contains("access_secret"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("redis_url: Some(\"<redacted>\")"));
        assert!(printed.contains("mysql_url: Some(\"<redacted>\")"));
    }
}
