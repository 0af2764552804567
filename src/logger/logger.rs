use anyhow::{Result, anyhow};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub struct LogConfig {
    pub filter: String,
}

impl From<&crate::settings::Log> for LogConfig {
    fn from(log: &crate::settings::Log) -> Self {
        LogConfig {
            filter: log.filter.clone(),
        }
    }
}

/// Which directive set the running filter came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSource {
    Environment(String),
    Settings(String),
}

/// `RUST_LOG` wins over the settings file so an operator can raise verbosity
/// without editing config.
pub fn choose_filter(env: Option<String>, config: &LogConfig) -> Result<FilterSource> {
    match env.filter(|v| !v.trim().is_empty()) {
        Some(directives) => {
            EnvFilter::try_new(&directives).map_err(|e| anyhow!("RUST_LOG: {e}"))?;
            Ok(FilterSource::Environment(directives))
        }
        None => {
            EnvFilter::try_new(&config.filter).map_err(|e| anyhow!("log.filter: {e}"))?;
            Ok(FilterSource::Settings(config.filter.clone()))
        }
    }
}

/// Global subscriber whose filter can be swapped once settings are loaded.
pub struct Logger {
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Logger {
    /// Install the subscriber at `info`, or at `RUST_LOG` when it is set.
    pub fn new_bootstrap() -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, reload_handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();

        Self { reload_handle }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<FilterSource> {
        let source = choose_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), config)?;
        let directives = match &source {
            FilterSource::Environment(d) | FilterSource::Settings(d) => d,
        };
        let filter = EnvFilter::try_new(directives).map_err(|e| anyhow!(e))?;
        self.reload_handle.reload(filter).map_err(|e| anyhow!(e))?;
        Ok(source)
    }
}
