mod media_repo_mysql;
mod user_repo_mysql;

pub use media_repo_mysql::*;
pub use user_repo_mysql::*;

mod util;

/// Schema migrations under `migrations/`, applied at startup when enabled.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
