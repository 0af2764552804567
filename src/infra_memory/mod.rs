//! Process-local backends. Selected with `backend = "memory"` in settings and
//! used by the test suites.

mod kv_store_memory;
mod media_repo_memory;
mod user_repo_memory;

pub use kv_store_memory::*;
pub use media_repo_memory::*;
pub use user_repo_memory::*;
