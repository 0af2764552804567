// store

mod blob_store;
mod kv_store;
mod store_error;

pub use blob_store::*;
pub use kv_store::*;
pub use store_error::*;

// repo

mod media_repo;
mod user_repo;

pub use media_repo::*;
pub use user_repo::*;
