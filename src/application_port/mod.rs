mod auth_service;
mod file_service;
mod media_service;

pub use auth_service::*;
pub use file_service::*;
pub use media_service::*;
