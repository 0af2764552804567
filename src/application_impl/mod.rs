mod auth_service_impl;
mod file_service_impl;
mod media_service_impl;
mod token_ledger;

pub use auth_service_impl::*;
pub use file_service_impl::*;
pub use media_service_impl::*;
pub use token_ledger::*;
