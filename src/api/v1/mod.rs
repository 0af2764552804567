mod error;
mod handler;
mod router;
mod stream;
mod validation;

pub use error::{ApiErrorCode, ErrorEnvelope, FieldError, recover_error};
pub use handler::{ApiResponse, REFRESH_COOKIE};
pub use router::{ApiConfig, api, routes};
pub use stream::attachment_disposition;
