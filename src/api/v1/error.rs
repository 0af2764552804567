use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply, reject};

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        FieldError {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ApiErrorCode {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("File exceeds the upload limit")]
    PayloadTooLarge,
    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable { size: u64 },
    #[error("Internal server error")]
    InternalError(String),
    #[error("Service temporarily unavailable")]
    Unavailable(String),
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        error!("Internal error: {}", error);
        ApiErrorCode::InternalError(error.to_string())
    }

    pub fn unavailable<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Store unavailable: {}", error);
        ApiErrorCode::Unavailable(error.to_string())
    }

    pub fn validation(message: impl Into<String>, errors: Vec<FieldError>) -> ApiErrorCode {
        ApiErrorCode::Validation {
            message: message.into(),
            errors,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiErrorCode::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorCode::Conflict(_) => StatusCode::CONFLICT,
            ApiErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiErrorCode::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorCode::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn client_message(&self, expose_internal: bool) -> String {
        match self {
            ApiErrorCode::InternalError(detail) | ApiErrorCode::Unavailable(detail)
                if expose_internal =>
            {
                format!("{self}: {detail}")
            }
            _ => self.to_string(),
        }
    }

    pub fn into_response(self, expose_internal: bool) -> warp::reply::Response {
        if let ApiErrorCode::RangeNotSatisfiable { size } = &self {
            let reply = warp::reply::with_status(warp::reply(), self.status());
            let reply = warp::reply::with_header(
                reply,
                "content-range",
                crate::domain_model::unsatisfied_content_range(*size),
            );
            return warp::reply::with_header(reply, "accept-ranges", "bytes").into_response();
        }

        let errors = match &self {
            ApiErrorCode::Validation { errors, .. } if !errors.is_empty() => Some(errors.clone()),
            _ => None,
        };
        let body = ErrorEnvelope {
            success: false,
            message: self.client_message(expose_internal),
            errors,
        };
        warp::reply::with_status(warp::reply::json(&body), self.status()).into_response()
    }
}

impl reject::Reject for ApiErrorCode {}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// Turn any rejection into the JSON error envelope.
pub async fn recover_error(
    err: Rejection,
    expose_internal: bool,
) -> Result<warp::reply::Response, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound("Route not found")
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        ApiErrorCode::validation(format!("Invalid request body: {e}"), Vec::new())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        ApiErrorCode::validation("Invalid query string", Vec::new())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        ApiErrorCode::PayloadTooLarge
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        ApiErrorCode::validation("Unsupported content type", Vec::new())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        ApiErrorCode::validation("Content-Length required", Vec::new())
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        ApiErrorCode::Forbidden
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        let body = ErrorEnvelope {
            success: false,
            message: "Method not allowed".to_string(),
            errors: None,
        };
        return Ok(warp::reply::with_status(
            warp::reply::json(&body),
            StatusCode::METHOD_NOT_ALLOWED,
        )
        .into_response());
    } else {
        ApiErrorCode::internal(format!("Unhandled rejection: {err:?}"))
    };

    Ok(code.into_response(expose_internal))
}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::Unauthorized("Invalid credentials"),
            AuthError::EmailTaken => ApiErrorCode::Conflict("User with this email already exists"),
            AuthError::TokenInvalid | AuthError::TokenExpired | AuthError::TokenRevoked => {
                ApiErrorCode::Unauthorized("Invalid or expired token")
            }
            AuthError::Forbidden => ApiErrorCode::Forbidden,
            AuthError::Unavailable(e) => ApiErrorCode::unavailable(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<MediaError> for ApiErrorCode {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::NotFound => ApiErrorCode::NotFound("File not found"),
            MediaError::Unavailable(e) => ApiErrorCode::unavailable(e),
            MediaError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

impl From<FileError> for ApiErrorCode {
    fn from(error: FileError) -> Self {
        match error {
            FileError::NotFound => ApiErrorCode::NotFound("File not found"),
            FileError::EmptyFile => ApiErrorCode::validation(
                "No file uploaded",
                vec![FieldError::new("file", "File must not be empty")],
            ),
            FileError::TooLarge { .. } => ApiErrorCode::PayloadTooLarge,
            FileError::MalformedUpload(e) => {
                ApiErrorCode::validation(format!("Malformed multipart body: {e}"), Vec::new())
            }
            FileError::Unavailable(e) => ApiErrorCode::unavailable(e),
            FileError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::header;

    #[test]
    fn status_table() {
        let cases = [
            (ApiErrorCode::validation("x", Vec::new()), 400),
            (ApiErrorCode::Unauthorized("x"), 401),
            (ApiErrorCode::Forbidden, 403),
            (ApiErrorCode::NotFound("x"), 404),
            (ApiErrorCode::Conflict("x"), 409),
            (ApiErrorCode::PayloadTooLarge, 413),
            (ApiErrorCode::RangeNotSatisfiable { size: 1 }, 416),
            (ApiErrorCode::InternalError("x".into()), 500),
            (ApiErrorCode::Unavailable("x".into()), 503),
        ];
        for (code, status) in cases {
            assert_eq!(code.status().as_u16(), status, "{code:?}");
        }
    }

    #[test]
    fn auth_failures_share_one_message() {
        let messages: Vec<String> = [
            AuthError::TokenInvalid,
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
        ]
        .into_iter()
        .map(|e| ApiErrorCode::from(e).to_string())
        .collect();
        assert!(messages.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn internal_details_are_hidden_unless_exposed() {
        let code = ApiErrorCode::InternalError("db exploded".into());
        assert_eq!(code.client_message(false), "Internal server error");
        assert!(code.client_message(true).contains("db exploded"));
    }

    #[tokio::test]
    async fn unsatisfiable_range_has_content_range_and_no_body() {
        let res = ApiErrorCode::RangeNotSatisfiable { size: 1000 }.into_response(false);
        assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes */1000");
        let body = warp::hyper::body::to_bytes(res.into_body()).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn route_misses_become_404_envelopes() {
        let res = recover_error(warp::reject::not_found(), false).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = warp::hyper::body::to_bytes(res.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Route not found");
        assert!(json.get("errors").is_none());
    }
}
