use super::error::*;
use super::router::ApiConfig;
use super::validation;
use crate::application_impl::TokenLedger;
use crate::application_port::*;
use crate::domain_model::*;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::{Buf, Reply, reject};

pub const REFRESH_COOKIE: &str = "refreshToken";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with(message: &'static str, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: &'static str) -> Self {
        ApiResponse {
            success: true,
            message: Some(message),
            data: None,
        }
    }
}

fn refresh_cookie(token: &RefreshToken, cfg: &ApiConfig) -> String {
    let secure = if cfg.secure_cookies { "; Secure" } else { "" };
    format!(
        "{REFRESH_COOKIE}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{secure}",
        token.as_str(),
        cfg.refresh_cookie_max_age_secs
    )
}

fn cleared_cookie(cfg: &ApiConfig) -> String {
    let secure = if cfg.secure_cookies { "; Secure" } else { "" };
    format!("{REFRESH_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{secure}")
}

// region auth

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    user: UserRecord,
    access_token: AccessToken,
    access_token_expires_at: chrono::DateTime<chrono::Utc>,
}

fn session_reply(
    session: AuthSession,
    message: &'static str,
    status: StatusCode,
    cfg: &ApiConfig,
) -> warp::reply::Response {
    let cookie = refresh_cookie(&session.tokens.refresh_token, cfg);
    let payload = SessionPayload {
        user: session.user,
        access_token: session.tokens.access_token,
        access_token_expires_at: session.tokens.access_token_expires_at,
    };
    let json = warp::reply::json(&ApiResponse::ok_with(message, payload));
    let reply = warp::reply::with_status(json, status);
    warp::reply::with_header(reply, "set-cookie", cookie).into_response()
}

pub async fn register(
    body: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let input = validation::validate_register(body).map_err(reject::custom)?;
    let session = auth_service
        .register(input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(session_reply(
        session,
        "User registered successfully",
        StatusCode::CREATED,
        &cfg,
    ))
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let input = validation::validate_login(body).map_err(reject::custom)?;
    let session = auth_service
        .login(input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(session_reply(session, "Login successful", StatusCode::OK, &cfg))
}

pub async fn refresh(
    cookie: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| {
                reject::custom(ApiErrorCode::validation(
                    format!("Invalid request body: {e}"),
                    Vec::new(),
                ))
            })?
            .refresh_token
    };
    let token = cookie
        .filter(|c| !c.is_empty())
        .or(from_body.filter(|b| !b.is_empty()))
        .ok_or_else(|| {
            reject::custom(ApiErrorCode::validation(
                "Refresh token is required",
                vec![FieldError::new("refreshToken", "Refresh token is required")],
            ))
        })?;

    let session = auth_service
        .refresh(&RefreshToken(token))
        .await
        .map_err(|e| match e {
            AuthError::Unavailable(_) | AuthError::InternalError(_) => ApiErrorCode::from(e),
            _ => ApiErrorCode::Unauthorized("Invalid refresh token"),
        })
        .map_err(reject::custom)?;
    Ok(session_reply(
        session,
        "Tokens refreshed successfully",
        StatusCode::OK,
        &cfg,
    ))
}

pub async fn logout(
    principal: Principal,
    cookie: Option<String>,
    auth_service: Arc<dyn AuthService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let refresh = cookie.filter(|c| !c.is_empty()).map(RefreshToken);
    if let Err(e) = auth_service
        .logout(principal.user_id(), &principal.access_token, refresh.as_ref())
        .await
    {
        warn!(user_id = %principal.user_id(), error = %e, "logout could not revoke every token");
    }
    let json = warp::reply::json(&ApiResponse::message("Logout successful"));
    Ok(warp::reply::with_header(json, "set-cookie", cleared_cookie(&cfg)).into_response())
}

pub async fn logout_all(
    principal: Principal,
    auth_service: Arc<dyn AuthService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    if let Err(e) = auth_service.logout_all_devices(principal.user_id()).await {
        warn!(user_id = %principal.user_id(), error = %e, "logout-all could not revoke every token");
    }
    let json = warp::reply::json(&ApiResponse::message("Logged out from all devices"));
    Ok(warp::reply::with_header(json, "set-cookie", cleared_cookie(&cfg)).into_response())
}

/// Admin-only: end every session of another account.
pub async fn revoke_user_sessions(
    target: UserId,
    principal: Principal,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl Reply, warp::Rejection> {
    require_role(&principal, &[Role::Admin])
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    auth_service
        .logout_all_devices(target)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    tracing::info!(admin = %principal.user_id(), %target, "sessions revoked by admin");
    Ok(warp::reply::json(&ApiResponse::message(
        "User logged out from all devices",
    )))
}

#[derive(Debug, Serialize)]
struct MePayload {
    user: TokenSubject,
}

pub async fn me(principal: Principal) -> Result<impl Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(MePayload {
        user: principal.subject,
    })))
}

// endregion

// region files

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub search_term: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    pub original_name: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
struct FilePayload {
    file: MediaDescriptor,
}

#[derive(Debug, Serialize)]
struct StatsPayload {
    stats: StorageStats,
}

const MAX_TEXT_FIELD: usize = 1024;

fn part_reader(part: Part) -> impl AsyncRead + Send + Unpin {
    let chunks = part
        .stream()
        .map_ok(|mut buf| buf.copy_to_bytes(buf.remaining()))
        .map_err(std::io::Error::other);
    StreamReader::new(Box::pin(chunks))
}

async fn read_text(part: Part) -> Result<String, warp::Rejection> {
    let bytes = part
        .stream()
        .try_fold(BytesMut::new(), |mut acc, mut chunk| async move {
            while chunk.has_remaining() {
                let n = chunk.chunk().len();
                acc.extend_from_slice(chunk.chunk());
                chunk.advance(n);
            }
            Ok(acc)
        })
        .await
        .map_err(|e| {
            reject::custom(ApiErrorCode::validation(
                format!("Malformed multipart body: {e}"),
                Vec::new(),
            ))
        })?;
    if bytes.len() > MAX_TEXT_FIELD {
        return Err(reject::custom(ApiErrorCode::validation(
            "Form field is too long",
            Vec::new(),
        )));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Default)]
struct ReceivedUpload {
    file: Option<(StagedUpload, String)>,
    thumbnail: Option<StagedUpload>,
    duration: Option<String>,
}

impl ReceivedUpload {
    fn staged(&self) -> Vec<StagedUpload> {
        let mut staged: Vec<StagedUpload> = self.file.iter().map(|(f, _)| f.clone()).collect();
        staged.extend(self.thumbnail.clone());
        staged
    }
}

async fn stage_part(
    part: Part,
    fallback_name: &str,
    file_service: &dyn FileService,
) -> Result<(StagedUpload, String), warp::Rejection> {
    let original_name = part
        .filename()
        .filter(|n| !n.is_empty())
        .unwrap_or(fallback_name)
        .to_string();
    let content_type = part
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let mut reader = part_reader(part);
    let staged = file_service
        .stage(&mut reader, &original_name)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok((staged, content_type))
}

// Parts are written to blob storage as they arrive. Anything staged before
// a failure is discarded by the caller.
async fn receive_upload(
    mut form: FormData,
    received: &mut ReceivedUpload,
    file_service: &dyn FileService,
) -> Result<(), warp::Rejection> {
    while let Some(part) = form.try_next().await.map_err(|e| {
        reject::custom(ApiErrorCode::validation(
            format!("Malformed multipart body: {e}"),
            Vec::new(),
        ))
    })? {
        let name = part.name().to_string();
        match name.as_str() {
            "file" => {
                let staged = stage_part(part, "upload", file_service).await?;
                if let Some((previous, _)) = received.file.replace(staged) {
                    file_service.discard_staged(&[previous]).await;
                }
            }
            "thumbnail" => {
                let (staged, _) = stage_part(part, "thumbnail", file_service).await?;
                if let Some(previous) = received.thumbnail.replace(staged) {
                    file_service.discard_staged(&[previous]).await;
                }
            }
            "duration" => received.duration = Some(read_text(part).await?),
            other => tracing::debug!(field = other, "ignoring unknown multipart field"),
        }
    }
    Ok(())
}

fn upload_input(received: ReceivedUpload) -> Result<UploadInput, warp::Rejection> {
    let (file, content_type) = received.file.ok_or_else(|| {
        reject::custom(ApiErrorCode::validation(
            "No file uploaded",
            vec![FieldError::new("file", "A file part is required")],
        ))
    })?;
    let duration_secs =
        validation::validate_duration(received.duration.as_deref()).map_err(reject::custom)?;
    Ok(UploadInput {
        content_type,
        file,
        duration_secs,
        thumbnail: received.thumbnail,
    })
}

pub async fn upload(
    principal: Principal,
    form: FormData,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let mut received = ReceivedUpload::default();
    let outcome = receive_upload(form, &mut received, file_service.as_ref()).await;
    let staged = received.staged();
    let input = match outcome.and_then(|()| upload_input(received)) {
        Ok(input) => input,
        Err(rejection) => {
            file_service.discard_staged(&staged).await;
            return Err(rejection);
        }
    };

    let media = file_service
        .upload(principal.user_id(), input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let json = warp::reply::json(&ApiResponse::ok_with(
        "File uploaded successfully",
        FilePayload { file: media },
    ));
    Ok(warp::reply::with_status(json, StatusCode::CREATED))
}

pub async fn list_files(
    query: ListQuery,
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let page = validation::validate_page(&query).map_err(reject::custom)?;
    let result = file_service
        .list(principal.user_id(), page)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(result)))
}

pub async fn search_files(
    query: ListQuery,
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let term = validation::validate_search_term(query.search_term.as_deref())
        .map_err(reject::custom)?;
    let page = validation::validate_page(&query).map_err(reject::custom)?;
    let result = file_service
        .search(principal.user_id(), &term, page)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(result)))
}

pub async fn file_stats(
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let stats = file_service
        .stats(principal.user_id())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(StatsPayload { stats })))
}

pub async fn get_file(
    id: MediaId,
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let file = file_service
        .get(principal.user_id(), id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(FilePayload { file })))
}

pub async fn update_file(
    id: MediaId,
    body: UpdateFileRequest,
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    let update = validation::validate_update(body).map_err(reject::custom)?;
    let file = file_service
        .update(principal.user_id(), id, update)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok_with(
        "File updated successfully",
        FilePayload { file },
    )))
}

pub async fn delete_file(
    id: MediaId,
    principal: Principal,
    file_service: Arc<dyn FileService>,
) -> Result<impl Reply, warp::Rejection> {
    file_service
        .delete(principal.user_id(), id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::message(
        "File deleted successfully",
    )))
}

// endregion

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    ledger: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

pub async fn health(ledger: Arc<TokenLedger>) -> Result<impl Reply, warp::Rejection> {
    let (status, ledger_state, code) = match ledger.ping().await {
        Ok(()) => ("ok", "up", StatusCode::OK),
        Err(e) => {
            warn!(error = %e, "health check: token ledger unreachable");
            ("degraded", "down", StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    let body = HealthStatus {
        status,
        ledger: ledger_state,
        timestamp: chrono::Utc::now(),
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok(body)),
        code,
    ))
}
