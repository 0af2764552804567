use super::error::*;
use super::handler;
use super::stream;
use crate::application_port::AuthService;
use crate::domain_model::*;
use crate::server::*;
use crate::settings::Settings;
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const JSON_BODY_LIMIT: u64 = 64 * 1024;
// room for multipart boundaries and the small text fields
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// HTTP knobs the handlers need at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub secure_cookies: bool,
    pub refresh_cookie_max_age_secs: u64,
    pub chunk_size: usize,
    pub upload_limit_bytes: u64,
    pub expose_internal_errors: bool,
    pub cors_origin: Option<String>,
}

impl From<&Settings> for ApiConfig {
    fn from(settings: &Settings) -> Self {
        ApiConfig {
            secure_cookies: settings.http.secure_cookies,
            refresh_cookie_max_age_secs: settings.auth.refresh_ttl_secs,
            chunk_size: settings.blob.chunk_size,
            upload_limit_bytes: settings.upload_limit_bytes(),
            expose_internal_errors: settings.http.expose_internal_errors,
            cors_origin: settings.http.cors_origin.clone(),
        }
    }
}

/// Everything under `/api/v1`, plus `/health`, with errors rendered,
/// CORS applied and each request logged.
pub fn api(server: Arc<Server>) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let expose_internal = server.api_config.expose_internal_errors;

    let health = warp::path!("health")
        .and(warp::get())
        .and(with(Arc::new(server.ledger.clone())))
        .and_then(handler::health);

    let v1 = warp::path("api")
        .and(warp::path("v1"))
        .and(routes(server.clone()));

    health
        .or(v1)
        .with(cors(&server.api_config))
        .recover(move |err: warp::Rejection| recover_error(err, expose_internal))
        .with(warp::log::custom(log_request))
}

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cfg = Arc::new(server.api_config.clone());
    let auth = server.auth_service.clone();

    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(auth.clone()))
        .and(with(cfg.clone()))
        .and_then(handler::register);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(auth.clone()))
        .and(with(cfg.clone()))
        .and_then(handler::login);

    let refresh = warp::path!("auth" / "refresh")
        .or(warp::path!("auth" / "refresh-token"))
        .unify()
        .and(warp::post())
        .and(warp::cookie::optional::<String>(handler::REFRESH_COOKIE))
        .and(optional_body(JSON_BODY_LIMIT))
        .and(with(auth.clone()))
        .and(with(cfg.clone()))
        .and_then(handler::refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(with_principal(auth.clone()))
        .and(warp::cookie::optional::<String>(handler::REFRESH_COOKIE))
        .and(with(auth.clone()))
        .and(with(cfg.clone()))
        .and_then(handler::logout);

    let logout_all = warp::path!("auth" / "logout-all")
        .and(warp::post())
        .and(with_principal(auth.clone()))
        .and(with(auth.clone()))
        .and(with(cfg.clone()))
        .and_then(handler::logout_all);

    let revoke_sessions = warp::path!("auth" / "users" / UserId / "logout-all")
        .and(warp::post())
        .and(with_principal(auth.clone()))
        .and(with(auth.clone()))
        .and_then(handler::revoke_user_sessions);

    let me = warp::path!("auth" / "me")
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and_then(handler::me);

    let upload = warp::path!("files" / "upload")
        .and(warp::post())
        .and(with_principal(auth.clone()))
        .and(warp::multipart::form().max_length(
            cfg.upload_limit_bytes
                .saturating_mul(2)
                .saturating_add(MULTIPART_OVERHEAD),
        ))
        .and(with(server.file_service.clone()))
        .and_then(handler::upload);

    let list = warp::path!("files" / "list")
        .and(warp::get())
        .and(warp::query::<handler::ListQuery>())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::list_files);

    let search = warp::path!("files" / "search")
        .and(warp::get())
        .and(warp::query::<handler::ListQuery>())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::search_files);

    let stats = warp::path!("files" / "stats")
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::file_stats);

    let get_file = warp::path!("files" / MediaId)
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::get_file);

    let update_file = warp::path!("files" / MediaId)
        .and(warp::put())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::update_file);

    let delete_file = warp::path!("files" / MediaId)
        .and(warp::delete())
        .and(with_principal(auth.clone()))
        .and(with(server.file_service.clone()))
        .and_then(handler::delete_file);

    let stream_file = warp::path!("stream" / "file" / MediaId)
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and(warp::header::optional::<String>("range"))
        .and(with(server.media_service.clone()))
        .and(with(cfg.clone()))
        .and_then(stream::stream_file);

    let info = warp::path!("stream" / "file" / MediaId / "info")
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and(with(server.media_service.clone()))
        .and_then(stream::file_info);

    let download = warp::path!("stream" / "file" / MediaId / "download")
        .and(warp::get())
        .and(with_principal(auth.clone()))
        .and(with(server.media_service.clone()))
        .and(with(cfg.clone()))
        .and_then(stream::download_file);

    let thumbnail = warp::path!("stream" / "video" / MediaId / "thumbnail")
        .and(warp::get())
        .and(with_principal(auth))
        .and(with(server.media_service.clone()))
        .and(with(cfg))
        .and_then(stream::thumbnail);

    let auth_routes = register
        .or(login)
        .or(refresh)
        .or(logout)
        .or(logout_all)
        .or(revoke_sessions)
        .or(me);
    let file_routes = upload
        .or(list)
        .or(search)
        .or(stats)
        .or(get_file)
        .or(update_file)
        .or(delete_file);
    let stream_routes = stream_file.or(info).or(download).or(thumbnail);

    auth_routes.or(file_routes).or(stream_routes)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// The request body when one is announced, otherwise empty bytes. Oversized
/// bodies are still rejected.
fn optional_body(limit: u64) -> impl Filter<Extract = (Bytes,), Error = warp::Rejection> + Clone {
    let sized = warp::body::content_length_limit(limit).and(warp::body::bytes());
    let absent = warp::header::optional::<String>("content-length").and_then(
        |length: Option<String>| async move {
            match length {
                None => Ok(Bytes::new()),
                Some(_) => Err(reject::not_found()),
            }
        },
    );
    sized.or(absent).unify()
}

fn with_principal(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (Principal,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let auth_service = auth_service.clone();
        async move {
            let token = header
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    reject::custom(ApiErrorCode::Unauthorized("Access token is required"))
                })?;
            auth_service
                .authenticate(token)
                .await
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)
        }
    })
}

fn cors(cfg: &ApiConfig) -> warp::filters::cors::Builder {
    let builder = match &cfg.cors_origin {
        Some(origin) => warp::cors().allow_origin(origin.as_str()),
        None => warp::cors().allow_any_origin(),
    };
    builder
        .allow_credentials(true)
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["authorization", "content-type", "range"])
        .expose_headers(vec![
            "content-range",
            "accept-ranges",
            "content-length",
            "content-disposition",
        ])
}

fn log_request(info: warp::log::Info<'_>) {
    let status = info.status();
    if status.is_server_error() {
        tracing::warn!(
            method = %info.method(),
            path = info.path(),
            status = status.as_u16(),
            elapsed_ms = info.elapsed().as_millis() as u64,
            "request failed"
        );
    } else {
        tracing::info!(
            method = %info.method(),
            path = info.path(),
            status = status.as_u16(),
            elapsed_ms = info.elapsed().as_millis() as u64,
            "request"
        );
    }
}
