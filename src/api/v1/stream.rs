use super::error::*;
use super::handler::ApiResponse;
use super::router::ApiConfig;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::BlobReader;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::warn;
use warp::http::{Response, StatusCode, header};
use warp::hyper::Body;
use warp::reject;

fn body_of(reader: BlobReader, chunk_size: usize, media_id: MediaId) -> Body {
    let stream = ReaderStream::with_capacity(reader, chunk_size)
        .inspect_err(move |e| warn!(%media_id, error = %e, "media stream ended early"));
    Body::wrap_stream(stream)
}

fn built(
    response: Result<Response<Body>, warp::http::Error>,
) -> Result<warp::reply::Response, warp::Rejection> {
    response
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)
}

/// `Content-Disposition` value that survives any file name: a quoted ASCII
/// fallback plus the RFC 5987 encoded original.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    let mut encoded = String::with_capacity(filename.len());
    for b in filename.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

pub async fn stream_file(
    id: MediaId,
    principal: Principal,
    range: Option<String>,
    media_service: Arc<dyn MediaService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let plan = media_service
        .stream_resource(id, principal.user_id(), range.as_deref())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    match plan {
        StreamPlan::Full {
            content_type,
            size,
            body,
        } => built(
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, size)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body_of(body, cfg.chunk_size, id)),
        ),
        StreamPlan::Partial {
            content_type,
            range,
            body,
        } => built(
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, range.content_length())
                .header(header::CONTENT_RANGE, range.content_range())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body_of(body, cfg.chunk_size, id)),
        ),
        StreamPlan::Unsatisfiable { size } => {
            Ok(ApiErrorCode::RangeNotSatisfiable { size }.into_response(cfg.expose_internal_errors))
        }
    }
}

pub async fn download_file(
    id: MediaId,
    principal: Principal,
    media_service: Arc<dyn MediaService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let download = media_service
        .download_resource(id, principal.user_id())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    built(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, download.size)
            .header(
                header::CONTENT_DISPOSITION,
                attachment_disposition(&download.filename),
            )
            .body(body_of(download.body, cfg.chunk_size, id)),
    )
}

pub async fn file_info(
    id: MediaId,
    principal: Principal,
    media_service: Arc<dyn MediaService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let info = media_service
        .get_stream_info(id, principal.user_id())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    Ok(warp::reply::json(&ApiResponse::ok(info)))
}

pub async fn thumbnail(
    id: MediaId,
    principal: Principal,
    media_service: Arc<dyn MediaService>,
    cfg: Arc<ApiConfig>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let thumb = media_service
        .get_thumbnail(id, principal.user_id())
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    built(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, thumb.content_type)
            .header(header::CONTENT_LENGTH, thumb.size)
            .header(header::CACHE_CONTROL, "private, max-age=3600")
            .body(body_of(thumb.body, cfg.chunk_size, id)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_quotes_and_encodes() {
        assert_eq!(
            attachment_disposition("clip.mp4"),
            "attachment; filename=\"clip.mp4\"; filename*=UTF-8''clip.mp4"
        );
        assert_eq!(
            attachment_disposition("my \"best\" clip.mp4"),
            "attachment; filename=\"my _best_ clip.mp4\"; filename*=UTF-8''my%20%22best%22%20clip.mp4"
        );
        let header = attachment_disposition("été.mov");
        assert!(header.contains("filename=\"_t_.mov\""));
        assert!(header.ends_with("%C3%A9t%C3%A9.mov"));
    }
}
