use crate::domain_model::*;
use crate::domain_port::{BlobError, BlobReader, StoreError};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for MediaError {
    fn from(err: StoreError) -> Self {
        MediaError::Unavailable(err.to_string())
    }
}

impl From<BlobError> for MediaError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) | BlobError::InvalidLocation(_) => MediaError::NotFound,
            BlobError::Io(e) => MediaError::InternalError(e.to_string()),
        }
    }
}

/// How a stream request will be answered.
pub enum StreamPlan {
    Full {
        content_type: String,
        size: u64,
        body: BlobReader,
    },
    Partial {
        content_type: String,
        range: ByteRange,
        body: BlobReader,
    },
    Unsatisfiable {
        size: u64,
    },
}

impl std::fmt::Debug for StreamPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamPlan::Full { content_type, size, .. } => f
                .debug_struct("Full")
                .field("content_type", content_type)
                .field("size", size)
                .finish_non_exhaustive(),
            StreamPlan::Partial { content_type, range, .. } => f
                .debug_struct("Partial")
                .field("content_type", content_type)
                .field("range", range)
                .finish_non_exhaustive(),
            StreamPlan::Unsatisfiable { size } => {
                f.debug_struct("Unsatisfiable").field("size", size).finish()
            }
        }
    }
}

pub struct Download {
    pub filename: String,
    pub size: u64,
    pub body: BlobReader,
}

pub struct Thumbnail {
    pub content_type: &'static str,
    pub size: u64,
    pub body: BlobReader,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    /// Descriptor with `size` replaced by the size found on disk.
    #[serde(flatten)]
    pub media: MediaDescriptor,
    pub recorded_size: u64,
    pub supports_range: bool,
}

#[async_trait::async_trait]
pub trait MediaService: Send + Sync {
    async fn stream_resource(
        &self,
        id: MediaId,
        requester: UserId,
        range_header: Option<&str>,
    ) -> Result<StreamPlan, MediaError>;

    async fn download_resource(&self, id: MediaId, requester: UserId)
    -> Result<Download, MediaError>;

    async fn get_stream_info(&self, id: MediaId, requester: UserId)
    -> Result<StreamInfo, MediaError>;

    async fn get_thumbnail(&self, id: MediaId, requester: UserId) -> Result<Thumbnail, MediaError>;
}
