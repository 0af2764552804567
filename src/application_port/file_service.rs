use crate::domain_model::*;
use crate::domain_port::{BlobError, StoreError};
use serde::Serialize;
use tokio::io::AsyncRead;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("file not found")]
    NotFound,
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error("file exceeds the upload limit of {limit_bytes} bytes")]
    TooLarge { limit_bytes: u64 },
    #[error("upload body could not be read: {0}")]
    MalformedUpload(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for FileError {
    fn from(err: StoreError) -> Self {
        FileError::Unavailable(err.to_string())
    }
}

impl From<BlobError> for FileError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::TooLarge { limit } => FileError::TooLarge { limit_bytes: limit },
            BlobError::Source(e) => FileError::MalformedUpload(e.to_string()),
            other => FileError::InternalError(other.to_string()),
        }
    }
}

/// An uploaded part already written to blob storage but not yet attached
/// to a descriptor.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub original_name: String,
    pub location: BlobLocation,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadInput {
    pub content_type: String,
    pub file: StagedUpload,
    pub duration_secs: Option<f64>,
    pub thumbnail: Option<StagedUpload>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: u64,
    pub total_size: u64,
    pub used_percentage: f64,
}

#[async_trait::async_trait]
pub trait FileService: Send + Sync {
    /// Stream one part into blob storage, bounded by the upload limit.
    async fn stage(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        original_name: &str,
    ) -> Result<StagedUpload, FileError>;
    /// Remove staged blobs that will never get a descriptor.
    async fn discard_staged(&self, staged: &[StagedUpload]);
    /// Record a descriptor for staged blobs. The blobs are discarded when
    /// this fails.
    async fn upload(&self, owner: UserId, input: UploadInput) -> Result<MediaDescriptor, FileError>;
    async fn list(
        &self,
        owner: UserId,
        page: PageRequest,
    ) -> Result<Page<MediaDescriptor>, FileError>;
    async fn search(
        &self,
        owner: UserId,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<MediaDescriptor>, FileError>;
    async fn get(&self, owner: UserId, id: MediaId) -> Result<MediaDescriptor, FileError>;
    async fn update(
        &self,
        owner: UserId,
        id: MediaId,
        update: MediaUpdate,
    ) -> Result<MediaDescriptor, FileError>;
    async fn delete(&self, owner: UserId, id: MediaId) -> Result<(), FileError>;
    async fn stats(&self, owner: UserId) -> Result<StorageStats, FileError>;
}
