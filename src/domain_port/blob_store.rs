use crate::domain_model::BlobLocation;
use tokio::io::AsyncRead;

pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where a freshly written blob landed and how many bytes it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub location: BlobLocation,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobLocation),
    #[error("invalid blob location: {0}")]
    InvalidLocation(String),
    #[error("blob exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("reading the blob source failed: {0}")]
    Source(std::io::Error),
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy `source` into a blob under a freshly generated name ending in
    /// `extension`. Nothing is left behind when the copy fails or runs past
    /// `max_len` bytes.
    async fn write_stream(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        extension: Option<&str>,
        max_len: u64,
    ) -> Result<StoredBlob, BlobError>;

    /// Open a reader positioned at `offset` that yields at most `limit` bytes.
    async fn open_for_read(
        &self,
        location: &BlobLocation,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<BlobReader, BlobError>;

    async fn stat_size(&self, location: &BlobLocation) -> Result<u64, BlobError>;

    async fn exists(&self, location: &BlobLocation) -> Result<bool, BlobError>;

    /// Remove a blob. Missing blobs are not an error.
    async fn delete(&self, location: &BlobLocation) -> Result<(), BlobError>;
}
