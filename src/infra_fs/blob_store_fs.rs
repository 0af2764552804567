use crate::domain_model::BlobLocation;
use crate::domain_port::*;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const COPY_BUFFER: usize = 64 * 1024;

/// [`BlobStore`] backed by one flat directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Use `root` as the blob directory, creating it when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "blob store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, location: &BlobLocation) -> Result<PathBuf, BlobError> {
        let name = location.as_str();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(BlobError::InvalidLocation(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn map_missing(err: std::io::Error, location: &BlobLocation) -> BlobError {
        if err.kind() == ErrorKind::NotFound {
            BlobError::NotFound(location.clone())
        } else {
            BlobError::Io(err)
        }
    }
}

fn sanitize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    let ok = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    ok.then_some(ext)
}

async fn copy_bounded(
    source: &mut (dyn AsyncRead + Send + Unpin),
    file: &mut fs::File,
    max_len: u64,
) -> Result<u64, BlobError> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut written = 0u64;
    loop {
        let n = source.read(&mut buf).await.map_err(BlobError::Source)?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > max_len {
            return Err(BlobError::TooLarge { limit: max_len });
        }
        file.write_all(&buf[..n]).await?;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn write_stream(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        extension: Option<&str>,
        max_len: u64,
    ) -> Result<StoredBlob, BlobError> {
        let name = match extension.and_then(sanitize_extension) {
            Some(ext) => format!("{}.{ext}", nanoid::nanoid!()),
            None => nanoid::nanoid!(),
        };
        let location = BlobLocation(name);
        let path = self.path_of(&location)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let size = match copy_bounded(source, &mut file, max_len).await {
            Ok(size) => size,
            Err(err) => {
                drop(file);
                let _ = fs::remove_file(&path).await;
                return Err(err);
            }
        };
        tracing::debug!(blob = %location, size, "blob written");
        Ok(StoredBlob { location, size })
    }

    async fn open_for_read(
        &self,
        location: &BlobLocation,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<BlobReader, BlobError> {
        let path = self.path_of(location)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| Self::map_missing(e, location))?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(match limit {
            Some(limit) => Box::new(file.take(limit)),
            None => Box::new(file),
        })
    }

    async fn stat_size(&self, location: &BlobLocation) -> Result<u64, BlobError> {
        let path = self.path_of(location)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|e| Self::map_missing(e, location))?;
        if !meta.is_file() {
            return Err(BlobError::NotFound(location.clone()));
        }
        Ok(meta.len())
    }

    async fn exists(&self, location: &BlobLocation) -> Result<bool, BlobError> {
        match self.stat_size(location).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn delete(&self, location: &BlobLocation) -> Result<(), BlobError> {
        let path = self.path_of(location)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
