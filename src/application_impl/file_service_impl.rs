use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use std::sync::Arc;
use tokio::io::AsyncRead;

#[derive(Debug, Clone, Copy)]
pub struct FileLimits {
    pub upload_limit_bytes: u64,
    pub quota_bytes: u64,
}

pub struct RealFileService {
    media_repo: Arc<dyn MediaRepo>,
    blob_store: Arc<dyn BlobStore>,
    limits: FileLimits,
}

impl RealFileService {
    pub fn new(
        media_repo: Arc<dyn MediaRepo>,
        blob_store: Arc<dyn BlobStore>,
        limits: FileLimits,
    ) -> Self {
        Self {
            media_repo,
            blob_store,
            limits,
        }
    }

    fn extension_of(name: &str) -> Option<&str> {
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty() && !ext.is_empty()).then_some(ext)
    }

    async fn discard(&self, locations: &[&BlobLocation]) {
        for location in locations {
            if let Err(e) = self.blob_store.delete(location).await {
                tracing::warn!(blob = %location, error = %e, "failed to remove orphaned blob");
            }
        }
    }
}

#[async_trait::async_trait]
impl FileService for RealFileService {
    async fn stage(
        &self,
        source: &mut (dyn AsyncRead + Send + Unpin),
        original_name: &str,
    ) -> Result<StagedUpload, FileError> {
        let stored = self
            .blob_store
            .write_stream(
                source,
                Self::extension_of(original_name),
                self.limits.upload_limit_bytes,
            )
            .await?;
        if stored.size == 0 {
            self.discard(&[&stored.location]).await;
            return Err(FileError::EmptyFile);
        }
        Ok(StagedUpload {
            original_name: original_name.to_string(),
            location: stored.location,
            size: stored.size,
        })
    }

    async fn discard_staged(&self, staged: &[StagedUpload]) {
        let locations: Vec<&BlobLocation> = staged.iter().map(|s| &s.location).collect();
        self.discard(&locations).await;
    }

    async fn upload(
        &self,
        owner: UserId,
        input: UploadInput,
    ) -> Result<MediaDescriptor, FileError> {
        let UploadInput {
            content_type,
            file,
            duration_secs,
            thumbnail,
        } = input;

        let media = MediaDescriptor {
            id: MediaId::new_random(),
            owner_id: owner,
            filename: file.location.as_str().to_string(),
            original_name: file.original_name,
            is_video: content_type.starts_with("video/"),
            content_type,
            size: file.size,
            location: file.location,
            duration_secs,
            thumbnail: thumbnail.map(|t| t.location),
            uploaded_at: Utc::now(),
        };

        match self.media_repo.create(media.clone()).await {
            Ok(created) => {
                tracing::info!(
                    media_id = %created.id,
                    %owner,
                    size = created.size,
                    is_video = created.is_video,
                    "file uploaded"
                );
                Ok(created)
            }
            Err(e) => {
                let mut written = vec![&media.location];
                written.extend(media.thumbnail.as_ref());
                self.discard(&written).await;
                Err(e.into())
            }
        }
    }

    async fn list(
        &self,
        owner: UserId,
        page: PageRequest,
    ) -> Result<Page<MediaDescriptor>, FileError> {
        Ok(self.media_repo.list_by_owner(owner, &page).await?)
    }

    async fn search(
        &self,
        owner: UserId,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<MediaDescriptor>, FileError> {
        Ok(self.media_repo.search(owner, term.trim(), &page).await?)
    }

    async fn get(&self, owner: UserId, id: MediaId) -> Result<MediaDescriptor, FileError> {
        match self.media_repo.find_by_id(id).await? {
            Some(media) if media.is_owned_by(owner) => Ok(media),
            _ => Err(FileError::NotFound),
        }
    }

    async fn update(
        &self,
        owner: UserId,
        id: MediaId,
        update: MediaUpdate,
    ) -> Result<MediaDescriptor, FileError> {
        let current = self.get(owner, id).await?;
        if update.is_empty() {
            return Ok(current);
        }
        self.media_repo
            .update(id, update)
            .await?
            .ok_or(FileError::NotFound)
    }

    async fn delete(&self, owner: UserId, id: MediaId) -> Result<(), FileError> {
        let media = self
            .media_repo
            .delete_owned_by(owner, id)
            .await?
            .ok_or(FileError::NotFound)?;

        let mut blobs = vec![&media.location];
        blobs.extend(media.thumbnail.as_ref());
        self.discard(&blobs).await;
        tracing::info!(media_id = %id, %owner, "file deleted");
        Ok(())
    }

    async fn stats(&self, owner: UserId) -> Result<StorageStats, FileError> {
        let usage = self.media_repo.stats_by_owner(owner).await?;
        let used_percentage = if self.limits.quota_bytes == 0 {
            0.0
        } else {
            let pct = usage.total_size as f64 / self.limits.quota_bytes as f64 * 100.0;
            (pct.min(100.0) * 100.0).round() / 100.0
        };
        Ok(StorageStats {
            total_files: usage.total_files,
            total_size: usage.total_size,
            used_percentage,
        })
    }
}
