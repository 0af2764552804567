use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::Arc;

pub struct RealMediaService {
    media_repo: Arc<dyn MediaRepo>,
    blob_store: Arc<dyn BlobStore>,
}

impl RealMediaService {
    pub fn new(media_repo: Arc<dyn MediaRepo>, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            media_repo,
            blob_store,
        }
    }

    /// Descriptor of `id` if `requester` owns it. Foreign media looks absent.
    async fn owned(&self, id: MediaId, requester: UserId) -> Result<MediaDescriptor, MediaError> {
        match self.media_repo.find_by_id(id).await? {
            Some(media) if media.is_owned_by(requester) => Ok(media),
            _ => Err(MediaError::NotFound),
        }
    }

    async fn live_size(&self, media: &MediaDescriptor) -> Result<u64, MediaError> {
        self.blob_store
            .stat_size(&media.location)
            .await
            .map_err(|e| {
                if matches!(e, BlobError::NotFound(_)) {
                    tracing::warn!(media_id = %media.id, blob = %media.location, "descriptor points at a missing blob");
                }
                MediaError::from(e)
            })
    }
}

fn image_content_type(location: &BlobLocation) -> &'static str {
    match location.extension().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[async_trait::async_trait]
impl MediaService for RealMediaService {
    async fn stream_resource(
        &self,
        id: MediaId,
        requester: UserId,
        range_header: Option<&str>,
    ) -> Result<StreamPlan, MediaError> {
        let media = self.owned(id, requester).await?;
        let size = self.live_size(&media).await?;

        let plan = match parse_range(range_header, size) {
            RangeOutcome::FullBody => StreamPlan::Full {
                body: self.blob_store.open_for_read(&media.location, 0, None).await?,
                content_type: media.content_type,
                size,
            },
            RangeOutcome::Partial(range) => StreamPlan::Partial {
                body: self
                    .blob_store
                    .open_for_read(&media.location, range.start, Some(range.content_length()))
                    .await?,
                content_type: media.content_type,
                range,
            },
            RangeOutcome::Unsatisfiable => {
                tracing::debug!(media_id = %id, range = ?range_header, size, "range not satisfiable");
                StreamPlan::Unsatisfiable { size }
            }
        };
        Ok(plan)
    }

    async fn download_resource(
        &self,
        id: MediaId,
        requester: UserId,
    ) -> Result<Download, MediaError> {
        let media = self.owned(id, requester).await?;
        let size = self.live_size(&media).await?;
        let body = self.blob_store.open_for_read(&media.location, 0, None).await?;
        Ok(Download {
            filename: media.original_name,
            size,
            body,
        })
    }

    async fn get_stream_info(
        &self,
        id: MediaId,
        requester: UserId,
    ) -> Result<StreamInfo, MediaError> {
        let mut media = self.owned(id, requester).await?;
        let size = self.live_size(&media).await?;
        let recorded_size = media.size;
        media.size = size;
        Ok(StreamInfo {
            media,
            recorded_size,
            supports_range: true,
        })
    }

    async fn get_thumbnail(&self, id: MediaId, requester: UserId) -> Result<Thumbnail, MediaError> {
        let media = self.owned(id, requester).await?;
        let location = match (&media.thumbnail, media.is_video) {
            (Some(location), true) => location,
            _ => return Err(MediaError::NotFound),
        };
        let size = self.blob_store.stat_size(location).await?;
        let body = self.blob_store.open_for_read(location, 0, None).await?;
        Ok(Thumbnail {
            content_type: image_content_type(location),
            size,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_fs::FsBlobStore;
    use crate::infra_memory::MemoryMediaRepo;
    use chrono::Utc;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: MemoryMediaRepo,
        blobs: Arc<FsBlobStore>,
        service: RealMediaService,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::open(dir.path()).await.unwrap());
        let repo = MemoryMediaRepo::new();
        let service = RealMediaService::new(Arc::new(repo.clone()), blobs.clone());
        Fixture {
            _dir: dir,
            repo,
            blobs,
            service,
        }
    }

    async fn seed(fx: &Fixture, owner: UserId, bytes: &[u8], thumb: Option<&[u8]>) -> MediaId {
        let location = fx
            .blobs
            .write_stream(&mut &bytes[..], Some("mp4"), u64::MAX)
            .await
            .unwrap()
            .location;
        let thumbnail = match thumb {
            Some(t) => Some(
                fx.blobs
                    .write_stream(&mut &t[..], Some("png"), u64::MAX)
                    .await
                    .unwrap()
                    .location,
            ),
            None => None,
        };
        let media = MediaDescriptor {
            id: MediaId::new_random(),
            owner_id: owner,
            filename: location.as_str().to_string(),
            original_name: "clip.mp4".into(),
            content_type: "video/mp4".into(),
            size: bytes.len() as u64,
            location,
            is_video: true,
            duration_secs: Some(1.5),
            thumbnail,
            uploaded_at: Utc::now(),
        };
        fx.repo.create(media).await.unwrap().id
    }

    async fn read_all(mut body: BlobReader) -> Vec<u8> {
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn partial_plans_read_exactly_the_window() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let id = seed(&fx, owner, &data, None).await;

        match fx
            .service
            .stream_resource(id, owner, Some("bytes=100-199"))
            .await
            .unwrap()
        {
            StreamPlan::Partial { range, body, content_type } => {
                assert_eq!(content_type, "video/mp4");
                assert_eq!(range.content_range(), "bytes 100-199/1000");
                assert_eq!(read_all(body).await, data[100..200].to_vec());
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_and_unsatisfiable_plans() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let id = seed(&fx, owner, &[7u8; 64], None).await;

        match fx.service.stream_resource(id, owner, None).await.unwrap() {
            StreamPlan::Full { size, body, .. } => {
                assert_eq!(size, 64);
                assert_eq!(read_all(body).await.len(), 64);
            }
            other => panic!("expected full, got {other:?}"),
        }
        assert!(matches!(
            fx.service
                .stream_resource(id, owner, Some("bytes=64-"))
                .await
                .unwrap(),
            StreamPlan::Unsatisfiable { size: 64 }
        ));
    }

    #[tokio::test]
    async fn foreign_or_missing_media_is_not_found() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let id = seed(&fx, owner, b"abc", None).await;

        let stranger = UserId::new_random();
        assert!(matches!(
            fx.service.stream_resource(id, stranger, None).await,
            Err(MediaError::NotFound)
        ));
        assert!(matches!(
            fx.service
                .download_resource(MediaId::new_random(), owner)
                .await,
            Err(MediaError::NotFound)
        ));
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let id = seed(&fx, owner, b"abc", None).await;
        let media = fx.repo.find_by_id(id).await.unwrap().unwrap();
        fx.blobs.delete(&media.location).await.unwrap();

        assert!(matches!(
            fx.service.stream_resource(id, owner, None).await,
            Err(MediaError::NotFound)
        ));
        assert!(matches!(
            fx.service.get_stream_info(id, owner).await,
            Err(MediaError::NotFound)
        ));
    }

    #[tokio::test]
    async fn info_reports_live_size() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let id = seed(&fx, owner, &[1u8; 10], None).await;

        let info = fx.service.get_stream_info(id, owner).await.unwrap();
        assert_eq!(info.media.size, 10);
        assert_eq!(info.recorded_size, 10);
        assert!(info.supports_range);
    }

    #[tokio::test]
    async fn thumbnails_need_a_video_with_a_thumbnail() {
        let fx = fixture().await;
        let owner = UserId::new_random();
        let with = seed(&fx, owner, b"video", Some(b"png-bytes")).await;
        let without = seed(&fx, owner, b"video", None).await;

        let thumb = fx.service.get_thumbnail(with, owner).await.unwrap();
        assert_eq!(thumb.content_type, "image/png");
        assert_eq!(thumb.size, 9);
        assert_eq!(read_all(thumb.body).await, b"png-bytes".to_vec());

        assert!(matches!(
            fx.service.get_thumbnail(without, owner).await,
            Err(MediaError::NotFound)
        ));
    }

    #[test]
    fn thumbnail_types_follow_extension() {
        assert_eq!(image_content_type(&BlobLocation("a.JPG".into())), "image/jpeg");
        assert_eq!(image_content_type(&BlobLocation("a.webp".into())), "image/webp");
        assert_eq!(
            image_content_type(&BlobLocation("a".into())),
            "application/octet-stream"
        );
    }
}
