use crate::domain_model::*;
use crate::domain_port::StoreError;

#[async_trait::async_trait]
pub trait MediaRepo: Send + Sync {
    async fn create(&self, media: MediaDescriptor) -> Result<MediaDescriptor, StoreError>;

    async fn find_by_id(&self, id: MediaId) -> Result<Option<MediaDescriptor>, StoreError>;

    async fn update(
        &self,
        id: MediaId,
        update: MediaUpdate,
    ) -> Result<Option<MediaDescriptor>, StoreError>;

    /// Delete `id` only if `owner` owns it. Returns the removed descriptor.
    async fn delete_owned_by(
        &self,
        owner: UserId,
        id: MediaId,
    ) -> Result<Option<MediaDescriptor>, StoreError>;

    async fn list_by_owner(
        &self,
        owner: UserId,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError>;

    /// Case-insensitive substring match on original and generated filename.
    async fn search(
        &self,
        owner: UserId,
        term: &str,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError>;

    async fn stats_by_owner(&self, owner: UserId) -> Result<StorageUsage, StoreError>;
}
