use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::Arc;

/// In-process [`MediaRepo`] for development and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryMediaRepo {
    media: Arc<DashMap<MediaId, MediaDescriptor>>,
}

impl MemoryMediaRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn owned_by(&self, owner: UserId, filter: impl Fn(&MediaDescriptor) -> bool) -> Vec<MediaDescriptor> {
        self.media
            .iter()
            .filter(|m| m.owner_id == owner && filter(m.value()))
            .map(|m| m.value().clone())
            .collect()
    }

    fn paginate(mut items: Vec<MediaDescriptor>, page: &PageRequest) -> Page<MediaDescriptor> {
        items.sort_by(|a, b| {
            let ord = match page.sort_by {
                SortField::UploadDate => a.uploaded_at.cmp(&b.uploaded_at),
                SortField::OriginalName => a.original_name.cmp(&b.original_name),
                SortField::Size => a.size.cmp(&b.size),
            };
            let ord = match page.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            // stable across calls
            if ord == Ordering::Equal { a.id.cmp(&b.id) } else { ord }
        });
        let total = items.len() as u64;
        let data = items
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Page::new(data, total, page)
    }
}

#[async_trait::async_trait]
impl MediaRepo for MemoryMediaRepo {
    async fn create(&self, media: MediaDescriptor) -> Result<MediaDescriptor, StoreError> {
        if self.media.contains_key(&media.id) {
            return Err(StoreError::Duplicate(media.id.to_string()));
        }
        self.media.insert(media.id, media.clone());
        Ok(media)
    }

    async fn find_by_id(&self, id: MediaId) -> Result<Option<MediaDescriptor>, StoreError> {
        Ok(self.media.get(&id).map(|m| m.value().clone()))
    }

    async fn update(
        &self,
        id: MediaId,
        update: MediaUpdate,
    ) -> Result<Option<MediaDescriptor>, StoreError> {
        let Some(mut media) = self.media.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.original_name {
            media.original_name = name;
        }
        if let Some(duration) = update.duration_secs {
            media.duration_secs = Some(duration);
        }
        Ok(Some(media.value().clone()))
    }

    async fn delete_owned_by(
        &self,
        owner: UserId,
        id: MediaId,
    ) -> Result<Option<MediaDescriptor>, StoreError> {
        Ok(self
            .media
            .remove_if(&id, |_, m| m.owner_id == owner)
            .map(|(_, m)| m))
    }

    async fn list_by_owner(
        &self,
        owner: UserId,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError> {
        Ok(Self::paginate(self.owned_by(owner, |_| true), page))
    }

    async fn search(
        &self,
        owner: UserId,
        term: &str,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError> {
        let needle = term.to_lowercase();
        let hits = self.owned_by(owner, |m| {
            m.original_name.to_lowercase().contains(&needle)
                || m.filename.to_lowercase().contains(&needle)
        });
        Ok(Self::paginate(hits, page))
    }

    async fn stats_by_owner(&self, owner: UserId) -> Result<StorageUsage, StoreError> {
        let owned = self.owned_by(owner, |_| true);
        Ok(StorageUsage {
            total_files: owned.len() as u64,
            total_size: owned.iter().map(|m| m.size).sum(),
        })
    }
}
