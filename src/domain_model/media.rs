use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MediaId(pub uuid::Uuid);

impl MediaId {
    pub fn new_random() -> Self {
        MediaId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MediaId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(MediaId)
    }
}

/// Name of a blob inside the blob store. Opaque to everything but the store.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobLocation(pub String);

impl BlobLocation {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub id: MediaId,
    pub owner_id: UserId,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub size: u64,
    #[serde(skip)]
    pub location: BlobLocation,
    pub is_video: bool,
    pub duration_secs: Option<f64>,
    #[serde(skip)]
    pub thumbnail: Option<BlobLocation>,
    pub uploaded_at: DateTime<Utc>,
}

impl MediaDescriptor {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MediaUpdate {
    pub original_name: Option<String>,
    pub duration_secs: Option<f64>,
}

impl MediaUpdate {
    pub fn is_empty(&self) -> bool {
        self.original_name.is_none() && self.duration_secs.is_none()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "uploadDate")]
    UploadDate,
    #[serde(rename = "originalName")]
    OriginalName,
    #[serde(rename = "size")]
    Size,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
            sort_by: SortField::default(),
            order: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, request: &PageRequest) -> Self {
        let limit = u64::from(request.limit.max(1));
        Page {
            data,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub total_files: u64,
    pub total_size: u64,
}
