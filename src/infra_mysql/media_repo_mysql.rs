use super::util::{is_dup_key, like_contains};
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlMediaRepo {
    pool: MySqlPool,
}

const MEDIA_COLUMNS: &str = "id, owner_id, filename, original_name, content_type, size, location, \
                             is_video, duration_secs, thumbnail, uploaded_at";

impl MySqlMediaRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlMediaRepo { pool }
    }

    fn row_to_media(row: &MySqlRow) -> Result<MediaDescriptor, StoreError> {
        let thumbnail: Option<String> = row.try_get("thumbnail")?;
        Ok(MediaDescriptor {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            filename: row.try_get("filename")?,
            original_name: row.try_get("original_name")?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
            location: BlobLocation(row.try_get("location")?),
            is_video: row.try_get("is_video")?,
            duration_secs: row.try_get("duration_secs")?,
            thumbnail: thumbnail.map(BlobLocation),
            uploaded_at: row.try_get("uploaded_at")?,
        })
    }

    /// Column list is fixed per variant, so interpolating it is safe.
    fn order_clause(page: &PageRequest) -> String {
        let column = match page.sort_by {
            SortField::UploadDate => "uploaded_at",
            SortField::OriginalName => "original_name",
            SortField::Size => "size",
        };
        let direction = match page.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        format!("ORDER BY {column} {direction}, id {direction}")
    }

    async fn page_where(
        &self,
        filter: &str,
        owner: UserId,
        pattern: Option<&str>,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError> {
        let count_sql = format!("SELECT COUNT(*) FROM media_file WHERE {filter}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(owner);
        if let Some(p) = pattern {
            count = count.bind(p).bind(p);
        }
        let total = count.fetch_one(&self.pool).await?;

        let select_sql = format!(
            "SELECT {MEDIA_COLUMNS} FROM media_file WHERE {filter} {} LIMIT ? OFFSET ?",
            Self::order_clause(page)
        );
        let mut select = sqlx::query(&select_sql).bind(owner);
        if let Some(p) = pattern {
            select = select.bind(p).bind(p);
        }
        let rows = select
            .bind(u64::from(page.limit))
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let data = rows
            .iter()
            .map(Self::row_to_media)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(data, total.max(0) as u64, page))
    }
}

#[async_trait::async_trait]
impl MediaRepo for MySqlMediaRepo {
    async fn create(&self, media: MediaDescriptor) -> Result<MediaDescriptor, StoreError> {
        sqlx::query(
            r#"
INSERT INTO media_file
    (id, owner_id, filename, original_name, content_type, size, location,
     is_video, duration_secs, thumbnail, uploaded_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(media.id)
        .bind(media.owner_id)
        .bind(&media.filename)
        .bind(&media.original_name)
        .bind(&media.content_type)
        .bind(media.size)
        .bind(media.location.as_str())
        .bind(media.is_video)
        .bind(media.duration_secs)
        .bind(media.thumbnail.as_ref().map(|t| t.as_str()))
        .bind(media.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                StoreError::Duplicate(media.id.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(media)
    }

    async fn find_by_id(&self, id: MediaId) -> Result<Option<MediaDescriptor>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MEDIA_COLUMNS} FROM media_file WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_media).transpose()
    }

    async fn update(
        &self,
        id: MediaId,
        update: MediaUpdate,
    ) -> Result<Option<MediaDescriptor>, StoreError> {
        if !update.is_empty() {
            sqlx::query(
                r#"
UPDATE media_file
SET original_name = COALESCE(?, original_name),
    duration_secs = COALESCE(?, duration_secs)
WHERE id = ?
"#,
            )
            .bind(update.original_name.as_deref())
            .bind(update.duration_secs)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }
        self.find_by_id(id).await
    }

    async fn delete_owned_by(
        &self,
        owner: UserId,
        id: MediaId,
    ) -> Result<Option<MediaDescriptor>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media_file WHERE id = ? AND owner_id = ? FOR UPDATE"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let media = Self::row_to_media(&row)?;
        sqlx::query("DELETE FROM media_file WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(media))
    }

    async fn list_by_owner(
        &self,
        owner: UserId,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError> {
        self.page_where("owner_id = ?", owner, None, page).await
    }

    async fn search(
        &self,
        owner: UserId,
        term: &str,
        page: &PageRequest,
    ) -> Result<Page<MediaDescriptor>, StoreError> {
        // default collation is case-insensitive
        let pattern = like_contains(term);
        self.page_where(
            "owner_id = ? AND (original_name LIKE ? OR filename LIKE ?)",
            owner,
            Some(&pattern),
            page,
        )
        .await
    }

    async fn stats_by_owner(&self, owner: UserId) -> Result<StorageUsage, StoreError> {
        let row = sqlx::query(
            r#"
SELECT COUNT(*) AS total_files,
       CAST(COALESCE(SUM(size), 0) AS UNSIGNED) AS total_size
FROM media_file
WHERE owner_id = ?
"#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        let total_files: i64 = row.try_get("total_files")?;
        Ok(StorageUsage {
            total_files: total_files.max(0) as u64,
            total_size: row.try_get("total_size")?,
        })
    }
}
