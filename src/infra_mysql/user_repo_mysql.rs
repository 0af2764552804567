use super::util::is_dup_key;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlUserRepo {
    pool: MySqlPool,
}

const USER_COLUMNS: &str =
    "user_id, email, password_hash, first_name, last_name, role, is_active, last_login, created_at";

impl MySqlUserRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlUserRepo { pool }
    }

    fn row_to_record(row: &MySqlRow) -> Result<UserRecord, StoreError> {
        let role: String = row.try_get("role")?;
        Ok(UserRecord {
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            role: role.parse().map_err(StoreError::Unavailable)?,
            is_active: row.try_get("is_active")?,
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn refresh_tokens_of(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let tokens: Vec<String> = sqlx::query_scalar(
            r#"
SELECT token
FROM user_refresh_token
WHERE user_id = ?
ORDER BY created_at
"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tokens)
    }

    async fn credentials_from(
        &self,
        row: Option<MySqlRow>,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let user = Self::row_to_record(&row)?;
        let password_hash: String = row.try_get("password_hash")?;
        let refresh_tokens = self.refresh_tokens_of(user.user_id).await?;
        Ok(Some(CredentialRecord {
            user,
            password_hash,
            refresh_tokens,
        }))
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<MySqlRow>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM user WHERE email = ?"))
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn fetch_by_id(&self, user_id: UserId) -> Result<Option<MySqlRow>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM user WHERE user_id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait::async_trait]
impl UserRepo for MySqlUserRepo {
    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = normalize_email(&user.email);
        let created_at = Utc::now();

        sqlx::query(
            r#"
INSERT INTO user (user_id, email, password_hash, first_name, last_name, role, is_active, created_at)
VALUES (?, ?, ?, ?, ?, ?, TRUE, ?)
"#,
        )
        .bind(user.user_id)
        .bind(&email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_dup_key(&e) {
                StoreError::Duplicate(email.clone())
            } else {
                e.into()
            }
        })?;

        Ok(UserRecord {
            user_id: user.user_id,
            email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_active: true,
            last_login: None,
            created_at,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_by_email(email)
            .await?
            .as_ref()
            .map(Self::row_to_record)
            .transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let row = self.fetch_by_email(email).await?;
        self.credentials_from(row).await
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.fetch_by_id(user_id)
            .await?
            .as_ref()
            .map(Self::row_to_record)
            .transpose()
    }

    async fn find_credentials_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let row = self.fetch_by_id(user_id).await?;
        self.credentials_from(row).await
    }

    async fn update_refresh_tokens(
        &self,
        user_id: UserId,
        change: RefreshTokenChange<'_>,
    ) -> Result<bool, StoreError> {
        let result = match change {
            RefreshTokenChange::Add(token) => {
                sqlx::query(
                    r#"
INSERT IGNORE INTO user_refresh_token (token_digest, user_id, token)
VALUES (?, ?, ?)
"#,
                )
                .bind(token_digest(token.as_str()))
                .bind(user_id)
                .bind(token.as_str())
                .execute(&self.pool)
                .await?
            }
            // a single DELETE; of two racing removes only one sees a row
            RefreshTokenChange::Remove(token) => {
                sqlx::query(
                    "DELETE FROM user_refresh_token WHERE token_digest = ? AND user_id = ?",
                )
                .bind(token_digest(token.as_str()))
                .bind(user_id)
                .execute(&self.pool)
                .await?
            }
            RefreshTokenChange::Clear => {
                sqlx::query("DELETE FROM user_refresh_token WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn set_last_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE user SET last_login = ? WHERE user_id = ?")
            .bind(at)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
