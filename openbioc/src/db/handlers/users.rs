//! Database repository for users and their profiles.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{ProfileDBResponse, ProfileUpdateDBRequest, UserCreateDBRequest, UserDBResponse, UserFilter},
    },
    types::{UserId, abbrev_uuid},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at, last_login";
const PROFILE_COLUMNS: &str = "user_id, first_name, last_name, website, public_info, email_validated, \
     email_validation_token_hash, password_reset_token_hash, password_reset_requested_at, updated_at";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    /// Create the user together with an empty, unvalidated profile.
    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user_id = Uuid::new_v4();

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_profiles (user_id, email_validation_token_hash) VALUES ($1, $2)")
            .bind(user_id)
            .bind(&request.email_validation_token_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, UserDBResponse>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(users)
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_user_by_username(&mut self, username: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"))
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_password(&mut self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn record_login(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn get_profile(&mut self, id: UserId) -> Result<Option<ProfileDBResponse>> {
        let profile =
            sqlx::query_as::<_, ProfileDBResponse>(&format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.db)
                .await?;
        Ok(profile)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_profile(&mut self, id: UserId, request: &ProfileUpdateDBRequest) -> Result<ProfileDBResponse> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(&format!(
            r#"
            UPDATE user_profiles SET
                first_name = $2,
                last_name = $3,
                website = $4,
                public_info = $5,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.website)
        .bind(&request.public_info)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(profile)
    }

    /// Mark the email as validated and drop the one-time validation token.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_email_validated(&mut self, id: UserId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE user_profiles SET email_validated = TRUE, email_validation_token_hash = NULL, updated_at = NOW()
             WHERE user_id = $1",
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Store a new reset token hash, replacing any earlier one, and restart its validity window.
    #[instrument(skip(self, token_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn begin_password_reset(&mut self, id: UserId, token_hash: &str, requested_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE user_profiles SET password_reset_token_hash = $2, password_reset_requested_at = $3, updated_at = NOW()
             WHERE user_id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(requested_at)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Consume the reset token stored as `token_hash` and set the new password, in one transaction.
    ///
    /// Returns `false`, changing nothing, when the stored token is no longer `token_hash`.
    #[instrument(skip(self, token_hash, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn complete_password_reset(&mut self, id: UserId, token_hash: &str, password_hash: &str) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        // The row lock taken here serializes concurrent confirms of the same token
        let consumed = sqlx::query(
            "UPDATE user_profiles SET password_reset_token_hash = NULL, password_reset_requested_at = NULL, updated_at = NOW()
             WHERE user_id = $1 AND password_reset_token_hash = $2",
        )
        .bind(id)
        .bind(token_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if consumed == 0 {
            return Ok(false);
        }
        Users::new(&mut tx).update_password(id, password_hash).await?;

        tx.commit().await?;
        Ok(true)
    }
}
