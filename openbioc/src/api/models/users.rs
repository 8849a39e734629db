//! API request/response models for users and profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::users::{ProfileDBResponse, UserDBResponse};
use crate::types::UserId;

/// The authenticated caller, as carried in the session token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            created_at: db.created_at,
            last_login: db.last_login,
        }
    }
}

impl From<&UserResponse> for CurrentUser {
    fn from(user: &UserResponse) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub email_validated: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub website: Option<String>,
    pub public_info: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileResponse {
    pub fn new(user: &CurrentUser, profile: ProfileDBResponse) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            email_validated: profile.email_validated,
            first_name: profile.first_name,
            last_name: profile.last_name,
            website: profile.website,
            public_info: profile.public_info,
            updated_at: profile.updated_at,
        }
    }
}

/// Partial profile update. Omitted fields keep their value, blank strings clear it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub website: Option<String>,
    pub public_info: Option<String>,
}
