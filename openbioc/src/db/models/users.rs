//! Database models for users and their profiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::UserId;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    /// Hash of the one-time token mailed for email validation, stored on the new profile
    pub email_validation_token_hash: Option<String>,
}

/// Database response for a user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Filter for listing users
#[derive(Debug, Clone)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }
}

/// The per-user profile row, including email validation and password reset state.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileDBResponse {
    pub user_id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub website: Option<String>,
    pub public_info: Option<String>,
    pub email_validated: bool,
    pub email_validation_token_hash: Option<String>,
    pub password_reset_token_hash: Option<String>,
    pub password_reset_requested_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Public profile fields. Every field is written as given, `None` clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateDBRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub website: Option<String>,
    pub public_info: Option<String>,
}
