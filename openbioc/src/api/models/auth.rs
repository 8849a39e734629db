//! Request and response bodies of the `/authentication` routes.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{api::models::users::UserResponse, errors::Error, types::UserId};

/// Request to register a new user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Letters, digits and underscores only
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Token from the validation link sent after registration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmailValidationRequest {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub token: String,
}

/// Response after successful login or registration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub message: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// Request to initiate password reset
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetCheckRequest {
    pub token: String,
}

/// Whether a password reset token can still be used.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetCheckResponse {
    pub valid: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

fn with_cookie<T: Serialize>(status: StatusCode, cookie: &str, body: T) -> Response {
    let cookie = match HeaderValue::from_str(cookie) {
        Ok(value) => value,
        Err(e) => {
            return Error::Internal {
                operation: format!("build session cookie header: {e}"),
            }
            .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, cookie);
    (status, headers, Json(body)).into_response()
}

/// 201 with the new session cookie.
pub struct RegisterResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::CREATED, &self.cookie, self.auth_response)
    }
}

pub struct LoginResponse {
    pub auth_response: AuthResponse,
    pub cookie: String,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::OK, &self.cookie, self.auth_response)
    }
}

/// Carries an already expired cookie so the browser drops the session.
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        with_cookie(StatusCode::OK, &self.cookie, self.auth_response)
    }
}
