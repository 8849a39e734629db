use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, EmailValidationRequest, LoginRequest, LoginResponse, LogoutResponse,
            PasswordResetCheckRequest, PasswordResetCheckResponse, PasswordResetConfirmRequest, PasswordResetRequest, RegisterRequest,
            RegisterResponse,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{
        password::{self, Argon2Params},
        session,
    },
    config::Config,
    db::{
        handlers::{Repository, Users},
        models::users::{ProfileDBResponse, UserCreateDBRequest},
    },
    email::EmailService,
    errors::Error,
    types::{UserId, abbrev_uuid},
};

const RESET_REQUESTED_MESSAGE: &str = "If an account with that email exists, a password reset link has been sent.";
const INVALID_CREDENTIALS: &str = "Invalid username or password";

fn require_native_auth(config: &Config) -> Result<(), Error> {
    if !config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    Ok(())
}

/// Usernames are one or more word characters.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && username.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.chars().any(char::is_whitespace),
        None => false,
    }
}

/// Outcome of checking a password reset token against the stored profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTokenStatus {
    Valid,
    Unknown,
    Expired,
}

impl ResetTokenStatus {
    pub fn message(self) -> &'static str {
        match self {
            ResetTokenStatus::Valid => "Password reset token is valid",
            ResetTokenStatus::Unknown => "Unknown or already used password reset token",
            ResetTokenStatus::Expired => "Password reset token has expired",
        }
    }
}

/// Whether a reset requested at `requested_at` is still within `validity` at `now`.
pub fn reset_window_open(requested_at: DateTime<Utc>, now: DateTime<Utc>, validity: std::time::Duration) -> bool {
    match chrono::Duration::from_std(validity) {
        Ok(validity) => now <= requested_at + validity,
        Err(_) => true,
    }
}

async fn reset_token_status(profile: Option<&ProfileDBResponse>, token: &str, config: &Config) -> Result<ResetTokenStatus, Error> {
    let Some((hash, requested_at)) =
        profile.and_then(|p| p.password_reset_token_hash.clone().zip(p.password_reset_requested_at))
    else {
        return Ok(ResetTokenStatus::Unknown);
    };

    if !password::verify_blocking(token.to_string(), hash).await? {
        return Ok(ResetTokenStatus::Unknown);
    }
    if !reset_window_open(requested_at, Utc::now(), config.auth.native.password_reset_token_duration) {
        return Ok(ResetTokenStatus::Expired);
    }
    Ok(ResetTokenStatus::Valid)
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already taken"),
    )
)]
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    require_native_auth(&state.config)?;
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    if !is_valid_username(&request.username) {
        return Err(Error::BadRequest {
            message: "Username may only contain letters, digits and underscores".to_string(),
        });
    }
    if !is_plausible_email(&request.email) {
        return Err(Error::BadRequest {
            message: "Invalid email address".to_string(),
        });
    }
    let password_config = &state.config.auth.native.password;
    password::check_new_password(&request.password, &request.confirm_password, password_config)?;

    let params = Argon2Params::from(password_config);
    let password_hash = password::hash_blocking(request.password.clone(), params).await?;
    let validation_token = password::generate_token();
    let validation_token_hash = password::hash_blocking(validation_token.clone(), params).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let created_user = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            username: request.username,
            email: request.email,
            password_hash,
            email_validation_token_hash: Some(validation_token_hash),
        })
        .await?;

    // Mail before commit so an undeliverable address leaves no account behind
    EmailService::new(&state.config)?
        .send_validation_email(&created_user.email, &created_user.username, created_user.id, &validation_token)
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let user_response = UserResponse::from(created_user);
    let token = session::create_session_token(&CurrentUser::from(&user_response), &state.config)?;

    Ok(RegisterResponse {
        auth_response: AuthResponse {
            user: user_response,
            message: "Registration successful. Please check your email to validate your account.".to_string(),
        },
        cookie: session::session_cookie(&token, &state.config),
    })
}

/// Validate an email address with the token from the validation link
#[utoipa::path(
    post,
    path = "/authentication/email-validations",
    request_body = EmailValidationRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Email validated", body = AuthSuccessResponse),
        (status = 400, description = "Unknown token or email already validated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn validate_email(
    State(state): State<AppState>,
    Json(request): Json<EmailValidationRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let unknown = || Error::BadRequest {
        message: "Unknown or deleted email validation token".to_string(),
    };
    let profile = users.get_profile(request.user_id).await?.ok_or_else(unknown)?;
    if profile.email_validated {
        return Err(Error::BadRequest {
            message: "Email is already validated".to_string(),
        });
    }
    let hash = profile.email_validation_token_hash.ok_or_else(unknown)?;
    if !password::verify_blocking(request.token, hash).await? {
        return Err(unknown());
    }

    users.mark_email_validated(request.user_id).await?;

    Ok(Json(AuthSuccessResponse {
        message: "Email successfully validated".to_string(),
    }))
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or unvalidated email"),
    )
)]
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    require_native_auth(&state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let invalid = || Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    };
    let user = users.get_user_by_username(&request.username).await?.ok_or_else(invalid)?;

    if !password::verify_blocking(request.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    if state.config.auth.native.email_validation_required {
        let validated = users.get_profile(user.id).await?.is_some_and(|p| p.email_validated);
        if !validated {
            return Err(Error::Unauthenticated {
                message: Some("Please validate your email address before logging in".to_string()),
            });
        }
    }

    users.record_login(user.id).await?;

    let user_response = UserResponse::from(user);
    let token = session::create_session_token(&CurrentUser::from(&user_response), &state.config)?;

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: user_response,
            message: "Login successful".to_string(),
        },
        cookie: session::session_cookie(&token, &state.config),
    })
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<LogoutResponse, Error> {
    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookie: session::expired_session_cookie(&state.config),
    })
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Reset requested; the answer does not reveal whether the account exists", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state.config)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    // Same answer either way so the endpoint can't be used to probe for accounts
    if let Some(user) = users.get_user_by_email(&request.email).await? {
        let token = password::generate_token();
        let params = Argon2Params::from(&state.config.auth.native.password);
        let token_hash = password::hash_blocking(token.clone(), params).await?;

        users.begin_password_reset(user.id, &token_hash, Utc::now()).await?;
        let sent = match EmailService::new(&state.config) {
            Ok(email) => email.send_password_reset_email(&user.email, &user.username, user.id, &token).await,
            Err(e) => Err(e),
        };
        // A failed send must not change the answer
        if let Err(e) = sent {
            tracing::error!(user_id = %abbrev_uuid(&user.id), "Failed to send password reset email: {e}");
        }
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(AuthSuccessResponse {
        message: RESET_REQUESTED_MESSAGE.to_string(),
    }))
}

/// Check whether a password reset token can still be used
#[utoipa::path(
    post,
    path = "/authentication/password-resets/{user_id}/check",
    request_body = PasswordResetCheckRequest,
    params(("user_id" = String, Path, description = "User the token was issued to")),
    tag = "authentication",
    responses(
        (status = 200, description = "Token status", body = PasswordResetCheckResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn check_password_reset(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<PasswordResetCheckRequest>,
) -> Result<Json<PasswordResetCheckResponse>, Error> {
    require_native_auth(&state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Users::new(&mut conn).get_profile(user_id).await?;
    let status = reset_token_status(profile.as_ref(), &request.token, &state.config).await?;

    Ok(Json(PasswordResetCheckResponse {
        valid: status == ResetTokenStatus::Valid,
        message: status.message().to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/{user_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    params(("user_id" = String, Path, description = "User the token was issued to")),
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset successful", body = AuthSuccessResponse),
        (status = 400, description = "Invalid or expired token, or unacceptable password"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<AuthSuccessResponse>, Error> {
    require_native_auth(&state.config)?;

    let password_config = &state.config.auth.native.password;
    password::check_new_password(&request.password, &request.confirm_password, password_config)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    let profile = users.get_profile(user_id).await?;
    let status = reset_token_status(profile.as_ref(), &request.token, &state.config).await?;
    let token_hash = match profile.and_then(|p| p.password_reset_token_hash) {
        Some(hash) if status == ResetTokenStatus::Valid => hash,
        _ => {
            return Err(Error::BadRequest {
                message: status.message().to_string(),
            });
        }
    };

    let password_hash = password::hash_blocking(request.password, Argon2Params::from(password_config)).await?;
    // Another confirm may have consumed the token since it was checked
    if !users.complete_password_reset(user_id, &token_hash, &password_hash).await? {
        return Err(Error::BadRequest {
            message: ResetTokenStatus::Unknown.message().to_string(),
        });
    }
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(AuthSuccessResponse {
        message: "Password has been reset successfully".to_string(),
    }))
}
