use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::users::{CurrentUser, ProfileResponse, ProfileUpdate},
    db::{handlers::Users, models::users::ProfileUpdateDBRequest},
    errors::{Error, Result},
};

/// Blank strings are stored as null.
fn normalize(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn merge(current: Option<String>, update: Option<String>) -> Option<String> {
    match update {
        Some(value) => normalize(value),
        None => current,
    }
}

#[utoipa::path(
    get,
    path = "/users/current/profile",
    tag = "users",
    summary = "Get the current user's profile",
    responses(
        (status = 200, description = "Profile of the logged-in user", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Profile not found"),
    ),
    security(("SessionCookie" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<ProfileResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Users::new(&mut conn).get_profile(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: current_user.username.clone(),
    })?;

    Ok(Json(ProfileResponse::new(&current_user, profile)))
}

#[utoipa::path(
    patch,
    path = "/users/current/profile",
    tag = "users",
    summary = "Update the current user's profile",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Profile not found"),
    ),
    security(("SessionCookie" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<ProfileResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut tx);

    let current = users.get_profile(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "Profile".to_string(),
        id: current_user.username.clone(),
    })?;
    let request = ProfileUpdateDBRequest {
        first_name: merge(current.first_name, update.first_name),
        last_name: merge(current.last_name, update.last_name),
        website: merge(current.website, update.website),
        public_info: merge(current.public_info, update.public_info),
    };
    let profile = users.update_profile(current_user.id, &request).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(ProfileResponse::new(&current_user, profile)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_cookie, create_test_app, create_test_config, create_test_user};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[test]
    fn test_merge_rules() {
        assert_eq!(merge(Some("Ada".to_string()), None).as_deref(), Some("Ada"));
        assert_eq!(merge(Some("Ada".to_string()), Some("   ".to_string())), None);
        assert_eq!(merge(None, Some(" Grace ".to_string())).as_deref(), Some("Grace"));
    }

    #[sqlx::test]
    async fn test_profile_requires_session(pool: PgPool) {
        let server = create_test_app(pool, create_test_config());
        server
            .get("/api/v1/users/current/profile")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_and_update_profile(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, "profiled").await;
        let (name, value) = auth_cookie(&user, &config);
        let server = create_test_app(pool, config);

        let profile: ProfileResponse = server
            .get("/api/v1/users/current/profile")
            .add_header(name.clone(), value.clone())
            .await
            .json();
        assert_eq!(profile.username, "profiled");
        assert!(!profile.email_validated);
        assert_eq!(profile.first_name, None);

        let profile: ProfileResponse = server
            .patch("/api/v1/users/current/profile")
            .add_header(name.clone(), value.clone())
            .json(&json!({"first_name": "Rosalind", "website": "https://example.org"}))
            .await
            .json();
        assert_eq!(profile.first_name.as_deref(), Some("Rosalind"));
        assert_eq!(profile.website.as_deref(), Some("https://example.org"));

        // Omitted fields are kept, blank ones cleared
        let profile: ProfileResponse = server
            .patch("/api/v1/users/current/profile")
            .add_header(name, value)
            .json(&json!({"website": ""}))
            .await
            .json();
        assert_eq!(profile.first_name.as_deref(), Some("Rosalind"));
        assert_eq!(profile.website, None);
    }
}
