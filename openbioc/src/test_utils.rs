//! Shared fixtures for the `#[sqlx::test]` suites.

use axum_test::TestServer;
use sqlx::PgPool;

use crate::{
    Application,
    api::models::users::CurrentUser,
    auth::{
        password::{self, Argon2Params},
        session,
    },
    config::{Config, EmailTransportConfig},
    db::{
        handlers::{Repository, Tools, Users},
        models::{
            tools::{ToolCreateDBRequest, ToolDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    types::{ToolId, UserId},
};

const TEST_PASSWORD: &str = "password123";

/// Password every [`create_test_user`] account logs in with.
pub fn test_password() -> &'static str {
    TEST_PASSWORD
}

pub fn create_test_config() -> Config {
    // Use temp directory for test emails
    let emails_dir = std::env::temp_dir().join(format!("openbioc-test-emails-{}", std::process::id()));

    let mut config = Config {
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };
    config.email.transport = EmailTransportConfig::File {
        path: emails_dir.to_string_lossy().into_owned(),
    };
    config.auth.native.session.cookie_secure = false;

    // Cheap hashing so registration and login tests stay fast
    let password = &mut config.auth.native.password;
    password.argon2_memory_kib = 128;
    password.argon2_iterations = 1;
    password.argon2_parallelism = 1;

    config
}

pub fn create_test_app(pool: PgPool, config: Config) -> TestServer {
    Application::new_with_pool(config, pool)
        .expect("Failed to create application")
        .into_test_server()
}

pub async fn create_test_user(pool: &PgPool, username: &str) -> UserDBResponse {
    let params = Argon2Params::from(&create_test_config().auth.native.password);
    let password_hash = password::hash_string_with_params(TEST_PASSWORD, Some(params)).expect("Failed to hash password");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash,
            email_validation_token_hash: None,
        })
        .await
        .expect("Failed to create test user")
}

/// `(header name, header value)` carrying a valid session cookie for `user`.
pub fn auth_cookie(user: &UserDBResponse, config: &Config) -> (String, String) {
    let current = CurrentUser::from(user.clone());
    let token = session::create_session_token(&current, config).expect("Failed to create session token");
    (
        "cookie".to_string(),
        format!("{}={}", config.auth.native.session.cookie_name, token),
    )
}

pub fn tool_request(name: &str, version: &str, created_by: UserId) -> ToolCreateDBRequest {
    ToolCreateDBRequest {
        name: name.to_string(),
        version: version.to_string(),
        website: format!("https://example.org/{name}"),
        description: format!("{name} {version}"),
        installation_commands: format!("conda install {name}={version}"),
        validation_commands: format!("{name} --version"),
        forked_from: None,
        changes: None,
        dependencies: Vec::new(),
        variables: Vec::new(),
        created_by,
    }
}

/// Store a new edit of `name/version` depending on `dependencies`, in order.
pub async fn create_test_tool(pool: &PgPool, name: &str, version: &str, dependencies: &[ToolId], created_by: UserId) -> ToolDBResponse {
    let mut request = tool_request(name, version, created_by);
    request.dependencies = dependencies.to_vec();

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Tools::new(&mut conn).create(&request).await.expect("Failed to create test tool")
}
