//! # openbioc: a catalog of versioned bioinformatics tools and workflows
//!
//! `openbioc` is the backend of a community catalog where users publish tools (with installation
//! and validation commands, configuration variables and dependencies on other tools) and
//! workflows (graph documents that wire tools and steps together).
//!
//! ## Versioning
//!
//! Nothing in the catalog is edited in place. Every change is a new *edit*: tools are addressed
//! by `name/version/edit` and workflows by `name/edit`, where the edit is allocated as one more
//! than the largest existing edit of the same `(name, version)` or `name`. An edit may be a fork of
//! an earlier one, in which case it records what changed. Search results are rendered as a
//! provenance forest in which every fork hangs under the edit it came from.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum), persistence is PostgreSQL through
//! `sqlx`, and the pure catalog logic lives in [`catalog`]:
//!
//! - [`catalog::DependencyGraph::flatten`] walks a tool's transitive dependencies depth first and
//!   rejects cycles
//! - [`catalog::TreeRenderer`] turns flattened dependencies and search hits into parent/child node
//!   lists for a tree widget
//! - [`catalog::stamp_edit`] writes a newly allocated edit into a workflow graph document
//!
//! [`db`] holds the repositories; [`db::handlers::edits`] serializes edit allocation per scope
//! with advisory locks backed by unique constraints. [`api`] holds the handlers and the request and
//! response models; [`auth`] provides password hashing, JWT session cookies and the
//! [`CurrentUser`](api::models::users::CurrentUser) extractor.
//!
//! ## Routes
//!
//! - `/healthz`: liveness
//! - `/authentication/*`: registration, email validation, login, logout, password resets
//! - `/api/v1/*`: profile, stats, tools and workflows
//! - `/docs`: API reference

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod email;
pub mod errors;
pub mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test_utils;

use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
use openapi::ApiDoc;

pub use types::{ToolId, UserId, WorkflowId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
}

/// Get the catalog database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.auth.security.cors.allowed_origins;
    // A wildcard can't be mixed into an origin list
    let allow_origin = if allowed.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::with_capacity(allowed.len());
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send origins without the trailing slash Url adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.security.cors.allow_credentials);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router.
///
/// Authentication routes sit at the root, the catalog under `/api/v1`, and the API reference at
/// `/docs`. CORS and request tracing wrap everything.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::{auth, stats, tools, users, workflows};

    let auth_routes = Router::new()
        .route("/authentication/register", post(auth::register))
        .route("/authentication/email-validations", post(auth::validate_email))
        .route("/authentication/login", post(auth::login))
        .route("/authentication/logout", post(auth::logout))
        .route("/authentication/password-resets", post(auth::request_password_reset))
        .route("/authentication/password-resets/{user_id}/check", post(auth::check_password_reset))
        .route("/authentication/password-resets/{user_id}/confirm", post(auth::confirm_password_reset))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/users/current/profile", get(users::get_profile).patch(users::update_profile))
        .route("/stats", get(stats::get_stats))
        .route("/tools", get(tools::list_tools).post(tools::create_tool))
        .route("/tools/{name}/{version}/{edit}", get(tools::get_tool))
        .route("/tools/{name}/{version}/{edit}/dependencies", get(tools::get_tool_dependencies))
        .route("/workflows", get(workflows::list_workflows).post(workflows::create_workflow))
        .route("/workflows/{name}/{edit}", get(workflows::get_workflow))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The catalog server: a migrated connection pool and the router built on it.
///
/// 1. **Create**: [`Application::new`] connects to PostgreSQL and runs migrations
/// 2. **Serve**: [`Application::serve`] binds the configured address until the shutdown future
///    resolves, then closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting catalog with configuration: {:#?}", config);

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        migrator().run(&pool).await?;

        Self::new_with_pool(config, pool)
    }

    /// Build the application on an existing, already migrated pool.
    pub fn new_with_pool(config: Config, pool: PgPool) -> anyhow::Result<Self> {
        let state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(&state)?;
        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Catalog listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
