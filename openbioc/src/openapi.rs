//! OpenAPI documentation, served through Scalar at `/docs`.
//!
//! Authentication routes live at the root; the catalog API is nested under `/api/v1`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{api, catalog};

/// Name of the session cookie scheme referenced by `security(...)` on handlers.
pub const SESSION_COOKIE_SCHEME: &str = "SessionCookie";

/// Default cookie name shown in the docs; the served name comes from configuration.
const DOCUMENTED_COOKIE_NAME: &str = "obc_session";

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                SESSION_COOKIE_SCHEME.to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    DOCUMENTED_COOKIE_NAME,
                    "Session cookie set by `/authentication/login` and `/authentication/register`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::users::get_profile,
        api::handlers::users::update_profile,
        api::handlers::stats::get_stats,
        api::handlers::tools::list_tools,
        api::handlers::tools::create_tool,
        api::handlers::tools::get_tool,
        api::handlers::tools::get_tool_dependencies,
        api::handlers::workflows::list_workflows,
        api::handlers::workflows::create_workflow,
        api::handlers::workflows::get_workflow,
    ),
    components(
        schemas(
            api::models::users::ProfileResponse,
            api::models::users::ProfileUpdate,
            api::models::stats::StatsResponse,
            api::models::tools::ToolCreate,
            api::models::tools::ToolVariable,
            api::models::tools::ToolDetails,
            api::models::tools::ToolDependenciesResponse,
            api::models::tools::SearchResponse,
            api::models::tools::CreatedEdit,
            api::models::workflows::WorkflowCreate,
            api::models::workflows::WorkflowDetails,
            catalog::ToolKey,
            catalog::WorkflowKey,
            catalog::TreeNode,
            catalog::tree::TreeNodeKind,
            catalog::tree::TreeNodeData,
            catalog::tree::TreeNodeState,
        )
    ),
    tags(
        (name = "users", description = "Profile of the logged-in user"),
        (name = "stats", description = "Catalog counters"),
        (name = "tools", description = "Versioned tool edits. Every tool is addressed by `name/version/edit`; \
            creating a tool allocates the next edit of its `(name, version)` and never changes an existing one."),
        (name = "workflows", description = "Versioned workflow edits. The submitted graph document is stamped with \
            the allocated edit before it is stored."),
    )
)]
pub struct CatalogApiDoc;

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    nest(
        (path = "/api/v1", api = CatalogApiDoc)
    ),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::validate_email,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::check_password_reset,
        api::handlers::auth::confirm_password_reset,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::EmailValidationRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::auth::PasswordResetRequest,
            api::models::auth::PasswordResetCheckRequest,
            api::models::auth::PasswordResetCheckResponse,
            api::models::auth::PasswordResetConfirmRequest,
            api::models::users::UserResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, email validation, sessions and password resets"),
    ),
    info(
        title = "OpenBio Catalog API",
        version = "1.0.0",
        description = "Catalog of versioned bioinformatics tools and workflows.

## Authentication

Reading the catalog is public. Creating tools and workflows and managing your profile needs the
session cookie returned by `POST /authentication/login`.

## Errors

Errors carry a plain-text message, except conflicts which answer with `{\"message\": ...}`."
    )
)]
pub struct ApiDoc;
