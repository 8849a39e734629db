use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        tools::{CreatedEdit, ListToolsQuery, SearchResponse, ToolCreate, ToolDependenciesResponse, ToolDetails, ToolVariable},
        users::CurrentUser,
    },
    catalog::{CatalogError, DependencyGraph, DependencyPair, NodeId, SearchEntry, ToolKey, TreeConfig, TreeRenderer, Variable},
    db::{
        handlers::{Repository, Tools},
        models::tools::{ToolCreateDBRequest, ToolFilter, VariableCreateDBRequest},
    },
    errors::{Error, Result},
    types::Edit,
};

/// Both renderings of a set of flattened pairs.
fn render_trees(config: &TreeConfig, graph: &DependencyGraph, pairs: &[DependencyPair]) -> ToolDependenciesResponse {
    let renderer = TreeRenderer::new(config);
    ToolDependenciesResponse {
        dependencies_tree: renderer.dependency_tree(graph, pairs, false),
        variables_tree: renderer.dependency_tree(graph, pairs, true),
    }
}

/// Each direct dependency of `root` flattened as its own root, concatenated in order.
fn direct_dependency_pairs(graph: &DependencyGraph, root: NodeId) -> Result<Vec<DependencyPair>> {
    let mut pairs = Vec::new();
    for &dependency in graph.dependencies(root) {
        pairs.extend(graph.flatten(dependency, true)?);
    }
    Ok(pairs)
}

/// Drop repeated dependency keys, keeping the first occurrence and its position.
fn dedupe_keys(keys: Vec<ToolKey>) -> Vec<ToolKey> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::BadRequest {
            message: format!("Field '{field}' may not be empty"),
        });
    }
    Ok(())
}

/// A fork must say what changed, and only forks carry changes.
pub(crate) fn check_fork_changes(is_fork: bool, changes: Option<String>) -> Result<Option<String>> {
    let changes = changes.filter(|c| !c.trim().is_empty());
    match (is_fork, changes.is_some()) {
        (true, false) => Err(Error::BadRequest {
            message: "Describe the changes made to the forked edit".to_string(),
        }),
        (false, true) => Err(Error::BadRequest {
            message: "Changes can only be given when forking an existing edit".to_string(),
        }),
        _ => Ok(changes),
    }
}

#[utoipa::path(
    get,
    path = "/tools",
    tag = "tools",
    summary = "Search tools",
    params(ListToolsQuery),
    responses(
        (status = 200, description = "Matching tools as a provenance tree", body = SearchResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_tools(State(state): State<AppState>, Query(query): Query<ListToolsQuery>) -> Result<Json<SearchResponse>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = ToolFilter::new(skip, limit);
    if let Some(name) = query.name.filter(|n| !n.is_empty()) {
        filter = filter.with_name(name);
    }
    if let Some(version) = query.version.filter(|v| !v.is_empty()) {
        filter = filter.with_version(version);
    }
    if let Some(edit) = query.edit {
        filter = filter.with_edit(edit);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tools::new(&mut conn);
    let count = repo.count(&filter).await?;
    let tools = repo.list(&filter).await?;

    let entries: Vec<SearchEntry<ToolKey>> = tools
        .iter()
        .map(|tool| SearchEntry {
            key: tool.key(),
            forked_from: tool.forked_from_key(),
        })
        .collect();

    Ok(Json(SearchResponse {
        count,
        tree: TreeRenderer::new(&state.config.tree).tool_search_tree(&entries),
    }))
}

#[utoipa::path(
    post,
    path = "/tools",
    tag = "tools",
    summary = "Create a tool edit",
    request_body = ToolCreate,
    responses(
        (status = 201, description = "Edit allocated and stored", body = CreatedEdit),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown dependency or fork source"),
        (status = 409, description = "Duplicate variable name, or edit allocation kept racing"),
    ),
    security(("SessionCookie" = []))
)]
#[tracing::instrument(skip_all, fields(name = %request.name, version = %request.version))]
pub async fn create_tool(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ToolCreate>,
) -> Result<(StatusCode, Json<CreatedEdit>)> {
    require_non_empty("name", &request.name)?;
    require_non_empty("version", &request.version)?;
    require_non_empty("website", &request.website)?;
    require_non_empty("description", &request.description)?;
    let changes = check_fork_changes(request.forked_from.is_some(), request.changes)?;

    let dependencies = dedupe_keys(request.dependencies);
    let variables: Vec<VariableCreateDBRequest> = request
        .variables
        .into_iter()
        .filter(ToolVariable::is_complete)
        .map(Into::into)
        .collect();

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tools::new(&mut tx).with_allocation_attempts(state.config.catalog.edit_allocation_retries);

    let forked_from = match &request.forked_from {
        Some(key) => {
            let source = repo.get_by_key(key).await?.ok_or_else(|| CatalogError::NotFound {
                resource: "Tool",
                key: key.to_string(),
            })?;
            Some(source.id)
        }
        None => None,
    };
    let dependencies = repo.resolve_keys(&dependencies).await?;

    let tool = repo
        .create(&ToolCreateDBRequest {
            name: request.name,
            version: request.version,
            website: request.website,
            description: request.description,
            installation_commands: request.installation_commands,
            validation_commands: request.validation_commands,
            forked_from,
            changes,
            dependencies,
            variables,
            created_by: current_user.id,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(tool = %tool.key(), "Created tool edit");
    Ok((
        StatusCode::CREATED,
        Json(CreatedEdit {
            edit: tool.edit,
            created_at: tool.created_at,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/tools/{name}/{version}/{edit}",
    tag = "tools",
    summary = "Get a tool edit",
    params(
        ("name" = String, Path, description = "Tool name"),
        ("version" = String, Path, description = "Tool version"),
        ("edit" = i32, Path, description = "Edit number"),
    ),
    responses(
        (status = 200, description = "Tool details with the trees of its direct dependencies", body = ToolDetails),
        (status = 404, description = "Tool not found"),
        (status = 422, description = "Stored dependencies form a cycle"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_tool(State(state): State<AppState>, Path((name, version, edit)): Path<(String, String, Edit)>) -> Result<Json<ToolDetails>> {
    let key = ToolKey::new(name, version, edit);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tools::new(&mut conn);
    let tool = repo.get_by_key(&key).await?.ok_or_else(|| Error::NotFound {
        resource: "Tool".to_string(),
        id: key.to_string(),
    })?;

    let variables = repo
        .variables(tool.id)
        .await?
        .into_iter()
        .map(|v| ToolVariable::from(Variable::from(v)))
        .collect();
    let (graph, root) = repo.load_dependency_graph(tool.id).await?;
    let pairs = direct_dependency_pairs(&graph, root)?;
    let trees = render_trees(&state.config.tree, &graph, &pairs);

    Ok(Json(ToolDetails::new(tool, variables, trees)))
}

#[utoipa::path(
    get,
    path = "/tools/{name}/{version}/{edit}/dependencies",
    tag = "tools",
    summary = "Get a tool's dependency tree",
    params(
        ("name" = String, Path, description = "Tool name"),
        ("version" = String, Path, description = "Tool version"),
        ("edit" = i32, Path, description = "Edit number"),
    ),
    responses(
        (status = 200, description = "Dependency trees rooted at the tool itself", body = ToolDependenciesResponse),
        (status = 404, description = "Tool not found"),
        (status = 422, description = "Stored dependencies form a cycle"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_tool_dependencies(
    State(state): State<AppState>,
    Path((name, version, edit)): Path<(String, String, Edit)>,
) -> Result<Json<ToolDependenciesResponse>> {
    let key = ToolKey::new(name, version, edit);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tools::new(&mut conn);
    let tool = repo.get_by_key(&key).await?.ok_or_else(|| Error::NotFound {
        resource: "Tool".to_string(),
        id: key.to_string(),
    })?;

    let (graph, root) = repo.load_dependency_graph(tool.id).await?;
    let pairs = graph.flatten(root, true)?;

    Ok(Json(render_trees(&state.config.tree, &graph, &pairs)))
}
