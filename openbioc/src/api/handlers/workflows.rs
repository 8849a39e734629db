use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::{
        handlers::tools::check_fork_changes,
        models::{
            tools::{CreatedEdit, SearchResponse},
            users::CurrentUser,
            workflows::{ListWorkflowsQuery, WorkflowCreate, WorkflowDetails},
        },
    },
    catalog::{CatalogError, SearchEntry, TreeRenderer, WorkflowGraph, WorkflowKey},
    db::{
        handlers::{Repository, Tools, Workflows},
        models::workflows::{WorkflowCreateDBRequest, WorkflowFilter},
    },
    errors::{Error, Result},
    types::Edit,
};

#[utoipa::path(
    get,
    path = "/workflows",
    tag = "workflows",
    summary = "Search workflows",
    params(ListWorkflowsQuery),
    responses(
        (status = 200, description = "Matching workflows as a provenance tree", body = SearchResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_workflows(State(state): State<AppState>, Query(query): Query<ListWorkflowsQuery>) -> Result<Json<SearchResponse>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = WorkflowFilter::new(skip, limit);
    if let Some(name) = query.name.filter(|n| !n.is_empty()) {
        filter = filter.with_name(name);
    }
    if let Some(edit) = query.edit {
        filter = filter.with_edit(edit);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Workflows::new(&mut conn);
    let count = repo.count(&filter).await?;
    let workflows = repo.list(&filter).await?;

    let entries: Vec<SearchEntry<WorkflowKey>> = workflows
        .iter()
        .map(|workflow| SearchEntry {
            key: workflow.key(),
            forked_from: workflow.forked_from_key(),
        })
        .collect();

    Ok(Json(SearchResponse {
        count,
        tree: TreeRenderer::new(&state.config.tree).workflow_search_tree(&entries),
    }))
}

#[utoipa::path(
    post,
    path = "/workflows",
    tag = "workflows",
    summary = "Create a workflow edit",
    request_body = WorkflowCreate,
    responses(
        (status = 201, description = "Edit allocated and the graph stamped", body = CreatedEdit),
        (status = 400, description = "Invalid request or malformed graph"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown tool reference or fork source"),
        (status = 409, description = "Edit allocation kept racing"),
    ),
    security(("SessionCookie" = []))
)]
#[tracing::instrument(skip_all, fields(name = %request.name))]
pub async fn create_workflow(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<WorkflowCreate>,
) -> Result<(StatusCode, Json<CreatedEdit>)> {
    if request.name.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Field 'name' may not be empty".to_string(),
        });
    }
    if request.description.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Field 'description' may not be empty".to_string(),
        });
    }
    let changes = check_fork_changes(request.forked_from.is_some(), request.changes)?;

    let graph = WorkflowGraph::from_value(request.graph)?;
    if graph.is_empty() {
        return Err(Error::BadRequest {
            message: "The workflow graph has no nodes".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Workflows::new(&mut tx).with_allocation_attempts(state.config.catalog.edit_allocation_retries);

    let forked_from = match &request.forked_from {
        Some(key) => {
            let source = repo.get_by_key(key).await?.ok_or_else(|| CatalogError::NotFound {
                resource: "Workflow",
                key: key.to_string(),
            })?;
            Some(source.id)
        }
        None => None,
    };

    let workflow = repo
        .create(&WorkflowCreateDBRequest {
            name: request.name,
            website: request.website,
            description: request.description,
            forked_from,
            changes,
            graph,
            created_by: current_user.id,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(workflow = %workflow.key(), "Created workflow edit");
    Ok((
        StatusCode::CREATED,
        Json(CreatedEdit {
            edit: workflow.edit,
            created_at: workflow.created_at,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/workflows/{name}/{edit}",
    tag = "workflows",
    summary = "Get a workflow edit",
    params(
        ("name" = String, Path, description = "Workflow name"),
        ("edit" = i32, Path, description = "Edit number"),
    ),
    responses(
        (status = 200, description = "Workflow details with the stamped graph", body = WorkflowDetails),
        (status = 404, description = "Workflow not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_workflow(State(state): State<AppState>, Path((name, edit)): Path<(String, Edit)>) -> Result<Json<WorkflowDetails>> {
    let key = WorkflowKey::new(name, edit);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut workflows = Workflows::new(&mut conn);
    let workflow = workflows.get_by_key(&key).await?.ok_or_else(|| Error::NotFound {
        resource: "Workflow".to_string(),
        id: key.to_string(),
    })?;
    let tool_ids = workflows.tool_ids(workflow.id).await?;

    let mut tools: Vec<_> = Tools::new(&mut conn).get_bulk(tool_ids).await?.into_values().map(|t| t.key()).collect();
    tools.sort_by(|a, b| (&a.name, &a.version, a.edit).cmp(&(&b.name, &b.version, b.edit)));

    Ok(Json(WorkflowDetails::new(workflow, tools)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::ToolKey,
        test_utils::{auth_cookie, create_test_app, create_test_config, create_test_tool, create_test_user},
    };
    use serde_json::{Value, json};
    use sqlx::PgPool;

    fn graph(name: &str, tool: Option<&ToolKey>) -> Value {
        let mut nodes = vec![
            json!({"data": {"id": format!("{name}__null"), "type": "workflow", "name": name, "edit": null, "belongto": null}}),
            json!({"data": {"id": format!("main__{name}__null"), "type": "step", "name": "main",
                            "bash": "echo hi", "belongto": {"name": name, "edit": null}}}),
        ];
        if let Some(tool) = tool {
            nodes.push(json!({"data": {"id": format!("{}__{}__{}", tool.name, tool.version, tool.edit), "type": "tool",
                                       "name": tool.name, "version": tool.version, "edit": tool.edit, "belongto": null}}));
        }
        json!({
            "elements": {
                "nodes": nodes,
                "edges": [{"data": {"id": format!("{name}__null_null..main__{name}__null"),
                                    "source": format!("{name}__null"), "target": format!("main__{name}__null")}}]
            }
        })
    }

    fn body(name: &str, graph: Value) -> Value {
        json!({"name": name, "description": "variant calling", "graph": graph})
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_workflow(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, "pipeliner").await;
        let tool = create_test_tool(&pool, "gatk", "4.5", &[], user.id).await;
        let (name, value) = auth_cookie(&user, &config);
        let server = create_test_app(pool, config);

        let response = server
            .post("/api/v1/workflows")
            .add_header(name, value)
            .json(&body("calling", graph("calling", Some(&tool.key()))))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: CreatedEdit = response.json();
        assert_eq!(created.edit, 1);

        let details: WorkflowDetails = server.get("/api/v1/workflows/calling/1").await.json();
        assert_eq!(details.username, "pipeliner");
        assert_eq!(details.tools, vec![tool.key()]);

        let nodes = details.graph["elements"]["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["data"]["id"], "calling__1");
        assert_eq!(nodes[0]["data"]["edit"], 1);
        assert_eq!(nodes[1]["data"]["belongto"]["edit"], 1);
    }

    #[sqlx::test]
    async fn test_create_workflow_rejects_bad_graphs(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, "grapher").await;
        let (name, value) = auth_cookie(&user, &config);
        let server = create_test_app(pool, config);

        let empty = json!({"elements": {"nodes": [], "edges": []}});
        server
            .post("/api/v1/workflows")
            .add_header(name.clone(), value.clone())
            .json(&body("empty", empty))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/workflows")
            .add_header(name.clone(), value.clone())
            .json(&body("broken", json!({"nodes": "not a graph"})))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let missing = ToolKey::new("ghost", "1", 1);
        server
            .post("/api/v1/workflows")
            .add_header(name, value)
            .json(&body("ghosted", graph("ghosted", Some(&missing))))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_workflow_fork_and_search(pool: PgPool) {
        let config = create_test_config();
        let user = create_test_user(&pool, "forker").await;
        let (name, value) = auth_cookie(&user, &config);
        let server = create_test_app(pool, config);

        server
            .post("/api/v1/workflows")
            .add_header(name.clone(), value.clone())
            .json(&body("rnaseq", graph("rnaseq", None)))
            .await
            .assert_status(StatusCode::CREATED);

        let mut fork = body("rnaseq", graph("rnaseq", None));
        fork["forked_from"] = json!({"name": "rnaseq", "edit": 1});
        fork["changes"] = json!("star instead of hisat");
        let created: CreatedEdit = server
            .post("/api/v1/workflows")
            .add_header(name.clone(), value.clone())
            .json(&fork)
            .await
            .json();
        assert_eq!(created.edit, 2);

        // A fork without changes is refused
        fork["changes"] = json!("");
        server
            .post("/api/v1/workflows")
            .add_header(name, value)
            .json(&fork)
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let search: SearchResponse = server.get("/api/v1/workflows?name=RNA").await.json();
        assert_eq!(search.count, 2);
        assert_eq!(search.tree[0].parent, "#");
        assert_eq!(search.tree[1].parent, search.tree[0].id);

        let details: WorkflowDetails = server.get("/api/v1/workflows/rnaseq/2").await.json();
        assert_eq!(details.forked_from, Some(WorkflowKey::new("rnaseq", 1)));
        assert_eq!(details.changes.as_deref(), Some("star instead of hisat"));

        server.get("/api/v1/workflows/rnaseq/9").await.assert_status(StatusCode::NOT_FOUND);
    }
}
