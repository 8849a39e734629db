//! Database repository for workflow edits.
//!
//! Creating a workflow allocates the next edit for its name, stamps that edit into the submitted
//! graph document, stores the stamped document and links every tool edit the document uses.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::{Connection, PgConnection, query_builder::QueryBuilder, types::Json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    catalog::{CatalogError, EditScope, WorkflowKey, stamp_edit},
    db::{
        errors::{DbError, Result},
        handlers::{
            contains_pattern,
            edits::{DEFAULT_ALLOCATION_ATTEMPTS, WORKFLOW_EDIT_CONSTRAINT, allocate_edit},
            repository::Repository,
            tools::Tools,
        },
        models::workflows::{WorkflowCreateDBRequest, WorkflowDBResponse, WorkflowFilter},
    },
    types::{ToolId, WorkflowId, abbrev_uuid},
};

const WORKFLOW_SELECT: &str = r#"
    SELECT w.id, w.name, w.edit, w.website, w.description, w.graph,
           w.forked_from_id, f.name AS forked_from_name, f.edit AS forked_from_edit,
           w.changes, w.created_by, u.username, w.created_at
    FROM workflows w
    JOIN users u ON u.id = w.created_by
    LEFT JOIN workflows f ON f.id = w.forked_from_id
"#;

pub struct Workflows<'c> {
    db: &'c mut PgConnection,
    allocation_attempts: u32,
}

#[async_trait::async_trait]
impl<'c> Repository for Workflows<'c> {
    type CreateRequest = WorkflowCreateDBRequest;
    type Response = WorkflowDBResponse;
    type Id = WorkflowId;
    type Filter = WorkflowFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut attempt = 1;
        loop {
            let mut tx = self.db.begin().await?;
            match insert_workflow(&mut tx, request).await {
                Ok(id) => {
                    let workflow = Workflows::new(&mut tx).get_by_id(id).await?.ok_or(DbError::NotFound)?;
                    tx.commit().await?;
                    return Ok(workflow);
                }
                Err(e) if e.is_unique_violation_of(WORKFLOW_EDIT_CONSTRAINT) => {
                    tx.rollback().await?;
                    if attempt >= self.allocation_attempts {
                        return Err(CatalogError::DuplicateName {
                            kind: "workflow edit",
                            name: request.name.clone(),
                        }
                        .into());
                    }
                    warn!(attempt, "Workflow edit allocation raced with another writer, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self), fields(workflow_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let workflow = sqlx::query_as::<_, WorkflowDBResponse>(&format!("{WORKFLOW_SELECT} WHERE w.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(workflow)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let workflows = sqlx::query_as::<_, WorkflowDBResponse>(&format!("{WORKFLOW_SELECT} WHERE w.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(workflows.into_iter().map(|w| (w.id, w)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(WORKFLOW_SELECT);
        query.push(" WHERE 1=1");
        push_filter(&mut query, filter);

        query.push(" ORDER BY w.created_at ASC, w.name, w.edit LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let workflows = query.build_query_as::<WorkflowDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(workflows)
    }
}

impl<'c> Workflows<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self {
            db,
            allocation_attempts: DEFAULT_ALLOCATION_ATTEMPTS,
        }
    }

    /// Override how many times an edit allocation is attempted before giving up.
    pub fn with_allocation_attempts(mut self, attempts: u32) -> Self {
        self.allocation_attempts = attempts.max(1);
        self
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &WorkflowFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM workflows w WHERE 1=1");
        push_filter(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    #[instrument(skip(self), fields(workflow = %key), err)]
    pub async fn get_by_key(&mut self, key: &WorkflowKey) -> Result<Option<WorkflowDBResponse>> {
        let workflow = sqlx::query_as::<_, WorkflowDBResponse>(&format!("{WORKFLOW_SELECT} WHERE w.name = $1 AND w.edit = $2"))
            .bind(&key.name)
            .bind(key.edit)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(workflow)
    }

    /// Ids of the tool edits a workflow edit uses
    #[instrument(skip(self), fields(workflow_id = %abbrev_uuid(&id)), err)]
    pub async fn tool_ids(&mut self, id: WorkflowId) -> Result<Vec<ToolId>> {
        let ids = sqlx::query_scalar("SELECT tool_id FROM workflow_tools WHERE workflow_id = $1")
            .bind(id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }
}

fn push_filter(query: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &WorkflowFilter) {
    if let Some(ref name) = filter.name {
        query.push(" AND LOWER(w.name) LIKE ");
        query.push_bind(contains_pattern(name));
        query.push(r" ESCAPE '\'");
    }
    if let Some(edit) = filter.edit {
        query.push(" AND w.edit = ");
        query.push_bind(edit);
    }
}

/// One insert attempt. Must run inside a transaction that is rolled back on error.
async fn insert_workflow(conn: &mut PgConnection, request: &WorkflowCreateDBRequest) -> Result<WorkflowId> {
    let edit = allocate_edit(conn, EditScope::Workflow { name: &request.name }).await?;

    let mut graph = request.graph.clone();
    stamp_edit(&mut graph, edit)?;
    let tool_keys = graph.tool_references()?;
    let tool_ids = Tools::new(&mut *conn).resolve_keys(&tool_keys).await?;
    debug!(edit, tools = tool_ids.len(), "Stamped workflow graph");

    let document: Value = serde_json::to_value(&graph).map_err(|e| DbError::Other(e.into()))?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO workflows (id, name, edit, website, description, graph, forked_from_id, changes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(&request.name)
    .bind(edit)
    .bind(&request.website)
    .bind(&request.description)
    .bind(Json(document))
    .bind(request.forked_from)
    .bind(&request.changes)
    .bind(request.created_by)
    .execute(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO workflow_tools (workflow_id, tool_id) SELECT $1, UNNEST($2::uuid[])")
        .bind(id)
        .bind(&tool_ids)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}
