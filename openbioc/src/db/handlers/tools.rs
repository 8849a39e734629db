//! Database repository for tool edits.
//!
//! Tool edits are append-only. Creating one allocates the next edit in its `(name, version)`
//! scope and writes the tool row, its ordered dependency edges and its variables in one
//! transaction.

use std::collections::HashMap;

use sqlx::{Connection, PgConnection, query_builder::QueryBuilder};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    catalog::{CatalogError, DependencyGraph, EditScope, NodeId, ToolKey, Variable},
    db::{
        errors::{DbError, Result},
        handlers::{
            contains_pattern,
            edits::{DEFAULT_ALLOCATION_ATTEMPTS, TOOL_EDIT_CONSTRAINT, allocate_edit},
            repository::Repository,
        },
        models::tools::{ToolCreateDBRequest, ToolDBResponse, ToolFilter, ToolVariableDBResponse},
    },
    types::{ToolId, abbrev_uuid},
};

const VARIABLE_NAME_CONSTRAINT: &str = "tool_variables_tool_name_unique";

const TOOL_SELECT: &str = r#"
    SELECT t.id, t.name, t.version, t.edit, t.website, t.description,
           t.installation_commands, t.validation_commands,
           t.forked_from_id, f.name AS forked_from_name, f.version AS forked_from_version, f.edit AS forked_from_edit,
           t.changes, t.created_by, u.username, t.created_at
    FROM tools t
    JOIN users u ON u.id = t.created_by
    LEFT JOIN tools f ON f.id = t.forked_from_id
"#;

pub struct Tools<'c> {
    db: &'c mut PgConnection,
    allocation_attempts: u32,
}

#[async_trait::async_trait]
impl<'c> Repository for Tools<'c> {
    type CreateRequest = ToolCreateDBRequest;
    type Response = ToolDBResponse;
    type Id = ToolId;
    type Filter = ToolFilter;

    /// Insert a new edit of `(name, version)` and return it.
    ///
    /// An insert that loses the edit race is retried inside a fresh savepoint until the allocation
    /// attempts run out, after which the violation is reported as a duplicate.
    #[instrument(skip(self, request), fields(name = %request.name, version = %request.version), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        check_variable_names(request)?;

        let mut attempt = 1;
        loop {
            let mut tx = self.db.begin().await?;
            match insert_tool(&mut tx, request).await {
                Ok(id) => {
                    let tool = Tools::new(&mut tx).get_by_id(id).await?.ok_or(DbError::NotFound)?;
                    tx.commit().await?;
                    return Ok(tool);
                }
                Err(e) if e.is_unique_violation_of(TOOL_EDIT_CONSTRAINT) => {
                    tx.rollback().await?;
                    if attempt >= self.allocation_attempts {
                        return Err(CatalogError::DuplicateName {
                            kind: "tool edit",
                            name: format!("{}/{}", request.name, request.version),
                        }
                        .into());
                    }
                    warn!(attempt, "Tool edit allocation raced with another writer, retrying");
                    attempt += 1;
                }
                Err(e) if e.is_unique_violation_of(VARIABLE_NAME_CONSTRAINT) => {
                    return Err(CatalogError::DuplicateName {
                        kind: "variable",
                        name: request.name.clone(),
                    }
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self), fields(tool_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let tool = sqlx::query_as::<_, ToolDBResponse>(&format!("{TOOL_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(tool)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let tools = sqlx::query_as::<_, ToolDBResponse>(&format!("{TOOL_SELECT} WHERE t.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(tools.into_iter().map(|t| (t.id, t)).collect())
    }

    /// Search tools, oldest first so forks follow the edit they came from.
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::new(TOOL_SELECT);
        query.push(" WHERE 1=1");
        push_filter(&mut query, filter);

        query.push(" ORDER BY t.created_at ASC, t.name, t.version, t.edit LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let tools = query.build_query_as::<ToolDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(tools)
    }
}

impl<'c> Tools<'c> {
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

    /// Count tools matching the filter, ignoring pagination
    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ToolFilter) -> Result<i64> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM tools t WHERE 1=1");
        push_filter(&mut query, filter);

        let count: (i64,) = query.build_query_as().fetch_one(&mut *self.db).await?;
        Ok(count.0)
    }

    #[instrument(skip(self), fields(tool = %key), err)]
    pub async fn get_by_key(&mut self, key: &ToolKey) -> Result<Option<ToolDBResponse>> {
        let tool = sqlx::query_as::<_, ToolDBResponse>(&format!(
            "{TOOL_SELECT} WHERE t.name = $1 AND t.version = $2 AND t.edit = $3"
        ))
        .bind(&key.name)
        .bind(&key.version)
        .bind(key.edit)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(tool)
    }

    /// Resolve tool keys to ids, failing with `NotFound` on the first key with no matching edit.
    #[instrument(skip(self, keys), fields(count = keys.len()), err)]
    pub async fn resolve_keys(&mut self, keys: &[ToolKey]) -> Result<Vec<ToolId>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
        let versions: Vec<&str> = keys.iter().map(|k| k.version.as_str()).collect();
        let edits: Vec<i32> = keys.iter().map(|k| k.edit).collect();

        let rows: Vec<(Uuid, String, String, i32)> = sqlx::query_as(
            r#"
            SELECT t.id, t.name, t.version, t.edit
            FROM tools t
            JOIN UNNEST($1::text[], $2::text[], $3::int4[]) AS k(name, version, edit)
              ON t.name = k.name AND t.version = k.version AND t.edit = k.edit
            "#,
        )
        .bind(&names)
        .bind(&versions)
        .bind(&edits)
        .fetch_all(&mut *self.db)
        .await?;

        let found: HashMap<ToolKey, ToolId> = rows
            .into_iter()
            .map(|(id, name, version, edit)| (ToolKey::new(name, version, edit), id))
            .collect();

        keys.iter()
            .map(|key| {
                found.get(key).copied().ok_or_else(|| {
                    DbError::Catalog(CatalogError::NotFound {
                        resource: "Tool",
                        key: key.to_string(),
                    })
                })
            })
            .collect()
    }

    /// Variables of one tool edit, in insertion order
    #[instrument(skip(self), fields(tool_id = %abbrev_uuid(&tool_id)), err)]
    pub async fn variables(&mut self, tool_id: ToolId) -> Result<Vec<ToolVariableDBResponse>> {
        let variables = sqlx::query_as::<_, ToolVariableDBResponse>(
            "SELECT id, tool_id, name, value, description, position FROM tool_variables WHERE tool_id = $1 ORDER BY position",
        )
        .bind(tool_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(variables)
    }

    /// Direct dependencies of one tool edit, in insertion order
    #[instrument(skip(self), fields(tool_id = %abbrev_uuid(&tool_id)), err)]
    pub async fn direct_dependencies(&mut self, tool_id: ToolId) -> Result<Vec<ToolId>> {
        let ids = sqlx::query_scalar("SELECT dependency_id FROM tool_dependencies WHERE tool_id = $1 ORDER BY position")
            .bind(tool_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(ids)
    }

    /// Load every tool reachable from `root` into a [`DependencyGraph`].
    ///
    /// The recursive query stops at tools it has already seen, so a cycle in stored data ends the
    /// load; it is reported later when the graph is flattened.
    #[instrument(skip(self), fields(tool_id = %abbrev_uuid(&root)), err)]
    pub async fn load_dependency_graph(&mut self, root: ToolId) -> Result<(DependencyGraph, NodeId)> {
        let tools: Vec<(Uuid, String, String, i32)> = sqlx::query_as(
            r#"
            WITH RECURSIVE reachable(id) AS (
                SELECT $1::uuid
                UNION
                SELECT d.dependency_id FROM tool_dependencies d JOIN reachable r ON d.tool_id = r.id
            )
            SELECT t.id, t.name, t.version, t.edit FROM tools t JOIN reachable r ON r.id = t.id
            "#,
        )
        .bind(root)
        .fetch_all(&mut *self.db)
        .await?;

        if !tools.iter().any(|(id, ..)| *id == root) {
            return Err(DbError::NotFound);
        }
        let ids: Vec<Uuid> = tools.iter().map(|(id, ..)| *id).collect();

        let variables = sqlx::query_as::<_, ToolVariableDBResponse>(
            "SELECT id, tool_id, name, value, description, position FROM tool_variables
             WHERE tool_id = ANY($1) ORDER BY tool_id, position",
        )
        .bind(&ids)
        .fetch_all(&mut *self.db)
        .await?;

        let edges: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT tool_id, dependency_id FROM tool_dependencies WHERE tool_id = ANY($1) ORDER BY tool_id, position",
        )
        .bind(&ids)
        .fetch_all(&mut *self.db)
        .await?;

        let mut variables_by_tool: HashMap<Uuid, Vec<Variable>> = HashMap::new();
        for variable in variables {
            variables_by_tool.entry(variable.tool_id).or_default().push(variable.into());
        }

        let mut graph = DependencyGraph::new();
        let mut nodes: HashMap<Uuid, NodeId> = HashMap::with_capacity(tools.len());
        for (id, name, version, edit) in tools {
            let node = graph.insert(ToolKey::new(name, version, edit), variables_by_tool.remove(&id).unwrap_or_default());
            nodes.insert(id, node);
        }
        for (tool_id, dependency_id) in edges {
            if let (Some(&from), Some(&to)) = (nodes.get(&tool_id), nodes.get(&dependency_id)) {
                graph.add_dependency(from, to);
            }
        }

        let root = nodes.get(&root).copied().ok_or(DbError::NotFound)?;
        Ok((graph, root))
    }
}

fn push_filter(query: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &ToolFilter) {
    if let Some(ref name) = filter.name {
        query.push(" AND LOWER(t.name) LIKE ");
        query.push_bind(contains_pattern(name));
        query.push(r" ESCAPE '\'");
    }
    if let Some(ref version) = filter.version {
        query.push(" AND LOWER(t.version) LIKE ");
        query.push_bind(contains_pattern(version));
        query.push(r" ESCAPE '\'");
    }
    if let Some(edit) = filter.edit {
        query.push(" AND t.edit = ");
        query.push_bind(edit);
    }
}

fn check_variable_names(request: &ToolCreateDBRequest) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for variable in &request.variables {
        if !seen.insert(variable.name.as_str()) {
            return Err(CatalogError::DuplicateName {
                kind: "variable",
                name: variable.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// One insert attempt. Must run inside a transaction that is rolled back on error.
async fn insert_tool(conn: &mut PgConnection, request: &ToolCreateDBRequest) -> Result<ToolId> {
    let edit = allocate_edit(
        conn,
        EditScope::Tool {
            name: &request.name,
            version: &request.version,
        },
    )
    .await?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO tools (id, name, version, edit, website, description, installation_commands,
                           validation_commands, forked_from_id, changes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(id)
    .bind(&request.name)
    .bind(&request.version)
    .bind(edit)
    .bind(&request.website)
    .bind(&request.description)
    .bind(&request.installation_commands)
    .bind(&request.validation_commands)
    .bind(request.forked_from)
    .bind(&request.changes)
    .bind(request.created_by)
    .execute(&mut *conn)
    .await?;

    for (position, dependency) in request.dependencies.iter().enumerate() {
        sqlx::query("INSERT INTO tool_dependencies (tool_id, dependency_id, position) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(dependency)
            .bind(position as i32)
            .execute(&mut *conn)
            .await?;
    }

    for (position, variable) in request.variables.iter().enumerate() {
        sqlx::query(
            "INSERT INTO tool_variables (id, tool_id, name, value, description, position) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(&variable.name)
        .bind(&variable.value)
        .bind(&variable.description)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::DependencyPair,
        db::models::tools::VariableCreateDBRequest,
        test_utils::{create_test_user, tool_request},
    };
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_edits_are_numbered_per_name_and_version(pool: PgPool) {
        let user = create_test_user(&pool, "numbering").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let first = repo.create(&tool_request("bwa", "0.7", user.id)).await.unwrap();
        let second = repo.create(&tool_request("bwa", "0.7", user.id)).await.unwrap();
        let other = repo.create(&tool_request("bwa", "0.8", user.id)).await.unwrap();

        assert_eq!(first.edit, 1);
        assert_eq!(second.edit, 2);
        assert_eq!(other.edit, 1);
        assert_eq!(first.username, "numbering");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_creates_get_distinct_edits(pool: PgPool) {
        let user = create_test_user(&pool, "racer").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let request = tool_request("samtools", "1.9", user.id);
            handles.push(tokio::spawn(async move {
                let mut conn = pool.acquire().await.unwrap();
                Tools::new(&mut conn).create(&request).await.unwrap().edit
            }));
        }

        let mut edits = Vec::new();
        for handle in handles {
            edits.push(handle.await.unwrap());
        }
        edits.sort();
        assert_eq!(edits, (1..=8).collect::<Vec<_>>());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_fork_is_joined_with_source_key(pool: PgPool) {
        let user = create_test_user(&pool, "forker").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let source = repo.create(&tool_request("bwa", "0.7", user.id)).await.unwrap();
        let mut fork = tool_request("bwa", "0.7", user.id);
        fork.forked_from = Some(source.id);
        fork.changes = Some("Pin libz".to_string());
        let fork = repo.create(&fork).await.unwrap();

        assert_eq!(fork.forked_from_key(), Some(ToolKey::new("bwa", "0.7", 1)));
        assert_eq!(fork.changes.as_deref(), Some("Pin libz"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_fork_without_changes_violates_check(pool: PgPool) {
        let user = create_test_user(&pool, "nochanges").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let source = repo.create(&tool_request("bwa", "0.7", user.id)).await.unwrap();
        let mut fork = tool_request("bwa", "0.7", user.id);
        fork.forked_from = Some(source.id);

        assert!(matches!(repo.create(&fork).await, Err(DbError::CheckViolation { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_variable_names_rejected(pool: PgPool) {
        let user = create_test_user(&pool, "vars").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let mut request = tool_request("bwa", "0.7", user.id);
        let variable = VariableCreateDBRequest {
            name: "threads".to_string(),
            value: "4".to_string(),
            description: "worker threads".to_string(),
        };
        request.variables = vec![variable.clone(), variable];

        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::Catalog(CatalogError::DuplicateName { kind: "variable", .. })));
        assert_eq!(repo.count(&ToolFilter::new(0, 10)).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_search_filters(pool: PgPool) {
        let user = create_test_user(&pool, "searcher").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        repo.create(&tool_request("BWA", "0.7", user.id)).await.unwrap();
        repo.create(&tool_request("bwa-mem2", "2.2", user.id)).await.unwrap();
        repo.create(&tool_request("samtools", "1.9", user.id)).await.unwrap();

        let filter = ToolFilter::new(0, 10).with_name("bwa");
        assert_eq!(repo.count(&filter).await.unwrap(), 2);
        assert_eq!(repo.list(&filter).await.unwrap().len(), 2);

        let filter = ToolFilter::new(0, 10).with_name("bwa").with_version("2.");
        let tools = repo.list(&filter).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "bwa-mem2");

        assert_eq!(repo.count(&ToolFilter::new(0, 10).with_edit(2)).await.unwrap(), 0);
        assert_eq!(repo.list(&ToolFilter::new(1, 1)).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_search_filters_match_wildcards_literally(pool: PgPool) {
        let user = create_test_user(&pool, "literal").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        repo.create(&tool_request("bwa_mem", "0.7", user.id)).await.unwrap();
        repo.create(&tool_request("bwaXmem", "0.7", user.id)).await.unwrap();
        repo.create(&tool_request("picard", "100%", user.id)).await.unwrap();

        let tools = repo.list(&ToolFilter::new(0, 10).with_name("BWA_MEM")).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "bwa_mem");

        assert_eq!(repo.count(&ToolFilter::new(0, 10).with_name("%")).await.unwrap(), 0);
        assert_eq!(repo.count(&ToolFilter::new(0, 10).with_version("0%")).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_resolve_keys(pool: PgPool) {
        let user = create_test_user(&pool, "resolver").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let bwa = repo.create(&tool_request("bwa", "0.7", user.id)).await.unwrap();
        let samtools = repo.create(&tool_request("samtools", "1.9", user.id)).await.unwrap();

        let ids = repo.resolve_keys(&[samtools.key(), bwa.key()]).await.unwrap();
        assert_eq!(ids, vec![samtools.id, bwa.id]);

        let err = repo.resolve_keys(&[ToolKey::new("bwa", "0.7", 9)]).await.unwrap_err();
        assert!(matches!(err, DbError::Catalog(CatalogError::NotFound { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dependency_graph_keeps_insertion_order(pool: PgPool) {
        let user = create_test_user(&pool, "grapher").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let zlib = repo.create(&tool_request("zlib", "1.3", user.id)).await.unwrap();
        let bzip2 = repo.create(&tool_request("bzip2", "1.0", user.id)).await.unwrap();
        let mut htslib = tool_request("htslib", "1.9", user.id);
        htslib.dependencies = vec![zlib.id, bzip2.id];
        htslib.variables = vec![VariableCreateDBRequest {
            name: "HTSLIB_HOME".to_string(),
            value: "/opt/htslib".to_string(),
            description: "install prefix".to_string(),
        }];
        let htslib = repo.create(&htslib).await.unwrap();
        let mut samtools = tool_request("samtools", "1.9", user.id);
        // zlib listed after htslib on purpose
        samtools.dependencies = vec![htslib.id, zlib.id];
        let samtools = repo.create(&samtools).await.unwrap();

        let (graph, root) = repo.load_dependency_graph(samtools.id).await.unwrap();
        assert_eq!(graph.len(), 4);

        let pairs = graph.flatten(root, false).unwrap();
        let names: Vec<&str> = pairs.iter().map(|p: &DependencyPair| graph.node(p.dependency).key.name.as_str()).collect();
        assert_eq!(names, vec!["htslib", "zlib", "bzip2", "zlib"]);

        let htslib_node = graph.find(&htslib.key()).unwrap();
        assert_eq!(graph.node(htslib_node).variables[0].name, "HTSLIB_HOME");
        assert_eq!(repo.direct_dependencies(htslib.id).await.unwrap(), vec![zlib.id, bzip2.id]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_stored_cycle_is_reported_on_flatten(pool: PgPool) {
        let user = create_test_user(&pool, "cycler").await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);

        let a = repo.create(&tool_request("a", "1", user.id)).await.unwrap();
        let mut b = tool_request("b", "1", user.id);
        b.dependencies = vec![a.id];
        let b = repo.create(&b).await.unwrap();

        // edits are immutable through the API, so the cycle has to be written by hand
        sqlx::query("INSERT INTO tool_dependencies (tool_id, dependency_id, position) VALUES ($1, $2, 0)")
            .bind(a.id)
            .bind(b.id)
            .execute(&pool)
            .await
            .unwrap();

        let (graph, root) = repo.load_dependency_graph(b.id).await.unwrap();
        assert!(matches!(graph.flatten(root, true), Err(CatalogError::CyclicDependency { .. })));
    }

    #[sqlx::test]
    async fn test_load_graph_for_missing_tool(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Tools::new(&mut conn);
        assert!(matches!(repo.load_dependency_graph(Uuid::new_v4()).await, Err(DbError::NotFound)));
    }
}
