use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{pagination::DEFAULT_LIMIT, stats::StatsResponse},
    db::{
        handlers::{Tools, Workflows},
        models::{tools::ToolFilter, workflows::WorkflowFilter},
    },
    errors::{Error, Result},
};

#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    summary = "Catalog counters",
    responses(
        (status = 200, description = "Number of tool and workflow edits", body = StatsResponse),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    // Counts ignore pagination
    let tools_count = Tools::new(&mut conn).count(&ToolFilter::new(0, DEFAULT_LIMIT)).await?;
    let workflows_count = Workflows::new(&mut conn).count(&WorkflowFilter::new(0, DEFAULT_LIMIT)).await?;

    Ok(Json(StatsResponse {
        tools_count,
        workflows_count,
    }))
}
