use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Catalog counters shown on the landing page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub tools_count: i64,
    pub workflows_count: i64,
}
