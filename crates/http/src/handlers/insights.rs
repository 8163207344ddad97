//! GET /api/v1/insights — filtered, paginated listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use threadsight_storage::{InsightFilter, InsightStore};

use crate::AppState;
use crate::api_error::ApiError;
use crate::api_types::{InsightsListResponse, InsightsQuery};

pub async fn list_insights(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<InsightsListResponse>, ApiError> {
    let limit = query.limit.clamp(1, 500);
    let offset = query.offset.max(0);
    let filter = InsightFilter {
        conversation_id: query.conversation_id,
        date_from: query.date_from,
        date_to: query.date_to,
        sentiment: query.sentiment,
        topic: query.topic,
    };
    let page = state.store.list_insights(&filter, limit, offset).await?;
    Ok(Json(InsightsListResponse { items: page.items, total: page.total, limit, offset }))
}
