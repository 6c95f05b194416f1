//! Product search and name suggestions.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use emporium_core::{Page, PageRequest};

use crate::error::Result;
use crate::models::ProductView;
use crate::services::search::{SearchQuery, SearchService};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(search))
        .route("/suggest", get(suggest))
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    #[serde(default)]
    pub q: String,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<ProductView>>> {
    Ok(Json(SearchService::new(&state).search(query, page).await?))
}

async fn suggest(
    State(state): State<AppState>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(SearchService::new(&state).suggest(&query.q).await?))
}
