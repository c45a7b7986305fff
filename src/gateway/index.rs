use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::http::server::AppState;

/// `GET /`: the callable method names.
pub async fn list_methods(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.table.list().into_iter().map(str::to_string).collect())
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
