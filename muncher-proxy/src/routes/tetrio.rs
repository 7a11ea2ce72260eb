//! TETR.IO-facing routes.
//!
//! Every route charges the caller's admission budget first. Routes that need
//! the upstream submit exactly one call to the dispatch queue at the caller's
//! priority and wait for it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::caller::Caller;
use crate::error::ProxyError;
use crate::metrics::RequestTimer;
use crate::state::AppState;

/// Download a replay by ID and analyze it
///
/// GET /replay/:id
pub async fn replay_by_id(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    info!(replay = %id, identity = %caller.identity, priority = %caller.priority, "Handling GET /replay");
    let timer = RequestTimer::new("replay_by_id");

    let result = async {
        state.admit(&caller).await?;
        let token = state.bearer_token().await?;

        let client = state.client.clone();
        let replay = state
            .dispatch("replay", caller.priority, move || async move {
                client.download_replay(&id, &token).await
            })
            .await?;

        state
            .analyzer
            .analyze(&replay)
            .map_err(|e| ProxyError::Analysis(e.0))
    }
    .await;

    respond(timer, result)
}

/// Analyze a replay uploaded by the caller; never touches the upstream
///
/// POST /replay
pub async fn replay_upload(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: String,
) -> Result<Json<Value>, ProxyError> {
    debug!(identity = %caller.identity, bytes = body.len(), "Handling POST /replay");
    let timer = RequestTimer::new("replay_upload");

    let result = async {
        state.admit(&caller).await?;
        state
            .analyzer
            .analyze_str(&body)
            .map_err(|e| ProxyError::Analysis(e.0))
    }
    .await;

    respond(timer, result)
}

/// GET /replay
pub async fn replay_get_hint() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": {
                "message": "You need to make a post request to this endpoint",
                "type": "method_hint"
            }
        })),
    )
}

/// Recent league records of a user
///
/// GET /league/:id
pub async fn league(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    debug!(user = %id, identity = %caller.identity, "Handling GET /league");
    let timer = RequestTimer::new("league");

    let result = async {
        state.admit(&caller).await?;
        let client = state.client.clone();
        state
            .dispatch("league", caller.priority, move || async move {
                client.league_recent(&id).await
            })
            .await
    }
    .await;

    respond(timer, result)
}

/// Public profile of a user
///
/// GET /user/:username
pub async fn user(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    debug!(user = %username, identity = %caller.identity, "Handling GET /user");
    let timer = RequestTimer::new("user");

    let result = async {
        state.admit(&caller).await?;
        let client = state.client.clone();
        state
            .dispatch("user", caller.priority, move || async move {
                client.user(&username).await
            })
            .await
    }
    .await;

    respond(timer, result)
}

/// Resolve a username to its TETR.IO user ID
///
/// GET /user/:username/id
pub async fn user_id(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    debug!(user = %username, identity = %caller.identity, "Handling GET /user/id");
    let timer = RequestTimer::new("user_id");

    let result = async {
        state.admit(&caller).await?;
        let client = state.client.clone();
        let id = state
            .dispatch("user_id", caller.priority, move || async move {
                client.get_user_id(&username).await
            })
            .await?;
        Ok::<_, ProxyError>(json!({ "id": id }))
    }
    .await;

    respond(timer, result)
}

/// Anything under /api
pub async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}

fn respond(timer: RequestTimer, result: Result<Value, ProxyError>) -> Result<Json<Value>, ProxyError> {
    match result {
        Ok(body) => {
            timer.finish(StatusCode::OK.as_u16());
            Ok(Json(body))
        }
        Err(e) => {
            timer.finish(e.status().as_u16());
            Err(e)
        }
    }
}
