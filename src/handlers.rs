// handlers.rs
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::error::PollError;
use crate::models::{
    CreatePollRequest, OptionInput, Poll, ReconcileResponse, VoteRequest, VoteResponse,
};
use crate::services::PollService;

/// Header consulted when the vote body carries no `voterId`.
pub const VOTER_ID_HEADER: &str = "x-voter-id";

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "message": "QuickPolls API is running" }))
}

/// List all polls, newest first
pub async fn list_polls(State(service): State<PollService>) -> Result<Json<Vec<Poll>>, PollError> {
    Ok(Json(service.list_polls().await?))
}

pub async fn create_poll(
    State(service): State<PollService>,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Poll>), PollError> {
    let Json(request) = payload?;
    let options = request.options.into_iter().map(OptionInput::into_text);
    let poll = service.create_poll(&request.question, options).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn get_poll(
    State(service): State<PollService>,
    Path(id): Path<String>,
) -> Result<Json<Poll>, PollError> {
    Ok(Json(service.get_poll(&id).await?))
}

/// Vote on a poll
pub async fn vote(
    State(service): State<PollService>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, PollError> {
    let Json(request) = payload?;
    // A blank body id defers to the header
    let voter_id = request
        .voter_id
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            headers
                .get(VOTER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let poll = service
        .cast_vote(&id, &voter_id, request.option_index)
        .await?;
    Ok(Json(VoteResponse {
        message: "Vote recorded successfully",
        poll,
    }))
}

/// Recompute a poll's tallies from the vote ledger
pub async fn reconcile_poll(
    State(service): State<PollService>,
    Path(id): Path<String>,
) -> Result<Json<ReconcileResponse>, PollError> {
    let reconciled = service.reconcile_poll(&id).await?;
    Ok(Json(ReconcileResponse {
        repaired: reconciled.repaired(),
        previous: reconciled.previous,
        poll: reconciled.poll,
    }))
}
