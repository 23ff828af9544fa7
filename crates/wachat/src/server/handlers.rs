use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::query::{self, NewMessage, PageRequest, QueryError};
use crate::server::AppState;

/// Maps query failures to HTTP statuses: input problems (including bodies
/// that fail to parse) are 400, unknown targets 404, store faults 500.
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        Self(error)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        Self(QueryError::Store(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::MessageNotFound(_) | QueryError::ContactNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        let body = match &self.0 {
            QueryError::Store(error) => {
                tracing::error!(error = %format!("{error:#}"), "request failed");
                json!({
                    "success": false,
                    "error": "internal server error",
                    "code": self.0.code(),
                    "details": format!("{error:#}"),
                })
            }
            other => json!({
                "success": false,
                "error": other.to_string(),
                "code": other.code(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(QueryError::InvalidRequestBody(rejection.body_text()))
    }
}

type ApiResult = Result<Response, ApiError>;

pub async fn get_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "listeners": state.relay.listener_count(),
    }))
}

pub async fn get_conversations(State(state): State<AppState>) -> ApiResult {
    let conversations = query::list_conversations(&*state.lock_store().await)?;
    Ok(Json(conversations).into_response())
}

pub async fn get_party_messages(
    State(state): State<AppState>,
    Path(wa_id): Path<String>,
) -> ApiResult {
    let messages = query::messages_for_party(&*state.lock_store().await, &wa_id)?;
    Ok(Json(messages).into_response())
}

pub async fn post_party_message(
    State(state): State<AppState>,
    Path(wa_id): Path<String>,
    body: Result<Json<NewMessage>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let record = query::append_message(
        &mut *state.lock_store().await,
        &state.relay,
        &wa_id,
        body,
        &state.business_phone,
    )?;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

pub async fn get_user(State(state): State<AppState>, Path(wa_id): Path<String>) -> ApiResult {
    let contact = query::contact(&*state.lock_store().await, &wa_id)?;
    Ok(Json(contact).into_response())
}

pub async fn post_process_payloads(State(state): State<AppState>) -> ApiResult {
    let outcome = tokio::task::spawn_blocking(move || state.run_exclusive_ingest())
        .await
        .map_err(|error| anyhow::anyhow!("ingestion task panicked: {error}"))??;

    match outcome {
        Some(report) => Ok(Json(json!({
            "success": true,
            "message": "Payloads processed successfully",
            "report": report,
        }))
        .into_response()),
        None => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "an ingestion run is already in progress",
                "code": "ingest_in_progress",
            })),
        )
            .into_response()),
    }
}

pub async fn get_processed_messages(
    State(state): State<AppState>,
    Query(request): Query<PageRequest>,
) -> ApiResult {
    let page = query::processed_log(&*state.lock_store().await, request)?;
    Ok(Json(json!({
        "success": true,
        "data": page.data,
        "pagination": page.pagination,
    }))
    .into_response())
}

pub async fn get_conversation_log(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult {
    let messages = query::conversation_log(&*state.lock_store().await, &conversation_id)?;
    Ok(Json(json!({
        "success": true,
        "data": messages,
        "conversationId": conversation_id,
    }))
    .into_response())
}

pub async fn put_message_status(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let raw_status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    let record = query::update_message_status(
        &mut *state.lock_store().await,
        &state.relay,
        &message_id,
        raw_status,
    )?;
    Ok(Json(json!({
        "success": true,
        "message": "Status updated successfully",
        "data": record,
    }))
    .into_response())
}

pub async fn get_summary(State(state): State<AppState>) -> ApiResult {
    let summary = query::processing_summary(&*state.lock_store().await)?;
    Ok(Json(json!({ "success": true, "summary": summary })).into_response())
}

pub async fn post_bulk_update_status(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let results =
        query::bulk_update_statuses(&mut *state.lock_store().await, &state.relay, &body)?;
    Ok(Json(json!({
        "success": true,
        "message": "Bulk update completed",
        "results": results,
    }))
    .into_response())
}
