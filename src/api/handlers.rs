use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::balance::BalanceError;
use crate::domain::{AcceptedMessage, KeyedMessage};
use crate::status::StatusRow;

use super::auth::Caller;
use super::error::ApiError;
use super::pagination::{PageQuery, Paginate};
use super::server::ApiState;

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub phone_number: String,
    pub message: String,
}

/// One audit row as returned to clients.
#[derive(Debug, Serialize)]
pub struct StatusRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "CustomerID")]
    pub customer_id: i64,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "status")]
    pub status: String,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

impl From<StatusRow> for StatusRecord {
    fn from(row: StatusRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            phone: row.phone,
            message: row.message,
            priority: row.priority,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Admit a send: debit the cached balance, then hand the accepted record to
/// the producer. By the time the producer sees it, billing has happened, so
/// overflow falls back to the DLQ rather than failing the request.
pub async fn send_sms(
    State(state): State<ApiState>,
    caller: Caller,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req: SendSmsRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    if req.phone_number.trim().is_empty() {
        return Err(ApiError::InvalidInput("phone_number is required".to_string()));
    }
    if req.message.is_empty() {
        return Err(ApiError::InvalidInput("message is required".to_string()));
    }

    if state
        .idempotency
        .is_duplicate(caller.customer_id, &req.phone_number, &req.message)
        .await
    {
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "message": "message accepted" })),
        ));
    }

    let message_id = state
        .balance
        .debit_and_queue(caller.customer_id, &req.message, &req.phone_number)
        .await
        .map_err(|e| match e {
            BalanceError::InsufficientFunds => ApiError::InsufficientFunds,
            other => ApiError::Internal(other.to_string()),
        })?;

    let accepted = AcceptedMessage::new(
        message_id,
        caller.customer_id,
        caller.priority,
        &req.phone_number,
        &req.message,
    );

    let record = KeyedMessage::accepted(&state.accepted_topic, &accepted)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state
        .producer
        .publish(record)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    debug!(
        message_id = %message_id,
        customer_id = caller.customer_id,
        priority = caller.priority,
        "sms queued"
    );

    Ok((StatusCode::OK, Json(json!({ "message": "queued" }))))
}

/// Page through the caller's status rows, newest first.
pub async fn list_sms_log(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let pagination = Paginate::new(&query);

    let (rows, total) = state
        .analytics
        .list_by_customer(caller.customer_id, pagination.size, pagination.from)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let data: Vec<StatusRecord> = rows.into_iter().map(StatusRecord::from).collect();

    Ok(Json(json!({
        "message": "success",
        "data": data,
        "meta": {
            "page": pagination.page,
            "page_size": pagination.size,
            "total": total,
        },
    })))
}

/// Status timeline of one message.
pub async fn view_timeline(
    State(state): State<ApiState>,
    _caller: Caller,
    Path(message_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .analytics
        .timeline(&message_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let data: Vec<StatusRecord> = rows.into_iter().map(StatusRecord::from).collect();

    Ok(Json(json!({
        "message": "success",
        "data": data,
    })))
}
