//! HTTP handlers for the booking endpoints and the JSON error envelope.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::error;

use crate::error::ServiceError;
use crate::server::AppState;
use crate::types::{AvailabilityRequest, BookingRequest, BookingResponse, BookingUpdateRequest, CleanerAvailability};

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::Business(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ServiceError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

/// Malformed or incomplete JSON is a client error, reported like any other
/// rejected booking request.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServiceError::business(rejection.body_text()))
}

fn booking_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ServiceError> {
    path
        .map(|Path(id)| id)
        .map_err(|rejection| ServiceError::business(rejection.body_text()))
}

pub async fn check_availability(
    State(state): State<AppState>,
    payload: Result<Json<AvailabilityRequest>, JsonRejection>,
) -> Result<Json<Vec<CleanerAvailability>>, ServiceError> {
    let request = body(payload)?;
    Ok(Json(state.service.check_availability(&request).await?))
}

pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), ServiceError> {
    let request = body(payload)?;
    let response = state.service.create_booking(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn update_booking(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BookingUpdateRequest>, JsonRejection>,
) -> Result<Json<BookingResponse>, ServiceError> {
    let id = booking_id(path)?;
    let request = body(payload)?;
    Ok(Json(state.service.update_booking(id, &request).await?))
}

pub async fn get_booking(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<BookingResponse>, ServiceError> {
    let id = booking_id(path)?;
    Ok(Json(state.service.get_booking(id).await?))
}
