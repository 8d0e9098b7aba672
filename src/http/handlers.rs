//! Request handlers for the person endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use super::store::{Person, PersonInput, RecordStore};

/// Errors returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    NotFound(i32),
    Conflict(i32),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("person {} not found", id)),
            ApiError::Conflict(id) => (StatusCode::CONFLICT, format!("person {} already exists", id)),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn list_people(State(store): State<Arc<RecordStore>>) -> Json<Vec<Person>> {
    Json(store.list())
}

pub async fn get_person(
    State(store): State<Arc<RecordStore>>,
    Path(id): Path<i32>,
) -> Result<Json<Person>, ApiError> {
    store.get(id).map(Json).ok_or(ApiError::NotFound(id))
}

pub async fn create_person(
    State(store): State<Arc<RecordStore>>,
    Json(input): Json<PersonInput>,
) -> Result<Response, ApiError> {
    let requested = input.id;
    let person = store.create(input).ok_or(ApiError::Conflict(requested))?;
    debug!(id = person.id, "Created person");

    let location = format!("/people/{}", person.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(person)).into_response())
}

/// Replace a person. The id in the path is authoritative.
pub async fn update_person(
    State(store): State<Arc<RecordStore>>,
    Path(id): Path<i32>,
    Json(input): Json<PersonInput>,
) -> Result<Json<Person>, ApiError> {
    store.update(id, input).map(Json).ok_or(ApiError::NotFound(id))
}

pub async fn delete_person(
    State(store): State<Arc<RecordStore>>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    if store.delete(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

pub async fn health() -> &'static str {
    "ok"
}
