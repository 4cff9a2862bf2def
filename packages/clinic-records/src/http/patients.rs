use super::error::ApiError;
use super::extract::{parse_id, parse_json, Authenticated, JsonBody};
use super::AppState;
use crate::auth::Operation;
use crate::clinic::{BulkReport, PurgeReport};
use crate::error::{Error, NotFoundError};
use crate::model::{PatientRequest, PatientView};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct PatientMessage {
    pub message: &'static str,
    pub patient: PatientView,
}

#[derive(Debug, Serialize)]
pub struct PurgeMessage {
    pub message: &'static str,
    #[serde(flatten)]
    pub report: PurgeReport,
}

#[derive(Debug, Serialize)]
pub struct BulkMessage {
    pub message: &'static str,
    #[serde(flatten)]
    pub report: BulkReport,
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<PatientView>>, ApiError> {
    Ok(Json(state.clinic.list_patients(&principal).await?))
}

pub async fn trash(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<PatientView>>, ApiError> {
    Ok(Json(state.clinic.list_trash(&principal).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<PatientView>, ApiError> {
    // Authorize before the id is looked at
    principal.authorize(Operation::GetPatient)?;
    let id = parse_id(&id, NotFoundError::Patient)?;
    Ok(Json(state.clinic.get_patient(&principal, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(request): JsonBody<PatientRequest>,
) -> Result<(StatusCode, Json<PatientView>), ApiError> {
    let patient = state.clinic.create_patient(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PatientView>, ApiError> {
    principal.authorize(Operation::UpdatePatient)?;
    let id = parse_id(&id, NotFoundError::Patient)?;
    let request: PatientRequest = parse_json(&body)?;
    Ok(Json(state.clinic.update_patient(&principal, id, request).await?))
}

pub async fn soft_delete(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<PatientMessage>, ApiError> {
    principal.authorize(Operation::SoftDeletePatient)?;
    let id = parse_id(&id, NotFoundError::Patient)?;
    let patient = state.clinic.soft_delete_patient(&principal, id).await?;

    Ok(Json(PatientMessage {
        message: "Patient moved to Trash",
        patient,
    }))
}

pub async fn restore(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<PatientMessage>, ApiError> {
    principal.authorize(Operation::RestorePatient)?;
    let id = parse_id(&id, NotFoundError::PatientNotInTrash)?;
    let patient = state.clinic.restore_patient(&principal, id).await?;

    Ok(Json(PatientMessage {
        message: "Patient restored successfully",
        patient,
    }))
}

pub async fn purge(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<PurgeMessage>, ApiError> {
    principal.authorize(Operation::PurgePatient)?;
    let id = parse_id(&id, NotFoundError::PatientNotInTrash)?;
    let report = state.clinic.purge_patient(&principal, id).await?;

    Ok(Json(PurgeMessage {
        message: "Patient permanently deleted",
        report,
    }))
}

/// `{"ids": [...]}`, ids that are not strings are reported as not found
fn bulk_ids(body: &[u8]) -> Result<Vec<String>, Error> {
    let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
    let ids = body
        .get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::validation("Provide an array of ids"))?;

    Ok(ids
        .iter()
        .map(|id| match id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        })
        .collect())
}

pub async fn bulk_restore(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    body: Bytes,
) -> Result<Json<BulkMessage>, ApiError> {
    principal.authorize(Operation::BulkRestore)?;
    let ids = bulk_ids(&body)?;
    let report = state.clinic.bulk_restore(&principal, &ids).await?;

    Ok(Json(BulkMessage {
        message: "Patients restored successfully",
        report,
    }))
}

pub async fn bulk_purge(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    body: Bytes,
) -> Result<Json<BulkMessage>, ApiError> {
    principal.authorize(Operation::BulkPurge)?;
    let ids = bulk_ids(&body)?;
    let report = state.clinic.bulk_purge(&principal, &ids).await?;

    Ok(Json(BulkMessage {
        message: "Patients permanently deleted",
        report,
    }))
}
