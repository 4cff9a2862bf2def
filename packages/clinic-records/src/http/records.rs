use super::error::{ApiError, Message};
use super::extract::{parse_id, Authenticated, RecordForm};
use super::AppState;
use crate::auth::{Operation, Principal};
use crate::error::NotFoundError;
use crate::model::VisitRecord;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

fn ids(
    principal: &Principal,
    operation: Operation,
    patient_id: &str,
    record_id: &str,
) -> Result<(Uuid, Uuid), ApiError> {
    principal.authorize(operation)?;
    Ok((
        parse_id(patient_id, NotFoundError::Patient)?,
        parse_id(record_id, NotFoundError::Record)?,
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(patient_id): Path<String>,
) -> Result<Json<Vec<VisitRecord>>, ApiError> {
    principal.authorize(Operation::ListRecords)?;
    let patient_id = parse_id(&patient_id, NotFoundError::Patient)?;
    Ok(Json(state.clinic.list_records(&principal, patient_id).await?))
}

pub async fn add(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(patient_id): Path<String>,
    RecordForm(change): RecordForm,
) -> Result<(StatusCode, Json<VisitRecord>), ApiError> {
    principal.authorize(Operation::AddRecord)?;
    let patient_id = parse_id(&patient_id, NotFoundError::Patient)?;

    let record = state
        .clinic
        .add_record(&principal, patient_id, change.fields, change.uploads)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((patient_id, record_id)): Path<(String, String)>,
) -> Result<Json<VisitRecord>, ApiError> {
    let (patient_id, record_id) = ids(&principal, Operation::GetRecord, &patient_id, &record_id)?;
    Ok(Json(state.clinic.get_record(&principal, patient_id, record_id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((patient_id, record_id)): Path<(String, String)>,
    RecordForm(change): RecordForm,
) -> Result<Json<VisitRecord>, ApiError> {
    let (patient_id, record_id) =
        ids(&principal, Operation::UpdateRecord, &patient_id, &record_id)?;

    let record = state
        .clinic
        .update_record(&principal, patient_id, record_id, change)
        .await?;

    Ok(Json(record))
}

pub async fn delete(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path((patient_id, record_id)): Path<(String, String)>,
) -> Result<Json<Message>, ApiError> {
    let (patient_id, record_id) =
        ids(&principal, Operation::DeleteRecord, &patient_id, &record_id)?;

    state
        .clinic
        .delete_record(&principal, patient_id, record_id)
        .await?;

    Ok(Json(Message::new("Record deleted successfully")))
}
