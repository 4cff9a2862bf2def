//!
//! Request extractors.
//!
//! Every rejection is reported as an [`ApiError`] so the caller always sees a
//! `{"message": ...}` body.
//!
use super::error::ApiError;
use super::AppState;
use crate::auth::Principal;
use crate::clinic::{RecordChange, Upload};
use crate::error::{Error, NotFoundError};
use crate::model::RecordFields;
use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

const ATTACHMENTS_FIELD: &str = "attachments";
const REMOVED_ATTACHMENTS_FIELD: &str = "removedAttachments";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

///
/// The principal resolved from the `Authorization` header.
///
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A header that is not visible ASCII cannot carry a bearer token
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default());

        let principal = state.clinic.authenticate(header).await?;
        Ok(Authenticated(principal))
    }
}

///
/// JSON body, malformed input is a validation error.
///
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(Error::validation(rejection.body_text()).into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Names {
    One(String),
    Many(Vec<String>),
}

impl From<Names> for Vec<String> {
    fn from(names: Names) -> Self {
        match names {
            Names::One(name) => vec![name],
            Names::Many(names) => names,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordJson {
    #[serde(flatten)]
    fields: RecordFields,
    removed_attachments: Option<Names>,
}

///
/// A visit record create or edit request.
///
/// `multipart/form-data` carries files in `attachments` parts, removals in
/// repeated `removedAttachments` parts and the clinical fields as text parts.
/// Any other content type is read as JSON without files.
///
#[derive(Debug, Default)]
pub struct RecordForm(pub RecordChange);

#[async_trait]
impl<S> FromRequest<S> for RecordForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(MULTIPART_FORM_DATA));

        if !is_multipart {
            let JsonBody(json) = JsonBody::<RecordJson>::from_request(request, state).await?;
            return Ok(RecordForm(RecordChange {
                fields: json.fields,
                removed_attachments: json.removed_attachments.map(Into::into).unwrap_or_default(),
                uploads: vec![],
            }));
        }

        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| Error::validation(rejection.body_text()))?;

        let mut change = RecordChange::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| Error::validation(err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == ATTACHMENTS_FIELD {
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| Error::validation(err.body_text()))?;

                change.uploads.push(Upload {
                    file_name,
                    content_type,
                    bytes,
                });
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|err| Error::validation(err.body_text()))?;

            if name == REMOVED_ATTACHMENTS_FIELD {
                change.removed_attachments.push(value);
            } else {
                // Unknown text parts are ignored
                change.fields.set(&name, value);
            }
        }

        Ok(RecordForm(change))
    }
}

///
/// Parse an id from the path.
/// A malformed id cannot name an existing document, so it is not found.
///
pub fn parse_id(raw: &str, missing: NotFoundError) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| missing.into())
}

///
/// Parse a JSON body read as raw bytes.
/// Handlers that check the role before reading the body use this in place of [`JsonBody`].
///
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        Error::validation(format!("Failed to parse the request body as JSON: {err}")).into()
    })
}
