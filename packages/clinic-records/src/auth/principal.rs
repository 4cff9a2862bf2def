use crate::error::{AuthenticationError, Error};
use crate::model::{Role, User};
use serde::Serialize;
use std::fmt::{self, Display};
use uuid::Uuid;

const BEARER: &str = "Bearer ";

///
/// The authenticated staff member behind a request.
///
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Principal {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

impl Principal {
    pub fn authorize(&self, operation: Operation) -> Result<(), Error> {
        if operation.allowed_roles().contains(&self.role) {
            Ok(())
        } else {
            Err(Error::Forbidden { role: self.role })
        }
    }
}

///
/// Operations guarded by role.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ListPatients,
    GetPatient,
    CreatePatient,
    UpdatePatient,
    SoftDeletePatient,
    ListTrash,
    RestorePatient,
    PurgePatient,
    BulkRestore,
    BulkPurge,
    ListRecords,
    GetRecord,
    AddRecord,
    UpdateRecord,
    DeleteRecord,
}

const ALL_STAFF: &[Role] = &[Role::Nurse, Role::Doctor, Role::Admin];
const CLINICIANS: &[Role] = &[Role::Doctor, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];

impl Operation {
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Operation::ListPatients
            | Operation::GetPatient
            | Operation::CreatePatient
            | Operation::SoftDeletePatient
            | Operation::ListRecords
            | Operation::GetRecord
            | Operation::AddRecord
            | Operation::UpdateRecord => ALL_STAFF,

            Operation::UpdatePatient | Operation::DeleteRecord => CLINICIANS,

            Operation::ListTrash
            | Operation::RestorePatient
            | Operation::PurgePatient
            | Operation::BulkRestore
            | Operation::BulkPurge => ADMIN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListPatients => "list patients",
            Operation::GetPatient => "view patient",
            Operation::CreatePatient => "create patient",
            Operation::UpdatePatient => "update patient",
            Operation::SoftDeletePatient => "move patient to trash",
            Operation::ListTrash => "list trash",
            Operation::RestorePatient => "restore patient",
            Operation::PurgePatient => "permanently delete patient",
            Operation::BulkRestore => "bulk restore patients",
            Operation::BulkPurge => "bulk permanently delete patients",
            Operation::ListRecords => "list records",
            Operation::GetRecord => "view record",
            Operation::AddRecord => "add record",
            Operation::UpdateRecord => "update record",
            Operation::DeleteRecord => "delete record",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

///
/// Extract the token from an `Authorization` header value.
///
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthenticationError> {
    let header = header.ok_or(AuthenticationError::MissingToken)?;

    let token = header
        .strip_prefix(BEARER)
        .ok_or(AuthenticationError::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(AuthenticationError::EmptyToken);
    }

    Ok(token)
}
