use super::{audit, Clinic};
use crate::auth::{Operation, Principal};
use crate::error::{Error, NotFoundError};
use crate::log::LIFECYCLE;
use crate::model::{Patient, PatientRequest, PatientView};
use crate::store::Filter;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

const IS_DELETED: &str = "isDeleted";

///
/// Outcome of a bulk lifecycle operation.
/// Unknown ids, malformed ids and ids in the wrong state are reported as not found.
/// An id whose operation failed is reported as failed and the batch carries on.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub processed: Vec<Uuid>,
    pub not_found: Vec<String>,
    pub failed: Vec<Uuid>,
}

impl BulkReport {
    pub(super) fn record(&mut self, raw: &str, id: Uuid, outcome: Result<(), Error>) {
        match outcome {
            Ok(()) => self.processed.push(id),
            Err(Error::NotFound(_)) => self.not_found.push(raw.to_string()),
            Err(err) => {
                error!(target: LIFECYCLE, msg = "Bulk operation failed", patient = %id, error = err.to_string());
                self.failed.push(id);
            }
        }
    }
}

impl Clinic {
    pub async fn list_patients(&self, principal: &Principal) -> Result<Vec<PatientView>, Error> {
        principal.authorize(Operation::ListPatients)?;
        self.list_by_state(principal, Operation::ListPatients, false)
            .await
    }

    pub async fn list_trash(&self, principal: &Principal) -> Result<Vec<PatientView>, Error> {
        principal.authorize(Operation::ListTrash)?;
        self.list_by_state(principal, Operation::ListTrash, true)
            .await
    }

    async fn list_by_state(
        &self,
        principal: &Principal,
        operation: Operation,
        is_deleted: bool,
    ) -> Result<Vec<PatientView>, Error> {
        let patients = self
            .patients
            .find(&Filter::all().eq(IS_DELETED, is_deleted))
            .await?;

        audit(principal, operation, None);

        Ok(patients.iter().map(|p| p.view(&self.cipher)).collect())
    }

    pub async fn get_patient(&self, principal: &Principal, id: Uuid) -> Result<PatientView, Error> {
        principal.authorize(Operation::GetPatient)?;

        let patient = self.load_active_patient(id).await?;
        audit(principal, Operation::GetPatient, Some(id));

        Ok(patient.view(&self.cipher))
    }

    pub async fn create_patient(
        &self,
        principal: &Principal,
        request: PatientRequest,
    ) -> Result<PatientView, Error> {
        principal.authorize(Operation::CreatePatient)?;

        let input = request.validate()?;
        let patient = Patient::new(input, &self.cipher)?;
        self.patients.save(&patient).await?;

        audit(principal, Operation::CreatePatient, Some(patient.id));

        Ok(patient.view(&self.cipher))
    }

    ///
    /// Edit demographic fields.
    /// Permitted in either lifecycle state, the state itself never changes.
    ///
    pub async fn update_patient(
        &self,
        principal: &Principal,
        id: Uuid,
        request: PatientRequest,
    ) -> Result<PatientView, Error> {
        principal.authorize(Operation::UpdatePatient)?;

        let update = request.validate_update()?;
        let mut patient = self.load_patient(id).await?;

        let changed = patient.apply(update, &self.cipher)?;
        if !changed.is_empty() {
            self.patients.save(&patient).await?;
        }

        debug!(target: LIFECYCLE, msg = "Patient updated", patient = %id, ?changed);
        audit(principal, Operation::UpdatePatient, Some(id));

        Ok(patient.view(&self.cipher))
    }

    /// Active -> Trashed
    pub async fn soft_delete_patient(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<PatientView, Error> {
        principal.authorize(Operation::SoftDeletePatient)?;

        let mut patient = self.load_patient(id).await?;
        patient.soft_delete()?;
        self.patients.save(&patient).await?;

        info!(target: LIFECYCLE, msg = "Patient moved to trash", patient = %id);
        audit(principal, Operation::SoftDeletePatient, Some(id));

        Ok(patient.view(&self.cipher))
    }

    /// Trashed -> Active
    pub async fn restore_patient(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<PatientView, Error> {
        principal.authorize(Operation::RestorePatient)?;

        let patient = self.restore(id).await?;
        audit(principal, Operation::RestorePatient, Some(id));

        Ok(patient.view(&self.cipher))
    }

    pub async fn bulk_restore(
        &self,
        principal: &Principal,
        ids: &[String],
    ) -> Result<BulkReport, Error> {
        principal.authorize(Operation::BulkRestore)?;

        let mut report = BulkReport::default();

        for raw in ids {
            let Ok(id) = Uuid::parse_str(raw) else {
                report.not_found.push(raw.clone());
                continue;
            };

            let outcome = self.restore(id).await.map(|_| {
                audit(principal, Operation::BulkRestore, Some(id));
            });
            report.record(raw, id, outcome);
        }

        Ok(report)
    }

    async fn restore(&self, id: Uuid) -> Result<Patient, Error> {
        let mut patient = self
            .patients
            .find_by_id(id)
            .await?
            .ok_or(NotFoundError::PatientNotInTrash)?;

        patient.restore()?;
        self.patients.save(&patient).await?;

        info!(target: LIFECYCLE, msg = "Patient restored", patient = %id);
        Ok(patient)
    }
}
