//!
//! Permanent deletion of a trashed patient.
//!
//! The purge runs as ordered steps. Deleting the record documents and then the
//! patient document is the store commit. If the patient delete fails, the record
//! documents are written back. Attachment files are only removed once the
//! commit has succeeded, as file removal cannot be undone.
//!
use super::patients::BulkReport;
use super::{audit, Clinic};
use crate::auth::{Operation, Principal};
use crate::error::{Error, NotFoundError, PurgeError};
use crate::log::LIFECYCLE;
use crate::model::VisitRecord;
use crate::prometheus::{PATIENTS_PURGED_TOTAL, PURGE_ROLLBACKS_TOTAL};
use crate::store::Filter;
use metrics::counter;
use serde::Serialize;
use std::fmt::{self, Display};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PurgeStep {
    LoadPatient,
    LoadRecords,
    DeleteRecords,
    DeletePatient,
    RemoveFiles,
}

impl Display for PurgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            PurgeStep::LoadPatient => "load patient",
            PurgeStep::LoadRecords => "load records",
            PurgeStep::DeleteRecords => "delete records",
            PurgeStep::DeletePatient => "delete patient",
            PurgeStep::RemoveFiles => "remove files",
        };
        write!(f, "{step}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub patient_id: Uuid,
    pub records_deleted: usize,
    pub attachments_removed: usize,
    pub attachments_missing: usize,
    pub attachments_failed: usize,
}

fn purge_failed(patient_id: Uuid, step: PurgeStep, rolled_back: bool, source: Error) -> Error {
    PurgeError::Failed {
        patient_id,
        step,
        rolled_back,
        source: Box::new(source),
    }
    .into()
}

impl Clinic {
    /// Trashed -> Purged
    pub async fn purge_patient(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<PurgeReport, Error> {
        principal.authorize(Operation::PurgePatient)?;

        let report = self.purge(id).await?;
        audit(principal, Operation::PurgePatient, Some(id));

        Ok(report)
    }

    pub async fn bulk_purge(
        &self,
        principal: &Principal,
        ids: &[String],
    ) -> Result<BulkReport, Error> {
        principal.authorize(Operation::BulkPurge)?;

        let mut report = BulkReport::default();

        for raw in ids {
            let Ok(id) = Uuid::parse_str(raw) else {
                report.not_found.push(raw.clone());
                continue;
            };

            let outcome = self.purge(id).await.map(|_| {
                audit(principal, Operation::BulkPurge, Some(id));
            });
            report.record(raw, id, outcome);
        }

        Ok(report)
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeReport, Error> {
        let patient = self
            .patients
            .find_by_id(id)
            .await
            .map_err(|err| purge_failed(id, PurgeStep::LoadPatient, false, err.into()))?
            .ok_or(NotFoundError::Patient)?;

        if patient.is_active() {
            return Err(NotFoundError::PatientNotInTrash.into());
        }

        let records = self
            .records_for(id)
            .await
            .map_err(|err| purge_failed(id, PurgeStep::LoadRecords, false, err))?;

        let filter = Filter::all().eq("patient", id.to_string());
        self.records
            .delete_many(&filter)
            .await
            .map_err(|err| purge_failed(id, PurgeStep::DeleteRecords, false, err.into()))?;

        if let Err(err) = self.patients.delete_one(id).await {
            let rolled_back = self.rollback(&records).await;
            counter!(PURGE_ROLLBACKS_TOTAL).increment(1);

            error!(
                target: LIFECYCLE,
                msg = "Permanent delete failed",
                patient = %id,
                step = %PurgeStep::DeletePatient,
                rolled_back,
                error = err.to_string()
            );

            return Err(purge_failed(id, PurgeStep::DeletePatient, rolled_back, err.into()));
        }

        // Committed
        let attachments: Vec<_> = records
            .iter()
            .flat_map(|record| record.attachments.iter().cloned())
            .collect();

        let (removed, missing, failed) = self.discard(&attachments).await;
        if failed > 0 {
            warn!(
                target: LIFECYCLE,
                msg = "Attachment files left behind",
                patient = %id,
                step = %PurgeStep::RemoveFiles,
                failed
            );
        }

        counter!(PATIENTS_PURGED_TOTAL).increment(1);
        info!(
            target: LIFECYCLE,
            msg = "Patient permanently deleted",
            patient = %id,
            records = records.len(),
            attachments = removed
        );

        Ok(PurgeReport {
            patient_id: id,
            records_deleted: records.len(),
            attachments_removed: removed,
            attachments_missing: missing,
            attachments_failed: failed,
        })
    }

    /// Write removed records back, true if every record was restored
    async fn rollback(&self, records: &[VisitRecord]) -> bool {
        let mut restored = true;

        for record in records {
            if let Err(err) = self.records.save(record).await {
                error!(
                    target: LIFECYCLE,
                    msg = "Could not restore record",
                    record = %record.id,
                    error = err.to_string()
                );
                restored = false;
            }
        }

        restored
    }
}
