use super::{audit, Clinic};
use crate::auth::{Operation, Principal};
use crate::error::{Error, NotFoundError, StorageError};
use crate::log::RECORDS;
use crate::model::{Attachment, RecordFields, VisitRecord};
use crate::storage::Removal;
use crate::store::Filter;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

const PATIENT: &str = "patient";

///
/// A file received with a record request
///
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

///
/// Edit to a visit record.
/// Removals are applied before new uploads are added.
///
#[derive(Clone, Debug, Default)]
pub struct RecordChange {
    pub fields: RecordFields,
    pub removed_attachments: Vec<String>,
    pub uploads: Vec<Upload>,
}

impl Clinic {
    pub async fn list_records(
        &self,
        principal: &Principal,
        patient_id: Uuid,
    ) -> Result<Vec<VisitRecord>, Error> {
        principal.authorize(Operation::ListRecords)?;

        self.load_active_patient(patient_id).await?;
        let records = self.records_for(patient_id).await?;

        audit(principal, Operation::ListRecords, Some(patient_id));
        Ok(records)
    }

    pub async fn get_record(
        &self,
        principal: &Principal,
        patient_id: Uuid,
        record_id: Uuid,
    ) -> Result<VisitRecord, Error> {
        principal.authorize(Operation::GetRecord)?;

        self.load_active_patient(patient_id).await?;
        let record = self.load_record(patient_id, record_id).await?;

        audit(principal, Operation::GetRecord, Some(patient_id));
        Ok(record)
    }

    pub async fn add_record(
        &self,
        principal: &Principal,
        patient_id: Uuid,
        fields: RecordFields,
        uploads: Vec<Upload>,
    ) -> Result<VisitRecord, Error> {
        principal.authorize(Operation::AddRecord)?;

        self.load_active_patient(patient_id).await?;
        fields.validate_new()?;

        let attachments = self.store_uploads(&uploads).await?;
        let record = VisitRecord::new(patient_id, fields, attachments);

        if let Err(err) = self.records.save(&record).await {
            self.discard(&record.attachments).await;
            return Err(err.into());
        }

        debug!(target: RECORDS, msg = "Record added", record = %record.id, attachments = record.attachments.len());
        audit(principal, Operation::AddRecord, Some(patient_id));

        Ok(record)
    }

    pub async fn update_record(
        &self,
        principal: &Principal,
        patient_id: Uuid,
        record_id: Uuid,
        change: RecordChange,
    ) -> Result<VisitRecord, Error> {
        principal.authorize(Operation::UpdateRecord)?;

        self.load_active_patient(patient_id).await?;
        let mut record = self.load_record(patient_id, record_id).await?;

        change.fields.validate_update()?;
        for name in &change.removed_attachments {
            self.attachments
                .path(name)
                .map_err(|_| invalid_attachment_name(name))?;
        }

        // Only the record's own attachments are removed
        let removed = record.remove_attachments(&change.removed_attachments);

        let added = self.store_uploads(&change.uploads).await?;
        record.attachments.extend(added.iter().cloned());
        record.apply(change.fields);

        if let Err(err) = self.records.save(&record).await {
            self.discard(&added).await;
            return Err(err.into());
        }

        // Files of removed attachments go once the saved record no longer lists them
        self.discard(&removed).await;

        debug!(target: RECORDS, msg = "Record updated", record = %record.id, attachments = record.attachments.len());
        audit(principal, Operation::UpdateRecord, Some(patient_id));

        Ok(record)
    }

    ///
    /// Delete a record and its attachment files.
    /// File removal is best-effort, the record is deleted regardless.
    ///
    pub async fn delete_record(
        &self,
        principal: &Principal,
        patient_id: Uuid,
        record_id: Uuid,
    ) -> Result<VisitRecord, Error> {
        principal.authorize(Operation::DeleteRecord)?;

        let record = self.load_record(patient_id, record_id).await?;

        self.discard(&record.attachments).await;
        self.records.delete_one(record.id).await?;

        debug!(target: RECORDS, msg = "Record deleted", record = %record.id);
        audit(principal, Operation::DeleteRecord, Some(patient_id));

        Ok(record)
    }

    pub(super) async fn records_for(&self, patient_id: Uuid) -> Result<Vec<VisitRecord>, Error> {
        let filter = Filter::all().eq(PATIENT, patient_id.to_string());
        Ok(self.records.find(&filter).await?)
    }

    /// A record under a different patient is not found
    async fn load_record(&self, patient_id: Uuid, record_id: Uuid) -> Result<VisitRecord, Error> {
        match self.records.find_by_id(record_id).await? {
            Some(record) if record.patient == patient_id => Ok(record),
            _ => Err(NotFoundError::Record.into()),
        }
    }

    async fn store_uploads(&self, uploads: &[Upload]) -> Result<Vec<Attachment>, Error> {
        let mut stored = Vec::with_capacity(uploads.len());

        for upload in uploads {
            match self
                .attachments
                .write(&upload.file_name, upload.content_type.as_deref(), &upload.bytes)
                .await
            {
                Ok(attachment) => stored.push(attachment),
                Err(err) => {
                    self.discard(&stored).await;
                    return Err(err.into());
                }
            }
        }

        Ok(stored)
    }

    /// Best-effort removal, failures are logged
    pub(super) async fn discard(&self, attachments: &[Attachment]) -> (usize, usize, usize) {
        let (mut removed, mut missing, mut failed) = (0, 0, 0);

        for attachment in attachments {
            match self.attachments.remove(&attachment.name).await {
                Ok(Removal::Removed) => removed += 1,
                Ok(Removal::Missing) => missing += 1,
                Err(err) => {
                    warn!(target: RECORDS, msg = "Could not remove attachment", name = attachment.name, error = err.to_string());
                    failed += 1;
                }
            }
        }

        (removed, missing, failed)
    }
}

fn invalid_attachment_name(name: &str) -> Error {
    Error::validation(StorageError::InvalidName { name: name.to_string() }.to_string())
}
