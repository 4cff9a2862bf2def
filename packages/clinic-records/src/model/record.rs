use crate::error::Error;
use crate::store::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

///
/// Descriptor for a file held in attachment storage.
/// `name` is the stored file name, `url` is where the file is served.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub mimetype: String,
}

///
/// A clinical entry for a visit.
///
/// Clinical text is stored in plaintext. Only the patient demographic fields
/// are encrypted.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient: Uuid,
    pub presenting_complaint: String,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub examination: String,
    #[serde(default)]
    pub investigation: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment_plan: String,
    #[serde(default)]
    pub medication: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for VisitRecord {
    const COLLECTION: &'static str = "records";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl VisitRecord {
    pub fn new(patient: Uuid, fields: RecordFields, attachments: Vec<Attachment>) -> VisitRecord {
        let now = Utc::now();
        let mut record = VisitRecord {
            id: Uuid::new_v4(),
            patient,
            presenting_complaint: String::new(),
            history: String::new(),
            examination: String::new(),
            investigation: String::new(),
            diagnosis: String::new(),
            treatment_plan: String::new(),
            medication: String::new(),
            attachments,
            created_at: now,
            updated_at: now,
        };
        record.apply(fields);
        record
    }

    /// Overwrite the clinical fields present in `fields`
    pub fn apply(&mut self, fields: RecordFields) {
        let targets = [
            (fields.presenting_complaint, &mut self.presenting_complaint),
            (fields.history, &mut self.history),
            (fields.examination, &mut self.examination),
            (fields.investigation, &mut self.investigation),
            (fields.diagnosis, &mut self.diagnosis),
            (fields.treatment_plan, &mut self.treatment_plan),
            (fields.medication, &mut self.medication),
        ];

        for (value, target) in targets {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        }

        self.updated_at = Utc::now();
    }

    #[cfg(test)]
    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments.iter().map(|a| a.name.clone()).collect()
    }

    #[cfg(test)]
    pub fn has_attachment(&self, name: &str) -> bool {
        self.attachments.iter().any(|a| a.name == name)
    }

    ///
    /// Drop the descriptors named in `names` and return the ones removed.
    /// Names that do not belong to this record are ignored.
    ///
    pub fn remove_attachments(&mut self, names: &[String]) -> Vec<Attachment> {
        let (removed, kept) = self
            .attachments
            .drain(..)
            .partition(|a| names.contains(&a.name));
        self.attachments = kept;
        removed
    }
}

///
/// Clinical fields as submitted by a caller.
/// Absent fields are left unchanged on update.
///
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFields {
    pub presenting_complaint: Option<String>,
    pub history: Option<String>,
    pub examination: Option<String>,
    pub investigation: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub medication: Option<String>,
}

impl RecordFields {
    fn required(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("Presenting complaint", self.presenting_complaint.as_deref()),
            ("Diagnosis", self.diagnosis.as_deref()),
            ("Treatment plan", self.treatment_plan.as_deref()),
        ]
    }

    /// Required fields must be present and not blank
    pub fn validate_new(&self) -> Result<(), Error> {
        for (label, value) in self.required() {
            if value.map(str::trim).unwrap_or_default().is_empty() {
                return Err(Error::validation(format!("{label} is required")));
            }
        }
        Ok(())
    }

    /// Required fields may be omitted but not blanked
    pub fn validate_update(&self) -> Result<(), Error> {
        for (label, value) in self.required() {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(Error::validation(format!("{label} is required")));
                }
            }
        }
        Ok(())
    }

    pub fn set(&mut self, field: &str, value: String) -> bool {
        let target = match field {
            "presentingComplaint" => &mut self.presenting_complaint,
            "history" => &mut self.history,
            "examination" => &mut self.examination,
            "investigation" => &mut self.investigation,
            "diagnosis" => &mut self.diagnosis,
            "treatmentPlan" => &mut self.treatment_plan,
            "medication" => &mut self.medication,
            _ => return false,
        };
        *target = Some(value);
        true
    }
}
