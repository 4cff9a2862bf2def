use crate::clinic::Clinic;
use crate::config::ClinicConfig;
use crate::error::Error;
use crate::log::MIGRATE;
use crate::store::Filter;
use tracing::{debug, info, warn};

#[derive(clap::Args, Clone, Debug)]
#[command(version, about, long_about)]
///
/// Encrypt patient fields stored before field encryption was enabled.
///
/// Every patient is scanned. Name, age and email values that are still
/// plaintext are encrypted with the configured key and written back.
/// Values that are already encrypted are left untouched.
///
pub struct EncryptLegacy {
    /// Run without update. Patients are scanned, but nothing is written.
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Turn on additional logging output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub scanned: usize,
    pub patients_updated: usize,
    pub fields_encrypted: usize,
}

impl EncryptLegacy {
    ///
    /// Returns true if this is not a `dry_run`
    ///
    fn commit(&self) -> bool {
        !self.dry_run
    }

    pub async fn run(&self, config: &ClinicConfig) -> Result<MigrationReport, Error> {
        let clinic = Clinic::init(config).await?;
        self.migrate(&clinic).await
    }

    pub async fn migrate(&self, clinic: &Clinic) -> Result<MigrationReport, Error> {
        if !self.commit() {
            warn!(target: MIGRATE, msg = "Dry run is enabled");
        }

        let patients = clinic.patients().find(&Filter::all()).await?;
        let mut report = MigrationReport {
            scanned: patients.len(),
            ..Default::default()
        };

        for mut patient in patients {
            let fields = patient.encrypt_legacy(clinic.cipher())?;
            if fields.is_empty() {
                continue;
            }

            if self.verbose {
                info!(target: MIGRATE, msg = "Encrypting", patient = %patient.id, ?fields);
            } else {
                debug!(target: MIGRATE, msg = "Encrypting", patient = %patient.id, ?fields);
            }

            if self.commit() {
                clinic.patients().save(&patient).await?;
            }

            report.patients_updated += 1;
            report.fields_encrypted += fields.len();
        }

        info!(
            target: MIGRATE,
            msg = "Encryption complete",
            scanned = report.scanned,
            updated = report.patients_updated,
            fields = report.fields_encrypted,
            dry_run = self.dry_run,
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::DecryptResult;
    use crate::model::Patient;
    use crate::store::{Document, DocumentStore, MemoryStore};
    use crate::test_helpers::test_config;
    use serde_json::json;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn clinic_with_legacy_patient(dir: &std::path::Path, name: &str) -> (Clinic, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let id = Uuid::new_v4();

        store
            .save(
                Patient::COLLECTION,
                id,
                json!({
                    "_id": id,
                    "name": name,
                    "age": 61,
                    "email": "",
                    "gender": "male",
                    "phone": "",
                    "address": "",
                    "isDeleted": false,
                    "createdAt": "2023-01-01T00:00:00Z",
                    "updatedAt": "2023-01-01T00:00:00Z"
                }),
            )
            .await
            .unwrap();

        let clinic = Clinic::new(&test_config(dir), store).unwrap();
        (clinic, id)
    }

    #[tokio::test]
    async fn encrypts_legacy_plaintext_once() {
        let dir = tempfile::tempdir().unwrap();
        let (clinic, id) = clinic_with_legacy_patient(dir.path(), "Legacy Larry").await;

        let migrate = EncryptLegacy {
            dry_run: false,
            verbose: false,
        };

        let report = migrate.migrate(&clinic).await.unwrap();
        assert_eq!(
            report,
            MigrationReport {
                scanned: 1,
                patients_updated: 1,
                fields_encrypted: 2,
            }
        );

        let patient = clinic.patients().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(
            clinic.cipher().decrypt(&patient.name),
            DecryptResult::Decrypted("Legacy Larry".to_string())
        );
        assert_eq!(
            clinic.cipher().decrypt(&patient.age),
            DecryptResult::Decrypted("61".to_string())
        );

        // second pass finds nothing to do
        let report = migrate.migrate(&clinic).await.unwrap();
        assert_eq!(report.patients_updated, 0);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (clinic, id) = clinic_with_legacy_patient(dir.path(), "Legacy Larry").await;

        let migrate = EncryptLegacy {
            dry_run: true,
            verbose: true,
        };

        let report = migrate.migrate(&clinic).await.unwrap();
        assert_eq!(report.patients_updated, 1);

        let patient = clinic.patients().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(patient.name, "Legacy Larry");
    }

    #[tokio::test]
    async fn encrypts_plaintext_containing_the_token_separator() {
        let dir = tempfile::tempdir().unwrap();
        let (clinic, id) = clinic_with_legacy_patient(dir.path(), "Smith: John").await;

        let migrate = EncryptLegacy {
            dry_run: false,
            verbose: false,
        };

        let report = migrate.migrate(&clinic).await.unwrap();
        assert_eq!(report.fields_encrypted, 2);

        let patient = clinic.patients().find_by_id(id).await.unwrap().unwrap();
        assert_ne!(patient.name, "Smith: John");
        assert_eq!(
            clinic.cipher().decrypt(&patient.name),
            DecryptResult::Decrypted("Smith: John".to_string())
        );
    }
}
