//!
//! The clinic records service.
//!
//! Every operation takes the authenticated [`Principal`], checks the role
//! allow-list for the operation, validates the patient lifecycle state and then
//! reads or writes through the encrypting entity types.
//!
mod accounts;
mod patients;
mod purge;
mod records;

pub use accounts::{AccessToken, LoginRequest, LogoutRequest, RefreshRequest, Session, SignupRequest};
pub use patients::BulkReport;
pub use purge::{PurgeReport, PurgeStep};
pub use records::{RecordChange, Upload};

use crate::auth::{Operation, Principal, TokenIssuer};
use crate::config::ClinicConfig;
use crate::encrypt::FieldCipher;
use crate::error::{Error, NotFoundError};
use crate::log::AUDIT;
use crate::model::{Patient, User, VisitRecord};
use crate::storage::AttachmentStore;
use crate::store::{Collection, DocumentStore, MemoryStore, PostgresStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Clinic {
    cipher: FieldCipher,
    tokens: TokenIssuer,
    password_hash_iterations: u32,
    attachments: AttachmentStore,
    patients: Collection<Patient>,
    records: Collection<VisitRecord>,
    users: Collection<User>,
}

impl Clinic {
    pub fn new(config: &ClinicConfig, store: Arc<dyn DocumentStore>) -> Result<Clinic, Error> {
        Ok(Clinic {
            cipher: FieldCipher::new(&config.encrypt)?,
            tokens: TokenIssuer::new(&config.auth),
            password_hash_iterations: config.auth.password_hash_iterations,
            attachments: AttachmentStore::new(&config.storage)?,
            patients: Collection::new(store.clone()),
            records: Collection::new(store.clone()),
            users: Collection::new(store),
        })
    }

    ///
    /// Connect the configured document store and prepare attachment storage.
    /// Without a database section the in-memory store is used.
    ///
    pub async fn init(config: &ClinicConfig) -> Result<Clinic, Error> {
        let store: Arc<dyn DocumentStore> = match &config.database {
            Some(database) => Arc::new(PostgresStore::connect(database).await?),
            None => {
                warn!(msg = "No database configured, records are held in memory and lost on exit");
                Arc::new(MemoryStore::new())
            }
        };

        Clinic::new(config, store)
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    pub fn patients(&self) -> &Collection<Patient> {
        &self.patients
    }

    async fn load_patient(&self, id: Uuid) -> Result<Patient, Error> {
        self.patients
            .find_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError::Patient.into())
    }

    /// Missing and trashed patients are both not found
    async fn load_active_patient(&self, id: Uuid) -> Result<Patient, Error> {
        let patient = self.load_patient(id).await?;
        if !patient.is_active() {
            return Err(NotFoundError::Patient.into());
        }
        Ok(patient)
    }
}

fn audit(principal: &Principal, operation: Operation, patient_id: Option<Uuid>) {
    match patient_id {
        Some(patient_id) => info!(
            target: AUDIT,
            msg = "Patient access",
            user = %principal.id,
            role = %principal.role,
            action = operation.as_str(),
            patient = %patient_id
        ),
        None => info!(
            target: AUDIT,
            msg = "Patient access",
            user = %principal.id,
            role = %principal.role,
            action = operation.as_str()
        ),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::StoreError;
    use crate::model::Role;
    use crate::store::Filter;
    use crate::test_helpers::test_config;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::path::Path;
    use std::sync::Mutex;

    ///
    /// Delegates to a memory store, failing the writes it has been told to fail
    ///
    #[derive(Debug, Default)]
    pub(crate) struct FaultyStore {
        inner: MemoryStore,
        failing_deletes: Mutex<Vec<Uuid>>,
        failing_saves: Mutex<Vec<String>>,
    }

    impl FaultyStore {
        pub(crate) fn fail_delete(&self, id: Uuid) {
            self.failing_deletes.lock().unwrap().push(id);
        }

        pub(crate) fn fail_saves(&self, collection: &str) {
            self.failing_saves.lock().unwrap().push(collection.to_string());
        }
    }

    #[async_trait]
    impl DocumentStore for FaultyStore {
        async fn find_by_id(&self, c: &str, id: Uuid) -> Result<Option<Value>, StoreError> {
            self.inner.find_by_id(c, id).await
        }

        async fn find(&self, c: &str, filter: &Filter) -> Result<Vec<Value>, StoreError> {
            self.inner.find(c, filter).await
        }

        async fn save(&self, c: &str, id: Uuid, document: Value) -> Result<(), StoreError> {
            if self.failing_saves.lock().unwrap().iter().any(|f| f == c) {
                return Err(StoreError::ConnectionTimeout);
            }
            self.inner.save(c, id, document).await
        }

        async fn delete_one(&self, c: &str, id: Uuid) -> Result<bool, StoreError> {
            if self.failing_deletes.lock().unwrap().contains(&id) {
                return Err(StoreError::ConnectionTimeout);
            }
            self.inner.delete_one(c, id).await
        }

        async fn delete_many(&self, c: &str, filter: &Filter) -> Result<u64, StoreError> {
            self.inner.delete_many(c, filter).await
        }

        async fn update_many(
            &self,
            c: &str,
            filter: &Filter,
            set: &Map<String, Value>,
        ) -> Result<u64, StoreError> {
            self.inner.update_many(c, filter, set).await
        }
    }

    pub(crate) async fn clinic(uploads_dir: &Path) -> Clinic {
        clinic_with_store(uploads_dir, Arc::new(MemoryStore::new())).await
    }

    pub(crate) async fn clinic_with_store(
        uploads_dir: &Path,
        store: Arc<dyn DocumentStore>,
    ) -> Clinic {
        let config = test_config(uploads_dir);
        Clinic::new(&config, store).unwrap()
    }

    pub(crate) fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            name: format!("Test {role}"),
            email: format!("{role}@example.com"),
            role,
        }
    }
}
