mod patient;
mod record;
mod user;

pub use patient::{
    AgeInput, AgeView, Gender, LifecycleState, NewPatient, Patient, PatientRequest, PatientUpdate,
    PatientView, MAX_AGE,
};
pub use record::{Attachment, RecordFields, VisitRecord, DEFAULT_MIME_TYPE};
pub use user::{Role, User, UserView};
