use crate::encrypt::FieldCipher;
use crate::error::{EncryptError, Error, NotFoundError};
use crate::store::Document;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

pub const MAX_AGE: i64 = 120;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9+\-() ]*$").unwrap());

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    #[serde(alias = "Not specified")]
    Other,
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" | "Not specified" => Ok(Gender::Other),
            _ => Err(Error::validation(
                "Gender must be male, female, other, or Not specified",
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Trashed,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Trashed => write!(f, "trashed"),
        }
    }
}

///
/// Stored patient document.
///
/// `name`, `age` and `email` hold cipher tokens. Documents written before
/// field encryption may hold plaintext, including a numeric `age`.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub age: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Patient {
    const COLLECTION: &'static str = "patients";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Patient {
    pub fn new(input: NewPatient, cipher: &FieldCipher) -> Result<Patient, EncryptError> {
        let now = Utc::now();
        Ok(Patient {
            id: Uuid::new_v4(),
            name: cipher.encrypt(&input.name)?,
            age: cipher.encrypt(&input.age.to_string())?,
            email: cipher.encrypt(&input.email)?,
            gender: input.gender,
            phone: input.phone,
            address: input.address,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn state(&self) -> LifecycleState {
        if self.is_deleted {
            LifecycleState::Trashed
        } else {
            LifecycleState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Active -> Trashed
    pub fn soft_delete(&mut self) -> Result<(), NotFoundError> {
        match self.state() {
            LifecycleState::Active => {
                self.is_deleted = true;
                self.updated_at = Utc::now();
                Ok(())
            }
            LifecycleState::Trashed => Err(NotFoundError::Patient),
        }
    }

    /// Trashed -> Active
    pub fn restore(&mut self) -> Result<(), NotFoundError> {
        match self.state() {
            LifecycleState::Trashed => {
                self.is_deleted = false;
                self.updated_at = Utc::now();
                Ok(())
            }
            LifecycleState::Active => Err(NotFoundError::PatientNotInTrash),
        }
    }

    ///
    /// Apply an edit and return the names of the fields that changed.
    ///
    /// Encrypted fields are compared against their decrypted value and only
    /// re-encrypted when the plaintext differs. Lifecycle state is untouched.
    ///
    pub fn apply(
        &mut self,
        update: PatientUpdate,
        cipher: &FieldCipher,
    ) -> Result<Vec<&'static str>, EncryptError> {
        let mut changed = Vec::new();

        if let Some(name) = update.name {
            if reencrypt(&mut self.name, &name, cipher)? {
                changed.push("name");
            }
        }

        if let Some(age) = update.age {
            if reencrypt(&mut self.age, &age.to_string(), cipher)? {
                changed.push("age");
            }
        }

        if let Some(email) = update.email {
            if reencrypt(&mut self.email, &email, cipher)? {
                changed.push("email");
            }
        }

        if let Some(gender) = update.gender {
            if self.gender != gender {
                self.gender = gender;
                changed.push("gender");
            }
        }

        if let Some(phone) = update.phone {
            if self.phone != phone {
                self.phone = phone;
                changed.push("phone");
            }
        }

        if let Some(address) = update.address {
            if self.address != address {
                self.address = address;
                changed.push("address");
            }
        }

        if !changed.is_empty() {
            self.updated_at = Utc::now();
        }

        Ok(changed)
    }

    ///
    /// Encrypt fields still holding pre-encryption plaintext.
    /// Returns the names of the fields that were encrypted.
    ///
    pub fn encrypt_legacy(&mut self, cipher: &FieldCipher) -> Result<Vec<&'static str>, EncryptError> {
        let mut encrypted = Vec::new();

        for (field, value) in [
            ("name", &mut self.name),
            ("age", &mut self.age),
            ("email", &mut self.email),
        ] {
            let result = cipher.decrypt(value);
            if result.is_unencrypted() {
                *value = cipher.encrypt(result.value())?;
                encrypted.push(field);
            }
        }

        if !encrypted.is_empty() {
            self.updated_at = Utc::now();
        }

        Ok(encrypted)
    }

    ///
    /// Decrypted projection returned to callers.
    /// Values that cannot be decrypted are returned as stored.
    ///
    pub fn view(&self, cipher: &FieldCipher) -> PatientView {
        let age = cipher.decrypt(&self.age).into_value();
        let age = match age.trim().parse::<i64>() {
            Ok(years) => AgeView::Years(years),
            Err(_) => AgeView::Raw(age),
        };

        PatientView {
            id: self.id,
            name: cipher.decrypt(&self.name).into_value(),
            age,
            email: cipher.decrypt(&self.email).into_value(),
            gender: self.gender,
            phone: self.phone.clone(),
            address: self.address.clone(),
            is_deleted: self.is_deleted,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn reencrypt(stored: &mut String, plaintext: &str, cipher: &FieldCipher) -> Result<bool, EncryptError> {
    if cipher.decrypt(stored).value() == plaintext {
        return Ok(false);
    }
    *stored = cipher.encrypt(plaintext)?;
    Ok(true)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match AgeInput::deserialize(deserializer)? {
        AgeInput::Number(n) => Ok(n.to_string()),
        AgeInput::Text(s) => Ok(s),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgeView {
    Years(i64),
    Raw(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub age: AgeView,
    pub email: String,
    pub gender: Gender,
    pub phone: String,
    pub address: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AgeInput {
    Number(serde_json::Number),
    Text(String),
}

///
/// Patient fields as submitted by a caller.
/// Validated into a [`NewPatient`] or a [`PatientUpdate`].
///
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PatientRequest {
    pub name: Option<String>,
    pub age: Option<AgeInput>,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub age: u8,
    pub email: String,
    pub gender: Gender,
    pub phone: String,
    pub address: String,
}

/// Only fields present in the request are set
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatientUpdate {
    pub name: Option<String>,
    pub age: Option<u8>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl PatientRequest {
    pub fn validate(self) -> Result<NewPatient, Error> {
        let name = validate_name(self.name.as_deref().unwrap_or_default())?;
        let age = match &self.age {
            Some(age) => validate_age(age)?,
            None => return Err(Error::validation("Age is required")),
        };

        Ok(NewPatient {
            name,
            age,
            email: validate_email(self.email.as_deref())?,
            gender: validate_gender(self.gender.as_deref())?.unwrap_or_default(),
            phone: validate_phone(self.phone.as_deref())?,
            address: trimmed(self.address.as_deref()),
        })
    }

    pub fn validate_update(self) -> Result<PatientUpdate, Error> {
        Ok(PatientUpdate {
            name: self.name.as_deref().map(validate_name).transpose()?,
            age: self.age.as_ref().map(validate_age).transpose()?,
            email: match self.email.as_deref() {
                Some(email) => Some(validate_email(Some(email))?),
                None => None,
            },
            gender: validate_gender(self.gender.as_deref())?,
            phone: match self.phone.as_deref() {
                Some(phone) => Some(validate_phone(Some(phone))?),
                None => None,
            },
            address: self.address.as_deref().map(|a| a.trim().to_string()),
        })
    }
}

fn trimmed(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Name is required"));
    }
    Ok(name.to_string())
}

fn validate_age(age: &AgeInput) -> Result<u8, Error> {
    let out_of_range = || Error::validation("Age must be a number between 0 and 120");

    let years = match age {
        AgeInput::Number(n) => n.as_i64().ok_or_else(out_of_range)?,
        AgeInput::Text(s) if s.trim().is_empty() => {
            return Err(Error::validation("Age is required"))
        }
        AgeInput::Text(s) => s.trim().parse::<i64>().map_err(|_| out_of_range())?,
    };

    if !(0..=MAX_AGE).contains(&years) {
        return Err(out_of_range());
    }

    u8::try_from(years).map_err(|_| out_of_range())
}

fn validate_email(email: Option<&str>) -> Result<String, Error> {
    let email = trimmed(email);
    if email.is_empty() {
        return Ok(email);
    }
    if !EMAIL.is_match(&email) {
        return Err(Error::validation("Invalid email address"));
    }
    Ok(email.to_lowercase())
}

fn validate_gender(gender: Option<&str>) -> Result<Option<Gender>, Error> {
    match gender.map(str::trim) {
        None | Some("") => Ok(None),
        Some(gender) => gender.parse().map(Some),
    }
}

fn validate_phone(phone: Option<&str>) -> Result<String, Error> {
    let phone = trimmed(phone);
    if !PHONE.is_match(&phone) {
        return Err(Error::validation("Phone contains invalid characters"));
    }
    Ok(phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptConfig;
    use serde_json::json;

    fn cipher() -> FieldCipher {
        FieldCipher::new(&EncryptConfig {
            key: "test-encryption-key-0123456789ab".to_string(),
        })
        .unwrap()
    }

    fn request(value: serde_json::Value) -> PatientRequest {
        serde_json::from_value(value).unwrap()
    }

    fn validation_message(err: Error) -> String {
        match err {
            Error::Validation(message) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn jane() -> NewPatient {
        request(json!({ "name": " Jane Doe ", "age": 34 }))
            .validate()
            .unwrap()
    }

    #[test]
    fn new_patient_defaults() {
        let patient = jane();
        assert_eq!(patient.name, "Jane Doe");
        assert_eq!(patient.age, 34);
        assert_eq!(patient.email, "");
        assert_eq!(patient.gender, Gender::Other);
    }

    #[test]
    fn age_accepts_number_or_numeric_string() {
        let patient = request(json!({ "name": "A", "age": "7" })).validate().unwrap();
        assert_eq!(patient.age, 7);

        let patient = request(json!({ "name": "A", "age": 0 })).validate().unwrap();
        assert_eq!(patient.age, 0);

        for age in [json!(121), json!(-1), json!(3.5), json!("old")] {
            let err = request(json!({ "name": "A", "age": age })).validate().unwrap_err();
            assert_eq!(
                validation_message(err),
                "Age must be a number between 0 and 120"
            );
        }
    }

    #[test]
    fn required_fields_are_reported() {
        let err = request(json!({ "age": 3 })).validate().unwrap_err();
        assert_eq!(validation_message(err), "Name is required");

        let err = request(json!({ "name": "   ", "age": 3 })).validate().unwrap_err();
        assert_eq!(validation_message(err), "Name is required");

        let err = request(json!({ "name": "A" })).validate().unwrap_err();
        assert_eq!(validation_message(err), "Age is required");

        let err = request(json!({ "name": "A", "age": "" })).validate().unwrap_err();
        assert_eq!(validation_message(err), "Age is required");
    }

    #[test]
    fn optional_fields_are_validated() {
        let patient = request(json!({
            "name": "A",
            "age": 3,
            "email": "Jane@Example.COM",
            "gender": "Not specified",
            "phone": "+1 (555) 010-0000",
            "address": " 1 Main St "
        }))
        .validate()
        .unwrap();

        assert_eq!(patient.email, "jane@example.com");
        assert_eq!(patient.gender, Gender::Other);
        assert_eq!(patient.phone, "+1 (555) 010-0000");
        assert_eq!(patient.address, "1 Main St");

        let err = request(json!({ "name": "A", "age": 3, "email": "nope" }))
            .validate()
            .unwrap_err();
        assert_eq!(validation_message(err), "Invalid email address");

        let err = request(json!({ "name": "A", "age": 3, "gender": "unknown" }))
            .validate()
            .unwrap_err();
        assert_eq!(
            validation_message(err),
            "Gender must be male, female, other, or Not specified"
        );

        let err = request(json!({ "name": "A", "age": 3, "phone": "call me" }))
            .validate()
            .unwrap_err();
        assert_eq!(validation_message(err), "Phone contains invalid characters");
    }

    #[test]
    fn stored_fields_are_encrypted_and_view_decrypts() {
        let cipher = cipher();
        let patient = Patient::new(jane(), &cipher).unwrap();

        let token = Regex::new(r"^[0-9a-f]{32}:[0-9a-f]+$").unwrap();
        assert!(token.is_match(&patient.name));
        assert!(token.is_match(&patient.age));
        assert_eq!(patient.email, "");

        let view = patient.view(&cipher);
        assert_eq!(view.name, "Jane Doe");
        assert_eq!(view.age, AgeView::Years(34));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "Jane Doe");
        assert_eq!(json["age"], 34);
        assert_eq!(json["isDeleted"], false);
        assert!(json.get("_id").is_some());
    }

    #[test]
    fn legacy_plaintext_document_is_readable() {
        let cipher = cipher();
        let patient: Patient = serde_json::from_value(json!({
            "_id": Uuid::new_v4(),
            "name": "Legacy Larry",
            "age": 61,
            "email": "larry@example.com",
            "gender": "Not specified",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(patient.age, "61");
        assert_eq!(patient.gender, Gender::Other);

        let view = patient.view(&cipher);
        assert_eq!(view.name, "Legacy Larry");
        assert_eq!(view.age, AgeView::Years(61));
        assert_eq!(view.email, "larry@example.com");
    }

    #[test]
    fn undecryptable_age_is_shown_raw() {
        let cipher = cipher();
        let mut patient = Patient::new(jane(), &cipher).unwrap();
        patient.age = "abcd:ef".to_string();

        assert_eq!(patient.view(&cipher).age, AgeView::Raw("abcd:ef".to_string()));
    }

    #[test]
    fn update_only_reencrypts_changed_fields() {
        let cipher = cipher();
        let mut patient = Patient::new(jane(), &cipher).unwrap();
        let (name, age) = (patient.name.clone(), patient.age.clone());

        let update = request(json!({ "name": "Jane Doe", "age": 35, "phone": "123" }))
            .validate_update()
            .unwrap();
        let changed = patient.apply(update, &cipher).unwrap();

        assert_eq!(changed, vec!["age", "phone"]);
        assert_eq!(patient.name, name);
        assert_ne!(patient.age, age);
        assert_eq!(patient.view(&cipher).age, AgeView::Years(35));
    }

    #[test]
    fn empty_update_changes_nothing() {
        let cipher = cipher();
        let mut patient = Patient::new(jane(), &cipher).unwrap();
        let updated_at = patient.updated_at;

        let changed = patient
            .apply(PatientRequest::default().validate_update().unwrap(), &cipher)
            .unwrap();

        assert!(changed.is_empty());
        assert_eq!(patient.updated_at, updated_at);
    }

    #[test]
    fn update_rejects_blank_name() {
        let err = request(json!({ "name": "" })).validate_update().unwrap_err();
        assert_eq!(validation_message(err), "Name is required");
    }

    #[test]
    fn lifecycle_transitions() {
        let cipher = cipher();
        let mut patient = Patient::new(jane(), &cipher).unwrap();
        assert_eq!(patient.state(), LifecycleState::Active);

        assert_eq!(patient.restore(), Err(NotFoundError::PatientNotInTrash));

        patient.soft_delete().unwrap();
        assert_eq!(patient.state(), LifecycleState::Trashed);
        assert_eq!(patient.soft_delete(), Err(NotFoundError::Patient));

        patient.restore().unwrap();
        assert!(patient.is_active());
    }

    #[test]
    fn legacy_fields_are_encrypted_once() {
        let cipher = cipher();
        let mut patient = Patient::new(jane(), &cipher).unwrap();
        patient.name = "Plain Name".to_string();

        assert_eq!(patient.encrypt_legacy(&cipher).unwrap(), vec!["name"]);
        assert!(patient.encrypt_legacy(&cipher).unwrap().is_empty());
        assert_eq!(patient.view(&cipher).name, "Plain Name");
    }
}
