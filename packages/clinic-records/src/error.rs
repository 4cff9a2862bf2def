use crate::clinic::PurgeStep;
use crate::model::Role;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Encrypt(#[from] EncryptError),

    #[error("Role ({role}) not authorized to access this resource")]
    Forbidden { role: Role },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Purge(#[from] PurgeError),

    #[error("Too many requests from this IP, please try again later.")]
    RateLimited,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value {value} for configuration field {name}")]
    InvalidParameter { name: String, value: String },

    #[error("Server address {address} is not a valid socket address")]
    InvalidServerAddress { address: String },

    #[error("Missing field {name} from configuration file or environment")]
    MissingParameter { name: String },

    #[error(transparent)]
    FileOrEnvironment(#[from] config::ConfigError),
}

///
/// Credential failures.
/// Every variant is reported to callers as unauthorized, the message carries the reason.
///
#[derive(Error, Debug, PartialEq)]
pub enum AuthenticationError {
    #[error("Access token expired")]
    ExpiredToken,

    #[error("Token not provided")]
    EmptyToken,

    #[error("Not authorized, token invalid")]
    InvalidToken,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Refresh token expired or invalid")]
    InvalidRefreshToken,

    #[error("Not authorized, malformed authorization header")]
    MalformedHeader,

    #[error("Refresh token required")]
    MissingRefreshToken,

    #[error("Not authorized, token missing")]
    MissingToken,

    #[error("User not found")]
    UnknownPrincipal,
}

#[derive(Error, Debug, PartialEq)]
pub enum NotFoundError {
    #[error("Patient not found")]
    Patient,

    #[error("Patient not found in Trash")]
    PatientNotInTrash,

    #[error("Record not found")]
    Record,

    #[error("User not found")]
    User,
}

#[derive(Error, Debug)]
pub enum EncryptError {
    #[error("Encryption key could not be initialised")]
    InvalidKey,

    #[error("Value could not be encrypted")]
    EncryptionFailed,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid attachment name {name}")]
    InvalidName { name: String },

    #[error("Attachment directory {dir} could not be opened")]
    Root {
        dir: String,
        #[source]
        source: strict_path::StrictPathError,
    },

    #[error("Attachment {name} could not be removed")]
    Remove {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Attachment {name} could not be written")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Error connecting to database after {retries} retries")]
    Connection { retries: u32 },

    #[error("Database connection timed out")]
    ConnectionTimeout,

    #[error(transparent)]
    Database(#[from] tokio_postgres::Error),

    #[error("Document in collection {collection} is missing an id")]
    MissingId { collection: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Purge of patient {patient_id} failed at step {step}, rolled back: {rolled_back}")]
    Failed {
        patient_id: Uuid,
        step: PurgeStep,
        rolled_back: bool,
        #[source]
        source: Box<Error>,
    },
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Error::Store(e.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(e.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.into())
    }
}

impl From<aws_lc_rs::error::Unspecified> for EncryptError {
    fn from(_: aws_lc_rs::error::Unspecified) -> Self {
        EncryptError::EncryptionFailed
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}
