pub mod auth;
pub mod cli;
pub mod clinic;
pub mod config;
pub mod connect;
pub mod encrypt;
pub mod error;
pub mod http;
pub mod log;
pub mod model;
pub mod prometheus;
pub mod storage;
pub mod store;

pub use crate::cli::Args;
pub use crate::clinic::Clinic;
pub use crate::config::{ClinicConfig, DatabaseConfig, ServerConfig};
pub use crate::encrypt::{DecryptResult, FieldCipher};
pub use crate::log::init;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub mod test_helpers;
