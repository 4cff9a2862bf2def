mod clinic;
mod database;
mod log;
mod rate_limit;
mod server;
mod storage;

pub use clinic::{AuthConfig, ClinicConfig, EncryptConfig, PrometheusConfig};
pub use database::DatabaseConfig;
pub use log::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use rate_limit::RateLimitConfig;
pub use server::ServerConfig;
pub use storage::{StorageConfig, RECORDS_NAMESPACE, UPLOADS_ROUTE};

pub const CLINIC_PREFIX: &str = "CLINIC";
pub const DEFAULT_CONFIG_FILE_PATH: &str = "clinic-records.toml";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 2000;
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Length in bytes of the AES-256 field encryption key
pub const ENCRYPTION_KEY_LENGTH: usize = 32;
