mod migrate;

use crate::{
    config::{ClinicConfig, LogConfig, LogFormat, LogLevel, DEFAULT_CONFIG_FILE_PATH},
    error::Error,
    log::MIGRATE,
};
use clap::{Parser, Subcommand};
use tracing::debug;

pub use migrate::{EncryptLegacy, MigrationReport};

#[derive(Clone, Debug, Parser)]
#[command(version, about, verbatim_doc_comment)]
///
/// Clinic Records
///
/// Clinic records backend. Staff accounts, patient demographics encrypted at rest, trash and restore, and visit records with attachments.
///
pub struct Args {
    /// Optional path to a Clinic Records configuration file.
    ///
    /// Default is "clinic-records.toml".
    /// Configuration is loaded from this file, if present.
    /// Environment variables are used instead of the file or to override any values defined in the file.
    #[arg(short = 'p', long, default_value = DEFAULT_CONFIG_FILE_PATH, verbatim_doc_comment, global = true)]
    pub config_file_path: String,

    ///
    /// Optional log level.
    ///
    #[arg(short, long, value_enum, default_value_t = LogConfig::default_log_level(), env = "CLINIC_LOG__LEVEL", global = true)]
    pub log_level: LogLevel,

    ///
    /// Optional log format. Default level is "pretty" if running in a terminal session, otherwise "structured".
    ///
    #[arg(short='f', long, value_enum, default_value_t = LogConfig::default_log_format(), env = "CLINIC_LOG__FORMAT", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    EncryptLegacy(EncryptLegacy),
}

///
/// Runs command specified in command line
/// Returns Ok(true) if the caller should exit
///
pub async fn run(args: Args, config: ClinicConfig) -> Result<bool, Error> {
    match args.command {
        Some(Commands::EncryptLegacy(migrate)) => {
            debug!(target: MIGRATE, ?migrate);
            migrate.run(&config).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
