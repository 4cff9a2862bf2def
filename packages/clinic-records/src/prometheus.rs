use crate::error::Error;
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{debug, info};

// See https://prometheus.io/docs/practices/naming/
pub const ENCRYPTED_VALUES_TOTAL: &str = "clinic_records_encrypted_values_total";
pub const ENCRYPTION_ERROR_TOTAL: &str = "clinic_records_encryption_error_total";

pub const DECRYPTED_VALUES_TOTAL: &str = "clinic_records_decrypted_values_total";
pub const DECRYPTION_FALLBACK_TOTAL: &str = "clinic_records_decryption_fallback_total";

pub const AUTHENTICATION_FAILURES_TOTAL: &str = "clinic_records_authentication_failures_total";
pub const RATE_LIMITED_REQUESTS_TOTAL: &str = "clinic_records_rate_limited_requests_total";
pub const REQUESTS_TOTAL: &str = "clinic_records_requests_total";

pub const ATTACHMENTS_STORED_TOTAL: &str = "clinic_records_attachments_stored_total";
pub const ATTACHMENTS_REMOVED_TOTAL: &str = "clinic_records_attachments_removed_total";
pub const ATTACHMENT_BYTES_STORED_TOTAL: &str = "clinic_records_attachment_bytes_stored_total";

pub const PATIENTS_PURGED_TOTAL: &str = "clinic_records_patients_purged_total";
pub const PURGE_ROLLBACKS_TOTAL: &str = "clinic_records_purge_rollbacks_total";

pub fn start(host: String, port: u16) -> Result<(), Error> {
    let address = format!("{}:{}", host, port);
    let socket_address: SocketAddr = address.parse().map_err(|_| {
        crate::error::ConfigError::InvalidServerAddress {
            address: address.to_owned(),
        }
    })?;

    debug!(msg = "Starting Prometheus exporter", port);

    PrometheusBuilder::new()
        .with_http_listener(socket_address)
        .install()?;

    describe_counter!(ENCRYPTED_VALUES_TOTAL, "Number of encrypted field values");
    describe_counter!(ENCRYPTION_ERROR_TOTAL, "Number of field encryption errors");
    describe_counter!(DECRYPTED_VALUES_TOTAL, "Number of decrypted field values");
    describe_counter!(
        DECRYPTION_FALLBACK_TOTAL,
        "Number of field values returned raw because they could not be decrypted"
    );

    describe_counter!(
        AUTHENTICATION_FAILURES_TOTAL,
        "Number of rejected credentials"
    );
    describe_counter!(
        RATE_LIMITED_REQUESTS_TOTAL,
        "Number of requests rejected by the rate limiter"
    );
    describe_counter!(REQUESTS_TOTAL, "Number of API requests");

    describe_counter!(ATTACHMENTS_STORED_TOTAL, "Number of attachments written");
    describe_counter!(ATTACHMENTS_REMOVED_TOTAL, "Number of attachments removed");
    describe_counter!(
        ATTACHMENT_BYTES_STORED_TOTAL,
        Unit::Bytes,
        "Number of attachment bytes written"
    );

    describe_counter!(PATIENTS_PURGED_TOTAL, "Number of permanently deleted patients");
    describe_counter!(
        PURGE_ROLLBACKS_TOTAL,
        "Number of permanent deletes rolled back after a partial failure"
    );

    // Prometheus endpoint is empty on startup and looks like an error
    // Explicitly set count to zero
    counter!(REQUESTS_TOTAL).absolute(0);

    info!(msg = "Prometheus exporter started", port);
    Ok(())
}
