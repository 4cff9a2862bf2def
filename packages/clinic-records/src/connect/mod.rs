use crate::config::{DatabaseConfig, ServerConfig};
use crate::error::{Error, StoreError};
use crate::log::STORE;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_COUNT: u32 = 3;

///
/// Connect to the database, retrying with back-off.
/// Each attempt is bounded by the configured connection timeout.
///
pub async fn database(config: &DatabaseConfig) -> Result<Client, Error> {
    let connection_string = config.to_connection_string();
    let mut retry_count = 0;

    loop {
        debug!(target: STORE, msg = "Connecting to database", retry_count);

        let attempt = time::timeout(
            config.connection_timeout(),
            tokio_postgres::connect(&connection_string, NoTls),
        )
        .await;

        let err = match attempt {
            Ok(Ok((client, connection))) => {
                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        error!(msg = "Database connection error", error = err.to_string());
                    }
                });
                return Ok(client);
            }
            Ok(Err(err)) => StoreError::from(err),
            Err(_) => StoreError::ConnectionTimeout,
        };

        if retry_count >= MAX_RETRY_COUNT {
            error!(
                msg = "Could not connect to database",
                database = config.name,
                host = config.host,
                port = config.port,
                username = config.username,
                retries = retry_count,
                error = err.to_string()
            );
            error!(msg = "Confirm that the database configuration is correct");
            return Err(StoreError::Connection {
                retries: retry_count,
            }
            .into());
        }

        time::sleep(retry_delay(retry_count)).await;
        retry_count += 1;
    }
}

pub async fn bind_with_retry(server: &ServerConfig) -> Result<TcpListener, Error> {
    let address = &server.to_socket_address();
    let mut retry_count = 0;

    loop {
        match TcpListener::bind(address).await {
            Ok(listener) => {
                info!(msg = "Server waiting for connections", address);
                return Ok(listener);
            }
            Err(err) => {
                if retry_count >= MAX_RETRY_COUNT {
                    error!(
                        msg = "Error binding connection",
                        retries = MAX_RETRY_COUNT,
                        error = err.to_string()
                    );
                    return Err(err.into());
                }
            }
        };

        time::sleep(retry_delay(retry_count)).await;
        retry_count += 1;
    }
}

fn retry_delay(retry_count: u32) -> Duration {
    let delay_ms = (100 * 2_u64.pow(retry_count)).min(MAX_RETRY_DELAY.as_millis() as _);
    Duration::from_millis(delay_ms)
}
