use clap::Parser;
use clinic_records::config::ClinicConfig;
use clinic_records::http::{self, AppState};
use clinic_records::{cli, connect, log, prometheus, Args, Clinic, VERSION};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

fn main() {
    let args = Args::parse();

    let config = match ClinicConfig::load(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration Error: {}", err);
            std::process::exit(exitcode::CONFIG);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Could not start runtime: {}", err);
            std::process::exit(exitcode::OSERR);
        }
    };

    runtime.block_on(async move {
        log::init(config.log.clone());

        match cli::run(args, config.clone()).await {
            Ok(true) => std::process::exit(exitcode::OK),
            Ok(false) => {}
            Err(err) => {
                error!(msg = "Command failed", error = err.to_string());
                std::process::exit(exitcode::SOFTWARE);
            }
        }

        let shutdown_timeout = config.server.shutdown_timeout();

        let clinic = init(&config).await;
        let state = AppState::new(clinic, &config);

        let router = match http::router(state, &config) {
            Ok(router) => router,
            Err(err) => {
                error!(msg = "Could not start Clinic Records", error = err.to_string());
                std::process::exit(exitcode::CONFIG);
            }
        };

        let listener = match connect::bind_with_retry(&config.server).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(msg = "Could not bind listener", error = err.to_string());
                std::process::exit(exitcode::UNAVAILABLE);
            }
        };

        info!(
            msg = "Clinic Records listening",
            version = VERSION,
            address = config.server.to_socket_address()
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(http::serve(listener, router, async move {
            let _ = shutdown_rx.await;
        }));

        tokio::select! {
            _ = sigint() => {
                info!(msg = "Received SIGINT");
            },
            _ = sigterm() => {
                info!(msg = "Received SIGTERM");
            },
        }

        info!(msg = "Shutting down Clinic Records");
        let _ = shutdown_tx.send(());

        info!(msg = "Waiting for requests");

        match tokio::time::timeout(shutdown_timeout, server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => error!(msg = "Server error", error = err.to_string()),
            Ok(Err(err)) => error!(msg = "Server task failed", error = err.to_string()),
            Err(_) => warn!(msg = "Terminated in-flight requests after shutdown timeout"),
        }
    });
}

///
/// Validate configuration and init the Clinic service
///
async fn init(config: &ClinicConfig) -> Clinic {
    if !config.rate_limit.enabled {
        warn!(msg = "Rate limiting is not enabled");
    }

    if config.prometheus_enabled() {
        if let Err(err) = prometheus::start(config.server.host.to_owned(), config.prometheus.port) {
            error!(msg = "Could not start Prometheus exporter", error = err.to_string());
            std::process::exit(exitcode::CONFIG);
        }
    }

    match Clinic::init(config).await {
        Ok(clinic) => {
            match &config.database {
                Some(database) => info!(
                    msg = "Database connected",
                    database = database.name,
                    host = database.host,
                    port = database.port,
                ),
                None => info!(msg = "Using in-memory document store"),
            }
            info!(msg = "Attachment storage ready", uploads_dir = config.storage.uploads_dir);
            clinic
        }
        Err(err) => {
            error!(msg = "Could not start Clinic Records", error = err.to_string());
            std::process::exit(exitcode::UNAVAILABLE);
        }
    }
}

async fn sigint() -> std::io::Result<()> {
    signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}

async fn sigterm() -> std::io::Result<()> {
    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}
