//!
//! HTTP surface.
//!
//! Handlers are thin. They extract the principal and request, then call the
//! [`Clinic`] operation and map the result to a status and JSON body.
//!
mod auth;
pub mod error;
mod extract;
mod patients;
pub mod rate_limit;
mod records;

pub use error::{ApiError, Message};
pub use extract::{Authenticated, JsonBody, RecordForm};
pub use rate_limit::RateLimiter;

use crate::clinic::Clinic;
use crate::config::{ClinicConfig, UPLOADS_ROUTE};
use crate::error::{ConfigError, Error};
use crate::log::HTTP;
use crate::prometheus::REQUESTS_TOTAL;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use metrics::counter;
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Debug)]
pub struct AppState {
    pub clinic: Arc<Clinic>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(clinic: Clinic, config: &ClinicConfig) -> AppState {
        AppState {
            clinic: Arc::new(clinic),
            limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
        }
    }
}

pub fn router(state: AppState, config: &ClinicConfig) -> Result<Router, Error> {
    let api = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh-token", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/patients", get(patients::list).post(patients::create))
        .route("/api/patients/trash/all", get(patients::trash))
        .route("/api/patients/restore", put(patients::bulk_restore))
        .route(
            "/api/patients/permanent",
            delete(patients::bulk_purge),
        )
        .route(
            "/api/patients/:id",
            get(patients::get)
                .put(patients::update)
                .delete(patients::soft_delete),
        )
        .route("/api/patients/:id/restore", put(patients::restore))
        .route(
            "/api/patients/:id/permanent",
            delete(patients::purge),
        )
        .route(
            "/api/patients/:id/records",
            get(records::list).post(records::add),
        )
        .route(
            "/api/patients/:id/records/:record_id",
            get(records::get).put(records::update).delete(records::delete),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit,
        ));

    let router = api
        .nest_service(UPLOADS_ROUTE, ServeDir::new(config.storage.uploads_dir()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(config.storage.max_upload_size))
        .layer(middleware::from_fn(log_request))
        .layer(cors(config)?)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state);

    Ok(router)
}

///
/// Serve until `shutdown` resolves.
/// The client address is made available to the rate limiter and request log.
///
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

fn cors(config: &ClinicConfig) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(&config.server.cors_origin).map_err(|_| {
        ConfigError::InvalidParameter {
            name: "server.cors_origin".to_string(),
            value: config.server.cors_origin.to_string(),
        }
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

pub(crate) fn client_address(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client = client_address(&request);

    let response = next.run(request).await;

    counter!(REQUESTS_TOTAL).increment(1);
    info!(
        target: HTTP,
        msg = "Request",
        method = %method,
        path,
        client,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64
    );

    response
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Message::new(error::ENDPOINT_NOT_FOUND)),
    )
        .into_response()
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(target: HTTP, msg = "Handler panicked", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Message::new(error::SERVER_ERROR)),
    )
        .into_response()
}
