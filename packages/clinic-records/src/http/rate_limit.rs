//!
//! Fixed window request limit per client address.
//!
use super::error::ApiError;
use super::{client_address, AppState};
use crate::config::RateLimitConfig;
use crate::error::Error;
use crate::log::HTTP;
use crate::prometheus::RATE_LIMITED_REQUESTS_TOTAL;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

pub const RATE_LIMIT_LIMIT: &str = "ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "ratelimit-reset";

// Expired windows are swept once the table grows past this
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: Duration,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> RateLimiter {
        RateLimiter {
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: config.window(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset: self.window.saturating_sub(now.duration_since(entry.started)),
        }
    }
}

fn set_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        RATE_LIMIT_RESET,
        HeaderValue::from(decision.reset.as_secs_f64().ceil() as u64),
    );
}

pub async fn limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.limiter.enabled() {
        return next.run(request).await;
    }

    let client = client_address(&request);
    let decision = state.limiter.check(&client);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        counter!(RATE_LIMITED_REQUESTS_TOTAL).increment(1);
        warn!(target: HTTP, msg = "Rate limit exceeded", client);
        ApiError(Error::RateLimited).into_response()
    };

    set_headers(response.headers_mut(), &decision);
    response
}
