#![allow(dead_code)]

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use clinic_records::config::ClinicConfig;
use clinic_records::http::{self, AppState};
use clinic_records::Clinic;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_CONFIG: &str = "tests/config/clinic-records-test.toml";
pub const BOUNDARY: &str = "X-CLINIC-TEST-BOUNDARY";

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub clinic: Arc<Clinic>,
    pub uploads: TempDir,
}

pub fn config(uploads: &TempDir) -> ClinicConfig {
    let mut config = ClinicConfig::build(TEST_CONFIG).unwrap();
    config.storage.uploads_dir = uploads.path().to_string_lossy().to_string();
    config
}

impl TestApp {
    pub async fn new() -> TestApp {
        TestApp::with_config(|_| {}).await
    }

    pub async fn with_config(f: impl FnOnce(&mut ClinicConfig)) -> TestApp {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = config(&uploads);
        f(&mut config);

        let clinic = Clinic::init(&config).await.unwrap();
        let state = AppState::new(clinic, &config);
        let clinic = state.clinic.clone();
        let router = http::router(state, &config).unwrap();

        TestApp {
            router,
            clinic,
            uploads,
        }
    }

    pub fn records_dir(&self) -> PathBuf {
        self.uploads.path().join("records")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };

        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };

        self.send(request.unwrap()).await
    }

    /// Sends `body` as is with a JSON content type
    pub async fn raw(&self, method: Method, uri: &str, token: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        parts: &[Part<'_>],
    ) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();

        self.send(request).await
    }

    /// Signs up a user with the role and returns the access token
    pub async fn signup(&self, role: &str) -> String {
        let email = format!("{role}-{}@example.com", uuid::Uuid::new_v4());

        let response = self
            .request(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(json!({
                    "name": format!("Test {role}"),
                    "email": email,
                    "password": "correct-horse",
                    "role": role
                })),
            )
            .await;

        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["accessToken"].as_str().unwrap().to_string()
    }

    /// Creates a patient and returns its id
    pub async fn create_patient(&self, token: &str, name: &str) -> String {
        let response = self
            .post(
                "/api/patients",
                token,
                json!({ "name": name, "age": 42, "email": "patient@example.com" }),
            )
            .await;

        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["_id"].as_str().unwrap().to_string()
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> String {
    let mut body = String::new();

    for part in parts {
        match part {
            Part::Text(name, value) => body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )),
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n{bytes}\r\n"
            )),
        }
    }

    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}
