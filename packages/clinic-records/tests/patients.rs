mod common;

use axum::http::{Method, StatusCode};
use clinic_records::DecryptResult;
use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn demographics_are_encrypted_at_rest() {
    let app = TestApp::new().await;
    let nurse = app.signup("nurse").await;

    let id = app.create_patient(&nurse, "Jane Doe").await;

    let fetched = app.get(&format!("/api/patients/{id}"), &nurse).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["name"], "Jane Doe");
    assert_eq!(fetched.body["age"], 42);
    assert_eq!(fetched.body["email"], "patient@example.com");
    assert_eq!(fetched.body["gender"], "other");
    assert_eq!(fetched.body["isDeleted"], false);

    let stored = app
        .clinic
        .patients()
        .find_by_id(id.parse::<Uuid>().unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_ne!(stored.name, "Jane Doe");
    assert!(stored.name.contains(':'));
    assert_eq!(
        app.clinic.cipher().decrypt(&stored.name),
        DecryptResult::Decrypted("Jane Doe".to_string())
    );
}

#[tokio::test]
async fn validation_errors_are_bad_requests() {
    let app = TestApp::new().await;
    let nurse = app.signup("nurse").await;

    let cases = [
        (json!({ "age": 30 }), "Name is required"),
        (json!({ "name": "A" }), "Age is required"),
        (json!({ "name": "A", "age": 121 }), "Age must be a number between 0 and 120"),
        (json!({ "name": "A", "age": "abc" }), "Age must be a number between 0 and 120"),
        (json!({ "name": "A", "age": 3, "email": "nope" }), "Invalid email address"),
        (json!({ "name": "A", "age": 3, "phone": "555-CALL" }), "Phone contains invalid characters"),
    ];

    for (body, message) in cases {
        let response = app.post("/api/patients", &nurse, body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["message"], message);
    }

    assert_eq!(app.get("/api/patients", &nurse).await.body, json!([]));
}

#[tokio::test]
async fn trash_restore_and_purge() {
    let app = TestApp::new().await;
    let admin = app.signup("admin").await;
    let nurse = app.signup("nurse").await;

    let id = app.create_patient(&nurse, "Jane Doe").await;

    let trashed = app.delete(&format!("/api/patients/{id}"), &nurse).await;
    assert_eq!(trashed.status, StatusCode::OK);
    assert_eq!(trashed.body["message"], "Patient moved to Trash");
    assert_eq!(trashed.body["patient"]["isDeleted"], true);

    assert_eq!(app.get("/api/patients", &nurse).await.body, json!([]));
    assert_eq!(
        app.get(&format!("/api/patients/{id}"), &nurse).await.status,
        StatusCode::NOT_FOUND
    );

    // nurses cannot see the trash
    assert_eq!(
        app.get("/api/patients/trash/all", &nurse).await.status,
        StatusCode::FORBIDDEN
    );

    let trash = app.get("/api/patients/trash/all", &admin).await;
    assert_eq!(trash.body.as_array().unwrap().len(), 1);
    assert_eq!(trash.body[0]["name"], "Jane Doe");

    let restored = app
        .request(Method::PUT, &format!("/api/patients/{id}/restore"), Some(&admin), None)
        .await;
    assert_eq!(restored.status, StatusCode::OK);
    assert_eq!(restored.body["message"], "Patient restored successfully");

    // an active patient cannot be purged
    let refused = app.delete(&format!("/api/patients/{id}/permanent"), &admin).await;
    assert_eq!(refused.status, StatusCode::NOT_FOUND);
    assert_eq!(refused.body["message"], "Patient not found in Trash");

    app.delete(&format!("/api/patients/{id}"), &nurse).await;
    let purged = app.delete(&format!("/api/patients/{id}/permanent"), &admin).await;
    assert_eq!(purged.status, StatusCode::OK);
    assert_eq!(purged.body["message"], "Patient permanently deleted");

    assert_eq!(app.get("/api/patients/trash/all", &admin).await.body, json!([]));
    assert_eq!(
        app.request(Method::PUT, &format!("/api/patients/{id}/restore"), Some(&admin), None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn roles_are_enforced() {
    let app = TestApp::new().await;
    let nurse = app.signup("nurse").await;
    let doctor = app.signup("doctor").await;

    let id = app.create_patient(&nurse, "Jane Doe").await;
    let uri = format!("/api/patients/{id}");

    let forbidden = app.put(&uri, &nurse, json!({ "name": "Changed" })).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(
        forbidden.body["message"],
        "Role (nurse) not authorized to access this resource"
    );

    // the role is checked before the body is read
    let malformed = app.raw(Method::PUT, &uri, &nurse, "{ not json").await;
    assert_eq!(malformed.status, StatusCode::FORBIDDEN);
    let malformed = app
        .raw(Method::PUT, "/api/patients/restore", &doctor, "{ not json")
        .await;
    assert_eq!(malformed.status, StatusCode::FORBIDDEN);

    let malformed = app.raw(Method::PUT, &uri, &doctor, "{ not json").await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let updated = app.put(&uri, &doctor, json!({ "name": "Jane Smith", "age": "43" })).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Jane Smith");
    assert_eq!(updated.body["age"], 43);
    assert_eq!(updated.body["email"], "patient@example.com");

    app.delete(&uri, &doctor).await;
    assert_eq!(
        app.request(Method::PUT, &format!("{uri}/restore"), Some(&doctor), None)
            .await
            .status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        app.delete(&format!("{uri}/permanent"), &doctor).await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn malformed_ids_are_not_found() {
    let app = TestApp::new().await;
    let admin = app.signup("admin").await;

    let response = app.get("/api/patients/not-a-uuid", &admin).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Patient not found");

    let response = app.delete("/api/patients/not-a-uuid/permanent", &admin).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_restore_and_purge() {
    let app = TestApp::new().await;
    let admin = app.signup("admin").await;

    let first = app.create_patient(&admin, "First").await;
    let second = app.create_patient(&admin, "Second").await;
    let active = app.create_patient(&admin, "Active").await;

    for id in [&first, &second] {
        app.delete(&format!("/api/patients/{id}"), &admin).await;
    }

    let missing = app.put("/api/patients/restore", &admin, json!({})).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["message"], "Provide an array of ids");

    let restored = app
        .put("/api/patients/restore", &admin, json!({ "ids": [first, "bogus"] }))
        .await;
    assert_eq!(restored.status, StatusCode::OK);
    assert_eq!(restored.body["processed"], json!([first]));
    assert_eq!(restored.body["notFound"], json!(["bogus"]));

    let purged = app
        .request(
            Method::DELETE,
            "/api/patients/permanent",
            Some(&admin),
            Some(json!({ "ids": [second, active] })),
        )
        .await;
    assert_eq!(purged.status, StatusCode::OK);
    assert_eq!(purged.body["processed"], json!([second]));
    assert_eq!(purged.body["notFound"], json!([active]));
    assert_eq!(purged.body["failed"], json!([]));

    let names: Vec<_> = app
        .get("/api/patients", &admin)
        .await
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Active", "First"]);
}
