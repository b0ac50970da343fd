use artisan::config::Config;
use artisan::generator::PlaceholderDescriber;
use artisan::shell::Shell;
use artisan::{auth, db, handlers, ledger};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    db: db::DbConnection,
    dir: TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let image_folder = dir.path().join("artisan_images");
    let config = Config::from_lookup(|key| match key {
        "IMAGE_FOLDER" => Some(image_folder.display().to_string()),
        "ARTISAN_BCRYPT_COST" => Some("4".to_string()),
        _ => None,
    })
    .unwrap();

    let db = db::open_in_memory().unwrap();
    let shell = Shell::new(db.clone(), config, Arc::new(PlaceholderDescriber));
    TestApp {
        app: handlers::router(Arc::new(shell)),
        db,
        dir,
    }
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_multipart(
    app: &Router,
    token: &str,
    parts: &[(&str, Option<&str>, &[u8])],
) -> (StatusCode, Value) {
    const BOUNDARY: &str = "artisan-test-boundary";
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/dashboard/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn signup_and_login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/signup",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@x.com"),
            "password": password,
            "confirm": password
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["screen"], "login");

    let (status, body) = call(
        app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["screen"], "dashboard");
    body["token"].as_str().unwrap().to_string()
}

fn write_photo(dir: &Path) -> String {
    let source = dir.join("photo.jpg");
    std::fs::write(&source, b"\xFF\xD8\xFFfake jpeg").unwrap();
    source.display().to_string()
}

#[tokio::test]
async fn full_dashboard_flow() {
    let TestApp { app, db, dir } = test_app();
    let token = signup_and_login(&app, "alice", "pw1").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let source = write_photo(dir.path());
    let (status, view) = call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": source })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stored = view["selected_image"].as_str().unwrap().to_string();
    assert!(stored.starts_with("alice_") && stored.ends_with(".jpg"));
    assert_eq!(view["original_name"], "photo.jpg");
    assert_eq!(view["caption"], "");

    let (status, view) = call(&app, Method::POST, "/dashboard/generate", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["caption"], "Placeholder caption for photo.jpg");
    assert_eq!(
        view["description"],
        "Placeholder description for photo.jpg -- model not loaded."
    );

    let before = ledger::count_uploads(&db).await.unwrap();
    let (status, saved) = call(
        &app,
        Method::POST,
        "/dashboard/save",
        Some(&token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger::count_uploads(&db).await.unwrap(), before + 1);

    let id = saved["id"].as_str().unwrap();
    let (status, upload) = call(&app, Method::GET, &format!("/uploads/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["caption"], "Placeholder caption for photo.jpg");
    assert_eq!(upload["username"], "alice");
    let image_path = upload["image_path"].as_str().unwrap();
    assert!(Path::new(image_path).starts_with(dir.path().join("artisan_images")));
    assert_ne!(image_path, source);

    let (status, uploads) = call(&app, Method::GET, "/uploads", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(uploads.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn preview_streams_the_owned_copy() {
    let TestApp { app, dir, .. } = test_app();
    let token = signup_and_login(&app, "alice", "pw1").await;
    let source = write_photo(dir.path());
    call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": source })),
    )
    .await;
    std::fs::remove_file(&source).unwrap();

    let request = Request::builder()
        .uri("/dashboard/preview")
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"\xFF\xD8\xFFfake jpeg");
}

#[tokio::test]
async fn hand_edited_text_is_saved() {
    let TestApp { app, dir, .. } = test_app();
    let token = signup_and_login(&app, "bob", "pw").await;
    let source = write_photo(dir.path());
    call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": source })),
    )
    .await;

    let (status, view) = call(
        &app,
        Method::PUT,
        "/dashboard/text",
        Some(&token),
        Some(json!({ "caption": "  Hand-carved walnut bowl  " })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["caption"], "  Hand-carved walnut bowl  ");

    let (status, saved) = call(
        &app,
        Method::POST,
        "/dashboard/save",
        Some(&token),
        Some(json!({ "description": "Oiled to a soft sheen." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = saved["id"].as_str().unwrap();
    let (_, upload) = call(&app, Method::GET, &format!("/uploads/{id}"), Some(&token), None).await;
    assert_eq!(upload["caption"], "Hand-carved walnut bowl");
    assert_eq!(upload["description"], "Oiled to a soft sheen.");
}

#[tokio::test]
async fn empty_save_is_rejected() {
    let TestApp { app, db, dir } = test_app();
    let token = signup_and_login(&app, "carol", "pw").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/dashboard/save",
        Some(&token),
        Some(json!({ "caption": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please select an image first.");

    let source = write_photo(dir.path());
    call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": source })),
    )
    .await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/dashboard/save",
        Some(&token),
        Some(json!({ "caption": " ", "description": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ledger::count_uploads(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn signup_errors() {
    let TestApp { app, .. } = test_app();
    signup_and_login(&app, "dave", "pw").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/signup",
        None,
        Some(json!({ "username": "dave", "email": "d@x.com", "password": "pw", "confirm": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Username already exists.");

    let (status, body) = call(
        &app,
        Method::POST,
        "/signup",
        None,
        Some(json!({ "username": "erin", "email": "e@x.com", "password": "a", "confirm": "b" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Passwords do not match.");
}

#[tokio::test]
async fn sessions_and_logout() {
    let TestApp { app, .. } = test_app();

    let (status, _) = call(&app, Method::GET, "/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/dashboard", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = signup_and_login(&app, "frank", "pw").await;
    let (status, view) = call(&app, Method::GET, "/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "Ready");
    assert_eq!(view["username"], "frank");

    let (_, body) = call(
        &app,
        Method::POST,
        "/logout",
        Some(&token),
        Some(json!({ "confirm": false })),
    )
    .await;
    assert_eq!(body["screen"], "dashboard");

    let (_, body) = call(
        &app,
        Method::POST,
        "/logout",
        Some(&token),
        Some(json!({ "confirm": true })),
    )
    .await;
    assert_eq!(body["screen"], "login");

    let (status, _) = call(&app, Method::GET, "/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn uploads_are_private_to_their_owner_and_admins() {
    let TestApp { app, db, dir } = test_app();
    let alice = signup_and_login(&app, "alice", "pw").await;
    let mallory = signup_and_login(&app, "mallory", "pw").await;

    let source = write_photo(dir.path());
    call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&alice),
        Some(json!({ "path": source })),
    )
    .await;
    let (_, saved) = call(
        &app,
        Method::POST,
        "/dashboard/save",
        Some(&alice),
        Some(json!({ "caption": "private" })),
    )
    .await;
    let id = saved["id"].as_str().unwrap();

    let (status, _) = call(&app, Method::GET, &format!("/uploads/{id}"), Some(&mallory), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, uploads) = call(&app, Method::GET, "/uploads", Some(&mallory), None).await;
    assert!(uploads.as_array().unwrap().is_empty());

    assert!(auth::create_admin_if_not_exists(&db, "admin-pw", 4).await.unwrap());
    let (status, body) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "admin", "password": "admin-pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dashboard"]["is_admin"], true);
    let admin = body["token"].as_str().unwrap();

    let (status, upload) = call(&app, Method::GET, &format!("/uploads/{id}"), Some(admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["username"], "alice");
    assert_eq!(upload["caption"], "private");
}

#[tokio::test]
async fn selecting_a_missing_file_fails_cleanly() {
    let TestApp { app, dir, .. } = test_app();
    let token = signup_and_login(&app, "gina", "pw").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": dir.path().join("missing.jpg") })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().starts_with("I/O error"));

    let (_, view) = call(&app, Method::GET, "/dashboard", Some(&token), None).await;
    assert!(view["selected_image"].is_null());
    assert_eq!(view["status"], "Ready");
}

#[tokio::test]
async fn save_without_a_body_keeps_the_shown_text() {
    let TestApp { app, dir, .. } = test_app();
    let token = signup_and_login(&app, "ivan", "pw").await;
    let source = write_photo(dir.path());
    call(
        &app,
        Method::POST,
        "/dashboard/select",
        Some(&token),
        Some(json!({ "path": source })),
    )
    .await;
    call(
        &app,
        Method::PUT,
        "/dashboard/text",
        Some(&token),
        Some(json!({ "caption": "Beaded necklace" })),
    )
    .await;

    let (status, saved) = call(&app, Method::POST, "/dashboard/save", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(saved["dashboard"]["status"].as_str().unwrap().starts_with("Saved (id="));

    let id = saved["id"].as_str().unwrap();
    let (_, upload) = call(&app, Method::GET, &format!("/uploads/{id}"), Some(&token), None).await;
    assert_eq!(upload["caption"], "Beaded necklace");
    assert_eq!(upload["description"], "");
}

#[tokio::test]
async fn multipart_upload_selects_the_file() {
    let TestApp { app, dir, .. } = test_app();
    let token = signup_and_login(&app, "hana", "pw").await;

    let (status, view) = send_multipart(
        &app,
        &token,
        &[
            ("note", None, b"not a file".as_slice()),
            ("image", Some("bowl.png"), b"\x89PNG fake".as_slice()),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let stored = view["selected_image"].as_str().unwrap();
    assert!(stored.starts_with("hana_") && stored.ends_with(".png"));
    assert_eq!(view["original_name"], "bowl.png");

    let copy = dir.path().join("artisan_images").join(stored);
    assert_eq!(std::fs::read(copy).unwrap(), b"\x89PNG fake");

    let (status, view) = call(&app, Method::POST, "/dashboard/generate", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["caption"], "Placeholder caption for bowl.png");
}

#[tokio::test]
async fn multipart_upload_without_a_file_is_rejected() {
    let TestApp { app, .. } = test_app();
    let token = signup_and_login(&app, "ivy", "pw").await;

    let (status, body) = send_multipart(&app, &token, &[("note", None, b"just text".as_slice())]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid upload"));

    let (_, view) = call(&app, Method::GET, "/dashboard", Some(&token), None).await;
    assert!(view["selected_image"].is_null());
}
