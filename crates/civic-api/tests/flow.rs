use std::io::Cursor;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use civic_api::auth::AppStateInner;
use civic_card::{CardFormat, CardRenderer, CardTemplates};
use civic_db::Database;

fn app() -> Router {
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        renderer: CardRenderer::new(CardTemplates::builtin(), CardFormat::Png),
        session_secret: "test-secret".to_string(),
        session_ttl: chrono::Duration::hours(1),
        public_url: Url::parse("http://localhost:3000").unwrap(),
    });
    civic_api::router(state, 10 * 1024 * 1024)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = session {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec(), headers)
}

async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes, _) = send(app, method, uri, session, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Register and return (verify path with query, register session token).
async fn register(app: &Router, email: &str) -> (String, String) {
    let (status, body) =
        send_json(app, Method::POST, "/register", None, Some(json!({ "email": email }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["stage"], "awaiting_verification");

    let link = Url::parse(body["verification_link"].as_str().unwrap()).unwrap();
    assert_eq!(link.path(), "/verify");
    let path = format!("{}?{}", link.path(), link.query().unwrap());
    (path, body["session_token"].as_str().unwrap().to_string())
}

async fn verify(app: &Router, path: &str) -> String {
    let (status, body) = send_json(app, Method::GET, path, None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["stage"], "profile");
    assert_eq!(body["verified"], true);
    body["session_token"].as_str().unwrap().to_string()
}

fn png_photo() -> String {
    let mut bytes = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(32, 32, image::Rgb([10, 200, 30]))
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    B64.encode(bytes.into_inner())
}

#[tokio::test]
async fn full_registration_flow() {
    let app = app();

    let (verify_path, waiting_session) = register(&app, "a@x.com").await;

    let (status, body) =
        send_json(&app, Method::GET, "/session", Some(&waiting_session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], false);

    let session = verify(&app, &verify_path).await;

    // Only the session handed out by the link is verified; the waiting one is gone.
    let (status, _) = send_json(&app, Method::GET, "/session", Some(&waiting_session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/citizen",
        Some(&session),
        Some(json!({
            "full_name": "Ada Lovelace",
            "date_of_birth": "1990-01-01",
            "theme": "dark",
            "photo": png_photo(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["id_number"], "0000000001");
    assert_eq!(body["content_type"], "image/png");
    assert_eq!(body["file_name"], "civic_id.png");
    assert_eq!(body["warnings"], json!([]));

    let card = B64.decode(body["card"].as_str().unwrap()).unwrap();
    let decoded = image::load_from_memory(&card).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (800, 500));

    let (status, body) = send_json(&app, Method::GET, "/citizen", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Ada Lovelace");
    assert_eq!(body["date_of_birth"], "1990-01-01");
    assert_eq!(body["theme"], "dark");

    let (status, bytes, headers) = send(
        &app,
        Method::POST,
        "/citizen/card",
        Some(&session),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"civic_id.png\""
    );
    assert!(image::load_from_memory(&bytes).is_ok());
}

#[tokio::test]
async fn wrong_and_reused_tokens_fail() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;

    let (status, body) =
        send_json(&app, Method::GET, "/verify?email=a%40x.com&token=bad", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let (status, body) =
        send_json(&app, Method::GET, "/verify?email=nobody%40x.com&token=bad", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired verification link.");

    verify(&app, &verify_path).await;

    let (status, _) = send_json(&app, Method::GET, &verify_path, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_rejects_bad_and_verified_emails() {
    let app = app();

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Please enter a valid email address.");

    let (verify_path, _) = register(&app, "a@x.com").await;
    verify(&app, &verify_path).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_VERIFIED");
}

#[tokio::test]
async fn second_citizen_registration_is_rejected() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;
    let first = verify(&app, &verify_path).await;

    // Log in again before finishing the profile: two sessions at `profile`.
    let (status, body) =
        send_json(&app, Method::POST, "/login", None, Some(json!({ "email": "a@x.com" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "profile");
    let second = body["session_token"].as_str().unwrap().to_string();

    let profile = json!({ "full_name": "Ada", "date_of_birth": "1990-01-01" });
    let (status, body) =
        send_json(&app, Method::POST, "/citizen", Some(&first), Some(profile.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id_number"], "0000000001");

    let (status, body) =
        send_json(&app, Method::POST, "/citizen", Some(&second), Some(profile.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CITIZEN_EXISTS");

    // The first session has moved on and can no longer submit a profile.
    let (status, body) =
        send_json(&app, Method::POST, "/citizen", Some(&first), Some(profile)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "WRONG_STAGE");
}

#[tokio::test]
async fn registering_someone_elses_email_gains_nothing() {
    let app = app();

    let (_, squatter) = register(&app, "victim@x.com").await;
    let (verify_path, _) = register(&app, "victim@x.com").await;
    let owner = verify(&app, &verify_path).await;

    let profile = json!({ "full_name": "Mallory", "date_of_birth": "1990-01-01" });
    let (status, body) =
        send_json(&app, Method::POST, "/citizen", Some(&squatter), Some(profile)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");

    let profile = json!({ "full_name": "Victoria", "date_of_birth": "1990-01-01" });
    let (status, body) =
        send_json(&app, Method::POST, "/citizen", Some(&owner), Some(profile)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id_number"], "0000000001");
}

#[tokio::test]
async fn malformed_requests_get_json_validation_errors() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;
    let session = verify(&app, &verify_path).await;

    for profile in [
        json!({ "full_name": "Ada", "date_of_birth": "1990-01-01", "theme": "purple" }),
        json!({ "full_name": "Ada", "date_of_birth": "01/01/1990" }),
        json!({ "date_of_birth": "1990-01-01" }),
    ] {
        let (status, body) =
            send_json(&app, Method::POST, "/citizen", Some(&session), Some(profile)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].is_string());
    }

    let (status, body) =
        send_json(&app, Method::GET, "/verify?email=a%40x.com", None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) =
        send_json(&app, Method::POST, "/register", None, Some(json!({ "mail": "a@x.com" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // Nothing was issued along the way.
    let (status, _) = send_json(&app, Method::GET, "/citizen", Some(&session), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_resumes_at_the_right_stage() {
    let app = app();

    let (status, body) =
        send_json(&app, Method::POST, "/login", None, Some(json!({ "email": "a@x.com" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Email not registered.");

    let (verify_path, _) = register(&app, "a@x.com").await;
    let (status, body) =
        send_json(&app, Method::POST, "/login", None, Some(json!({ "email": "a@x.com" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Email not verified.");

    let session = verify(&app, &verify_path).await;
    send_json(
        &app,
        Method::POST,
        "/citizen",
        Some(&session),
        Some(json!({ "full_name": "Ada", "date_of_birth": "1990-01-01" })),
    )
    .await;

    let (status, body) =
        send_json(&app, Method::POST, "/login", None, Some(json!({ "email": "a@x.com" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "id_card");
}

#[tokio::test]
async fn profile_needs_a_verified_session() {
    let app = app();
    let (_, waiting) = register(&app, "a@x.com").await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/citizen",
        Some(&waiting),
        Some(json!({ "full_name": "Ada", "date_of_birth": "1990-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "WRONG_STAGE");

    let (status, _) = send_json(&app, Method::GET, "/citizen", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(&app, Method::GET, "/citizen", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn blank_name_is_a_validation_error() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;
    let session = verify(&app, &verify_path).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/citizen",
        Some(&session),
        Some(json!({ "full_name": "   ", "date_of_birth": "1990-01-01" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Please enter your full name");
}

#[tokio::test]
async fn broken_photo_still_yields_a_card() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;
    let session = verify(&app, &verify_path).await;

    let (status, body) = send_json(
        &app,
        Method::POST,
        "/citizen",
        Some(&session),
        Some(json!({
            "full_name": "Ada",
            "date_of_birth": "1990-01-01",
            "photo": B64.encode(b"definitely not a jpeg"),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().starts_with("Error processing photo"));
    assert!(!body["card"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = app();
    let (verify_path, _) = register(&app, "a@x.com").await;
    let session = verify(&app, &verify_path).await;

    let (status, _) = send_json(&app, Method::POST, "/logout", Some(&session), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send_json(&app, Method::GET, "/session", Some(&session), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, bytes, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"ok");
}
