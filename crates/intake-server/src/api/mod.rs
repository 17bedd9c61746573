//! Demo HTTP API
//!
//! - `GET /` serves a small upload form
//! - `POST /profile` accepts a `username` field and an `avatar` file
//! - `GET /health` reports liveness and the configured limits

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use intake_common::StoredFile;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::{
    ingest::{Ingestor, Upload},
    middleware::IngestLayer,
};

pub mod response;

use response::{ApiResponse, ErrorResponse};

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><title>intake</title></head>
  <body>
    <h1>Upload a profile</h1>
    <form action="/profile" method="post" enctype="multipart/form-data">
      <p><label>Username <input type="text" name="username"></label></p>
      <p><label>Avatar <input type="file" name="avatar"></label></p>
      <p><button type="submit">Upload</button></p>
    </form>
  </body>
</html>
"#;

/// Profile upload result
#[derive(Debug, Serialize)]
pub struct Profile {
    pub username: Option<String>,
    pub avatar: StoredFile,
}

/// Build the demo router. Ingestion only runs on `/profile`.
pub fn router(ingestor: Arc<Ingestor>) -> Router {
    Router::new()
        .route("/", get(upload_form))
        .route(
            "/profile",
            post(profile).layer(IngestLayer::new(ingestor.clone())),
        )
        .route("/health", get(health))
        .with_state(ingestor)
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn profile(upload: Option<Extension<Upload>>) -> Response {
    let Some(Extension(upload)) = upload else {
        return missing_avatar();
    };
    let Some(avatar) = upload.single("avatar").cloned() else {
        return missing_avatar();
    };

    tracing::info!(
        username = upload.field("username").unwrap_or_default(),
        size = avatar.size(),
        "Profile uploaded"
    );

    ApiResponse::success(Profile {
        username: upload.field("username").map(str::to_string),
        avatar,
    })
    .into_response()
}

fn missing_avatar() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("NO_FILE_UPLOADED", "No file uploaded")),
    )
        .into_response()
}

async fn health(State(ingestor): State<Arc<Ingestor>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "limits": ingestor.limits(),
    }))
}
