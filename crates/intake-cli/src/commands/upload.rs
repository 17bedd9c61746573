//! Multipart upload client

use crate::{CliError, Result};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Server reply to an upload
#[derive(Debug)]
pub struct UploadOutcome {
    pub status: u16,
    pub body: Value,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Build the form from `fields` and `files`, post it to `url` and decode
/// the JSON reply. Non-2xx replies with a JSON body are returned, not
/// treated as errors, so the caller can print them.
pub async fn run(
    url: &str,
    fields: &[(String, String)],
    files: &[(String, PathBuf)],
) -> Result<UploadOutcome> {
    let form = build_form(fields, files).await?;

    info!(url, fields = fields.len(), files = files.len(), "Uploading");
    let response = reqwest::Client::new().post(url).multipart(form).send().await?;
    let status = response.status().as_u16();
    let text = response.text().await?;
    debug!(status, bytes = text.len(), "Response received");

    match serde_json::from_str(&text) {
        Ok(body) => Ok(UploadOutcome { status, body }),
        Err(_) => Err(CliError::UnexpectedResponse { status, body: text }),
    }
}

async fn build_form(fields: &[(String, String)], files: &[(String, PathBuf)]) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    for (name, path) in files {
        form = form.part(name.clone(), file_part(path).await?);
    }
    Ok(form)
}

async fn file_part(path: &Path) -> Result<Part> {
    let data = tokio::fs::read(path).await.map_err(|source| CliError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let part = Part::bytes(data)
        .file_name(file_name)
        .mime_str(content_type(path).as_ref())?;
    Ok(part)
}

/// Media type for `path` guessed from its extension
fn content_type(path: &Path) -> mime_guess::Mime {
    mime_guess::from_path(path).first_or_octet_stream()
}
