//! Client for the archive service that publishes uploaded tracks on Zenodo
//! and keeps the list of what has been published.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use shared::HistoryEntry;

use crate::track::FileSource;

pub const DEFAULT_ACCOUNT: &str = "A";

const UPLOAD_PATH: &str = "subir-zenodo";
const HISTORY_PATH: &str = "historial";
const DELETE_HISTORY_PATH: &str = "borrar-historial";

#[derive(Clone, Debug)]
pub struct UploadMetadata {
    pub author: String,
    pub description: String,
    pub account: String,
}

impl UploadMetadata {
    pub fn new(author: &str, description: &str, account: Option<&str>) -> Self {
        UploadMetadata {
            author: author.trim().to_string(),
            description: description.trim().to_string(),
            account: account
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .unwrap_or(DEFAULT_ACCOUNT)
                .to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.author.is_empty() || self.description.is_empty() {
            bail!("An author and a description are required before uploading");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UploadReceipt {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    zenodo_url: Option<String>,
    error: Option<String>,
}

pub struct ArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArchiveClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a track file to be published. Nothing is retried.
    pub async fn upload<F: FileSource + ?Sized>(
        &self,
        file: &F,
        metadata: &UploadMetadata,
    ) -> Result<UploadReceipt> {
        metadata.validate()?;
        let content = file.read_bytes()?;

        let part = multipart::Part::bytes(content.to_vec())
            .file_name(file.name().to_string())
            .mime_str("text/csv")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("autor", metadata.author.clone())
            .text("descripcion", metadata.description.clone())
            .text("cuenta", metadata.account.clone())
            .text("hora_local", local_timestamp());

        let response = self
            .client
            .post(self.endpoint(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await
            .context("Failed to reach the archive service")?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .with_context(|| format!("Unexpected archive response ({})", status))?;

        match body.zenodo_url {
            Some(url) => {
                log::info!("Uploaded {} to {}", file.name(), url);
                Ok(UploadReceipt { url })
            }
            None => Err(anyhow!(
                "Archive upload failed ({}): {}",
                status,
                body.error.as_deref().unwrap_or("no zenodo_url in response")
            )),
        }
    }

    /// Archived uploads, most recent first.
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>> {
        let response = self
            .client
            .get(self.endpoint(HISTORY_PATH))
            .send()
            .await
            .context("Failed to reach the archive service")?;

        let body: Value = response
            .json()
            .await
            .context("History response is not valid JSON")?;
        let Value::Array(items) = body else {
            bail!("History response is not an array: {}", body);
        };

        let mut entries: Vec<HistoryEntry> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping malformed history entry: {}", err);
                    None
                }
            })
            .collect();
        sort_history(&mut entries);
        Ok(entries)
    }

    pub async fn delete_history(&self) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint(DELETE_HISTORY_PATH))
            .send()
            .await
            .context("Failed to reach the archive service")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Deleting history failed with status: {}", status);
        }
        let ack: Value = response
            .json()
            .await
            .context("Delete acknowledgement is not valid JSON")?;
        log::debug!("History deleted: {}", ack);
        Ok(())
    }
}

/// Current local time with its UTC offset, e.g. `2024-05-01T10:00:00+02:00`.
fn local_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Sort by date, newest first; entries with unreadable dates go last.
pub fn sort_history(entries: &mut [HistoryEntry]) {
    entries.sort_by_cached_key(|e| std::cmp::Reverse(parse_date(&e.date)));
}

pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y, %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ] {
        if let Ok(date) = NaiveDateTime::parse_from_str(text, format) {
            return Some(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}
