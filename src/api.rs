//! Remote collaborators: Steam store lookups and the depot key service

use crate::config_vdf;
use crate::constants::{urls, APP_NAME, APP_VERSION, HTTP_TIMEOUT_SECS};
use crate::error::ApiError;
use crate::settings::AppSettings;
use chrono::{Duration as ChronoDuration, Local, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Minimum gap between two automatic key uploads.
pub const KEYS_UPLOAD_INTERVAL_HOURS: i64 = 1;

pub fn http_client() -> Result<reqwest::Client, ApiError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(format!("{}/{}", APP_NAME, APP_VERSION))
        .build()?)
}

pub fn unknown_game_name(app_id: &str) -> String {
    format!("Unknown Game ({})", app_id)
}

#[derive(Debug, Deserialize)]
struct AppDetailsEnvelope {
    #[serde(default)]
    success: bool,
    data: Option<AppDetailsData>,
}

#[derive(Debug, Deserialize)]
struct AppDetailsData {
    name: String,
}

/// Name from an `appdetails` response body.
pub fn parse_app_name(body: &str, app_id: &str) -> Option<String> {
    let mut envelopes: HashMap<String, AppDetailsEnvelope> = serde_json::from_str(body).ok()?;
    let envelope = envelopes.remove(app_id)?;
    if !envelope.success {
        return None;
    }
    envelope.data.map(|d| d.name).filter(|n| !n.trim().is_empty())
}

/// Store name for an app, or `Unknown Game (<id>)` on any failure.
pub async fn fetch_app_name(app_id: &str) -> String {
    let lookup = async {
        let response = http_client()?
            .get(urls::STORE_APP_DETAILS)
            .query(&[("appids", app_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok::<_, ApiError>(response.text().await?)
    };

    match lookup.await {
        Ok(body) => parse_app_name(&body, app_id).unwrap_or_else(|| unknown_game_name(app_id)),
        Err(e) => {
            warn!("[api] App name lookup for {} failed: {}", app_id, e);
            unknown_game_name(app_id)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DepotIdValue {
    Text(String),
    Number(u64),
}

#[derive(Debug, Deserialize)]
struct DepotKeysResponse {
    existing_depot_ids: Option<Vec<DepotIdValue>>,
}

pub fn parse_existing_depot_ids(body: &str) -> Result<HashSet<String>, ApiError> {
    let parsed: DepotKeysResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::Other(format!("Invalid depot-keys response: {}", e)))?;
    let ids = parsed
        .existing_depot_ids
        .ok_or_else(|| ApiError::Other("Response has no existing_depot_ids".to_string()))?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            DepotIdValue::Text(s) => s,
            DepotIdValue::Number(n) => n.to_string(),
        })
        .collect())
}

/// Depot ids the key service already has.
pub async fn fetch_existing_depot_ids(base_url: &str, api_key: &str) -> Result<HashSet<String>, ApiError> {
    let url = format!("{}/depot-keys", base_url.trim_end_matches('/'));
    let response = http_client()?
        .get(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    parse_existing_depot_ids(&body)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSummary {
    #[serde(default)]
    pub valid_lines: i64,
    #[serde(default)]
    pub invalid_lines_removed: i64,
}

impl UploadSummary {
    pub fn message(&self) -> String {
        if self.invalid_lines_removed > 0 {
            format!(
                "{} valid lines, {} invalid removed",
                self.valid_lines, self.invalid_lines_removed
            )
        } else {
            format!("{} valid lines", self.valid_lines)
        }
    }
}

/// Upload `depotId;HEXKEY` lines as a multipart text file.
pub async fn upload_keys(
    base_url: &str,
    api_key: &str,
    file_name: &str,
    text: String,
) -> Result<UploadSummary, ApiError> {
    let url = format!("{}/upload-machine-keys", base_url.trim_end_matches('/'));
    let part = reqwest::multipart::Part::text(text)
        .file_name(file_name.to_string())
        .mime_str("text/plain")?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = http_client()?
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(serde_json::from_str(&body).unwrap_or_default())
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeysUploadOutcome {
    Skipped { reason: String },
    NothingNew { local: usize },
    Uploaded { count: usize, message: String },
}

fn machine_name() -> String {
    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "machine".to_string())
        .replace(' ', "_")
}

/// Keys present locally but not yet on the server.
pub fn new_keys_only(
    local: BTreeMap<String, String>,
    existing: &HashSet<String>,
) -> BTreeMap<String, String> {
    local
        .into_iter()
        .filter(|(id, _)| !existing.contains(id))
        .collect()
}

/// Upload keys from `config.vdf` that the server does not have yet. On
/// success `settings.last_config_keys_upload` is updated; the caller saves.
/// `force` ignores the enabled flag and the minimum interval.
pub async fn upload_new_config_keys(
    settings: &mut AppSettings,
    config_vdf: &Path,
    force: bool,
) -> Result<KeysUploadOutcome, ApiError> {
    let skip = |reason: &str| {
        info!("[api] Skipping config keys upload: {}", reason);
        Ok(KeysUploadOutcome::Skipped {
            reason: reason.to_string(),
        })
    };

    if !force {
        if !settings.auto_upload_config_keys {
            return skip("auto-upload is disabled");
        }
        if let Some(last) = settings.last_config_keys_upload {
            if Utc::now() - last < ChronoDuration::hours(KEYS_UPLOAD_INTERVAL_HOURS) {
                return skip("uploaded less than an hour ago");
            }
        }
    }
    if settings.api_key.is_empty() {
        return skip("API key not configured");
    }
    if !config_vdf.is_file() {
        return skip("config.vdf not found");
    }

    let extraction = config_vdf::extract_keys(config_vdf, None);
    if !extraction.success || extraction.keys.is_empty() {
        return Ok(KeysUploadOutcome::NothingNew { local: 0 });
    }
    let local = extraction.keys.len();

    let existing = fetch_existing_depot_ids(&settings.api_base_url, &settings.api_key).await?;
    info!("[api] Server has {} existing depot ids", existing.len());

    let new_keys = new_keys_only(extraction.keys, &existing);
    if new_keys.is_empty() {
        info!("[api] All {} local keys already exist on server", local);
        return Ok(KeysUploadOutcome::NothingNew { local });
    }

    let file_name = format!(
        "{}_{}_keys.txt",
        machine_name(),
        Local::now().format("%Y%m%d%H%M%S")
    );
    info!("[api] Uploading {} new keys as {}", new_keys.len(), file_name);
    let summary = upload_keys(
        &settings.api_base_url,
        &settings.api_key,
        &file_name,
        config_vdf::format_keys_as_text(&new_keys),
    )
    .await?;

    settings.last_config_keys_upload = Some(Utc::now());
    Ok(KeysUploadOutcome::Uploaded {
        count: new_keys.len(),
        message: summary.message(),
    })
}
