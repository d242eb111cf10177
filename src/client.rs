//! Backends answering scope fetches and bulk status changes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::config::{StoreConfig, StoreKind};
use crate::db::{self, AttendanceStore};
use crate::error::{AppError, Result};
use crate::models::{AttendanceRecord, AttendanceStatus, ScopeKey, ServerAggregate, deserialize_records};

/// Scope fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRequest {
    pub date: NaiveDate,
    pub group_id: String,
}

impl From<&ScopeKey> for ScopeRequest {
    fn from(key: &ScopeKey) -> Self {
        Self {
            date: key.date,
            group_id: key.group_id.clone(),
        }
    }
}

/// Scope fetch response. `server_aggregate` is informational only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeResponse {
    #[serde(deserialize_with = "deserialize_records")]
    pub records: Vec<AttendanceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_aggregate")]
    pub server_aggregate: Option<ServerAggregate>,
}

/// A malformed aggregate is dropped; it never blocks the records.
fn lenient_aggregate<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<ServerAggregate>, D::Error> {
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(aggregate) => Some(aggregate),
        Err(e) => {
            debug!("ignoring unreadable server aggregate: {e}");
            None
        }
    }))
}

/// Batched status change. All ids succeed or none do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    pub date: NaiveDate,
    pub group_id: String,
    pub target_status: AttendanceStatus,
    pub ids: Vec<String>,
}

/// Where attendance comes from and where status changes go.
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn fetch_scope(&self, request: &ScopeRequest) -> Result<ScopeResponse>;

    async fn bulk_update(&self, request: &BulkUpdateRequest) -> Result<()>;

    /// Group ids available for selection.
    async fn list_groups(&self) -> Result<Vec<String>>;
}

/// Backend served from a local record store.
pub struct StoreBackend<S: ?Sized> {
    store: Arc<S>,
}

impl<S: AttendanceStore + ?Sized> StoreBackend<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: AttendanceStore + ?Sized> AttendanceBackend for StoreBackend<S> {
    async fn fetch_scope(&self, request: &ScopeRequest) -> Result<ScopeResponse> {
        let key = ScopeKey::new(request.date, request.group_id.clone());
        let records = self
            .store
            .get(&key)
            .await
            .map_err(|e| AppError::scope_fetch(e.to_string()))?;

        Ok(ScopeResponse {
            records,
            server_aggregate: None,
        })
    }

    async fn bulk_update(&self, request: &BulkUpdateRequest) -> Result<()> {
        let key = ScopeKey::new(request.date, request.group_id.clone());
        let records = self
            .store
            .get(&key)
            .await
            .map_err(|e| AppError::bulk_mutation(e.to_string()))?;

        let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let missing: Vec<&str> = request
            .ids
            .iter()
            .map(String::as_str)
            .filter(|id| !known.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::bulk_mutation(format!(
                "{} of {} records not found in {key}: {}",
                missing.len(),
                request.ids.len(),
                missing.join(", ")
            )));
        }

        let targets: HashSet<&str> = request.ids.iter().map(String::as_str).collect();
        let updated: Vec<AttendanceRecord> = records
            .iter()
            .map(|record| {
                if targets.contains(record.id.as_str()) {
                    record.with_status(request.target_status)
                } else {
                    record.clone()
                }
            })
            .collect();

        self.store
            .put(&key, updated)
            .await
            .map_err(|e| AppError::bulk_mutation(e.to_string()))?;

        info!(
            "set {} records in {key} to {}",
            request.ids.len(),
            request.target_status
        );
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<String>> {
        self.store.groups().await
    }
}

/// Attendance REST service client.
///
/// `GET {base}/attendance?date=..&class=..` answers scope fetches and
/// `POST {base}/attendance/bulk` takes bulk changes.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - Service root (e.g., "https://school.example/api")
    /// * `token` - Optional bearer token
    /// * `timeout_secs` - Per-request timeout
    pub fn new(base_url: &str, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Turn a non-2xx status into a readable message.
fn describe_failure(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!("not authorized ({status})"),
        _ if body.is_empty() => format!("server returned {status}"),
        _ => format!("server returned {status}: {}", body.chars().take(200).collect::<String>()),
    }
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn fetch_scope(&self, request: &ScopeRequest) -> Result<ScopeResponse> {
        let url = format!("{base}/attendance", base = self.base_url);
        let date = request.date.format("%Y-%m-%d").to_string();
        debug!("GET {url} date={date} class={}", request.group_id);

        let response = self
            .authorize(self.client.get(&url))
            .query(&[("date", date.as_str()), ("class", request.group_id.as_str())])
            .send()
            .await
            .map_err(|e| AppError::scope_fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::scope_fetch(describe_failure(status, &body)));
        }

        // Records are normalized and unreadable ones skipped while decoding.
        response
            .json()
            .await
            .map_err(|e| AppError::scope_fetch(format!("invalid response: {e}")))
    }

    async fn bulk_update(&self, request: &BulkUpdateRequest) -> Result<()> {
        let url = format!("{base}/attendance/bulk", base = self.base_url);
        debug!("POST {url} ({} ids)", request.ids.len());

        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::bulk_mutation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::bulk_mutation(describe_failure(status, &body)));
        }

        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<String>> {
        let url = format!("{base}/groups", base = self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::scope_fetch(describe_failure(status, &body)));
        }
        Ok(response.json().await?)
    }
}

/// Build the backend selected in the config.
pub async fn connect_backend(config: &StoreConfig) -> Result<Arc<dyn AttendanceBackend>> {
    if config.kind == StoreKind::Http {
        info!("Using attendance service at {}", config.http.url);
        let token = Some(config.http.token.clone());
        return Ok(Arc::new(HttpBackend::new(&config.http.url, token, config.http.timeout_secs)?));
    }

    let store = db::open_store(config).await?;
    Ok(Arc::new(StoreBackend::new(store)))
}
