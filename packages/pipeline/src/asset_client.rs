use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracksplit_layout::{LocationTrackId, SplitId};

use crate::error::{AssetSystemError, PipelineError, Result};
use crate::models::TransferState;

pub type AssetResult<T> = std::result::Result<T, AssetSystemError>;

/// Request to start moving a split's assets from the source track to its targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferRequest {
    pub split_id: SplitId,
    pub source_location_track_id: LocationTrackId,
    pub target_location_track_ids: Vec<LocationTrackId>,
}

/// Progress of a transfer as reported by the asset system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTransferStatus {
    pub state: TransferState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub assets_total: Option<i32>,
    pub assets_moved: Option<i32>,
    pub external_assets_remaining: Option<i32>,
    pub external_assets_total: Option<i32>,
}

/// Trait for asset system clients, enabling mocking in tests.
#[async_trait]
pub trait AssetSystemClient: Send + Sync {
    /// Create a transfer, returning its id in the asset system.
    async fn create_transfer(&self, request: &CreateTransferRequest) -> AssetResult<String>;

    async fn poll_transfer(&self, transfer_id: &str) -> AssetResult<ExternalTransferStatus>;

    /// Start a created transfer now instead of waiting for its scheduled slot.
    async fn force_start_transfer(&self, transfer_id: &str) -> AssetResult<()>;
}

pub struct HttpAssetSystemClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreateTransferResponse {
    id: String,
}

impl HttpAssetSystemClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/bulk-transfers{path}", self.base_url)
    }
}

async fn check_status(response: reqwest::Response) -> AssetResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AssetSystemError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AssetSystemClient for HttpAssetSystemClient {
    async fn create_transfer(&self, request: &CreateTransferRequest) -> AssetResult<String> {
        let response = self.http.post(self.url("")).json(request).send().await?;
        let created: CreateTransferResponse = check_status(response).await?.json().await?;
        tracing::debug!(split_id = %request.split_id, transfer_id = %created.id, "transfer created");
        Ok(created.id)
    }

    async fn poll_transfer(&self, transfer_id: &str) -> AssetResult<ExternalTransferStatus> {
        let response = self
            .http
            .get(self.url(&format!("/{transfer_id}")))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn force_start_transfer(&self, transfer_id: &str) -> AssetResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/{transfer_id}/start")))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Test utilities for the asset system client.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Mock asset system. Returns queued responses per call kind, in order, and
    /// records every call it receives.
    #[derive(Default)]
    pub struct MockAssetSystemClient {
        creates: Mutex<VecDeque<AssetResult<String>>>,
        polls: Mutex<VecDeque<AssetResult<ExternalTransferStatus>>>,
        starts: Mutex<VecDeque<AssetResult<()>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockAssetSystemClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_create(self, response: AssetResult<String>) -> Self {
            push(&self.creates, response);
            self
        }

        pub fn with_poll(self, response: AssetResult<ExternalTransferStatus>) -> Self {
            push(&self.polls, response);
            self
        }

        pub fn with_start(self, response: AssetResult<()>) -> Self {
            push(&self.starts, response);
            self
        }

        /// Calls received so far, e.g. `["create", "poll bt-1"]`.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    fn push<T>(queue: &Mutex<VecDeque<T>>, item: T) {
        if let Ok(mut q) = queue.lock() {
            q.push_back(item);
        }
    }

    fn next<T>(queue: &Mutex<VecDeque<T>>, call: &str) -> AssetResult<T> {
        queue
            .lock()
            .map_err(|e| AssetSystemError::InvalidResponse(format!("mock lock poisoned: {e}")))?
            .pop_front()
            .ok_or_else(|| AssetSystemError::InvalidResponse(format!("unexpected {call} call")))
    }

    #[async_trait]
    impl AssetSystemClient for MockAssetSystemClient {
        async fn create_transfer(&self, request: &CreateTransferRequest) -> AssetResult<String> {
            self.record(format!("create {}", request.split_id));
            next(&self.creates, "create")?
        }

        async fn poll_transfer(&self, transfer_id: &str) -> AssetResult<ExternalTransferStatus> {
            self.record(format!("poll {transfer_id}"));
            next(&self.polls, "poll")?
        }

        async fn force_start_transfer(&self, transfer_id: &str) -> AssetResult<()> {
            self.record(format!("start {transfer_id}"));
            next(&self.starts, "start")?
        }
    }
}
