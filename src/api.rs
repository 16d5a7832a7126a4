//! Backend wire contract: submit, pull refresh, carrier guess.
//!
//! [`SignalApi`] is the seam the queue and the submitter talk through;
//! [`HttpApi`] is the `reqwest` implementation against the real backend.

use std::{future::Future, time::Duration};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::{FilterCriteria, IncomingSample, Sample};

// ---

/// Carrier value the backend returns when it has no guess.
pub const NO_CARRIER_GUESS: &str = "Unknown (Local IP)";

/// Error codes meaning the backend's own geofence refused the point.
const SERVER_GEOFENCE_CODES: [&str; 2] = ["OUTSIDE_CAMPUS", "OUT_OF_CAMPUS"];

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout or undecodable response.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server error or rate limiting; worth retrying later.
    #[error("server unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    /// The server refused the request and said why.
    #[error("server rejected request (HTTP {status}): {code}")]
    Rejected {
        status: u16,
        code: String,
        message: Option<String>,
    },
}

impl ApiError {
    // ---
    /// True when the request may succeed unchanged later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Unavailable { .. })
    }

    /// True when the backend's geofence disagreed with ours.
    pub fn is_outside_campus(&self) -> bool {
        matches!(self, ApiError::Rejected { code, .. } if SERVER_GEOFENCE_CODES.contains(&code.as_str()))
    }
}

/// Operations the client needs from the backend.
pub trait SignalApi: Send + Sync {
    /// `POST /api/submit`; `Ok` only on a 2xx.
    fn submit(&self, sample: &Sample) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /api/samples` filtered server-side by carrier and network type.
    fn fetch_samples(
        &self,
        criteria: &FilterCriteria,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<IncomingSample>, ApiError>> + Send;

    /// `GET /api/get-carrier`; `None` when the backend has no guess.
    fn detect_carrier(&self) -> impl Future<Output = Result<Option<String>, ApiError>> + Send;
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CarrierBody {
    #[serde(default)]
    carrier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    // ---
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Classify a non-2xx response.
    async fn failure(response: reqwest::Response) -> ApiError {
        // ---
        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return ApiError::Unavailable {
                status: status.as_u16(),
            };
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        ApiError::Rejected {
            status: status.as_u16(),
            code: body
                .error
                .unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
            message: body.message,
        }
    }
}

impl SignalApi for HttpApi {
    async fn submit(&self, sample: &Sample) -> Result<(), ApiError> {
        // ---
        let response = self
            .client
            .post(self.url("/api/submit"))
            .json(sample)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(client_id = %sample.client_id, "sample accepted");
            return Ok(());
        }
        Err(Self::failure(response).await)
    }

    async fn fetch_samples(
        &self,
        criteria: &FilterCriteria,
        limit: u32,
    ) -> Result<Vec<IncomingSample>, ApiError> {
        // ---
        let mut query: Vec<(&str, String)> = Vec::with_capacity(3);
        if let Some(carrier) = &criteria.carrier {
            query.push(("carrier", carrier.clone()));
        }
        if let Some(network_type) = criteria.network_type {
            query.push(("network_type", network_type.as_str().to_string()));
        }
        query.push(("limit", limit.to_string()));

        let response = self
            .client
            .get(self.url("/api/samples"))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let items: Vec<serde_json::Value> = response.json().await?;
        let total = items.len();
        let samples: Vec<IncomingSample> = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value::<IncomingSample>(item) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    debug!("Skipping malformed sample {}: {}", i, e);
                    None
                }
            })
            .collect();

        info!("Fetched {} samples ({} malformed)", samples.len(), total - samples.len());
        Ok(samples)
    }

    async fn detect_carrier(&self) -> Result<Option<String>, ApiError> {
        // ---
        let response = self.client.get(self.url("/api/get-carrier")).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let body: CarrierBody = response.json().await?;
        Ok(body
            .carrier
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && c != NO_CARRIER_GUESS))
    }
}
