//! Capture pipeline: validate → geofence → build payload → send or queue.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    ApiError, Config, DeviceLink, GeofenceValidator, Metrics, NetworkType, OfflineQueue,
    Position, PositionError, QueueError, Sample, SignalApi, Untrusted,
};

// ---

/// Why a sample was refused. Refused samples are never queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    /// Client-side accuracy gate.
    LowAccuracy,
    /// Client-side geofence.
    OutsideCampus,
    /// The backend's geofence disagreed with ours.
    ServerOutsideCampus { message: Option<String> },
    /// Any other refusal the backend explained.
    Server {
        status: u16,
        error: String,
        message: Option<String>,
    },
}

impl From<Untrusted> for Rejection {
    fn from(reason: Untrusted) -> Self {
        match reason {
            Untrusted::LowAccuracy => Rejection::LowAccuracy,
            Untrusted::OutsideCampus => Rejection::OutsideCampus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted,
    /// Saved locally; `pending` is the queue length afterwards.
    Queued { pending: usize },
    Rejected { reason: Rejection },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("select a carrier before contributing")]
    MissingCarrier,
    #[error("disconnect Wi-Fi to submit mobile data")]
    WifiPolicy,
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl SubmitError {
    /// Input problems the user fixes; everything else is environmental.
    pub fn is_input_validation(&self) -> bool {
        matches!(self, SubmitError::MissingCarrier | SubmitError::WifiPolicy)
    }
}

/// Borrowed view over the session pieces the pipeline needs.
pub struct SampleSubmitter<'a, A> {
    pub(crate) config: &'a Config,
    pub(crate) api: &'a A,
    pub(crate) geofence: &'a GeofenceValidator,
    pub(crate) queue: &'a OfflineQueue,
    pub(crate) link: &'a DeviceLink,
}

impl<'a, A: SignalApi> SampleSubmitter<'a, A> {
    // ---
    /// Input validation that runs before any I/O. Returns the trimmed carrier.
    pub fn check_preconditions<'c>(&self, carrier: &'c str) -> Result<&'c str, SubmitError> {
        // ---
        let carrier = carrier.trim();
        if carrier.is_empty() {
            return Err(SubmitError::MissingCarrier);
        }
        if self.config.require_mobile_data && self.link.is_wifi() {
            return Err(SubmitError::WifiPolicy);
        }
        Ok(carrier)
    }

    pub async fn submit(
        &self,
        position: Position,
        carrier: &str,
        network_type: NetworkType,
        metrics: Metrics,
    ) -> Result<SubmitOutcome, SubmitError> {
        // ---
        let carrier = self.check_preconditions(carrier)?;

        if let Err(reason) = self.geofence.is_trusted(&position) {
            info!(%reason, accuracy_m = position.accuracy_m, "capture not trusted");
            return Ok(SubmitOutcome::Rejected {
                reason: reason.into(),
            });
        }

        let sample = Sample::capture(&position, carrier, network_type, metrics);

        if !self.link.is_online() {
            let pending = self.queue.enqueue(sample).await?;
            info!(pending, "Offline. Saved locally");
            return Ok(SubmitOutcome::Queued { pending });
        }

        match self.api.submit(&sample).await {
            Ok(()) => {
                info!(client_id = %sample.client_id, "Sample submitted");
                Ok(SubmitOutcome::Accepted)
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Connection lost. Saving locally");
                let pending = self.queue.enqueue(sample).await?;
                Ok(SubmitOutcome::Queued { pending })
            }
            Err(e) => {
                warn!(error = %e, "Sample refused by server");
                Ok(SubmitOutcome::Rejected {
                    reason: server_rejection(e),
                })
            }
        }
    }
}

fn server_rejection(error: ApiError) -> Rejection {
    // ---
    let outside = error.is_outside_campus();
    match error {
        ApiError::Rejected { message, .. } if outside => Rejection::ServerOutsideCampus { message },
        ApiError::Rejected {
            status,
            code,
            message,
        } => Rejection::Server {
            status,
            error: code,
            message,
        },
        // retryable errors never reach here
        other => Rejection::Server {
            status: 0,
            error: other.to_string(),
            message: None,
        },
    }
}
