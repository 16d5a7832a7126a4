//! Campus signal mapper client library.
//!
//! Collects cellular signal samples inside a campus geofence, submits them to
//! the shared backend (queuing them locally while offline), and keeps a
//! weighted heat layer fed from pull refreshes and the push channel.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): modules
//! import their siblings through the re-exports below rather than through
//! each other's paths.

mod api;
mod config;
mod connectivity;
mod device;
mod feed;
mod geofence;
mod models;
mod positioning;
mod queue;
mod session;
mod submit;
mod weight;

pub mod push;
pub mod routes;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, HttpApi, SignalApi, NO_CARRIER_GUESS};
pub use config::{load_from_env, CampusConfig, Config, DEFAULT_MAX_ACCURACY_M};
pub use connectivity::{ConnectivityState, ConnectivityStatus, DataFreshness, StatusEvent};
pub use device::{ConnectionKind, DeviceLink, LinkReport};
pub use feed::{HeatLayer, LiveFeedFilter};
pub use geofence::{GeofencePolygon, GeofenceValidator, PolygonError, Untrusted, CAMPUS_RING};
pub use models::{
    FilterCriteria, HeatPoint, IncomingSample, Metric, Metrics, NetworkType, Sample,
};
pub use positioning::{FixSlot, Position, PositionError};
pub use push::PushEvent;
pub use queue::{FlushReport, OfflineQueue, QueueError, QUEUE_KEY};
pub use session::{Capture, LinkChange, LocateOutcome, Session};
pub use submit::{Rejection, SampleSubmitter, SubmitError, SubmitOutcome};
pub use weight::{MetricRange, WeightNormalizer, SIGNAL_RANGE, SPEED_RANGE, UNKNOWN_WEIGHT};
