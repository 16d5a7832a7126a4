//! Configuration loader for the `signal-mapper` contributor daemon.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The campus boundary, accuracy threshold and
//! metric clamp ranges live in one [`CampusConfig`] shared by the geofence
//! validator and the weight normalizer.
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Context, Result};

use crate::{GeofencePolygon, MetricRange, SIGNAL_RANGE, SPEED_RANGE, UNKNOWN_WEIGHT};

/// Parse an optional environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Accuracy radius above which a fix is not trusted, meters.
pub const DEFAULT_MAX_ACCURACY_M: f64 = 50.0;

/// Campus boundary and the constants shared by geofencing and weighting.
#[derive(Debug, Clone)]
pub struct CampusConfig {
    pub polygon: GeofencePolygon,
    pub max_accuracy_m: f64,
    pub signal_range: MetricRange,
    pub speed_range: MetricRange,
    pub unknown_weight: f64,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self {
            polygon: GeofencePolygon::campus(),
            max_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            signal_range: SIGNAL_RANGE,
            speed_range: SPEED_RANGE,
            unknown_weight: UNKNOWN_WEIGHT,
        }
    }
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Backend base URL, e.g. `https://signal.example.edu`.
    pub api_url: String,

    /// Socket.IO WebSocket URL for the push channel.
    pub push_url: String,

    /// SQLite URL of the local queue store.
    pub queue_db_url: String,

    /// Address of the local control surface.
    pub listen_addr: SocketAddr,

    /// `limit` sent with pull refreshes.
    pub sample_limit: u32,

    pub http_timeout: Duration,
    pub position_timeout: Duration,

    /// How old a cached position fix may be and still be used.
    pub max_fix_age: Duration,

    pub push_reconnect: Duration,

    /// Refuse submissions while the device is on Wi-Fi.
    pub require_mobile_data: bool,

    /// Upper bound on points kept in the heat layer.
    pub heat_max_points: usize,

    pub campus: CampusConfig,
}

impl Config {
    // ---
    /// Defaults for everything except the backend URL.
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        // ---
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let push_url = crate::push::push_url(&api_url);
        Self {
            api_url,
            push_url,
            queue_db_url: "sqlite://signal-mapper.db?mode=rwc".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            sample_limit: 200,
            http_timeout: Duration::from_secs(10),
            position_timeout: Duration::from_secs(10),
            max_fix_age: Duration::from_secs(30),
            push_reconnect: Duration::from_secs(5),
            require_mobile_data: true,
            heat_max_points: 5000,
            campus: CampusConfig::default(),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `SIGNAL_API_URL` – backend base URL
///
/// Optional:
/// - `SIGNAL_PUSH_URL` – push channel URL (default: derived from the API URL)
/// - `QUEUE_DB_URL` – local queue store (default: `sqlite://signal-mapper.db?mode=rwc`)
/// - `LISTEN_ADDR` – local control surface (default: `127.0.0.1:8787`)
/// - `SAMPLE_LIMIT` – pull refresh limit (default: 200)
/// - `HTTP_TIMEOUT_MS` – backend request timeout (default: 10000)
/// - `POSITION_TIMEOUT_MS` – position request timeout (default: 10000)
/// - `MAX_FIX_AGE_SECS` – cached fix reuse window (default: 30)
/// - `PUSH_RECONNECT_SECS` – push reconnect delay (default: 5)
/// - `REQUIRE_MOBILE_DATA` – Wi-Fi submission policy (default: true)
/// - `HEAT_MAX_POINTS` – heat layer bound (default: 5000)
/// - `MAX_ACCURACY_M` – geofence accuracy threshold (default: 50)
/// - `CAMPUS_POLYGON` – JSON `[[lat, lng], ...]` (default: built-in campus ring)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let api_url: String = require_env!("SIGNAL_API_URL");
    let mut cfg = Config::with_api_url(api_url);

    if let Ok(push_url) = env::var("SIGNAL_PUSH_URL") {
        cfg.push_url = push_url;
    }
    if let Ok(db_url) = env::var("QUEUE_DB_URL") {
        cfg.queue_db_url = db_url;
    }

    cfg.listen_addr = parse_env!("LISTEN_ADDR", SocketAddr, cfg.listen_addr);
    cfg.sample_limit = parse_env!("SAMPLE_LIMIT", u32, cfg.sample_limit);
    cfg.http_timeout = Duration::from_millis(parse_env!("HTTP_TIMEOUT_MS", u64, 10_000));
    cfg.position_timeout = Duration::from_millis(parse_env!("POSITION_TIMEOUT_MS", u64, 10_000));
    cfg.max_fix_age = Duration::from_secs(parse_env!("MAX_FIX_AGE_SECS", u64, 30));
    cfg.push_reconnect = Duration::from_secs(parse_env!("PUSH_RECONNECT_SECS", u64, 5).max(1));
    cfg.require_mobile_data = parse_env!("REQUIRE_MOBILE_DATA", bool, true);
    cfg.heat_max_points = parse_env!("HEAT_MAX_POINTS", usize, cfg.heat_max_points);

    let max_accuracy_m = parse_env!("MAX_ACCURACY_M", f64, DEFAULT_MAX_ACCURACY_M);
    if !(max_accuracy_m.is_finite() && max_accuracy_m > 0.0) {
        return Err(anyhow!("Invalid MAX_ACCURACY_M: {}", max_accuracy_m));
    }
    cfg.campus.max_accuracy_m = max_accuracy_m;

    if let Ok(raw) = env::var("CAMPUS_POLYGON") {
        cfg.campus.polygon =
            serde_json::from_str::<GeofencePolygon>(&raw).context("Invalid CAMPUS_POLYGON")?;
    }

    Ok(cfg)
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  SIGNAL_API_URL      : {}", self.api_url);
        tracing::info!("  SIGNAL_PUSH_URL     : {}", self.push_url);
        tracing::info!("  QUEUE_DB_URL        : {}", self.queue_db_url);
        tracing::info!("  LISTEN_ADDR         : {}", self.listen_addr);
        tracing::info!("  SAMPLE_LIMIT        : {}", self.sample_limit);
        tracing::info!("  HTTP_TIMEOUT_MS     : {}", self.http_timeout.as_millis());
        tracing::info!("  POSITION_TIMEOUT_MS : {}", self.position_timeout.as_millis());
        tracing::info!("  MAX_FIX_AGE_SECS    : {}", self.max_fix_age.as_secs());
        tracing::info!("  PUSH_RECONNECT_SECS : {}", self.push_reconnect.as_secs());
        tracing::info!("  REQUIRE_MOBILE_DATA : {}", self.require_mobile_data);
        tracing::info!("  HEAT_MAX_POINTS     : {}", self.heat_max_points);
        tracing::info!("  MAX_ACCURACY_M      : {}", self.campus.max_accuracy_m);
        tracing::info!(
            "  CAMPUS_POLYGON      : {} vertices",
            self.campus.polygon.vertices().len()
        );
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_defaults() {
        // ---
        let cfg = Config::with_api_url("https://signal.example.edu/");

        assert_eq!(cfg.api_url, "https://signal.example.edu");
        assert_eq!(
            cfg.push_url,
            "wss://signal.example.edu/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(cfg.sample_limit, 200);
        assert_eq!(cfg.campus.max_accuracy_m, 50.0);
        assert_eq!(cfg.campus.polygon, GeofencePolygon::campus());
        assert!(cfg.require_mobile_data);
    }
}
