//! Data models shared by the submit path, the offline queue and the live feed.
//!
//! Outbound samples ([`Sample`]) are strict: coordinates are always present
//! and the field names are the canonical wire names. Inbound samples
//! ([`IncomingSample`]) are lenient because they come from the pull endpoint
//! and the push channel, whose payloads have drifted over time.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::Position;

// ---

/// Radio generation label attached to a contributed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkType {
    #[serde(rename = "2G")]
    G2,
    #[serde(rename = "3G")]
    G3,
    #[serde(rename = "4G")]
    G4,
    #[default]
    Unknown,
}

impl NetworkType {
    // ---
    /// Map a device "effective connection type" (`4g`, `3g`, `2g`, `slow-2g`)
    /// to a generation label. Anything else is `Unknown`.
    pub fn from_effective_type(effective_type: &str) -> Self {
        // ---
        match effective_type.trim().to_ascii_lowercase().as_str() {
            "4g" => NetworkType::G4,
            "3g" => NetworkType::G3,
            "2g" | "slow-2g" => NetworkType::G2,
            _ => NetworkType::Unknown,
        }
    }

    /// Wire label, as used in filters and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::G2 => "2G",
            NetworkType::G3 => "3G",
            NetworkType::G4 => "4G",
            NetworkType::Unknown => "Unknown",
        }
    }
}

/// Raw metrics captured alongside a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub signal_strength: Option<i32>,
    pub download_speed: Option<f64>,
}

/// One contributed measurement, as posted to `/api/submit` and as persisted
/// in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    // ---
    pub lat: f64,
    pub lng: f64,
    pub carrier: String,
    pub network_type: NetworkType,
    pub signal_strength: Option<i32>,
    pub download_speed: Option<f64>,
    /// Per-sample id; the backend drops repeated deliveries of the same id.
    pub client_id: Uuid,
    /// Capture time, Unix milliseconds.
    pub created_at: i64,
}

impl Sample {
    // ---
    /// Build a payload from an already validated position.
    ///
    /// Trims the carrier label and drops a download speed that is negative
    /// or not finite; a fresh `client_id` and the capture time are stamped.
    pub fn capture(
        position: &Position,
        carrier: &str,
        network_type: NetworkType,
        metrics: Metrics,
    ) -> Self {
        // ---
        Sample {
            lat: position.lat,
            lng: position.lng,
            carrier: carrier.trim().to_string(),
            network_type,
            signal_strength: metrics.signal_strength,
            download_speed: metrics
                .download_speed
                .filter(|mbps| mbps.is_finite() && *mbps >= 0.0),
            client_id: Uuid::new_v4(),
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

/// A sample received from the pull endpoint or the push channel.
///
/// Every field is optional. Metric fields that are present but not numbers
/// read as missing. Legacy field names are accepted as aliases:
/// `latitude`/`longitude` for `lat`/`lng`, `dbm` for `signal_strength` and
/// `download_mbps` for `download_speed`. A payload carrying both the
/// canonical and the legacy name of one field fails to decode as a duplicate
/// field and is dropped like any other malformed sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingSample {
    // ---
    #[serde(default, alias = "latitude", deserialize_with = "lenient_number")]
    pub lat: Option<f64>,
    #[serde(default, alias = "longitude", deserialize_with = "lenient_number")]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub carrier: Option<String>,
    #[serde(default, deserialize_with = "lenient_label")]
    pub network_type: Option<String>,
    #[serde(default, alias = "dbm", deserialize_with = "lenient_number")]
    pub signal_strength: Option<f64>,
    #[serde(default, alias = "download_mbps", deserialize_with = "lenient_number")]
    pub download_speed: Option<f64>,
}

impl IncomingSample {
    // ---
    /// Both coordinates, if present and finite.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }

    /// Fill labels a pulled row omits with the values the query filtered on.
    ///
    /// The pull endpoint filters by carrier and network type server-side and
    /// may return rows without those fields. A label the row does carry is
    /// kept, so a conflicting row still fails [`FilterCriteria::matches`].
    pub fn with_query_labels(mut self, criteria: &FilterCriteria) -> Self {
        // ---
        if self.carrier.is_none() {
            self.carrier = criteria.carrier.clone();
        }
        if self.network_type.is_none() {
            self.network_type = criteria.network_type.map(|n| n.as_str().to_string());
        }
        self
    }

    /// Raw value of the metric selected for the heat layer.
    pub fn metric_value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::SignalStrength => self.signal_strength,
            Metric::DownloadSpeed => self.download_speed,
        }
    }
}

impl From<&Sample> for IncomingSample {
    fn from(s: &Sample) -> Self {
        IncomingSample {
            lat: Some(s.lat),
            lng: Some(s.lng),
            carrier: Some(s.carrier.clone()),
            network_type: Some(s.network_type.as_str().to_string()),
            signal_strength: s.signal_strength.map(f64::from),
            download_speed: s.download_speed,
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_str().map(str::to_string)))
}

// ---

/// Which raw field drives the heat weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    #[serde(alias = "dbm")]
    SignalStrength,
    #[serde(alias = "speed")]
    DownloadSpeed,
}

/// The operator's current view.
///
/// Unset fields match anything. Read by both the pull-refresh path and the
/// live push path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub network_type: Option<NetworkType>,
    #[serde(default)]
    pub metric: Metric,
}

impl FilterCriteria {
    // ---
    /// Treat blank carrier labels as unset.
    pub fn normalized(mut self) -> Self {
        // ---
        self.carrier = self
            .carrier
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        self
    }

    /// True when every set field matches the sample.
    pub fn matches(&self, sample: &IncomingSample) -> bool {
        // ---
        let carrier_ok = self
            .carrier
            .as_deref()
            .map_or(true, |want| sample.carrier.as_deref() == Some(want));
        let network_ok = self
            .network_type
            .map_or(true, |want| sample.network_type.as_deref() == Some(want.as_str()));
        carrier_ok && network_ok
    }
}

/// One weighted point handed to the rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn campus_position() -> Position {
        // ---
        Position {
            lat: 12.8406,
            lng: 80.1534,
            accuracy_m: 10.0,
        }
    }

    #[test]
    fn test_effective_type_mapping() {
        // ---
        assert_eq!(NetworkType::from_effective_type("4g"), NetworkType::G4);
        assert_eq!(NetworkType::from_effective_type("3G"), NetworkType::G3);
        assert_eq!(NetworkType::from_effective_type("slow-2g"), NetworkType::G2);
        assert_eq!(NetworkType::from_effective_type("2g"), NetworkType::G2);
        assert_eq!(NetworkType::from_effective_type("wifi"), NetworkType::Unknown);
    }

    #[test]
    fn test_capture_payload_shape() {
        // ---
        let metrics = Metrics {
            signal_strength: Some(-85),
            download_speed: Some(-3.0),
        };
        let sample = Sample::capture(&campus_position(), "  Jio ", NetworkType::G4, metrics);

        assert_eq!(sample.carrier, "Jio");
        assert_eq!(sample.download_speed, None);
        assert_eq!(sample.signal_strength, Some(-85));

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["network_type"], "4G");
        assert_eq!(json["lat"], 12.8406);
        assert_eq!(json["lng"], 80.1534);
        assert!(json["download_speed"].is_null());
        assert!(json["client_id"].is_string());
    }

    #[test]
    fn test_capture_ids_are_unique() {
        // ---
        let a = Sample::capture(&campus_position(), "Jio", NetworkType::G4, Metrics::default());
        let b = Sample::capture(&campus_position(), "Jio", NetworkType::G4, Metrics::default());
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn test_incoming_legacy_aliases() {
        // ---
        let legacy = r#"{
            "latitude": 12.84, "longitude": 80.15,
            "carrier": "Airtel", "network_type": "3G",
            "dbm": -90, "download_mbps": 12.5
        }"#;
        let s: IncomingSample = serde_json::from_str(legacy).unwrap();

        assert_eq!(s.coordinates(), Some((12.84, 80.15)));
        assert_eq!(s.signal_strength, Some(-90.0));
        assert_eq!(s.download_speed, Some(12.5));
        assert_eq!(s.carrier.as_deref(), Some("Airtel"));
    }

    #[test]
    fn test_incoming_non_numeric_metrics_read_as_missing() {
        // ---
        let s: IncomingSample = serde_json::from_str(
            r#"{"lat": 12.84, "lng": 80.15, "signal_strength": "strong", "download_speed": null}"#,
        )
        .unwrap();

        assert_eq!(s.signal_strength, None);
        assert_eq!(s.download_speed, None);
    }

    #[test]
    fn test_incoming_missing_coordinates() {
        // ---
        let s: IncomingSample = serde_json::from_str(r#"{"carrier": "Jio"}"#).unwrap();
        assert_eq!(s.coordinates(), None);
    }

    #[test]
    fn test_query_labels_fill_only_missing_fields() {
        // ---
        let criteria = FilterCriteria {
            carrier: Some("Jio".into()),
            network_type: Some(NetworkType::G4),
            ..Default::default()
        };
        let bare: IncomingSample =
            serde_json::from_str(r#"{"lat": 12.84, "lng": 80.15, "signal_strength": -70}"#).unwrap();

        let filled = bare.with_query_labels(&criteria);
        assert_eq!(filled.carrier.as_deref(), Some("Jio"));
        assert_eq!(filled.network_type.as_deref(), Some("4G"));
        assert!(criteria.matches(&filled));

        let labelled = IncomingSample {
            carrier: Some("Airtel".into()),
            ..filled
        }
        .with_query_labels(&criteria);
        assert_eq!(labelled.carrier.as_deref(), Some("Airtel"));
        assert!(!criteria.matches(&labelled));

        let open = IncomingSample::default().with_query_labels(&FilterCriteria::default());
        assert_eq!(open.carrier, None);
        assert_eq!(open.network_type, None);
    }

    #[test]
    fn test_both_canonical_and_legacy_name_is_rejected() {
        // ---
        let doubled = r#"{"lat": 12.84, "latitude": 12.84, "lng": 80.15}"#;
        assert!(serde_json::from_str::<IncomingSample>(doubled).is_err());
    }

    #[test]
    fn test_filter_matches_only_set_fields() {
        // ---
        let sample = IncomingSample {
            lat: Some(12.84),
            lng: Some(80.15),
            carrier: Some("Jio".into()),
            network_type: Some("4G".into()),
            ..Default::default()
        };

        assert!(FilterCriteria::default().matches(&sample));

        let carrier_only = FilterCriteria {
            carrier: Some("Jio".into()),
            ..Default::default()
        };
        assert!(carrier_only.matches(&sample));

        let wrong_network = FilterCriteria {
            network_type: Some(NetworkType::G3),
            ..Default::default()
        };
        assert!(!wrong_network.matches(&sample));
    }

    #[test]
    fn test_blank_carrier_filter_is_unset() {
        // ---
        let criteria = FilterCriteria {
            carrier: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(criteria.carrier, None);
    }

    #[test]
    fn test_metric_selector_accepts_short_names() {
        // ---
        let c: FilterCriteria = serde_json::from_str(r#"{"metric": "dbm"}"#).unwrap();
        assert_eq!(c.metric, Metric::SignalStrength);
        let c: FilterCriteria = serde_json::from_str(r#"{"metric": "download_speed"}"#).unwrap();
        assert_eq!(c.metric, Metric::DownloadSpeed);
    }
}
