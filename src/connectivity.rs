//! The single network/data freshness indicator.
//!
//! Pull fetches, push channel events and device link changes move the
//! underlying freshness between `loading`, `live` and `disconnected`. An
//! operator locate that lands outside campus raises `outside-campus`, which
//! masks the underlying value until a later locate lands inside.

use serde::{Deserialize, Serialize};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataFreshness {
    Loading,
    Live,
    Disconnected,
    OutsideCampus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityState {
    pub data_freshness: DataFreshness,
    pub push_channel_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    FetchStarted,
    FetchSucceeded,
    FetchFailed,
    PushConnected,
    PushDisconnected,
    DeviceOffline,
    LocatedOutside,
    LocatedInside,
}

#[derive(Debug, Clone)]
pub struct ConnectivityStatus {
    link: DataFreshness,
    outside_campus: bool,
    push_connected: bool,
}

impl Default for ConnectivityStatus {
    fn default() -> Self {
        Self {
            link: DataFreshness::Loading,
            outside_campus: false,
            push_connected: false,
        }
    }
}

impl ConnectivityStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectivityState {
        // ---
        let data_freshness = if self.outside_campus {
            DataFreshness::OutsideCampus
        } else {
            self.link
        };
        ConnectivityState {
            data_freshness,
            push_channel_connected: self.push_connected,
        }
    }

    /// Apply one event and return the resulting state.
    pub fn apply(&mut self, event: StatusEvent) -> ConnectivityState {
        // ---
        let before = self.state();
        match event {
            StatusEvent::FetchStarted => self.link = DataFreshness::Loading,
            StatusEvent::FetchSucceeded => self.link = DataFreshness::Live,
            StatusEvent::FetchFailed | StatusEvent::DeviceOffline => {
                self.link = DataFreshness::Disconnected
            }
            StatusEvent::PushConnected => {
                self.push_connected = true;
                self.link = DataFreshness::Live;
            }
            StatusEvent::PushDisconnected => {
                self.push_connected = false;
                self.link = DataFreshness::Disconnected;
            }
            StatusEvent::LocatedOutside => self.outside_campus = true,
            StatusEvent::LocatedInside => self.outside_campus = false,
        }

        let after = self.state();
        if after != before {
            tracing::info!(
                ?event,
                freshness = ?after.data_freshness,
                push = after.push_channel_connected,
                "connectivity changed"
            );
        }
        after
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use StatusEvent::*;

    fn freshness(status: &ConnectivityStatus) -> DataFreshness {
        status.state().data_freshness
    }

    #[test]
    fn test_starts_loading() {
        // ---
        let status = ConnectivityStatus::new();
        assert_eq!(
            status.state(),
            ConnectivityState {
                data_freshness: DataFreshness::Loading,
                push_channel_connected: false,
            }
        );
    }

    #[test]
    fn test_fetch_cycle() {
        // ---
        let mut status = ConnectivityStatus::new();
        status.apply(FetchStarted);
        assert_eq!(freshness(&status), DataFreshness::Loading);
        status.apply(FetchSucceeded);
        assert_eq!(freshness(&status), DataFreshness::Live);
        status.apply(FetchStarted);
        status.apply(FetchFailed);
        assert_eq!(freshness(&status), DataFreshness::Disconnected);
    }

    #[test]
    fn test_push_channel_events() {
        // ---
        let mut status = ConnectivityStatus::new();
        let s = status.apply(PushConnected);
        assert_eq!(s.data_freshness, DataFreshness::Live);
        assert!(s.push_channel_connected);

        let s = status.apply(PushDisconnected);
        assert_eq!(s.data_freshness, DataFreshness::Disconnected);
        assert!(!s.push_channel_connected);
    }

    #[test]
    fn test_device_offline_disconnects() {
        // ---
        let mut status = ConnectivityStatus::new();
        status.apply(FetchSucceeded);
        assert_eq!(status.apply(DeviceOffline).data_freshness, DataFreshness::Disconnected);
    }

    #[test]
    fn test_outside_campus_overrides_until_inside() {
        // ---
        let mut status = ConnectivityStatus::new();
        status.apply(PushConnected);
        assert_eq!(status.apply(LocatedOutside).data_freshness, DataFreshness::OutsideCampus);

        // link events keep flowing underneath the override
        assert_eq!(status.apply(FetchSucceeded).data_freshness, DataFreshness::OutsideCampus);
        let s = status.apply(PushDisconnected);
        assert_eq!(s.data_freshness, DataFreshness::OutsideCampus);
        assert!(!s.push_channel_connected);

        assert_eq!(status.apply(LocatedInside).data_freshness, DataFreshness::Disconnected);
    }

    #[test]
    fn test_state_serializes_camel_case() {
        // ---
        let json = serde_json::to_value(ConnectivityStatus::new().state()).unwrap();
        assert_eq!(json["dataFreshness"], "loading");
        assert_eq!(json["pushChannelConnected"], false);

        let mut status = ConnectivityStatus::new();
        status.apply(LocatedOutside);
        let json = serde_json::to_value(status.state()).unwrap();
        assert_eq!(json["dataFreshness"], "outside-campus");
    }
}
