//! One service object per process holding every piece of client state.
//!
//! Route handlers and the push consumer share the session through an `Arc`.
//! Synchronous locks here are never held across an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::{
    ApiError, Config, ConnectivityState, ConnectivityStatus, DeviceLink, FilterCriteria,
    FixSlot, FlushReport, GeofenceValidator, HeatLayer, HeatPoint, IncomingSample, LinkReport,
    LiveFeedFilter, Metrics, NetworkType, OfflineQueue, Position, PositionError, PushEvent,
    QueueError, SampleSubmitter, SignalApi, StatusEvent, SubmitError, SubmitOutcome, Untrusted,
    WeightNormalizer,
};

// ---

/// Result of the operator's locate action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LocateOutcome {
    Inside { position: Position },
    LowAccuracy { accuracy_m: f64 },
    OutsideCampus { position: Position },
}

/// What changed when the device reported its link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkChange {
    pub came_online: bool,
    pub went_offline: bool,
}

/// A capture request: position comes from the latest device fix.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Capture {
    pub carrier: String,
    /// Defaults to the type derived from the device link.
    pub network_type: Option<NetworkType>,
    #[serde(alias = "dbm")]
    pub signal_strength: Option<i32>,
    /// Defaults to the device's reported downlink.
    #[serde(alias = "download_mbps")]
    pub download_speed: Option<f64>,
}

pub struct Session<A> {
    config: Config,
    api: A,
    geofence: GeofenceValidator,
    normalizer: WeightNormalizer,
    queue: OfflineQueue,
    link: DeviceLink,
    fixes: FixSlot,
    criteria: RwLock<FilterCriteria>,
    status: Mutex<ConnectivityStatus>,
    heat: Mutex<HeatLayer>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<A: SignalApi> Session<A> {
    // ---
    pub fn new(config: Config, api: A, pool: SqlitePool) -> Self {
        // ---
        Self {
            geofence: GeofenceValidator::from_config(&config.campus),
            normalizer: WeightNormalizer::from_config(&config.campus),
            queue: OfflineQueue::new(pool),
            link: DeviceLink::default(),
            fixes: FixSlot::new(config.max_fix_age),
            criteria: RwLock::new(FilterCriteria::default()),
            status: Mutex::new(ConnectivityStatus::new()),
            heat: Mutex::new(HeatLayer::new(config.heat_max_points)),
            api,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    pub fn submitter(&self) -> SampleSubmitter<'_, A> {
        SampleSubmitter {
            config: &self.config,
            api: &self.api,
            geofence: &self.geofence,
            queue: &self.queue,
            link: &self.link,
        }
    }

    pub fn feed_filter(&self) -> LiveFeedFilter<'_> {
        LiveFeedFilter::new(&self.geofence, &self.normalizer)
    }

    // --- status, criteria, heat

    pub fn state(&self) -> ConnectivityState {
        lock(&self.status).state()
    }

    fn apply(&self, event: StatusEvent) -> ConnectivityState {
        lock(&self.status).apply(event)
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.criteria
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the view filters. Callers refresh afterwards.
    pub fn set_criteria(&self, criteria: FilterCriteria) -> FilterCriteria {
        // ---
        let criteria = criteria.normalized();
        info!(?criteria, "Filter criteria changed");
        *self
            .criteria
            .write()
            .unwrap_or_else(PoisonError::into_inner) = criteria.clone();
        criteria
    }

    pub fn heat_points(&self) -> Vec<HeatPoint> {
        lock(&self.heat).points()
    }

    // --- pull path

    /// Replace the heat layer with a fresh pull from the backend.
    ///
    /// Returns the number of points rendered. A result whose criteria
    /// changed while the request was in flight is discarded.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        // ---
        self.apply(StatusEvent::FetchStarted);
        let criteria = self.criteria();

        let samples = match self
            .api
            .fetch_samples(&criteria, self.config.sample_limit)
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                self.apply(StatusEvent::FetchFailed);
                return Err(e);
            }
        };

        if self.criteria() != criteria {
            debug!("criteria changed during refresh, result dropped");
            self.apply(StatusEvent::FetchSucceeded);
            return Ok(0);
        }

        let fetched = samples.len();
        let filter = self.feed_filter();
        let points: Vec<HeatPoint> = samples
            .into_iter()
            .map(|s| s.with_query_labels(&criteria))
            .filter_map(|s| filter.to_heat_point(&s, &criteria))
            .collect();
        let rendered = points.len();
        lock(&self.heat).replace(points);
        self.apply(StatusEvent::FetchSucceeded);

        info!(fetched, rendered, "Heat layer refreshed");
        Ok(rendered)
    }

    // --- push path

    /// Consume one push channel message.
    pub fn handle_push(&self, event: PushEvent) {
        // ---
        match event {
            PushEvent::Connected => {
                self.apply(StatusEvent::PushConnected);
            }
            PushEvent::Disconnected => {
                self.apply(StatusEvent::PushDisconnected);
            }
            PushEvent::Samples(samples) => {
                let added = self.ingest(&samples);
                debug!(received = samples.len(), added, "push samples");
            }
        }
    }

    fn ingest(&self, samples: &[IncomingSample]) -> usize {
        // ---
        let criteria = self.criteria();
        let filter = self.feed_filter();
        let mut heat = lock(&self.heat);
        let mut added = 0;
        for point in samples
            .iter()
            .filter_map(|s| filter.to_heat_point(s, &criteria))
        {
            heat.push(point);
            added += 1;
        }
        added
    }

    // --- contribute path

    /// Record a device link report and update status.
    pub fn update_link(&self, report: LinkReport) -> LinkChange {
        // ---
        let online = report.online;
        let previous = self.link.update(report);
        let change = LinkChange {
            came_online: online && !previous.online,
            went_offline: !online && previous.online,
        };
        if change.went_offline {
            info!("Device offline");
            self.apply(StatusEvent::DeviceOffline);
        }
        if change.came_online {
            info!("Device back online");
        }
        change
    }

    pub fn report_fix(&self, fix: Result<Position, PositionError>) {
        self.fixes.report(fix);
    }

    async fn request_position(&self) -> Result<Position, PositionError> {
        self.fixes.request(self.config.position_timeout).await
    }

    /// Operator locate action.
    pub async fn locate(&self) -> Result<LocateOutcome, PositionError> {
        // ---
        let position = self.request_position().await?;
        match self.geofence.is_trusted(&position) {
            Ok(()) => {
                self.apply(StatusEvent::LocatedInside);
                Ok(LocateOutcome::Inside { position })
            }
            Err(Untrusted::LowAccuracy) => Ok(LocateOutcome::LowAccuracy {
                accuracy_m: position.accuracy_m,
            }),
            Err(Untrusted::OutsideCampus) => {
                self.apply(StatusEvent::LocatedOutside);
                lock(&self.heat).clear();
                Ok(LocateOutcome::OutsideCampus { position })
            }
        }
    }

    /// Submit with an explicit position.
    pub async fn submit(
        &self,
        position: Position,
        carrier: &str,
        network_type: NetworkType,
        metrics: Metrics,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submitter()
            .submit(position, carrier, network_type, metrics)
            .await
    }

    /// Validate input, ask the device for a position, then submit.
    pub async fn capture(&self, capture: Capture) -> Result<SubmitOutcome, SubmitError> {
        // ---
        let submitter = self.submitter();
        submitter.check_preconditions(&capture.carrier)?;

        let position = self.request_position().await?;
        let link = self.link.report();
        let network_type = capture.network_type.unwrap_or_else(|| link.network_type());
        let metrics = Metrics {
            signal_strength: capture.signal_strength,
            download_speed: capture.download_speed.or_else(|| link.downlink()),
        };

        submitter
            .submit(position, &capture.carrier, network_type, metrics)
            .await
    }

    pub async fn flush(&self) -> Result<FlushReport, QueueError> {
        self.queue.flush(&self.api, &self.link).await
    }

    /// Retry the queue, then pull a fresh heat layer. Failures are logged.
    pub async fn resync(&self) {
        // ---
        if let Err(e) = self.flush().await {
            warn!(error = %e, "Queue flush failed");
        }
        // refresh logs its own failure
        let _ = self.refresh().await;
    }

    pub async fn pending(&self) -> Result<usize, QueueError> {
        self.queue.len().await
    }

    pub async fn detect_carrier(&self) -> Result<Option<String>, ApiError> {
        self.api.detect_carrier().await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::test_support::{memory_pool, on_campus, FakeApi, Reply};
    use crate::{DataFreshness, Metric};
    use std::time::Duration;

    async fn session(api: FakeApi) -> Session<FakeApi> {
        let mut config = Config::with_api_url("http://backend.test");
        config.position_timeout = Duration::from_millis(50);
        Session::new(config, api, memory_pool().await)
    }

    fn pushed(lat: f64, lng: f64, carrier: &str, dbm: f64) -> IncomingSample {
        IncomingSample {
            lat: Some(lat),
            lng: Some(lng),
            carrier: Some(carrier.into()),
            network_type: Some("4G".into()),
            signal_strength: Some(dbm),
            download_speed: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_filters_and_goes_live() {
        // ---
        let api = FakeApi::new(Reply::Accept);
        api.set_feed(Some(vec![
            pushed(12.8406, 80.1534, "Jio", -50.0),
            pushed(12.9716, 80.2200, "Jio", -50.0),
            IncomingSample::default(),
        ]));
        let s = session(api).await;

        assert_eq!(s.refresh().await.unwrap(), 1);
        assert_eq!(s.state().data_freshness, DataFreshness::Live);
        assert_eq!(s.heat_points()[0].weight, 1.0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_rows_without_labels_under_filters() {
        // ---
        let bare = IncomingSample {
            lat: Some(12.8406),
            lng: Some(80.1534),
            signal_strength: Some(-70.0),
            download_speed: Some(5.0),
            ..Default::default()
        };
        let api = FakeApi::new(Reply::Accept);
        api.set_feed(Some(vec![
            bare.clone(),
            bare,
            pushed(12.8406, 80.1534, "Airtel", -70.0),
        ]));
        let s = session(api).await;

        assert_eq!(s.refresh().await.unwrap(), 3);

        s.set_criteria(FilterCriteria {
            carrier: Some("Jio".into()),
            network_type: Some(NetworkType::G4),
            ..Default::default()
        });
        assert_eq!(s.refresh().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refresh_dropped_when_criteria_change_in_flight() {
        // ---
        let api = FakeApi::new(Reply::Accept).with_delay(Duration::from_millis(50));
        api.set_feed(Some(vec![pushed(12.8406, 80.1534, "Jio", -50.0)]));
        let s = session(api).await;
        assert_eq!(s.refresh().await.unwrap(), 1);
        let before = s.heat_points();

        s.api().set_feed(Some(vec![
            pushed(12.8406, 80.1534, "Jio", -120.0),
            pushed(12.8410, 80.1540, "Jio", -85.0),
        ]));
        let (rendered, _) = tokio::join!(s.refresh(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            s.set_criteria(FilterCriteria {
                metric: Metric::DownloadSpeed,
                ..Default::default()
            });
        });

        assert_eq!(rendered.unwrap(), 0);
        assert_eq!(s.heat_points(), before);
        assert_eq!(s.state().data_freshness, DataFreshness::Live);
    }

    #[tokio::test]
    async fn test_refresh_failure_disconnects() {
        // ---
        let api = FakeApi::new(Reply::Accept);
        api.set_feed(None);
        let s = session(api).await;

        assert!(s.refresh().await.is_err());
        assert_eq!(s.state().data_freshness, DataFreshness::Disconnected);
    }

    #[tokio::test]
    async fn test_push_samples_use_current_criteria() {
        // ---
        let s = session(FakeApi::new(Reply::Accept)).await;
        s.set_criteria(FilterCriteria {
            carrier: Some("Airtel".into()),
            ..Default::default()
        });

        s.handle_push(PushEvent::Connected);
        s.handle_push(PushEvent::Samples(vec![
            pushed(12.8406, 80.1534, "Airtel", -85.0),
            pushed(12.8406, 80.1534, "Jio", -85.0),
            IncomingSample {
                lat: None,
                ..pushed(12.8406, 80.1534, "Airtel", -85.0)
            },
        ]));

        let points = s.heat_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].weight, 0.5);
        assert!(s.state().push_channel_connected);
    }

    #[tokio::test]
    async fn test_locate_outside_campus_overrides_status() {
        // ---
        let s = session(FakeApi::new(Reply::Accept)).await;
        s.handle_push(PushEvent::Connected);
        s.handle_push(PushEvent::Samples(vec![pushed(12.8406, 80.1534, "Jio", -70.0)]));

        s.report_fix(Ok(Position {
            lat: 12.9716,
            lng: 80.2200,
            accuracy_m: 10.0,
        }));
        let outcome = s.locate().await.unwrap();
        assert!(matches!(outcome, LocateOutcome::OutsideCampus { .. }));
        assert_eq!(s.state().data_freshness, DataFreshness::OutsideCampus);
        assert!(s.heat_points().is_empty());

        s.report_fix(Ok(on_campus()));
        assert!(matches!(s.locate().await.unwrap(), LocateOutcome::Inside { .. }));
        assert_eq!(s.state().data_freshness, DataFreshness::Live);
    }

    #[tokio::test]
    async fn test_locate_without_fix_times_out() {
        // ---
        let s = session(FakeApi::new(Reply::Accept)).await;
        assert_eq!(s.locate().await, Err(PositionError::Timeout));
    }

    #[tokio::test]
    async fn test_capture_offline_then_reconnect() {
        // ---
        let s = session(FakeApi::new(Reply::Accept)).await;
        s.report_fix(Ok(on_campus()));
        let change = s.update_link(LinkReport {
            online: false,
            effective_type: Some("4g".into()),
            downlink_mbps: Some(7.5),
            ..LinkReport::default()
        });
        assert!(change.went_offline);
        assert_eq!(s.state().data_freshness, DataFreshness::Disconnected);

        let outcome = s
            .capture(Capture {
                carrier: "Jio".into(),
                signal_strength: Some(-77),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Queued { pending: 1 });

        let queued = s.queue().pending().await.unwrap();
        assert_eq!(queued[0].network_type, NetworkType::G4);
        assert_eq!(queued[0].download_speed, Some(7.5));

        let change = s.update_link(LinkReport::default());
        assert!(change.came_online);
        assert_eq!(s.flush().await.unwrap().sent.len(), 1);
        assert_eq!(s.pending().await.unwrap(), 0);
        assert_eq!(s.api().received().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_checks_carrier_before_positioning() {
        // ---
        let s = session(FakeApi::new(Reply::Accept)).await;
        let err = s.capture(Capture::default()).await.unwrap_err();
        assert!(matches!(err, SubmitError::MissingCarrier));
    }
}
