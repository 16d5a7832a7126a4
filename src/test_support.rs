//! In-crate fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::{
    ApiError, FilterCriteria, IncomingSample, Metrics, NetworkType, Position, Sample, SignalApi,
};

/// How the fake backend answers a submit.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Reply {
    Accept,
    Unavailable,
    Reject(&'static str),
}

#[derive(Debug)]
pub(crate) struct FakeApi {
    reply: Reply,
    delay: Option<Duration>,
    failing_signals: Mutex<Vec<i32>>,
    accepted: Mutex<Vec<Sample>>,
    attempts: AtomicUsize,
    feed: Mutex<Option<Vec<IncomingSample>>>,
}

impl FakeApi {
    pub(crate) fn new(reply: Reply) -> Self {
        Self {
            reply,
            delay: None,
            failing_signals: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            feed: Mutex::new(Some(Vec::new())),
        }
    }

    /// Delay applied to every submit and pull.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Samples with this signal strength get a 503.
    pub(crate) fn fail_signal(&self, dbm: i32) {
        self.failing_signals.lock().unwrap().push(dbm);
    }

    /// What the pull endpoint returns; `None` makes it fail.
    pub(crate) fn set_feed(&self, feed: Option<Vec<IncomingSample>>) {
        *self.feed.lock().unwrap() = feed;
    }

    pub(crate) fn received(&self) -> Vec<Sample> {
        self.accepted.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SignalApi for FakeApi {
    async fn submit(&self, sample: &Sample) -> Result<(), ApiError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let forced_failure = sample
            .signal_strength
            .is_some_and(|dbm| self.failing_signals.lock().unwrap().contains(&dbm));
        if forced_failure {
            return Err(ApiError::Unavailable { status: 503 });
        }

        match self.reply {
            Reply::Accept => {
                self.accepted.lock().unwrap().push(sample.clone());
                Ok(())
            }
            Reply::Unavailable => Err(ApiError::Unavailable { status: 503 }),
            Reply::Reject(code) => Err(ApiError::Rejected {
                status: 403,
                code: code.to_string(),
                message: Some("refused by fake backend".to_string()),
            }),
        }
    }

    async fn fetch_samples(
        &self,
        _criteria: &FilterCriteria,
        limit: u32,
    ) -> Result<Vec<IncomingSample>, ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let feed = self.feed.lock().unwrap().clone();
        match feed {
            Some(mut samples) => {
                samples.truncate(limit as usize);
                Ok(samples)
            }
            None => Err(ApiError::Unavailable { status: 502 }),
        }
    }

    async fn detect_carrier(&self) -> Result<Option<String>, ApiError> {
        Ok(Some("Jio".to_string()))
    }
}

/// In-memory store with the schema applied.
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::schema::create_schema(&pool).await.unwrap();
    pool
}

pub(crate) fn on_campus() -> Position {
    Position {
        lat: 12.8406,
        lng: 80.1534,
        accuracy_m: 10.0,
    }
}

/// A valid on-campus sample tagged by its signal strength.
pub(crate) fn sample(dbm: i32) -> Sample {
    Sample::capture(
        &on_campus(),
        "Jio",
        NetworkType::G4,
        Metrics {
            signal_strength: Some(dbm),
            download_speed: None,
        },
    )
}
