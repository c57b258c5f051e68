// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The load-test manager: one running test at a time.
//!
//! The manager owns the single test slot, validates start requests, wires
//! profile + scheduler + dispatcher together, and derives per-test status
//! numbers as deltas against the counter baseline captured at start.
//! Process-wide counters are never reset mid-run.

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::profile::ProfileSpec;
use crate::scheduler::{RunningScheduler, SchedulerTiming, spawn_scheduler};
use ratelab_config::FlexDuration;
use ratelab_config::settings::LoadgenSettings;
use ratelab_telemetry::{LoadgenCounts, LoadgenMetrics};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// A start request as received on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Where the generated traffic is sent.
    pub target_url: String,
    /// Test length; number of seconds, `10s`-style, or ISO-8601.
    pub duration: FlexDuration,
    /// The load shape.
    pub profile: ProfileSpec,
    /// Optional bound on in-flight dispatches.
    #[serde(default)]
    pub concurrency: Option<u32>,
}

/// Snapshot answered by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Whether a test is running right now.
    pub running: bool,
    /// Id of the running test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    /// Profile name of the running test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<&'static str>,
    /// Seconds since the test started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    /// Configured test length in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Dispatches since the test's counter baseline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_sent: Option<u64>,
    /// Error-classified dispatches since the baseline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u64>,
}

struct ActiveTest {
    id: String,
    profile_name: &'static str,
    duration: Duration,
    started_at: Instant,
    baseline: LoadgenCounts,
    cancel: CancellationToken,
    finished: Arc<AtomicBool>,
}

/// Owner of the single test slot.
pub struct LoadTestManager {
    settings: LoadgenSettings,
    metrics: LoadgenMetrics,
    client: reqwest::Client,
    active: Mutex<Option<ActiveTest>>,
}

impl LoadTestManager {
    /// Creates a manager sharing the outbound client and metric set.
    pub fn new(settings: LoadgenSettings, metrics: LoadgenMetrics, client: reqwest::Client) -> Self {
        Self {
            settings,
            metrics,
            client,
            active: Mutex::new(None),
        }
    }

    /// Starts a test; rejects when one is already running.
    pub fn start(&self, request: StartRequest) -> Result<String, Error> {
        let mut slot = self.active.lock().expect("test slot lock");
        if let Some(test) = slot.as_ref() {
            if !test.finished.load(Ordering::Relaxed) {
                return Err(Error::AlreadyRunning {
                    test_id: test.id.clone(),
                });
            }
        }

        let duration = validate_request(&request)?;
        let dispatcher = Arc::new(Dispatcher::new(
            self.client.clone(),
            request.target_url.clone(),
            request.concurrency,
            self.metrics.clone(),
        ));
        let profile_name = request.profile.name();
        let scheduler = spawn_scheduler(
            self.settings.scheduler,
            request.profile.into_profile(),
            duration,
            dispatcher,
            SchedulerTiming {
                idle_delay: self.settings.idle_delay,
                tick_period: self.settings.tick_period,
            },
        );

        let id = Uuid::new_v4().to_string();
        let test = ActiveTest {
            id: id.clone(),
            profile_name,
            duration,
            started_at: Instant::now(),
            baseline: self.metrics.counts(),
            cancel: scheduler.cancellation_token(),
            finished: Arc::new(AtomicBool::new(false)),
        };
        watch_completion(id.clone(), scheduler, test.finished.clone());

        tracing::info!(
            test_id = %id,
            profile = profile_name,
            target = %request.target_url,
            duration_seconds = duration.as_secs_f64(),
            concurrency = request.concurrency,
            "load test started"
        );
        *slot = Some(test);
        Ok(id)
    }

    /// Stops the running test, returning its id.
    pub fn stop(&self) -> Result<String, Error> {
        let slot = self.active.lock().expect("test slot lock");
        match slot.as_ref() {
            Some(test) if !test.finished.load(Ordering::Relaxed) => {
                test.cancel.cancel();
                tracing::info!(test_id = %test.id, "load test stop requested");
                Ok(test.id.clone())
            }
            _ => Err(Error::NotRunning),
        }
    }

    /// Current running state and per-test numbers.
    pub fn status(&self) -> StatusResponse {
        let slot = self.active.lock().expect("test slot lock");
        match slot.as_ref() {
            Some(test) if !test.finished.load(Ordering::Relaxed) => {
                let counts = self.metrics.counts();
                StatusResponse {
                    running: true,
                    test_id: Some(test.id.clone()),
                    profile: Some(test.profile_name),
                    elapsed_seconds: Some(test.started_at.elapsed().as_secs_f64()),
                    duration_seconds: Some(test.duration.as_secs_f64()),
                    requests_sent: Some(counts.started - test.baseline.started),
                    errors: Some(counts.errors - test.baseline.errors),
                }
            }
            _ => StatusResponse {
                running: false,
                test_id: None,
                profile: None,
                elapsed_seconds: None,
                duration_seconds: None,
                requests_sent: None,
                errors: None,
            },
        }
    }
}

fn watch_completion(id: String, scheduler: RunningScheduler, finished: Arc<AtomicBool>) {
    let _ = tokio::spawn(async move {
        match scheduler.wait().await {
            Ok(()) => tracing::info!(test_id = %id, "load test finished"),
            Err(e) => tracing::error!(test_id = %id, error = %e, "load test failed"),
        }
        finished.store(true, Ordering::Relaxed);
    });
}

fn validate_request(request: &StartRequest) -> Result<Duration, Error> {
    let url = Url::parse(&request.target_url).map_err(|e| Error::InvalidRequest {
        details: format!("targetUrl: {e}"),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::InvalidRequest {
            details: format!("targetUrl: unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(Error::InvalidRequest {
            details: "targetUrl: host missing".to_string(),
        });
    }
    let duration = request.duration.get();
    if duration.is_zero() {
        return Err(Error::InvalidRequest {
            details: "duration must be positive".to_string(),
        });
    }
    if request.concurrency == Some(0) {
        return Err(Error::InvalidRequest {
            details: "concurrency must be positive when set".to_string(),
        });
    }
    request.profile.validate()?;
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn manager() -> LoadTestManager {
        LoadTestManager::new(
            LoadgenSettings::default(),
            LoadgenMetrics::new().expect("metrics"),
            reqwest::Client::new(),
        )
    }

    fn request(duration: Duration) -> StartRequest {
        StartRequest {
            target_url: "http://127.0.0.1:1/echo".to_string(),
            duration: FlexDuration(duration),
            profile: ProfileSpec::Constant { rps: 10.0 },
            concurrency: None,
        }
    }

    #[test]
    fn validation_rejects_bad_requests() {
        let mut bad_scheme = request(Duration::from_secs(1));
        bad_scheme.target_url = "ftp://host/x".to_string();
        assert!(matches!(
            validate_request(&bad_scheme),
            Err(Error::InvalidRequest { .. })
        ));

        let mut not_a_url = request(Duration::from_secs(1));
        not_a_url.target_url = "nonsense".to_string();
        assert!(validate_request(&not_a_url).is_err());

        let zero_duration = request(Duration::ZERO);
        assert!(validate_request(&zero_duration).is_err());

        let mut zero_concurrency = request(Duration::from_secs(1));
        zero_concurrency.concurrency = Some(0);
        assert!(validate_request(&zero_concurrency).is_err());

        let mut bad_profile = request(Duration::from_secs(1));
        bad_profile.profile = ProfileSpec::Constant { rps: 0.0 };
        assert!(matches!(
            validate_request(&bad_profile),
            Err(Error::InvalidProfile { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_test_runs_at_a_time() {
        let manager = manager();
        let id = manager.start(request(Duration::from_secs(60))).expect("start");

        let err = manager.start(request(Duration::from_secs(60)));
        match err {
            Err(Error::AlreadyRunning { test_id }) => assert_eq!(test_id, id),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        let stopped = manager.stop().expect("stop");
        assert_eq!(stopped, id);

        // Let the worker observe the cancellation and finish.
        sleep(Duration::from_secs(1)).await;
        assert!(manager.stop().is_err());
        assert!(!manager.status().running);

        // The slot is free again.
        let _ = manager.start(request(Duration::from_secs(1))).expect("restart");
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_running_test_and_clears_after_completion() {
        let manager = manager();
        let id = manager
            .start(request(Duration::from_millis(300)))
            .expect("start");

        let status = manager.status();
        assert!(status.running);
        assert_eq!(status.test_id.as_deref(), Some(id.as_str()));
        assert_eq!(status.profile, Some("constant"));
        assert_eq!(status.duration_seconds, Some(0.3));

        sleep(Duration::from_secs(2)).await;
        let status = manager.status();
        assert!(!status.running);
        assert!(status.test_id.is_none());
    }

    #[tokio::test]
    async fn stop_without_test_is_not_found() {
        let manager = manager();
        assert!(matches!(manager.stop(), Err(Error::NotRunning)));
    }
}
