// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The load scheduler: turns a profile into concrete dispatches.
//!
//! Two interchangeable realizations. The interval scheduler is one
//! cooperative worker that sleeps the profile's `next_delay` between
//! single dispatches; the tick scheduler emits `floor(rps * tick + carry)`
//! dispatches on a fixed period and carries the fractional remainder.
//!
//! Shared guarantees: no dispatch after `stop()`, exactly one completion
//! result observable through [`RunningScheduler::wait`], and every sleep is
//! interruptible by the cancellation token so a stop takes effect within
//! one tick.

use crate::dispatcher::Dispatch;
use crate::error::Error;
use crate::profile::Profile;
use ratelab_config::settings::SchedulerChoice;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

/// Timing knobs of the scheduler worker.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    /// Sleep applied when the profile rate is zero (interval scheduler).
    pub idle_delay: Duration,
    /// Tick period of the tick scheduler.
    pub tick_period: Duration,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(100),
            tick_period: Duration::from_millis(100),
        }
    }
}

/// Handle to a spawned scheduler worker.
pub struct RunningScheduler {
    cancel: CancellationToken,
    worker: JoinHandle<Result<(), Error>>,
}

impl RunningScheduler {
    /// Requests the worker to stop. Idempotent; a no-op on a finished
    /// scheduler.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A clone of the stop token, for callers that hand the scheduler
    /// itself to a completion watcher.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the worker has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Awaits the single completion result of the worker.
    pub async fn wait(self) -> Result<(), Error> {
        match self.worker.await {
            Ok(result) => result,
            Err(e) => Err(Error::Scheduler {
                details: e.to_string(),
            }),
        }
    }
}

/// Spawns the selected scheduler realization over `profile` for `duration`.
pub fn spawn_scheduler(
    choice: SchedulerChoice,
    profile: Profile,
    duration: Duration,
    dispatcher: Arc<dyn Dispatch>,
    timing: SchedulerTiming,
) -> RunningScheduler {
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let worker = match choice {
        SchedulerChoice::Interval => tokio::spawn(run_interval(
            profile,
            duration,
            dispatcher,
            timing.idle_delay,
            worker_cancel,
        )),
        SchedulerChoice::Tick => tokio::spawn(run_tick(
            profile,
            duration,
            dispatcher,
            timing.tick_period,
            worker_cancel,
        )),
    };
    RunningScheduler { cancel, worker }
}

async fn run_interval(
    mut profile: Profile,
    duration: Duration,
    dispatcher: Arc<dyn Dispatch>,
    idle_delay: Duration,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let start = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return Ok(());
        }

        let rps = profile.current_rps(elapsed);
        if !(rps > 0.0) {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(idle_delay.max(Duration::from_millis(1))) => {}
            }
            continue;
        }

        let delay = profile.next_delay(elapsed);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = sleep(delay) => {}
        }
        // The sleep may have crossed the stop request or the deadline.
        if cancel.is_cancelled() || start.elapsed() >= duration {
            return Ok(());
        }
        dispatcher.dispatch().await;
    }
}

async fn run_tick(
    mut profile: Profile,
    duration: Duration,
    dispatcher: Arc<dyn Dispatch>,
    tick_period: Duration,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let start = Instant::now();
    let mut carry = 0.0f64;
    let mut ticker = interval(tick_period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return Ok(());
        }

        let expected = profile.current_rps(elapsed) * tick_period.as_secs_f64() + carry;
        if !expected.is_finite() || expected < 0.0 {
            return Err(Error::Scheduler {
                details: format!("profile produced an unusable dispatch count ({expected})"),
            });
        }
        let emit = expected.floor() as u64;
        carry = expected - emit as f64;

        for _ in 0..emit {
            if cancel.is_cancelled() {
                return Ok(());
            }
            dispatcher.dispatch().await;
        }
    }
}
