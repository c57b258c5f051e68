// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The profile engine: parametric load shapes.
//!
//! A [`ProfileSpec`] is the pure wire-level value; [`Profile`] is the
//! runtime engine the scheduler drives, which for the ddos shape carries
//! the evolving spike/idle state for the duration of one test. Both
//! operations take the elapsed test time, so profiles are deterministic
//! functions of time except where a shape is defined by randomness.

use crate::error::Error;
use rand::RngExt;
use ratelab_config::FlexDuration;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::Duration;

/// A load shape with its parameters, as received on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "lowercase")]
pub enum ProfileSpec {
    /// Steady rate.
    #[serde(rename_all = "camelCase")]
    Constant {
        /// Requests per second.
        rps: f64,
    },
    /// Periodic spikes over a base rate.
    #[serde(rename_all = "camelCase")]
    Burst {
        /// Rate between spikes.
        base_rps: f64,
        /// Rate during a spike.
        spike_rps: f64,
        /// Length of each spike.
        spike_duration: FlexDuration,
        /// Distance between spike starts; at least `spike_duration`.
        spike_period: FlexDuration,
    },
    /// Smooth oscillation between two rates.
    #[serde(rename_all = "camelCase")]
    Sinusoidal {
        /// Lower bound of the oscillation.
        min_rps: f64,
        /// Upper bound of the oscillation.
        max_rps: f64,
        /// Full oscillation period.
        period: FlexDuration,
    },
    /// Constant average rate with exponentially distributed inter-arrivals.
    #[serde(rename_all = "camelCase")]
    Poisson {
        /// Average requests per second.
        average_rps: f64,
    },
    /// Alternating random attack spikes and idle stretches.
    #[serde(rename_all = "camelCase")]
    Ddos {
        /// Rate between attacks.
        min_rps: f64,
        /// Rate during an attack.
        max_rps: f64,
        /// Upper bound of a spike segment length.
        max_spike_duration: FlexDuration,
        /// Lower bound of an idle segment length.
        min_idle_time: FlexDuration,
        /// Upper bound of an idle segment length.
        max_idle_time: FlexDuration,
    },
}

impl ProfileSpec {
    /// The profile name used in status reports and log events.
    pub fn name(&self) -> &'static str {
        match self {
            ProfileSpec::Constant { .. } => "constant",
            ProfileSpec::Burst { .. } => "burst",
            ProfileSpec::Sinusoidal { .. } => "sinusoidal",
            ProfileSpec::Poisson { .. } => "poisson",
            ProfileSpec::Ddos { .. } => "ddos",
        }
    }

    /// Checks the declared parameter ranges.
    pub fn validate(&self) -> Result<(), Error> {
        match *self {
            ProfileSpec::Constant { rps } => {
                require(rps.is_finite() && rps > 0.0, "rps must be positive")
            }
            ProfileSpec::Burst {
                base_rps,
                spike_rps,
                spike_duration,
                spike_period,
            } => {
                require(
                    base_rps.is_finite() && base_rps >= 0.0,
                    "baseRps must be non-negative",
                )?;
                require(
                    spike_rps.is_finite() && spike_rps > 0.0,
                    "spikeRps must be positive",
                )?;
                require(
                    spike_duration.get() > Duration::ZERO,
                    "spikeDuration must be positive",
                )?;
                require(
                    spike_period >= spike_duration,
                    "spikePeriod must be at least spikeDuration",
                )
            }
            ProfileSpec::Sinusoidal {
                min_rps,
                max_rps,
                period,
            } => {
                require(
                    min_rps.is_finite() && min_rps >= 0.0,
                    "minRps must be non-negative",
                )?;
                require(
                    max_rps.is_finite() && max_rps >= min_rps,
                    "maxRps must be at least minRps",
                )?;
                require(period.get() > Duration::ZERO, "period must be positive")
            }
            ProfileSpec::Poisson { average_rps } => require(
                average_rps.is_finite() && average_rps > 0.0,
                "averageRps must be positive",
            ),
            ProfileSpec::Ddos {
                min_rps,
                max_rps,
                max_spike_duration,
                min_idle_time,
                max_idle_time,
            } => {
                require(
                    min_rps.is_finite() && min_rps >= 0.0,
                    "minRps must be non-negative",
                )?;
                require(
                    max_rps.is_finite() && max_rps >= min_rps,
                    "maxRps must be at least minRps",
                )?;
                require(
                    max_spike_duration.get() > Duration::ZERO,
                    "maxSpikeDuration must be positive",
                )?;
                require(
                    min_idle_time <= max_idle_time,
                    "maxIdleTime must be at least minIdleTime",
                )
            }
        }
    }

    /// Builds the runtime engine for one test.
    pub fn into_profile(self) -> Profile {
        Profile {
            spec: self,
            ddos: None,
        }
    }
}

fn require(condition: bool, details: &str) -> Result<(), Error> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidProfile {
            details: details.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdosPhase {
    Spike,
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct DdosState {
    phase: DdosPhase,
    /// Elapsed-time deadline at which the current segment ends.
    ends_at: Duration,
}

/// Runtime profile engine driven by the scheduler.
#[derive(Debug)]
pub struct Profile {
    spec: ProfileSpec,
    ddos: Option<DdosState>,
}

impl Profile {
    /// The profile name.
    pub fn name(&self) -> &'static str {
        self.spec.name()
    }

    /// The instantaneous intended rate at `elapsed`.
    pub fn current_rps(&mut self, elapsed: Duration) -> f64 {
        match self.spec {
            ProfileSpec::Constant { rps } => rps,
            ProfileSpec::Burst {
                base_rps,
                spike_rps,
                spike_duration,
                spike_period,
            } => {
                let period_ms = (spike_period.get().as_millis() as u64).max(1);
                let phase = elapsed.as_millis() as u64 % period_ms;
                if phase < spike_duration.get().as_millis() as u64 {
                    spike_rps
                } else {
                    base_rps
                }
            }
            ProfileSpec::Sinusoidal {
                min_rps,
                max_rps,
                period,
            } => {
                let period_ms = period.get().as_millis() as f64;
                if period_ms <= 0.0 {
                    return min_rps;
                }
                let mid = (min_rps + max_rps) / 2.0;
                let amp = (max_rps - min_rps) / 2.0;
                let value = mid + amp * (TAU * elapsed.as_millis() as f64 / period_ms).sin();
                value.clamp(min_rps, max_rps)
            }
            ProfileSpec::Poisson { average_rps } => average_rps,
            ProfileSpec::Ddos {
                min_rps, max_rps, ..
            } => match self.ddos_phase(elapsed) {
                DdosPhase::Spike => max_rps,
                DdosPhase::Idle => min_rps,
            },
        }
    }

    /// Time to wait before the next send when emissions are driven
    /// one-by-one.
    pub fn next_delay(&mut self, elapsed: Duration) -> Duration {
        if let ProfileSpec::Poisson { average_rps } = self.spec {
            return poisson_delay(average_rps);
        }
        let rps = self.current_rps(elapsed);
        if rps > 0.0 {
            Duration::from_secs_f64(1.0 / rps)
        } else {
            Duration::from_secs(1)
        }
    }

    fn ddos_phase(&mut self, elapsed: Duration) -> DdosPhase {
        let ProfileSpec::Ddos {
            max_spike_duration,
            min_idle_time,
            max_idle_time,
            ..
        } = self.spec
        else {
            return DdosPhase::Idle;
        };

        let state = self.ddos.get_or_insert_with(|| DdosState {
            phase: DdosPhase::Idle,
            ends_at: elapsed + draw_idle(min_idle_time, max_idle_time),
        });

        while elapsed >= state.ends_at {
            match state.phase {
                DdosPhase::Idle => {
                    state.phase = DdosPhase::Spike;
                    state.ends_at = elapsed + draw_spike(max_spike_duration);
                }
                DdosPhase::Spike => {
                    // A zero-length idle draw flips straight back to spike
                    // on the next loop pass.
                    state.phase = DdosPhase::Idle;
                    state.ends_at = elapsed + draw_idle(min_idle_time, max_idle_time);
                }
            }
        }
        state.phase
    }
}

fn draw_idle(min_idle: FlexDuration, max_idle: FlexDuration) -> Duration {
    let min_ms = min_idle.get().as_millis() as u64;
    let max_ms = (max_idle.get().as_millis() as u64).max(min_ms);
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

fn draw_spike(max_spike: FlexDuration) -> Duration {
    let max_ms = (max_spike.get().as_millis() as u64).max(1);
    Duration::from_millis(rand::rng().random_range(1..=max_ms))
}

fn poisson_delay(average_rps: f64) -> Duration {
    let u: f64 = rand::rng().random_range(0.0..1.0);
    let secs = -(1.0 - u).ln() / average_rps;
    Duration::from_secs_f64(secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn flex(s: f64) -> FlexDuration {
        FlexDuration(secs(s))
    }

    #[test]
    fn wire_format_round_trips() {
        let spec: ProfileSpec = serde_json::from_str(
            r#"{"type": "burst", "params": {"baseRps": 2, "spikeRps": 50,
                "spikeDuration": "100ms", "spikePeriod": 1}}"#,
        )
        .expect("parse");
        assert_eq!(spec.name(), "burst");
        assert!(spec.validate().is_ok());

        assert!(
            serde_json::from_str::<ProfileSpec>(r#"{"type": "sawtooth", "params": {}}"#).is_err()
        );
    }

    #[test]
    fn constant_holds_its_rate() {
        let mut profile = ProfileSpec::Constant { rps: 10.0 }.into_profile();
        assert_eq!(profile.current_rps(secs(0.0)), 10.0);
        assert_eq!(profile.current_rps(secs(100.0)), 10.0);
        assert_eq!(profile.next_delay(secs(0.0)), Duration::from_millis(100));
    }

    #[test]
    fn burst_switches_on_phase_boundaries() {
        let mut profile = ProfileSpec::Burst {
            base_rps: 2.0,
            spike_rps: 50.0,
            spike_duration: flex(0.1),
            spike_period: flex(1.0),
        }
        .into_profile();
        assert_eq!(profile.current_rps(secs(0.0)), 50.0);
        assert_eq!(profile.current_rps(secs(0.099)), 50.0);
        assert_eq!(profile.current_rps(secs(0.1)), 2.0);
        assert_eq!(profile.current_rps(secs(0.999)), 2.0);
        assert_eq!(profile.current_rps(secs(1.0)), 50.0);
    }

    #[test]
    fn sinusoid_stays_within_declared_range() {
        let mut profile = ProfileSpec::Sinusoidal {
            min_rps: 0.0,
            max_rps: 10.0,
            period: flex(1.0),
        }
        .into_profile();
        assert!((profile.current_rps(secs(0.0)) - 5.0).abs() < 1e-6);
        assert!((profile.current_rps(secs(0.25)) - 10.0).abs() < 1e-6);
        assert!((profile.current_rps(secs(0.75)) - 0.0).abs() < 1e-6);
        for i in 0..200 {
            let rps = profile.current_rps(secs(i as f64 * 0.013));
            assert!((0.0..=10.0).contains(&rps), "out of range: {rps}");
        }
    }

    #[test]
    fn poisson_delays_are_exponential_around_the_mean() {
        let mut profile = ProfileSpec::Poisson { average_rps: 100.0 }.into_profile();
        assert_eq!(profile.current_rps(secs(5.0)), 100.0);

        let n = 2_000;
        let mut sum = Duration::ZERO;
        for _ in 0..n {
            let delay = profile.next_delay(secs(0.0));
            sum += delay;
        }
        let mean = sum.as_secs_f64() / n as f64;
        // The true mean is 10ms; a wide band keeps this robust.
        assert!(mean > 0.005 && mean < 0.02, "mean {mean}");
    }

    #[test]
    fn ddos_emits_only_min_or_max() {
        let mut profile = ProfileSpec::Ddos {
            min_rps: 20.0,
            max_rps: 80.0,
            max_spike_duration: flex(0.05),
            min_idle_time: flex(0.0),
            max_idle_time: flex(0.05),
        }
        .into_profile();
        let mut saw_spike = false;
        for i in 0..500 {
            let rps = profile.current_rps(secs(i as f64 * 0.01));
            assert!(rps == 20.0 || rps == 80.0, "unexpected rate {rps}");
            if rps == 80.0 {
                saw_spike = true;
            }
        }
        // Idle segments cap at 50ms and samples are 10ms apart, so a spike
        // segment must have been observed.
        assert!(saw_spike);
    }

    #[test]
    fn ddos_with_zero_idle_starts_spiking_immediately() {
        let mut profile = ProfileSpec::Ddos {
            min_rps: 0.0,
            max_rps: 100.0,
            max_spike_duration: flex(1.0),
            min_idle_time: flex(0.0),
            max_idle_time: flex(0.0),
        }
        .into_profile();
        assert_eq!(profile.current_rps(secs(0.0)), 100.0);
    }

    #[test]
    fn zero_rate_yields_one_second_idle_tick() {
        let mut profile = ProfileSpec::Burst {
            base_rps: 0.0,
            spike_rps: 10.0,
            spike_duration: flex(0.1),
            spike_period: flex(10.0),
        }
        .into_profile();
        // Well outside the spike.
        assert_eq!(profile.next_delay(secs(5.0)), Duration::from_secs(1));
    }

    #[test]
    fn validation_rejects_out_of_range_parameters() {
        assert!(ProfileSpec::Constant { rps: 0.0 }.validate().is_err());
        assert!(ProfileSpec::Poisson { average_rps: -1.0 }.validate().is_err());
        assert!(
            ProfileSpec::Burst {
                base_rps: 1.0,
                spike_rps: 5.0,
                spike_duration: flex(2.0),
                spike_period: flex(1.0),
            }
            .validate()
            .is_err()
        );
        assert!(
            ProfileSpec::Sinusoidal {
                min_rps: 10.0,
                max_rps: 5.0,
                period: flex(1.0),
            }
            .validate()
            .is_err()
        );
        assert!(
            ProfileSpec::Ddos {
                min_rps: 0.0,
                max_rps: 10.0,
                max_spike_duration: flex(1.0),
                min_idle_time: flex(2.0),
                max_idle_time: flex(1.0),
            }
            .validate()
            .is_err()
        );
    }
}
