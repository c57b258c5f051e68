// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Flexible duration grammar for operator requests.
//!
//! Three input shapes are accepted, matching what operators actually paste
//! into start requests:
//!
//! - bare numbers, interpreted as seconds (`15`, `0.5`)
//! - terse unit strings via humantime (`500ms`, `10s`, `2m`, `1h`, `1d`)
//! - ISO-8601 durations (`PT30S`, `PT2M30S`)
//!
//! Anything else is rejected so the control API can answer 400.

use crate::error::Error;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// A duration parsed from any of the accepted grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlexDuration(pub Duration);

impl FlexDuration {
    /// The underlying duration.
    pub fn get(&self) -> Duration {
        self.0
    }

    /// Parses a duration string: terse humantime units or ISO-8601.
    pub fn parse(input: &str) -> Result<FlexDuration, Error> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty string"));
        }
        // Bare numeric strings mean seconds, same as the JSON number form.
        if let Ok(secs) = trimmed.parse::<f64>() {
            return Self::from_secs_f64(trimmed, secs);
        }
        if trimmed.starts_with('P') || trimmed.starts_with("p") {
            return parse_iso8601(trimmed);
        }
        match humantime::parse_duration(trimmed) {
            Ok(d) => Ok(FlexDuration(d)),
            Err(e) => Err(invalid(input, &e.to_string())),
        }
    }

    fn from_secs_f64(input: &str, secs: f64) -> Result<FlexDuration, Error> {
        if !secs.is_finite() || secs < 0.0 || secs > 1e12 {
            return Err(invalid(input, "seconds must be a non-negative number"));
        }
        Ok(FlexDuration(Duration::from_secs_f64(secs)))
    }
}

impl From<Duration> for FlexDuration {
    fn from(d: Duration) -> Self {
        FlexDuration(d)
    }
}

fn invalid(input: &str, details: &str) -> Error {
    Error::InvalidDuration {
        input: input.to_string(),
        details: details.to_string(),
    }
}

fn parse_iso8601(input: &str) -> Result<FlexDuration, Error> {
    let parsed = iso8601::duration(input).map_err(|e| invalid(input, &e))?;
    match parsed {
        iso8601::Duration::YMDHMS {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        } => {
            // Calendar-relative units have no fixed length; test durations
            // are bounded anyway, so reject them instead of guessing.
            if year != 0 || month != 0 {
                return Err(invalid(input, "year/month durations are not supported"));
            }
            let secs = u64::from(day) * 86_400
                + u64::from(hour) * 3_600
                + u64::from(minute) * 60
                + u64::from(second);
            Ok(FlexDuration(
                Duration::from_secs(secs) + Duration::from_millis(u64::from(millisecond)),
            ))
        }
        iso8601::Duration::Weeks(weeks) => Ok(FlexDuration(Duration::from_secs(
            u64::from(weeks) * 7 * 86_400,
        ))),
    }
}

impl Serialize for FlexDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for FlexDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FlexDurationVisitor)
    }
}

struct FlexDurationVisitor;

impl Visitor<'_> for FlexDurationVisitor {
    type Value = FlexDuration;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a number of seconds, a duration string like '10s', or ISO-8601")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(FlexDuration(Duration::from_secs(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        if v < 0 {
            return Err(E::custom("duration seconds must be non-negative"));
        }
        Ok(FlexDuration(Duration::from_secs(v as u64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        FlexDuration::from_secs_f64(&v.to_string(), v).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        FlexDuration::parse(v).map_err(E::custom)
    }
}
