// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The three atomic decision scripts.
//!
//! Each admission check is one server-side Lua script with keys and
//! arguments declared up front; the check-and-mutate sequence must never be
//! split into separate round trips. The fixed and sliding keys are derived
//! from the caller's clock (window boundaries are aligned to the window
//! length, not to wall-clock minutes); the token bucket reads the store
//! host's clock via `TIME` and clamps negative deltas so replica clock skew
//! cannot mint tokens.

use crate::error::Error;
use redis::Script;
use redis::aio::ConnectionManager;

const FIXED_LUA: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
if count <= tonumber(ARGV[2]) then
  return 1
end
return 0
"#;

const SLIDING_LUA: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[1]) * 2)
end
local previous = tonumber(redis.call('GET', KEYS[2]) or '0')
local window_ms = tonumber(ARGV[1])
local elapsed = tonumber(ARGV[2])
local weight = (window_ms - elapsed) / window_ms
if weight < 0 then
  weight = 0
end
if weight > 1 then
  weight = 1
end
if previous * weight + current <= tonumber(ARGV[3]) then
  return 1
end
return 0
"#;

const TOKEN_LUA: &str = r#"
local time = redis.call('TIME')
local now_ms = time[1] * 1000 + math.floor(time[2] / 1000)
local capacity = tonumber(ARGV[1])
local fill_rate = tonumber(ARGV[2])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'lastRefillMs')
local tokens = tonumber(state[1])
local last_refill = tonumber(state[2])
if tokens == nil or last_refill == nil then
  tokens = capacity
  last_refill = now_ms
end
local delta = now_ms - last_refill
if delta < 0 then
  delta = 0
end
tokens = tokens + (delta / 1000) * fill_rate
if tokens > capacity then
  tokens = capacity
end
local allowed = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
end
redis.call('HSET', KEYS[1], 'tokens', tokens, 'lastRefillMs', now_ms)
redis.call('PEXPIRE', KEYS[1], tonumber(ARGV[3]))
return allowed
"#;

/// Compiled decision scripts, one per algorithm.
///
/// `redis::Script` invokes by SHA and transparently reloads on `NOSCRIPT`,
/// so a store restart does not break the decision path.
pub struct DecisionScripts {
    fixed: Script,
    sliding: Script,
    token: Script,
}

impl DecisionScripts {
    /// Compiles the three scripts.
    pub fn new() -> Self {
        Self {
            fixed: Script::new(FIXED_LUA),
            sliding: Script::new(SLIDING_LUA),
            token: Script::new(TOKEN_LUA),
        }
    }

    /// Fixed window: increment the current window's counter and admit while
    /// it stays within the limit.
    pub async fn check_fixed(
        &self,
        conn: &mut ConnectionManager,
        limit: u64,
        window_seconds: u64,
        now_ms: u64,
    ) -> Result<bool, Error> {
        let allowed: i64 = self
            .fixed
            .key(fixed_window_key(now_ms, window_seconds))
            .arg(window_seconds)
            .arg(limit)
            .invoke_async(conn)
            .await?;
        Ok(allowed == 1)
    }

    /// Sliding window: increment the current bucket and admit while the
    /// weighted estimate over the current and previous buckets stays within
    /// the limit.
    pub async fn check_sliding(
        &self,
        conn: &mut ConnectionManager,
        limit: u64,
        window_seconds: u64,
        now_ms: u64,
    ) -> Result<bool, Error> {
        let windows = sliding_windows(now_ms, window_seconds);
        let allowed: i64 = self
            .sliding
            .key(windows.current_key())
            .key(windows.previous_key())
            .arg(windows.window_ms)
            .arg(windows.elapsed_in_window)
            .arg(limit)
            .invoke_async(conn)
            .await?;
        Ok(allowed == 1)
    }

    /// Token bucket: refill from the store host's clock, then draw one
    /// token if available.
    pub async fn check_token(
        &self,
        conn: &mut ConnectionManager,
        capacity: u64,
        fill_rate: f64,
    ) -> Result<bool, Error> {
        let allowed: i64 = self
            .token
            .key(crate::keys::TOKEN_KEY)
            .arg(capacity)
            .arg(fill_rate)
            .arg(token_ttl_ms(capacity, fill_rate))
            .invoke_async(conn)
            .await?;
        Ok(allowed == 1)
    }
}

impl Default for DecisionScripts {
    fn default() -> Self {
        Self::new()
    }
}

/// Key of the fixed window containing `now_ms`, aligned to the window
/// length in seconds.
fn fixed_window_key(now_ms: u64, window_seconds: u64) -> String {
    let window_id = (now_ms / 1000) / window_seconds.max(1);
    format!("{}{}", crate::keys::FIXED_PREFIX, window_id)
}

/// The two sliding buckets around `now_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlidingWindows {
    window_ms: u64,
    current_start: u64,
    previous_start: i64,
    elapsed_in_window: u64,
}

impl SlidingWindows {
    fn current_key(&self) -> String {
        format!("{}{}", crate::keys::SLIDING_PREFIX, self.current_start)
    }

    fn previous_key(&self) -> String {
        format!("{}{}", crate::keys::SLIDING_PREFIX, self.previous_start)
    }
}

fn sliding_windows(now_ms: u64, window_seconds: u64) -> SlidingWindows {
    let window_ms = window_seconds.max(1) * 1000;
    let current_start = now_ms - (now_ms % window_ms);
    SlidingWindows {
        window_ms,
        current_start,
        previous_start: current_start as i64 - window_ms as i64,
        elapsed_in_window: now_ms - current_start,
    }
}

/// TTL for the token bucket hash: twice the full-drain-to-full-refill time,
/// floored at one second.
fn token_ttl_ms(capacity: u64, fill_rate: f64) -> u64 {
    let refill_ms = (capacity as f64 / fill_rate) * 2000.0;
    (refill_ms.ceil() as u64).max(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_key_aligns_to_window_length() {
        // 90s into the epoch with a 60s window is window id 1.
        assert_eq!(fixed_window_key(90_000, 60), "ratelimiter:fixed:1");
        // Seconds-aligned to the window, not to wall-clock minutes.
        assert_eq!(fixed_window_key(90_000, 45), "ratelimiter:fixed:2");
        assert_eq!(fixed_window_key(0, 60), "ratelimiter:fixed:0");
    }

    #[test]
    fn sliding_windows_partition_time() {
        let w = sliding_windows(2_500, 1);
        assert_eq!(w.window_ms, 1_000);
        assert_eq!(w.current_start, 2_000);
        assert_eq!(w.previous_start, 1_000);
        assert_eq!(w.elapsed_in_window, 500);
    }

    #[test]
    fn sliding_windows_at_boundary_have_zero_elapsed() {
        let w = sliding_windows(3_000, 1);
        assert_eq!(w.current_start, 3_000);
        assert_eq!(w.elapsed_in_window, 0);
    }

    #[test]
    fn sliding_first_window_has_negative_previous_start() {
        // Near the epoch the previous bucket does not exist; the key is
        // still well-formed and the script reads it as zero.
        let w = sliding_windows(500, 1);
        assert_eq!(w.previous_start, -1_000);
        assert_eq!(w.previous_key(), "ratelimiter:sliding:-1000");
    }

    #[test]
    fn token_ttl_scales_with_drain_time() {
        // 100 tokens at 50/s refills in 2s; TTL doubles that.
        assert_eq!(token_ttl_ms(100, 50.0), 4_000);
        // Fast buckets floor at one second.
        assert_eq!(token_ttl_ms(1, 1_000.0), 1_000);
    }

    #[test]
    fn scripts_keep_single_round_trip_shape() {
        // The atomicity contract lives in the script text: every mutation
        // and the admission comparison happen server-side.
        assert!(FIXED_LUA.contains("INCR"));
        assert!(FIXED_LUA.contains("EXPIRE"));
        assert!(SLIDING_LUA.contains("PEXPIRE"));
        assert!(SLIDING_LUA.contains("weight"));
        assert!(TOKEN_LUA.contains("TIME"));
        assert!(TOKEN_LUA.contains("HMGET"));
        assert!(TOKEN_LUA.contains("PEXPIRE"));
    }
}
