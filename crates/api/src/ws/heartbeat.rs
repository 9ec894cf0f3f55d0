use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Text frame sent as the liveness ping.
pub const PING_TEXT: &str = "ping";

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Time between pings.
    pub interval: Duration,
    /// Pings a client may leave unanswered before it is dropped.
    pub max_missed: u32,
}

impl HeartbeatConfig {
    /// Longest tolerated silence from the client.
    pub fn silence_limit(&self) -> Duration {
        self.interval * (self.max_missed + 1)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_missed: 2,
        }
    }
}

/// Liveness state of one connection. Any inbound frame counts as an ack.
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_seen: Instant,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_seen: Instant::now(),
        }
    }

    pub fn ack(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_expired(&self) -> bool {
        self.last_seen.elapsed() > self.config.silence_limit()
    }

    /// Ping schedule. The first tick completes immediately.
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
