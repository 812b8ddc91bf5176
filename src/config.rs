use std::time::Duration;
use thiserror::Error;

/// What to do when a peer's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the envelope that did not fit and keep the peer.
    DropNewest,
    /// Evict the slow peer from its room.
    #[default]
    Disconnect,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ping period ({ping:?}) must be shorter than pong wait ({pong:?})")]
    KeepaliveOrder { ping: Duration, pong: Duration },
    #[error("{0} must be at least 1")]
    ZeroCapacity(&'static str),
}

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for each outbound send.
    pub write_wait: Duration,
    /// Read deadline, refreshed by every pong from the peer.
    pub pong_wait: Duration,
    /// Keepalive probe interval.
    pub ping_period: Duration,
    /// Largest inbound frame in bytes.
    pub max_message_size: usize,
    /// Bound of each endpoint's outbound queue.
    pub outbound_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Informational; joins beyond it are not rejected.
    pub room_capacity: usize,
    /// How long a freshly created room waits for its first member.
    pub admission_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            outbound_capacity: 64,
            overflow_policy: OverflowPolicy::default(),
            room_capacity: 4,
            admission_window: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Set the read deadline and derive the ping period from it (9/10).
    pub fn with_keepalive(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self.ping_period = pong_wait * 9 / 10;
        self
    }

    pub fn with_write_wait(mut self, write_wait: Duration) -> Self {
        self.write_wait = write_wait;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_room_capacity(mut self, capacity: usize) -> Self {
        self.room_capacity = capacity;
        self
    }

    pub fn with_admission_window(mut self, window: Duration) -> Self {
        self.admission_window = window;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_period >= self.pong_wait {
            return Err(ConfigError::KeepaliveOrder { ping: self.ping_period, pong: self.pong_wait });
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("outbound_capacity"));
        }
        if self.room_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("room_capacity"));
        }
        Ok(())
    }
}
