//! Simulation parameters.
//!
//! A [`SimConfig`] is fixed for the duration of a run; changing it goes
//! through [`crate::simulation::Simulation::configure`], which resets the run.
//! The only exception is the random-mode error rate, see
//! [`crate::simulation::Simulation::set_error_rate`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default number of packets in a run.
pub const DEFAULT_PACKET_COUNT: u32 = 10;
/// Default Go-Back-N window size (N).
pub const DEFAULT_WINDOW_SIZE: u32 = 4;
/// Default retransmission timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(40_000);
/// Default playback speed multiplier.
pub const DEFAULT_ANIMATION_SPEED: f64 = 2.0;
/// Default random-mode ACK loss rate in percent.
pub const DEFAULT_ERROR_RATE: u8 = 10;

/// How the channel loses units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Lossless channel.
    #[default]
    None,
    /// ACKs are dropped with probability `error_rate / 100`.
    Random,
    /// Units are only lost when explicitly marked via
    /// [`crate::simulation::Simulation::on_transmission_lost`].
    Manual,
}

impl fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorMode::None => "none",
            ErrorMode::Random => "random",
            ErrorMode::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl FromStr for ErrorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ErrorMode::None),
            "random" => Ok(ErrorMode::Random),
            "manual" => Ok(ErrorMode::Manual),
            _ => Err(ConfigError::UnknownErrorMode(s.to_string())),
        }
    }
}

/// Who reports the end of a simulated transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// The core schedules the arrival itself after the transit delay.
    #[default]
    Scheduled,
    /// The presentation layer calls
    /// [`crate::simulation::Simulation::on_transmission_complete`].
    External,
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("packet count must be at least 1")]
    PacketCount,
    #[error("window size must be at least 1")]
    WindowSize,
    #[error("timeout must be greater than zero")]
    Timeout,
    #[error("animation speed must be a positive number, got {0}")]
    AnimationSpeed(f64),
    #[error("animation speed {0} is too slow: transit time does not fit in a duration")]
    TransitTime(f64),
    #[error("error rate must be within 0..=100 percent, got {0}")]
    ErrorRate(u8),
    #[error("unknown error mode {0:?} (expected none, random or manual)")]
    UnknownErrorMode(String),
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub packet_count: u32,
    pub window_size: u32,
    /// Per-packet retransmission timeout.
    pub timeout: Duration,
    /// Playback multiplier; a unit's transit takes `TRANSIT_TIME / speed`.
    pub animation_speed: f64,
    pub error_mode: ErrorMode,
    /// Percent, only used in [`ErrorMode::Random`].
    pub error_rate: u8,
    /// Seed for the channel RNG; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub delivery: Delivery,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            packet_count: DEFAULT_PACKET_COUNT,
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: DEFAULT_TIMEOUT,
            animation_speed: DEFAULT_ANIMATION_SPEED,
            error_mode: ErrorMode::None,
            error_rate: DEFAULT_ERROR_RATE,
            seed: None,
            delivery: Delivery::Scheduled,
        }
    }
}

impl SimConfig {
    pub fn new(packet_count: u32, window_size: u32) -> Self {
        Self {
            packet_count,
            window_size,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_animation_speed(mut self, speed: f64) -> Self {
        self.animation_speed = speed;
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn with_error_rate(mut self, rate: u8) -> Self {
        self.error_rate = rate;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_count == 0 {
            return Err(ConfigError::PacketCount);
        }
        if self.window_size == 0 {
            return Err(ConfigError::WindowSize);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Timeout);
        }
        if !(self.animation_speed.is_finite() && self.animation_speed > 0.0) {
            return Err(ConfigError::AnimationSpeed(self.animation_speed));
        }
        if crate::protocol::transit_delay(self.animation_speed).is_none() {
            return Err(ConfigError::TransitTime(self.animation_speed));
        }
        if self.error_rate > 100 {
            return Err(ConfigError::ErrorRate(self.error_rate));
        }
        Ok(())
    }
}
