//! Lossy channel model.
//!
//! The [`ChannelModel`] decides, once per transmission attempt, whether a
//! unit is lost.  It knows nothing about the protocol; the state machine asks
//! it when an ACK leaves the receiver and acts on the answer when the ACK's
//! transit ends.
//!
//! | Mode     | Data packets | ACKs                                  |
//! |----------|--------------|---------------------------------------|
//! | `None`   | delivered    | delivered                             |
//! | `Random` | delivered    | dropped with `error_rate / 100`       |
//! | `Manual` | delivered    | delivered (loss is signalled instead) |
//!
//! Random mode only ever loses the return path, so every failure in that mode
//! is recovered by the base timeout.
//!
//! The RNG is seedable so that test runs are reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ErrorMode;
use crate::packet::UnitKind;

#[derive(Debug)]
pub struct ChannelModel {
    mode: ErrorMode,
    /// Percent in `0..=100`.
    error_rate: u8,
    rng: StdRng,
}

impl ChannelModel {
    /// Build a channel; `seed = None` draws the seed from the OS.
    pub fn new(mode: ErrorMode, error_rate: u8, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            mode,
            error_rate: error_rate.min(100),
            rng,
        }
    }

    pub fn error_rate(&self) -> u8 {
        self.error_rate
    }

    /// Change the random-mode loss rate, clamped to 100 %.
    pub fn set_error_rate(&mut self, rate: u8) {
        self.error_rate = rate.min(100);
    }

    /// Decide the fate of one unit.
    pub fn should_drop(&mut self, kind: UnitKind) -> bool {
        match self.mode {
            ErrorMode::None | ErrorMode::Manual => false,
            ErrorMode::Random => match kind {
                UnitKind::Packet => false,
                UnitKind::Ack => {
                    self.rng.random_bool(f64::from(self.error_rate) / 100.0)
                }
            },
        }
    }
}
