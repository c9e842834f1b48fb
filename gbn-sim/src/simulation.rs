//! Simulation controller.
//!
//! [`Simulation`] is the session object a presentation layer talks to.  It
//! owns the [`ProtocolMachine`], drives the virtual clock and decides, for
//! every event that comes due, whether it is still valid:
//!
//! | Lifecycle   | Current-epoch event                 | Older epoch |
//! |-------------|-------------------------------------|-------------|
//! | `Running`   | dispatched                          | dropped     |
//! | `Paused`    | timer expiry gated; others deferred | dropped     |
//! | `Idle`      | dropped                             | dropped     |
//! | `Completed` | dropped                             | dropped     |
//!
//! The clock only moves when the owner asks it to (`step`, `run_until`,
//! `run_to_completion`), so a whole run is deterministic for a given seed.
//! [`crate::driver`] ties the clock to wall time.

use std::time::Duration;

use crate::config::{ConfigError, ErrorMode, SimConfig};
use crate::event::{Event, Scheduled};
use crate::packet::UnitKind;
use crate::presentation::{LogLevel, Presentation};
use crate::protocol::ProtocolMachine;
use crate::state::{Lifecycle, RunState, SimStats};

/// An event held back while paused, with the time it still had to run.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    remaining: Duration,
    epoch: u64,
    event: Event,
}

#[derive(Debug)]
pub struct Simulation<P> {
    machine: ProtocolMachine<P>,
    deferred: Vec<Deferred>,
}

impl<P: Presentation> Simulation<P> {
    /// Validate `config` and initialise a run in `Idle`.
    pub fn new(config: SimConfig, presentation: P) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            machine: ProtocolMachine::new(config, presentation),
            deferred: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn start(&mut self) {
        match self.lifecycle() {
            Lifecycle::Idle => {
                self.machine.set_lifecycle(Lifecycle::Running);
                self.machine.emit(LogLevel::Info, "Starting simulation");
                self.machine.send_window_packets();
            }
            Lifecycle::Running | Lifecycle::Paused => {
                self.machine.emit(LogLevel::Warning, "Simulation already running");
            }
            Lifecycle::Completed => {
                self.machine.emit(
                    LogLevel::Warning,
                    "Simulation already complete, reset to run again",
                );
            }
        }
    }

    /// Freeze transmission progress.  Queues and timers are kept.
    pub fn pause(&mut self) {
        if self.lifecycle() != Lifecycle::Running {
            return;
        }
        let now = self.now();
        let held: Vec<Scheduled> = self
            .machine
            .events_mut()
            .extract(|s| !matches!(s.event, Event::TimerExpired { .. }));
        self.deferred.extend(held.into_iter().map(|s| Deferred {
            remaining: s.at.saturating_sub(now),
            epoch: s.epoch,
            event: s.event,
        }));

        self.machine.set_lifecycle(Lifecycle::Paused);
        self.machine.notify_paused(true);
        self.machine.emit(LogLevel::Info, "Simulation paused");
    }

    /// Replay deferred events and continue the active phase.
    pub fn resume(&mut self) {
        if self.lifecycle() != Lifecycle::Paused {
            return;
        }
        self.machine.set_lifecycle(Lifecycle::Running);
        for d in self.deferred.drain(..) {
            self.machine
                .events_mut()
                .schedule(d.remaining, d.epoch, d.event);
        }
        self.machine.notify_paused(false);
        self.machine.emit(LogLevel::Info, "Simulation resumed");
        self.machine.resume_phase();
    }

    pub fn toggle_pause(&mut self) {
        match self.lifecycle() {
            Lifecycle::Running => self.pause(),
            Lifecycle::Paused => self.resume(),
            _ => {}
        }
    }

    /// Abort everything and go back to `Idle` with fresh packets.
    pub fn reset(&mut self) {
        if self.lifecycle() == Lifecycle::Paused {
            self.machine.notify_paused(false);
        }
        self.deferred.clear();
        self.machine.emit(LogLevel::Info, "Simulation reset");
        self.machine.reinitialize();
    }

    /// Replace the configuration; implies a reset.
    pub fn configure(&mut self, config: SimConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if self.lifecycle() == Lifecycle::Paused {
            self.machine.notify_paused(false);
        }
        self.deferred.clear();
        self.machine.reconfigure(config);
        Ok(())
    }

    /// Change the random-mode loss rate, also mid-run.
    pub fn set_error_rate(&mut self, rate: u8) {
        self.machine.set_error_rate(rate);
    }

    // -----------------------------------------------------------------------
    // Presentation → core
    // -----------------------------------------------------------------------

    /// The presentation finished showing the transit of `(seq, kind)`.
    ///
    /// Returns `false` if that unit is not the one in flight.
    pub fn on_transmission_complete(&mut self, seq: u32, kind: UnitKind) -> bool {
        let Some(id) = self.machine.in_flight_id(seq, kind) else {
            log::debug!("[gbn] completion of {kind} {seq} ignored: not in flight");
            return false;
        };
        let event = Event::Arrival { seq, kind, id };
        match self.lifecycle() {
            Lifecycle::Running => {
                self.machine.dispatch(event);
                true
            }
            Lifecycle::Paused => {
                let epoch = self.state().epoch();
                self.deferred.push(Deferred {
                    remaining: Duration::ZERO,
                    epoch,
                    event,
                });
                true
            }
            Lifecycle::Idle | Lifecycle::Completed => false,
        }
    }

    /// Manual-mode loss of the unit `(seq, kind)` currently in flight.
    pub fn on_transmission_lost(&mut self, seq: u32, kind: UnitKind) -> bool {
        if self.lifecycle() != Lifecycle::Running {
            log::debug!("[gbn] loss of {kind} {seq} ignored: simulation not running");
            return false;
        }
        if self.config().error_mode != ErrorMode::Manual {
            self.machine.emit(
                LogLevel::Warning,
                "Manual loss is only available in manual error mode",
            );
            return false;
        }
        self.machine.signal_loss(seq, kind)
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Fire the next scheduled event, however far away.  Returns `false`
    /// when the queue is empty.
    pub fn step(&mut self) -> bool {
        match self.machine.events_mut().pop_until(Duration::MAX) {
            Some(s) => {
                self.handle(s);
                true
            }
            None => false,
        }
    }

    /// Fire every event due at or before `t` and move the clock to `t`.
    pub fn run_until(&mut self, t: Duration) {
        while let Some(s) = self.machine.events_mut().pop_until(t) {
            self.handle(s);
        }
        self.machine.events_mut().advance_to(t);
    }

    pub fn run_for(&mut self, d: Duration) {
        let t = self.now() + d;
        self.run_until(t);
    }

    /// Start (if idle) and run until the run completes, stops running, or
    /// the clock would pass `limit`.
    pub fn run_to_completion(&mut self, limit: Duration) -> Lifecycle {
        if self.lifecycle() == Lifecycle::Idle {
            self.start();
        }
        while self.lifecycle() == Lifecycle::Running {
            match self.next_event_at() {
                Some(at) if at <= limit => {
                    self.step();
                }
                _ => break,
            }
        }
        self.lifecycle()
    }

    fn handle(&mut self, s: Scheduled) {
        if s.epoch != self.state().epoch() {
            log::debug!("[gbn] stale {:?} from epoch {} dropped", s.event, s.epoch);
            return;
        }
        match self.lifecycle() {
            Lifecycle::Running => self.machine.dispatch(s.event),
            Lifecycle::Paused => match s.event {
                Event::TimerExpired { seq, token } => self.machine.gate_timer(seq, token),
                event => self.deferred.push(Deferred {
                    remaining: Duration::ZERO,
                    epoch: s.epoch,
                    event,
                }),
            },
            Lifecycle::Idle | Lifecycle::Completed => {
                log::debug!("[gbn] {:?} dropped: simulation {}", s.event, self.lifecycle());
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.machine.events().now()
    }

    pub fn next_event_at(&self) -> Option<Duration> {
        self.machine.events().next_due()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.machine.state().lifecycle()
    }

    pub fn state(&self) -> &RunState {
        self.machine.state()
    }

    pub fn config(&self) -> &SimConfig {
        self.machine.config()
    }

    pub fn stats(&self) -> SimStats {
        self.machine.state().stats()
    }

    pub fn is_stalled(&self) -> bool {
        self.machine.is_stalled()
    }

    pub fn armed_timers(&self) -> usize {
        self.machine.timers().len()
    }

    pub fn presentation(&self) -> &P {
        self.machine.presentation()
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        self.machine.presentation_mut()
    }

    pub fn into_presentation(self) -> P {
        self.machine.into_presentation()
    }
}
