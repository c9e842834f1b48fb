//! Interface between the protocol core and whatever displays it.
//!
//! The core never renders anything.  It calls out through [`Presentation`]
//! and, in [`crate::config::Delivery::External`] mode, waits for the
//! presentation to report back through
//! [`crate::simulation::Simulation::on_transmission_complete`].
//!
//! Two implementations ship with the crate:
//! - [`Recorder`] keeps every notification in memory (tests, replay).
//! - [`Console`] prints the log stream to stdout (the CLI).

use std::fmt;

use crate::packet::{PacketStatus, UnitKind};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Calls from the core to the presentation layer.
///
/// None of them return anything the core depends on.
pub trait Presentation {
    /// A unit starts crossing the channel.
    fn notify_transmission_start(&mut self, seq: u32, kind: UnitKind);

    /// Packet `seq` changed status; the window indicator may need a refresh.
    fn notify_status_changed(&mut self, seq: u32, status: PacketStatus);

    fn notify_window_moved(&mut self, old_base: u32, new_base: u32);

    fn notify_log(&mut self, message: &str, level: LogLevel);

    /// Abort any in-flight visual for this unit.
    fn notify_cancel_transmission(&mut self, seq: u32, kind: UnitKind);

    /// Freeze (`true`) or unfreeze in-flight visuals.
    fn notify_paused(&mut self, _paused: bool) {}
}

/// Discards everything.
impl Presentation for () {
    fn notify_transmission_start(&mut self, _seq: u32, _kind: UnitKind) {}
    fn notify_status_changed(&mut self, _seq: u32, _status: PacketStatus) {}
    fn notify_window_moved(&mut self, _old_base: u32, _new_base: u32) {}
    fn notify_log(&mut self, _message: &str, _level: LogLevel) {}
    fn notify_cancel_transmission(&mut self, _seq: u32, _kind: UnitKind) {}
}

impl<P: Presentation + ?Sized> Presentation for Box<P> {
    fn notify_transmission_start(&mut self, seq: u32, kind: UnitKind) {
        (**self).notify_transmission_start(seq, kind)
    }
    fn notify_status_changed(&mut self, seq: u32, status: PacketStatus) {
        (**self).notify_status_changed(seq, status)
    }
    fn notify_window_moved(&mut self, old_base: u32, new_base: u32) {
        (**self).notify_window_moved(old_base, new_base)
    }
    fn notify_log(&mut self, message: &str, level: LogLevel) {
        (**self).notify_log(message, level)
    }
    fn notify_cancel_transmission(&mut self, seq: u32, kind: UnitKind) {
        (**self).notify_cancel_transmission(seq, kind)
    }
    fn notify_paused(&mut self, paused: bool) {
        (**self).notify_paused(paused)
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// One captured call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    TransmissionStart { seq: u32, kind: UnitKind },
    StatusChanged { seq: u32, status: PacketStatus },
    WindowMoved { old_base: u32, new_base: u32 },
    Log { message: String, level: LogLevel },
    CancelTransmission { seq: u32, kind: UnitKind },
    Paused(bool),
}

/// Presentation that records every notification in order.
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    pub events: Vec<Notification>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(seq, kind)` of every transmission start, in order.
    pub fn transmissions(&self) -> Vec<(u32, UnitKind)> {
        self.events
            .iter()
            .filter_map(|n| match *n {
                Notification::TransmissionStart { seq, kind } => Some((seq, kind)),
                _ => None,
            })
            .collect()
    }

    /// Sequence numbers of transmissions of one kind, in order.
    pub fn sent(&self, kind: UnitKind) -> Vec<u32> {
        self.transmissions()
            .into_iter()
            .filter(|&(_, k)| k == kind)
            .map(|(seq, _)| seq)
            .collect()
    }

    pub fn window_moves(&self) -> Vec<(u32, u32)> {
        self.events
            .iter()
            .filter_map(|n| match *n {
                Notification::WindowMoved { old_base, new_base } => Some((old_base, new_base)),
                _ => None,
            })
            .collect()
    }

    pub fn cancellations(&self) -> Vec<(u32, UnitKind)> {
        self.events
            .iter()
            .filter_map(|n| match *n {
                Notification::CancelTransmission { seq, kind } => Some((seq, kind)),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> impl Iterator<Item = (&str, LogLevel)> {
        self.events.iter().filter_map(|n| match n {
            Notification::Log { message, level } => Some((message.as_str(), *level)),
            _ => None,
        })
    }

    /// Number of log entries containing `needle`.
    pub fn count_logs(&self, needle: &str) -> usize {
        self.logs().filter(|(m, _)| m.contains(needle)).count()
    }

    pub fn has_log(&self, needle: &str) -> bool {
        self.count_logs(needle) > 0
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Presentation for Recorder {
    fn notify_transmission_start(&mut self, seq: u32, kind: UnitKind) {
        self.events.push(Notification::TransmissionStart { seq, kind });
    }
    fn notify_status_changed(&mut self, seq: u32, status: PacketStatus) {
        self.events.push(Notification::StatusChanged { seq, status });
    }
    fn notify_window_moved(&mut self, old_base: u32, new_base: u32) {
        self.events.push(Notification::WindowMoved { old_base, new_base });
    }
    fn notify_log(&mut self, message: &str, level: LogLevel) {
        self.events.push(Notification::Log {
            message: message.to_string(),
            level,
        });
    }
    fn notify_cancel_transmission(&mut self, seq: u32, kind: UnitKind) {
        self.events.push(Notification::CancelTransmission { seq, kind });
    }
    fn notify_paused(&mut self, paused: bool) {
        self.events.push(Notification::Paused(paused));
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Prints the log stream, one line per entry.
#[derive(Debug, Default)]
pub struct Console {
    /// Also print transmission starts and window moves.
    pub verbose: bool,
}

impl Presentation for Console {
    fn notify_transmission_start(&mut self, seq: u32, kind: UnitKind) {
        if self.verbose {
            println!("  >> {kind} {seq} in transit");
        }
    }
    fn notify_status_changed(&mut self, _seq: u32, _status: PacketStatus) {}
    fn notify_window_moved(&mut self, old_base: u32, new_base: u32) {
        if self.verbose {
            println!("  [window {old_base} -> {new_base}]");
        }
    }
    fn notify_log(&mut self, message: &str, level: LogLevel) {
        println!("[{level:>7}] {message}");
    }
    fn notify_cancel_transmission(&mut self, seq: u32, kind: UnitKind) {
        if self.verbose {
            println!("  xx {kind} {seq} cancelled");
        }
    }
}
