//! Run-state types.
//!
//! One [`RunState`] exists per simulation run.  It is owned by
//! [`crate::protocol::ProtocolMachine`] and replaced wholesale on reset;
//! everything else only reads it.
//!
//! ```text
//!  Idle ──start──▶ Running ──last ACK──▶ Completed
//!   ▲               │   ▲                    │
//!   │         pause │   │ resume             │
//!   │               ▼   │                    │
//!   └──reset────── Paused ◀──────────────────┘ (reset from any state)
//! ```

use std::fmt;

use crate::gbn_receiver::GbnReceiver;
use crate::gbn_sender::GbnSender;
use crate::packet::{Packet, UnitKind};
use crate::queue::{Phase, TransmissionQueues};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The single unit currently crossing the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub seq: u32,
    pub kind: UnitKind,
    /// Distinguishes this transmission from earlier ones of the same unit.
    pub id: u64,
    /// Channel verdict, taken when the unit left.
    pub doomed: bool,
}

/// Counters for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimStats {
    /// Data packet transmissions, first sends and resends.
    pub packets_sent: u32,
    pub retransmissions: u32,
    pub acks_sent: u32,
    pub acks_lost: u32,
    pub packets_lost: u32,
    pub timeouts: u32,
}

#[derive(Debug)]
pub struct RunState {
    pub(crate) sender: GbnSender,
    pub(crate) receiver: GbnReceiver,
    pub(crate) queues: TransmissionQueues,
    pub(crate) phase: Phase,
    pub(crate) lifecycle: Lifecycle,
    /// Bumped on reset, timeout and completion; scheduled events from an
    /// older epoch are ignored.
    pub(crate) epoch: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) stats: SimStats,
}

impl RunState {
    pub fn new(packet_count: u32, window_size: u32, epoch: u64) -> Self {
        Self {
            sender: GbnSender::new(packet_count, window_size),
            receiver: GbnReceiver::new(),
            queues: TransmissionQueues::new(),
            phase: Phase::Idle,
            lifecycle: Lifecycle::Idle,
            epoch,
            in_flight: None,
            stats: SimStats::default(),
        }
    }

    pub fn base(&self) -> u32 {
        self.sender.base()
    }

    pub fn next_seq(&self) -> u32 {
        self.sender.next_seq()
    }

    pub fn expected_seq(&self) -> u32 {
        self.receiver.expected_seq()
    }

    pub fn packets(&self) -> &[Packet] {
        self.sender.packets()
    }

    pub fn packet(&self, seq: u32) -> Option<&Packet> {
        self.sender.packet(seq)
    }

    pub fn sender(&self) -> &GbnSender {
        &self.sender
    }

    pub fn receiver(&self) -> &GbnReceiver {
        &self.receiver
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Started and not yet finished (paused counts as running).
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running | Lifecycle::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.lifecycle == Lifecycle::Paused
    }

    pub fn is_complete(&self) -> bool {
        self.lifecycle == Lifecycle::Completed
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    pub fn pending_packets(&self) -> Vec<u32> {
        self.queues.pending_packets().collect()
    }

    pub fn pending_acks(&self) -> Vec<u32> {
        self.queues.pending_acks().collect()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }
}

/// `Base=1, NextSeq=3, ExpectedSeq=3, Packets=[0:Ack, 1:Sent, 2:Sent, 3:Wait]`
impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Base={}, NextSeq={}, ExpectedSeq={}, Packets=[",
            self.base(),
            self.next_seq(),
            self.expected_seq()
        )?;
        for (i, p) in self.packets().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", p.seq_num, p.status().tag())?;
        }
        f.write_str("]")
    }
}
