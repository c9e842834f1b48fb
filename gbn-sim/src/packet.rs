//! Per-sequence-number packet bookkeeping.
//!
//! Every data packet of a run is a [`Packet`] created once at initialisation
//! and reset in place on re-simulation.  Nothing here is ever put on a wire;
//! the "transmission" of a packet or ACK is a scheduled event (see
//! [`crate::event`]).
//!
//! # Lifecycle
//!
//! ```text
//!            mark_sent              acknowledge
//!  Unsent ─────────────▶ Sent ─────────────────▶ Acknowledged
//!    ▲                   │  ▲
//!    │   reset_unsent    │  │ mark_sent (resend)
//!    └───────────────────┤  │
//!                        ▼  │
//!                      Errored
//! ```

use std::fmt;

/// Which direction a simulated unit travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Data packet, sender → receiver.
    Packet,
    /// Acknowledgement, receiver → sender.
    Ack,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Packet => write!(f, "packet"),
            UnitKind::Ack => write!(f, "ACK"),
        }
    }
}

/// Status rendered by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    Unsent,
    Sent,
    /// Sent, then reported lost; waiting to be resent.
    Errored,
    Acknowledged,
}

impl PacketStatus {
    /// Short tag used in state dumps (`Wait`, `Sent`, `Err`, `Ack`).
    pub fn tag(self) -> &'static str {
        match self {
            PacketStatus::Unsent => "Wait",
            PacketStatus::Sent => "Sent",
            PacketStatus::Errored => "Err",
            PacketStatus::Acknowledged => "Ack",
        }
    }
}

/// One numbered data packet.
///
/// Invariant: `acknowledged ⇒ !error`, and `error ⇒ sent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub seq_num: u32,
    pub sent: bool,
    pub acknowledged: bool,
    pub error: bool,
    /// How many times this packet has been handed to the channel.
    pub tx_count: u32,
}

impl Packet {
    pub fn new(seq_num: u32) -> Self {
        Self {
            seq_num,
            sent: false,
            acknowledged: false,
            error: false,
            tx_count: 0,
        }
    }

    pub fn status(&self) -> PacketStatus {
        if self.acknowledged {
            PacketStatus::Acknowledged
        } else if self.error {
            PacketStatus::Errored
        } else if self.sent {
            PacketStatus::Sent
        } else {
            PacketStatus::Unsent
        }
    }

    /// `true` when the packet is out on the channel and not known lost.
    pub fn in_flight(&self) -> bool {
        self.sent && !self.error && !self.acknowledged
    }

    /// Unsent → Sent (also clears a previous loss mark).
    pub fn mark_sent(&mut self) {
        debug_assert!(!self.acknowledged, "mark_sent on acknowledged packet {}", self.seq_num);
        self.sent = true;
        self.error = false;
        self.tx_count += 1;
    }

    /// Record that the in-flight copy of this packet was lost.
    pub fn mark_error(&mut self) {
        if self.acknowledged {
            return;
        }
        self.sent = true;
        self.error = true;
    }

    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
        self.error = false;
    }

    /// Back to unsent unless already acknowledged.
    pub fn reset_unsent(&mut self) {
        if !self.acknowledged {
            self.sent = false;
            self.error = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_packet_is_unsent() {
        let p = Packet::new(3);
        assert_eq!(p.seq_num, 3);
        assert_eq!(p.status(), PacketStatus::Unsent);
        assert!(!p.in_flight());
    }

    #[test]
    fn error_then_resend_clears_error() {
        let mut p = Packet::new(0);
        p.mark_sent();
        p.mark_error();
        assert_eq!(p.status(), PacketStatus::Errored);
        assert!(!p.in_flight());

        p.mark_sent();
        assert_eq!(p.status(), PacketStatus::Sent);
        assert!(p.in_flight());
        assert_eq!(p.tx_count, 2);
    }

    #[test]
    fn acknowledge_clears_error_and_blocks_reset() {
        let mut p = Packet::new(1);
        p.mark_sent();
        p.mark_error();
        p.acknowledge();
        assert!(!p.error);
        assert_eq!(p.status(), PacketStatus::Acknowledged);

        p.reset_unsent();
        assert_eq!(p.status(), PacketStatus::Acknowledged);

        // A late loss report cannot taint an acknowledged packet.
        p.mark_error();
        assert!(!p.error);
    }

    #[test]
    fn status_tags() {
        assert_eq!(PacketStatus::Unsent.tag(), "Wait");
        assert_eq!(PacketStatus::Errored.tag(), "Err");
    }
}
