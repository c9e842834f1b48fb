//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only **in-order** packets are accepted (`seq == expected_seq`).
//! - Out-of-order packets are discarded; the last in-order packet is
//!   re-acknowledged, or nothing is sent if no packet was ever accepted.
//! - Duplicates are discarded and acknowledged again.
//!
//! This module only manages state; queuing the ACK is the caller's
//! responsibility.

/// What the receiver did with an arriving packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted in order; acknowledge `seq`.
    InOrder { seq: u32 },
    /// Ahead of `expected_seq`; discarded.  `ack` repeats the last in-order
    /// packet, if any.
    OutOfOrder { seq: u32, ack: Option<u32> },
    /// Already accepted earlier; acknowledge it again.
    Duplicate { seq: u32 },
}

impl Delivery {
    /// Sequence number to acknowledge, if any.
    pub fn ack(&self) -> Option<u32> {
        match *self {
            Delivery::InOrder { seq } | Delivery::Duplicate { seq } => Some(seq),
            Delivery::OutOfOrder { ack, .. } => ack,
        }
    }
}

#[derive(Debug, Default)]
pub struct GbnReceiver {
    /// Next in-order sequence number.
    expected_seq: u32,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Process one arriving data packet.
    pub fn on_packet(&mut self, seq: u32) -> Delivery {
        if seq == self.expected_seq {
            self.expected_seq += 1;
            Delivery::InOrder { seq }
        } else if seq > self.expected_seq {
            Delivery::OutOfOrder {
                seq,
                ack: self.expected_seq.checked_sub(1),
            }
        } else {
            Delivery::Duplicate { seq }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = GbnReceiver::new();
        assert_eq!(r.expected_seq(), 0);
    }

    #[test]
    fn in_order_packets_advance_expected_seq() {
        let mut r = GbnReceiver::new();
        assert_eq!(r.on_packet(0), Delivery::InOrder { seq: 0 });
        assert_eq!(r.on_packet(1), Delivery::InOrder { seq: 1 });
        assert_eq!(r.expected_seq(), 2);
    }

    #[test]
    fn out_of_order_before_any_accept_sends_nothing() {
        let mut r = GbnReceiver::new();
        let d = r.on_packet(1);
        assert_eq!(d, Delivery::OutOfOrder { seq: 1, ack: None });
        assert_eq!(d.ack(), None);
        assert_eq!(r.expected_seq(), 0);

        assert_eq!(r.on_packet(0).ack(), Some(0));
        assert_eq!(r.expected_seq(), 1);
    }

    #[test]
    fn out_of_order_repeats_last_in_order_ack() {
        let mut r = GbnReceiver::new();
        r.on_packet(0);
        r.on_packet(1);
        let d = r.on_packet(3);
        assert_eq!(d.ack(), Some(1));
        assert_eq!(r.expected_seq(), 2);
    }

    #[test]
    fn duplicate_is_acknowledged_again() {
        let mut r = GbnReceiver::new();
        r.on_packet(0);
        r.on_packet(1);
        assert_eq!(r.on_packet(0), Delivery::Duplicate { seq: 0 });
        assert_eq!(r.expected_seq(), 2);
    }
}
