//! Send and ACK queues plus the phase that serialises them.
//!
//! Data packets and ACKs are never in transit at the same time: the
//! simulation is either sending the window, draining ACKs, or idle between
//! the two.  [`Phase`] makes that a single value instead of a pair of flags,
//! so "sending and acking at once" cannot be represented.

use std::collections::VecDeque;

/// What the protocol is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Working through `pending_packets`.
    Sending,
    /// One ACK from `pending_acks` is being delivered.
    Acking,
}

/// FIFO queues of sequence numbers waiting to be transmitted.
#[derive(Debug, Default)]
pub struct TransmissionQueues {
    pending_packets: VecDeque<u32>,
    pending_acks: VecDeque<u32>,
}

impl TransmissionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the send queue with `seqs`.
    pub fn refill_packets(&mut self, seqs: impl IntoIterator<Item = u32>) {
        self.pending_packets.clear();
        self.pending_packets.extend(seqs);
    }

    pub fn next_packet(&mut self) -> Option<u32> {
        self.pending_packets.pop_front()
    }

    pub fn has_packets(&self) -> bool {
        !self.pending_packets.is_empty()
    }

    pub fn pending_packets(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending_packets.iter().copied()
    }

    /// Queue an ACK unless the same sequence number is already waiting.
    pub fn enqueue_ack(&mut self, seq: u32) -> bool {
        if self.pending_acks.contains(&seq) {
            false
        } else {
            self.pending_acks.push_back(seq);
            true
        }
    }

    pub fn next_ack(&mut self) -> Option<u32> {
        self.pending_acks.pop_front()
    }

    pub fn has_acks(&self) -> bool {
        !self.pending_acks.is_empty()
    }

    pub fn pending_acks(&self) -> impl Iterator<Item = u32> + '_ {
        self.pending_acks.iter().copied()
    }

    pub fn clear(&mut self) {
        self.pending_packets.clear();
        self.pending_acks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_queue_deduplicates() {
        let mut q = TransmissionQueues::new();
        assert!(q.enqueue_ack(0));
        assert!(q.enqueue_ack(1));
        assert!(!q.enqueue_ack(0));
        assert_eq!(q.pending_acks().collect::<Vec<_>>(), vec![0, 1]);

        // Once dequeued, the same seq may be queued again.
        assert_eq!(q.next_ack(), Some(0));
        assert!(q.enqueue_ack(0));
        assert_eq!(q.pending_acks().collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn refill_replaces_send_queue() {
        let mut q = TransmissionQueues::new();
        q.refill_packets([5, 6]);
        q.refill_packets([2, 3, 4]);
        assert_eq!(q.next_packet(), Some(2));
        assert_eq!(q.pending_packets().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn fifo_order() {
        let mut q = TransmissionQueues::new();
        q.refill_packets([0, 1, 2]);
        let drained: Vec<u32> = std::iter::from_fn(|| q.next_packet()).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(!q.has_packets());
    }

    #[test]
    fn clear_empties_both() {
        let mut q = TransmissionQueues::new();
        q.refill_packets([1]);
        q.enqueue_ack(0);
        q.clear();
        assert!(!q.has_packets());
        assert!(!q.has_acks());
    }
}
