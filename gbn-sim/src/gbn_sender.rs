//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] owns every [`Packet`] of the run and the left window edge.
//!
//! # Protocol contract
//!
//! - At most `window_size` packets starting at `base` may be outstanding.
//! - An ACK for `k` is accepted only when `k == base` or every packet in
//!   `[base, k)` is already acknowledged.  Anything else is a gap and is
//!   ignored without touching state.
//! - `base` moves over the contiguous acknowledged prefix and never backwards.
//! - On timeout the caller invokes [`GbnSender::go_back`], which returns
//!   every unacknowledged packet in `[base, next_seq)` to unsent so the whole
//!   window is sent again.
//!
//! `next_seq` records one past the highest sequence number handed to the
//! channel.  It is diagnostic; the window is always computed from `base`.
//!
//! This module only manages state; scheduling, timers and notifications are
//! the caller's responsibility.
//!
//! ```text
//!  base              next_seq     window_end
//!    │                  │             │
//!  ──┼──────────────────┼─────────────┼────────▶ seq space
//!    │ <── in flight ──▶│ <─ queued ─▶│
//! ```

use std::ops::Range;

use crate::packet::{Packet, PacketStatus};

/// Why a dequeued sequence number was not sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendSkip {
    OutOfRange,
    AlreadyAcknowledged,
    /// Sent before and not reported lost.
    AlreadyInFlight,
}

/// Result of feeding one ACK to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Packet acknowledged; `base` moved from `old_base` to `new_base`
    /// (equal when it did not move).
    Accepted { old_base: u32, new_base: u32 },
    /// `missing` (the first unacknowledged packet in `[base, seq)`) blocks it.
    Gap { missing: u32 },
    /// Below `base`; already covered.
    Stale,
    OutOfRange,
}

#[derive(Debug)]
pub struct GbnSender {
    /// Oldest unacknowledged sequence number (left window edge).
    base: u32,
    /// One past the highest sequence number ever handed to the channel.
    next_seq: u32,
    window_size: u32,
    packets: Vec<Packet>,
}

impl GbnSender {
    /// Create a sender for packets `0..packet_count`.
    ///
    /// # Panics
    ///
    /// If `window_size` is zero.
    pub fn new(packet_count: u32, window_size: u32) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            base: 0,
            next_seq: 0,
            window_size,
            packets: (0..packet_count).map(Packet::new).collect(),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn packet_count(&self) -> u32 {
        self.packets.len() as u32
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn packet(&self, seq: u32) -> Option<&Packet> {
        self.packets.get(seq as usize)
    }

    pub fn status(&self, seq: u32) -> Option<PacketStatus> {
        self.packet(seq).map(Packet::status)
    }

    pub fn is_acknowledged(&self, seq: u32) -> bool {
        self.packet(seq).is_some_and(|p| p.acknowledged)
    }

    /// Exclusive right edge: `min(base + window_size, packet_count)`.
    pub fn window_end(&self) -> u32 {
        self.base
            .saturating_add(self.window_size)
            .min(self.packet_count())
    }

    pub fn window(&self) -> Range<u32> {
        self.base..self.window_end()
    }

    /// `true` once every packet has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.base >= self.packet_count()
    }

    /// Sequence numbers in the window that still need a transmission.
    ///
    /// Packets previously reported lost are returned to unsent first, so they
    /// are included.  Packets already in flight are not.
    pub fn queue_window(&mut self) -> Vec<u32> {
        let mut queued = Vec::new();
        for seq in self.window() {
            let p = &mut self.packets[seq as usize];
            if p.acknowledged {
                continue;
            }
            if p.error {
                p.reset_unsent();
            }
            if !p.sent {
                queued.push(seq);
            }
        }
        queued
    }

    /// `true` when every packet in the window is sent or acknowledged.
    pub fn all_window_sent(&self) -> bool {
        self.window().all(|seq| {
            let p = &self.packets[seq as usize];
            p.acknowledged || p.sent
        })
    }

    /// Hand `seq` to the channel: Unsent → Sent.
    pub fn begin_send(&mut self, seq: u32) -> Result<(), SendSkip> {
        let p = self
            .packets
            .get_mut(seq as usize)
            .ok_or(SendSkip::OutOfRange)?;
        if p.acknowledged {
            return Err(SendSkip::AlreadyAcknowledged);
        }
        if p.in_flight() {
            return Err(SendSkip::AlreadyInFlight);
        }
        p.mark_sent();
        if seq >= self.next_seq {
            self.next_seq = seq + 1;
        }
        Ok(())
    }

    /// Record that the in-flight copy of `seq` was lost.
    pub fn mark_lost(&mut self, seq: u32) -> bool {
        match self.packets.get_mut(seq as usize) {
            Some(p) if !p.acknowledged => {
                p.mark_error();
                true
            }
            _ => false,
        }
    }

    /// Return a lost packet to unsent so it can be sent again on its own.
    pub fn revive(&mut self, seq: u32) -> bool {
        match self.packets.get_mut(seq as usize) {
            Some(p) if !p.acknowledged => {
                p.reset_unsent();
                true
            }
            _ => false,
        }
    }

    /// Process one ACK under the cumulative-ordering rule.
    pub fn on_ack(&mut self, seq: u32) -> AckOutcome {
        if seq >= self.packet_count() {
            return AckOutcome::OutOfRange;
        }
        if seq < self.base {
            return AckOutcome::Stale;
        }
        if let Some(missing) = (self.base..seq).find(|&i| !self.packets[i as usize].acknowledged) {
            return AckOutcome::Gap { missing };
        }

        self.packets[seq as usize].acknowledge();

        let old_base = self.base;
        while self
            .packets
            .get(self.base as usize)
            .is_some_and(|p| p.acknowledged)
        {
            self.base += 1;
        }
        AckOutcome::Accepted {
            old_base,
            new_base: self.base,
        }
    }

    /// Go-Back-N step: every unacknowledged packet in `[base, next_seq)`
    /// becomes unsent and `next_seq` falls back to `base`.
    ///
    /// Returns the sequence numbers that were reset.
    pub fn go_back(&mut self) -> Vec<u32> {
        let end = self.next_seq.min(self.packet_count());
        let mut reset = Vec::new();
        for seq in self.base..end {
            let p = &mut self.packets[seq as usize];
            if !p.acknowledged && (p.sent || p.error) {
                p.reset_unsent();
                reset.push(seq);
            }
        }
        self.next_seq = self.base;
        reset
    }

    /// Sent, unacknowledged packets (candidates for a running timer).
    pub fn outstanding(&self) -> impl Iterator<Item = u32> + '_ {
        self.packets
            .iter()
            .filter(|p| p.in_flight())
            .map(|p| p.seq_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_all(s: &mut GbnSender) -> Vec<u32> {
        let seqs = s.queue_window();
        for &seq in &seqs {
            s.begin_send(seq).unwrap();
        }
        seqs
    }

    #[test]
    fn initial_state() {
        let s = GbnSender::new(10, 4);
        assert_eq!(s.base(), 0);
        assert_eq!(s.next_seq(), 0);
        assert_eq!(s.window(), 0..4);
        assert!(!s.is_complete());
        assert!(!s.all_window_sent());
    }

    #[test]
    fn window_is_clamped_to_packet_count() {
        let s = GbnSender::new(3, 8);
        assert_eq!(s.window(), 0..3);
    }

    #[test]
    fn begin_send_advances_next_seq() {
        let mut s = GbnSender::new(5, 3);
        assert_eq!(send_all(&mut s), vec![0, 1, 2]);
        assert_eq!(s.next_seq(), 3);
        assert!(s.all_window_sent());
        assert_eq!(s.status(1), Some(PacketStatus::Sent));
    }

    #[test]
    fn begin_send_skips_defensively() {
        let mut s = GbnSender::new(2, 2);
        assert_eq!(s.begin_send(7), Err(SendSkip::OutOfRange));
        s.begin_send(0).unwrap();
        assert_eq!(s.begin_send(0), Err(SendSkip::AlreadyInFlight));
        s.on_ack(0);
        assert_eq!(s.begin_send(0), Err(SendSkip::AlreadyAcknowledged));
    }

    #[test]
    fn ack_for_base_slides_window() {
        let mut s = GbnSender::new(4, 2);
        send_all(&mut s);
        assert_eq!(
            s.on_ack(0),
            AckOutcome::Accepted { old_base: 0, new_base: 1 }
        );
        assert_eq!(s.window(), 1..3);
    }

    #[test]
    fn gap_leaves_state_untouched() {
        let mut s = GbnSender::new(4, 4);
        send_all(&mut s);
        assert_eq!(s.on_ack(2), AckOutcome::Gap { missing: 0 });
        assert_eq!(s.base(), 0);
        assert!(!s.is_acknowledged(2));
        assert_eq!(s.status(2), Some(PacketStatus::Sent));
    }

    #[test]
    fn stale_and_out_of_range_acks() {
        let mut s = GbnSender::new(2, 2);
        send_all(&mut s);
        s.on_ack(0);
        assert_eq!(s.on_ack(0), AckOutcome::Stale);
        assert_eq!(s.on_ack(9), AckOutcome::OutOfRange);
        assert_eq!(s.base(), 1);
    }

    #[test]
    fn last_ack_completes() {
        let mut s = GbnSender::new(2, 2);
        send_all(&mut s);
        s.on_ack(0);
        s.on_ack(1);
        assert!(s.is_complete());
        assert_eq!(s.base(), 2);
        assert!(s.window().is_empty());
    }

    #[test]
    fn queue_window_revives_lost_packets_only() {
        let mut s = GbnSender::new(4, 3);
        send_all(&mut s);
        s.mark_lost(1);
        assert_eq!(s.status(1), Some(PacketStatus::Errored));
        assert_eq!(s.queue_window(), vec![1]);
        assert_eq!(s.status(1), Some(PacketStatus::Unsent));
    }

    #[test]
    fn go_back_resets_unacked_range() {
        let mut s = GbnSender::new(6, 4);
        send_all(&mut s);
        s.on_ack(0);
        assert_eq!(s.next_seq(), 4);

        let reset = s.go_back();
        assert_eq!(reset, vec![1, 2, 3]);
        assert_eq!(s.next_seq(), s.base());
        for seq in 1..4 {
            assert_eq!(s.status(seq), Some(PacketStatus::Unsent));
        }
        assert_eq!(s.status(0), Some(PacketStatus::Acknowledged));
        assert_eq!(s.queue_window(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn revive_then_resend() {
        let mut s = GbnSender::new(3, 3);
        send_all(&mut s);
        s.mark_lost(2);
        assert!(s.revive(2));
        s.begin_send(2).unwrap();
        assert_eq!(s.status(2), Some(PacketStatus::Sent));
        assert_eq!(s.outstanding().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
