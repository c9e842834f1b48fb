//! Per-packet retransmission timers.
//!
//! Reliable delivery requires that a packet whose ACK does not come back
//! within the timeout is sent again.  The [`TimerRegistry`] keeps one timer
//! per sequence number.  A timer is a token: arming schedules an
//! [`Event::TimerExpired`] carrying a fresh token, and the expiry only counts
//! if that token is still the one registered for the sequence number.
//! Re-arming or cancelling therefore silently defuses the old expiry.
//!
//! Whether an expiry that *does* count should act on the protocol (running,
//! not paused, packet unacknowledged, `seq ≥ base`) is decided by the caller.

use std::collections::HashMap;
use std::time::Duration;

use crate::event::{Event, EventQueue};

#[derive(Debug, Default)]
pub struct TimerRegistry {
    /// seq → token of the armed timer.
    armed: HashMap<u32, u64>,
    next_token: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for `seq`, due `timeout` from now.
    pub fn start(&mut self, seq: u32, timeout: Duration, epoch: u64, events: &mut EventQueue) {
        let token = self.next_token;
        self.next_token += 1;
        self.armed.insert(seq, token);
        events.schedule(timeout, epoch, Event::TimerExpired { seq, token });
    }

    /// Disarm the timer for `seq`.  No-op when none is armed.
    pub fn cancel(&mut self, seq: u32) -> bool {
        self.armed.remove(&seq).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.armed.clear();
    }

    /// Claim an expiry.  Returns `true` (and forgets the timer) only if
    /// `token` is the live timer for `seq`.
    pub fn expire(&mut self, seq: u32, token: u64) -> bool {
        if self.armed.get(&seq) == Some(&token) {
            self.armed.remove(&seq);
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self, seq: u32) -> bool {
        self.armed.contains_key(&seq)
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTO: Duration = Duration::from_millis(1_000);

    fn expiry_of(events: &mut EventQueue) -> (u32, u64) {
        match events.pop_until(Duration::MAX).map(|s| s.event) {
            Some(Event::TimerExpired { seq, token }) => (seq, token),
            other => panic!("expected a timer expiry, got {other:?}"),
        }
    }

    #[test]
    fn start_then_expire() {
        let mut timers = TimerRegistry::new();
        let mut events = EventQueue::new();
        timers.start(4, RTO, 0, &mut events);
        assert!(timers.is_armed(4));

        let (seq, token) = expiry_of(&mut events);
        assert_eq!(seq, 4);
        assert_eq!(events.now(), RTO);
        assert!(timers.expire(seq, token));
        assert!(!timers.is_armed(4));
        // An expiry is claimed once.
        assert!(!timers.expire(seq, token));
    }

    #[test]
    fn restart_defuses_previous_expiry() {
        let mut timers = TimerRegistry::new();
        let mut events = EventQueue::new();
        timers.start(0, RTO, 0, &mut events);
        timers.start(0, RTO * 2, 0, &mut events);

        let (seq, stale) = expiry_of(&mut events);
        assert!(!timers.expire(seq, stale));
        let (seq, live) = expiry_of(&mut events);
        assert!(timers.expire(seq, live));
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timers = TimerRegistry::new();
        let mut events = EventQueue::new();

        // Nothing armed: both calls are no-ops.
        assert!(!timers.cancel(9));
        assert!(!timers.cancel(9));

        timers.start(9, RTO, 0, &mut events);
        assert!(timers.cancel(9));
        assert!(!timers.cancel(9));
        assert!(timers.is_empty());

        let (seq, token) = expiry_of(&mut events);
        assert!(!timers.expire(seq, token));
    }

    #[test]
    fn cancel_all_clears_registry() {
        let mut timers = TimerRegistry::new();
        let mut events = EventQueue::new();
        for seq in 0..3 {
            timers.start(seq, RTO, 0, &mut events);
        }
        assert_eq!(timers.len(), 3);
        timers.cancel_all();
        assert!(timers.is_empty());
    }
}
