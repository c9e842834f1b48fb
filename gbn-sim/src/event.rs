//! Virtual clock and deterministic event queue.
//!
//! Every suspension point of the simulation (a unit in transit, a
//! retransmission timer, a paced continuation) is an [`Event`] scheduled at a
//! point of virtual time.  [`EventQueue`] hands them out in due-time order;
//! events due at the same instant come out in the order they were scheduled,
//! so a run is fully reproducible.
//!
//! Each [`Scheduled`] entry remembers the *epoch* it was created in.  The
//! protocol bumps the epoch on reset and on every Go-Back-N timeout, which
//! turns everything scheduled before that point into a stale no-op.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::packet::UnitKind;

/// Things that can happen "later".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Recompute the window and start sending.
    SendWindow,
    /// Send the next queued data packet.
    ProcessPendingPackets,
    /// Start ACK draining if the window is fully sent.
    CheckPendingAcks,
    /// Send the next queued ACK.
    ProcessNextAck,
    /// A unit reached the far end of the channel.
    Arrival { seq: u32, kind: UnitKind, id: u64 },
    /// Grace period after an ACK was lost has elapsed.
    AckLost { seq: u32 },
    /// Grace period after a data packet was lost has elapsed; resend it.
    ResendLost { seq: u32 },
    /// Retransmission timer for `seq` ran out.
    TimerExpired { seq: u32, token: u64 },
    /// Safety net scheduled after the send queue drains.
    StallCheck,
}

impl Event {
    /// Continuations keep the protocol moving on their own; stall recovery
    /// only steps in when none of them is outstanding.
    pub fn is_continuation(&self) -> bool {
        !matches!(self, Event::TimerExpired { .. } | Event::StallCheck)
    }
}

/// An [`Event`] with its due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub at: Duration,
    pub epoch: u64,
    pub event: Event,
    order: u64,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of scheduled events plus the virtual clock.
#[derive(Debug, Default)]
pub struct EventQueue {
    now: Duration,
    next_order: u64,
    heap: BinaryHeap<Reverse<Scheduled>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to fire `delay` from now.
    /// Due times saturate at [`Duration::MAX`].
    pub fn schedule(&mut self, delay: Duration, epoch: u64, event: Event) -> Duration {
        let at = self.now.saturating_add(delay);
        let order = self.next_order;
        self.next_order += 1;
        self.heap.push(Reverse(Scheduled {
            at,
            epoch,
            event,
            order,
        }));
        at
    }

    /// Due time of the earliest event.
    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(s)| s.at)
    }

    /// Pop the earliest event if it is due at or before `limit`, moving the
    /// clock forward to its due time.
    pub fn pop_until(&mut self, limit: Duration) -> Option<Scheduled> {
        match self.heap.peek() {
            Some(Reverse(s)) if s.at <= limit => {}
            _ => return None,
        }
        let Reverse(s) = self.heap.pop()?;
        if s.at > self.now {
            self.now = s.at;
        }
        Some(s)
    }

    /// Move the clock forward without firing anything.
    pub fn advance_to(&mut self, t: Duration) {
        if t > self.now {
            self.now = t;
        }
    }

    /// `true` if some queued entry satisfies `pred`.
    pub fn any(&self, mut pred: impl FnMut(&Scheduled) -> bool) -> bool {
        self.heap.iter().any(|Reverse(s)| pred(s))
    }

    /// Remove and return, in due-time order, every entry matching `pred`.
    pub fn extract(&mut self, mut pred: impl FnMut(&Scheduled) -> bool) -> Vec<Scheduled> {
        let (mut taken, kept): (Vec<Scheduled>, Vec<Scheduled>) = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .map(|Reverse(s)| s)
            .partition(|s| pred(s));
        self.heap = kept.into_iter().map(Reverse).collect();
        taken.sort();
        taken
    }

    /// Drop every queued entry; the clock keeps its value.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn pops_in_due_time_order() {
        let mut q = EventQueue::new();
        q.schedule(ms(500), 0, Event::SendWindow);
        q.schedule(ms(100), 0, Event::ProcessNextAck);

        let first = q.pop_until(ms(1_000)).unwrap();
        assert_eq!(first.event, Event::ProcessNextAck);
        assert_eq!(q.now(), ms(100));

        let second = q.pop_until(ms(1_000)).unwrap();
        assert_eq!(second.event, Event::SendWindow);
        assert_eq!(q.now(), ms(500));
        assert!(q.is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule(ms(10), 0, Event::ResendLost { seq: 1 });
        q.schedule(ms(10), 0, Event::ResendLost { seq: 2 });
        q.schedule(ms(10), 0, Event::ResendLost { seq: 3 });

        let order: Vec<Event> = std::iter::from_fn(|| q.pop_until(ms(10)))
            .map(|s| s.event)
            .collect();
        assert_eq!(
            order,
            vec![
                Event::ResendLost { seq: 1 },
                Event::ResendLost { seq: 2 },
                Event::ResendLost { seq: 3 },
            ]
        );
    }

    #[test]
    fn pop_until_respects_limit() {
        let mut q = EventQueue::new();
        q.schedule(ms(300), 0, Event::StallCheck);
        assert!(q.pop_until(ms(299)).is_none());
        assert_eq!(q.now(), Duration::ZERO);
        assert_eq!(q.next_due(), Some(ms(300)));
    }

    #[test]
    fn schedule_is_relative_to_clock() {
        let mut q = EventQueue::new();
        q.advance_to(ms(1_000));
        let at = q.schedule(ms(500), 3, Event::SendWindow);
        assert_eq!(at, ms(1_500));
        let s = q.pop_until(ms(2_000)).unwrap();
        assert_eq!(s.epoch, 3);
    }

    #[test]
    fn huge_delay_saturates() {
        let mut q = EventQueue::new();
        q.advance_to(ms(1));
        let at = q.schedule(Duration::MAX, 0, Event::StallCheck);
        assert_eq!(at, Duration::MAX);
    }

    #[test]
    fn extract_keeps_the_rest() {
        let mut q = EventQueue::new();
        q.schedule(ms(50), 0, Event::TimerExpired { seq: 0, token: 0 });
        q.schedule(ms(30), 0, Event::ProcessNextAck);
        q.schedule(ms(10), 0, Event::SendWindow);

        let taken = q.extract(|s| s.event.is_continuation());
        let taken: Vec<Event> = taken.into_iter().map(|s| s.event).collect();
        assert_eq!(taken, vec![Event::SendWindow, Event::ProcessNextAck]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(ms(50)));
    }

    #[test]
    fn continuation_classification() {
        assert!(Event::SendWindow.is_continuation());
        assert!(Event::AckLost { seq: 0 }.is_continuation());
        assert!(!Event::StallCheck.is_continuation());
        assert!(!Event::TimerExpired { seq: 0, token: 0 }.is_continuation());
    }
}
