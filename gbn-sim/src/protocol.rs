//! Go-Back-N protocol state machine.
//!
//! [`ProtocolMachine`] owns the [`RunState`], the channel, the timers and the
//! event queue, and implements every protocol transition:
//!
//! ```text
//!  send_window_packets ──▶ process_pending_packets ──▶ send_packet
//!          ▲                        ▲                      │ transit
//!          │                        └──── packet_arrived ◀─┘
//!          │                                   │ window sent
//!          │                                   ▼
//!          │     ack_arrived ◀── transit ── process_next_ack
//!          │          │                        ▲
//!          └──────────┴── more ACKs queued ────┘
//!
//!  timer expiry / lost ACK ──▶ on_timeout ──▶ send_window_packets
//! ```
//!
//! Packets and ACKs are sent one at a time, each step paced by a short delay
//! on the virtual clock.  Whether a dispatched event is still valid (epoch,
//! lifecycle) is decided once by the controller in
//! [`crate::simulation::Simulation`]; nothing in here re-checks it.

use std::time::Duration;

use crate::channel::ChannelModel;
use crate::config::{Delivery, SimConfig};
use crate::event::{Event, EventQueue};
use crate::gbn_receiver::Delivery as Arrival;
use crate::gbn_sender::{AckOutcome, SendSkip};
use crate::packet::UnitKind;
use crate::presentation::{LogLevel, Presentation};
use crate::queue::Phase;
use crate::state::{InFlight, Lifecycle, RunState};
use crate::timer::TimerRegistry;

// ---------------------------------------------------------------------------
// Pacing (virtual time)
// ---------------------------------------------------------------------------

/// Time for one unit to cross the channel at 1× speed.
pub const TRANSIT_TIME: Duration = Duration::from_secs(3);
/// Pause between consecutive protocol steps.
pub const STEP_DELAY: Duration = Duration::from_millis(500);
/// Delay before retrying after a skipped step.
pub const RETRY_DELAY: Duration = Duration::from_millis(100);
/// Grace period between a random-mode ACK loss and the base timeout.
pub const ACK_LOSS_GRACE: Duration = Duration::from_millis(1_000);
/// Grace period between a manual ACK loss and the base timeout.
pub const MANUAL_ACK_LOSS_GRACE: Duration = Duration::from_millis(800);
/// Delay before a manually lost data packet is resent on its own.
pub const PACKET_LOSS_RESEND: Duration = Duration::from_millis(1_500);
/// Delay of the stall check scheduled when the send queue drains.
pub const STALL_CHECK_DELAY: Duration = Duration::from_secs(5);

/// Transit time of one unit at `speed`×, or `None` if it does not fit in a
/// [`Duration`].
pub fn transit_delay(speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(TRANSIT_TIME.as_secs_f64() / speed).ok()
}

// ---------------------------------------------------------------------------
// ProtocolMachine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ProtocolMachine<P> {
    config: SimConfig,
    state: RunState,
    channel: ChannelModel,
    timers: TimerRegistry,
    events: EventQueue,
    presentation: P,
    next_unit_id: u64,
}

impl<P: Presentation> ProtocolMachine<P> {
    /// Build a machine for an already validated `config` and initialise the
    /// first run.
    pub(crate) fn new(config: SimConfig, presentation: P) -> Self {
        let channel = ChannelModel::new(config.error_mode, config.error_rate, config.seed);
        let state = RunState::new(config.packet_count, config.window_size, 0);
        let mut machine = Self {
            config,
            state,
            channel,
            timers: TimerRegistry::new(),
            events: EventQueue::new(),
            presentation,
            next_unit_id: 0,
        };
        machine.announce_init();
        machine
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub fn into_presentation(self) -> P {
        self.presentation
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.state.lifecycle = lifecycle;
    }

    pub(crate) fn notify_paused(&mut self, paused: bool) {
        self.presentation.notify_paused(paused);
    }

    // -----------------------------------------------------------------------
    // Run (re)initialisation
    // -----------------------------------------------------------------------

    /// Throw away the current run and start a fresh one in `Idle`.
    pub(crate) fn reinitialize(&mut self) {
        if let Some(f) = self.state.in_flight.take() {
            self.presentation.notify_cancel_transmission(f.seq, f.kind);
        }
        self.timers.cancel_all();
        self.events.clear();
        let epoch = self.state.epoch + 1;
        self.state = RunState::new(self.config.packet_count, self.config.window_size, epoch);
        self.announce_init();
    }

    /// Swap in a new, already validated configuration and reinitialise.
    pub(crate) fn reconfigure(&mut self, config: SimConfig) {
        self.channel = ChannelModel::new(config.error_mode, config.error_rate, config.seed);
        self.config = config;
        self.reinitialize();
    }

    pub(crate) fn set_error_rate(&mut self, rate: u8) {
        self.channel.set_error_rate(rate);
        self.config.error_rate = self.channel.error_rate();
        let rate = self.config.error_rate;
        self.emit(LogLevel::Info, format!("Error rate set to {rate}%"));
    }

    fn announce_init(&mut self) {
        for p in self.state.sender.packets() {
            self.presentation.notify_status_changed(p.seq_num, p.status());
        }
        let msg = format!(
            "Simulation initialized with {} packets and window size {}",
            self.config.packet_count, self.config.window_size
        );
        self.emit(LogLevel::Info, msg);
        self.log_state();
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Run one scheduled event that the controller found valid.
    pub(crate) fn dispatch(&mut self, event: Event) {
        match event {
            Event::SendWindow => self.send_window_packets(),
            Event::ProcessPendingPackets => self.process_pending_packets(),
            Event::CheckPendingAcks => self.check_pending_acks(),
            Event::ProcessNextAck => self.process_next_ack(),
            Event::Arrival { seq, kind, id } => self.on_arrival(seq, kind, id),
            Event::AckLost { seq } => self.ack_lost(seq),
            Event::ResendLost { seq } => self.resend_lost(seq),
            Event::TimerExpired { seq, token } => self.timer_expired(seq, token),
            Event::StallCheck => self.stall_check(),
        }
    }

    fn later(&mut self, delay: Duration, event: Event) {
        let epoch = self.state.epoch;
        self.events.schedule(delay, epoch, event);
    }

    // -----------------------------------------------------------------------
    // Send path
    // -----------------------------------------------------------------------

    /// Queue every sendable packet of the current window and start sending.
    pub fn send_window_packets(&mut self) {
        if self.state.phase != Phase::Idle || self.state.sender.is_complete() {
            return;
        }
        if self.state.queues.has_acks() {
            self.later(RETRY_DELAY, Event::ProcessNextAck);
            return;
        }

        let window = self.state.sender.window();
        let msg = format!(
            "Current window: packets {} to {} (size: {})",
            window.start,
            window.end - 1,
            window.len()
        );
        self.emit(LogLevel::Info, msg);

        let queued = self.state.sender.queue_window();
        for &seq in &queued {
            self.notify_status(seq);
        }
        self.state.queues.refill_packets(queued);

        if self.state.queues.has_packets() {
            let n = self.state.queues.pending_packets().count();
            self.emit(LogLevel::Info, format!("Queued {n} packets to send within the window"));
            self.state.phase = Phase::Sending;
            self.process_pending_packets();
        } else {
            self.emit(LogLevel::Info, "No new packets to send in this window");
            if self.state.sender.all_window_sent() {
                self.emit(
                    LogLevel::Info,
                    "All packets in window have been sent. Ready for ACKs.",
                );
            }
        }
    }

    /// Send the next queued packet, or close the send phase when none is left.
    pub fn process_pending_packets(&mut self) {
        if self.state.phase == Phase::Acking {
            return;
        }
        self.state.phase = Phase::Sending;
        match self.state.queues.next_packet() {
            Some(seq) => {
                self.emit(LogLevel::Info, format!("Sending next queued packet: {seq}"));
                self.send_packet(seq);
            }
            None => self.finish_sending(),
        }
    }

    fn finish_sending(&mut self) {
        self.state.phase = Phase::Idle;
        self.emit(LogLevel::Info, "All packets in window have been sent, waiting for ACKs");
        self.later(STEP_DELAY, Event::CheckPendingAcks);
        self.later(STALL_CHECK_DELAY, Event::StallCheck);
    }

    fn send_packet(&mut self, seq: u32) {
        match self.state.sender.begin_send(seq) {
            Ok(()) => {}
            Err(SendSkip::OutOfRange) => {
                self.emit(LogLevel::Error, format!("Invalid packet number: {seq}"));
                self.later(RETRY_DELAY, Event::ProcessPendingPackets);
                return;
            }
            Err(skip) => {
                log::debug!("[gbn] skipping packet {seq}: {skip:?}");
                self.later(RETRY_DELAY, Event::ProcessPendingPackets);
                return;
            }
        }

        self.notify_status(seq);
        self.start_timer(seq);

        self.state.stats.packets_sent += 1;
        if self.state.sender.packet(seq).is_some_and(|p| p.tx_count > 1) {
            self.state.stats.retransmissions += 1;
        }
        self.emit(LogLevel::Info, format!("Sending packet {seq}"));
        self.transmit(seq, UnitKind::Packet, false);
    }

    /// Put one unit on the channel.
    fn transmit(&mut self, seq: u32, kind: UnitKind, doomed: bool) {
        let id = self.next_unit_id;
        self.next_unit_id += 1;
        self.state.in_flight = Some(InFlight {
            seq,
            kind,
            id,
            doomed,
        });
        self.presentation.notify_transmission_start(seq, kind);
        if self.config.delivery == Delivery::Scheduled {
            // Validated configs always have a representable transit time.
            let delay = transit_delay(self.config.animation_speed).unwrap_or(Duration::MAX);
            self.later(delay, Event::Arrival { seq, kind, id });
        }
    }

    // -----------------------------------------------------------------------
    // Arrivals
    // -----------------------------------------------------------------------

    /// The id of the in-flight unit if it is `(seq, kind)`.
    pub(crate) fn in_flight_id(&self, seq: u32, kind: UnitKind) -> Option<u64> {
        self.state
            .in_flight
            .filter(|f| f.seq == seq && f.kind == kind)
            .map(|f| f.id)
    }

    /// A unit finished crossing the channel.
    fn on_arrival(&mut self, seq: u32, kind: UnitKind, id: u64) {
        let flight = match self.state.in_flight {
            Some(f) if f.id == id => f,
            _ => {
                log::debug!("[gbn] stale arrival of {kind} {seq} ignored");
                return;
            }
        };
        self.state.in_flight = None;

        match kind {
            UnitKind::Packet => self.packet_arrived(seq),
            UnitKind::Ack if flight.doomed => {
                self.emit(LogLevel::Error, format!("ACK {seq} lost in transmission"));
                self.lose_ack(seq, ACK_LOSS_GRACE);
            }
            UnitKind::Ack => self.ack_arrived(seq),
        }
    }

    /// Receiver side of a data packet arrival.
    fn packet_arrived(&mut self, seq: u32) {
        if self.state.sender.is_acknowledged(seq) {
            log::debug!("[gbn] packet {seq} arrived after its ACK; dropped");
            self.later(STEP_DELAY, Event::ProcessPendingPackets);
            return;
        }

        let delivery = self.state.receiver.on_packet(seq);
        match delivery {
            Arrival::InOrder { .. } => {
                self.emit(LogLevel::Success, format!("Packet {seq} received in order"));
            }
            Arrival::OutOfOrder { ack, .. } => {
                self.emit(
                    LogLevel::Warning,
                    format!("Packet {seq} received out of order, discarded"),
                );
                if ack.is_none() {
                    self.emit(
                        LogLevel::Warning,
                        "No packets received in order yet, cannot send ACK",
                    );
                }
            }
            Arrival::Duplicate { .. } => {
                self.emit(
                    LogLevel::Warning,
                    format!("Duplicate packet {seq} received, discarded"),
                );
            }
        }
        if let Some(ack) = delivery.ack() {
            self.state.queues.enqueue_ack(ack);
        }

        if self.state.queues.has_packets() {
            self.later(STEP_DELAY, Event::ProcessPendingPackets);
        } else {
            self.finish_sending();
        }
    }

    // -----------------------------------------------------------------------
    // ACK path
    // -----------------------------------------------------------------------

    fn check_pending_acks(&mut self) {
        if !self.state.queues.has_acks() || self.state.phase != Phase::Idle {
            return;
        }
        if self.state.sender.all_window_sent() {
            self.emit(
                LogLevel::Info,
                "Starting to process ACKs now that all packets are sent",
            );
            self.process_next_ack();
        }
    }

    /// Send the next queued ACK, or go back to the send path when none is left.
    pub fn process_next_ack(&mut self) {
        match self.state.phase {
            Phase::Sending => {
                self.emit(
                    LogLevel::Info,
                    "Waiting for all packets to be sent before processing ACKs",
                );
                return;
            }
            Phase::Acking => return,
            Phase::Idle => {}
        }

        match self.state.queues.next_ack() {
            Some(seq) => {
                self.state.phase = Phase::Acking;
                self.emit(LogLevel::Info, format!("Processing pending ACK for packet {seq}"));
                self.send_ack(seq);
            }
            None => {
                if !self.state.sender.is_complete() {
                    self.later(STEP_DELAY, Event::SendWindow);
                }
            }
        }
    }

    fn send_ack(&mut self, seq: u32) {
        self.emit(LogLevel::Info, format!("Sending ACK {seq}"));
        let doomed = self.channel.should_drop(UnitKind::Ack);
        self.state.stats.acks_sent += 1;
        self.transmit(seq, UnitKind::Ack, doomed);
    }

    /// Sender side of an ACK arrival.
    fn ack_arrived(&mut self, seq: u32) {
        self.emit(LogLevel::Success, format!("ACK {seq} received"));

        match self.state.sender.on_ack(seq) {
            AckOutcome::OutOfRange => {
                self.emit(LogLevel::Error, format!("ACK {seq} refers to no known packet"));
                self.ack_done_next();
                return;
            }
            AckOutcome::Gap { missing } => {
                self.emit(
                    LogLevel::Warning,
                    format!(
                        "Cannot acknowledge packet {seq} because packet {missing} is not yet acknowledged"
                    ),
                );
                self.emit(
                    LogLevel::Warning,
                    format!(
                        "ACK {seq} received but ignored - waiting for previous packets to be acknowledged first"
                    ),
                );
                self.ack_done_next();
                return;
            }
            AckOutcome::Stale => {
                let base = self.state.sender.base();
                self.emit(LogLevel::Info, format!("Window remains at packet {base}"));
            }
            AckOutcome::Accepted { old_base, new_base } => {
                self.timers.cancel(seq);
                self.notify_status(seq);
                if new_base > old_base {
                    self.presentation.notify_window_moved(old_base, new_base);
                    self.emit(
                        LogLevel::Info,
                        format!("Window slides from packet {old_base} to packet {new_base}"),
                    );
                } else {
                    self.emit(LogLevel::Info, format!("Window remains at packet {new_base}"));
                }
                self.log_state();
            }
        }

        if self.state.sender.is_complete() {
            self.complete();
            return;
        }

        self.state.phase = Phase::Idle;
        if self.state.queues.has_acks() {
            self.later(STEP_DELAY, Event::ProcessNextAck);
        } else {
            self.later(STEP_DELAY, Event::SendWindow);
        }
    }

    /// Close the current ACK step without a state change and move on.
    fn ack_done_next(&mut self) {
        self.state.phase = Phase::Idle;
        self.later(STEP_DELAY, Event::ProcessNextAck);
    }

    fn complete(&mut self) {
        self.emit(LogLevel::Success, "All packets transmitted and acknowledged!");
        self.state.lifecycle = Lifecycle::Completed;
        self.state.phase = Phase::Idle;
        self.state.queues.clear();
        self.state.epoch += 1;
        self.timers.cancel_all();
        self.events.clear();
    }

    // -----------------------------------------------------------------------
    // Loss
    // -----------------------------------------------------------------------

    /// Explicit loss of the in-flight unit `(seq, kind)`.
    ///
    /// Returns `false` when that unit is not in flight (stale signal).
    pub(crate) fn signal_loss(&mut self, seq: u32, kind: UnitKind) -> bool {
        if self.in_flight_id(seq, kind).is_none() {
            log::debug!("[gbn] loss signal for {kind} {seq} ignored: not in flight");
            return false;
        }
        self.state.in_flight = None;
        self.presentation.notify_cancel_transmission(seq, kind);

        match kind {
            UnitKind::Packet => {
                self.emit(LogLevel::Error, format!("Packet {seq} manually marked as error"));
                self.state.sender.mark_lost(seq);
                self.state.stats.packets_lost += 1;
                self.notify_status(seq);
                self.later(PACKET_LOSS_RESEND, Event::ResendLost { seq });
            }
            UnitKind::Ack => {
                self.emit(LogLevel::Error, format!("ACK {seq} manually marked as error"));
                self.lose_ack(seq, MANUAL_ACK_LOSS_GRACE);
            }
        }
        self.log_state();
        true
    }

    fn lose_ack(&mut self, seq: u32, grace: Duration) {
        self.state.stats.acks_lost += 1;
        self.later(grace, Event::AckLost { seq });
    }

    /// A lost ACK always times out the current base.
    fn ack_lost(&mut self, seq: u32) {
        self.state.phase = Phase::Idle;
        let base = self.state.sender.base();
        if !self.state.sender.is_acknowledged(base) {
            self.emit(
                LogLevel::Warning,
                format!("Triggering timeout for base packet {base} due to lost ACK for packet {seq}"),
            );
            self.on_timeout(base);
        } else {
            self.later(STEP_DELAY, Event::ProcessNextAck);
        }
    }

    /// Resend a single manually lost packet.
    fn resend_lost(&mut self, seq: u32) {
        if !self.state.sender.revive(seq) {
            self.later(RETRY_DELAY, Event::ProcessPendingPackets);
            return;
        }
        self.notify_status(seq);
        self.emit(LogLevel::Info, format!("Resending packet {seq} after manual error"));
        self.send_packet(seq);
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    fn timer_expired(&mut self, seq: u32, token: u64) {
        if !self.timers.expire(seq, token) {
            return;
        }
        if self.state.sender.is_acknowledged(seq) || seq < self.state.sender.base() {
            log::debug!("[gbn] timer for packet {seq} expired after it was acknowledged");
            return;
        }
        self.emit(LogLevel::Warning, format!("Timeout occurred for packet {seq}"));
        self.on_timeout(seq);
    }

    /// Claim a timer that ran out while paused, without acting on it.
    pub(crate) fn gate_timer(&mut self, seq: u32, token: u64) {
        if self.timers.expire(seq, token) {
            log::debug!("[gbn] timer for packet {seq} expired while paused; ignored");
        }
    }

    /// Go-Back-N timeout: invalidate everything in flight and resend the
    /// whole unacknowledged window.
    pub fn on_timeout(&mut self, seq: u32) {
        self.state.stats.timeouts += 1;
        self.emit(LogLevel::Warning, format!("Timeout for packet {seq}, resending window"));

        self.state.epoch += 1;
        self.events.clear();
        self.timers.cancel_all();
        if let Some(f) = self.state.in_flight.take() {
            self.presentation.notify_cancel_transmission(f.seq, f.kind);
        }
        self.state.queues.clear();

        for seq in self.state.sender.go_back() {
            self.notify_status(seq);
        }
        self.log_state();

        self.state.phase = Phase::Idle;
        self.later(STEP_DELAY, Event::SendWindow);
    }

    // -----------------------------------------------------------------------
    // Resume and recovery
    // -----------------------------------------------------------------------

    /// Arm a timer for every sent, unacknowledged packet that has none.
    fn rearm_missing_timers(&mut self) {
        let missing: Vec<u32> = self
            .state
            .sender
            .outstanding()
            .filter(|&seq| !self.timers.is_armed(seq))
            .collect();
        for seq in missing {
            self.start_timer(seq);
        }
    }

    /// Arm the retransmission timer for `seq`; no-op once it is acknowledged.
    fn start_timer(&mut self, seq: u32) {
        if self.state.sender.is_acknowledged(seq) {
            return;
        }
        let epoch = self.state.epoch;
        self.timers
            .start(seq, self.config.timeout, epoch, &mut self.events);
    }

    fn continuation_pending(&self) -> bool {
        let epoch = self.state.epoch;
        self.events
            .any(|s| s.epoch == epoch && s.event.is_continuation())
    }

    /// After a resume: make sure whichever phase was active keeps going.
    pub(crate) fn resume_phase(&mut self) {
        self.rearm_missing_timers();
        if self.state.in_flight.is_some() || self.continuation_pending() {
            return;
        }
        match self.state.phase {
            Phase::Sending => self.later(STEP_DELAY, Event::ProcessPendingPackets),
            Phase::Acking | Phase::Idle => {
                self.state.phase = Phase::Idle;
                if self.state.queues.has_acks() {
                    self.later(STEP_DELAY, Event::ProcessNextAck);
                } else {
                    self.later(STEP_DELAY, Event::SendWindow);
                }
            }
        }
    }

    /// `true` when nothing will move the run forward on its own.
    pub fn is_stalled(&self) -> bool {
        if self.state.lifecycle != Lifecycle::Running
            || self.state.phase != Phase::Idle
            || self.state.in_flight.is_some()
            || self.continuation_pending()
        {
            return false;
        }
        self.state.queues.has_packets()
            || self.state.queues.has_acks()
            || (!self.state.sender.is_complete() && self.timers.is_empty())
    }

    /// Safety net: restart whichever path has outstanding work.
    pub fn stall_check(&mut self) {
        if !self.is_stalled() {
            return;
        }
        if self.state.queues.has_packets() {
            self.emit(
                LogLevel::Warning,
                "Recovering simulation - continuing with pending packets",
            );
            self.process_pending_packets();
        } else if self.state.queues.has_acks() {
            self.emit(
                LogLevel::Warning,
                "Recovering simulation - processing pending ACKs",
            );
            self.process_next_ack();
        } else {
            self.emit(
                LogLevel::Warning,
                "Recovering simulation - checking window for new packets",
            );
            self.rearm_missing_timers();
            self.send_window_packets();
        }
    }

    // -----------------------------------------------------------------------
    // Output helpers
    // -----------------------------------------------------------------------

    fn notify_status(&mut self, seq: u32) {
        if let Some(status) = self.state.sender.status(seq) {
            self.presentation.notify_status_changed(seq, status);
        }
    }

    pub(crate) fn emit(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => log::info!("[gbn] {message}"),
            LogLevel::Warning => log::warn!("[gbn] {message}"),
            LogLevel::Error => log::error!("[gbn] {message}"),
        }
        self.presentation.notify_log(&message, level);
    }

    fn log_state(&mut self) {
        let dump = format!("Current state: {}", self.state);
        self.emit(LogLevel::Info, dump);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::Recorder;

    fn machine(packets: u32, window: u32) -> ProtocolMachine<Recorder> {
        let cfg = SimConfig::new(packets, window).with_seed(1);
        let mut m = ProtocolMachine::new(cfg, Recorder::new());
        m.set_lifecycle(Lifecycle::Running);
        m
    }

    /// Deliver every due event until `limit` without lifecycle gating.
    fn drive(m: &mut ProtocolMachine<Recorder>, limit: Duration) {
        while let Some(s) = m.events_mut().pop_until(limit) {
            if s.epoch == m.state().epoch() {
                m.dispatch(s.event);
            }
        }
    }

    #[test]
    fn transit_delay_scales_with_speed() {
        assert_eq!(transit_delay(1.0), Some(Duration::from_secs(3)));
        assert_eq!(transit_delay(2.0), Some(Duration::from_millis(1_500)));
        assert_eq!(transit_delay(1e-20), None);
    }

    #[test]
    fn send_window_sends_first_packet_and_arms_timer() {
        let mut m = machine(4, 2);
        m.send_window_packets();
        assert_eq!(m.state().phase(), Phase::Sending);
        assert_eq!(m.state().pending_packets(), vec![1]);
        assert_eq!(m.presentation().sent(UnitKind::Packet), vec![0]);
        assert!(m.timers().is_armed(0));
        assert_eq!(m.state().next_seq(), 1);
    }

    #[test]
    fn send_window_defers_to_pending_acks() {
        let mut m = machine(4, 2);
        m.state.queues.enqueue_ack(0);
        m.send_window_packets();
        assert_eq!(m.state().phase(), Phase::Idle);
        assert!(m.presentation().transmissions().is_empty());
        assert!(m.events().any(|s| s.event == Event::ProcessNextAck));
    }

    #[test]
    fn send_window_is_noop_while_acking() {
        let mut m = machine(4, 2);
        m.state.phase = Phase::Acking;
        m.send_window_packets();
        assert!(m.presentation().transmissions().is_empty());
    }

    #[test]
    fn out_of_range_dequeue_is_skipped() {
        let mut m = machine(2, 2);
        m.state.phase = Phase::Sending;
        m.state.queues.refill_packets([9]);
        m.process_pending_packets();
        assert!(m.presentation().has_log("Invalid packet number: 9"));
        assert!(m.state().in_flight().is_none());
        assert!(m.events().any(|s| s.event == Event::ProcessPendingPackets));
    }

    #[test]
    fn whole_window_then_acks() {
        let mut m = machine(2, 2);
        m.send_window_packets();
        drive(&mut m, Duration::from_secs(60));
        assert_eq!(m.presentation().sent(UnitKind::Packet), vec![0, 1]);
        assert_eq!(m.presentation().sent(UnitKind::Ack), vec![0, 1]);
        assert_eq!(m.state().lifecycle(), Lifecycle::Completed);
        assert!(m.timers().is_empty());
    }

    #[test]
    fn timeout_resets_window_and_bumps_epoch() {
        let mut m = machine(5, 3);
        m.send_window_packets();
        // Let packets 0..3 go out but stop before any ACK is processed.
        drive(&mut m, Duration::from_millis(5_400));
        assert_eq!(m.state().next_seq(), 3);
        let epoch = m.state().epoch();

        m.on_timeout(0);
        assert_eq!(m.state().epoch(), epoch + 1);
        assert_eq!(m.state().next_seq(), m.state().base());
        assert!(m.state().pending_acks().is_empty());
        for seq in 0..3 {
            let p = m.state().packet(seq).unwrap();
            assert!(!p.sent && !p.error);
        }
        assert!(m.timers().is_empty());
        assert_eq!(m.state().stats().timeouts, 1);
    }

    #[test]
    fn start_timer_skips_acknowledged_packets() {
        let mut m = machine(2, 2);
        m.start_timer(1);
        assert!(m.timers().is_armed(1));

        let mut m = machine(1, 1);
        m.send_window_packets();
        drive(&mut m, Duration::from_secs(60));
        assert!(m.state().sender().is_acknowledged(0));
        m.start_timer(0);
        assert!(!m.timers().is_armed(0));
        assert!(m.timers().is_empty());
    }

    #[test]
    fn out_of_order_arrival_before_first_accept() {
        let mut m = machine(3, 3);
        m.transmit(1, UnitKind::Packet, false);
        let id = m.state().in_flight().unwrap().id;
        m.dispatch(Event::Arrival { seq: 1, kind: UnitKind::Packet, id });
        assert!(m.presentation().has_log("Packet 1 received out of order, discarded"));
        assert!(m
            .presentation()
            .has_log("No packets received in order yet, cannot send ACK"));
        assert!(m.state().pending_acks().is_empty());
        assert_eq!(m.state().expected_seq(), 0);

        m.transmit(0, UnitKind::Packet, false);
        let id = m.state().in_flight().unwrap().id;
        m.dispatch(Event::Arrival { seq: 0, kind: UnitKind::Packet, id });
        assert!(m.presentation().has_log("Packet 0 received in order"));
        assert_eq!(m.state().pending_acks(), vec![0]);
        assert_eq!(m.state().expected_seq(), 1);
    }

    #[test]
    fn healthy_run_is_never_stalled() {
        let mut m = machine(3, 3);
        m.send_window_packets();
        for step in 1..=40 {
            drive(&mut m, Duration::from_millis(step * 500));
            assert!(!m.is_stalled(), "stalled at step {step}: {}", m.state());
        }
    }

    #[test]
    fn stall_check_recovers_orphaned_ack_queue() {
        let mut m = machine(3, 3);
        m.state.queues.enqueue_ack(0);
        assert!(m.is_stalled());
        m.stall_check();
        assert!(m.presentation().has_log("Recovering simulation - processing pending ACKs"));
        assert_eq!(m.state().phase(), Phase::Acking);
    }
}
