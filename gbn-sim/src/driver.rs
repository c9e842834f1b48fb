//! Real-time driver.
//!
//! [`spawn`] moves a [`Simulation`] onto a tokio task that maps one
//! millisecond of virtual time to one millisecond of wall time.  The task
//! sleeps until the next scheduled event and accepts [`Command`]s from a
//! [`SimHandle`] in between, multiplexed with `tokio::select!`.
//!
//! # Shutdown
//!
//! Send [`Command::Shutdown`] (or drop every sender) and await
//! [`SimHandle::shutdown`] / [`SimHandle::join`] to get the simulation back.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::packet::UnitKind;
use crate::presentation::Presentation;
use crate::simulation::Simulation;
use crate::state::Lifecycle;

/// Requests accepted by the driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Reset,
    /// Manual-mode loss of the unit currently in flight.
    Lose { seq: u32, kind: UnitKind },
    /// Completion of a unit's transit, for external delivery.
    Complete { seq: u32, kind: UnitKind },
    SetErrorRate(u8),
    Shutdown,
}

/// Handle to a running driver task.
pub struct SimHandle<P> {
    cmd_tx: mpsc::Sender<Command>,
    lifecycle_rx: watch::Receiver<Lifecycle>,
    handle: JoinHandle<Simulation<P>>,
}

impl<P> SimHandle<P> {
    /// Queue a command.  Returns `false` if the task has already stopped.
    pub async fn send(&self, cmd: Command) -> bool {
        self.cmd_tx.send(cmd).await.is_ok()
    }

    /// Lifecycle as of the last event the task processed.
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle_rx.borrow()
    }

    /// Resolve once the run reaches `Completed`, or the task stops.
    pub async fn completed(&mut self) {
        let _ = self
            .lifecycle_rx
            .wait_for(|l| *l == Lifecycle::Completed)
            .await;
    }

    /// Ask the task to stop and wait for it.
    pub async fn shutdown(self) -> Result<Simulation<P>, JoinError> {
        // The task may already be gone; joining still returns it.
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        self.handle.await
    }

    /// Wait for the task to stop on its own (after `Shutdown` was sent
    /// elsewhere or every sender dropped).
    pub async fn join(self) -> Result<Simulation<P>, JoinError> {
        drop(self.cmd_tx);
        self.handle.await
    }
}

/// Run `sim` on a background task.
pub fn spawn<P>(sim: Simulation<P>) -> SimHandle<P>
where
    P: Presentation + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);
    let (lifecycle_tx, lifecycle_rx) = watch::channel(sim.lifecycle());
    let handle = tokio::spawn(event_loop(sim, cmd_rx, lifecycle_tx));
    SimHandle {
        cmd_tx,
        lifecycle_rx,
        handle,
    }
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

async fn event_loop<P: Presentation>(
    mut sim: Simulation<P>,
    mut cmd_rx: mpsc::Receiver<Command>,
    lifecycle_tx: watch::Sender<Lifecycle>,
) -> Simulation<P> {
    let origin = Instant::now();
    let virtual_origin = sim.now();
    let virtual_now = || virtual_origin + origin.elapsed();

    // With nothing scheduled the timer sleeps far in the future; the
    // `armed` guard keeps select! from polling it.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let timer = tokio::time::sleep(far_future);
    tokio::pin!(timer);

    loop {
        let armed = match sim.next_event_at() {
            Some(at) => {
                timer
                    .as_mut()
                    .reset(origin + at.saturating_sub(virtual_origin));
                true
            }
            None => false,
        };

        tokio::select! {
            // ── Branch 1: command from the handle ────────────────────────
            cmd = cmd_rx.recv() => {
                sim.run_until(virtual_now());
                match cmd {
                    None | Some(Command::Shutdown) => {
                        log::debug!("[gbn:driver] shutting down at {:?}", sim.now());
                        break;
                    }
                    Some(cmd) => apply(&mut sim, cmd),
                }
            }

            // ── Branch 2: next scheduled event is due ────────────────────
            _ = &mut timer, if armed => {
                sim.run_until(virtual_now());
            }
        }

        let current = sim.lifecycle();
        lifecycle_tx.send_if_modified(|l| {
            let changed = *l != current;
            *l = current;
            changed
        });
    }
    sim
}

fn apply<P: Presentation>(sim: &mut Simulation<P>, cmd: Command) {
    log::debug!("[gbn:driver] {cmd:?}");
    match cmd {
        Command::Start => sim.start(),
        Command::Pause => sim.pause(),
        Command::Resume => sim.resume(),
        Command::Reset => sim.reset(),
        Command::Lose { seq, kind } => {
            sim.on_transmission_lost(seq, kind);
        }
        Command::Complete { seq, kind } => {
            sim.on_transmission_complete(seq, kind);
        }
        Command::SetErrorRate(rate) => sim.set_error_rate(rate),
        Command::Shutdown => {}
    }
}
