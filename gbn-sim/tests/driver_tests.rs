//! Integration tests for the tokio real-time driver.
//!
//! The tokio clock is paused, so sleeps inside the driver task auto-advance
//! and the tests run instantly while still exercising the wall-clock mapping.

use std::time::Duration;

use gbn_sim::driver::{self, Command};
use gbn_sim::presentation::Recorder;
use gbn_sim::{ErrorMode, Lifecycle, SimConfig, Simulation, UnitKind};

fn sim(cfg: SimConfig) -> Simulation<Recorder> {
    Simulation::new(cfg.with_seed(3), Recorder::new()).expect("valid config")
}

// ---------------------------------------------------------------------------
// Test 1: a lossless run plays to completion in wall time
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_driver_runs_to_completion() {
    let mut handle = driver::spawn(sim(SimConfig::new(4, 2)));
    assert_eq!(handle.lifecycle(), Lifecycle::Idle);

    assert!(handle.send(Command::Start).await);
    handle.completed().await;
    assert_eq!(handle.lifecycle(), Lifecycle::Completed);

    let sim = handle.shutdown().await.expect("driver task");
    assert_eq!(sim.lifecycle(), Lifecycle::Completed);
    assert!(sim.now() >= Duration::from_millis(15_500));
    assert_eq!(
        sim.presentation().sent(UnitKind::Packet),
        vec![0, 1, 2, 3]
    );
}

// ---------------------------------------------------------------------------
// Test 2: shutdown before completion hands back the partial run
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_driver_shutdown_mid_run() {
    let handle = driver::spawn(sim(SimConfig::new(10, 4)));
    handle.send(Command::Start).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let sim = handle.shutdown().await.expect("driver task");
    assert_eq!(sim.lifecycle(), Lifecycle::Running);
    assert!(sim.state().base() < 10);
    assert!(!sim.presentation().transmissions().is_empty());
}

// ---------------------------------------------------------------------------
// Test 3: pause holds the run across a long wall-clock gap
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_driver_pause_resume() {
    let mut handle = driver::spawn(sim(SimConfig::new(3, 3)));
    handle.send(Command::Start).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    handle.send(Command::Pause).await;
    // Longer than the 40 s retransmission timeout.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(handle.lifecycle(), Lifecycle::Paused);

    handle.send(Command::Resume).await;
    handle.completed().await;

    let sim = handle.shutdown().await.expect("driver task");
    assert_eq!(sim.lifecycle(), Lifecycle::Completed);
    assert_eq!(sim.stats().timeouts, 0);
    assert!(sim.now() >= Duration::from_secs(121));
}

// ---------------------------------------------------------------------------
// Test 4: manual loss and reset commands
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_driver_manual_loss_command() {
    let cfg = SimConfig::new(2, 2).with_error_mode(ErrorMode::Manual);
    let mut handle = driver::spawn(sim(cfg));
    handle.send(Command::Start).await;
    // Packet 0 is in transit until 1.5 s.
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle
        .send(Command::Lose {
            seq: 0,
            kind: UnitKind::Packet,
        })
        .await;
    handle.completed().await;

    let sim = handle.shutdown().await.expect("driver task");
    assert_eq!(sim.stats().packets_lost, 1);
    assert!(sim
        .presentation()
        .has_log("Resending packet 0 after manual error"));
}

#[tokio::test(start_paused = true)]
async fn test_driver_reset_returns_to_idle() {
    let handle = driver::spawn(sim(SimConfig::new(4, 2)));
    handle.send(Command::Start).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.send(Command::Reset).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(handle.lifecycle(), Lifecycle::Idle);

    let sim = handle.shutdown().await.expect("driver task");
    assert_eq!(sim.state().base(), 0);
    assert!(sim.state().in_flight().is_none());
    assert!(sim.presentation().has_log("Simulation reset"));
}
