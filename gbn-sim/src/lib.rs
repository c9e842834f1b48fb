//! `gbn-sim`: a discrete-event simulator of the Go-Back-N sliding-window
//! ARQ protocol.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  notify_*   ┌────────────────────┐
//!  │  Simulation  │────────────▶│    Presentation    │
//!  │ (controller) │◀────────────│ (Recorder/Console) │
//!  └──────┬───────┘ complete /  └────────────────────┘
//!         │         lost
//!  ┌──────▼──────────────────────────────┐
//!  │          ProtocolMachine            │
//!  │  GbnSender · GbnReceiver · queues   │
//!  └──────┬─────────────┬────────────────┘
//!         │             │ should_drop
//!  ┌──────▼──────┐  ┌───▼──────────┐
//!  │ EventQueue  │  │ ChannelModel │
//!  │ + timers    │  └──────────────┘
//!  └──────┬──────┘
//!         │ virtual clock ─▶ wall clock
//!  ┌──────▼──────┐
//!  │   driver    │  (tokio task, optional)
//!  └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]        : per-sequence-number packet status
//! - [`gbn_sender`]    : sender window, cumulative-ACK rule, go-back step
//! - [`gbn_receiver`]  : in-order acceptance and ACK choice
//! - [`queue`]         : FIFO send/ACK queues and the `Phase` enum
//! - [`channel`]       : seedable lossy channel model
//! - [`event`]         : virtual clock and deterministic event queue
//! - [`timer`]         : per-packet retransmission timers
//! - [`state`]         : run state, lifecycle and statistics
//! - [`protocol`]      : the protocol state machine
//! - [`simulation`]    : session controller (start/pause/resume/reset)
//! - [`presentation`]  : notification interface to the display layer
//! - [`config`]        : run parameters and validation
//! - [`driver`]        : tokio task playing a simulation in wall time

pub mod channel;
pub mod config;
pub mod driver;
pub mod event;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod packet;
pub mod presentation;
pub mod protocol;
pub mod queue;
pub mod simulation;
pub mod state;
pub mod timer;

pub use config::{ConfigError, Delivery, ErrorMode, SimConfig};
pub use packet::{PacketStatus, UnitKind};
pub use presentation::{LogLevel, Presentation};
pub use simulation::Simulation;
pub use state::{Lifecycle, SimStats};
