//! # ricart-sim — Ricart–Agrawala mutual exclusion, simulated
//!
//! A deterministic discrete-event engine that runs the Ricart–Agrawala
//! algorithm over a fixed set of nodes. Nodes talk only through
//! timestamped messages on a simulated network with per-link delays.
//! No async, no threads, no wall-clock time: a seed and a command
//! sequence fully determine a run.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────┐
//! │            Simulation             │ ← commands, Arc<Snapshot>
//! │  ┌─────────────┐  ┌────────────┐  │
//! │  │  Scheduler  │  │   Engine   │  │
//! │  │  min-heap   │→ │ MutexNode* │  │ ← Lamport clock + RA rules
//! │  │  + clock    │← │ Network    │  │ ← seeded delays
//! │  └─────────────┘  │ EventLog   │  │
//! │                   └────────────┘  │
//! └───────────────────────────────────┘
//! ```
//!
//! ```rust
//! use ricart_sim::{DelayPolicy, MutexState, NodeId, Scenario, Simulation};
//!
//! let mut sim = Simulation::new(Scenario::new(3, DelayPolicy::fixed(2)))?;
//! sim.request(NodeId::new(0))?;
//! sim.advance(1)?;
//! sim.request(NodeId::new(1))?;
//! sim.advance(3)?;
//!
//! let snap = sim.snapshot();
//! assert_eq!(snap.node(NodeId::new(0)).unwrap().state, MutexState::Held);
//! assert_eq!(snap.node(NodeId::new(0)).unwrap().pending_replies, vec![NodeId::new(1)]);
//! # Ok::<(), ricart_sim::SimError>(())
//! ```

pub mod clock;
pub mod dsl;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod explorer;
pub mod message;
pub mod network;
pub mod node;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;
pub mod time;

// Re-exports for convenience.
pub use clock::LamportClock;
pub use error::{ConfigError, SimError, SimResult};
pub use event::{Event, EventId, EventPayload, LocalCommand};
pub use eventlog::{EventLog, LogEntry, LogKind};
pub use message::{Message, MessageKind, RequestStamp};
pub use network::{DelayPolicy, Network, NetworkConfig};
pub use node::{MutexNode, MutexState, NodeEffect, NodeId, ProtocolInconsistency, RejectReason};
pub use scenario::{EdgeDelay, Scenario};
pub use scheduler::{AdvanceReport, EventHandler, Scheduler};
pub use simulation::{CommandOutcome, Simulation};
pub use snapshot::{InFlightMessage, InvariantViolation, NodeSnapshot, ScheduledCommand, Snapshot};
pub use time::VirtualTime;
