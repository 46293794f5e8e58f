//! History of a simulation run.
//!
//! Every command, transition, send and delivery lands in an append-only
//! log of [`LogEntry`] values. Two runs with the same scenario and the
//! same commands produce logs with the same [`EventLog::digest`], which is
//! what replay tests compare.

use std::io::{self, Write};

use crate::message::MessageKind;
use crate::network::DelayPolicy;
use crate::node::{NodeId, ProtocolInconsistency, RejectReason};
use crate::time::VirtualTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a variant).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

// ── Entries ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "event", rename_all = "snake_case")
)]
pub enum LogKind {
    /// The engine was (re)built.
    Init {
        node_count: usize,
        delay: DelayPolicy,
        seed: u64,
    },
    RequestIssued { node: NodeId, timestamp: u64 },
    RequestRejected { node: NodeId, reason: RejectReason },
    MessageSent {
        kind: MessageKind,
        from: NodeId,
        to: NodeId,
        timestamp: u64,
        delivery_tick: VirtualTime,
    },
    MessageDelivered {
        kind: MessageKind,
        from: NodeId,
        to: NodeId,
        timestamp: u64,
    },
    Deferred { node: NodeId, requester: NodeId },
    Entered { node: NodeId },
    Released { node: NodeId, replied: Vec<NodeId> },
    ReleaseRejected { node: NodeId, reason: RejectReason },
    Inconsistency { detail: ProtocolInconsistency },
    Advanced {
        from: VirtualTime,
        to: VirtualTime,
        fired: usize,
    },
    Reset,
    Terminated,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogKind::Init {
                node_count,
                delay,
                seed,
            } => write!(f, "init nodes={} delay={} seed={}", node_count, delay, seed),
            LogKind::RequestIssued { node, timestamp } => {
                write!(f, "{} requests at ts={}", node, timestamp)
            }
            LogKind::RequestRejected { node, reason } => {
                write!(f, "{} request rejected: {}", node, reason)
            }
            LogKind::MessageSent {
                kind,
                from,
                to,
                timestamp,
                delivery_tick,
            } => write!(
                f,
                "{} {}→{} ts={} sent, due {}",
                kind, from, to, timestamp, delivery_tick
            ),
            LogKind::MessageDelivered {
                kind,
                from,
                to,
                timestamp,
            } => write!(f, "{} {}→{} ts={} delivered", kind, from, to, timestamp),
            LogKind::Deferred { node, requester } => {
                write!(f, "{} defers {}", node, requester)
            }
            LogKind::Entered { node } => write!(f, "{} enters critical section", node),
            LogKind::Released { node, replied } => {
                write!(f, "{} releases", node)?;
                if !replied.is_empty() {
                    let names: Vec<String> = replied.iter().map(|n| n.to_string()).collect();
                    write!(f, ", replying to {}", names.join(","))?;
                }
                Ok(())
            }
            LogKind::ReleaseRejected { node, reason } => {
                write!(f, "{} release rejected: {}", node, reason)
            }
            LogKind::Inconsistency { detail } => write!(f, "inconsistency: {}", detail),
            LogKind::Advanced { from, to, fired } => {
                write!(f, "advanced {} → {} ({} events)", from, to, fired)
            }
            LogKind::Reset => write!(f, "reset"),
            LogKind::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct LogEntry {
    pub tick: VirtualTime,
    #[cfg_attr(feature = "serialize", serde(flatten))]
    pub kind: LogKind,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tick, self.kind)
    }
}

// ── Event Log ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog {
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, tick: VirtualTime, kind: LogKind) {
        self.entries.push(LogEntry { tick, kind });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries recorded at exactly `tick`.
    pub fn at(&self, tick: VirtualTime) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.tick == tick)
    }

    /// Entries recorded after the first `from` entries.
    pub fn since(&self, from: usize) -> &[LogEntry] {
        self.entries.get(from..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deterministic hash of the whole history.
    pub fn digest(&self) -> u64 {
        self.entries.iter().fold(0, |h, entry| {
            let h = hash_combine(h, entry.tick.ticks());
            hash_combine(h, hash_bytes(entry.kind.to_string().as_bytes()))
        })
    }

    /// Write the log in a line-per-entry text format.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# RICART-SIM EVENT LOG v1")?;
        writeln!(w, "# entries: {}", self.entries.len())?;
        writeln!(w, "# digest: {:016x}", self.digest())?;
        for entry in &self.entries {
            writeln!(w, "{}", entry)?;
        }
        Ok(())
    }
}
