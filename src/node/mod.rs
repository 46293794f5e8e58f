//! Per-process Ricart–Agrawala state machines.
//!
//! Nodes share no memory. The controller keeps them in one table indexed
//! by [`NodeId`], and every interaction between two nodes is a
//! [`Message`](crate::message::Message) travelling through the scheduler.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`] newtype |
//! | [`state`] | [`MutexState`] |
//! | [`effect`] | [`NodeEffect`], [`RejectReason`], [`ProtocolInconsistency`] |
//! | [`machine`] | [`MutexNode`] |

pub mod effect;
pub mod id;
pub mod machine;
pub mod state;

pub use effect::{NodeEffect, ProtocolInconsistency, RejectReason};
pub use id::NodeId;
pub use machine::MutexNode;
pub use state::MutexState;
