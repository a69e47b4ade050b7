//! sqlhop — linked-server chain traversal and enumeration toolkit for
//! Microsoft SQL Server.
//!
//! The core is the chain engine: building nested `OPENQUERY` / `EXEC ... AT`
//! statements that route a query through an arbitrary list of linked-server
//! hops with per-hop impersonation and correct quote escalation, plus a
//! runtime loop-detection walk that fingerprints each hop's execution context
//! before the chain is trusted. Everything else (auth, actions, output) is
//! plumbing around it.

pub mod actions;
pub mod auth;
pub mod chain;
pub mod context;
pub mod error;
pub mod output;

pub use chain::builder::{build_query_chain, TraversalMode};
pub use chain::traverse::{verify_chain, Fingerprint, ProbeReply, ProbeRunner};
pub use chain::{Hop, ServerChain};
pub use error::ChainError;
