//! Error taxonomy for the chain core.
//!
//! Everything that can go wrong while parsing, building or walking a
//! linked-server chain lands in [`ChainError`]. Transport and auth failures
//! from the live connection are *not* represented here: they propagate as
//! `anyhow::Error` so that a cyclic topology and an unreachable hop stay
//! distinguishable to the operator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Chain notation text failed to parse.
    #[error("malformed chain segment '{segment}': {reason}")]
    MalformedChain { segment: String, reason: &'static str },

    /// Programmatic append with an empty hostname.
    #[error("hop hostname must not be empty")]
    InvalidHop,

    /// A chained query was requested over zero hops.
    #[error("cannot build a chained query over an empty server chain")]
    EmptyChain,

    /// The traversal driver saw the same execution context twice.
    #[error(
        "linked server loop: hop {repeat_index} ('{hostname}') repeats the \
         execution context first seen at hop {first_index}"
    )]
    LinkedServerLoop {
        hostname: String,
        first_index: usize,
        repeat_index: usize,
    },
}
