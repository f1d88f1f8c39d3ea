pub mod block;
pub mod model;
pub mod state;

pub use block::{Block, is_valid_hash};
pub use model::Blockchain;
pub use state::SharedChain;

use thiserror::Error;

/// Proof-of-Work difficulty: required number of leading zeros in a block hash.
pub const DEFAULT_DIFFICULTY: u32 = 3;

/// Why a candidate block was not committed to the chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("candidate index {candidate} does not follow tip index {tip}")]
    IndexMismatch { candidate: u64, tip: u64 },
    #[error("candidate prev_hash does not match the tip hash")]
    PrevHashMismatch,
    #[error("candidate hash does not match its recomputed digest")]
    HashMismatch,
    #[error("candidate hash does not meet difficulty {0}")]
    BelowDifficulty(u32),
    #[error("candidate chain is not longer than the held chain")]
    NotLonger,
}
