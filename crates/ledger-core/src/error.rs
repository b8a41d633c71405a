use std::fmt;
use thiserror::Error;

/// Why a pair of adjacent blocks does not form a valid link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTransition {
    IndexMismatch,
    HashMismatch,
    InvalidProof,
    NonMonotonicTime,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            InvalidTransition::IndexMismatch => "non-contiguous index",
            InvalidTransition::HashMismatch => "previous hash does not match predecessor",
            InvalidTransition::InvalidProof => "proof of work does not verify",
            InvalidTransition::NonMonotonicTime => "timestamp not after predecessor",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed block record: {0}")]
    MalformedRecord(String),

    #[error("miner address must not be empty")]
    InvalidMiner,

    #[error("node address must not be empty")]
    InvalidNode,

    #[error("mining attempt cancelled")]
    MiningCancelled,

    #[error("chain tip moved while mining: expected {expected}, found {found}")]
    StaleTip { expected: String, found: String },

    #[error("invalid block at index {index}: {reason}")]
    InvalidChain {
        index: u64,
        reason: InvalidTransition,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
