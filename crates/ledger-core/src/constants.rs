pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;

/// Number of leading `'0'` hex digits a proof digest must start with.
pub const POW_DIFFICULTY: usize = 4;

/// Candidates tried between two cancellation checks in the sequential search.
pub const CANCEL_CHECK_INTERVAL: u64 = 1 << 12;

pub const GENESIS_PROOF: u64 = 0;
/// Encoding of the genesis block's missing predecessor inside block hashes.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

pub const REWARD_SENDER: &str = "0";
pub const MINING_REWARD: u64 = 1;
