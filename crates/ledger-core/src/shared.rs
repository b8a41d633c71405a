use crate::chain::validate_miner;
use crate::mine::proof_of_work_parallel;
use crate::{Block, CancelToken, Chain, LedgerError, PreviousHash, Result, Transaction};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// Thread-safe handle to a single [`Chain`].
///
/// Queuing a transaction and committing a mined block are serialised by one
/// lock, so a transaction is never lost or bundled twice. The proof search
/// itself runs outside the lock on the rayon pool.
#[derive(Clone, Default)]
pub struct SharedChain {
    inner: Arc<Mutex<Chain>>,
}

impl SharedChain {
    pub fn new() -> Self {
        Self::from_chain(Chain::new())
    }

    pub fn from_chain(chain: Chain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    pub fn add_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        quantity: u64,
    ) -> u64 {
        self.inner.lock().add_transaction(sender, recipient, quantity)
    }

    pub fn register_node(&self, address: &str) -> Result<bool> {
        self.inner.lock().register_node(address)
    }

    /// Searches for a proof against the current tip, then commits the block
    /// only if the tip is still the one the proof was computed for.
    pub fn mine_block(&self, miner: &str, token: &CancelToken) -> Result<Block> {
        validate_miner(miner)?;
        let (last_proof, last_hash) = self.read(Chain::tip_link);

        let proof = proof_of_work_parallel(last_proof, token)?;
        self.commit(miner, proof, last_hash)
    }

    fn commit(&self, miner: &str, proof: u64, last_hash: String) -> Result<Block> {
        let mut chain = self.inner.lock();
        let (_, tip_hash) = chain.tip_link();
        if tip_hash != last_hash {
            warn!(expected = %last_hash, found = %tip_hash, "discarding stale proof");
            return Err(LedgerError::StaleTip {
                expected: last_hash,
                found: tip_hash,
            });
        }
        Ok(chain.commit_mined(miner, proof, PreviousHash::Linked(last_hash)))
    }

    /// Runs `f` against a consistent view of the chain.
    pub fn read<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        f(&self.inner.lock())
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read(|chain| chain.blocks().to_vec())
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.read(|chain| chain.pending().to_vec())
    }

    pub fn nodes(&self) -> Vec<String> {
        self.read(|chain| chain.nodes().map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.read(Chain::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(Chain::is_empty)
    }

    pub fn latest_block(&self) -> Block {
        self.read(|chain| chain.latest_block().clone())
    }

    pub fn is_chain_valid(&self) -> bool {
        self.read(Chain::is_chain_valid)
    }

    pub fn validate(&self) -> Result<()> {
        self.read(Chain::validate)
    }
}
