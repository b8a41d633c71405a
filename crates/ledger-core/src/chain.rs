use crate::constants::GENESIS_PROOF;
use crate::pow::{proof_of_work, proof_of_work_cancellable, verify_proof, CancelToken};
use crate::{now_timestamp, Block, InvalidTransition, LedgerError, PreviousHash, Result, Transaction};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Smallest step used to keep block timestamps strictly increasing when the
/// wall clock has not moved past the tip.
const TIMESTAMP_STEP: f64 = 1e-6;

/// Ordered blocks plus the transactions waiting for the next one.
#[derive(Clone, Debug)]
pub struct Chain {
    pub(crate) blocks: Vec<Block>,
    pending: Vec<Transaction>,
    nodes: BTreeSet<String>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    /// A chain holding only its genesis block.
    pub fn new() -> Self {
        let mut chain = Self {
            blocks: Vec::new(),
            pending: Vec::new(),
            nodes: BTreeSet::new(),
        };
        chain.construct_genesis();
        chain
    }

    fn construct_genesis(&mut self) {
        self.construct_block(GENESIS_PROOF, PreviousHash::Genesis);
    }

    /// Appends a block holding every pending transaction and empties the buffer.
    pub fn construct_block(&mut self, proof_number: u64, previous_hash: PreviousHash) -> &Block {
        let data = std::mem::take(&mut self.pending);
        let timestamp = match self.blocks.last() {
            Some(tip) => next_timestamp(tip.timestamp),
            None => now_timestamp(),
        };
        let index = self.blocks.len();
        self.blocks.push(Block::new(
            index as u64,
            proof_number,
            previous_hash,
            data,
            timestamp,
        ));
        &self.blocks[index]
    }

    /// Queues a transaction and returns the index of the block that will carry it.
    pub fn add_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        quantity: u64,
    ) -> u64 {
        let tx = Transaction::new(sender, recipient, quantity);
        debug!(sender = %tx.sender, recipient = %tx.recipient, quantity, "transaction queued");
        self.pending.push(tx);
        self.blocks.len() as u64
    }

    pub fn latest_block(&self) -> &Block {
        // never empty: genesis is created in `new`
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn register_node(&mut self, address: &str) -> Result<bool> {
        let address = address.trim();
        if address.is_empty() {
            return Err(LedgerError::InvalidNode);
        }
        if self.nodes.insert(address.to_string()) {
            info!(address, "node registered");
        }
        Ok(true)
    }

    /// Solves the puzzle against the tip, then appends a block carrying the
    /// pending transactions followed by the miner's reward.
    pub fn mine_block(&mut self, miner: &str) -> Result<Block> {
        validate_miner(miner)?;
        let (last_proof, last_hash) = self.tip_link();
        let proof = proof_of_work(last_proof);
        Ok(self.commit_mined(miner, proof, PreviousHash::Linked(last_hash)))
    }

    /// [`Chain::mine_block`] with a stop signal. A cancelled attempt leaves
    /// the chain and the pending buffer untouched.
    pub fn mine_block_with(&mut self, miner: &str, token: &CancelToken) -> Result<Block> {
        validate_miner(miner)?;
        let (last_proof, last_hash) = self.tip_link();
        let proof = proof_of_work_cancellable(last_proof, token)?;
        Ok(self.commit_mined(miner, proof, PreviousHash::Linked(last_hash)))
    }

    pub(crate) fn tip_link(&self) -> (u64, String) {
        let tip = self.latest_block();
        (tip.proof_number, tip.hash())
    }

    /// Reward staging and block construction happen in one step.
    pub(crate) fn commit_mined(
        &mut self,
        miner: &str,
        proof_number: u64,
        previous_hash: PreviousHash,
    ) -> Block {
        self.pending.push(Transaction::reward(miner));
        let block = self.construct_block(proof_number, previous_hash).clone();
        info!(
            index = block.index,
            proof = block.proof_number,
            txs = block.data.len(),
            miner,
            "mined block"
        );
        block
    }

    /// Walks every adjacent pair and reports the first broken link.
    pub fn validate(&self) -> Result<()> {
        if let Some(genesis) = self.blocks.first() {
            if genesis.index != 0 {
                warn!(index = genesis.index, "genesis block has non-zero index");
                return Err(LedgerError::InvalidChain {
                    index: genesis.index,
                    reason: InvalidTransition::IndexMismatch,
                });
            }
        }
        for pair in self.blocks.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            if let Err(reason) = check_transition(block, previous) {
                warn!(index = block.index, %reason, "chain validation failed");
                return Err(LedgerError::InvalidChain {
                    index: block.index,
                    reason,
                });
            }
        }
        Ok(())
    }

    pub fn is_chain_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

pub(crate) fn validate_miner(miner: &str) -> Result<()> {
    if miner.trim().is_empty() {
        return Err(LedgerError::InvalidMiner);
    }
    Ok(())
}

fn next_timestamp(previous: f64) -> f64 {
    let now = now_timestamp();
    if now > previous {
        now
    } else {
        previous + TIMESTAMP_STEP
    }
}

/// Checks that `block` correctly follows `previous`.
pub fn check_transition(
    block: &Block,
    previous: &Block,
) -> std::result::Result<(), InvalidTransition> {
    if previous.index + 1 != block.index {
        return Err(InvalidTransition::IndexMismatch);
    }
    match &block.previous_hash {
        PreviousHash::Linked(hash) if *hash == previous.hash() => {}
        _ => return Err(InvalidTransition::HashMismatch),
    }
    if !verify_proof(previous.proof_number, block.proof_number) {
        return Err(InvalidTransition::InvalidProof);
    }
    if block.timestamp <= previous.timestamp {
        return Err(InvalidTransition::NonMonotonicTime);
    }
    Ok(())
}

pub fn is_valid_transition(block: &Block, previous: &Block) -> bool {
    check_transition(block, previous).is_ok()
}
