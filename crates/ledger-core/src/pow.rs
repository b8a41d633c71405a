use crate::constants::{CANCEL_CHECK_INTERVAL, POW_DIFFICULTY};
use crate::{Hash, LedgerError, Result};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stop signal for a proof search. Clones share the flag; each clone may
/// carry its own deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Once cancelled the flag stays set.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// SHA-256 of `str(last) ++ str(candidate)`.
pub fn proof_hash(last: u64, candidate: u64) -> Hash {
    Sha256::digest(format!("{last}{candidate}").as_bytes()).into()
}

pub fn count_leading_zero_nibbles(hash: &Hash) -> usize {
    let mut total = 0;
    for b in hash {
        if *b == 0 {
            total += 2;
        } else {
            if b >> 4 == 0 {
                total += 1;
            }
            break;
        }
    }
    total
}

/// True iff the hex digest of `str(last) ++ str(candidate)` starts with
/// [`POW_DIFFICULTY`] zero digits.
pub fn verify_proof(last: u64, candidate: u64) -> bool {
    count_leading_zero_nibbles(&proof_hash(last, candidate)) >= POW_DIFFICULTY
}

/// Smallest non-negative candidate satisfying [`verify_proof`]. Runs until found.
pub fn proof_of_work(last: u64) -> u64 {
    let mut candidate = 0u64;
    while !verify_proof(last, candidate) {
        candidate += 1;
    }
    debug!(last, candidate, "proof found");
    candidate
}

/// Same search as [`proof_of_work`], polling `token` every
/// [`CANCEL_CHECK_INTERVAL`] candidates.
pub fn proof_of_work_cancellable(last: u64, token: &CancelToken) -> Result<u64> {
    let mut candidate = 0u64;
    loop {
        if candidate % CANCEL_CHECK_INTERVAL == 0 && token.is_cancelled() {
            warn!(last, tried = candidate, "proof search cancelled");
            return Err(LedgerError::MiningCancelled);
        }
        if verify_proof(last, candidate) {
            debug!(last, candidate, "proof found");
            return Ok(candidate);
        }
        candidate += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zero_nibbles_examples() {
        let mut h = [0u8; 32];
        assert_eq!(count_leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(count_leading_zero_nibbles(&h), 1);
        h[0] = 0xF0;
        assert_eq!(count_leading_zero_nibbles(&h), 0);
        h = [0u8; 32];
        h[2] = 0x01;
        assert_eq!(count_leading_zero_nibbles(&h), 5);
    }

    #[test]
    fn verify_matches_hex_prefix() {
        let prefix = "0".repeat(POW_DIFFICULTY);
        for (last, candidate) in [(0, 69732), (69732, 23263), (0, 1), (5, 5)] {
            let digest = hex::encode(proof_hash(last, candidate));
            assert_eq!(verify_proof(last, candidate), digest.starts_with(&prefix));
        }
        assert!(verify_proof(0, 69732));
        assert!(!verify_proof(0, 69731));
    }

    #[test]
    fn proof_hash_example() {
        assert_eq!(
            hex::encode(proof_hash(0, 69732)),
            "0000e326186933fa83f0efd581d09409022ec07b73a10f549bbaa6472e8a1175"
        );
    }

    #[test]
    fn proof_of_work_returns_smallest_solution() {
        assert_eq!(proof_of_work(0), 69732);
        assert_eq!(proof_of_work(69732), 23263);
        assert!((0..23263).all(|c| !verify_proof(69732, c)));
    }

    #[test]
    fn cancellable_search_agrees_with_plain_search() {
        let token = CancelToken::new();
        assert_eq!(proof_of_work_cancellable(69732, &token).unwrap(), 23263);
    }

    #[test]
    fn cancelled_token_stops_search() {
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            proof_of_work_cancellable(0, &token),
            Err(LedgerError::MiningCancelled)
        ));
    }

    #[test]
    fn expired_deadline_stops_search() {
        let token = CancelToken::new().with_deadline(Instant::now());
        assert!(token.is_cancelled());
        assert!(proof_of_work_cancellable(0, &token).is_err());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let timed = token.clone().with_timeout(Duration::from_secs(3600));
        assert!(!timed.is_cancelled());
        token.cancel();
        assert!(timed.is_cancelled());
    }
}
