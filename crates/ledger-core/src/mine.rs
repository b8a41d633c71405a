use crate::pow::{verify_proof, CancelToken};
use crate::{LedgerError, Result};
use rayon::prelude::*;
use tracing::{info, warn};

/// Proof search spread over the rayon pool.
///
/// Uses an ordered find so the answer is the same smallest candidate the
/// sequential search returns. Every worker polls `token`; a cancelled search
/// returns [`LedgerError::MiningCancelled`].
pub fn proof_of_work_parallel(last: u64, token: &CancelToken) -> Result<u64> {
    let found = (0u64..u64::MAX)
        .into_par_iter()
        .find_map_first(|candidate| {
            if token.is_cancelled() {
                Some(Err(LedgerError::MiningCancelled))
            } else if verify_proof(last, candidate) {
                Some(Ok(candidate))
            } else {
                None
            }
        })
        .unwrap_or(Err(LedgerError::MiningCancelled));

    match &found {
        Ok(candidate) => info!(last, candidate, "proof found on worker pool"),
        Err(_) => warn!(last, "parallel proof search cancelled"),
    }
    found
}
