use ledger_core::Transaction;
use rand::Rng;

pub fn random_transactions(count: usize) -> Vec<Transaction> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            Transaction::new(
                format!("addr_from_{i}"),
                format!("addr_to_{i}"),
                rng.gen_range(1..1_000),
            )
        })
        .collect()
}
