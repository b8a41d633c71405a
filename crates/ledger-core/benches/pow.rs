use criterion::{criterion_group, criterion_main, Criterion};
use ledger_core::mine::proof_of_work_parallel;
use ledger_core::pow::{proof_of_work, verify_proof};
use ledger_core::CancelToken;
use std::hint::black_box;

fn bench_pow(c: &mut Criterion) {
    c.bench_function("verify_proof", |b| {
        b.iter(|| verify_proof(black_box(0), black_box(69732)));
    });

    c.bench_function("proof_of_work_sequential", |b| {
        b.iter(|| proof_of_work(black_box(69732)));
    });

    c.bench_function("proof_of_work_parallel", |b| {
        let token = CancelToken::new();
        b.iter(|| proof_of_work_parallel(black_box(69732), &token));
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
