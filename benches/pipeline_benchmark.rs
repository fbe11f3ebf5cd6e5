#![allow(clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use kbinner::bin_stat::BinStat;
use kbinner::hasher::count_bin;
use kbinner::kmer::KmerLength;
use kbinner::memory_planner::MemoryPlanner;
use kbinner::minimizer::super_mer_spans;

fn bench_memory_planner_stage1(c: &mut Criterion) {
    c.bench_function("MemoryPlanner::stage1", |b| {
        b.iter(|| MemoryPlanner::stage1(black_box(1024), black_box(4)))
    });
}

fn bench_memory_planner_stage2(c: &mut Criterion) {
    let stats = BinStat::new(0, 50_000, 60_000, 3);
    c.bench_function("MemoryPlanner::stage2", |b| {
        b.iter(|| MemoryPlanner::stage2(black_box(1024), black_box(8), black_box(0), black_box(9), &stats))
    });
}

fn bench_super_mer_spans_by_read_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("super_mer_spans/read_length");
    for len_kb in [1, 10, 100] {
        let seq = "ACGT".repeat(len_kb * 250);
        group.bench_with_input(BenchmarkId::from_parameter(len_kb), &seq, |b, seq| {
            b.iter(|| super_mer_spans(black_box(seq.as_bytes()), 21, 11))
        });
    }
    group.finish();
}

fn bench_count_bin(c: &mut Criterion) {
    let k = KmerLength::new(21).unwrap();
    let super_mers: Vec<Vec<u8>> = (0..50).map(|_| "ACGTACGTACGTACGTACGTACGTACGTACGT".repeat(20).into_bytes()).collect();

    c.bench_function("hasher::count_bin", |b| {
        b.iter(|| count_bin(black_box(&super_mers), k, true, 1 << 16))
    });
}

criterion_group!(
    benches,
    bench_memory_planner_stage1,
    bench_memory_planner_stage2,
    bench_super_mer_spans_by_read_length,
    bench_count_bin
);
criterion_main!(benches);
