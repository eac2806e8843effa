use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sprite_ledger_core::prelude::*;

fn bench_plan_pages(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_pages");
    let cfg = LedgerConfig::default();

    for count in [128u64, 1_000, 10_000] {
        let keys: Vec<GlobalKey> = (0..count).map(GlobalKey).collect();
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.iter(|| black_box(plan_pages(keys, &cfg, 0).expect("plan")));
        });
    }

    group.finish();
}

fn sample_text(rng: &mut StdRng, refs: usize, max_id: u64) -> String {
    let mut text = String::new();
    for _ in 0..refs {
        let id = rng.gen_range(0..max_id);
        match rng.gen_range(0..4) {
            0 => text.push_str(&format!("hello :emoji:s{id}: ")),
            1 => text.push_str(&format!("look ![](/emoji/s{id}.png) ")),
            2 => text.push_str(&format!("and ![](emoji/s{id}.png) ")),
            _ => text.push_str("plain words without references "),
        }
    }
    text
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");
    let mapping: MappingStore = (0..5_000u64)
        .map(|i| (LegacyKey(i + 1), GlobalKey(i)))
        .collect();
    let rewriter = Rewriter::new(&mapping);
    let mut rng = StdRng::seed_from_u64(7);

    for refs in [10usize, 100, 1_000] {
        let text = sample_text(&mut rng, refs, 6_000);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(refs), &text, |b, text| {
            b.iter(|| black_box(rewriter.rewrite(text)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_pages, bench_rewrite);
criterion_main!(benches);
