use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use mesh_adapt_run::algs::distribute::extract_fragment;
use mesh_adapt_run::algs::merge::merge_fragments;
use mesh_adapt_run::algs::meshgen::box_mesh;
use mesh_adapt_run::algs::partition::partition_elements;

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for &n in &[4usize, 8, 12] {
        let mesh = box_mesh([n, n, n], [1.0; 3]).unwrap();
        group.bench_with_input(BenchmarkId::new("bfs_4_parts", 6 * n * n * n), &mesh, |b, m| {
            b.iter(|| partition_elements(black_box(m), 4).unwrap())
        });
    }
    group.finish();
}

fn bench_split_and_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_merge");
    for &n in &[4usize, 8] {
        let mesh = box_mesh([n, n, n], [1.0; 3]).unwrap();
        let parts = partition_elements(&mesh, 4).unwrap();
        group.bench_with_input(BenchmarkId::new("4_parts", 6 * n * n * n), &mesh, |b, m| {
            b.iter(|| {
                let fragments: Vec<_> = (0..4)
                    .map(|r| (r, extract_fragment(m, &parts, r).unwrap()))
                    .collect();
                merge_fragments(fragments, 1e-12).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_partition, bench_split_and_merge);
criterion_main!(benches);
