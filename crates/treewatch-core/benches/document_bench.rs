//! Benchmarks for document mutation and record delivery.
//!
//! Run with: cargo bench -p treewatch-core --bench document_bench

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use treewatch_core::{Document, NodeRef, ObserveOptions, Observer, TreeObserver};

fn deep_chain(doc: &Document, depth: usize) -> NodeRef {
    let mut node = doc.root();
    for _ in 0..depth {
        node = node.append_child("link").expect("live parent");
    }
    node
}

// =============================================================================
// Tree construction
// =============================================================================

fn bench_tree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("document/build");

    for n in [64usize, 256, 1024] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("append_wide", n), &n, |b, &n| {
            b.iter(|| {
                let doc = Document::new();
                let root = doc.root();
                for _ in 0..n {
                    root.append_child("item");
                }
                black_box(doc)
            })
        });
        group.bench_with_input(BenchmarkId::new("append_deep", n), &n, |b, &n| {
            b.iter(|| {
                let doc = Document::new();
                black_box(deep_chain(&doc, n));
                black_box(doc)
            })
        });
    }

    group.finish();
}

// =============================================================================
// Mutation with and without observers
// =============================================================================

fn bench_mutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("document/mutate");

    // No observers anywhere: the routing walk finds empty lists.
    group.bench_function("set_attribute_unobserved", |b| {
        let doc = Document::new();
        let node = doc.root().append_child("panel").expect("live root");
        b.iter(|| {
            node.set_attribute(black_box("class"), black_box("warm"));
            black_box(&node);
        })
    });

    // An observer is registered but its options do not match the change.
    group.bench_function("set_attribute_non_matching", |b| {
        let doc = Document::new();
        let node = doc.root().append_child("panel").expect("live root");
        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new().child_list(true).subtree(true);
        observer
            .observe(Some(&doc.root()), Some(&options))
            .expect("registration");
        b.iter(|| {
            node.set_attribute(black_box("class"), black_box("warm"));
            black_box(&node);
        })
    });

    // Matching observer; drain each iteration so the queue stays bounded.
    group.bench_function("set_attribute_matching_drain", |b| {
        let doc = Document::new();
        let node = doc.root().append_child("panel").expect("live root");
        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new().attributes(true).subtree(true);
        observer
            .observe(Some(&doc.root()), Some(&options))
            .expect("registration");
        b.iter(|| {
            node.set_attribute(black_box("class"), black_box("warm"));
            black_box(observer.take_records().expect("drain"));
        })
    });

    group.finish();
}

// =============================================================================
// Routing cost over ancestor depth
// =============================================================================

fn bench_record_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("document/route");

    for depth in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("leaf_attribute", depth), &depth, |b, &depth| {
            let doc = Document::new();
            let leaf = deep_chain(&doc, depth);
            let observer = TreeObserver::new(|_| {});
            let options = ObserveOptions::new().attributes(true).subtree(true);
            observer
                .observe(Some(&doc.root()), Some(&options))
                .expect("registration");
            b.iter(|| {
                leaf.set_attribute(black_box("class"), black_box("warm"));
                black_box(observer.take_records().expect("drain"));
            })
        });
    }

    group.finish();
}

// =============================================================================
// Batch delivery
// =============================================================================

fn bench_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("document/deliver");

    for batch in [16usize, 256] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("pending", batch), &batch, |b, &batch| {
            b.iter_batched(
                || {
                    let doc = Document::new();
                    let observer = TreeObserver::new(|records| {
                        black_box(records.len());
                    });
                    let options = ObserveOptions::new().child_list(true);
                    observer
                        .observe(Some(&doc.root()), Some(&options))
                        .expect("registration");
                    let root = doc.root();
                    for _ in 0..batch {
                        root.append_child("item");
                    }
                    (doc, observer)
                },
                |(doc, _observer)| black_box(doc.deliver_pending()),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tree_build,
    bench_mutation,
    bench_record_routing,
    bench_delivery,
);
criterion_main!(benches);
