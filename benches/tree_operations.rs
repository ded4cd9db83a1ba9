//! Tree CRDT operation benchmarks: detect regressions in the mutation and
//! indexed-view rebuild paths (design §4.3, §4.4).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

use weave_core::document::Document;
use weave_core::node::NodeSpec;

fn build_document_with_children(count: usize) -> Document {
    let doc = Document::new(1).unwrap();
    let root = doc.root();
    let specs = (0..count)
        .map(|i| NodeSpec::Element { tag: "li".into(), attrs: BTreeMap::from([("n".to_string(), weave_core::node::AttrValue::Number(i as f64))]) })
        .collect();
    doc.mutate().add_children(root, specs, None);
    doc
}

fn bench_add_children(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_children");
    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let doc = Document::new(1).unwrap();
                let root = doc.root();
                let specs = (0..size).map(|_| NodeSpec::Element { tag: "li".into(), attrs: BTreeMap::new() }).collect();
                black_box(doc.mutate().add_children(root, specs, None));
            });
        });
    }
    group.finish();
}

fn bench_index_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_read");
    for size in [10usize, 100, 1000] {
        let doc = build_document_with_children(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &doc, |b, doc| {
            b.iter(|| black_box(doc.index()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add_children, bench_index_read);
criterion_main!(benches);
