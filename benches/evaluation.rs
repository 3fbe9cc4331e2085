//! Benchmarks for network evaluation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use procflow::network::{InvalidationLevel, ProcessorId, ProcessorNetwork};
use procflow::processors::{Collector, Scale, Sum, ValueSource};

/// source → scale × `length` → collector
fn chain(length: usize) -> (ProcessorNetwork, ProcessorId) {
    let mut network = ProcessorNetwork::new();
    let source = {
        let mut batch = network.batch();
        let source = batch.add_processor(ValueSource::new(1.0)).unwrap();
        let mut previous = source;
        for _ in 0..length {
            let next = batch.add_processor(Scale::new(1.0001)).unwrap();
            batch.add_connection(previous.outport(0), next.inport(0)).unwrap();
            previous = next;
        }
        let sink = batch.add_processor(Collector::new()).unwrap();
        batch.add_connection(previous.outport(0), sink.inport(0)).unwrap();
        source
    };
    (network, source)
}

/// One source fanned out to `width` scales, summed back together
fn diamond(width: usize) -> (ProcessorNetwork, ProcessorId) {
    let mut network = ProcessorNetwork::new();
    let source = {
        let mut batch = network.batch();
        let source = batch.add_processor(ValueSource::new(1.0)).unwrap();
        let sum = batch.add_processor(Sum::new()).unwrap();
        for i in 0..width {
            let branch = batch.add_processor(Scale::new(i as f64)).unwrap();
            batch.add_connection(source.outport(0), branch.inport(0)).unwrap();
            batch.add_connection(branch.outport(0), sum.inport(0)).unwrap();
        }
        let sink = batch.add_processor(Collector::new()).unwrap();
        batch.add_connection(sum.outport(0), sink.inport(0)).unwrap();
        source
    };
    (network, source)
}

fn bench_invalidate_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidate_chain");

    for length in [10, 100, 1000] {
        let (mut network, source) = chain(length);
        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, _| {
            b.iter(|| {
                network
                    .invalidate(black_box(source), InvalidationLevel::InvalidOutput)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn bench_invalidate_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidate_diamond");

    for width in [10, 100, 500] {
        let (mut network, source) = diamond(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                network
                    .invalidate(black_box(source), InvalidationLevel::InvalidOutput)
                    .unwrap();
            })
        });
    }

    group.finish();
}

fn bench_idle_pass(c: &mut Criterion) {
    let (mut network, _) = chain(1000);

    c.bench_function("idle_pass_1000", |b| {
        b.iter(|| black_box(network.evaluate().unwrap()))
    });
}

fn bench_build_network(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_network");

    for length in [10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(length), &length, |b, &length| {
            b.iter(|| black_box(chain(length)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_invalidate_chain,
    bench_invalidate_diamond,
    bench_idle_pass,
    bench_build_network,
);
criterion_main!(benches);
