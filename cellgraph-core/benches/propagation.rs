//! Write propagation benchmarks
//!
//! Measures the cost of a write reaching its subscribers: wide fan-out to
//! many effects, deep memo chains, and equal-value short-circuits.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cellgraph_core::collections::ReactiveVec;
use cellgraph_core::graph::scheduler::flush;
use cellgraph_core::reactive::{Effect, Memo, Runtime, Signal};

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            Runtime::reset();
            let source = Signal::new(0u64);
            let effects: Vec<Effect> = (0..width)
                .map(|_| {
                    let source = source.clone();
                    Effect::new(move || {
                        black_box(source.get());
                    })
                })
                .collect();

            let mut value = 0;
            b.iter(|| {
                value += 1;
                source.set(value);
                flush().unwrap();
            });

            for effect in effects {
                effect.stop();
            }
        });
    }
    group.finish();
}

fn bench_memo_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("memo_chain");
    for depth in [10usize, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            Runtime::reset();
            let source = Signal::new(0u64);
            let first = {
                let source = source.clone();
                Memo::new(move || source.get() + 1)
            };
            let last = (1..depth).fold(first, |prev, _| Memo::new(move || prev.get() + 1));

            let mut value = 0;
            b.iter(|| {
                value += 1;
                source.set(value);
                black_box(last.get());
            });
        });
    }
    group.finish();
}

fn bench_equal_write(c: &mut Criterion) {
    c.bench_function("equal_write_short_circuit", |b| {
        Runtime::reset();
        let source = Signal::new(1u64);
        let parity = {
            let source = source.clone();
            Memo::new(move || source.get() % 2)
        };
        let effect = Effect::new(move || {
            black_box(parity.get());
        });

        let mut value = 1;
        b.iter(|| {
            // Parity never changes, so the effect is never re-run.
            value += 2;
            source.set(value);
            flush().unwrap();
        });
        effect.stop();
    });
}

fn bench_list_push(c: &mut Criterion) {
    c.bench_function("reactive_vec_push", |b| {
        Runtime::reset();
        let list = ReactiveVec::new(Vec::<u64>::new());
        let reader = list.clone();
        let effect = Effect::new(move || {
            black_box(reader.len());
        });

        let mut value = 0;
        b.iter(|| {
            value += 1;
            list.push(value);
            flush().unwrap();
        });
        effect.stop();
    });
}

criterion_group!(
    propagation_benches,
    bench_fan_out,
    bench_memo_chain,
    bench_equal_write,
    bench_list_push,
);

criterion_main!(propagation_benches);
