//! Dispatch overhead benchmark: typed fast path vs generic boxed path vs
//! the reverse bridge.
//!
//! Run with: cargo bench --bench dispatch_overhead

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use op_dispatch::{KernelFunction, OperatorKernel, Stack};

fn doubling_boxed(_kernel: Option<&dyn OperatorKernel>, stack: &mut Stack) {
    let x = stack.pop().unwrap().take::<i64>();
    stack.push(x.wrapping_mul(2));
}

fn bench_call_paths(c: &mut Criterion) {
    let typed = KernelFunction::from_function(|a: i64, b: i64| a.wrapping_add(b));
    let boxed_only = KernelFunction::from_boxed_function(doubling_boxed);

    c.bench_function("call_unboxed_only/typed", |b| {
        b.iter(|| typed.call_unboxed_only::<i64, (i64, i64)>((black_box(2), black_box(3))))
    });

    c.bench_function("call_unboxed/typed", |b| {
        b.iter(|| typed.call_unboxed::<i64, (i64, i64)>((black_box(2), black_box(3))))
    });

    c.bench_function("call_boxed/typed", |b| {
        b.iter(|| {
            let mut stack = Stack::with_capacity(2);
            stack.push(black_box(2i64));
            stack.push(black_box(3i64));
            typed.call_boxed(&mut stack);
            stack.pop().unwrap().take::<i64>()
        })
    });

    c.bench_function("call_unboxed/bridged", |b| {
        b.iter(|| boxed_only.call_unboxed::<i64, (i64,)>((black_box(21),)))
    });
}

criterion_group!(benches, bench_call_paths);
criterion_main!(benches);
