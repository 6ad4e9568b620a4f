//! Interpreter benchmarks
//!
//! Each benchmark compiles and runs a small program on a fresh VM, so the
//! numbers include compilation. Run with `cargo bench --bench interpreter`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use heta_runtime::{Configuration, InterpretResult, Vm};

fn run(source: &str) {
    let mut vm = Vm::new(Configuration::default());
    let result = vm.interpret("bench", source);
    assert_eq!(result, InterpretResult::Success);
}

fn bench_arithmetic_loop(c: &mut Criterion) {
    let source = "var sum = 0\nvar i = 0\nwhile (i < 10000) {\n  sum = sum + i\n  i = i + 1\n}";
    c.bench_function("arithmetic_loop_10k", |b| b.iter(|| run(black_box(source))));
}

fn bench_fibonacci(c: &mut Criterion) {
    let source = r#"
class Fib {
  static of(n) {
    if (n < 2) return n
    return of(n - 1) + of(n - 2)
  }
}
Fib.of(20)
"#;
    c.bench_function("fibonacci_20", |b| b.iter(|| run(black_box(source))));
}

fn bench_method_calls(c: &mut Criterion) {
    let source = r#"
class Counter {
  construct new() { _n = 0 }
  bump() { _n = _n + 1 }
  n { _n }
}
var counter = Counter.new()
for (i in 1..10000) counter.bump()
"#;
    c.bench_function("method_calls_10k", |b| b.iter(|| run(black_box(source))));
}

fn bench_fiber_switching(c: &mut Criterion) {
    let source = r#"
var fiber = Fiber.new {
  while (true) Fiber.yield(1)
}
for (i in 1..5000) fiber.call()
"#;
    c.bench_function("fiber_switch_5k", |b| b.iter(|| run(black_box(source))));
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    for count in [1_000, 10_000] {
        let source = format!("var list = []\nfor (i in 1..{count}) list.add([i, \"%(i)\"])");
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| run(black_box(source)))
        });
    }
    group.finish();
}

fn bench_gc_stress(c: &mut Criterion) {
    let source = "for (i in 1..500) [i, {i: i}]";
    c.bench_function("gc_stress_500", |b| {
        b.iter(|| {
            let mut vm = Vm::new(Configuration::default().with_gc_stress(true));
            black_box(vm.interpret("bench", black_box(source)))
        })
    });
}

criterion_group!(
    benches,
    bench_arithmetic_loop,
    bench_fibonacci,
    bench_method_calls,
    bench_fiber_switching,
    bench_allocation,
    bench_gc_stress
);
criterion_main!(benches);
