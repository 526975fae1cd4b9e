// Criterion benchmarks over the concrete scenarios in this crate's design
// notes: cold-start interpretation and warm throughput of repeated small
// evaluations against one pre-warmed runtime.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use ylisp::{NativeKind, Runtime, RuntimeConfig, YlError};

const SNIPPET_ARITHMETIC: &str = "(add 1 2 3)";
const SNIPPET_QUOTING: &str = "'(a b c)";
const SNIPPET_LAMBDA: &str = "((lambda (x y) (add x y)) 10 20)";
const SNIPPET_MACRO: &str = "(mset 'twice (mlambda (e) (add e e))) (twice 5)";
const SNIPPET_SHADOWING: &str = "(set 'x 1) ((lambda (x) x) 2)";

fn demo_runtime() -> Runtime {
    let runtime = Runtime::init(RuntimeConfig::default()).expect("runtime init");
    runtime
        .register_native(1, "add", 0, None, NativeKind::Ordinary, "sums its arguments", Box::new(|ctx| {
            let mut total = 0.0;
            for &a in ctx.args {
                match ctx.pool.get(a) {
                    ylisp::Cell::Double(d) => total += d,
                    _ => return Err(YlError::func_invalid_param("expected a number")),
                }
            }
            ctx.pool.alloc_double(total)
        }))
        .expect("register add");
    runtime
}

fn cold_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_start");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(200));
    group.measurement_time(Duration::from_secs(5));

    for (name, snippet) in [
        ("arithmetic", SNIPPET_ARITHMETIC),
        ("lambda", SNIPPET_LAMBDA),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let runtime = demo_runtime();
                black_box(runtime.interpret(snippet).expect("interpret"))
            })
        });
    }
    group.finish();
}

fn warm_throughput(c: &mut Criterion) {
    use criterion::Throughput;

    let runtime = demo_runtime();

    let mut group = c.benchmark_group("warm_throughput");
    group.sample_size(50);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    for (name, snippet) in [
        ("arithmetic", SNIPPET_ARITHMETIC),
        ("quoting", SNIPPET_QUOTING),
        ("lambda", SNIPPET_LAMBDA),
        ("macro_redefinition", SNIPPET_MACRO),
        ("lexical_shadowing", SNIPPET_SHADOWING),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(runtime.interpret(black_box(snippet)).expect("interpret")))
        });
    }
    group.finish();
}

criterion_group!(benches_cold_start, cold_start);
criterion_group!(benches_warm_throughput, warm_throughput);
criterion_main!(benches_cold_start, benches_warm_throughput);
