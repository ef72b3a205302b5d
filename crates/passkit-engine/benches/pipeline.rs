use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use passkit_engine::ir::parse_module;
use passkit_engine::PassManager;

/// `n` chained adds: each one consumes the previous result
fn add_chain(n: usize) -> String {
    let mut src = String::from("define i64 @chain(i64 %a, i64 %b) {\nentry:\n  %x0 = add i64 %a, %b\n");
    for i in 1..n {
        src.push_str(&format!("  %x{} = add i64 %x{}, %b\n", i, i - 1));
    }
    src.push_str(&format!("  ret i64 %x{}\n}}\n", n - 1));
    src
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for n in [16, 256, 4096] {
        let source = add_chain(n);
        group.bench_with_input(BenchmarkId::new("add_chain", n), &source, |b, source| {
            b.iter(|| parse_module("bench", black_box(source)).unwrap());
        });
    }
    group.finish();
}

fn bench_add2sub(c: &mut Criterion) {
    let mut group = c.benchmark_group("add2sub");
    for n in [16, 256, 4096] {
        let module = parse_module("bench", &add_chain(n)).unwrap();
        let pm = PassManager::default_pipeline();
        group.bench_with_input(BenchmarkId::new("add_chain", n), &module, |b, module| {
            b.iter(|| {
                let mut m = module.clone();
                pm.run(black_box(&mut m))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_add2sub);
criterion_main!(benches);
