//! Normalizer micro-benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use breakwater::drift::{Comparator, Normalizer};

fn sample_source(functions: usize) -> String {
    let mut out = String::from("use std::fmt;\nuse std::collections::HashMap;\n\n");
    for i in 0..functions {
        out.push_str(&format!(
            "/* generated */\nfn handler_{i}(input: &str) -> String {{\n    // trim and echo\n    let trimmed  =  input.trim();\n    format!(\"{{trimmed}}-{i}\")\n}}\n\n"
        ));
    }
    out
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let small = sample_source(5);
    let large = sample_source(200);

    c.bench_function("normalize_small", |b| {
        b.iter(|| normalizer.normalize(black_box(&small)));
    });
    c.bench_function("normalize_large", |b| {
        b.iter(|| normalizer.normalize(black_box(&large)));
    });
}

fn bench_compare(c: &mut Criterion) {
    let comparator = Comparator::default();
    let left = sample_source(50);
    let right = {
        let mut r = sample_source(50);
        r.push_str("fn extra() {}\n");
        r
    };

    c.bench_function("compare_divergent", |b| {
        b.iter(|| comparator.compare(black_box(&left), black_box(&right)));
    });
}

criterion_group!(benches, bench_normalize, bench_compare);
criterion_main!(benches);
