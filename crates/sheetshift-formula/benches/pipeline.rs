//! Tokenizer and full-pipeline benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetshift_core::{CellAddress, TableSet};
use sheetshift_formula::{run_pipeline, tokenize, ResolveContext, RuleSet};

const SIMPLE: &str = "SUM(A1:A10)";
const NESTED: &str = "IF(ISERROR(VLOOKUP($A2,Data!$A:$F,3,FALSE)),\"\",ROUND(VLOOKUP($A2,Data!$A:$F,3,FALSE)*1.19,2))";
const REWRITE: &str = "INDIRECT(ADDRESS(ROW(),COLUMN()+1,1,1,\"Sheet1\"))";

/// `SUM(A1,SUM(A2,...))` nested `depth` times
fn nested_sum(depth: usize) -> String {
    let mut formula = String::from("1");
    for i in 0..depth {
        formula = format!("SUM(A{},{formula})", i + 1);
    }
    formula
}

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize/simple", |b| b.iter(|| tokenize(black_box(SIMPLE))));
    c.bench_function("tokenize/nested", |b| b.iter(|| tokenize(black_box(NESTED))));
}

fn bench_pipeline(c: &mut Criterion) {
    let rules = RuleSet::builtin().expect("builtin rules");
    let pair = rules.locale_pair("en-US", "de-DE").expect("builtin locales");
    let tables = TableSet::default();
    let ctx = ResolveContext::new("Sheet1", CellAddress::new(0, 0));

    for (name, formula) in [("simple", SIMPLE), ("nested", NESTED), ("rewrite", REWRITE)] {
        c.bench_function(&format!("pipeline/{name}"), |b| {
            b.iter(|| run_pipeline(black_box(formula), &pair, &rules, &tables, &ctx))
        });
    }

    let mut group = c.benchmark_group("pipeline/depth");
    for depth in [4, 16, 64] {
        let formula = nested_sum(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &formula, |b, f| {
            b.iter(|| run_pipeline(black_box(f), &pair, &rules, &tables, &ctx))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_pipeline);
criterion_main!(benches);
