//! Criterion benchmarks for key tables and sequence planning.
//!
//! Scan-code naming runs on the capture thread for every stroke that a
//! listener inspects, so it must stay a table lookup.  Sequence planning runs
//! once per triggered `send_keys` action.
//!
//! Run with:
//! ```bash
//! cargo bench --package keyhook-core --bench sequence_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keyhook_core::keymap::{key_name, lookup};
use keyhook_core::parse_sequence;

// ── Inputs ────────────────────────────────────────────────────────────────────

const BENCH_SCAN_CODES: &[(u16, bool)] = &[
    (0x1E, false), // A
    (0x3B, false), // F1
    (0x1C, false), // Enter
    (0x1C, true),  // NumPadEnter
    (0x53, true),  // Delete
    (0x1D, true),  // RightCtrl
    (0x7F, false), // unnamed
];

const BENCH_SEQUENCES: &[&str] = &["Delete", "Ctrl+Shift+F1", "LCtrl+LAlt+RShift+F24", "Hello world"];

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_key_name(c: &mut Criterion) {
    c.bench_function("key_name_all", |b| {
        b.iter(|| {
            for &(code, extended) in BENCH_SCAN_CODES {
                black_box(key_name(black_box(code), black_box(extended)));
            }
        })
    });
}

fn bench_symbol_lookup(c: &mut Criterion) {
    c.bench_function("symbol_lookup", |b| {
        b.iter(|| {
            for name in ["ctrl", "PageDown", "F13", "NumPadEnter", "unknown"] {
                black_box(lookup(black_box(name)));
            }
        })
    });
}

fn bench_parse_and_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_and_plan");
    for input in BENCH_SEQUENCES {
        group.bench_with_input(BenchmarkId::from_parameter(input), input, |b, input| {
            b.iter(|| black_box(parse_sequence(black_box(input)).plan()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_key_name, bench_symbol_lookup, bench_parse_and_plan);
criterion_main!(benches);
