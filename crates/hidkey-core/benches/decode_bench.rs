//! Criterion benchmarks for the boot-keyboard report decoder.
//!
//! `decode` runs once per input report on the thread that delivers it, so it
//! sits directly on the keystroke path.
//!
//! Run with:
//! ```bash
//! cargo bench --package hidkey-core --bench decode_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hidkey_core::keymap::usage_to_char;
use hidkey_core::{decode, ModifierFlags};

// ── Report fixtures ───────────────────────────────────────────────────────────

fn release_report() -> Vec<u8> {
    vec![0x00; 8]
}

fn single_key_report() -> Vec<u8> {
    vec![0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]
}

fn full_rollover_report() -> Vec<u8> {
    vec![0x11, 0x00, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09]
}

fn vendor_short_report() -> Vec<u8> {
    vec![0x01, 0x02, 0x03]
}

fn oversized_report() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x04, 0x00, 0x2C, 0x00, 0x00, 0x00];
    bytes.resize(64, 0xAA);
    bytes
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_decode(c: &mut Criterion) {
    let reports = [
        ("release", release_report()),
        ("single_key", single_key_report()),
        ("full_rollover", full_rollover_report()),
        ("vendor_short", vendor_short_report()),
        ("oversized_64", oversized_report()),
    ];

    let mut group = c.benchmark_group("decode");
    for (name, bytes) in &reports {
        group.bench_with_input(BenchmarkId::new("report", name), bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes)))
        });
    }
    group.finish();
}

/// Decode followed by character translation, as the text accumulator does.
fn bench_decode_to_text(c: &mut Criterion) {
    let bytes = full_rollover_report();
    c.bench_function("decode_to_text", |b| {
        b.iter(|| {
            let decoded = decode(black_box(&bytes));
            let modifiers = decoded.modifiers().unwrap_or(ModifierFlags::default());
            decoded
                .key_codes()
                .iter()
                .filter_map(|&code| usage_to_char(code, modifiers))
                .count()
        })
    });
}

criterion_group!(benches, bench_decode, bench_decode_to_text);
criterion_main!(benches);
