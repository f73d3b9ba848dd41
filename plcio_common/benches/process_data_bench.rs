//! Typed process memory access benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use plcio_common::process::{ProcessAddress, ProcessArea, ProcessData};
use std::hint::black_box;

fn bench_typed_access(c: &mut Criterion) {
    let mut data = ProcessData::new();
    let word = ProcessAddress::at_byte(ProcessArea::Memory, 10);
    let real = ProcessAddress::at_byte(ProcessArea::Output, 100);

    c.bench_function("process_set_get_word", |b| {
        b.iter(|| {
            data.set_word(black_box(word), black_box(0xBEEF)).unwrap();
            black_box(data.get_word(word).unwrap());
        });
    });

    c.bench_function("process_set_get_real", |b| {
        b.iter(|| {
            data.set_real(black_box(real), black_box(1.25)).unwrap();
            black_box(data.get_real(real).unwrap());
        });
    });
}

fn bench_bits(c: &mut Criterion) {
    let mut data = ProcessData::new();
    let addrs: Vec<ProcessAddress> = (0..64)
        .map(|i| ProcessAddress::new(ProcessArea::Memory, i / 8, (i % 8) as u8))
        .collect();

    c.bench_function("process_invert_bit", |b| {
        b.iter(|| data.invert_bit(black_box(addrs[13])).unwrap());
    });

    c.bench_function("process_set_bits_64", |b| {
        b.iter(|| data.set_bits(black_box(&addrs)).unwrap());
    });

    c.bench_function("process_get_bits_64", |b| {
        b.iter(|| black_box(data.get_bits(&addrs).unwrap()));
    });
}

fn bench_copy_area(c: &mut Criterion) {
    let src = ProcessData::new();
    let mut dst = ProcessData::new();

    c.bench_function("process_copy_area", |b| {
        b.iter(|| dst.copy_area_from(black_box(&src), ProcessArea::Input));
    });
}

criterion_group!(benches, bench_typed_access, bench_bits, bench_copy_area);
criterion_main!(benches);
