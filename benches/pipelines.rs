use std::hint::black_box;

use cell_sift::processing::radial::band_counts;
use cell_sift::processing::{Band, RadialOptions};
use cell_sift::types::{Cell, CellId, Schema};
use cell_sift::wire::{WireReader, WireWriter};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn slide(n: u32) -> Vec<Cell> {
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    (0..n)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let x = (state % 20_000) as f32 / 10.0;
            let y = ((state >> 24) % 20_000) as f32 / 10.0;
            let mut c = Cell::new(CellId::pack(0, i), x, y, vec![1.0; 16]);
            c.pflag = (state >> 48) & 0b11;
            c
        })
        .collect()
}

fn bench_radial(c: &mut Criterion) {
    let cells = slide(20_000);
    let bands = vec![
        Band::new(0.0, 20.0, 0, 0, "near"),
        Band::new(20.0, 50.0, 0b1, 0, "ring"),
    ];
    let mut group = c.benchmark_group("radial_band_counts");
    for threads in [1usize, 4] {
        let options = RadialOptions {
            num_threads: Some(threads),
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(threads), &options, |b, opts| {
            b.iter(|| band_counts(black_box(&cells), &bands, opts).unwrap())
        });
    }
    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let cells = slide(50_000);
    let schema = Schema::with_features((0..16).map(|i| format!("m{i}")));

    c.bench_function("wire_encode_50k", |b| {
        b.iter(|| {
            let mut w = WireWriter::new(Vec::with_capacity(8 << 20));
            w.write_schema(&schema).unwrap();
            for cell in &cells {
                w.write_cell(cell).unwrap();
            }
            w.into_inner().unwrap()
        })
    });

    let mut w = WireWriter::new(Vec::new());
    w.write_schema(&schema).unwrap();
    for cell in &cells {
        w.write_cell(cell).unwrap();
    }
    let bytes = w.into_inner().unwrap();
    c.bench_function("wire_decode_50k", |b| {
        b.iter(|| {
            let mut r = WireReader::new(black_box(bytes.as_slice()));
            r.read_schema().unwrap();
            r.cells().count()
        })
    });
}

criterion_group!(benches, bench_radial, bench_wire);
criterion_main!(benches);
