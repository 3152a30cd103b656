// Table benchmarks
//
// Section 1: append (value rows, pre-encoded batches, row writer)
// Section 2: reads (contiguous rows, strided rows, strided column)

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rtab_core::{
    ColumnSpec, ColumnType, MemoryStore, RecordArray, Schema, Selection, SledStore, Table,
    TableOptions, Value,
};
use std::sync::Arc;

const ROWS: usize = 10_000;

fn schema() -> Schema {
    Schema::from_column_spec(vec![
        ("id", ColumnSpec::new(ColumnType::Int64)),
        ("x", ColumnSpec::new(ColumnType::Float64)),
        ("v", ColumnSpec::new(ColumnType::Float32).with_shape([4])),
        ("tag", ColumnSpec::bytes(8)),
    ])
    .unwrap()
}

fn rows(n: usize) -> Vec<Vec<Value>> {
    (0..n)
        .map(|i| {
            vec![
                Value::Int64(i as i64),
                Value::Float64(i as f64 * 0.1),
                Value::Float32(1.0),
                Value::from("bench"),
            ]
        })
        .collect()
}

fn filled() -> Table {
    let mut table = Table::create(
        Arc::new(MemoryStore::new()),
        "bench",
        schema(),
        TableOptions::new().with_expected_rows(ROWS as u64),
    )
    .unwrap();
    table.append(&rows(ROWS)).unwrap();
    table
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: append
// ═══════════════════════════════════════════════════════════════════════════

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Elements(ROWS as u64));
    let values = rows(ROWS);
    let batch = RecordArray::from_rows(Arc::clone(schema().row_format()), &values).unwrap();

    group.bench_function("memory_value_rows", |b| {
        b.iter(|| {
            let mut table =
                Table::create(Arc::new(MemoryStore::new()), "t", schema(), TableOptions::new())
                    .unwrap();
            table.append(black_box(&values)).unwrap();
        })
    });

    group.bench_function("memory_record_batch", |b| {
        b.iter(|| {
            let mut table =
                Table::create(Arc::new(MemoryStore::new()), "t", schema(), TableOptions::new())
                    .unwrap();
            table.append_records(black_box(&batch)).unwrap();
        })
    });

    group.bench_function("memory_row_writer", |b| {
        b.iter(|| {
            let mut table =
                Table::create(Arc::new(MemoryStore::new()), "t", schema(), TableOptions::new())
                    .unwrap();
            let mut writer = table.row_writer().unwrap();
            for i in 0..ROWS as i64 {
                writer.set("id", i).unwrap().append().unwrap();
            }
            table.flush().unwrap();
        })
    });

    group.bench_function("sled_record_batch", |b| {
        b.iter(|| {
            let store = Arc::new(SledStore::open_temporary().unwrap());
            let mut table = Table::create(store, "t", schema(), TableOptions::new()).unwrap();
            table.append_records(black_box(&batch)).unwrap();
            table.flush().unwrap();
        })
    });

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: reads
// ═══════════════════════════════════════════════════════════════════════════

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let table = filled();

    group.bench_function("contiguous_rows", |b| {
        b.iter(|| table.read_records(black_box(Selection::all())).unwrap())
    });

    for step in [2i64, 7, 64] {
        let selection = Selection::from_start(0).with_step(step);
        group.bench_with_input(BenchmarkId::new("strided_rows", step), &selection, |b, sel| {
            b.iter(|| table.read_records(*sel).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("strided_column", step), &selection, |b, sel| {
            b.iter(|| table.read_column(*sel, "x").unwrap())
        });
    }

    group.bench_function("iterate_all", |b| {
        b.iter(|| {
            table
                .iterate(Selection::all())
                .unwrap()
                .map(|r| r.unwrap().nrow())
                .sum::<u64>()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_read);
criterion_main!(benches);
