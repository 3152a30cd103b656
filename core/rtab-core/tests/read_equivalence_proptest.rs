// Property tests: column reads agree with whole-row reads
//
// For any table size, batch size and selection, reading one field directly must
// give the same values as reading whole rows and projecting the field. Removal
// must shrink the table by exactly the clipped range length.

use proptest::prelude::*;
use rtab_core::range::resolve_for_read;
use rtab_core::{
    ColumnSpec, ColumnType, MemoryStore, RtabResult, Schema, Selection, Table, TableOptions, Value,
};
use std::sync::Arc;

fn build(n: usize, rows_per_batch: usize) -> RtabResult<Table> {
    let schema = Schema::from_column_spec(vec![
        ("a", ColumnSpec::new(ColumnType::Int16)),
        ("b", ColumnSpec::new(ColumnType::Float64).with_shape([3])),
        ("c", ColumnSpec::bytes(3)),
    ])?;
    let opts = TableOptions::new().with_rows_per_batch(rows_per_batch);
    let mut table = Table::create(Arc::new(MemoryStore::new()), "p", schema, opts)?;
    let rows: Vec<Vec<Value>> = (0..n)
        .map(|i| {
            vec![
                Value::Int16(i as i16),
                Value::from(vec![i as f64, -(i as f64), 0.5]),
                Value::from(format!("{:03}", i % 1000).as_str()),
            ]
        })
        .collect();
    table.append(&rows)?;
    Ok(table)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_column_matches_projected_rows(
        n in 0usize..60,
        rows_per_batch in 1usize..9,
        start in -70i64..70,
        stop in proptest::option::of(-70i64..70),
        step in 1i64..7,
        field in prop::sample::select(vec!["a", "b", "c"]),
    ) {
        let table = build(n, rows_per_batch).unwrap();
        let selection = Selection::new(Some(start), stop, Some(step));
        let column = table.read_column(selection, field).unwrap();
        let rows = table.read_records(selection).unwrap();
        let projected: Vec<Value> = (0..rows.len()).map(|i| rows.get(i, field).unwrap()).collect();
        prop_assert_eq!(column.values(), projected);

        let expected = resolve_for_read(n as u64, Some(start), stop, Some(step)).unwrap().len();
        prop_assert_eq!(column.len() as u64, expected);

        let iterated: Vec<u64> = table
            .iterate(selection)
            .unwrap()
            .map(|r| r.unwrap().nrow())
            .collect();
        let resolved: Vec<u64> = resolve_for_read(n as u64, Some(start), stop, Some(step))
            .unwrap()
            .iter()
            .collect();
        prop_assert_eq!(iterated, resolved);
    }

    #[test]
    fn prop_remove_shrinks_by_clipped_length(
        n in 0usize..40,
        start in 0i64..50,
        len in 0i64..20,
    ) {
        let mut table = build(n, 4).unwrap();
        let before = table.read_records(Selection::all()).unwrap().to_rows();
        let removed = table.remove_rows(start, Some(start + len)).unwrap();
        let lo = (start as usize).min(n);
        let hi = ((start + len) as usize).min(n).max(lo);
        prop_assert_eq!(removed as usize, hi - lo);
        prop_assert_eq!(table.nrows() as usize, n - (hi - lo));

        let mut expected = before;
        expected.drain(lo..hi);
        prop_assert_eq!(table.read_records(Selection::all()).unwrap().to_rows(), expected);
    }
}
