//! Table copy — rows, metadata and user attributes into a new table.

use crate::error::{RtabError, RtabResult};
use crate::range::{ResolvedRange, Selection};
use crate::schema::ColumnType;
use crate::storage::RecordStore;
use crate::table::Table;
use crate::table::crud::conform_records;
use crate::table::types::{CopyOptions, TableOptions};
use std::sync::Arc;
use tracing::{info, instrument, warn};

impl Table {
    /// Copy the selected rows into a new table `dest_name` in `dest_store`.
    ///
    /// Rows move in batches of at most `rows_per_batch`. With a destination schema,
    /// columns are matched by name: columns the source lacks take their default and
    /// values are converted to the destination type (`SchemaMismatch` if impossible).
    /// With `order_by`, rows are written in ascending, stable order of that column.
    ///
    /// The copy is not atomic: on error the partially filled destination is left in
    /// the store.
    #[instrument(skip(self, dest_store, dest_name, options), fields(source = %self.name, dest = %dest_name.as_ref()))]
    pub fn copy(
        &self,
        dest_store: Arc<dyn RecordStore>,
        dest_name: impl AsRef<str>,
        options: CopyOptions,
    ) -> RtabResult<Table> {
        let handle = self.live_handle()?;
        let range = options.selection.resolve_for_read(self.nrows)?;
        let order = match options.order_by.as_deref() {
            Some(column) => Some(self.sort_coordinates(column, range)?),
            None => None,
        };

        let dest_schema = match options.schema {
            Some(schema) => schema,
            None => self.schema()?.clone(),
        };
        let dest_options = TableOptions {
            title: options.title.unwrap_or_else(|| self.options.title.clone()),
            filters: options.filters.unwrap_or(self.options.filters),
            expected_rows: range.len().max(1),
            ..self.options.clone()
        };
        let mut dest = Table::create(dest_store, dest_name.as_ref(), dest_schema, dest_options)?;
        let batch = self.buffer_spec.rows_per_batch.max(1);

        match order {
            Some(coords) => {
                for chunk in coords.chunks(batch) {
                    let records = conform_records(&self.records_at(handle, chunk)?, dest.schema()?, true)?;
                    dest.append_records(&records)?;
                }
            }
            None => {
                let span = batch as u64 * range.step;
                let mut start = range.start;
                while start < range.stop {
                    let stop = start.saturating_add(span).min(range.stop);
                    let records = self.read_records(Selection::new(
                        Some(start as i64),
                        Some(stop as i64),
                        Some(range.step as i64),
                    ))?;
                    let records = conform_records(&records, dest.schema()?, true)?;
                    dest.append_records(&records)?;
                    start = stop;
                }
            }
        }

        if options.copy_user_attrs {
            for (name, value) in self.attrs()? {
                dest.set_attr(&name, value)?;
            }
        }
        dest.flush()?;
        info!(rows = dest.nrows(), sorted = options.order_by.is_some(), "copied table");
        Ok(dest)
    }

    /// Source row numbers of `range` in ascending, stable order of `column`.
    fn sort_coordinates(&self, column: &str, range: ResolvedRange) -> RtabResult<Vec<u64>> {
        let schema = self.schema()?;
        let spec = schema
            .column(column)
            .ok_or_else(|| RtabError::unknown_column(column, &self.name))?;
        if !spec.is_scalar() {
            return Err(RtabError::UnsupportedSort {
                column: column.to_string(),
                reason: "multidimensional columns cannot be sorted".to_string(),
            });
        }
        if !spec.dtype.is_orderable() {
            return Err(RtabError::UnsupportedSort {
                column: column.to_string(),
                reason: format!("{} columns cannot be sorted", spec.dtype.type_name()),
            });
        }

        let n = range.len();
        if n > self.options.sort_warn_rows {
            warn!(
                table = %self.name,
                rows = n,
                threshold = self.options.sort_warn_rows,
                "sorted copy loads the whole key column into memory"
            );
        }
        if let Some(limit) = self.options.sort_row_limit
            && n > limit
        {
            return Err(RtabError::InvalidOperation {
                message: format!("sorted copy of {n} rows exceeds the limit of {limit}"),
                context: "Table::copy".to_string(),
            });
        }

        let selection = Selection::new(
            Some(range.start as i64),
            Some(range.stop as i64),
            Some(range.step as i64),
        );
        let keys = self.read_column(selection, column)?.values();
        let mut order: Vec<usize> = (0..keys.len()).collect();
        match spec.dtype {
            ColumnType::Float32 | ColumnType::Float64 => {
                // Every NaN, whatever its sign bit, sorts after +inf.
                let keys: Vec<f64> = keys
                    .iter()
                    .map(|v| v.as_f64().filter(|x| !x.is_nan()).unwrap_or(f64::NAN))
                    .collect();
                order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));
            }
            _ => {
                let keys: Vec<i128> = keys
                    .iter()
                    .map(|v| v.as_i128().unwrap_or_default())
                    .collect();
                order.sort_by_key(|&i| keys[i]);
            }
        }
        Ok(order
            .into_iter()
            .map(|i| range.start + i as u64 * range.step)
            .collect())
    }
}
