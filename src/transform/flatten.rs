//! Flatten transformer: for each input row of `c` columns, emits `c`
//! output rows of the form `[row_id?, column_name?, value]`, where the
//! optional leading fields are present exactly when the corresponding
//! `FlattenSpec` field was supplied (spec §4.9).

use crate::column::{Column, OrderedColumnSet};
use crate::dataset::{Dataset, DatasetRef, FlattenSpec};
use crate::error::Fallible;
use crate::job::Job;
use crate::raster::Raster;
use crate::row::Row;
use crate::stream::{InMemoryStream, Stream};
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

pub struct FlattenDataset {
    base: DatasetRef,
    spec: FlattenSpec,
}

impl FlattenDataset {
    pub fn new(base: DatasetRef, spec: FlattenSpec) -> DatasetRef {
        Arc::new(FlattenDataset { base, spec })
    }

    fn result_columns(&self) -> OrderedColumnSet {
        let mut cols = OrderedColumnSet::new();
        if self.spec.row_identifier.is_some() {
            cols.try_push(Column::new("row_id"));
        }
        if self.spec.column_name_column.is_some() {
            cols.try_push(Column::new("column"));
        }
        cols.try_push(self.spec.value_column.clone());
        cols
    }
}

impl Dataset for FlattenDataset {
    fn columns(&self, _job: &Job) -> Fallible<OrderedColumnSet> {
        Ok(self.result_columns())
    }

    fn to_stream(&self) -> Arc<dyn Stream> {
        let job = Job::new();
        let raster = self.to_raster(&job).unwrap_or_else(|_| Raster::new(OrderedColumnSet::new(), vec![]));
        Arc::new(InMemoryStream::new(raster.columns(), raster.rows()))
    }

    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        let source_columns = self.base.columns(job)?;
        let source_rows = crate::stream::drain_sequential(&*self.base.to_stream(), job)?;
        let result_columns = self.result_columns();

        let mut out = Vec::new();
        for row in &source_rows {
            let row_id = self.spec.row_identifier.as_ref().map(|e| e.prepare().apply(row, None, None));
            for col in source_columns.iter() {
                let mut values = Vec::with_capacity(3);
                if let Some(id) = &row_id {
                    values.push(id.clone());
                }
                if self.spec.column_name_column.is_some() {
                    values.push(Value::String(col.name().to_string()));
                }
                values.push(row.get(col));
                out.push(Row::new(values, result_columns.clone()));
            }
        }
        Ok(Raster::new(result_columns, out))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RasterDataset;
    use crate::expr::Expression;

    #[test]
    fn emits_one_row_per_source_column() {
        let cols = OrderedColumnSet::from_names(["a", "b", "c"]);
        let rows = vec![Row::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)], cols.clone())];
        let ds = RasterDataset::new(Raster::new(cols, rows));
        let spec = FlattenSpec {
            value_column: Column::new("value"),
            column_name_column: Some(Column::new("column")),
            row_identifier: Some(Expression::literal(0i64)),
        };
        let flattened = FlattenDataset::new(ds, spec);
        let job = Job::new();
        let raster = flattened.to_raster(&job).unwrap();
        assert_eq!(raster.row_count(), 3);
        assert_eq!(raster.columns().len(), 3);
    }
}
