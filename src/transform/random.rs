//! Random transformer (reservoir sampling): maintains a reservoir of
//! size `n`; for each input item, replaces a uniform-random reservoir
//! slot with probability `n/seen`; emits the reservoir once the source
//! is exhausted (spec §4.9, S7).
//!
//! `random`/`join`/`aggregate`/`pivot`/`flatten`/`union` never
//! participate in the coalesced optimizer (spec §4.7) — `RandomDataset`
//! always materializes its base eagerly via `to_raster`.

use crate::column::OrderedColumnSet;
use crate::dataset::{Dataset, DatasetRef};
use crate::error::Fallible;
use crate::job::Job;
use crate::raster::Raster;
use crate::row::Row;
use crate::stream::{InMemoryStream, Stream};
use parking_lot::Mutex;
use rand::Rng;
use std::any::Any;
use std::sync::Arc;

pub struct RandomDataset {
    base: DatasetRef,
    n: usize,
}

impl RandomDataset {
    pub fn new(base: DatasetRef, n: usize) -> DatasetRef {
        Arc::new(RandomDataset { base, n })
    }
}

impl Dataset for RandomDataset {
    fn columns(&self, job: &Job) -> Fallible<OrderedColumnSet> {
        self.base.columns(job)
    }

    fn to_stream(&self) -> Arc<dyn Stream> {
        let job = Job::new();
        let raster = self.to_raster(&job).unwrap_or_else(|_| Raster::new(OrderedColumnSet::new(), vec![]));
        Arc::new(InMemoryStream::new(raster.columns(), raster.rows()))
    }

    fn to_raster(&self, job: &Job) -> Fallible<Raster> {
        let columns = self.base.columns(job)?;
        let rows = crate::stream::drain_sequential(&*self.base.to_stream(), job)?;
        let sampled = reservoir_sample(rows, self.n);
        Ok(Raster::new(columns, sampled))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn reservoir_sample(rows: Vec<Row>, n: usize) -> Vec<Row> {
    if n == 0 {
        return Vec::new();
    }
    let reservoir: Mutex<Vec<Row>> = Mutex::new(Vec::with_capacity(n));
    let mut rng = rand::thread_rng();
    for (seen, row) in rows.into_iter().enumerate() {
        let mut r = reservoir.lock();
        if r.len() < n {
            r.push(row);
        } else {
            let j = rng.gen_range(0..=seen);
            if j < n {
                r[j] = row;
            }
        }
    }
    reservoir.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RasterDataset;
    use crate::value::Value;

    #[test]
    fn reservoir_of_size_n_over_many_rows_yields_exactly_n() {
        let cols = OrderedColumnSet::from_names(["a"]);
        let rows: Vec<Row> = (0..1000).map(|i| Row::new(vec![Value::Int(i)], cols.clone())).collect();
        let ds = RasterDataset::new(Raster::new(cols, rows));
        let sampled = RandomDataset::new(ds, 5);
        let job = Job::new();
        assert_eq!(sampled.to_raster(&job).unwrap().row_count(), 5);
    }

    #[test]
    fn reservoir_larger_than_input_returns_whole_input() {
        let cols = OrderedColumnSet::from_names(["a"]);
        let rows: Vec<Row> = (0..3).map(|i| Row::new(vec![Value::Int(i)], cols.clone())).collect();
        let ds = RasterDataset::new(Raster::new(cols, rows));
        let sampled = RandomDataset::new(ds, 10);
        let job = Job::new();
        assert_eq!(sampled.to_raster(&job).unwrap().row_count(), 3);
    }
}
