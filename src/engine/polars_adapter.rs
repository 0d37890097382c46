use polars::prelude as pl;
use polars::prelude::{IntoLazy, NamedFrom};

use crate::dataset::{Column, Dataset};
use crate::keysum::Key;

use super::{GroupByEngine, GroupQuery, GroupRow, Reduction, Result};

/// Lazy polars group-by over a frame built once per dataset.
#[derive(Default)]
pub struct PolarsEngine {
    df: Option<pl::DataFrame>,
}

fn agg_expr(r: &Reduction) -> pl::Expr {
    let e = match r {
        Reduction::Sum(c) => pl::col(c.name()).sum(),
        Reduction::Min(c) => pl::col(c.name()).min(),
        Reduction::Max(c) => pl::col(c.name()).max(),
        Reduction::Count => pl::len(),
    };
    e.cast(pl::DataType::Int64).alias(r.alias())
}

fn row_at(df: &pl::DataFrame, idx: usize, nkeys: usize) -> Result<GroupRow> {
    let cells = match df.get(idx) {
        Some(cells) => cells,
        None => Err(format!("polars result has no row {}", idx))?,
    };
    let mut vals = Vec::with_capacity(cells.len());
    for (i, av) in cells.iter().enumerate() {
        match av.extract::<i64>() {
            Some(v) => vals.push(v),
            None => Err(format!("polars result column {} is not an integer: {:?}", i, av))?,
        }
    }
    let values = vals.split_off(nkeys.min(vals.len()));
    Ok(GroupRow::new(vals.into_iter().collect::<Key>(), values))
}

impl PolarsEngine {
    fn frame(&self) -> Result<pl::DataFrame> {
        match &self.df {
            Some(df) => Ok(df.clone()),
            None => Err("polars engine used before load")?,
        }
    }

    fn grouped(&self, query: &GroupQuery, limit: Option<u32>) -> Result<pl::DataFrame> {
        let keys: Vec<pl::Expr> = query.keys.iter().map(|c| pl::col(c.name())).collect();
        let aggs: Vec<pl::Expr> = query.reductions.iter().map(agg_expr).collect();
        let mut lf = self.frame()?.lazy().group_by(keys).agg(aggs);
        if let Some(n) = limit {
            lf = lf.limit(n);
        }
        Ok(lf.collect()?)
    }
}

impl GroupByEngine for PolarsEngine {
    fn name(&self) -> &'static str {
        "polars"
    }

    fn load(&mut self, ds: &Dataset) -> Result<()> {
        let columns: Vec<pl::Column> = Column::ALL.iter()
            .map(|c| pl::Series::new(c.name().into(), ds.column(*c)).into())
            .collect();
        self.df = Some(pl::DataFrame::new(columns)?);
        Ok(())
    }

    fn group_by(&mut self, _ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        let out = self.grouped(query, None)?;
        (0..out.height()).map(|i| row_at(&out, i, query.keys.len())).collect()
    }

    fn aggregate(&mut self, _ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        let out = self.grouped(query, Some(1))?;
        if out.height() == 0 {
            return Ok(None);
        }
        Ok(Some(row_at(&out, 0, query.keys.len())?))
    }
}
