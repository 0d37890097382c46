//! Group-by engines under test.
//!
//! Every engine answers the same question: group the dataset by `query.keys`, compute
//! `query.reductions` per group and hand back the first row of the result. Converting
//! the dataset into an engine's native form happens in `load`, outside the timed region.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::dataset::{Column, Dataset};
use crate::keysum::Key;

mod native;
#[cfg(feature = "polars")]
mod polars_adapter;
#[cfg(feature = "duckdb")]
mod duckdb_adapter;

pub use native::{BTreeEngine, HashEngine, ParEngine, SortedEngine};
#[cfg(feature = "polars")]
pub use polars_adapter::PolarsEngine;
#[cfg(feature = "duckdb")]
pub use duckdb_adapter::DuckDbEngine;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    Sum(Column),
    Min(Column),
    Max(Column),
    Count,
}

impl Reduction {
    /// Output column name used by the dataframe and sql engines.
    pub fn alias(&self) -> String {
        match self {
            Reduction::Sum(c) => format!("sum_{}", c),
            Reduction::Min(c) => format!("min_{}", c),
            Reduction::Max(c) => format!("max_{}", c),
            Reduction::Count => "ct".to_string(),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Sum(c) => write!(f, "sum({})", c),
            Reduction::Min(c) => write!(f, "min({})", c),
            Reduction::Max(c) => write!(f, "max({})", c),
            Reduction::Count => write!(f, "count(*)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupQuery {
    pub keys: Vec<Column>,
    pub reductions: Vec<Reduction>,
}

impl GroupQuery {
    pub fn new(keys: Vec<Column>, reductions: Vec<Reduction>) -> Result<GroupQuery> {
        if keys.is_empty() {
            Err("a group query needs at least one key column")?;
        }
        if reductions.is_empty() {
            Err("a group query needs at least one reduction")?;
        }
        if keys.iter().duplicates().next().is_some() {
            Err(format!("key columns must be unique: [{}]", keys.iter().join(",")))?;
        }
        Ok(GroupQuery { keys, reductions })
    }
}

impl Default for GroupQuery {
    /// `group by g1, g2` computing `sum(d), count(*)`.
    fn default() -> Self {
        GroupQuery {
            keys: vec![Column::G1, Column::G2],
            reductions: vec![Reduction::Sum(Column::D), Reduction::Count],
        }
    }
}

impl fmt::Display for GroupQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group by [{}] agg [{}]", self.keys.iter().join(","), self.reductions.iter().join(","))
    }
}

/// One output row: key values in key order, then one value per reduction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupRow {
    pub key: Key,
    pub values: Vec<i64>,
}

impl GroupRow {
    pub fn new<V: IntoIterator<Item = i64>>(key: Key, values: V) -> GroupRow {
        GroupRow { key, values: values.into_iter().collect() }
    }
}

pub trait GroupByEngine {
    fn name(&self) -> &'static str;

    /// Untimed preparation; native engines read the dataset in place and skip this.
    fn load(&mut self, _ds: &Dataset) -> Result<()> {
        Ok(())
    }

    /// Full aggregation result, in whatever order the engine produces it.
    fn group_by(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>>;

    /// Materializes the full aggregation, keeps only its first row.
    fn aggregate(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(self.group_by(ds, query)?.into_iter().next())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    BTree,
    Hash,
    Par,
    Sorted,
    Polars,
    DuckDb,
}

impl EngineKind {
    pub const ALL: [EngineKind; 6] = [
        EngineKind::BTree,
        EngineKind::Hash,
        EngineKind::Par,
        EngineKind::Sorted,
        EngineKind::Polars,
        EngineKind::DuckDb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::BTree => "btree",
            EngineKind::Hash => "hash",
            EngineKind::Par => "par",
            EngineKind::Sorted => "sorted",
            EngineKind::Polars => "polars",
            EngineKind::DuckDb => "duckdb",
        }
    }

    /// Whether support for this engine was compiled in.
    pub fn available(&self) -> bool {
        match self {
            EngineKind::Polars => cfg!(feature = "polars"),
            EngineKind::DuckDb => cfg!(feature = "duckdb"),
            _ => true,
        }
    }

    pub fn create(&self, verbose: usize) -> Result<Box<dyn GroupByEngine>> {
        match self {
            EngineKind::BTree => Ok(Box::new(BTreeEngine)),
            EngineKind::Hash => Ok(Box::new(HashEngine)),
            EngineKind::Par => Ok(Box::new(ParEngine::new(verbose))),
            EngineKind::Sorted => Ok(Box::new(SortedEngine)),
            #[cfg(feature = "polars")]
            EngineKind::Polars => Ok(Box::new(PolarsEngine::default())),
            #[cfg(feature = "duckdb")]
            EngineKind::DuckDb => Ok(Box::new(DuckDbEngine::new()?)),
            #[allow(unreachable_patterns)]
            other => Err(format!("engine \"{}\" is not compiled in; rebuild with --features {}", other, other.name()))?,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        EngineKind::ALL.iter()
            .find(|k| k.name() == t)
            .copied()
            .ok_or_else(|| format!("unknown engine \"{}\", expected one of: {}", s, EngineKind::ALL.iter().join(",")))
    }
}
