use std::cmp::Ordering;

use rayon::prelude::*;

use crate::dataset::Dataset;
use crate::keysum::{fill_key, into_rows, store_rows, sum_maps, FastMap, Key, KeyMap, KeySum, OrdMap};

use super::{GroupByEngine, GroupQuery, GroupRow, Result};

fn single_map<M: KeyMap>(ds: &Dataset, query: &GroupQuery) -> M {
    let mut map = M::default();
    store_rows(&mut map, ds, query, 0..ds.len());
    map
}

/// Ordered map aggregation; the first row is always the smallest key.
pub struct BTreeEngine;

impl GroupByEngine for BTreeEngine {
    fn name(&self) -> &'static str {
        "btree"
    }

    fn group_by(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        Ok(into_rows(single_map::<OrdMap>(ds, query)))
    }

    fn aggregate(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(single_map::<OrdMap>(ds, query).first())
    }
}

pub struct HashEngine;

impl GroupByEngine for HashEngine {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn group_by(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        Ok(into_rows(single_map::<FastMap>(ds, query)))
    }

    fn aggregate(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(single_map::<FastMap>(ds, query).first())
    }
}

/// Splits the rows into one chunk per pool thread, aggregates chunks in parallel and merges the partial maps.
pub struct ParEngine {
    verbose: usize,
}

impl ParEngine {
    pub fn new(verbose: usize) -> ParEngine {
        ParEngine { verbose }
    }

    fn merged(&self, ds: &Dataset, query: &GroupQuery) -> FastMap {
        let n = ds.len();
        let chunks = rayon::current_num_threads().max(1);
        let step = n.div_ceil(chunks).max(1);
        let mut maps: Vec<FastMap> = (0..n)
            .into_par_iter()
            .step_by(step)
            .map(|start| {
                let mut map = FastMap::default();
                store_rows(&mut map, ds, query, start..(start + step).min(n));
                map
            })
            .collect();
        sum_maps(&mut maps, &query.reductions, self.verbose)
    }
}

impl GroupByEngine for ParEngine {
    fn name(&self) -> &'static str {
        "par"
    }

    fn group_by(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        Ok(into_rows(self.merged(ds, query)))
    }

    fn aggregate(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(self.merged(ds, query).first())
    }
}

/// Sorts row indices by key then emits one row per run of equal keys.
pub struct SortedEngine;

fn cmp_rows(ds: &Dataset, query: &GroupQuery, a: usize, b: usize) -> Ordering {
    for c in &query.keys {
        let col = ds.column(*c);
        match col[a].cmp(&col[b]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn sorted_runs(ds: &Dataset, query: &GroupQuery, limit: Option<usize>) -> Vec<GroupRow> {
    let mut order: Vec<usize> = (0..ds.len()).collect();
    order.par_sort_unstable_by(|&a, &b| cmp_rows(ds, query, a, b));

    let mut out = Vec::new();
    let mut key = Key::new();
    let mut row_key = Key::new();
    let mut acc = KeySum::new(&query.reductions);
    let mut open = false;
    for &row in &order {
        fill_key(ds, query, row, &mut row_key);
        if open && row_key != key {
            out.push(GroupRow::new(key.clone(), acc.vals.iter().copied()));
            if limit.is_some_and(|l| out.len() >= l) {
                return out;
            }
            acc = KeySum::new(&query.reductions);
        }
        std::mem::swap(&mut key, &mut row_key);
        acc.add_row(&query.reductions, ds, row);
        open = true;
    }
    if open {
        out.push(GroupRow::new(key, acc.vals));
    }
    out
}

impl GroupByEngine for SortedEngine {
    fn name(&self) -> &'static str {
        "sorted"
    }

    fn group_by(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        Ok(sorted_runs(ds, query, None))
    }

    /// Full sort, but the run scan stops after the first group.
    fn aggregate(&mut self, ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(sorted_runs(ds, query, Some(1)).into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::engine::Reduction;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeMap;

    fn reference(ds: &Dataset, query: &GroupQuery) -> Vec<GroupRow> {
        let mut m: BTreeMap<Vec<i64>, Vec<Vec<i64>>> = BTreeMap::new();
        for i in 0..ds.len() {
            let k: Vec<i64> = query.keys.iter().map(|c| ds.column(*c)[i]).collect();
            m.entry(k).or_default().push(Column::ALL.iter().map(|c| ds.column(*c)[i]).collect());
        }
        m.into_iter().map(|(k, rows)| {
            let vals = query.reductions.iter().map(|r| match r {
                Reduction::Sum(c) => rows.iter().map(|x| x[*c as usize]).sum(),
                Reduction::Min(c) => rows.iter().map(|x| x[*c as usize]).min().unwrap(),
                Reduction::Max(c) => rows.iter().map(|x| x[*c as usize]).max().unwrap(),
                Reduction::Count => rows.len() as i64,
            });
            GroupRow::new(k.into_iter().collect(), vals)
        }).collect()
    }

    fn engines() -> Vec<Box<dyn GroupByEngine>> {
        vec![Box::new(BTreeEngine), Box::new(HashEngine), Box::new(ParEngine::new(0)), Box::new(SortedEngine)]
    }

    fn sorted(mut v: Vec<GroupRow>) -> Vec<GroupRow> {
        v.sort();
        v
    }

    #[test]
    fn engines_agree_with_reference() {
        let ds = Dataset::generate(20_000, 200, &mut ChaCha8Rng::seed_from_u64(3)).unwrap();
        let queries = [
            GroupQuery::default(),
            GroupQuery::new(vec![Column::G2], vec![Reduction::Count, Reduction::Min(Column::D), Reduction::Max(Column::D)]).unwrap(),
            GroupQuery::new(vec![Column::G2, Column::G1], vec![Reduction::Max(Column::D), Reduction::Sum(Column::D)]).unwrap(),
        ];
        for q in &queries {
            let expected = reference(&ds, q);
            for mut e in engines() {
                let got = sorted(e.group_by(&ds, q).unwrap());
                assert_eq!(got, expected, "engine {} query {}", e.name(), q);
            }
        }
    }

    #[test]
    fn default_query_counts_every_group() {
        let ds = Dataset::generate(10_000, 1000, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let total: i64 = ds.column(Column::D).iter().sum();
        for mut e in engines() {
            let rows = e.group_by(&ds, &GroupQuery::default()).unwrap();
            assert_eq!(rows.len(), 1000, "engine {}", e.name());
            assert!(rows.iter().all(|r| r.values[1] == 10), "engine {}", e.name());
            assert_eq!(rows.iter().map(|r| r.values[0]).sum::<i64>(), total, "engine {}", e.name());
        }
    }

    #[test]
    fn aggregate_returns_one_row_of_the_result() {
        let ds = Dataset::generate(1000, 10, &mut ChaCha8Rng::seed_from_u64(5)).unwrap();
        let q = GroupQuery::default();
        let all = reference(&ds, &q);
        for mut e in engines() {
            let first = e.aggregate(&ds, &q).unwrap().unwrap();
            assert!(all.contains(&first), "engine {}", e.name());
        }
        assert_eq!(BTreeEngine.aggregate(&ds, &q).unwrap().unwrap(), all[0]);
        assert_eq!(SortedEngine.aggregate(&ds, &q).unwrap().unwrap(), all[0]);
    }

    #[test]
    fn sorted_runs_respects_limit() {
        let ds = Dataset::generate(1000, 100, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        let q = GroupQuery::default();
        let top = sorted_runs(&ds, &q, Some(3));
        assert_eq!(top, reference(&ds, &q)[..3].to_vec());
    }

    #[test]
    fn sorted_aggregate_stops_at_first_group() {
        let ds = Dataset::generate(2000, 200, &mut ChaCha8Rng::seed_from_u64(13)).unwrap();
        for q in [GroupQuery::default(), GroupQuery::new(vec![Column::G2], vec![Reduction::Count]).unwrap()] {
            let first = SortedEngine.aggregate(&ds, &q).unwrap();
            assert_eq!(sorted_runs(&ds, &q, Some(1)).len(), 1);
            assert_eq!(first.as_ref(), SortedEngine.group_by(&ds, &q).unwrap().first());
        }
    }

    #[test]
    fn empty_dataset_has_no_rows() {
        let ds = Dataset::from_columns(vec![], vec![], vec![]).unwrap();
        for mut e in engines() {
            assert!(e.aggregate(&ds, &GroupQuery::default()).unwrap().is_none(), "engine {}", e.name());
        }
    }
}
