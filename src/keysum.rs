use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Instant;

use itertools::join;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::dataset::Dataset;
use crate::engine::{GroupQuery, GroupRow, Reduction};

/// Group key: one value per key column, in query order.
pub type Key = SmallVec<[i64; 4]>;

#[cfg(feature = "fast-hash")]
pub type FastMap = hashbrown::HashMap<Key, KeySum, ahash::RandomState>;
#[cfg(not(feature = "fast-hash"))]
pub type FastMap = std::collections::HashMap<Key, KeySum>;

pub type OrdMap = BTreeMap<Key, KeySum>;

/// Aggregation record per key, one slot per reduction of the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySum {
    pub vals: SmallVec<[i64; 4]>,
}

impl KeySum {
    pub fn new(reductions: &[Reduction]) -> KeySum {
        KeySum {
            vals: reductions.iter().map(|r| match r {
                Reduction::Sum(_) | Reduction::Count => 0,
                Reduction::Min(_) => i64::MAX,
                Reduction::Max(_) => i64::MIN,
            }).collect(),
        }
    }

    #[inline]
    pub fn add_row(&mut self, reductions: &[Reduction], ds: &Dataset, row: usize) {
        for (slot, r) in self.vals.iter_mut().zip(reductions) {
            match *r {
                Reduction::Sum(c) => *slot += ds.column(c)[row],
                Reduction::Min(c) => *slot = (*slot).min(ds.column(c)[row]),
                Reduction::Max(c) => *slot = (*slot).max(ds.column(c)[row]),
                Reduction::Count => *slot += 1,
            }
        }
    }

    pub fn merge(&mut self, reductions: &[Reduction], other: &KeySum) {
        for ((slot, new), r) in self.vals.iter_mut().zip(other.vals.iter()).zip(reductions) {
            match r {
                Reduction::Sum(_) | Reduction::Count => *slot += *new,
                Reduction::Min(_) => *slot = (*slot).min(*new),
                Reduction::Max(_) => *slot = (*slot).max(*new),
            }
        }
    }
}

/// Minimal map surface the native engines aggregate into.
pub trait KeyMap: Default + Send + IntoIterator<Item = (Key, KeySum)> {
    fn slot(&mut self, key: &Key, reductions: &[Reduction]) -> &mut KeySum;
    fn len(&self) -> usize;
    fn first(&self) -> Option<GroupRow>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyMap for OrdMap {
    fn slot(&mut self, key: &Key, reductions: &[Reduction]) -> &mut KeySum {
        self.entry(key.clone()).or_insert_with(|| KeySum::new(reductions))
    }
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }
    fn first(&self) -> Option<GroupRow> {
        self.first_key_value().map(|(k, v)| GroupRow::new(k.clone(), v.vals.clone()))
    }
}

impl KeyMap for FastMap {
    fn slot(&mut self, key: &Key, reductions: &[Reduction]) -> &mut KeySum {
        self.entry(key.clone()).or_insert_with(|| KeySum::new(reductions))
    }
    fn len(&self) -> usize {
        FastMap::len(self)
    }
    fn first(&self) -> Option<GroupRow> {
        self.iter().next().map(|(k, v)| GroupRow::new(k.clone(), v.vals.clone()))
    }
}

#[inline]
pub fn fill_key(ds: &Dataset, query: &GroupQuery, row: usize, key: &mut Key) {
    key.clear();
    for c in &query.keys {
        key.push(ds.column(*c)[row]);
    }
}

/// Folds the rows of `range` into `map`.
pub fn store_rows<M: KeyMap>(map: &mut M, ds: &Dataset, query: &GroupQuery, range: Range<usize>) {
    let mut key = Key::new();
    for row in range {
        fill_key(ds, query, row, &mut key);
        map.slot(&key, &query.reductions).add_row(&query.reductions, ds, row);
    }
}

pub fn into_rows<M: KeyMap>(map: M) -> Vec<GroupRow> {
    map.into_iter().map(|(k, v)| GroupRow::new(k, v.vals)).collect()
}

const MERGE_PAR_THRESHOLD_MAPS: usize = 4; // minimum number of maps to justify parallel merge
const MERGE_PAR_THRESHOLD_ENTRIES: usize = 10_000; // minimum total entries to justify parallel merge

/// Reduces per-chunk maps into one map by pairwise merging, in parallel when the work is large enough.
pub fn sum_maps<M: KeyMap>(maps: &mut Vec<M>, reductions: &[Reduction], verbose: usize) -> M {
    let start = Instant::now();
    let tot_merge_items: usize = maps.iter().map(|m| m.len()).sum();
    if maps.is_empty() { return M::default(); }
    if maps.len() == 1 { return maps.remove(0); }
    let lens = if verbose > 2 { join(maps.iter().map(|m| m.len().to_string()), ",") } else { String::new() };

    let merge_pair = |mut left: M, right: M| -> M {
        for (k, old) in right.into_iter() {
            left.slot(&k, reductions).merge(reductions, &old);
        }
        left
    };

    let mut working: Vec<M> = std::mem::take(maps);
    let use_parallel = working.len() >= MERGE_PAR_THRESHOLD_MAPS || tot_merge_items >= MERGE_PAR_THRESHOLD_ENTRIES;
    while working.len() > 1 {
        if use_parallel && working.len() > 2 {
            working = working
                .par_chunks_mut(2)
                .map(|chunk| {
                    if chunk.len() == 2 {
                        let right = std::mem::take(&mut chunk[1]);
                        let left = std::mem::take(&mut chunk[0]);
                        merge_pair(left, right)
                    } else {
                        std::mem::take(&mut chunk[0])
                    }
                })
                .collect();
        } else {
            let mut next: Vec<M> = Vec::with_capacity(working.len().div_ceil(2));
            let mut iter = working.into_iter();
            while let Some(left) = iter.next() {
                if let Some(right) = iter.next() {
                    next.push(merge_pair(left, right));
                } else {
                    next.push(left);
                }
            }
            working = next;
        }
    }
    let result = working.pop().unwrap_or_default();
    if verbose > 2 {
        eprintln!("merge maps time: {:.3}s from map entry counts: [{}] to single map {} entries{}",
            start.elapsed().as_secs_f64(), lens, result.len(), if use_parallel { " (parallel)" } else { " (seq)" });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use rand::SeedableRng;

    fn tiny() -> Dataset {
        Dataset::from_columns(vec![0, 0, 1, 1, 0, 1], vec![0, 1, 0, 1, 0, 1], vec![5, 1, 7, 2, 3, 9]).unwrap()
    }

    fn all_reductions() -> Vec<Reduction> {
        vec![Reduction::Sum(Column::D), Reduction::Count, Reduction::Min(Column::D), Reduction::Max(Column::D)]
    }

    #[test]
    fn keysum_folds_rows() {
        let ds = tiny();
        let reds = all_reductions();
        let mut ks = KeySum::new(&reds);
        for row in [0usize, 4] {
            ks.add_row(&reds, &ds, row);
        }
        assert_eq!(ks.vals.as_slice(), &[8, 2, 3, 5]);
    }

    #[test]
    fn merge_matches_single_pass() {
        let ds = tiny();
        let query = GroupQuery::new(vec![Column::G1, Column::G2], all_reductions()).unwrap();

        let mut whole = OrdMap::default();
        store_rows(&mut whole, &ds, &query, 0..ds.len());

        let mut parts: Vec<OrdMap> = (0..ds.len()).map(|i| {
            let mut m = OrdMap::default();
            store_rows(&mut m, &ds, &query, i..i + 1);
            m
        }).collect();
        let merged = sum_maps(&mut parts, &query.reductions, 0);
        assert!(parts.is_empty());
        assert_eq!(into_rows(merged), into_rows(whole));
    }

    #[test]
    fn merge_many_hash_maps_in_parallel() {
        let ds = Dataset::generate(40_000, 400, &mut rand_chacha::ChaCha8Rng::seed_from_u64(4)).unwrap();
        let query = GroupQuery::default();

        let mut whole = OrdMap::default();
        store_rows(&mut whole, &ds, &query, 0..ds.len());

        let mut parts: Vec<FastMap> = (0..ds.len()).step_by(1000).map(|start| {
            let mut m = FastMap::default();
            store_rows(&mut m, &ds, &query, start..start + 1000);
            m
        }).collect();
        assert_eq!(parts.len(), 40);
        let mut merged = into_rows(sum_maps(&mut parts, &query.reductions, 0));
        merged.sort();
        assert_eq!(merged, into_rows(whole));
    }

    #[test]
    fn first_of_ordered_map_is_smallest_key() {
        let ds = tiny();
        let mut m = OrdMap::default();
        store_rows(&mut m, &ds, &GroupQuery::default(), 0..ds.len());
        let first = m.first().unwrap();
        assert_eq!(first.key.as_slice(), &[0, 0]);
        assert_eq!(first.values, vec![8, 2]);
        assert_eq!(KeyMap::len(&m), 4);
    }
}
