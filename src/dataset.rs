use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::seq::SliceRandom;
use rand::Rng;

#[cfg(feature = "fast-hash")]
type PairSet = hashbrown::HashSet<(i64, i64), ahash::RandomState>;
#[cfg(not(feature = "fast-hash"))]
type PairSet = std::collections::HashSet<(i64, i64)>;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// The three columns of a synthetic dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    G1,
    G2,
    D,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::G1, Column::G2, Column::D];

    pub fn name(&self) -> &'static str {
        match self {
            Column::G1 => "g1",
            Column::G2 => "g2",
            Column::D => "d",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    ZeroRows,
    ZeroGroups,
    OddGroups { groups: usize },
    OddRows { rows: usize },
    TooManyGroups { rows: usize, groups: usize },
    UnevenBlocks { rows: usize, groups: usize },
    GroupMismatch { expected: usize, found: usize },
    ColumnLengths { g1: usize, g2: usize, d: usize },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::ZeroRows => write!(f, "row count must be 1 or greater"),
            DatasetError::ZeroGroups => write!(f, "group count must be 1 or greater"),
            DatasetError::OddGroups { groups } => write!(f, "group count {} must be even (g2 only takes the values 0 and 1)", groups),
            DatasetError::OddRows { rows } => write!(f, "row count {} must be even to tile g2 as 0,1", rows),
            DatasetError::TooManyGroups { rows, groups } => write!(f, "group count {} exceeds row count {}", groups, rows),
            DatasetError::UnevenBlocks { rows, groups } => {
                write!(f, "row count {} is not divisible by half the group count ({}), blocks of g1 would be truncated", rows, groups / 2)
            }
            DatasetError::GroupMismatch { expected, found } => {
                write!(f, "generated dataset has {} distinct (g1,g2) groups but {} were requested", found, expected)
            }
            DatasetError::ColumnLengths { g1, g2, d } => write!(f, "column lengths differ: g1={} g2={} d={}", g1, g2, d),
        }
    }
}

impl std::error::Error for DatasetError {}

/// Rejects every (rows, groups) pair for which the block construction cannot be exact.
pub fn check_shape(rows: usize, groups: usize) -> std::result::Result<(), DatasetError> {
    if rows == 0 {
        return Err(DatasetError::ZeroRows);
    }
    if groups == 0 {
        return Err(DatasetError::ZeroGroups);
    }
    if groups % 2 != 0 {
        return Err(DatasetError::OddGroups { groups });
    }
    if groups > rows {
        return Err(DatasetError::TooManyGroups { rows, groups });
    }
    if rows % 2 != 0 {
        return Err(DatasetError::OddRows { rows });
    }
    if rows % (groups / 2) != 0 {
        return Err(DatasetError::UnevenBlocks { rows, groups });
    }
    Ok(())
}

/// Column-major synthetic table: two grouping columns and one payload column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    g1: Vec<i64>,
    g2: Vec<i64>,
    d: Vec<i64>,
    groups: usize,
}

impl Dataset {
    /// Builds a dataset of `rows` rows holding exactly `groups` distinct (g1,g2) pairs.
    ///
    /// The distinct pair count is verified before the rows are shuffled; a mismatch
    /// means the experiment would measure the wrong thing and is returned as an error.
    pub fn generate<R: Rng + ?Sized>(rows: usize, groups: usize, rng: &mut R) -> std::result::Result<Dataset, DatasetError> {
        check_shape(rows, groups)?;

        let half = groups / 2;
        let block = rows / half;

        let mut g1 = Vec::with_capacity(rows);
        for v in 0..half {
            g1.extend(std::iter::repeat(v as i64).take(block));
        }
        let g2: Vec<i64> = (0..rows).map(|i| (i % 2) as i64).collect();
        let upper = rows as i64;
        let d: Vec<i64> = (0..rows).map(|_| rng.gen_range(0..upper)).collect();

        let mut ds = Dataset { g1, g2, d, groups };

        let found = ds.distinct_groups();
        if found != groups {
            return Err(DatasetError::GroupMismatch { expected: groups, found });
        }
        ds.permute(rng);
        Ok(ds)
    }

    /// Wraps existing columns; the group count is whatever the columns actually hold.
    pub fn from_columns(g1: Vec<i64>, g2: Vec<i64>, d: Vec<i64>) -> std::result::Result<Dataset, DatasetError> {
        if g1.len() != g2.len() || g1.len() != d.len() {
            return Err(DatasetError::ColumnLengths { g1: g1.len(), g2: g2.len(), d: d.len() });
        }
        let mut ds = Dataset { g1, g2, d, groups: 0 };
        ds.groups = ds.distinct_groups();
        Ok(ds)
    }

    pub fn len(&self) -> usize {
        self.d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }

    /// Distinct (g1,g2) pairs: the requested count after `generate`, the measured one after `from_columns`.
    /// Columns are read-only through `column`.
    pub fn groups(&self) -> usize {
        self.groups
    }

    pub fn column(&self, c: Column) -> &[i64] {
        match c {
            Column::G1 => &self.g1,
            Column::G2 => &self.g2,
            Column::D => &self.d,
        }
    }

    pub fn row(&self, i: usize) -> (i64, i64, i64) {
        (self.g1[i], self.g2[i], self.d[i])
    }

    pub fn distinct_groups(&self) -> usize {
        let mut seen = PairSet::default();
        for (a, b) in self.g1.iter().zip(self.g2.iter()) {
            seen.insert((*a, *b));
        }
        seen.len()
    }

    /// Applies one uniformly random permutation to all three columns.
    pub fn permute<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        let gather = |col: &[i64]| -> Vec<i64> { order.iter().map(|&i| col[i]).collect() };
        self.g1 = gather(&self.g1);
        self.g2 = gather(&self.g2);
        self.d = gather(&self.d);
    }

    /// Writes `g1,g2,d` with a header line. `.gz`/`.tgz` and `.zst`/`.zstd` paths are compressed.
    pub fn write_csv(&self, path: &Path, verbosity: usize) -> Result<()> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let file = match File::create(path) {
            Ok(f) => f,
            Err(err) => Err(format!("unable to create csv file \"{}\": {}", path.display(), err))?,
        };
        let inner = BufWriter::new(file);
        match ext.as_str() {
            "gz" | "tgz" => {
                if verbosity > 1 { eprintln!("writing gzip csv {}", path.display()); }
                let enc = self.write_records(GzEncoder::new(inner, Compression::default()))?;
                enc.finish()?.flush()?;
            }
            "zst" | "zstd" => {
                if verbosity > 1 { eprintln!("writing zstd csv {}", path.display()); }
                let enc = self.write_records(zstd::stream::write::Encoder::new(inner, 0)?)?;
                enc.finish()?.flush()?;
            }
            _ => {
                if verbosity > 1 { eprintln!("writing plain csv {}", path.display()); }
                self.write_records(inner)?.flush()?;
            }
        }
        Ok(())
    }

    fn write_records<W: Write>(&self, w: W) -> Result<W> {
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(Column::ALL.iter().map(|c| c.name()))?;
        for i in 0..self.len() {
            let (a, b, d) = self.row(i);
            wtr.write_record(&[a.to_string(), b.to_string(), d.to_string()])?;
        }
        match wtr.into_inner() {
            Ok(w) => Ok(w),
            Err(e) => Err(format!("unable to flush csv writer: {}", e.error()))?,
        }
    }
}
