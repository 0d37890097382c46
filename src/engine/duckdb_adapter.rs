//! DuckDB adapter: in-memory database, dataset loaded through the appender.

use duckdb::{params, Connection};
use itertools::Itertools;

use crate::dataset::Dataset;
use crate::keysum::Key;

use super::{GroupByEngine, GroupQuery, GroupRow, Reduction, Result};

const TABLE: &str = "bench";

pub struct DuckDbEngine {
    conn: Connection,
    loaded: bool,
}

impl DuckDbEngine {
    pub fn new() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(DuckDbEngine { conn, loaded: false })
    }

    fn query_rows(&self, query: &GroupQuery, limit: Option<usize>) -> Result<Vec<GroupRow>> {
        if !self.loaded {
            Err("duckdb engine used before load")?;
        }
        let sql = to_sql(query, limit);
        let width = query.keys.len() + query.reductions.len();
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut key = Key::new();
            let mut values = Vec::with_capacity(query.reductions.len());
            for i in 0..width {
                let v: i64 = row.get(i)?;
                if i < query.keys.len() { key.push(v); } else { values.push(v); }
            }
            out.push(GroupRow::new(key, values));
        }
        Ok(out)
    }
}

fn reduction_sql(r: &Reduction) -> String {
    let inner = match r {
        Reduction::Sum(c) => format!("sum({})", c),
        Reduction::Min(c) => format!("min({})", c),
        Reduction::Max(c) => format!("max({})", c),
        Reduction::Count => "count(*)".to_string(),
    };
    format!("CAST({} AS BIGINT) AS {}", inner, r.alias())
}

pub fn to_sql(query: &GroupQuery, limit: Option<usize>) -> String {
    let keys = query.keys.iter().join(", ");
    let mut sql = format!(
        "SELECT {}, {} FROM {} GROUP BY {}",
        keys,
        query.reductions.iter().map(reduction_sql).join(", "),
        TABLE,
        keys
    );
    if let Some(l) = limit {
        sql.push_str(&format!(" LIMIT {}", l));
    }
    sql
}

impl GroupByEngine for DuckDbEngine {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn load(&mut self, ds: &Dataset) -> Result<()> {
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {t}; CREATE TABLE {t} (g1 BIGINT, g2 BIGINT, d BIGINT);",
            t = TABLE
        ))?;
        {
            let mut app = self.conn.appender(TABLE)?;
            for i in 0..ds.len() {
                let (a, b, d) = ds.row(i);
                app.append_row(params![a, b, d])?;
            }
            app.flush()?;
        }
        self.loaded = true;
        Ok(())
    }

    fn group_by(&mut self, _ds: &Dataset, query: &GroupQuery) -> Result<Vec<GroupRow>> {
        self.query_rows(query, None)
    }

    fn aggregate(&mut self, _ds: &Dataset, query: &GroupQuery) -> Result<Option<GroupRow>> {
        Ok(self.query_rows(query, Some(1))?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BTreeEngine;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn sql_shape() {
        assert_eq!(
            to_sql(&GroupQuery::default(), Some(1)),
            "SELECT g1, g2, CAST(sum(d) AS BIGINT) AS sum_d, CAST(count(*) AS BIGINT) AS ct FROM bench GROUP BY g1, g2 LIMIT 1"
        );
    }

    #[test]
    fn matches_btree() {
        let ds = Dataset::generate(4000, 40, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();
        let q = GroupQuery::default();
        let mut e = DuckDbEngine::new().unwrap();
        assert!(e.aggregate(&ds, &q).is_err());
        e.load(&ds).unwrap();
        let mut got = e.group_by(&ds, &q).unwrap();
        got.sort();
        assert_eq!(got, BTreeEngine.group_by(&ds, &q).unwrap());
        assert!(e.aggregate(&ds, &q).unwrap().is_some());
    }
}
