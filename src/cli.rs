use std::path::PathBuf;

use clap::{ArgAction, Parser};
use lazy_static::lazy_static;

use gb_bench::sweep::{parse_count, EngineSet, GroupCount, SweepCfg, DEFAULT_GROUPS, DEFAULT_ROWS, DEFAULT_TRIALS};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn get_default_thread_no() -> usize {
    num_cpus::get()
}

lazy_static! {
    pub static ref BUILD_INFO: String = format!("  ver: {}  rev: {}  engines: {}",
        env!("CARGO_PKG_VERSION"), env!("BUILD_GIT_HASH"), env!("BUILD_ENGINES"));
}

#[derive(Parser, Debug)]
#[command(version = BUILD_INFO.as_str(), rename_all = "kebab-case")]
/// Time group-by aggregations across engines on synthetic datasets with an exact number of groups.
///
/// Every (rows, groups, engine) experiment prints one line: rows, groups, engine and the
/// median wall clock seconds of the trials, separated by tabs.
pub struct CliCfg {
    #[arg(short='r', long="rows", value_delimiter=',', value_parser=parse_rows)] pub rows: Vec<usize>,
    // 1000 is an absolute count, n/1000 a fraction of the rows, n one group per row pair
    #[arg(short='g', long="groups", value_delimiter=',', value_parser=parse_group)] pub groups: Vec<GroupCount>,
    #[arg(short='e', long="engines", value_delimiter=',')] pub raw_engines: Vec<String>,
    #[clap(skip)] pub engines: EngineSet,
    #[arg(short='k', long="trials", default_value_t=DEFAULT_TRIALS)] pub trials: usize,
    #[arg(long="seed")] pub seed: Option<u64>,
    #[arg(short='t', long="threads", default_value_t=get_default_thread_no())] pub threads: usize,
    #[arg(long="write_csv")] pub write_csv: Option<PathBuf>,
    #[arg(long="table")] pub table: bool,
    #[arg(short='v', action=ArgAction::Count)] pub verbose: u8,
    #[arg(short='E', long="print_examples")] pub print_examples: bool,
}

fn print_examples() {
    println!(
"Here are a few examples for quick reference

gbb                                # full sweep: 1e6,1e7,1e8 rows x 1000,n/1000,n/100,n/10,n groups
gbb -r 1e6 -g 1000,n               # one row count, two group counts
gbb -r 1e6 -e hash,par -k 5        # only two engines, median of 5 trials
gbb -r 1e7 -t 4 -e par             # parallel engine on a 4 thread pool
gbb -r 1e6 -g n/100 --seed 42      # reproducible dataset
gbb -r 1e5 -g 100 --write_csv data.csv.zst   # keep the generated data
gbb -r 1e6 --table -v              # pretty table at the end plus trial detail

engines: btree,hash,par,sorted and with --features polars / duckdb also polars,duckdb

ver: {}\n", env!("BUILD_GIT_HASH"));
}

fn parse_rows(s: &str) -> std::result::Result<usize, String> {
    match parse_count(s)? {
        0 => Err("row count must be 1 or greater".to_string()),
        v => Ok(v),
    }
}

fn parse_group(s: &str) -> std::result::Result<GroupCount, String> {
    s.parse::<GroupCount>()
}

impl CliCfg {
    pub fn sweep_cfg(&self) -> SweepCfg {
        SweepCfg {
            rows: self.rows.clone(),
            groups: self.groups.clone(),
            trials: self.trials,
            seed: self.seed,
            engines: self.engines,
            write_csv: self.write_csv.clone(),
            verbose: self.verbose as usize,
            ..SweepCfg::default()
        }
    }

    fn finish(mut self) -> Result<CliCfg> {
        if self.rows.is_empty() {
            self.rows = DEFAULT_ROWS.to_vec();
        }
        if self.groups.is_empty() {
            for g in DEFAULT_GROUPS.split(',') {
                self.groups.push(parse_group(g)?);
            }
        }
        self.engines = if self.raw_engines.is_empty() {
            EngineSet::available()
        } else {
            EngineSet::from_names(&self.raw_engines)?
        };
        if self.threads == 0 {
            Err("thread count must be 1 or greater")?;
        }
        if self.trials == 0 && self.verbose >= 1 {
            eprintln!("trial count of 0 runs each experiment once");
        }
        if self.write_csv.is_some() && self.rows.len() * self.groups.len() > 1 {
            eprintln!("Warning: --write_csv keeps only the dataset of the last experiment");
        }
        if self.verbose == 1 {
            eprintln!("CLI options: {:?}", self);
        } else if self.verbose > 1 {
            eprintln!("CLI options: {:#?}", self);
        }
        Ok(self)
    }
}

pub fn get_cli() -> Result<CliCfg> {
    let cfg = CliCfg::parse();
    if cfg.print_examples {
        print_examples();
        std::process::exit(1);
    }
    cfg.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliCfg> {
        let mut full = vec!["gbb"];
        full.extend_from_slice(args);
        CliCfg::try_parse_from(full)?.finish()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]).unwrap();
        assert_eq!(cfg.rows, DEFAULT_ROWS.to_vec());
        assert_eq!(cfg.groups.len(), 5);
        assert_eq!(cfg.trials, 2);
        assert_eq!(cfg.engines, EngineSet::available());
        assert!(cfg.threads >= 1);
        assert!(!cfg.table);
    }

    #[test]
    fn lists_and_counts() {
        let cfg = parse(&["-r", "1e3,2_000", "-g", "10,n/10,n", "-e", "hash,sorted", "-k", "3", "--seed", "9", "-vv"]).unwrap();
        assert_eq!(cfg.rows, vec![1000, 2000]);
        assert_eq!(cfg.groups, vec![GroupCount::Absolute(10), GroupCount::Fraction(10), GroupCount::All]);
        assert!(cfg.engines.hash && cfg.engines.sorted && !cfg.engines.btree);
        let sweep = cfg.sweep_cfg();
        assert_eq!(sweep.trials, 3);
        assert_eq!(sweep.seed, Some(9));
        assert_eq!(sweep.verbose, 2);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["-r", "0"]).is_err());
        assert!(parse(&["-g", "n/zero"]).is_err());
        assert!(parse(&["-e", "pandas"]).is_err());
        assert!(parse(&["-t", "0"]).is_err());
    }
}
