use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use itertools::{join, Itertools};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dataset::Dataset;
use crate::engine::{EngineKind, GroupQuery};
use crate::timing::{timeit, Timing};

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

pub const DEFAULT_ROWS: [usize; 3] = [1_000_000, 10_000_000, 100_000_000];
pub const DEFAULT_GROUPS: &str = "1000,n/1000,n/100,n/10,n";
pub const DEFAULT_TRIALS: usize = 2;

/// One switch per engine; the sweep runs the enabled ones in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineSet {
    pub btree: bool,
    pub hash: bool,
    pub par: bool,
    pub sorted: bool,
    pub polars: bool,
    pub duckdb: bool,
}

impl EngineSet {
    /// Every engine that was compiled in.
    pub fn available() -> EngineSet {
        let mut set = EngineSet::default();
        for k in EngineKind::ALL.iter().filter(|k| k.available()) {
            *set.switch(*k) = true;
        }
        set
    }

    fn switch(&mut self, k: EngineKind) -> &mut bool {
        match k {
            EngineKind::BTree => &mut self.btree,
            EngineKind::Hash => &mut self.hash,
            EngineKind::Par => &mut self.par,
            EngineKind::Sorted => &mut self.sorted,
            EngineKind::Polars => &mut self.polars,
            EngineKind::DuckDb => &mut self.duckdb,
        }
    }

    pub fn is_enabled(&self, k: EngineKind) -> bool {
        match k {
            EngineKind::BTree => self.btree,
            EngineKind::Hash => self.hash,
            EngineKind::Par => self.par,
            EngineKind::Sorted => self.sorted,
            EngineKind::Polars => self.polars,
            EngineKind::DuckDb => self.duckdb,
        }
    }

    pub fn enabled(&self) -> Vec<EngineKind> {
        EngineKind::ALL.iter().copied().filter(|k| self.is_enabled(*k)).collect()
    }

    /// Builds a set from engine names; `all` selects every compiled-in engine.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<EngineSet> {
        let mut set = EngineSet::default();
        for name in names {
            let t = name.as_ref().trim();
            if t.is_empty() { continue; }
            if t.eq_ignore_ascii_case("all") {
                set = EngineSet::available();
                continue;
            }
            let k: EngineKind = t.parse()?;
            if !k.available() {
                Err(format!("engine \"{}\" is not compiled in; rebuild with --features {}", k, k.name()))?;
            }
            *set.switch(k) = true;
        }
        if set.enabled().is_empty() {
            Err("No work to do! - select at least one engine")?;
        }
        Ok(set)
    }
}

impl fmt::Display for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.enabled().iter().join(","))
    }
}

/// A group count either fixed or relative to the row count of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCount {
    Absolute(usize),
    Fraction(usize),
    All,
}

impl GroupCount {
    /// Group count for `rows`; a fraction that does not divide the rows is an error, never rounded.
    pub fn resolve(&self, rows: usize) -> Result<usize> {
        match *self {
            GroupCount::Absolute(g) => Ok(g),
            GroupCount::All => Ok(rows),
            GroupCount::Fraction(div) => {
                if div == 0 {
                    Err("group fraction divisor must be 1 or greater")?;
                }
                if rows % div != 0 {
                    Err(format!("group count n/{} is not a whole number for {} rows", div, rows))?;
                }
                Ok(rows / div)
            }
        }
    }
}

impl FromStr for GroupCount {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let t = s.trim().to_ascii_lowercase();
        if t == "n" {
            return Ok(GroupCount::All);
        }
        if let Some(div) = t.strip_prefix("n/") {
            return match parse_count(div) {
                Ok(0) | Err(_) => Err(format!("group spec \"{}\" needs a positive divisor: n/<number>", s)),
                Ok(d) => Ok(GroupCount::Fraction(d)),
            };
        }
        match parse_count(&t) {
            Ok(v) => Ok(GroupCount::Absolute(v)),
            Err(e) => Err(format!("group spec \"{}\" not understood, use <number>, n/<number> or n: {}", s, e)),
        }
    }
}

impl fmt::Display for GroupCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupCount::Absolute(g) => write!(f, "{}", g),
            GroupCount::Fraction(d) => write!(f, "n/{}", d),
            GroupCount::All => write!(f, "n"),
        }
    }
}

/// Parses plain integers as well as `1e6` and `10_000` forms.
pub fn parse_count(s: &str) -> std::result::Result<usize, String> {
    let t = s.trim().replace('_', "");
    if t.is_empty() {
        return Err("empty count".to_string());
    }
    if let Some((mant, exp)) = t.split_once(['e', 'E']) {
        let m: usize = mant.parse().map_err(|e| format!("bad mantissa \"{}\": {}", mant, e))?;
        let x: u32 = exp.parse().map_err(|e| format!("bad exponent \"{}\": {}", exp, e))?;
        return 10usize.checked_pow(x)
            .and_then(|p| p.checked_mul(m))
            .ok_or_else(|| format!("count \"{}\" overflows", s));
    }
    t.parse::<usize>().map_err(|e| format!("bad count \"{}\": {}", s, e))
}

#[derive(Debug, Clone)]
pub struct SweepCfg {
    pub rows: Vec<usize>,
    pub groups: Vec<GroupCount>,
    pub trials: usize,
    pub seed: Option<u64>,
    pub engines: EngineSet,
    pub query: GroupQuery,
    pub write_csv: Option<PathBuf>,
    pub verbose: usize,
}

impl Default for SweepCfg {
    fn default() -> Self {
        SweepCfg {
            rows: DEFAULT_ROWS.to_vec(),
            groups: DEFAULT_GROUPS.split(',').filter_map(|g| g.parse().ok()).collect(),
            trials: DEFAULT_TRIALS,
            seed: None,
            engines: EngineSet::available(),
            query: GroupQuery::default(),
            write_csv: None,
            verbose: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Measurement {
    pub rows: usize,
    pub groups: usize,
    pub engine: &'static str,
    pub timing: Timing,
}

impl Measurement {
    /// `<rows>\t<groups>\t<engine>\t<median seconds, 3 decimals>`
    pub fn tsv_line(&self) -> String {
        format!("{}\t{}\t{}\t{:.3}", self.rows, self.groups, self.engine, self.timing.secs())
    }
}

/// Progress messages on stderr. Quiet runs on a terminal get one self-overwriting line,
/// verbose runs get plain lines.
pub struct StatusLine {
    verbose: usize,
    live: bool,
    pending: bool,
}

impl StatusLine {
    pub fn new(verbose: usize, live: bool) -> StatusLine {
        StatusLine { verbose, live: live && cfg!(feature = "stats"), pending: false }
    }

    pub fn for_stderr(verbose: usize) -> StatusLine {
        StatusLine::new(verbose, atty::is(atty::Stream::Stderr))
    }

    pub fn show<E: Write>(&mut self, err: &mut E, msg: &str) {
        if self.verbose > 0 {
            let _ = writeln!(err, "{}", msg);
            return;
        }
        if self.live {
            #[cfg(feature = "stats")]
            {
                use crossterm::style::{Color, ResetColor, SetForegroundColor};
                use crossterm::terminal::{Clear, ClearType::CurrentLine};
                let _ = write!(err, "\r{}{}{}{}", Clear(CurrentLine), SetForegroundColor(Color::Green), msg, ResetColor);
                let _ = err.flush();
            }
            self.pending = true;
        }
    }

    /// Wipes a pending status line so the next stderr text starts on a clean line.
    pub fn clear<E: Write>(&mut self, err: &mut E) {
        if !self.pending {
            return;
        }
        #[cfg(feature = "stats")]
        {
            let _ = write!(err, "\r{}", crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine));
            let _ = err.flush();
        }
        self.pending = false;
    }
}

/// Runs every (rows, groups, engine) experiment, writing one result line per experiment to `out`.
///
/// Any failure, an invalid group count or an engine error, ends the whole sweep.
pub fn run_sweep<W: Write>(cfg: &SweepCfg, out: &mut W) -> Result<Vec<Measurement>> {
    let mut status = StatusLine::for_stderr(cfg.verbose);
    run_sweep_with(cfg, out, &mut std::io::stderr(), &mut status)
}

/// `run_sweep` with the progress sink supplied; a pending status line is cleared before any error returns.
pub fn run_sweep_with<W: Write, E: Write>(cfg: &SweepCfg, out: &mut W, err: &mut E, status: &mut StatusLine) -> Result<Vec<Measurement>> {
    let res = sweep_experiments(cfg, out, err, status);
    if res.is_err() {
        status.clear(err);
    }
    res
}

fn sweep_experiments<W: Write, E: Write>(cfg: &SweepCfg, out: &mut W, err: &mut E, status: &mut StatusLine) -> Result<Vec<Measurement>> {
    let seed = cfg.seed.unwrap_or_else(|| rand::thread_rng().gen());
    if cfg.verbose > 0 {
        writeln!(err, "seed: {}  trials: {}  engines: {}  query: {}", seed, cfg.trials, cfg.engines, cfg.query)?;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let engines = cfg.engines.enabled();
    let mut results = Vec::with_capacity(cfg.rows.len() * cfg.groups.len() * engines.len());

    for &rows in &cfg.rows {
        for spec in &cfg.groups {
            let groups = spec.resolve(rows)?;

            status.show(err, &format!("generating {} rows with {} groups", rows, groups));
            let start_gen = Instant::now();
            let ds = Dataset::generate(rows, groups, &mut rng)?;
            if cfg.verbose > 1 {
                writeln!(err, "generated {} rows / {} groups in {:.3}s", rows, groups, start_gen.elapsed().as_secs_f64())?;
            }
            if let Some(path) = &cfg.write_csv {
                status.show(err, &format!("writing dataset to {}", path.display()));
                ds.write_csv(path, cfg.verbose)?;
            }

            for kind in &engines {
                let mut engine = kind.create(cfg.verbose)?;
                status.show(err, &format!("loading {} rows into {}", rows, engine.name()));
                engine.load(&ds)?;
                status.show(err, &format!("timing {} at {} rows / {} groups", engine.name(), rows, groups));
                let timing = timeit(cfg.trials, || engine.aggregate(&ds, &cfg.query))?;
                status.clear(err);

                let m = Measurement { rows, groups, engine: engine.name(), timing };
                writeln!(out, "{}", m.tsv_line())?;
                out.flush()?;
                if cfg.verbose > 0 {
                    writeln!(err, "{} trials: [{}]  min: {:.3}  max: {:.3}  cpu: {:.3}",
                        m.engine,
                        join(m.timing.samples().iter().map(|d| format!("{:.3}", d.as_secs_f64())), ","),
                        m.timing.min().as_secs_f64(),
                        m.timing.max().as_secs_f64(),
                        m.timing.cpu().as_secs_f64())?;
                }
                results.push(m);
            }
        }
    }
    Ok(results)
}
