use std::io::{BufWriter, Write};
use std::time::Instant;

use cpu_time::ProcessTime;
use prettytable::{format, Cell, Row, Table};

use gb_bench::sweep::{run_sweep, Measurement};

mod cli;

use cli::get_cli;

#[cfg(not(target_os = "windows"))]
#[global_allocator]
pub static GLOBAL_TRACKER: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
pub static GLOBAL_TRACKER: std::alloc::System = std::alloc::System;

fn main() {
    if let Err(err) = bench() {
        eprintln!("error: {}", &err);
        std::process::exit(1);
    }
}

fn print_table(results: &[Measurement]) {
    let mut celltable = Table::new();
    celltable.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    celltable.set_titles(Row::new(
        ["rows", "groups", "engine", "median", "min", "max", "cpu"].iter().map(|t| Cell::new(t)).collect(),
    ));
    for m in results {
        celltable.add_row(Row::new(vec![
            Cell::new(&m.rows.to_string()),
            Cell::new(&m.groups.to_string()),
            Cell::new(m.engine),
            Cell::new(&format!("{:.3}", m.timing.secs())),
            Cell::new(&format!("{:.3}", m.timing.min().as_secs_f64())),
            Cell::new(&format!("{:.3}", m.timing.max().as_secs_f64())),
            Cell::new(&format!("{:.3}", m.timing.cpu().as_secs_f64())),
        ]));
    }
    celltable.printstd();
}

fn bench() -> Result<(), Box<dyn std::error::Error>> {
    let start_f = Instant::now();
    let startcpu = ProcessTime::now();

    let cfg = get_cli()?;

    rayon::ThreadPoolBuilder::new().num_threads(cfg.threads).build_global()?;
    if cfg.verbose >= 1 {
        eprintln!("Global allocator: {}", std::any::type_name_of_val(&GLOBAL_TRACKER));
        eprintln!("rayon pool threads: {}", rayon::current_num_threads());
    }

    let sweep = cfg.sweep_cfg();
    let results = if cfg.table {
        let results = run_sweep(&sweep, &mut std::io::sink())?;
        print_table(&results);
        results
    } else {
        let stdout = std::io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        let results = run_sweep(&sweep, &mut writer)?;
        writer.flush()?;
        results
    };

    if cfg.verbose >= 1 {
        eprintln!("{} experiments  elapsed: {:.3}s  cpu: {:.3}s",
            results.len(),
            start_f.elapsed().as_secs_f64(),
            startcpu.elapsed().as_secs_f64());
    }
    Ok(())
}
