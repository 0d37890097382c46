use std::hint::black_box;
use std::time::{Duration, Instant};

use cpu_time::ProcessTime;

/// Wall-clock samples of one timed operation plus the process cpu time spent on them.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    samples: Vec<Duration>,
    cpu: Duration,
}

impl Timing {
    pub fn median(&self) -> Duration {
        median(&self.samples)
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().min().copied().unwrap_or_default()
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or_default()
    }

    pub fn cpu(&self) -> Duration {
        self.cpu
    }

    pub fn samples(&self) -> &[Duration] {
        &self.samples
    }

    /// Median in fractional seconds, the unit the result lines are printed in.
    pub fn secs(&self) -> f64 {
        self.median().as_secs_f64()
    }
}

/// Middle value of the sorted samples; the mean of the two middle values for an even count.
pub fn median(samples: &[Duration]) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2
    }
}

/// Runs `op` `trials` times (at least once) and records the wall time of each run.
///
/// The first error returned by `op` ends the measurement and is handed back untouched.
pub fn timeit<T, E, F>(trials: usize, mut op: F) -> Result<Timing, E>
    where F: FnMut() -> Result<T, E>
{
    let trials = trials.max(1);
    let mut samples = Vec::with_capacity(trials);
    let startcpu = ProcessTime::now();
    for _ in 0..trials {
        let start = Instant::now();
        let out = op()?;
        samples.push(start.elapsed());
        black_box(out);
    }
    Ok(Timing { samples, cpu: startcpu.elapsed() })
}
