use std::fmt;
use std::time::Instant;

/// Timed phases of one simulation step.
#[derive(Clone, Copy, Debug)]
pub enum Section {
    BuildTree = 0,
    Reduce = 1,
    Forces = 2,
    Integrate = 3,
    Store = 4,
}

const SECTION_LABELS: [&str; 5] = [
    "octree creation",
    "center of mass calculation",
    "applying forces calculation",
    "update pos/vel/acc",
    "position store",
];

/// Wall-clock accumulator over the named sections of the step loop.
///
/// The report averages per iteration, in milliseconds.
#[derive(Clone, Debug, Default)]
pub struct Profiler {
    elapsed_ms: [f64; 5],
    iterations: usize,
}

impl Profiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work`, charging its wall time to `section`.
    pub fn time<R>(&mut self, section: Section, work: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = work();
        self.elapsed_ms[section as usize] += start.elapsed().as_secs_f64() * 1e3;
        result
    }

    pub fn finish_iteration(&mut self) {
        self.iterations += 1;
    }

    #[must_use]
    pub fn section_ms(&self, section: Section) -> f64 {
        self.elapsed_ms[section as usize]
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iterations = self.iterations.max(1) as f64;
        let mut overall = 0.0;

        writeln!(f, "all times in milliseconds per iteration")?;
        for (label, elapsed) in SECTION_LABELS.iter().zip(self.elapsed_ms) {
            let average = elapsed / iterations;
            overall += average;
            writeln!(f, "{label}: {average:.3}")?;
        }
        write!(f, "overall: {overall:.3}")
    }
}
