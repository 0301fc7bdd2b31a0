//! Wall-clock statistics for update sub-steps.

use std::time::{Duration, Instant};

use tracing::info;

/// Collects per-step timings for one project update. Disabled
/// collectors cost two branch checks per step.
#[derive(Debug)]
pub(crate) struct Stats {
    enabled: bool,
    started: Instant,
    entries: Vec<(&'static str, Duration)>,
}

impl Stats {
    pub(crate) fn new(enabled: bool) -> Self {
        Stats { enabled, started: Instant::now(), entries: Vec::new() }
    }

    /// Times `step`, attributing its duration to `label`.
    pub(crate) fn time<T, E>(
        &mut self,
        label: &'static str,
        step: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if !self.enabled {
            return step();
        }
        let start = Instant::now();
        let result = step();
        self.entries.push((label, start.elapsed()));
        result
    }

    /// Logs every step plus residual and total times.
    pub(crate) fn report(&self, name: &str) {
        if !self.enabled {
            return;
        }
        let total = self.started.elapsed();
        let accounted: Duration = self.entries.iter().map(|(_, d)| *d).sum();
        info!("{name}: performance statistics:");
        for (label, duration) in &self.entries {
            info!("  {label}: {:.3} sec", duration.as_secs_f64());
        }
        info!("  other work: {:.3} sec", total.saturating_sub(accounted).as_secs_f64());
        info!("  TOTAL: {:.3} sec", total.as_secs_f64());
    }
}
