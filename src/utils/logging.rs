use log::{Level, log_enabled, warn};
use std::time::{Duration, Instant};

/// Scoped profile zone. Emits trace lines on entry and exit with the elapsed time.
pub struct ScopedTimer<'a> {
    label: &'a str,
    context_id: u64,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str, context_id: u64) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("⏱️ start {label} [ctx {context_id}]");
        }
        Self {
            label,
            context_id,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!(
                "⏱️ end {} [ctx {}] ({} µs)",
                self.label,
                self.context_id,
                elapsed.as_micros()
            );
        }
    }
}

/// Warns when an island-generation pass exceeds its time budget.
pub fn warn_if_pass_budget_exceeded(label: &str, duration: Duration, budget_ms: f32) {
    if duration.as_secs_f32() * 1000.0 > budget_ms {
        warn!(
            "{label} exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f32() * 1000.0,
            budget_ms
        );
    }
}
