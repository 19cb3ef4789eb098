use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A second call (tests, embedded use) keeps the first subscriber.
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    pub command_count: usize,
    pub entity_count: usize,
    pub area_count: usize,
}

impl TickMetrics {
    /// Log at warn when the tick overran `budget_us`, debug otherwise.
    pub fn log(&self, budget_us: u128) {
        if self.over_budget(budget_us) {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                commands = self.command_count,
                entities = self.entity_count,
                areas = self.area_count,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                budget_us
            );
        } else {
            tracing::debug!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                commands = self.command_count,
                entities = self.entity_count,
                areas = self.area_count,
                "tick completed"
            );
        }
    }

    pub fn over_budget(&self, budget_us: u128) -> bool {
        self.duration_us > budget_us
    }
}
