use std::time::{Duration, Instant};

use crate::command::{CommandStream, LastWriterWins};

/// Tick loop configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second.
    pub tps: u32,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tps: 10,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delta_secs())
    }

    /// Simulated seconds per tick.
    pub fn delta_secs(&self) -> f64 {
        1.0 / self.tps.max(1) as f64
    }

    pub fn budget_us(&self) -> u128 {
        self.tick_duration().as_micros()
    }
}

/// Monotonic simulation clock. Every time-based rule compares against `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimClock {
    /// Simulated seconds since start.
    pub now: f64,
    /// Simulated seconds added per tick.
    pub delta: f64,
    pub tick: u64,
}

impl SimClock {
    pub fn new(delta: f64) -> Self {
        Self {
            now: 0.0,
            delta,
            tick: 0,
        }
    }

    pub fn advance(&mut self) {
        self.now += self.delta;
        self.tick += 1;
    }
}

/// A world the tick loop can drive.
pub trait Simulation {
    type Command: LastWriterWins + Clone;

    fn apply(&mut self, cmd: Self::Command, clock: &SimClock);

    /// Advance the world by one tick.
    fn advance(&mut self, clock: &SimClock);

    fn entity_count(&self) -> usize;

    fn area_count(&self) -> usize {
        1
    }
}

/// Fixed-step driver: owns the simulation, its inbound command stream and the clock.
pub struct TickLoop<S: Simulation> {
    pub sim: S,
    pub commands: CommandStream<S::Command>,
    pub clock: SimClock,
    pub config: TickConfig,
}

impl<S: Simulation> TickLoop<S> {
    pub fn new(config: TickConfig, sim: S) -> Self {
        Self {
            sim,
            commands: CommandStream::new(),
            clock: SimClock::new(config.delta_secs()),
            config,
        }
    }

    /// Same as [`TickLoop::new`] but with an explicit simulated step, for tests
    /// that want whole-second ticks regardless of tps.
    pub fn with_delta(config: TickConfig, sim: S, delta: f64) -> Self {
        Self {
            clock: SimClock::new(delta),
            ..Self::new(config, sim)
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.clock.tick
    }

    /// Execute a single tick: clock → resolve commands → apply → advance → metrics.
    pub fn step(&mut self) -> observability::TickMetrics {
        let start = Instant::now();

        self.clock.advance();

        let resolved = self.commands.resolve();
        let command_count = resolved.commands.len();
        self.commands.clear();

        for cmd in resolved.commands {
            self.sim.apply(cmd, &self.clock);
        }

        self.sim.advance(&self.clock);
        tracing::trace!(tick = self.clock.tick, commands = command_count, "tick advanced");

        observability::TickMetrics {
            tick_number: self.clock.tick,
            duration_us: start.elapsed().as_micros(),
            command_count,
            entity_count: self.sim.entity_count(),
            area_count: self.sim.area_count(),
        }
    }

    /// Run the tick loop until `max_ticks` (forever when 0), sleeping to hold the rate.
    pub fn run(&mut self) -> Vec<observability::TickMetrics> {
        let mut all_metrics = Vec::new();
        let tick_duration = self.config.tick_duration();
        let budget = self.config.budget_us();

        loop {
            if self.config.max_ticks > 0 && self.clock.tick >= self.config.max_ticks {
                break;
            }

            let tick_start = Instant::now();
            let metrics = self.step();
            metrics.log(budget);
            all_metrics.push(metrics);

            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }

        all_metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Add(u32, i64);

    impl LastWriterWins for Add {
        type Key = u32;
        fn lww_key(&self) -> Option<u32> {
            Some(self.0)
        }
    }

    #[derive(Default)]
    struct Counter {
        total: i64,
        advanced: Vec<f64>,
    }

    impl Simulation for Counter {
        type Command = Add;

        fn apply(&mut self, cmd: Add, _clock: &SimClock) {
            self.total += cmd.1;
        }

        fn advance(&mut self, clock: &SimClock) {
            self.advanced.push(clock.now);
        }

        fn entity_count(&self) -> usize {
            0
        }
    }

    #[test]
    fn tick_config_defaults() {
        let config = TickConfig::default();
        assert_eq!(config.tps, 10);
        assert_eq!(config.tick_duration().as_millis(), 100);
        assert_eq!(config.budget_us(), 100_000);
    }

    #[test]
    fn single_step() {
        let mut tick_loop = TickLoop::new(TickConfig::default(), Counter::default());
        let metrics = tick_loop.step();
        assert_eq!(metrics.tick_number, 1);
        assert_eq!(metrics.command_count, 0);
        assert_eq!(metrics.area_count, 1);
        assert!((tick_loop.clock.now - 0.1).abs() < 1e-9);
    }

    #[test]
    fn commands_resolved_then_cleared() {
        let mut tick_loop = TickLoop::with_delta(TickConfig::default(), Counter::default(), 1.0);
        tick_loop.commands.push(Add(1, 5));
        tick_loop.commands.push(Add(1, 7));
        tick_loop.commands.push(Add(2, 1));

        let metrics = tick_loop.step();
        assert_eq!(metrics.command_count, 2);
        assert_eq!(tick_loop.sim.total, 8);
        assert!(tick_loop.commands.is_empty());

        tick_loop.step();
        assert_eq!(tick_loop.sim.total, 8);
        assert_eq!(tick_loop.sim.advanced, vec![1.0, 2.0]);
    }

    #[test]
    fn run_honours_max_ticks() {
        let config = TickConfig {
            tps: 1000,
            max_ticks: 5,
        };
        let mut tick_loop = TickLoop::new(config, Counter::default());
        let metrics = tick_loop.run();
        assert_eq!(metrics.len(), 5);
        assert_eq!(tick_loop.current_tick(), 5);
    }
}
