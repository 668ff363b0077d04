//! Fixed-timestep scheduling and command intake.
//!
//! The simulation itself only knows logical ticks. [`FixedTimestep`] maps
//! wall-clock time onto ticks: elapsed time is added to an accumulator and as
//! many whole ticks as fit are executed, the remainder carrying over to the
//! next frame. A frame that needs more ticks than the configured threshold is
//! reported as lag; the ticks still all run.
//!
//! Producer threads (input, network, AI) submit commands through a
//! [`CommandSender`]; the loop drains the matching [`CommandQueue`] once at
//! the start of every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::components::TankCommand;
use crate::config::SimConfig;
use crate::math::Fixed;
use crate::simulation::Simulation;
use crate::snapshot::Snapshot;

/// Convert a tick duration in seconds to a [`Duration`], rounding down to
/// whole nanoseconds. Non-positive values map to zero.
#[must_use]
pub fn tick_duration_to_std(seconds: Fixed) -> Duration {
    let bits = u128::try_from(seconds.to_bits()).unwrap_or(0);
    let nanos = (bits * 1_000_000_000) >> 32;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Cooperative stop flag shared between the loop and its controllers.
///
/// Checked between ticks only; a running tick always completes.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// A signal that is not yet raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop at the next tick boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sending half of the command channel. Cheap to clone, one per producer.
#[derive(Debug, Clone)]
pub struct CommandSender(Sender<TankCommand>);

impl CommandSender {
    /// Send a command. Returns `false` once the loop has shut down.
    pub fn send(&self, command: TankCommand) -> bool {
        self.0.send(command).is_ok()
    }
}

/// Receiving half of the command channel, owned by the simulation thread.
#[derive(Debug)]
pub struct CommandQueue(Receiver<TankCommand>);

impl CommandQueue {
    /// Create a connected sender/queue pair.
    #[must_use]
    pub fn channel() -> (CommandSender, Self) {
        let (tx, rx) = mpsc::channel();
        (CommandSender(tx), Self(rx))
    }

    /// Take every command currently waiting, in arrival order.
    #[must_use]
    pub fn drain(&self) -> Vec<TankCommand> {
        self.0.try_iter().collect()
    }

    /// Move every waiting command into the simulation's buffer.
    pub fn drain_into(&self, sim: &mut Simulation) {
        for command in self.0.try_iter() {
            sim.submit_command(command);
        }
    }
}

/// What one call to [`FixedTimestep::advance`] did.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Ticks executed this frame.
    pub ticks_run: u32,
    /// Snapshot of every executed tick, oldest first.
    pub snapshots: Vec<Arc<Snapshot>>,
    /// The frame needed more ticks than the lag threshold.
    pub lagged: bool,
    /// The stop signal cut the frame short.
    pub stopped: bool,
}

/// Accumulator-based fixed timestep.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
    lag_threshold: u32,
    lag_frames: u64,
}

impl FixedTimestep {
    /// Create a stepper for `tick_duration` seconds per tick.
    #[must_use]
    pub fn new(tick_duration: Fixed, lag_threshold: u32) -> Self {
        Self {
            step: tick_duration_to_std(tick_duration),
            accumulator: Duration::ZERO,
            lag_threshold,
            lag_frames: 0,
        }
    }

    /// Create a stepper from simulation configuration.
    #[must_use]
    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.tick_duration, config.lag_warning_ticks)
    }

    /// Wall-clock duration of one tick.
    #[must_use]
    pub const fn step(&self) -> Duration {
        self.step
    }

    /// Time carried over to the next frame.
    #[must_use]
    pub const fn accumulated(&self) -> Duration {
        self.accumulator
    }

    /// Frames so far that exceeded the lag threshold.
    #[must_use]
    pub const fn lag_frames(&self) -> u64 {
        self.lag_frames
    }

    /// Fraction of a tick accumulated but not yet simulated, in `[0, 1)`.
    ///
    /// Renderers interpolate between the last two snapshots by this amount.
    #[must_use]
    pub fn interpolation_alpha(&self) -> Fixed {
        let step = self.step.as_nanos();
        if step == 0 {
            return Fixed::ZERO;
        }
        let bits = (self.accumulator.as_nanos() << 32) / step;
        Fixed::from_bits(i64::try_from(bits).unwrap_or(i64::MAX))
    }

    /// Add `elapsed` wall-clock time and run every whole tick that fits.
    ///
    /// `drain` runs at the start of each tick to move pending input into the
    /// simulation, typically `|sim| queue.drain_into(sim)`. `stop` is checked
    /// after the drain, so the drain itself may end the loop before the tick.
    pub fn advance<F>(
        &mut self,
        sim: &mut Simulation,
        elapsed: Duration,
        stop: &StopSignal,
        mut drain: F,
    ) -> FrameReport
    where
        F: FnMut(&mut Simulation),
    {
        let mut report = FrameReport::default();
        if self.step.is_zero() {
            return report;
        }
        self.accumulator += elapsed;

        while self.accumulator >= self.step {
            drain(sim);
            if stop.is_stopped() {
                report.stopped = true;
                break;
            }
            report.snapshots.push(sim.tick());
            report.ticks_run += 1;
            self.accumulator -= self.step;
        }

        if report.ticks_run > self.lag_threshold {
            self.lag_frames += 1;
            report.lagged = true;
            tracing::warn!(
                ticks = report.ticks_run,
                threshold = self.lag_threshold,
                tick = sim.get_tick(),
                "Simulation falling behind wall clock"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fixed;
    use crate::simulation::TankSpawn;

    fn quarter_second_sim() -> Simulation {
        Simulation::new(SimConfig {
            tick_duration: Fixed::ONE / Fixed::from_num(4),
            lag_warning_ticks: 2,
            ..SimConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_tick_duration_conversion() {
        assert_eq!(
            tick_duration_to_std(Fixed::ONE / Fixed::from_num(4)),
            Duration::from_millis(250)
        );
        let sixtieth = tick_duration_to_std(Fixed::ONE / Fixed::from_num(60));
        assert_eq!(sixtieth.as_micros(), 16_666);
    }

    #[test]
    fn test_accumulator_carries_remainder() {
        let mut sim = quarter_second_sim();
        let mut stepper = FixedTimestep::from_config(sim.config());
        let stop = StopSignal::new();

        let report = stepper.advance(&mut sim, Duration::from_millis(600), &stop, |_| {});
        assert_eq!(report.ticks_run, 2);
        assert_eq!(stepper.accumulated(), Duration::from_millis(100));
        assert_eq!(stepper.interpolation_alpha(), Fixed::from_num(0.4));

        let report = stepper.advance(&mut sim, Duration::from_millis(150), &stop, |_| {});
        assert_eq!(report.ticks_run, 1);
        assert_eq!(sim.get_tick(), 3);
        assert_eq!(stepper.accumulated(), Duration::ZERO);
    }

    #[test]
    fn test_lag_is_reported_not_truncated() {
        let mut sim = quarter_second_sim();
        let mut stepper = FixedTimestep::from_config(sim.config());
        let report = stepper.advance(&mut sim, Duration::from_secs(2), &StopSignal::new(), |_| {});
        assert_eq!(report.ticks_run, 8);
        assert_eq!(report.snapshots.len(), 8);
        assert!(report.lagged);
        assert_eq!(stepper.lag_frames(), 1);
    }

    #[test]
    fn test_stop_signal_checked_between_ticks() {
        let mut sim = quarter_second_sim();
        let mut stepper = FixedTimestep::from_config(sim.config());
        let stop = StopSignal::new();
        stop.clone().stop();
        let report = stepper.advance(&mut sim, Duration::from_secs(1), &stop, |_| {});
        assert!(report.stopped);
        assert_eq!(report.ticks_run, 0);
        assert_eq!(sim.get_tick(), 0);
    }

    #[test]
    fn test_drain_can_end_the_frame() {
        let mut sim = quarter_second_sim();
        let mut stepper = FixedTimestep::from_config(sim.config());
        let stop = StopSignal::new();
        let report = stepper.advance(&mut sim, Duration::from_secs(1), &stop, |sim| {
            if sim.get_tick() == 2 {
                stop.stop();
            }
        });
        assert!(report.stopped);
        assert_eq!(report.ticks_run, 2);
        assert_eq!(sim.get_tick(), 2);
    }

    #[test]
    fn test_commands_from_other_threads_are_drained() {
        let mut sim = quarter_second_sim();
        let tank = sim
            .spawn_tank(TankSpawn::new(0, Vec2Fixed::from_ints(100, 100)))
            .unwrap();
        let (sender, queue) = CommandQueue::channel();

        std::thread::spawn(move || {
            assert!(sender.send(TankCommand::fire_only(tank)));
        })
        .join()
        .unwrap();

        let mut stepper = FixedTimestep::from_config(sim.config());
        let report = stepper.advance(&mut sim, Duration::from_millis(250), &StopSignal::new(), |sim| {
            queue.drain_into(sim);
        });
        let snapshot = &report.snapshots[0];
        assert!(snapshot
            .events
            .iter()
            .any(|e| matches!(e, crate::events::GameEvent::Fired { .. })));
        assert!(queue.drain().is_empty());
    }
}
