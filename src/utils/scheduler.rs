//! Hyperparameter schedulers
//!
//! A scheduler produces a multiplicative decay factor in `(0, 1]` that evolves
//! once per epoch. The same policies drive three hyperparameters, each with its
//! own scheduler instance so they evolve independently:
//!
//! - learning rate: `lr = initial_lr * factor`
//! - momentum: `momentum = max_momentum - (max_momentum - initial_momentum) * factor`
//!   (the momentum climbs towards its maximum as the factor decays)
//! - batch size: `batch = min(round(initial_batch / factor), cap)`
//!   (the batch grows as the factor decays)

use serde::{Deserialize, Serialize};

/// Scheduler policy, as named in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    /// Constant hyperparameter.
    #[default]
    None,
    /// `factor = e^(-value * floor(epoch / delay))`
    Exponential,
    /// `factor = value^(-floor(epoch / delay))`
    Step,
    /// `factor /= value` each time the validation loss stagnated for a
    /// multiple of `delay` epochs.
    Plateau,
}

/// Core trait for schedulers.
///
/// Call [`step`](Scheduler::step) once at the end of every epoch, then read the
/// factor to use for the next epoch.
///
/// # Example
///
/// ```ignore
/// let mut scheduler = StepDecay::new(2.0, 3);
/// for epoch in 1..=max_epoch {
///     // ... train one epoch ...
///     scheduler.step(epoch, stagnation);
///     let lr = initial_lr * scheduler.factor();
/// }
/// ```
pub trait Scheduler: std::fmt::Debug + Send {
    /// Current decay factor.
    fn factor(&self) -> f64;

    /// Advances the scheduler past `epoch`.
    ///
    /// `stagnation` is the number of consecutive epochs without validation
    /// improvement (zero right after an improvement).
    fn step(&mut self, epoch: usize, stagnation: usize);
}

/// Scheduler that never decays.
#[derive(Debug, Clone, Default)]
pub struct NoDecay;

impl Scheduler for NoDecay {
    fn factor(&self) -> f64 {
        1.0
    }

    fn step(&mut self, _epoch: usize, _stagnation: usize) {}
}

/// Exponential decay applied every `delay` epochs.
///
/// Formula: factor = e^(-value * floor(epoch / delay))
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    value: f64,
    delay: usize,
    factor: f64,
}

impl ExponentialDecay {
    /// Creates a new exponential decay scheduler.
    ///
    /// # Arguments
    ///
    /// * `value` - Decay rate (must be positive)
    /// * `delay` - Number of epochs between decays (must be > 0)
    pub fn new(value: f64, delay: usize) -> Self {
        Self {
            value,
            delay: delay.max(1),
            factor: 1.0,
        }
    }
}

impl Scheduler for ExponentialDecay {
    fn factor(&self) -> f64 {
        self.factor
    }

    fn step(&mut self, epoch: usize, _stagnation: usize) {
        let decays = (epoch / self.delay) as f64;
        self.factor = (-self.value * decays).exp();
    }
}

/// Step decay: divides by `value` every `delay` epochs.
///
/// Formula: factor = value^(-floor(epoch / delay))
///
/// # Example
///
/// ```ignore
/// let mut scheduler = StepDecay::new(2.0, 3);
/// scheduler.step(3, 0);
/// assert_eq!(scheduler.factor(), 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct StepDecay {
    value: f64,
    delay: usize,
    factor: f64,
}

impl StepDecay {
    /// Creates a new step decay scheduler.
    ///
    /// # Arguments
    ///
    /// * `value` - Divisor applied at each step (> 1 to decay)
    /// * `delay` - Number of epochs between steps (must be > 0)
    pub fn new(value: f64, delay: usize) -> Self {
        Self {
            value,
            delay: delay.max(1),
            factor: 1.0,
        }
    }
}

impl Scheduler for StepDecay {
    fn factor(&self) -> f64 {
        self.factor
    }

    fn step(&mut self, epoch: usize, _stagnation: usize) {
        let steps = (epoch / self.delay) as i32;
        self.factor = self.value.powi(-steps);
    }
}

/// Decays only when the validation loss stagnates.
///
/// Every time the stagnation counter reaches a positive multiple of `delay`,
/// the factor is divided by `value`.
#[derive(Debug, Clone)]
pub struct PlateauDecay {
    value: f64,
    delay: usize,
    factor: f64,
}

impl PlateauDecay {
    pub fn new(value: f64, delay: usize) -> Self {
        Self {
            value,
            delay: delay.max(1),
            factor: 1.0,
        }
    }
}

impl Scheduler for PlateauDecay {
    fn factor(&self) -> f64 {
        self.factor
    }

    fn step(&mut self, _epoch: usize, stagnation: usize) {
        if stagnation > 0 && stagnation % self.delay == 0 {
            self.factor /= self.value;
        }
    }
}

/// Builds the scheduler for a configured policy.
pub fn build_scheduler(kind: SchedulerKind, value: f64, delay: usize) -> Box<dyn Scheduler> {
    match kind {
        SchedulerKind::None => Box::new(NoDecay),
        SchedulerKind::Exponential => Box::new(ExponentialDecay::new(value, delay)),
        SchedulerKind::Step => Box::new(StepDecay::new(value, delay)),
        SchedulerKind::Plateau => Box::new(PlateauDecay::new(value, delay)),
    }
}

/// Learning rate driven by a scheduler.
#[derive(Debug)]
pub struct LearningRateSchedule {
    initial: f64,
    scheduler: Box<dyn Scheduler>,
}

impl LearningRateSchedule {
    pub fn new(initial: f64, scheduler: Box<dyn Scheduler>) -> Self {
        Self { initial, scheduler }
    }

    pub fn value(&self) -> f64 {
        self.initial * self.scheduler.factor()
    }

    pub fn step(&mut self, epoch: usize, stagnation: usize) {
        self.scheduler.step(epoch, stagnation);
    }
}

/// Momentum climbing from its initial value towards `max`.
#[derive(Debug)]
pub struct MomentumSchedule {
    initial: f64,
    max: f64,
    scheduler: Box<dyn Scheduler>,
}

impl MomentumSchedule {
    pub fn new(initial: f64, max: f64, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            initial,
            max,
            scheduler,
        }
    }

    pub fn value(&self) -> f64 {
        self.max - (self.max - self.initial) * self.scheduler.factor()
    }

    pub fn step(&mut self, epoch: usize, stagnation: usize) {
        self.scheduler.step(epoch, stagnation);
    }
}

/// Batch size growing from its initial value up to `cap`.
#[derive(Debug)]
pub struct BatchSizeSchedule {
    initial: usize,
    cap: usize,
    scheduler: Box<dyn Scheduler>,
}

impl BatchSizeSchedule {
    /// `cap` is raised to `initial` if smaller, so the schedule never shrinks
    /// the configured batch size.
    pub fn new(initial: usize, cap: usize, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            initial,
            cap: cap.max(initial),
            scheduler,
        }
    }

    pub fn value(&self) -> usize {
        let factor = self.scheduler.factor().max(f64::MIN_POSITIVE);
        let grown = (self.initial as f64 / factor).round();
        if grown >= self.cap as f64 {
            self.cap
        } else {
            (grown as usize).max(1)
        }
    }

    pub fn step(&mut self, epoch: usize, stagnation: usize) {
        self.scheduler.step(epoch, stagnation);
    }
}
