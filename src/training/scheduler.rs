//! Learning Rate Scheduler Module
//!
//! Per-step schedules (one-cycle, constant) drive the optimizer inside an
//! epoch; reduce-on-plateau and early stopping react to validation metrics
//! at epoch boundaries.

use std::f64::consts::PI;

/// A learning rate that advances once per optimizer step
pub trait StepScheduler {
    /// Learning rate for the next optimizer step
    fn lr(&self) -> f64;

    /// Advance by one optimizer step
    fn step(&mut self);
}

/// One-cycle policy with cosine annealing
///
/// Starts at `max_lr / div_factor`, rises to `max_lr` over the first
/// `pct_start` of the steps, then anneals to
/// `initial_lr / final_div_factor` at the last step.
#[derive(Debug, Clone)]
pub struct OneCycleLr {
    max_lr: f64,
    initial_lr: f64,
    min_lr: f64,
    warmup_end: f64,
    last_step: f64,
    step_num: usize,
}

impl OneCycleLr {
    pub fn new(max_lr: f64, total_steps: usize, pct_start: f64) -> Self {
        Self::with_factors(max_lr, total_steps, pct_start, 25.0, 1e4)
    }

    pub fn with_factors(
        max_lr: f64,
        total_steps: usize,
        pct_start: f64,
        div_factor: f64,
        final_div_factor: f64,
    ) -> Self {
        let initial_lr = max_lr / div_factor;
        Self {
            max_lr,
            initial_lr,
            min_lr: initial_lr / final_div_factor,
            warmup_end: pct_start * total_steps as f64 - 1.0,
            last_step: total_steps as f64 - 1.0,
            step_num: 0,
        }
    }

    /// Learning rate at an arbitrary step
    pub fn lr_at(&self, step: usize) -> f64 {
        let step = step as f64;
        if step <= self.warmup_end {
            let pct = if self.warmup_end > 0.0 {
                step / self.warmup_end
            } else {
                1.0
            };
            cosine_anneal(self.initial_lr, self.max_lr, pct)
        } else {
            let span = self.last_step - self.warmup_end;
            let pct = if span > 0.0 {
                ((step - self.warmup_end) / span).min(1.0)
            } else {
                1.0
            };
            cosine_anneal(self.max_lr, self.min_lr, pct)
        }
    }

    pub fn current_step(&self) -> usize {
        self.step_num
    }
}

impl StepScheduler for OneCycleLr {
    fn lr(&self) -> f64 {
        self.lr_at(self.step_num)
    }

    fn step(&mut self) {
        self.step_num += 1;
    }
}

fn cosine_anneal(start: f64, end: f64, pct: f64) -> f64 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

/// Constant learning rate, adjustable between epochs
#[derive(Debug, Clone)]
pub struct ConstantLr {
    lr: f64,
}

impl ConstantLr {
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.lr = lr;
    }
}

impl StepScheduler for ConstantLr {
    fn lr(&self) -> f64 {
        self.lr
    }

    fn step(&mut self) {}
}

/// State for reduce-on-plateau scheduler
#[derive(Debug, Clone)]
pub struct ReduceOnPlateauState {
    best_metric: f64,
    epochs_without_improvement: usize,
    current_lr: f64,
    reduction_factor: f64,
    patience: usize,
    min_lr: f64,
    mode: PlateauMode,
    reduced: bool,
}

/// Mode for plateau detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., accuracy)
    Max,
}

impl ReduceOnPlateauState {
    pub fn new(
        initial_lr: f64,
        reduction_factor: f64,
        patience: usize,
        min_lr: f64,
        mode: PlateauMode,
    ) -> Self {
        let best_metric = match mode {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        };

        Self {
            best_metric,
            epochs_without_improvement: 0,
            current_lr: initial_lr,
            reduction_factor,
            patience,
            min_lr,
            mode,
            reduced: false,
        }
    }

    /// Update with a new metric value and return the learning rate to use next
    pub fn step(&mut self, metric: f64) -> f64 {
        self.reduced = false;
        let improved = match self.mode {
            PlateauMode::Min => metric < self.best_metric,
            PlateauMode::Max => metric > self.best_metric,
        };

        if improved {
            self.best_metric = metric;
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;

            if self.epochs_without_improvement >= self.patience {
                let new_lr = (self.current_lr * self.reduction_factor).max(self.min_lr);
                if new_lr < self.current_lr {
                    self.current_lr = new_lr;
                    self.reduced = true;
                }
                self.epochs_without_improvement = 0;
            }
        }

        self.current_lr
    }

    pub fn get_lr(&self) -> f64 {
        self.current_lr
    }

    /// Whether the last `step` lowered the learning rate
    pub fn lr_was_reduced(&self) -> bool {
        self.reduced
    }
}

/// Early stopping on a minimized metric with best-snapshot restore
#[derive(Debug, Clone)]
pub struct EarlyStopping<S> {
    patience: usize,
    best_metric: f64,
    best_epoch: Option<usize>,
    wait: usize,
    best_snapshot: Option<S>,
}

impl<S> EarlyStopping<S> {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_metric: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            best_snapshot: None,
        }
    }

    /// Record an epoch's metric; returns true when training should stop
    ///
    /// `snapshot` is only called when the metric improves.
    pub fn observe<F: FnOnce() -> S>(&mut self, epoch: usize, metric: f64, snapshot: F) -> bool {
        if metric < self.best_metric {
            self.best_metric = metric;
            self.best_epoch = Some(epoch);
            self.best_snapshot = Some(snapshot());
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn best_metric(&self) -> f64 {
        self.best_metric
    }

    /// Hand back the best snapshot, if any epoch improved
    pub fn into_best(self) -> Option<S> {
        self.best_snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_one_cycle_hundred_steps() {
        let schedule = OneCycleLr::new(10.0, 100, 0.1);

        assert!(close(schedule.lr_at(0), 0.4, 1e-12));
        assert!(close(schedule.lr_at(9), 10.0, 1e-12));
        assert!(close(schedule.lr_at(99), 4e-5, 1e-12));
        // Monotone on both sides of the peak
        assert!(schedule.lr_at(5) > schedule.lr_at(4));
        assert!(schedule.lr_at(50) < schedule.lr_at(20));
    }

    #[test]
    fn test_one_cycle_steps_through_trait() {
        let mut schedule = OneCycleLr::new(1e-3, 20, 0.1);
        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.push(schedule.lr());
            schedule.step();
        }
        assert_eq!(schedule.current_step(), 20);
        assert!(close(seen[0], 1e-3 / 25.0, 1e-15));
        assert!(close(seen[1], 1e-3, 1e-15));
        // Past the last step the schedule stays at its floor
        assert!(close(schedule.lr(), seen[19], 1e-18));
    }

    #[test]
    fn test_one_cycle_degenerate_lengths() {
        let schedule = OneCycleLr::new(1.0, 1, 0.1);
        assert!(schedule.lr_at(0).is_finite());

        let schedule = OneCycleLr::new(1.0, 0, 0.3);
        assert!(schedule.lr_at(0).is_finite());
    }

    #[test]
    fn test_constant_lr() {
        let mut schedule = ConstantLr::new(1e-4);
        schedule.step();
        assert_eq!(schedule.lr(), 1e-4);
        schedule.set_lr(5e-5);
        assert_eq!(schedule.lr(), 5e-5);
    }

    #[test]
    fn test_reduce_on_plateau() {
        let mut state = ReduceOnPlateauState::new(0.1, 0.5, 3, 1e-6, PlateauMode::Min);

        // Metric improves
        assert_eq!(state.step(1.0), 0.1);
        assert_eq!(state.step(0.9), 0.1);
        assert_eq!(state.step(0.8), 0.1);

        // Metric stagnates
        assert_eq!(state.step(0.85), 0.1);
        assert_eq!(state.step(0.86), 0.1);
        assert_eq!(state.step(0.87), 0.05);
        assert!(state.lr_was_reduced());
        assert_eq!(state.step(0.7), 0.05);
        assert!(!state.lr_was_reduced());
    }

    #[test]
    fn test_reduce_on_plateau_respects_floor() {
        let mut state = ReduceOnPlateauState::new(2e-7, 0.5, 1, 1e-7, PlateauMode::Min);
        state.step(1.0);
        assert_eq!(state.step(1.0), 1e-7);
        assert_eq!(state.step(1.0), 1e-7);
        assert!(!state.lr_was_reduced());
    }

    #[test]
    fn test_early_stopping_keeps_best_snapshot() {
        let mut stopper = EarlyStopping::new(2);

        assert!(!stopper.observe(1, 0.9, || "e1"));
        assert!(!stopper.observe(2, 0.5, || "e2"));
        assert!(!stopper.observe(3, 0.6, || "e3"));
        assert!(stopper.observe(4, 0.55, || "e4"));

        assert_eq!(stopper.best_epoch(), Some(2));
        assert_eq!(stopper.into_best(), Some("e2"));
    }
}
