//! Time-integration strategies for reactive devices.
//!
//! A reactive device tracks one state variable `x` (capacitor voltage or
//! inductor current) and needs its derivative at the new time point. Each
//! method approximates it as an affine function of the unknown new value:
//!
//! ```text
//! x'(n+1) = alpha * x(n+1) + beta
//! ```
//!
//! where `alpha` and `beta` depend on the step size and the history. For a
//! capacitor `i = C * x'` which gives the companion conductance `C * alpha`
//! and equivalent current `C * beta`.

use std::collections::VecDeque;

use crate::error::{Result, SpiceError};

/// Highest supported Gear (BDF) order.
pub const MAX_GEAR_ORDER: usize = 6;

/// BDF coefficients `a_j`, with `h * x'(n+1) = sum a_j * x(n+1-j)`.
const GEAR_COEFFICIENTS: [&[f64]; MAX_GEAR_ORDER] = [
    &[1.0, -1.0],
    &[3.0 / 2.0, -2.0, 1.0 / 2.0],
    &[11.0 / 6.0, -3.0, 3.0 / 2.0, -1.0 / 3.0],
    &[25.0 / 12.0, -4.0, 3.0, -4.0 / 3.0, 1.0 / 4.0],
    &[137.0 / 60.0, -5.0, 5.0, -10.0 / 3.0, 5.0 / 4.0, -1.0 / 5.0],
    &[147.0 / 60.0, -6.0, 15.0 / 2.0, -20.0 / 3.0, 15.0 / 4.0, -6.0 / 5.0, 1.0 / 6.0],
];

/// Relative tolerance when deciding whether history samples share the current step.
const STEP_MATCH_TOLERANCE: f64 = 1e-9;

/// Simulation-wide integration method.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum IntegrationMethod {
    /// First order, uses only the last accepted value
    BackwardEuler,
    /// Second order, uses the last value and derivative
    #[default]
    Trapezoidal,
    /// Backward differentiation of the given order
    Gear { order: usize },
}

impl IntegrationMethod {
    /// Check the method configuration.
    pub fn validate(&self) -> Result<()> {
        match *self {
            IntegrationMethod::Gear { order } if !(2..=MAX_GEAR_ORDER).contains(&order) => {
                Err(SpiceError::invalid_simulation_param(format!(
                    "Gear order must be between 2 and {MAX_GEAR_ORDER}, got {order}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Number of past samples the method can use.
    pub fn history_depth(&self) -> usize {
        match *self {
            IntegrationMethod::BackwardEuler | IntegrationMethod::Trapezoidal => 1,
            IntegrationMethod::Gear { order } => order.clamp(1, MAX_GEAR_ORDER),
        }
    }

    /// Companion coefficients `(alpha, beta)` for a step of size `time_step`.
    ///
    /// An empty history behaves as a zero initial state.
    pub fn coefficients(&self, history: &StateHistory, time_step: f64) -> (f64, f64) {
        let h = time_step;
        let last = history.latest();
        match *self {
            IntegrationMethod::BackwardEuler => (1.0 / h, -last.value / h),
            IntegrationMethod::Trapezoidal => {
                (2.0 / h, -2.0 * last.value / h - last.derivative)
            }
            IntegrationMethod::Gear { order } => {
                let order = history.usable_order(order.clamp(1, MAX_GEAR_ORDER), h);
                let a = GEAR_COEFFICIENTS[order - 1];
                let beta = a[1..]
                    .iter()
                    .zip(history.samples())
                    .map(|(coefficient, sample)| coefficient * sample.value)
                    .sum::<f64>();
                (a[0] / h, beta / h)
            }
        }
    }

    /// Companion pair `(g_eq, i_eq)` for a device whose flow is `scale * x'`.
    pub fn companion(&self, history: &StateHistory, time_step: f64, scale: f64) -> (f64, f64) {
        let (alpha, beta) = self.coefficients(history, time_step);
        (scale * alpha, scale * beta)
    }
}

/// One accepted point of a state variable.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateSample {
    pub value: f64,
    pub derivative: f64,
    /// Step that led to this sample, 0 for the DC operating point
    pub time_step: f64,
}

/// Rolling buffer of accepted samples, newest first.
#[derive(Debug, Clone)]
pub struct StateHistory {
    samples: VecDeque<StateSample>,
    capacity: usize,
}

impl StateHistory {
    /// Create a history holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a history sized for `method`.
    pub fn for_method(method: &IntegrationMethod) -> Self {
        Self::new(method.history_depth())
    }

    /// Drop everything and start from a steady state at `value`.
    pub fn reset(&mut self, value: f64) {
        self.samples.clear();
        self.samples.push_front(StateSample {
            value,
            derivative: 0.0,
            time_step: 0.0,
        });
    }

    /// Record an accepted sample.
    pub fn push(&mut self, value: f64, derivative: f64, time_step: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_back();
        }
        self.samples.push_front(StateSample {
            value,
            derivative,
            time_step,
        });
    }

    /// Most recent sample, zero state when empty.
    pub fn latest(&self) -> StateSample {
        self.samples.front().copied().unwrap_or_default()
    }

    /// Samples from newest to oldest.
    pub fn samples(&self) -> impl Iterator<Item = &StateSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Highest order up to `requested` whose samples are spaced by `time_step`.
    fn usable_order(&self, requested: usize, time_step: f64) -> usize {
        // Order k needs k samples and k-1 equal spacings between them
        let uniform_spacings = self
            .samples
            .iter()
            .take(requested.saturating_sub(1))
            .take_while(|s| (s.time_step - time_step).abs() <= STEP_MATCH_TOLERANCE * time_step)
            .count();
        requested.min(uniform_spacings + 1).min(self.samples.len().max(1))
    }
}
