//! State shared between the orchestrator and the device models.

use log::trace;

use super::simulator::SimulationParameters;

/// Time, step and tolerances visible to devices during an iteration.
///
/// Devices only read it, except for clearing the convergence flag through
/// [`report_not_converged`](Self::report_not_converged).
#[derive(Debug, Clone)]
pub struct SimulationContext {
    /// Current simulation time in seconds
    pub time: f64,
    /// Step that led to `time`, 0 while establishing the DC bias
    pub time_step: f64,
    /// Number of outer circuit nodes, ground included
    pub node_count: usize,
    /// Simulation-wide parameters
    pub params: SimulationParameters,
    /// Set during the DC pass that holds initial conditions
    pub initial_conditions: bool,
    converged: bool,
}

impl SimulationContext {
    pub fn new(node_count: usize, params: SimulationParameters) -> Self {
        Self {
            time: 0.0,
            time_step: 0.0,
            node_count,
            params,
            initial_conditions: false,
            converged: true,
        }
    }

    /// True while solving for the DC operating point.
    pub fn is_dc(&self) -> bool {
        self.time_step == 0.0
    }

    /// Thermal voltage at the configured temperature.
    pub fn thermal_voltage(&self) -> f64 {
        crate::thermal_voltage(self.params.temperature)
    }

    /// Request another iteration.
    pub fn report_not_converged(&mut self, device: &str) {
        trace!("Device {device} not converged at t={:e}", self.time);
        self.converged = false;
    }

    /// Whether no device or node objected during the current pass.
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.converged = true;
    }

    /// Tolerance check `|a - b| < abs_tol + rel_tol * max(|a|, |b|)`.
    pub fn in_tolerance(&self, a: f64, b: f64) -> bool {
        let tol = self.params.relative_tolerance * a.abs().max(b.abs())
            + self.params.absolute_tolerance;
        (a - b).abs() < tol
    }
}
