//! Newton-Raphson iteration over the device models.

use log::{trace, warn};

use crate::components::LargeSignalDevice;
use crate::error::{Result, SpiceError};

use super::adapter::{EquationBuilder, EquationSystemAdapter, StoredSolution};
use super::context::SimulationContext;
use super::scalar::Scalar;
use super::INITIAL_CONDITION_CONDUCTANCE;

/// Newton-Raphson solver for one operating point.
///
/// Each iteration rebuilds the equation system from scratch: every device
/// stamps its companion model around the previous solution, the system is
/// solved and the devices read the new solution back. The point is accepted
/// once no device objected and every node voltage moved less than the
/// tolerance.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Nodes held at a fixed voltage, used for initial conditions
    pinned: Vec<(usize, f64)>,
}

impl NewtonRaphson {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            pinned: Vec::new(),
        }
    }

    /// Hold `node` at `voltage` in every following solve.
    pub fn pin(&mut self, node: usize, voltage: f64) {
        self.pinned.push((node, voltage));
    }

    pub fn release_pins(&mut self) {
        self.pinned.clear();
    }

    /// Iterate until convergence, updating `solution` with every variable
    /// of each solve. Node voltages, the first `ctx.node_count` entries,
    /// decide convergence.
    ///
    /// At DC the stored solution is accepted without a solve when it already
    /// satisfies the assembled system and no device objects, so repeating a
    /// converged bias leaves it untouched.
    ///
    /// Returns the number of iterations used.
    pub fn solve<T, D>(
        &self,
        devices: &mut [D],
        adapter: &mut EquationSystemAdapter<T>,
        ctx: &mut SimulationContext,
        solution: &mut Vec<f64>,
    ) -> Result<usize>
    where
        T: Scalar,
        D: LargeSignalDevice,
    {
        solution.resize(adapter.variable_count(), 0.0);
        let nodes = ctx.node_count.min(solution.len());

        for iteration in 1..=self.max_iterations {
            ctx.begin_iteration();
            adapter.clear();
            for device in devices.iter_mut() {
                device.apply_model_values(adapter, ctx)?;
            }

            // Ground is the reference
            adapter.pin_zero(0)?;
            for &(node, voltage) in &self.pinned {
                adapter.hold_value(node, voltage, INITIAL_CONDITION_CONDUCTANCE)?;
            }

            if iteration == 1 && ctx.is_dc() && Self::holds(devices, adapter, ctx, solution) {
                trace!("Stored solution satisfies the system at t={:e}", ctx.time);
                return Ok(iteration);
            }

            if adapter.solve()?.iter().any(|v| !v.is_finite()) {
                warn!("Non-finite solution at t={:e}, iteration {iteration}", ctx.time);
                return Err(SpiceError::NaNInSolution);
            }

            for device in devices.iter_mut() {
                device.on_equation_solved(&*adapter, ctx);
            }

            let mut max_change = 0.0f64;
            let mut settled = true;
            for (index, value) in solution.iter_mut().enumerate() {
                let solved = adapter.solution_value(index);
                if index < nodes {
                    max_change = max_change.max((solved - *value).abs());
                    if !ctx.in_tolerance(*value, solved) {
                        settled = false;
                    }
                }
                *value = solved;
            }
            trace!("Iteration {iteration}: max node change {max_change:e}");
            if !settled {
                ctx.report_not_converged("node voltages");
            }

            if ctx.is_converged() {
                return Ok(iteration);
            }
        }

        warn!(
            "No convergence within {} iterations at t={:e}",
            self.max_iterations, ctx.time
        );
        Err(SpiceError::IterationCountExceeded {
            iterations: self.max_iterations,
        })
    }

    /// Whether `solution` satisfies the stamped system and every device
    /// accepts it as its operating point.
    fn holds<T, D>(
        devices: &mut [D],
        adapter: &EquationSystemAdapter<T>,
        ctx: &mut SimulationContext,
        solution: &[f64],
    ) -> bool
    where
        T: Scalar,
        D: LargeSignalDevice,
    {
        let (relative, absolute) = (ctx.params.relative_tolerance, ctx.params.absolute_tolerance);
        if !adapter.is_satisfied_by(solution, relative, absolute) {
            return false;
        }
        let stored = StoredSolution::new(adapter, solution);
        for device in devices.iter_mut() {
            device.on_equation_solved(&stored, ctx);
        }
        ctx.is_converged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        CurrentSource, DeviceModel, Diode, DiodeParams, InitContext, Resistor, VoltageSource, Waveform,
    };
    use crate::solver::SimulationParameters;
    use approx::assert_abs_diff_eq;

    fn setup(
        devices: &mut [DeviceModel],
        node_count: usize,
    ) -> (EquationSystemAdapter<f64>, SimulationContext) {
        let ctx = SimulationContext::new(node_count, SimulationParameters::default());
        let mut adapter = EquationSystemAdapter::new(node_count);
        for device in devices.iter_mut() {
            device.register_additional_variables(&mut adapter).unwrap();
        }
        let branches: Vec<Option<usize>> = devices.iter().map(|d| d.branch_variable()).collect();
        let init = InitContext::new(&ctx, &branches);
        for device in devices.iter_mut() {
            device.initialize(&mut adapter, &init).unwrap();
        }
        adapter.freeze().unwrap();
        (adapter, ctx)
    }

    #[test]
    fn test_linear_network_settles_on_second_pass() {
        let mut devices = vec![
            DeviceModel::CurrentSource(CurrentSource::new([0, 1], Waveform::Constant(2.0))),
            DeviceModel::Resistor(Resistor::new([1, 0], 5.0)),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 2);
        let mut solution = Vec::new();

        let newton = NewtonRaphson::new(10);
        let iterations = newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_eq!(iterations, 2);
        assert_eq!(solution.len(), 2);
        assert_eq!(solution[0], 0.0);
        assert_abs_diff_eq!(solution[1], 10.0, epsilon = 1e-12);

        // Already at the fixed point
        let iterations = newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_eq!(iterations, 1);
    }

    #[test]
    fn test_converged_diode_point_is_kept_exactly() {
        let mut devices = vec![
            DeviceModel::CurrentSource(CurrentSource::new([0, 1], Waveform::Constant(1e-3))),
            DeviceModel::Diode(Diode::new("D1".into(), [1, 0], DiodeParams::default())),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 2);
        let mut solution = Vec::new();

        let newton = NewtonRaphson::new(100);
        assert!(newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap() > 2);
        let first = solution.clone();

        let iterations = newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_eq!(iterations, 1);
        assert_eq!(solution, first);
    }

    #[test]
    fn test_stored_solution_is_only_kept_at_dc() {
        let mut devices = vec![
            DeviceModel::CurrentSource(CurrentSource::new([0, 1], Waveform::Constant(2.0))),
            DeviceModel::Resistor(Resistor::new([1, 0], 5.0)),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 2);
        let newton = NewtonRaphson::new(10);

        // Within tolerance of the exact 10 V
        let mut solution = vec![0.0, 10.0001];
        assert_eq!(newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap(), 1);
        assert_eq!(solution[1], 10.0001);

        ctx.time_step = 1e-3;
        assert_eq!(newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap(), 1);
        assert_abs_diff_eq!(solution[1], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pinned_node_follows_target() {
        let mut devices = vec![
            DeviceModel::Resistor(Resistor::new([1, 2], 1.0)),
            DeviceModel::Resistor(Resistor::new([2, 0], 1.0)),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 3);
        let mut solution = Vec::new();

        let mut newton = NewtonRaphson::new(10);
        newton.pin(1, 4.0);
        newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_abs_diff_eq!(solution[1], 4.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution[2], 2.0, epsilon = 1e-9);

        newton.release_pins();
        newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_abs_diff_eq!(solution[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pin_on_a_driven_node_stays_solvable() {
        // Node 1 is already fixed by the source branch
        let mut devices = vec![
            DeviceModel::VoltageSource(VoltageSource::new([1, 0], Waveform::Constant(2.0))),
            DeviceModel::Resistor(Resistor::new([1, 0], 2.0)),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 2);
        let mut solution = Vec::new();

        let mut newton = NewtonRaphson::new(10);
        newton.pin(1, 2.0);
        newton.solve(&mut devices, &mut adapter, &mut ctx, &mut solution).unwrap();
        assert_eq!(solution.len(), 3);
        assert!(solution.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(solution[1], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution[2], -1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_iteration_cap_is_fatal() {
        let mut devices = vec![
            DeviceModel::CurrentSource(CurrentSource::new([0, 1], Waveform::Constant(1.0))),
            DeviceModel::Diode(Diode::new("D1".into(), [1, 0], DiodeParams::default())),
        ];
        let (mut adapter, mut ctx) = setup(&mut devices, 2);
        let mut solution = Vec::new();

        let err = NewtonRaphson::new(2)
            .solve(&mut devices, &mut adapter, &mut ctx, &mut solution)
            .unwrap_err();
        assert_eq!(err, SpiceError::IterationCountExceeded { iterations: 2 });
    }
}
