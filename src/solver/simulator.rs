//! Main simulator interface.

use log::debug;

use crate::circuit::{CircuitDefinition, Device, DeviceId};
use crate::components::{initialize_all, instantiate_models, DeviceModel, LargeSignalDevice};
use crate::error::{Result, SpiceError};

use super::adapter::{EquationBuilder, EquationSystemAdapter};
use super::context::SimulationContext;
use super::integration::IntegrationMethod;
use super::newton::NewtonRaphson;
use super::scalar::Scalar;
use super::{DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_RELATIVE_TOLERANCE, MIN_CONDUCTANCE};

/// Configuration for the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    /// Absolute tolerance for node voltages and device currents
    pub absolute_tolerance: f64,
    /// Relative tolerance for node voltages and device currents
    pub relative_tolerance: f64,
    /// Maximum Newton-Raphson iterations per DC pass or time step
    pub max_iterations: usize,
    /// Conductance added in parallel to every PN junction
    pub minimal_conductance: f64,
    /// Discretization of capacitors and inductors
    pub integration_method: IntegrationMethod,
    /// Device temperature in degrees Celsius
    pub temperature: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            minimal_conductance: MIN_CONDUCTANCE,
            integration_method: IntegrationMethod::default(),
            temperature: crate::NOMINAL_TEMPERATURE,
        }
    }
}

impl SimulationParameters {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absolute_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_tolerance = tolerance;
        self
    }

    pub fn with_relative_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_tolerance = tolerance;
        self
    }

    /// Set the Newton-Raphson iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_minimal_conductance(mut self, conductance: f64) -> Self {
        self.minimal_conductance = conductance;
        self
    }

    pub fn with_integration_method(mut self, method: IntegrationMethod) -> Self {
        self.integration_method = method;
        self
    }

    /// Set the temperature in degrees Celsius.
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = celsius;
        self
    }

    /// Reject values the solver cannot work with.
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("absolute_tolerance", self.absolute_tolerance),
            ("relative_tolerance", self.relative_tolerance),
            ("minimal_conductance", self.minimal_conductance),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SpiceError::invalid_simulation_param(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(SpiceError::invalid_simulation_param(
                "max_iterations must be at least 1",
            ));
        }
        // Below absolute zero the thermal voltage turns negative
        if !self.temperature.is_finite() || self.temperature <= -273.15 {
            return Err(SpiceError::invalid_simulation_param(format!(
                "temperature must be above absolute zero, got {} C",
                self.temperature
            )));
        }
        self.integration_method.validate()
    }
}

/// Lifecycle of a [`LargeSignalCircuitModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationState {
    /// Models exist, no variables allocated yet
    #[default]
    Uninitialized,
    /// Variables are being allocated and proxies bound
    Initializing,
    /// Newton-Raphson iterations in progress
    Iterating,
    /// Last DC bias or time step was accepted
    Converged,
}

/// Last accepted point, kept while a call is in flight.
#[derive(Debug)]
struct Checkpoint {
    devices: Vec<DeviceModel>,
    solution: Vec<f64>,
    node_voltages: Vec<f64>,
    time: f64,
    time_step: f64,
}

/// Large-signal analysis of one circuit: DC operating point followed by
/// transient steps of caller-chosen size.
#[derive(Debug)]
pub struct LargeSignalCircuitModel<T: Scalar = f64> {
    definition: CircuitDefinition,
    devices: Vec<DeviceModel>,
    adapter: EquationSystemAdapter<T>,
    context: SimulationContext,
    newton: NewtonRaphson,
    state: SimulationState,
    /// Node voltages of the last accepted solution, ground included
    node_voltages: Vec<f64>,
    /// Every variable of the last accepted solution
    solution: Vec<f64>,
    has_bias: bool,
    last_iteration_count: usize,
    total_iteration_count: usize,
}

impl LargeSignalCircuitModel<f64> {
    /// Create the model with the double-precision backend.
    pub fn new(definition: CircuitDefinition, params: SimulationParameters) -> Result<Self> {
        Self::with_backend(definition, params)
    }
}

impl<T: Scalar> LargeSignalCircuitModel<T> {
    /// Create the model computing in `T`. Every device gets its analysis
    /// model and current-controlled sources are resolved to their ammeters.
    pub fn with_backend(definition: CircuitDefinition, params: SimulationParameters) -> Result<Self> {
        params.validate()?;
        let devices = instantiate_models(definition.devices())?;
        let node_count = definition.node_count();
        let newton = NewtonRaphson::new(params.max_iterations);
        debug!(
            "Created model with {} nodes, {} devices ({} nonlinear)",
            node_count,
            devices.len(),
            devices.iter().filter(|d| d.is_nonlinear()).count()
        );

        Ok(Self {
            definition,
            devices,
            adapter: EquationSystemAdapter::new(node_count),
            context: SimulationContext::new(node_count, params),
            newton,
            state: SimulationState::Uninitialized,
            node_voltages: vec![0.0; node_count],
            solution: Vec::new(),
            has_bias: false,
            last_iteration_count: 0,
            total_iteration_count: 0,
        })
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.context.params
    }

    pub fn definition(&self) -> &CircuitDefinition {
        &self.definition
    }

    /// Node voltages of the last accepted solution. Index 0 is ground.
    pub fn node_voltages(&self) -> &[f64] {
        &self.node_voltages
    }

    /// Simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.time
    }

    /// Step that led to the current time, 0 at the DC operating point.
    pub fn time_step(&self) -> f64 {
        self.context.time_step
    }

    /// Iterations used by the last successful call.
    pub fn last_iteration_count(&self) -> usize {
        self.last_iteration_count
    }

    /// Iterations used since the last DC bias, that bias included.
    pub fn total_iteration_count(&self) -> usize {
        self.total_iteration_count
    }

    /// Number of unknowns, 0 before the first analysis.
    pub fn variable_count(&self) -> usize {
        self.adapter.system().map_or(0, |s| s.size())
    }

    pub fn find_device(&self, tag: &str) -> Option<DeviceId> {
        self.definition.find_device(tag)
    }

    /// Definition of the device at `id`.
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.definition.device(id)
    }

    /// Analysis model of the device at `id`.
    pub fn device_model(&self, id: DeviceId) -> Option<&DeviceModel> {
        self.devices.get(id.index())
    }

    /// Named value reported by a device, such as `"I"` or `"VBE"`.
    pub fn probe(&self, id: DeviceId, name: &str) -> Option<f64> {
        self.device_model(id)?.probe(name)
    }

    /// Allocate variables, bind proxies and freeze the equation system.
    fn ensure_initialized(&mut self) -> Result<()> {
        if self.adapter.is_frozen() {
            return Ok(());
        }
        self.state = SimulationState::Initializing;
        initialize_all(&mut self.devices, &mut self.adapter, &self.context)?;
        self.adapter.freeze()?;
        debug!(
            "Initialized {} variables for {} nodes",
            self.adapter.variable_count(),
            self.definition.node_count()
        );
        Ok(())
    }

    fn iterate(&mut self) -> Result<usize> {
        self.state = SimulationState::Iterating;
        let result = self.newton.solve(
            &mut self.devices,
            &mut self.adapter,
            &mut self.context,
            &mut self.solution,
        );
        let nodes = self.node_voltages.len();
        self.node_voltages.copy_from_slice(&self.solution[..nodes]);
        result
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            devices: self.devices.clone(),
            solution: self.solution.clone(),
            node_voltages: self.node_voltages.clone(),
            time: self.context.time,
            time_step: self.context.time_step,
        }
    }

    /// Return to the last accepted point after a failed call, device
    /// guesses included.
    fn restore(&mut self, checkpoint: Checkpoint) {
        self.devices = checkpoint.devices;
        self.solution = checkpoint.solution;
        self.node_voltages = checkpoint.node_voltages;
        self.context.time = checkpoint.time;
        self.context.time_step = checkpoint.time_step;
        self.context.initial_conditions = false;
        self.state = if self.has_bias {
            SimulationState::Converged
        } else {
            SimulationState::Uninitialized
        };
    }

    fn commit(&mut self) {
        for device in self.devices.iter_mut() {
            device.on_step_committed(&self.context);
        }
        self.total_iteration_count += self.last_iteration_count;
        self.state = SimulationState::Converged;
    }

    /// Find the DC operating point and reset the time to 0.
    ///
    /// Initial conditions are applied in a first pass: nodes with an initial
    /// voltage are held there, capacitors at their initial voltage and
    /// inductors at their initial current. Unless `use_initial_conditions`
    /// is set, a second unconstrained pass then finds the true operating
    /// point. The reported iteration count is the sum of both passes.
    ///
    /// Calling it again on a converged bias returns the same node voltages
    /// after a single iteration.
    pub fn establish_dc_bias(&mut self, use_initial_conditions: bool) -> Result<()> {
        self.ensure_initialized()?;
        let checkpoint = self.checkpoint();
        self.context.time = 0.0;
        self.context.time_step = 0.0;

        match self.solve_dc(use_initial_conditions) {
            Ok(iterations) => {
                self.total_iteration_count = 0;
                self.last_iteration_count = iterations;
                self.has_bias = true;
                self.commit();
                debug!("DC bias established in {iterations} iterations");
                Ok(())
            }
            Err(e) => {
                self.restore(checkpoint);
                Err(e)
            }
        }
    }

    fn solve_dc(&mut self, use_initial_conditions: bool) -> Result<usize> {
        let mut iterations = 0;
        if self.definition.has_initial_conditions() {
            for (node, voltage) in self.definition.initial_conditions() {
                self.newton.pin(node, voltage);
            }
            self.context.initial_conditions = true;
            let result = self.iterate();
            self.context.initial_conditions = false;
            self.newton.release_pins();
            iterations += result?;
            debug!("Initial-condition pass took {iterations} iterations");
            if use_initial_conditions {
                return Ok(iterations);
            }
        }
        iterations += self.iterate()?;
        Ok(iterations)
    }

    /// Advance the transient simulation by `time_step` seconds.
    ///
    /// Establishes the DC bias first when none exists. On failure the time,
    /// node voltages and device state of the last accepted point are kept.
    pub fn advance_in_time(&mut self, time_step: f64) -> Result<()> {
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(SpiceError::InvalidTimeStep { time_step });
        }
        if !self.has_bias {
            self.establish_dc_bias(false)?;
        }

        let checkpoint = self.checkpoint();
        self.context.time += time_step;
        self.context.time_step = time_step;

        match self.iterate() {
            Ok(iterations) => {
                self.last_iteration_count = iterations;
                self.commit();
                debug!(
                    "Step to t={:e} converged in {iterations} iterations",
                    self.context.time
                );
                Ok(())
            }
            Err(e) => {
                self.restore(checkpoint);
                Err(e)
            }
        }
    }
}
