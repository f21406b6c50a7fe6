//! Device analysis models for large-signal simulation.
//!
//! This module provides a model for every supported device kind:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source (time-dependent waveforms)
//! - Nonlinear: Diode, BJT
//! - Controlled: VCCS, VCVS, CCCS, CCVS
//! - Composite: Subcircuit instance
//!
//! Every model implements [`LargeSignalDevice`] and writes into the equation
//! system only through the stampers it registered during initialization.

mod bjt;
mod controlled;
mod diode;
mod junction;
mod linear;
mod sources;
mod subcircuit;
mod waveform;

pub use bjt::{Bjt, BjtParams, BjtPolarity};
pub use controlled::{Cccs, Ccvs, Vccs, Vcvs};
pub use diode::{Diode, DiodeParams};
pub use junction::{critical_voltage, depletion_capacitance, junction_current, limit_junction_voltage};
pub use linear::{Capacitor, Inductor, Resistor};
pub use sources::{CurrentSource, VoltageSource};
pub use subcircuit::SubcircuitModel;
pub use waveform::{AmParams, ExpParams, PulseParams, PwlParams, SffmParams, SinParams, Waveform};

use crate::circuit::{Device, DeviceId, DeviceKind};
use crate::error::{Result, SpiceError};
use crate::solver::{EquationBuilder, EquationEditor, SimulationContext, SolutionView};

/// Large-signal behavior of one device.
///
/// The orchestrator calls the hooks in this order:
/// 1. `register_additional_variables` once, before the adapter is frozen
/// 2. `initialize` once, binding proxies through the stampers
/// 3. per iteration: `apply_model_values`, then `on_equation_solved`
/// 4. `on_step_committed` after each accepted DC bias or time step
pub trait LargeSignalDevice {
    /// Allocate extra unknowns such as branch currents.
    fn register_additional_variables(&mut self, _builder: &mut dyn EquationBuilder) -> Result<()> {
        Ok(())
    }

    /// Bind the stampers. The adapter is still open.
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()>;

    /// Stamp the companion model around the current guess.
    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()>;

    /// Read back the solution and update the guess for the next iteration.
    fn on_equation_solved(&mut self, _solution: &dyn SolutionView, _ctx: &mut SimulationContext) {}

    /// Persist state after an accepted solution.
    fn on_step_committed(&mut self, _ctx: &SimulationContext) {}

    /// Branch-current variable owned by a voltage-defined device.
    fn branch_variable(&self) -> Option<usize> {
        None
    }

    /// Named scalar for reporting.
    fn probe(&self, _name: &str) -> Option<f64> {
        None
    }
}

/// Information available to devices while they bind their proxies.
#[derive(Debug, Clone, Copy)]
pub struct InitContext<'a> {
    pub simulation: &'a SimulationContext,
    /// Branch variable of every sibling device, indexed by [`DeviceId`]
    pub branches: &'a [Option<usize>],
}

impl<'a> InitContext<'a> {
    pub fn new(simulation: &'a SimulationContext, branches: &'a [Option<usize>]) -> Self {
        Self {
            simulation,
            branches,
        }
    }

    /// Branch variable of the referenced ammeter.
    pub fn branch_of(&self, device: &str, reference: DeviceId) -> Result<usize> {
        self.branches
            .get(reference.index())
            .copied()
            .flatten()
            .ok_or_else(|| {
                SpiceError::unresolved_reference(device, reference, "referenced device has no branch variable")
            })
    }
}

/// Unwrap a slot bound by `initialize`.
pub(crate) fn bound<T: Copy>(slot: Option<T>) -> Result<T> {
    slot.ok_or(SpiceError::AdapterNotFrozen)
}

/// Analysis model of any supported device.
#[derive(Debug, Clone)]
pub enum DeviceModel {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Diode(Diode),
    Bjt(Bjt),
    Vccs(Vccs),
    Vcvs(Vcvs),
    Cccs(Cccs),
    Ccvs(Ccvs),
    Subcircuit(SubcircuitModel),
}

macro_rules! dispatch {
    ($value:expr, $model:ident => $body:expr) => {
        match $value {
            DeviceModel::Resistor($model) => $body,
            DeviceModel::Capacitor($model) => $body,
            DeviceModel::Inductor($model) => $body,
            DeviceModel::VoltageSource($model) => $body,
            DeviceModel::CurrentSource($model) => $body,
            DeviceModel::Diode($model) => $body,
            DeviceModel::Bjt($model) => $body,
            DeviceModel::Vccs($model) => $body,
            DeviceModel::Vcvs($model) => $body,
            DeviceModel::Cccs($model) => $body,
            DeviceModel::Ccvs($model) => $body,
            DeviceModel::Subcircuit($model) => $body,
        }
    };
}

/// Convert a terminal list into a fixed-arity node array.
fn terminals<const N: usize>(device: &Device, label: &str) -> Result<[usize; N]> {
    let nodes: Vec<usize> = device.terminals.iter().map(|n| n.index()).collect();
    let actual = nodes.len();
    nodes.try_into().map_err(|_| SpiceError::WrongTerminalCount {
        device: label.to_string(),
        expected: N,
        actual,
    })
}

impl DeviceModel {
    /// Create the analysis model for the device at `id` in `siblings`.
    ///
    /// Current-controlled sources are resolved against `siblings` here so
    /// stamping never has to look devices up.
    pub fn from_device(id: DeviceId, device: &Device, siblings: &[Device]) -> Result<Self> {
        let label = device.label(id);
        device.validate(&label)?;

        let model = match &device.kind {
            DeviceKind::Resistor { resistance } => {
                DeviceModel::Resistor(Resistor::new(terminals(device, &label)?, *resistance))
            }
            DeviceKind::Capacitor {
                capacitance,
                initial_voltage,
            } => DeviceModel::Capacitor(Capacitor::new(
                terminals(device, &label)?,
                *capacitance,
                *initial_voltage,
            )),
            DeviceKind::Inductor {
                inductance,
                initial_current,
            } => DeviceModel::Inductor(Inductor::new(
                terminals(device, &label)?,
                *inductance,
                *initial_current,
            )),
            DeviceKind::VoltageSource(waveform) => {
                DeviceModel::VoltageSource(VoltageSource::new(terminals(device, &label)?, waveform.clone()))
            }
            DeviceKind::CurrentSource(waveform) => {
                DeviceModel::CurrentSource(CurrentSource::new(terminals(device, &label)?, waveform.clone()))
            }
            DeviceKind::Diode(params) => {
                DeviceModel::Diode(Diode::new(label.clone(), terminals(device, &label)?, params.clone()))
            }
            DeviceKind::Bjt(params) => {
                DeviceModel::Bjt(Bjt::new(label.clone(), terminals(device, &label)?, params.clone()))
            }
            DeviceKind::Vccs { transconductance } => {
                DeviceModel::Vccs(Vccs::new(terminals(device, &label)?, *transconductance))
            }
            DeviceKind::Vcvs { gain } => DeviceModel::Vcvs(Vcvs::new(terminals(device, &label)?, *gain)),
            DeviceKind::Cccs { gain, ammeter } => {
                device.check_reference(id, *ammeter, siblings)?;
                DeviceModel::Cccs(Cccs::new(label.clone(), terminals(device, &label)?, *ammeter, *gain))
            }
            DeviceKind::Ccvs {
                transresistance,
                ammeter,
            } => {
                device.check_reference(id, *ammeter, siblings)?;
                DeviceModel::Ccvs(Ccvs::new(
                    label.clone(),
                    terminals(device, &label)?,
                    *ammeter,
                    *transresistance,
                ))
            }
            DeviceKind::Subcircuit(definition) => {
                let nodes = device.terminals.iter().map(|n| n.index()).collect();
                DeviceModel::Subcircuit(SubcircuitModel::new(definition.clone(), nodes)?)
            }
        };
        Ok(model)
    }

    /// Whether the model linearizes around the last solution.
    pub fn is_nonlinear(&self) -> bool {
        match self {
            DeviceModel::Diode(_) | DeviceModel::Bjt(_) => true,
            DeviceModel::Subcircuit(s) => s.is_nonlinear(),
            _ => false,
        }
    }
}

/// Create one model per device, preserving order so handles stay valid.
pub fn instantiate_models(devices: &[Device]) -> Result<Vec<DeviceModel>> {
    devices
        .iter()
        .enumerate()
        .map(|(i, device)| DeviceModel::from_device(DeviceId(i), device, devices))
        .collect()
}

impl LargeSignalDevice for DeviceModel {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        dispatch!(self, m => m.register_additional_variables(builder))
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        dispatch!(self, m => m.initialize(builder, ctx))
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        dispatch!(self, m => m.apply_model_values(editor, ctx))
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, ctx: &mut SimulationContext) {
        dispatch!(self, m => m.on_equation_solved(solution, ctx))
    }

    fn on_step_committed(&mut self, ctx: &SimulationContext) {
        dispatch!(self, m => m.on_step_committed(ctx))
    }

    fn branch_variable(&self) -> Option<usize> {
        dispatch!(self, m => m.branch_variable())
    }

    fn probe(&self, name: &str) -> Option<f64> {
        dispatch!(self, m => m.probe(name))
    }
}

/// Run the registration protocol over a device list.
///
/// First every device allocates its extra variables, then every device
/// binds its proxies knowing the branch variables of its siblings.
pub(crate) fn initialize_all<D: LargeSignalDevice>(
    devices: &mut [D],
    builder: &mut dyn EquationBuilder,
    simulation: &SimulationContext,
) -> Result<()> {
    for device in devices.iter_mut() {
        device.register_additional_variables(builder)?;
    }
    let branches: Vec<Option<usize>> = devices.iter().map(|d| d.branch_variable()).collect();
    let ctx = InitContext::new(simulation, &branches);
    for device in devices.iter_mut() {
        device.initialize(builder, &ctx)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::solver::{EquationSystemAdapter, SimulationParameters};

    /// Drives a handful of devices through the model protocol without the
    /// full orchestrator.
    pub struct Harness {
        pub context: SimulationContext,
        adapter: EquationSystemAdapter<f64>,
        initialized: bool,
    }

    impl Harness {
        pub fn new(node_count: usize) -> Self {
            Self {
                context: SimulationContext::new(node_count, SimulationParameters::default()),
                adapter: EquationSystemAdapter::new(node_count),
                initialized: false,
            }
        }

        /// One stamp/solve/read-back pass. Initializes on first use.
        pub fn run(&mut self, devices: &mut [&mut dyn LargeSignalDevice]) -> Result<()> {
            if !self.initialized {
                for device in devices.iter_mut() {
                    device.register_additional_variables(&mut self.adapter)?;
                }
                let branches: Vec<Option<usize>> = devices.iter().map(|d| d.branch_variable()).collect();
                let init = InitContext::new(&self.context, &branches);
                for device in devices.iter_mut() {
                    device.initialize(&mut self.adapter, &init)?;
                }
                self.adapter.freeze()?;
                self.initialized = true;
            }

            self.context.begin_iteration();
            self.adapter.clear();
            for device in devices.iter_mut() {
                device.apply_model_values(&mut self.adapter, &self.context)?;
            }
            self.adapter.pin_zero(0)?;
            self.adapter.solve()?;
            for device in devices.iter_mut() {
                device.on_equation_solved(&self.adapter, &mut self.context);
            }
            Ok(())
        }

        /// Repeat [`run`](Self::run) until no device objects. Returns the pass count.
        pub fn converge(&mut self, devices: &mut [&mut dyn LargeSignalDevice], max: usize) -> Result<usize> {
            for pass in 1..=max {
                self.run(devices)?;
                if self.context.is_converged() {
                    return Ok(pass);
                }
            }
            Err(SpiceError::IterationCountExceeded { iterations: max })
        }

        pub fn commit(&mut self, devices: &mut [&mut dyn LargeSignalDevice]) {
            for device in devices.iter_mut() {
                device.on_step_committed(&self.context);
            }
        }

        pub fn voltage(&self, index: usize) -> f64 {
            self.adapter.solution_value(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeId;

    fn device(kind: DeviceKind, nodes: &[usize]) -> Device {
        Device::new(kind, nodes.iter().copied().map(NodeId).collect())
    }

    #[test]
    fn test_models_follow_definition_order() {
        let devices = vec![
            device(DeviceKind::dc_voltage(5.0), &[1, 0]),
            device(DeviceKind::resistor(10.0), &[1, 2]),
            device(
                DeviceKind::Cccs {
                    gain: 2.0,
                    ammeter: DeviceId(0),
                },
                &[2, 0],
            ),
        ];
        let models = instantiate_models(&devices).unwrap();
        assert_eq!(models.len(), 3);
        assert!(matches!(models[0], DeviceModel::VoltageSource(_)));
        assert!(matches!(models[2], DeviceModel::Cccs(_)));
        assert!(!models[1].is_nonlinear());
    }

    #[test]
    fn test_ammeter_must_be_an_earlier_voltage_source() {
        let devices = vec![
            device(DeviceKind::resistor(10.0), &[1, 0]),
            device(
                DeviceKind::Ccvs {
                    transresistance: 2.0,
                    ammeter: DeviceId(0),
                },
                &[1, 0],
            ),
        ];
        let err = instantiate_models(&devices).unwrap_err();
        assert!(matches!(err, SpiceError::UnresolvedReference { reference: DeviceId(0), .. }));

        let devices = vec![
            device(
                DeviceKind::Cccs {
                    gain: 1.0,
                    ammeter: DeviceId(1),
                },
                &[1, 0],
            ),
            device(DeviceKind::dc_voltage(1.0), &[1, 0]),
        ];
        assert!(instantiate_models(&devices).is_err());
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let devices = vec![device(DeviceKind::resistor(10.0), &[1, 2, 0])];
        let err = instantiate_models(&devices).unwrap_err();
        assert!(matches!(
            err,
            SpiceError::WrongTerminalCount {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }
}
