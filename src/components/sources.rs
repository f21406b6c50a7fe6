//! Independent voltage and current sources.

use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor, SimulationContext, SolutionView};
use crate::stamping::{CurrentStamper, VoltageProxy, VoltageStamper};

use super::waveform::Waveform;
use super::{bound, InitContext, LargeSignalDevice};

/// An independent voltage source.
///
/// Its branch current is the current flowing from the positive terminal
/// through the source to the negative terminal, so a source delivering
/// power reports a negative current.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub nodes: [usize; 2], // [positive, negative]
    pub waveform: Waveform,
    branch: Option<usize>,
    stamper: Option<VoltageStamper>,
    voltage: f64,
    current: f64,
}

impl VoltageSource {
    pub fn new(nodes: [usize; 2], waveform: Waveform) -> Self {
        let voltage = waveform.dc_value();
        Self {
            nodes,
            waveform,
            branch: None,
            stamper: None,
            voltage,
            current: 0.0,
        }
    }

    /// Voltage imposed in the last iteration.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Last solved branch current.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl LargeSignalDevice for VoltageSource {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        self.branch = Some(VoltageStamper::allocate(builder)?);
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, _ctx: &InitContext<'_>) -> Result<()> {
        let [p, n] = self.nodes;
        self.stamper = Some(VoltageStamper::register(builder, p, n, bound(self.branch)?)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        self.voltage = self.waveform.value_at(ctx.time);
        bound(self.stamper)?.stamp(editor, self.voltage)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let Some(stamper) = self.stamper {
            self.current = stamper.current(solution);
        }
    }

    fn branch_variable(&self) -> Option<usize> {
        self.branch
    }

    fn probe(&self, name: &str) -> Option<f64> {
        match name {
            "V" => Some(self.voltage),
            "I" => Some(self.current),
            _ => None,
        }
    }
}

/// An independent current source.
/// Current flows from the first terminal through the source into the second.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub nodes: [usize; 2],
    pub waveform: Waveform,
    stamper: Option<CurrentStamper>,
    voltage_proxy: Option<VoltageProxy>,
    current: f64,
    voltage: f64,
}

impl CurrentSource {
    pub fn new(nodes: [usize; 2], waveform: Waveform) -> Self {
        let current = waveform.dc_value();
        Self {
            nodes,
            waveform,
            stamper: None,
            voltage_proxy: None,
            current,
            voltage: 0.0,
        }
    }

    /// Current imposed in the last iteration.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Last solved voltage across the source.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }
}

impl LargeSignalDevice for CurrentSource {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, _ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        self.stamper = Some(CurrentStamper::register(builder, a, c)?);
        self.voltage_proxy = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        self.current = self.waveform.value_at(ctx.time);
        bound(self.stamper)?.stamp(editor, self.current)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let Some(proxy) = self.voltage_proxy {
            self.voltage = proxy.value(solution);
        }
    }

    fn probe(&self, name: &str) -> Option<f64> {
        match name {
            "V" => Some(self.voltage),
            "I" => Some(self.current),
            _ => None,
        }
    }
}
