//! Linear controlled sources.
//!
//! Voltage-controlled sources read two control nodes directly. Current-
//! controlled sources sense the branch current of an "ammeter" voltage
//! source; the handle is checked when the model is built and turned into a
//! branch variable during initialization.

use crate::circuit::DeviceId;
use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor, SimulationContext, SolutionProxy, SolutionView};
use crate::stamping::{CccsStamper, CcvsStamper, VccsStamper, VcvsStamper, VoltageProxy, VoltageStamper};

use super::{bound, InitContext, LargeSignalDevice};

/// Voltage-controlled current source.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub nodes: [usize; 4], // [out+, out-, ctrl+, ctrl-]
    pub transconductance: f64,
    stamper: Option<VccsStamper>,
    control: Option<VoltageProxy>,
    output: Option<VoltageProxy>,
    current: f64,
    voltage: f64,
}

impl Vccs {
    pub fn new(nodes: [usize; 4], transconductance: f64) -> Self {
        Self {
            nodes,
            transconductance,
            stamper: None,
            control: None,
            output: None,
            current: 0.0,
            voltage: 0.0,
        }
    }
}

impl LargeSignalDevice for Vccs {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, _ctx: &InitContext<'_>) -> Result<()> {
        let [a, c, ra, rc] = self.nodes;
        self.stamper = Some(VccsStamper::register(builder, a, c, ra, rc)?);
        self.control = Some(VoltageProxy::register(builder, ra, rc)?);
        self.output = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        bound(self.stamper)?.stamp(editor, self.transconductance)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let (Some(control), Some(output)) = (self.control, self.output) {
            self.current = self.transconductance * control.value(solution);
            self.voltage = output.value(solution);
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

/// Voltage-controlled voltage source.
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub nodes: [usize; 4], // [out+, out-, ctrl+, ctrl-]
    pub gain: f64,
    branch: Option<usize>,
    stamper: Option<VcvsStamper>,
    output: Option<VoltageProxy>,
    current: f64,
    voltage: f64,
}

impl Vcvs {
    pub fn new(nodes: [usize; 4], gain: f64) -> Self {
        Self {
            nodes,
            gain,
            branch: None,
            stamper: None,
            output: None,
            current: 0.0,
            voltage: 0.0,
        }
    }
}

impl LargeSignalDevice for Vcvs {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        self.branch = Some(VoltageStamper::allocate(builder)?);
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, _ctx: &InitContext<'_>) -> Result<()> {
        let [a, c, ra, rc] = self.nodes;
        self.stamper = Some(VcvsStamper::register(builder, a, c, ra, rc, bound(self.branch)?)?);
        self.output = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        bound(self.stamper)?.stamp(editor, self.gain)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let (Some(stamper), Some(output)) = (self.stamper, self.output) {
            self.current = stamper.current(solution);
            self.voltage = output.value(solution);
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

/// Current-controlled current source.
#[derive(Debug, Clone)]
pub struct Cccs {
    pub label: String,
    pub nodes: [usize; 2],
    pub ammeter: DeviceId,
    pub gain: f64,
    sensed: Option<SolutionProxy>,
    stamper: Option<CccsStamper>,
    output: Option<VoltageProxy>,
    current: f64,
    voltage: f64,
}

impl Cccs {
    pub fn new(label: String, nodes: [usize; 2], ammeter: DeviceId, gain: f64) -> Self {
        Self {
            label,
            nodes,
            ammeter,
            gain,
            sensed: None,
            stamper: None,
            output: None,
            current: 0.0,
            voltage: 0.0,
        }
    }
}

impl LargeSignalDevice for Cccs {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        let reference = ctx.branch_of(&self.label, self.ammeter)?;
        self.sensed = Some(builder.solution_proxy(reference)?);
        self.stamper = Some(CccsStamper::register(builder, a, c, reference)?);
        self.output = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        bound(self.stamper)?.stamp(editor, self.gain)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        let Some(output) = self.output else {
            return;
        };
        self.voltage = output.value(solution);
        if let Some(sensed) = self.sensed {
            self.current = self.gain * solution.solution(sensed);
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

/// Current-controlled voltage source.
#[derive(Debug, Clone)]
pub struct Ccvs {
    pub label: String,
    pub nodes: [usize; 2],
    pub ammeter: DeviceId,
    pub transresistance: f64,
    branch: Option<usize>,
    stamper: Option<CcvsStamper>,
    output: Option<VoltageProxy>,
    current: f64,
    voltage: f64,
}

impl Ccvs {
    pub fn new(label: String, nodes: [usize; 2], ammeter: DeviceId, transresistance: f64) -> Self {
        Self {
            label,
            nodes,
            ammeter,
            transresistance,
            branch: None,
            stamper: None,
            output: None,
            current: 0.0,
            voltage: 0.0,
        }
    }
}

impl LargeSignalDevice for Ccvs {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        self.branch = Some(VoltageStamper::allocate(builder)?);
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        let reference = ctx.branch_of(&self.label, self.ammeter)?;
        self.stamper = Some(CcvsStamper::register(builder, a, c, reference, bound(self.branch)?)?);
        self.output = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        bound(self.stamper)?.stamp(editor, self.transresistance)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let (Some(stamper), Some(output)) = (self.stamper, self.output) {
            self.current = stamper.current(solution);
            self.voltage = output.value(solution);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support::Harness;
    use crate::components::{CurrentSource, Resistor, VoltageSource, Waveform};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_vccs_drives_load() {
        // 2V control on node 1, 0.5 S into a 10 ohm load on node 2
        let mut harness = Harness::new(3);
        let mut v = VoltageSource::new([1, 0], Waveform::Constant(2.0));
        let mut g = Vccs::new([0, 2, 1, 0], 0.5);
        let mut r = Resistor::new([2, 0], 10.0);
        harness.run(&mut [&mut v, &mut g, &mut r]).unwrap();

        // Current flows from ground through the source into node 2
        assert_abs_diff_eq!(harness.voltage(2), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.probe("I").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_vcvs_amplifies_control_voltage() {
        let mut harness = Harness::new(3);
        let mut v = VoltageSource::new([1, 0], Waveform::Constant(0.5));
        let mut e = Vcvs::new([2, 0, 1, 0], 4.0);
        let mut r = Resistor::new([2, 0], 2.0);
        harness.run(&mut [&mut v, &mut e, &mut r]).unwrap();

        assert_abs_diff_eq!(harness.voltage(2), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(e.probe("I").unwrap(), -1.0, epsilon = 1e-12);
        assert_eq!(e.branch_variable(), Some(4));
    }

    #[test]
    fn test_cccs_mirrors_ammeter_current() {
        // 1A forced through a 0V ammeter, mirrored with gain 3 into 1 ohm
        let mut harness = Harness::new(4);
        let mut i = CurrentSource::new([0, 1], Waveform::Constant(1.0));
        let mut ammeter = VoltageSource::new([1, 2], Waveform::Constant(0.0));
        let mut r = Resistor::new([2, 0], 1.0);
        let mut f = Cccs::new("F1".into(), [0, 3], DeviceId(1), 3.0);
        let mut load = Resistor::new([3, 0], 1.0);
        harness
            .run(&mut [&mut i, &mut ammeter, &mut r, &mut f, &mut load])
            .unwrap();

        assert_abs_diff_eq!(ammeter.probe("I").unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(harness.voltage(3), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.probe("I").unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ccvs_converts_current_to_voltage() {
        let mut harness = Harness::new(4);
        let mut i = CurrentSource::new([0, 1], Waveform::Constant(0.25));
        let mut ammeter = VoltageSource::new([1, 2], Waveform::Constant(0.0));
        let mut r = Resistor::new([2, 0], 1.0);
        let mut h = Ccvs::new("H1".into(), [3, 0], DeviceId(1), 8.0);
        let mut load = Resistor::new([3, 0], 4.0);
        harness
            .run(&mut [&mut i, &mut ammeter, &mut r, &mut h, &mut load])
            .unwrap();

        assert_abs_diff_eq!(harness.voltage(3), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.probe("V").unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unresolved_ammeter_fails_initialization() {
        let mut harness = Harness::new(2);
        let mut r = Resistor::new([1, 0], 1.0);
        let mut f = Cccs::new("F1".into(), [1, 0], DeviceId(0), 1.0);
        let err = harness.run(&mut [&mut r, &mut f]).unwrap_err();
        assert!(matches!(err, crate::error::SpiceError::UnresolvedReference { .. }));
    }
}
