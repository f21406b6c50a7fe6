//! Linear passive components: Resistor, Capacitor, Inductor.
//!
//! Capacitors and inductors are discretized with the simulation-wide
//! [`IntegrationMethod`](crate::solver::IntegrationMethod). At the DC
//! operating point a capacitor is an open circuit and an inductor a short,
//! except in the initial-condition pass, where a capacitor is held at its
//! initial voltage and an inductor carries its initial current.

use crate::error::Result;
use crate::solver::{
    EquationBuilder, EquationEditor, SimulationContext, SolutionView, StateHistory, INITIAL_CONDITION_CONDUCTANCE,
};
use crate::stamping::{ConductanceStamper, CurrentStamper, VoltageProxy, VoltageStamper};

use super::{bound, InitContext, LargeSignalDevice};

/// A resistor model.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub nodes: [usize; 2],
    pub resistance: f64,
    stamper: Option<ConductanceStamper>,
    voltage_proxy: Option<VoltageProxy>,
    voltage: f64,
}

impl Resistor {
    pub fn new(nodes: [usize; 2], resistance: f64) -> Self {
        Self {
            nodes,
            resistance,
            stamper: None,
            voltage_proxy: None,
            voltage: 0.0,
        }
    }

    /// G = 1/R
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Last solved voltage across the resistor.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Current from the first to the second terminal.
    pub fn current(&self) -> f64 {
        self.voltage * self.conductance()
    }
}

impl LargeSignalDevice for Resistor {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, _ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        self.stamper = Some(ConductanceStamper::register(builder, a, c)?);
        self.voltage_proxy = Some(VoltageProxy::register(builder, a, c)?);
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        bound(self.stamper)?.stamp(editor, self.conductance())
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let Some(proxy) = self.voltage_proxy {
            self.voltage = proxy.value(solution);
        }
    }

    fn probe(&self, name: &str) -> Option<f64> {
        match name {
            "V" => Some(self.voltage),
            "I" => Some(self.current()),
            _ => None,
        }
    }
}

/// A capacitor model.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub nodes: [usize; 2],
    pub capacitance: f64,
    /// Voltage that seeds the transient history instead of the DC solution
    pub initial_voltage: Option<f64>,
    conductance: Option<ConductanceStamper>,
    current_source: Option<CurrentStamper>,
    voltage_proxy: Option<VoltageProxy>,
    history: StateHistory,
    /// Companion pair of the pass in progress, current = g_eq * v + i_eq
    g_eq: f64,
    i_eq: f64,
    voltage: f64,
    current: f64,
}

impl Capacitor {
    pub fn new(nodes: [usize; 2], capacitance: f64, initial_voltage: Option<f64>) -> Self {
        Self {
            nodes,
            capacitance,
            initial_voltage,
            conductance: None,
            current_source: None,
            voltage_proxy: None,
            history: StateHistory::new(1),
            g_eq: 0.0,
            i_eq: 0.0,
            voltage: 0.0,
            current: 0.0,
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl LargeSignalDevice for Capacitor {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        self.conductance = Some(ConductanceStamper::register(builder, a, c)?);
        self.current_source = Some(CurrentStamper::register(builder, a, c)?);
        self.voltage_proxy = Some(VoltageProxy::register(builder, a, c)?);
        self.history = StateHistory::for_method(&ctx.simulation.params.integration_method);
        self.history.reset(self.initial_voltage.unwrap_or(0.0));
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        let conductance = bound(self.conductance)?;
        let current_source = bound(self.current_source)?;
        if ctx.is_dc() {
            self.g_eq = 0.0;
            self.i_eq = 0.0;
            match self.initial_voltage {
                Some(v) if ctx.initial_conditions => {
                    // Held at the initial voltage
                    self.g_eq = INITIAL_CONDITION_CONDUCTANCE;
                    self.i_eq = -INITIAL_CONDITION_CONDUCTANCE * v;
                }
                // Open circuit
                _ => return Ok(()),
            }
        } else {
            (self.g_eq, self.i_eq) = ctx.params.integration_method.companion(
                &self.history,
                ctx.time_step,
                self.capacitance,
            );
        }
        conductance.stamp(editor, self.g_eq)?;
        current_source.stamp(editor, self.i_eq)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let Some(proxy) = self.voltage_proxy {
            self.voltage = proxy.value(solution);
        }
        self.current = self.g_eq * self.voltage + self.i_eq;
    }

    fn on_step_committed(&mut self, ctx: &SimulationContext) {
        if ctx.is_dc() {
            self.history.reset(self.initial_voltage.unwrap_or(self.voltage));
        } else {
            self.history
                .push(self.voltage, self.current / self.capacitance, ctx.time_step);
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

/// An inductor model, stamped as a voltage-defined branch.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub nodes: [usize; 2],
    pub inductance: f64,
    /// Current that seeds the transient history instead of the DC solution
    pub initial_current: Option<f64>,
    branch: Option<usize>,
    stamper: Option<VoltageStamper>,
    voltage_proxy: Option<VoltageProxy>,
    history: StateHistory,
    /// Companion pair of the step in progress, V = r_eq * I + v_eq
    r_eq: f64,
    v_eq: f64,
    voltage: f64,
    current: f64,
}

impl Inductor {
    pub fn new(nodes: [usize; 2], inductance: f64, initial_current: Option<f64>) -> Self {
        Self {
            nodes,
            inductance,
            initial_current,
            branch: None,
            stamper: None,
            voltage_proxy: None,
            history: StateHistory::new(1),
            r_eq: 0.0,
            v_eq: 0.0,
            voltage: 0.0,
            current: 0.0,
        }
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl LargeSignalDevice for Inductor {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        self.branch = Some(VoltageStamper::allocate(builder)?);
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [a, c] = self.nodes;
        let branch = bound(self.branch)?;
        self.stamper = Some(VoltageStamper::register(builder, a, c, branch)?);
        self.voltage_proxy = Some(VoltageProxy::register(builder, a, c)?);
        self.history = StateHistory::for_method(&ctx.simulation.params.integration_method);
        self.history.reset(self.initial_current.unwrap_or(0.0));
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        let stamper = bound(self.stamper)?;
        if ctx.is_dc() {
            self.r_eq = 0.0;
            self.v_eq = 0.0;
            return match self.initial_current {
                Some(current) if ctx.initial_conditions => stamper.stamp_current(editor, current),
                // Short circuit
                _ => stamper.stamp(editor, 0.0),
            };
        }

        (self.r_eq, self.v_eq) = ctx.params.integration_method.companion(
            &self.history,
            ctx.time_step,
            self.inductance,
        );
        stamper.stamp_with_resistance(editor, self.v_eq, self.r_eq)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, _ctx: &mut SimulationContext) {
        if let Some(stamper) = self.stamper {
            self.current = stamper.current(solution);
        }
        if let Some(proxy) = self.voltage_proxy {
            self.voltage = proxy.value(solution);
        }
    }

    fn on_step_committed(&mut self, ctx: &SimulationContext) {
        if ctx.is_dc() {
            self.history.reset(self.initial_current.unwrap_or(self.current));
        } else {
            let derivative = (self.r_eq * self.current + self.v_eq) / self.inductance;
            self.history.push(self.current, derivative, ctx.time_step);
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
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_resistor_conductance() {
        let r = Resistor::new([1, 0], 1000.0);
        assert!((r.conductance() - 0.001).abs() < 1e-10);
    }

    #[test]
    fn test_resistor_probes_after_solve() {
        // 2 ohm resistor fed by a 1A source from ground
        let mut harness = Harness::new(2);
        let mut r = Resistor::new([1, 0], 2.0);
        let mut source = crate::components::CurrentSource::new([0, 1], crate::components::Waveform::Constant(1.0));
        harness.run(&mut [&mut r, &mut source]).unwrap();

        assert_abs_diff_eq!(r.probe("V").unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.probe("I").unwrap(), 1.0, epsilon = 1e-12);
        assert!(r.probe("Q").is_none());
    }

    #[test]
    fn test_capacitor_is_open_at_dc() {
        let mut harness = Harness::new(2);
        let mut r = Resistor::new([1, 0], 2.0);
        let mut c = Capacitor::new([1, 0], 1e-6, None);
        let mut source = crate::components::CurrentSource::new([0, 1], crate::components::Waveform::Constant(1.0));
        harness.run(&mut [&mut r, &mut c, &mut source]).unwrap();

        assert_abs_diff_eq!(c.voltage(), 2.0, epsilon = 1e-12);
        assert_eq!(c.current(), 0.0);
    }

    #[test]
    fn test_capacitor_companion_follows_backward_euler() {
        let mut harness = Harness::new(2);
        harness.context.params.integration_method = crate::solver::IntegrationMethod::BackwardEuler;
        let mut c = Capacitor::new([1, 0], 1e-6, Some(0.0));
        let mut source = crate::components::CurrentSource::new([0, 1], crate::components::Waveform::Constant(1e-3));
        let devices: &mut [&mut dyn LargeSignalDevice] = &mut [&mut c, &mut source];

        // Constant 1mA into 1uF ramps at 1000 V/s from the initial voltage
        harness.context.time_step = 1e-3;
        harness.context.time = 1e-3;
        harness.run(devices).unwrap();
        harness.commit(devices);
        harness.context.time = 2e-3;
        harness.run(devices).unwrap();

        assert_abs_diff_eq!(c.voltage(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.current(), 1e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_inductor_is_short_at_dc() {
        let mut harness = Harness::new(3);
        let mut source = crate::components::CurrentSource::new([0, 1], crate::components::Waveform::Constant(2.0));
        let mut l = Inductor::new([1, 2], 1e-3, None);
        let mut r = Resistor::new([2, 0], 5.0);
        harness.run(&mut [&mut source, &mut l, &mut r]).unwrap();

        assert_eq!(l.branch_variable(), Some(3));
        assert_abs_diff_eq!(l.current(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(l.voltage(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(harness.voltage(1), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_capacitor_held_at_initial_voltage() {
        let mut harness = Harness::new(2);
        let mut r = Resistor::new([1, 0], 1e3);
        let mut c = Capacitor::new([1, 0], 1e-6, Some(1.0));
        harness.context.initial_conditions = true;
        harness.run(&mut [&mut r, &mut c]).unwrap();
        assert_abs_diff_eq!(harness.voltage(1), 1.0, epsilon = 1e-9);
        // The capacitor feeds the resistor
        assert_abs_diff_eq!(c.current(), -1e-3, epsilon = 1e-6);

        harness.context.initial_conditions = false;
        harness.run(&mut [&mut r, &mut c]).unwrap();
        assert_eq!(harness.voltage(1), 0.0);
        assert_eq!(c.current(), 0.0);
    }

    #[test]
    fn test_inductor_carries_initial_current() {
        let mut harness = Harness::new(2);
        let mut l = Inductor::new([1, 0], 1e-3, Some(0.5));
        let mut r = Resistor::new([1, 0], 4.0);
        harness.context.initial_conditions = true;
        harness.run(&mut [&mut l, &mut r]).unwrap();
        assert_abs_diff_eq!(l.current(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(l.voltage(), -2.0, epsilon = 1e-12);

        // Without the flag the inductor shorts the resistor
        harness.context.initial_conditions = false;
        harness.run(&mut [&mut l, &mut r]).unwrap();
        assert_abs_diff_eq!(l.current(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(harness.voltage(1), 0.0, epsilon = 1e-12);
    }
}
