//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt)). The minimal conductance
//! is added in parallel with the junction, reverse breakdown is modelled
//! below `-bv` and the optional series resistance adds an internal node.

use crate::error::{Result, SpiceError};
use crate::solver::{EquationBuilder, EquationEditor, SimulationContext, SolutionView, StateHistory};
use crate::stamping::{ConductanceStamper, CurrentStamper, VoltageProxy};

use super::junction::{critical_voltage, depletion_capacitance, junction_current, limit_junction_voltage};
use super::{bound, InitContext, LargeSignalDevice};

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub saturation_current: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub emission_coefficient: f64,
    /// Ohmic resistance (Rs), 0 disables the internal node
    pub series_resistance: f64,
    /// Transit time (Tt) for the diffusion capacitance
    pub transit_time: f64,
    /// Zero-bias junction capacitance (Cj0)
    pub junction_capacitance: f64,
    /// Junction potential (Vj)
    pub junction_potential: f64,
    /// Grading coefficient (M)
    pub grading_coefficient: f64,
    /// Forward-bias depletion capacitance coefficient (Fc)
    pub depletion_fc: f64,
    /// Reverse breakdown voltage (Bv), positive
    pub breakdown_voltage: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            saturation_current: 1e-14,
            emission_coefficient: 1.0,
            series_resistance: 0.0,
            transit_time: 0.0,
            junction_capacitance: 0.0,
            junction_potential: 1.0,
            grading_coefficient: 0.5,
            depletion_fc: 0.5,
            breakdown_voltage: f64::INFINITY,
        }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self {
            saturation_current: 1e-9,
            emission_coefficient: 1.5,
            ..Self::default()
        }
    }

    /// Zener diode breaking down at `breakdown_voltage`.
    pub fn zener(breakdown_voltage: f64) -> Self {
        Self {
            breakdown_voltage,
            ..Self::default()
        }
    }

    pub fn with_series_resistance(mut self, resistance: f64) -> Self {
        self.series_resistance = resistance;
        self
    }

    pub fn with_capacitance(mut self, cj0: f64, transit_time: f64) -> Self {
        self.junction_capacitance = cj0;
        self.transit_time = transit_time;
        self
    }

    /// Check the parameter ranges.
    pub fn validate(&self, device: &str) -> Result<()> {
        let positive = [
            ("saturation_current", self.saturation_current),
            ("emission_coefficient", self.emission_coefficient),
            ("junction_potential", self.junction_potential),
            ("breakdown_voltage", self.breakdown_voltage),
        ];
        for (param, value) in positive {
            if !(value > 0.0) {
                return Err(SpiceError::invalid_parameter(device, param, format!("must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("series_resistance", self.series_resistance),
            ("transit_time", self.transit_time),
            ("junction_capacitance", self.junction_capacitance),
        ];
        for (param, value) in non_negative {
            if !(value >= 0.0) || value.is_infinite() {
                return Err(SpiceError::invalid_parameter(device, param, format!("must be finite and non-negative, got {value}")));
            }
        }
        if !(0.0..1.0).contains(&self.depletion_fc) {
            return Err(SpiceError::invalid_parameter(device, "depletion_fc", "must be in [0, 1)"));
        }
        Ok(())
    }

    fn has_capacitance(&self) -> bool {
        self.junction_capacitance > 0.0 || self.transit_time > 0.0
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub label: String,
    pub nodes: [usize; 2], // [anode, cathode]
    pub params: DiodeParams,
    internal: Option<usize>,
    series: Option<ConductanceStamper>,
    junction: Option<ConductanceStamper>,
    source: Option<CurrentStamper>,
    junction_voltage: Option<VoltageProxy>,
    terminal_voltage: Option<VoltageProxy>,
    history: StateHistory,
    /// n * Vt at the simulation temperature
    vt: f64,
    vcrit: f64,
    gmin: f64,
    /// Operating point guess for the next linearization
    voltage: f64,
    /// Linearized static current `g * v + i_eq` used in the last stamp
    static_g: f64,
    static_ieq: f64,
    /// Capacitive companion pair of the step in progress
    cap_g: f64,
    cap_ieq: f64,
    capacitance: f64,
    current: f64,
    voltage_across: f64,
}

impl Diode {
    pub fn new(label: String, nodes: [usize; 2], params: DiodeParams) -> Self {
        Self {
            label,
            nodes,
            params,
            internal: None,
            series: None,
            junction: None,
            source: None,
            junction_voltage: None,
            terminal_voltage: None,
            history: StateHistory::new(1),
            vt: 0.0,
            vcrit: 0.0,
            gmin: 0.0,
            voltage: 0.0,
            static_g: 0.0,
            static_ieq: 0.0,
            cap_g: 0.0,
            cap_ieq: 0.0,
            capacitance: 0.0,
            current: 0.0,
            voltage_across: 0.0,
        }
    }

    /// Static junction current and conductance, gmin included.
    pub fn evaluate(&self, v: f64) -> (f64, f64) {
        let is = self.params.saturation_current;
        let vt = self.vt;
        let bv = self.params.breakdown_voltage;
        if v >= -5.0 * vt {
            let (i, g) = junction_current(is, v, vt);
            (i + self.gmin * v, g + self.gmin)
        } else if v > -bv {
            (-is + self.gmin * v, self.gmin)
        } else {
            let e = (-(bv + v) / vt).exp();
            (-is * e + self.gmin * v, is * e / vt + self.gmin)
        }
    }

    /// Last solved diode current, capacitive part included.
    pub fn current(&self) -> f64 {
        self.current
    }

    fn limit(&self, v_new: f64) -> (f64, bool) {
        let bv = self.params.breakdown_voltage;
        if bv.is_finite() && v_new < (-bv + 10.0 * self.vt).min(0.0) {
            // Mirror the forward limiting into the breakdown region
            let (limited, engaged) =
                limit_junction_voltage(-(v_new + bv), -(self.voltage + bv), self.vt, self.vcrit);
            (-(limited + bv), engaged)
        } else {
            limit_junction_voltage(v_new, self.voltage, self.vt, self.vcrit)
        }
    }

    fn total_capacitance(&self, v: f64, g_diffusion: f64) -> f64 {
        let p = &self.params;
        p.transit_time * g_diffusion
            + depletion_capacitance(
                v,
                p.junction_capacitance,
                p.junction_potential,
                p.grading_coefficient,
                p.depletion_fc,
            )
    }
}

impl LargeSignalDevice for Diode {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        if self.params.series_resistance > 0.0 {
            self.internal = Some(builder.add_variable()?);
        }
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [anode, cathode] = self.nodes;
        let inner = self.internal.unwrap_or(anode);
        if let Some(internal) = self.internal {
            self.series = Some(ConductanceStamper::register(builder, anode, internal)?);
        }
        self.junction = Some(ConductanceStamper::register(builder, inner, cathode)?);
        self.source = Some(CurrentStamper::register(builder, inner, cathode)?);
        self.junction_voltage = Some(VoltageProxy::register(builder, inner, cathode)?);
        self.terminal_voltage = Some(VoltageProxy::register(builder, anode, cathode)?);

        let sim = ctx.simulation;
        self.vt = self.params.emission_coefficient * sim.thermal_voltage();
        self.vcrit = critical_voltage(self.params.saturation_current, self.vt);
        self.gmin = sim.params.minimal_conductance;
        self.history = StateHistory::for_method(&sim.params.integration_method);
        self.history.reset(0.0);
        self.voltage = 0.0;
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        let junction = bound(self.junction)?;
        let source = bound(self.source)?;
        if let Some(series) = self.series {
            series.stamp(editor, 1.0 / self.params.series_resistance)?;
        }

        let v = self.voltage;
        let (i, g) = self.evaluate(v);
        self.static_g = g;
        self.static_ieq = i - g * v;

        self.cap_g = 0.0;
        self.cap_ieq = 0.0;
        self.capacitance = 0.0;
        if !ctx.is_dc() && self.params.has_capacitance() {
            let (_, g_diffusion) = junction_current(self.params.saturation_current, v, self.vt);
            self.capacitance = self.total_capacitance(v, g_diffusion);
            (self.cap_g, self.cap_ieq) = ctx.params.integration_method.companion(
                &self.history,
                ctx.time_step,
                self.capacitance,
            );
        }

        junction.stamp(editor, g + self.cap_g)?;
        source.stamp(editor, self.static_ieq + self.cap_ieq)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, ctx: &mut SimulationContext) {
        let Some(proxy) = self.junction_voltage else {
            return;
        };
        let v_new = proxy.value(solution);
        if let Some(terminal) = self.terminal_voltage {
            self.voltage_across = terminal.value(solution);
        }

        let linearized = self.static_g * v_new + self.static_ieq;
        let (v_next, limited) = self.limit(v_new);
        let (actual, _) = self.evaluate(v_next);
        self.current = linearized + self.cap_g * v_new + self.cap_ieq;
        self.voltage = v_next;

        if limited || !ctx.in_tolerance(linearized, actual) {
            ctx.report_not_converged(&self.label);
        }
    }

    fn on_step_committed(&mut self, ctx: &SimulationContext) {
        if ctx.is_dc() {
            self.history.reset(self.voltage);
        } else {
            let derivative = if self.capacitance > 0.0 {
                (self.cap_g * self.voltage + self.cap_ieq) / self.capacitance
            } else {
                0.0
            };
            self.history.push(self.voltage, derivative, ctx.time_step);
        }
    }

    fn probe(&self, name: &str) -> Option<f64> {
        match name {
            "V" => Some(self.voltage_across),
            "I" => Some(self.current),
            _ => None,
        }
    }
}
