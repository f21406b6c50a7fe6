//! BJT (Bipolar Junction Transistor) model.
//!
//! Gummel-Poon transport model without charge storage:
//!
//! ```text
//! It  = (Ibf - Ibr) / qb             collector to emitter
//! Ibe = Ibf / BF + Ise(exp(Vbe / (NE Vt)) - 1)
//! Ibc = Ibr / BR + Isc(exp(Vbc / (NC Vt)) - 1)
//! qb  = q1 (1 + sqrt(1 + 4 q2)) / 2
//! q1  = 1 / (1 - Vbc / VAF - Vbe / VAR),  q2 = Ibf / IKF + Ibr / IKR
//! ```
//!
//! PNP devices are evaluated with inverted junction voltages and their
//! currents flipped back, so conductances are shared by both polarities.

use crate::error::{Result, SpiceError};
use crate::solver::{EquationBuilder, EquationEditor, SimulationContext, SolutionView};
use crate::stamping::{BjtStampValues, BjtStamper, VoltageProxy};

use super::junction::{critical_voltage, junction_current, limit_junction_voltage};
use super::{bound, InitContext, LargeSignalDevice};

/// BJT type (NPN or PNP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BjtPolarity {
    #[default]
    Npn,
    Pnp,
}

impl BjtPolarity {
    pub fn sign(&self) -> f64 {
        match self {
            BjtPolarity::Npn => 1.0,
            BjtPolarity::Pnp => -1.0,
        }
    }
}

/// Parameters for a BJT model.
#[derive(Debug, Clone, PartialEq)]
pub struct BjtParams {
    pub polarity: BjtPolarity,
    /// Transport saturation current (IS)
    pub saturation_current: f64,
    /// Forward current gain (BF)
    pub forward_beta: f64,
    /// Reverse current gain (BR)
    pub reverse_beta: f64,
    /// Forward emission coefficient (NF)
    pub forward_emission: f64,
    /// Reverse emission coefficient (NR)
    pub reverse_emission: f64,
    /// Base-emitter leakage saturation current (ISE), 0 disables it
    pub be_leakage_current: f64,
    /// Base-emitter leakage emission coefficient (NE)
    pub be_leakage_emission: f64,
    /// Base-collector leakage saturation current (ISC), 0 disables it
    pub bc_leakage_current: f64,
    /// Base-collector leakage emission coefficient (NC)
    pub bc_leakage_emission: f64,
    /// Forward Early voltage (VAF), infinite disables it
    pub forward_early_voltage: f64,
    /// Reverse Early voltage (VAR)
    pub reverse_early_voltage: f64,
    /// Forward high-injection knee current (IKF)
    pub forward_knee_current: f64,
    /// Reverse high-injection knee current (IKR)
    pub reverse_knee_current: f64,
}

impl Default for BjtParams {
    fn default() -> Self {
        Self {
            polarity: BjtPolarity::Npn,
            saturation_current: 1e-16,
            forward_beta: 100.0,
            reverse_beta: 1.0,
            forward_emission: 1.0,
            reverse_emission: 1.0,
            be_leakage_current: 0.0,
            be_leakage_emission: 1.5,
            bc_leakage_current: 0.0,
            bc_leakage_emission: 2.0,
            forward_early_voltage: f64::INFINITY,
            reverse_early_voltage: f64::INFINITY,
            forward_knee_current: f64::INFINITY,
            reverse_knee_current: f64::INFINITY,
        }
    }
}

impl BjtParams {
    pub fn npn() -> Self {
        Self::default()
    }

    pub fn pnp() -> Self {
        Self {
            polarity: BjtPolarity::Pnp,
            ..Self::default()
        }
    }

    pub fn with_early_voltage(mut self, vaf: f64) -> Self {
        self.forward_early_voltage = vaf;
        self
    }

    /// Check the parameter ranges.
    pub fn validate(&self, device: &str) -> Result<()> {
        let positive = [
            ("saturation_current", self.saturation_current),
            ("forward_beta", self.forward_beta),
            ("reverse_beta", self.reverse_beta),
            ("forward_emission", self.forward_emission),
            ("reverse_emission", self.reverse_emission),
            ("be_leakage_emission", self.be_leakage_emission),
            ("bc_leakage_emission", self.bc_leakage_emission),
            ("forward_early_voltage", self.forward_early_voltage),
            ("reverse_early_voltage", self.reverse_early_voltage),
            ("forward_knee_current", self.forward_knee_current),
            ("reverse_knee_current", self.reverse_knee_current),
        ];
        for (param, value) in positive {
            if !(value > 0.0) {
                return Err(SpiceError::invalid_parameter(device, param, format!("must be positive, got {value}")));
            }
        }
        for (param, value) in [
            ("be_leakage_current", self.be_leakage_current),
            ("bc_leakage_current", self.bc_leakage_current),
        ] {
            if !(value >= 0.0) {
                return Err(SpiceError::invalid_parameter(device, param, format!("must be non-negative, got {value}")));
            }
        }
        Ok(())
    }
}

/// Currents and derivatives at one operating point, in the NPN frame.
#[derive(Debug, Clone, Copy, Default)]
struct OperatingPoint {
    vbe: f64,
    vbc: f64,
    ibe: f64,
    gbe: f64,
    ibc: f64,
    gbc: f64,
    it: f64,
    gmf: f64,
    gmr: f64,
}

impl OperatingPoint {
    /// First-order prediction at another pair of junction voltages.
    fn extrapolate(&self, vbe: f64, vbc: f64) -> (f64, f64, f64) {
        let dbe = vbe - self.vbe;
        let dbc = vbc - self.vbc;
        (
            self.ibe + self.gbe * dbe,
            self.ibc + self.gbc * dbc,
            self.it + self.gmf * dbe + self.gmr * dbc,
        )
    }
}

/// A BJT component.
#[derive(Debug, Clone)]
pub struct Bjt {
    pub label: String,
    pub nodes: [usize; 3], // [collector, base, emitter]
    pub params: BjtParams,
    stamper: Option<BjtStamper>,
    vbe_proxy: Option<VoltageProxy>,
    vbc_proxy: Option<VoltageProxy>,
    vt: f64,
    vcrit_be: f64,
    vcrit_bc: f64,
    gmin: f64,
    /// Junction voltages (NPN frame) for the next linearization
    vbe: f64,
    vbc: f64,
    linearized: OperatingPoint,
    /// Solved terminal quantities, actual polarity
    solved_vbe: f64,
    solved_vbc: f64,
    ibe: f64,
    ibc: f64,
    it: f64,
}

impl Bjt {
    pub fn new(label: String, nodes: [usize; 3], params: BjtParams) -> Self {
        Self {
            label,
            nodes,
            params,
            stamper: None,
            vbe_proxy: None,
            vbc_proxy: None,
            vt: 0.0,
            vcrit_be: 0.0,
            vcrit_bc: 0.0,
            gmin: 0.0,
            vbe: 0.0,
            vbc: 0.0,
            linearized: OperatingPoint::default(),
            solved_vbe: 0.0,
            solved_vbc: 0.0,
            ibe: 0.0,
            ibc: 0.0,
            it: 0.0,
        }
    }

    pub fn collector(&self) -> usize {
        self.nodes[0]
    }

    pub fn base(&self) -> usize {
        self.nodes[1]
    }

    pub fn emitter(&self) -> usize {
        self.nodes[2]
    }

    /// Current into the collector terminal.
    pub fn collector_current(&self) -> f64 {
        self.it - self.ibc
    }

    /// Current into the base terminal.
    pub fn base_current(&self) -> f64 {
        self.ibe + self.ibc
    }

    /// Current into the emitter terminal.
    pub fn emitter_current(&self) -> f64 {
        -(self.collector_current() + self.base_current())
    }

    fn evaluate(&self, vbe: f64, vbc: f64) -> OperatingPoint {
        let p = &self.params;
        let vtf = p.forward_emission * self.vt;
        let vtr = p.reverse_emission * self.vt;

        let (ibf, gif) = junction_current(p.saturation_current, vbe, vtf);
        let (ibr, gir) = junction_current(p.saturation_current, vbc, vtr);
        let (ile, gle) = leakage(p.be_leakage_current, vbe, p.be_leakage_emission * self.vt);
        let (ilc, glc) = leakage(p.bc_leakage_current, vbc, p.bc_leakage_emission * self.vt);

        // Base charge
        let q1 = 1.0 / (1.0 - vbc / p.forward_early_voltage - vbe / p.reverse_early_voltage);
        let q2 = ibf / p.forward_knee_current + ibr / p.reverse_knee_current;
        let arg = 1.0 + 4.0 * q2;
        let sqarg = if arg > 0.0 { arg.sqrt() } else { 1.0 };
        let qb = q1 * (1.0 + sqarg) / 2.0;
        let dqb_dvbe = q1 * (qb / p.reverse_early_voltage + gif / (p.forward_knee_current * sqarg));
        let dqb_dvbc = q1 * (qb / p.forward_early_voltage + gir / (p.reverse_knee_current * sqarg));

        let it = (ibf - ibr) / qb;
        OperatingPoint {
            vbe,
            vbc,
            ibe: ibf / p.forward_beta + ile + self.gmin * vbe,
            gbe: gif / p.forward_beta + gle + self.gmin,
            ibc: ibr / p.reverse_beta + ilc + self.gmin * vbc,
            gbc: gir / p.reverse_beta + glc + self.gmin,
            it,
            gmf: (gif - it * dqb_dvbe) / qb,
            gmr: (-gir - it * dqb_dvbc) / qb,
        }
    }
}

fn leakage(saturation_current: f64, v: f64, vt: f64) -> (f64, f64) {
    if saturation_current > 0.0 {
        junction_current(saturation_current, v, vt)
    } else {
        (0.0, 0.0)
    }
}

impl LargeSignalDevice for Bjt {
    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let [c, b, e] = self.nodes;
        self.stamper = Some(BjtStamper::register(builder, c, b, e)?);
        self.vbe_proxy = Some(VoltageProxy::register(builder, b, e)?);
        self.vbc_proxy = Some(VoltageProxy::register(builder, b, c)?);

        let sim = ctx.simulation;
        let p = &self.params;
        self.vt = sim.thermal_voltage();
        self.vcrit_be = critical_voltage(p.saturation_current, p.forward_emission * self.vt);
        self.vcrit_bc = critical_voltage(p.saturation_current, p.reverse_emission * self.vt);
        self.gmin = sim.params.minimal_conductance;
        self.vbe = 0.0;
        self.vbc = 0.0;
        Ok(())
    }

    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, _ctx: &SimulationContext) -> Result<()> {
        let stamper = bound(self.stamper)?;
        let op = self.evaluate(self.vbe, self.vbc);
        self.linearized = op;

        let sign = self.params.polarity.sign();
        let values = BjtStampValues {
            gbe: op.gbe,
            gbc: op.gbc,
            gmf: op.gmf,
            gmr: op.gmr,
            ibe_eq: sign * (op.ibe - op.gbe * op.vbe),
            ibc_eq: sign * (op.ibc - op.gbc * op.vbc),
            it_eq: sign * (op.it - op.gmf * op.vbe - op.gmr * op.vbc),
        };
        stamper.stamp(editor, &values)
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, ctx: &mut SimulationContext) {
        let (Some(vbe_proxy), Some(vbc_proxy)) = (self.vbe_proxy, self.vbc_proxy) else {
            return;
        };
        let sign = self.params.polarity.sign();
        self.solved_vbe = vbe_proxy.value(solution);
        self.solved_vbc = vbc_proxy.value(solution);
        let vbe_new = sign * self.solved_vbe;
        let vbc_new = sign * self.solved_vbc;

        let (ibe, ibc, it) = self.linearized.extrapolate(vbe_new, vbc_new);
        self.ibe = sign * ibe;
        self.ibc = sign * ibc;
        self.it = sign * it;

        let (vbe, limited_be) = limit_junction_voltage(vbe_new, self.vbe, self.vt, self.vcrit_be);
        let (vbc, limited_bc) = limit_junction_voltage(vbc_new, self.vbc, self.vt, self.vcrit_bc);
        self.vbe = vbe;
        self.vbc = vbc;

        let actual = self.evaluate(vbe, vbc);
        let converged = !limited_be
            && !limited_bc
            && ctx.in_tolerance(ibe + ibc, actual.ibe + actual.ibc)
            && ctx.in_tolerance(it - ibc, actual.it - actual.ibc);
        if !converged {
            ctx.report_not_converged(&self.label);
        }
    }

    fn probe(&self, name: &str) -> Option<f64> {
        let value = match name {
            "IB" => self.base_current(),
            "IC" => self.collector_current(),
            "IE" => self.emitter_current(),
            "IBE" => self.ibe,
            "IBC" => self.ibc,
            "VBE" => self.solved_vbe,
            "VBC" => self.solved_vbc,
            "VCE" => self.solved_vbe - self.solved_vbc,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support::Harness;
    use crate::components::{Resistor, VoltageSource, Waveform};
    use approx::assert_relative_eq;

    /// Supply on node 1, transistor biased through a base resistor.
    fn biased(params: BjtParams) -> (Harness, Bjt) {
        let mut harness = Harness::new(4);
        let mut supply = VoltageSource::new([1, 0], Waveform::Constant(5.0));
        let (mut rc, mut rb, mut q) = match params.polarity {
            BjtPolarity::Npn => (
                Resistor::new([1, 2], 1000.0),
                Resistor::new([1, 3], 500e3),
                Bjt::new("Q1".into(), [2, 3, 0], params),
            ),
            BjtPolarity::Pnp => (
                Resistor::new([2, 0], 1000.0),
                Resistor::new([3, 0], 500e3),
                Bjt::new("Q1".into(), [2, 3, 1], params),
            ),
        };
        harness
            .converge(&mut [&mut supply, &mut rc, &mut rb, &mut q], 500)
            .unwrap();
        (harness, q)
    }

    #[test]
    fn test_npn_forward_active() {
        let (harness, q) = biased(BjtParams::npn());
        let ib = q.probe("IB").unwrap();
        let ic = q.probe("IC").unwrap();

        assert!(ib > 0.0 && ic > 0.0);
        assert_relative_eq!(ic / ib, 100.0, max_relative = 1e-2);
        assert_relative_eq!(ic, (5.0 - harness.voltage(2)) / 1000.0, max_relative = 1e-3);
        assert_relative_eq!(q.probe("IE").unwrap(), -(ib + ic), max_relative = 1e-12);

        let vbe = q.probe("VBE").unwrap();
        assert!(vbe > 0.6 && vbe < 0.8);
        assert_relative_eq!(q.probe("VCE").unwrap(), harness.voltage(2), max_relative = 1e-9);
    }

    #[test]
    fn test_pnp_mirrors_npn() {
        let (harness, q) = biased(BjtParams::pnp());
        let ib = q.probe("IB").unwrap();
        let ic = q.probe("IC").unwrap();

        assert!(ib < 0.0 && ic < 0.0);
        assert_relative_eq!(ic / ib, 100.0, max_relative = 1e-2);
        assert_relative_eq!(-ic, harness.voltage(2) / 1000.0, max_relative = 1e-3);
        assert!(q.probe("VBE").unwrap() < -0.6);
    }

    #[test]
    fn test_early_effect_reduces_output_resistance() {
        let (_, ideal) = biased(BjtParams::npn());
        let (_, early) = biased(BjtParams::npn().with_early_voltage(50.0));
        // Vbc is negative in forward active, so q1 < 1 raises the transport current
        assert!(early.probe("IC").unwrap() > ideal.probe("IC").unwrap());
    }

    #[test]
    fn test_unknown_probe() {
        let q = Bjt::new("Q1".into(), [1, 2, 0], BjtParams::default());
        assert!(q.probe("XYZ").is_none());
        assert!(BjtParams::default().validate("Q1").is_ok());
        let bad = BjtParams {
            forward_beta: -1.0,
            ..BjtParams::default()
        };
        assert!(bad.validate("Q1").is_err());
    }
}
