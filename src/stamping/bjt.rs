//! Composite stamper for the linearized bipolar transistor.

use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor};

use super::basic::{ConductanceStamper, CurrentStamper};
use super::controlled::VccsStamper;

/// Linearized transistor around one operating point.
///
/// Equivalent currents follow the stamping convention: `ibe_eq` flows
/// base to emitter, `ibc_eq` base to collector and `it_eq` collector to
/// emitter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BjtStampValues {
    /// Base-emitter junction conductance
    pub gbe: f64,
    /// Base-collector junction conductance
    pub gbc: f64,
    /// Transport current sensitivity to Vbe
    pub gmf: f64,
    /// Transport current sensitivity to Vbc
    pub gmr: f64,
    pub ibe_eq: f64,
    pub ibc_eq: f64,
    pub it_eq: f64,
}

/// Two junction conductances, two transconductances and two injections.
#[derive(Debug, Clone, Copy)]
pub struct BjtStamper {
    gbe: ConductanceStamper,
    gbc: ConductanceStamper,
    gmf: VccsStamper,
    gmr: VccsStamper,
    ibe: CurrentStamper,
    ice: CurrentStamper,
}

impl BjtStamper {
    pub fn register(
        builder: &mut dyn EquationBuilder,
        collector: usize,
        base: usize,
        emitter: usize,
    ) -> Result<Self> {
        Ok(Self {
            gbe: ConductanceStamper::register(builder, base, emitter)?,
            gbc: ConductanceStamper::register(builder, base, collector)?,
            gmf: VccsStamper::register(builder, collector, emitter, base, emitter)?,
            gmr: VccsStamper::register(builder, collector, emitter, base, collector)?,
            ibe: CurrentStamper::register(builder, base, emitter)?,
            ice: CurrentStamper::register(builder, collector, emitter)?,
        })
    }

    pub fn stamp(&self, editor: &mut dyn EquationEditor, values: &BjtStampValues) -> Result<()> {
        self.gbe.stamp(editor, values.gbe)?;
        self.gbc.stamp(editor, values.gbc)?;
        self.gmf.stamp(editor, values.gmf)?;
        self.gmr.stamp(editor, values.gmr)?;
        // The base-collector injection is split over the two remaining pairs
        self.ibe.stamp(editor, values.ibe_eq + values.ibc_eq)?;
        self.ice.stamp(editor, values.it_eq - values.ibc_eq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::EquationSystemAdapter;

    #[test]
    fn test_injections_balance_to_zero() {
        let mut adapter = EquationSystemAdapter::<f64>::new(4);
        let stamper = BjtStamper::register(&mut adapter, 1, 2, 3).unwrap();
        adapter.freeze().unwrap();

        let values = BjtStampValues {
            ibe_eq: 1e-3,
            ibc_eq: 2e-3,
            it_eq: 5e-3,
            ..Default::default()
        };
        stamper.stamp(&mut adapter, &values).unwrap();

        let system = adapter.system().unwrap();
        let (c, b, e) = (system.rhs_entry(1), system.rhs_entry(2), system.rhs_entry(3));
        assert!((b - (-3e-3)).abs() < 1e-15);
        assert!((c - (-5e-3 + 2e-3)).abs() < 1e-15);
        assert!((e - 6e-3).abs() < 1e-15);
        assert!((b + c + e).abs() < 1e-15);
    }
}
