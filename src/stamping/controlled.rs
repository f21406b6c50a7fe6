//! Controlled-source stampers.
//!
//! The output side is either a current injection (VCCS, CCCS) or a
//! voltage-defined branch (VCVS, CCVS). The controlling quantity is a node
//! pair or another device's branch-current variable.

use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor, MatrixProxy, SolutionView};

use super::branch::VoltageStamper;

/// Voltage-controlled current source: `I(a -> c) = g * (V(ra) - V(rc))`.
#[derive(Debug, Clone, Copy)]
pub struct VccsStamper {
    a_ra: MatrixProxy,
    a_rc: MatrixProxy,
    c_ra: MatrixProxy,
    c_rc: MatrixProxy,
}

impl VccsStamper {
    pub fn register(
        builder: &mut dyn EquationBuilder,
        anode: usize,
        cathode: usize,
        control_anode: usize,
        control_cathode: usize,
    ) -> Result<Self> {
        Ok(Self {
            a_ra: builder.matrix_proxy(anode, control_anode)?,
            a_rc: builder.matrix_proxy(anode, control_cathode)?,
            c_ra: builder.matrix_proxy(cathode, control_anode)?,
            c_rc: builder.matrix_proxy(cathode, control_cathode)?,
        })
    }

    /// Stamp transconductance `g`.
    pub fn stamp(&self, editor: &mut dyn EquationEditor, g: f64) -> Result<()> {
        editor.add_matrix(self.a_ra, g)?;
        editor.add_matrix(self.a_rc, -g)?;
        editor.add_matrix(self.c_ra, -g)?;
        editor.add_matrix(self.c_rc, g)
    }
}

/// Voltage-controlled voltage source: `V(a) - V(c) = gain * (V(ra) - V(rc))`.
#[derive(Debug, Clone, Copy)]
pub struct VcvsStamper {
    branch: VoltageStamper,
    b_ra: MatrixProxy,
    b_rc: MatrixProxy,
}

impl VcvsStamper {
    /// Bind to an already allocated branch variable.
    pub fn register(
        builder: &mut dyn EquationBuilder,
        anode: usize,
        cathode: usize,
        control_anode: usize,
        control_cathode: usize,
        branch: usize,
    ) -> Result<Self> {
        Ok(Self {
            branch: VoltageStamper::register(builder, anode, cathode, branch)?,
            b_ra: builder.matrix_proxy(branch, control_anode)?,
            b_rc: builder.matrix_proxy(branch, control_cathode)?,
        })
    }

    pub fn stamp(&self, editor: &mut dyn EquationEditor, gain: f64) -> Result<()> {
        self.branch.stamp_incidence(editor)?;
        editor.add_matrix(self.b_ra, -gain)?;
        editor.add_matrix(self.b_rc, gain)
    }

    /// Solved output branch current.
    pub fn current(&self, solution: &dyn SolutionView) -> f64 {
        self.branch.current(solution)
    }
}

/// Current-controlled current source: `I(a -> c) = gain * I(reference)`.
#[derive(Debug, Clone, Copy)]
pub struct CccsStamper {
    a_ref: MatrixProxy,
    c_ref: MatrixProxy,
}

impl CccsStamper {
    pub fn register(
        builder: &mut dyn EquationBuilder,
        anode: usize,
        cathode: usize,
        reference_branch: usize,
    ) -> Result<Self> {
        Ok(Self {
            a_ref: builder.matrix_proxy(anode, reference_branch)?,
            c_ref: builder.matrix_proxy(cathode, reference_branch)?,
        })
    }

    pub fn stamp(&self, editor: &mut dyn EquationEditor, gain: f64) -> Result<()> {
        editor.add_matrix(self.a_ref, gain)?;
        editor.add_matrix(self.c_ref, -gain)
    }
}

/// Current-controlled voltage source: `V(a) - V(c) = gain * I(reference)`.
#[derive(Debug, Clone, Copy)]
pub struct CcvsStamper {
    branch: VoltageStamper,
    b_ref: MatrixProxy,
}

impl CcvsStamper {
    pub fn register(
        builder: &mut dyn EquationBuilder,
        anode: usize,
        cathode: usize,
        reference_branch: usize,
        branch: usize,
    ) -> Result<Self> {
        Ok(Self {
            branch: VoltageStamper::register(builder, anode, cathode, branch)?,
            b_ref: builder.matrix_proxy(branch, reference_branch)?,
        })
    }

    pub fn stamp(&self, editor: &mut dyn EquationEditor, gain: f64) -> Result<()> {
        self.branch.stamp_incidence(editor)?;
        editor.add_matrix(self.b_ref, -gain)
    }

    /// Solved output branch current.
    pub fn current(&self, solution: &dyn SolutionView) -> f64 {
        self.branch.current(solution)
    }
}
