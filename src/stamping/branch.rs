//! Voltage-defined branch stamper.
//!
//! Adds one branch-current unknown `I` (flowing from anode through the
//! device to cathode) and the constraint row
//!
//! ```text
//! V(anode) - V(cathode) - R * I = E
//! ```
//!
//! where `R` is an optional series resistance used by inductor companions.

use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor, MatrixProxy, RhsProxy, SolutionProxy, SolutionView};

/// Branch constraint between two nodes with its own current variable.
#[derive(Debug, Clone, Copy)]
pub struct VoltageStamper {
    branch: usize,
    anode_branch: MatrixProxy,
    cathode_branch: MatrixProxy,
    branch_anode: MatrixProxy,
    branch_cathode: MatrixProxy,
    branch_branch: MatrixProxy,
    target: RhsProxy,
    current: SolutionProxy,
}

impl VoltageStamper {
    /// Allocate the branch variable. Must run before freeze.
    pub fn allocate(builder: &mut dyn EquationBuilder) -> Result<usize> {
        builder.add_variable()
    }

    /// Bind the proxies for an already allocated `branch` variable.
    pub fn register(
        builder: &mut dyn EquationBuilder,
        anode: usize,
        cathode: usize,
        branch: usize,
    ) -> Result<Self> {
        Ok(Self {
            branch,
            anode_branch: builder.matrix_proxy(anode, branch)?,
            cathode_branch: builder.matrix_proxy(cathode, branch)?,
            branch_anode: builder.matrix_proxy(branch, anode)?,
            branch_cathode: builder.matrix_proxy(branch, cathode)?,
            branch_branch: builder.matrix_proxy(branch, branch)?,
            target: builder.rhs_proxy(branch)?,
            current: builder.solution_proxy(branch)?,
        })
    }

    /// Index of the branch-current variable.
    pub fn branch(&self) -> usize {
        self.branch
    }

    /// Stamp `V(anode) - V(cathode) = voltage`.
    pub fn stamp(&self, editor: &mut dyn EquationEditor, voltage: f64) -> Result<()> {
        self.stamp_incidence(editor)?;
        editor.add_rhs(self.target, voltage)
    }

    /// Stamp `V(anode) - V(cathode) - resistance * I = voltage`.
    pub fn stamp_with_resistance(
        &self,
        editor: &mut dyn EquationEditor,
        voltage: f64,
        resistance: f64,
    ) -> Result<()> {
        self.stamp(editor, voltage)?;
        editor.add_matrix(self.branch_branch, -resistance)
    }

    /// Stamp `I = current`, turning the branch into a current source.
    pub fn stamp_current(&self, editor: &mut dyn EquationEditor, current: f64) -> Result<()> {
        editor.add_matrix(self.anode_branch, 1.0)?;
        editor.add_matrix(self.cathode_branch, -1.0)?;
        editor.add_matrix(self.branch_branch, 1.0)?;
        editor.add_rhs(self.target, current)
    }

    /// Stamp only the incidence entries, leaving the target to the caller.
    pub(crate) fn stamp_incidence(&self, editor: &mut dyn EquationEditor) -> Result<()> {
        editor.add_matrix(self.anode_branch, 1.0)?;
        editor.add_matrix(self.cathode_branch, -1.0)?;
        editor.add_matrix(self.branch_anode, 1.0)?;
        editor.add_matrix(self.branch_cathode, -1.0)
    }

    /// Solved branch current.
    pub fn current(&self, solution: &dyn SolutionView) -> f64 {
        solution.solution(self.current)
    }
}
