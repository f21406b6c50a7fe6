//! Conductance, current-injection and voltage-readout stampers.

use crate::error::Result;
use crate::solver::{EquationBuilder, EquationEditor, MatrixProxy, RhsProxy, SolutionProxy, SolutionView};

/// Conductance between two nodes.
///
/// For a conductance G between nodes a and c:
///   A[a,a] += G
///   A[c,c] += G
///   A[a,c] -= G
///   A[c,a] -= G
#[derive(Debug, Clone, Copy)]
pub struct ConductanceStamper {
    aa: MatrixProxy,
    ac: MatrixProxy,
    ca: MatrixProxy,
    cc: MatrixProxy,
}

impl ConductanceStamper {
    /// Bind the 2x2 block of `anode` and `cathode`.
    pub fn register(builder: &mut dyn EquationBuilder, anode: usize, cathode: usize) -> Result<Self> {
        Ok(Self {
            aa: builder.matrix_proxy(anode, anode)?,
            ac: builder.matrix_proxy(anode, cathode)?,
            ca: builder.matrix_proxy(cathode, anode)?,
            cc: builder.matrix_proxy(cathode, cathode)?,
        })
    }

    /// Stamp conductance `g`.
    pub fn stamp(&self, editor: &mut dyn EquationEditor, g: f64) -> Result<()> {
        editor.add_matrix(self.aa, g)?;
        editor.add_matrix(self.ac, -g)?;
        editor.add_matrix(self.ca, -g)?;
        editor.add_matrix(self.cc, g)
    }
}

/// Independent current injection between two nodes.
#[derive(Debug, Clone, Copy)]
pub struct CurrentStamper {
    anode: RhsProxy,
    cathode: RhsProxy,
}

impl CurrentStamper {
    pub fn register(builder: &mut dyn EquationBuilder, anode: usize, cathode: usize) -> Result<Self> {
        Ok(Self {
            anode: builder.rhs_proxy(anode)?,
            cathode: builder.rhs_proxy(cathode)?,
        })
    }

    /// Stamp current `i` flowing from anode to cathode through the device.
    pub fn stamp(&self, editor: &mut dyn EquationEditor, i: f64) -> Result<()> {
        editor.add_rhs(self.anode, -i)?;
        editor.add_rhs(self.cathode, i)
    }
}

/// Reads the voltage difference between two nodes from the solution.
#[derive(Debug, Clone, Copy)]
pub struct VoltageProxy {
    anode: SolutionProxy,
    cathode: SolutionProxy,
}

impl VoltageProxy {
    pub fn register(builder: &mut dyn EquationBuilder, anode: usize, cathode: usize) -> Result<Self> {
        Ok(Self {
            anode: builder.solution_proxy(anode)?,
            cathode: builder.solution_proxy(cathode)?,
        })
    }

    /// V(anode) - V(cathode)
    pub fn value(&self, solution: &dyn SolutionView) -> f64 {
        solution.solution(self.anode) - solution.solution(self.cathode)
    }
}
