//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = z where:
//! - x contains node voltages and branch currents
//! - A is the conductance/coefficient matrix
//! - z is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage-defined branches to nodes
//! - D holds the series resistance of inductor companions
//! - v is the vector of node voltages, v[0] is ground
//! - j is the vector of branch currents
//!
//! Devices never see the matrix directly. They register proxies with the
//! [`EquationSystemAdapter`] and stamp through them, see
//! [`crate::stamping`].

mod adapter;
mod context;
mod equations;
mod integration;
mod newton;
mod scalar;
mod simulator;

pub use adapter::{
    EquationBuilder, EquationEditor, EquationSystemAdapter, MatrixProxy, RhsProxy, SolutionProxy, SolutionView,
    StoredSolution,
};
pub use context::SimulationContext;
pub use equations::EquationSystem;
pub use integration::{IntegrationMethod, StateHistory, StateSample, MAX_GEAR_ORDER};
pub use newton::NewtonRaphson;
pub use scalar::Scalar;
pub use simulator::{LargeSignalCircuitModel, SimulationParameters, SimulationState};

/// Default absolute tolerance for voltages and currents.
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-11;

/// Default relative tolerance for voltages and currents.
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Default Newton-Raphson iteration cap per DC pass or time step.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// Minimum conductance to prevent singular matrix.
pub const MIN_CONDUCTANCE: f64 = 1e-12;

/// Norton conductance tying a variable to an initial condition.
pub const INITIAL_CONDITION_CONDUCTANCE: f64 = 1e10;
