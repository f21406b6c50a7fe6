//! # Spice Core
//!
//! A large-signal analog circuit simulation engine.
//!
//! This library provides:
//! - Circuit definitions with topology validation and reusable subcircuits
//! - Modified Nodal Analysis (MNA) based circuit simulation
//! - Support for linear components (R, C, L), independent and controlled
//!   sources and nonlinear components (diodes, BJTs)
//! - DC operating point and transient analysis with caller-chosen time steps
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`circuit`] - Circuit definitions, builder and topology validation
//! - [`components`] - Device models (resistors, capacitors, diodes, etc.)
//! - [`stamping`] - Reusable matrix contribution patterns
//! - [`solver`] - Equation system, Newton-Raphson and the simulation model
//! - [`error`] - Error type shared by all modules
//!
//! ## Usage
//!
//! ```
//! use spice_core::{CircuitBuilder, DeviceKind, LargeSignalCircuitModel, SimulationParameters};
//!
//! let mut builder = CircuitBuilder::new();
//! builder.add_device(&[1, 0], DeviceKind::dc_voltage(5.0))?;
//! builder.add_device(&[1, 2], DeviceKind::resistor(1e3))?;
//! builder.add_device(&[2, 0], DeviceKind::resistor(1e3))?;
//!
//! let mut model = LargeSignalCircuitModel::new(builder.build()?, SimulationParameters::default())?;
//! model.establish_dc_bias(false)?;
//! assert!((model.node_voltages()[2] - 2.5).abs() < 1e-9);
//!
//! model.advance_in_time(1e-6)?;
//! # Ok::<(), spice_core::SpiceError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! Each analysis point is found by Newton-Raphson iteration:
//!
//! 1. Every device stamps its companion model around the last solution
//! 2. Solve Ax = z for node voltages and branch currents
//! 3. Repeat until no device objects and node voltages settle
//!
//! Reactive elements (C, L) are discretized with backward Euler, the
//! trapezoidal rule (default) or Gear's method.

pub mod circuit;
pub mod components;
pub mod error;
pub mod solver;
pub mod stamping;

// Re-export main types for convenience
pub use circuit::{CircuitBuilder, CircuitDefinition, DeviceId, DeviceKind, NodeId, SubcircuitDefinition};
pub use error::{Result, SpiceError};
pub use solver::{IntegrationMethod, LargeSignalCircuitModel, SimulationParameters, SimulationState};

/// Boltzmann constant in J/K
pub const BOLTZMANN_CONSTANT: f64 = 1.380_649e-23;

/// Elementary charge in C
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Temperature at which device parameters are specified, in degrees Celsius
pub const NOMINAL_TEMPERATURE: f64 = 27.0;

/// Thermal voltage kT/q at `celsius` (about 25.86 mV at 27 C)
pub fn thermal_voltage(celsius: f64) -> f64 {
    BOLTZMANN_CONSTANT * (celsius + 273.15) / ELEMENTARY_CHARGE
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_thermal_voltage() {
        assert_relative_eq!(thermal_voltage(NOMINAL_TEMPERATURE), 0.025_865, max_relative = 1e-4);
        assert!(thermal_voltage(100.0) > thermal_voltage(0.0));
    }
}
