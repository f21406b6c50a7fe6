//! Error types for the simulation engine.
//!
//! This module provides a unified error type [`SpiceError`] that covers
//! circuit construction, topology validation, equation-system misuse and
//! numeric failures during simulation.

use thiserror::Error;

use crate::circuit::DeviceId;

/// Result type alias using [`SpiceError`].
pub type Result<T> = std::result::Result<T, SpiceError>;

/// Unified error type for all engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpiceError {
    // ============ Topology Errors ============
    /// Some nodes cannot reach ground through any device
    #[error("No DC path to ground for nodes {nodes:?}")]
    NoDcPathToGround { nodes: Vec<usize> },

    /// Subcircuit inner nodes split into several partitions
    #[error("Subcircuit is not connected, found {} partitions: {components:?}", components.len())]
    NotConnectedSubcircuit { components: Vec<Vec<usize>> },

    /// Loop made only of voltage-defined branches
    #[error("Voltage-defined branches form a cycle through devices {devices:?}")]
    VoltageBranchCycle { devices: Vec<DeviceId> },

    /// Current-defined branches that are the only connection between two parts of the circuit
    #[error("Current-defined branches form a cutset through devices {devices:?}")]
    CurrentBranchCutset { devices: Vec<DeviceId> },

    // ============ Configuration Errors ============
    /// Device tag used more than once
    #[error("Circuit already contains a device tagged '{tag}'")]
    DuplicateTag { tag: String },

    /// Connection list does not match the device arity
    #[error("Device '{device}' expects {expected} terminals, got {actual}")]
    WrongTerminalCount {
        device: String,
        expected: usize,
        actual: usize,
    },

    /// Cross-device reference that does not resolve to a suitable device
    #[error("Device '{device}' references {reference}: {message}")]
    UnresolvedReference {
        device: String,
        reference: DeviceId,
        message: String,
    },

    /// Subcircuit terminal list is malformed
    #[error("Invalid subcircuit terminals: {message}")]
    InvalidSubcircuitTerminals { message: String },

    /// Invalid device parameter value
    #[error("Invalid parameter '{param}' for device '{device}': {message}")]
    InvalidParameter {
        device: String,
        param: String,
        message: String,
    },

    // ============ Equation System Errors ============
    /// Variables or proxies requested after the adapter was frozen
    #[error("Equation system adapter is already frozen")]
    AdapterFrozen,

    /// Stamping or solving attempted before freeze
    #[error("Equation system adapter is not frozen yet")]
    AdapterNotFrozen,

    /// Variable index outside the allocated range
    #[error("Variable index {index} out of range (variable count {count})")]
    VariableOutOfRange { index: usize, count: usize },

    /// NaN written into the coefficient matrix or right-hand side
    #[error("NaN coefficient written at row {row}{}", column.map(|c| format!(", column {c}")).unwrap_or_default())]
    NaNCoefficient { row: usize, column: Option<usize> },

    // ============ Simulation Errors ============
    /// Solution of the equation system contains non-finite values
    #[error("NaN in equation system solution")]
    NaNInSolution,

    /// Newton-Raphson iteration did not converge
    #[error("Newton-Raphson iterations did not converge within {iterations} iterations")]
    IterationCountExceeded { iterations: usize },

    /// Non-positive or non-finite time step
    #[error("Invalid time step {time_step:e}, must be finite and positive")]
    InvalidTimeStep { time_step: f64 },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },
}

impl SpiceError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(
        device: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            device: device.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create an unresolved reference error
    pub fn unresolved_reference(
        device: impl Into<String>,
        reference: DeviceId,
        message: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            device: device.into(),
            reference,
            message: message.into(),
        }
    }

    /// Create an invalid subcircuit terminals error
    pub fn invalid_terminals(message: impl Into<String>) -> Self {
        Self::InvalidSubcircuitTerminals {
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_simulation_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// True for errors raised by the topology validator.
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::NoDcPathToGround { .. }
                | Self::NotConnectedSubcircuit { .. }
                | Self::VoltageBranchCycle { .. }
                | Self::CurrentBranchCutset { .. }
        )
    }

    /// True for numeric failures during simulation.
    pub fn is_numeric_error(&self) -> bool {
        matches!(
            self,
            Self::NaNInSolution | Self::IterationCountExceeded { .. } | Self::NaNCoefficient { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_offending_items() {
        let err = SpiceError::NoDcPathToGround { nodes: vec![2, 5] };
        assert_eq!(err.to_string(), "No DC path to ground for nodes [2, 5]");

        let err = SpiceError::NaNCoefficient {
            row: 3,
            column: Some(1),
        };
        assert_eq!(err.to_string(), "NaN coefficient written at row 3, column 1");

        let err = SpiceError::NaNCoefficient {
            row: 3,
            column: None,
        };
        assert_eq!(err.to_string(), "NaN coefficient written at row 3");
    }

    #[test]
    fn test_error_classes() {
        assert!(SpiceError::NotConnectedSubcircuit { components: vec![] }.is_topology_error());
        assert!(SpiceError::NaNInSolution.is_numeric_error());
        assert!(!SpiceError::AdapterFrozen.is_numeric_error());
        assert!(!SpiceError::invalid_parameter("R1", "resistance", "zero").is_topology_error());
    }
}
