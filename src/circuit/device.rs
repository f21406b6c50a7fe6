//! Immutable device definitions.

use std::fmt;
use std::sync::Arc;

use crate::components::{BjtParams, DiodeParams, Waveform};
use crate::error::{Result, SpiceError};

use super::subcircuit::SubcircuitDefinition;
use super::types::{BranchKind, BranchMetadata, DeviceId, NodeId};

/// Kind-specific parameters of a device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceKind {
    Resistor {
        resistance: f64,
    },
    Capacitor {
        capacitance: f64,
        initial_voltage: Option<f64>,
    },
    Inductor {
        inductance: f64,
        initial_current: Option<f64>,
    },
    VoltageSource(Waveform),
    CurrentSource(Waveform),
    /// Terminals: anode, cathode
    Diode(DiodeParams),
    /// Terminals: collector, base, emitter
    Bjt(BjtParams),
    /// Terminals: out+, out-, ctrl+, ctrl-
    Vccs {
        transconductance: f64,
    },
    /// Terminals: out+, out-, ctrl+, ctrl-
    Vcvs {
        gain: f64,
    },
    /// Output current is `gain` times the branch current of `ammeter`
    Cccs {
        gain: f64,
        ammeter: DeviceId,
    },
    /// Output voltage is `transresistance` times the branch current of `ammeter`
    Ccvs {
        transresistance: f64,
        ammeter: DeviceId,
    },
    Subcircuit(Arc<SubcircuitDefinition>),
}

impl DeviceKind {
    pub fn resistor(resistance: f64) -> Self {
        DeviceKind::Resistor { resistance }
    }

    pub fn capacitor(capacitance: f64) -> Self {
        DeviceKind::Capacitor {
            capacitance,
            initial_voltage: None,
        }
    }

    pub fn inductor(inductance: f64) -> Self {
        DeviceKind::Inductor {
            inductance,
            initial_current: None,
        }
    }

    pub fn dc_voltage(voltage: f64) -> Self {
        DeviceKind::VoltageSource(Waveform::Constant(voltage))
    }

    pub fn dc_current(current: f64) -> Self {
        DeviceKind::CurrentSource(Waveform::Constant(current))
    }

    pub fn subcircuit(definition: SubcircuitDefinition) -> Self {
        DeviceKind::Subcircuit(Arc::new(definition))
    }

    /// Human-readable kind name.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Resistor { .. } => "Resistor",
            DeviceKind::Capacitor { .. } => "Capacitor",
            DeviceKind::Inductor { .. } => "Inductor",
            DeviceKind::VoltageSource(_) => "VoltageSource",
            DeviceKind::CurrentSource(_) => "CurrentSource",
            DeviceKind::Diode(_) => "Diode",
            DeviceKind::Bjt(_) => "Bjt",
            DeviceKind::Vccs { .. } => "Vccs",
            DeviceKind::Vcvs { .. } => "Vcvs",
            DeviceKind::Cccs { .. } => "Cccs",
            DeviceKind::Ccvs { .. } => "Ccvs",
            DeviceKind::Subcircuit(_) => "Subcircuit",
        }
    }

    /// Fixed terminal count of the kind.
    pub fn terminal_count(&self) -> usize {
        match self {
            DeviceKind::Bjt(_) => 3,
            DeviceKind::Vccs { .. } | DeviceKind::Vcvs { .. } => 4,
            DeviceKind::Subcircuit(definition) => definition.terminals().len(),
            _ => 2,
        }
    }

    /// Whether this kind can serve as an ammeter for current-controlled sources.
    pub fn is_voltage_source(&self) -> bool {
        matches!(self, DeviceKind::VoltageSource(_))
    }

    /// Whether the kind carries an initial voltage or current, nested
    /// instances included.
    pub fn has_initial_condition(&self) -> bool {
        match self {
            DeviceKind::Capacitor { initial_voltage, .. } => initial_voltage.is_some(),
            DeviceKind::Inductor { initial_current, .. } => initial_current.is_some(),
            DeviceKind::Subcircuit(definition) => definition
                .devices()
                .iter()
                .any(|device| device.kind.has_initial_condition()),
            _ => false,
        }
    }

    /// Branches as pairs of terminal positions.
    pub fn branch_pairs(&self) -> Vec<(usize, usize, BranchKind)> {
        match self {
            DeviceKind::Inductor { .. }
            | DeviceKind::VoltageSource(_)
            | DeviceKind::Vcvs { .. }
            | DeviceKind::Ccvs { .. } => vec![(0, 1, BranchKind::VoltageDefined)],
            DeviceKind::Capacitor { .. }
            | DeviceKind::CurrentSource(_)
            | DeviceKind::Vccs { .. }
            | DeviceKind::Cccs { .. } => vec![(0, 1, BranchKind::CurrentDefined)],
            DeviceKind::Subcircuit(definition) => definition.branches().to_vec(),
            DeviceKind::Resistor { .. } | DeviceKind::Diode(_) | DeviceKind::Bjt(_) => Vec::new(),
        }
    }

    /// Check kind-specific parameters.
    pub fn validate(&self, device: &str) -> Result<()> {
        match self {
            DeviceKind::Resistor { resistance } => {
                if !resistance.is_finite() || *resistance == 0.0 {
                    return Err(SpiceError::invalid_parameter(
                        device,
                        "resistance",
                        format!("must be finite and non-zero, got {resistance}"),
                    ));
                }
            }
            DeviceKind::Capacitor {
                capacitance,
                initial_voltage,
            } => {
                positive(device, "capacitance", *capacitance)?;
                optional_finite(device, "initial_voltage", *initial_voltage)?;
            }
            DeviceKind::Inductor {
                inductance,
                initial_current,
            } => {
                positive(device, "inductance", *inductance)?;
                optional_finite(device, "initial_current", *initial_current)?;
            }
            DeviceKind::VoltageSource(waveform) | DeviceKind::CurrentSource(waveform) => {
                waveform
                    .validate()
                    .map_err(|(param, message)| SpiceError::invalid_parameter(device, param, message))?;
            }
            DeviceKind::Diode(params) => params.validate(device)?,
            DeviceKind::Bjt(params) => params.validate(device)?,
            DeviceKind::Vccs { transconductance } => finite(device, "transconductance", *transconductance)?,
            DeviceKind::Vcvs { gain } | DeviceKind::Cccs { gain, .. } => finite(device, "gain", *gain)?,
            DeviceKind::Ccvs { transresistance, .. } => finite(device, "transresistance", *transresistance)?,
            DeviceKind::Subcircuit(_) => {}
        }
        Ok(())
    }
}

fn finite(device: &str, param: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SpiceError::invalid_parameter(device, param, format!("must be finite, got {value}")))
    }
}

fn positive(device: &str, param: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SpiceError::invalid_parameter(device, param, format!("must be finite and positive, got {value}")))
    }
}

fn optional_finite(device: &str, param: &str, value: Option<f64>) -> Result<()> {
    value.map_or(Ok(()), |v| finite(device, param, v))
}

/// A device of a circuit definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub kind: DeviceKind,
    /// Node of each terminal, in the order of the kind
    pub terminals: Vec<NodeId>,
    /// Optional unique tag
    pub tag: Option<String>,
}

impl Device {
    pub fn new(kind: DeviceKind, terminals: Vec<NodeId>) -> Self {
        Self {
            kind,
            terminals,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Tag, or kind and handle for untagged devices.
    pub fn label(&self, id: DeviceId) -> String {
        match &self.tag {
            Some(tag) => tag.clone(),
            None => format!("{}{}", self.kind.name(), id),
        }
    }

    /// Check terminal arity and parameters.
    pub fn validate(&self, label: &str) -> Result<()> {
        let expected = self.kind.terminal_count();
        if self.terminals.len() != expected {
            return Err(SpiceError::WrongTerminalCount {
                device: label.to_string(),
                expected,
                actual: self.terminals.len(),
            });
        }
        self.kind.validate(label)
    }

    /// Check that a current-controlled source at `id` references an earlier
    /// voltage source among `siblings`.
    pub fn check_reference(&self, id: DeviceId, ammeter: DeviceId, siblings: &[Device]) -> Result<()> {
        let label = self.label(id);
        if ammeter >= id {
            return Err(SpiceError::unresolved_reference(
                label,
                ammeter,
                "ammeter must be added before the device sensing it",
            ));
        }
        match siblings.get(ammeter.index()) {
            Some(device) if device.kind.is_voltage_source() => Ok(()),
            Some(device) => Err(SpiceError::unresolved_reference(
                label,
                ammeter,
                format!("{} is not a voltage source", device.label(ammeter)),
            )),
            None => Err(SpiceError::unresolved_reference(label, ammeter, "no such device")),
        }
    }

    /// Handle of the sensed ammeter, if any.
    pub fn ammeter(&self) -> Option<DeviceId> {
        match self.kind {
            DeviceKind::Cccs { ammeter, .. } | DeviceKind::Ccvs { ammeter, .. } => Some(ammeter),
            _ => None,
        }
    }

    /// Branches of this device for the topology checks.
    pub fn branch_metadata(&self, id: DeviceId) -> Vec<BranchMetadata> {
        self.kind
            .branch_pairs()
            .into_iter()
            .filter_map(|(a, b, kind)| {
                let a = *self.terminals.get(a)?;
                let b = *self.terminals.get(b)?;
                Some(BranchMetadata::new(a, b, kind, id))
            })
            .collect()
    }

    /// Every unordered pair of terminal nodes.
    pub fn terminal_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.terminals.iter().enumerate().flat_map(move |(i, &a)| {
            self.terminals[i + 1..].iter().map(move |&b| (a, b))
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag.as_deref().unwrap_or(self.kind.name()))?;
        for node in &self.terminals {
            write!(f, " {node}")?;
        }
        Ok(())
    }
}
