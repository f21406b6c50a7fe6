//! Subcircuit instances.
//!
//! An instance owns one model per inner device and maps the inner node
//! numbering onto the enclosing equation system: ground stays ground, each
//! terminal becomes the outer node it is connected to and every other inner
//! node, branch current or internal device node gets a fresh variable.

use std::sync::Arc;

use crate::circuit::SubcircuitDefinition;
use crate::error::{Result, SpiceError};
use crate::solver::{
    EquationBuilder, EquationEditor, MatrixProxy, RhsProxy, SimulationContext, SolutionProxy, SolutionView,
};

use super::{instantiate_models, DeviceModel, InitContext, LargeSignalDevice};

/// Analysis model of one subcircuit instance.
#[derive(Debug, Clone)]
pub struct SubcircuitModel {
    definition: Arc<SubcircuitDefinition>,
    outer_nodes: Vec<usize>,
    /// Outer variable of each inner variable, filled during registration
    node_map: Vec<usize>,
    devices: Vec<DeviceModel>,
}

impl SubcircuitModel {
    /// Instance of `definition` whose terminals connect to `outer_nodes`.
    pub fn new(definition: Arc<SubcircuitDefinition>, outer_nodes: Vec<usize>) -> Result<Self> {
        let expected = definition.terminals().len();
        if outer_nodes.len() != expected {
            return Err(SpiceError::WrongTerminalCount {
                device: "Subcircuit".to_string(),
                expected,
                actual: outer_nodes.len(),
            });
        }
        let devices = instantiate_models(definition.devices())?;
        Ok(Self {
            definition,
            outer_nodes,
            node_map: Vec::new(),
            devices,
        })
    }

    pub fn definition(&self) -> &SubcircuitDefinition {
        &self.definition
    }

    /// Inner device models, in definition order.
    pub fn devices(&self) -> &[DeviceModel] {
        &self.devices
    }

    pub fn is_nonlinear(&self) -> bool {
        self.devices.iter().any(DeviceModel::is_nonlinear)
    }

    /// Outer variable an inner variable was mapped to.
    pub fn outer_variable(&self, inner: usize) -> Option<usize> {
        self.node_map.get(inner).copied()
    }
}

impl LargeSignalDevice for SubcircuitModel {
    fn register_additional_variables(&mut self, builder: &mut dyn EquationBuilder) -> Result<()> {
        let mut map = vec![0; self.definition.node_count()];
        for (&inner, &outer) in self.definition.terminals().iter().zip(&self.outer_nodes) {
            map[inner] = outer;
        }
        for inner in self.definition.internal_nodes() {
            map[inner] = builder.add_variable()?;
        }
        self.node_map = map;

        let mut remap = RemappingBuilder {
            inner: builder,
            map: &mut self.node_map,
        };
        for device in self.devices.iter_mut() {
            device.register_additional_variables(&mut remap)?;
        }
        Ok(())
    }

    fn initialize(&mut self, builder: &mut dyn EquationBuilder, ctx: &InitContext<'_>) -> Result<()> {
        let branches: Vec<Option<usize>> = self.devices.iter().map(|d| d.branch_variable()).collect();
        let inner_ctx = InitContext::new(ctx.simulation, &branches);
        let mut remap = RemappingBuilder {
            inner: builder,
            map: &mut self.node_map,
        };
        for device in self.devices.iter_mut() {
            device.initialize(&mut remap, &inner_ctx)?;
        }
        Ok(())
    }

    // Proxies are already bound to outer variables, stamping passes through.
    fn apply_model_values(&mut self, editor: &mut dyn EquationEditor, ctx: &SimulationContext) -> Result<()> {
        for device in self.devices.iter_mut() {
            device.apply_model_values(editor, ctx)?;
        }
        Ok(())
    }

    fn on_equation_solved(&mut self, solution: &dyn SolutionView, ctx: &mut SimulationContext) {
        for device in self.devices.iter_mut() {
            device.on_equation_solved(solution, ctx);
        }
    }

    fn on_step_committed(&mut self, ctx: &SimulationContext) {
        for device in self.devices.iter_mut() {
            device.on_step_committed(ctx);
        }
    }
}

/// Builder that translates inner variable indices to outer ones.
struct RemappingBuilder<'a> {
    inner: &'a mut dyn EquationBuilder,
    map: &'a mut Vec<usize>,
}

impl RemappingBuilder<'_> {
    fn outer(&self, local: usize) -> Result<usize> {
        self.map.get(local).copied().ok_or(SpiceError::VariableOutOfRange {
            index: local,
            count: self.map.len(),
        })
    }
}

impl EquationBuilder for RemappingBuilder<'_> {
    fn variable_count(&self) -> usize {
        self.map.len()
    }

    fn add_variable(&mut self) -> Result<usize> {
        let outer = self.inner.add_variable()?;
        self.map.push(outer);
        Ok(self.map.len() - 1)
    }

    fn matrix_proxy(&mut self, row: usize, col: usize) -> Result<MatrixProxy> {
        let (row, col) = (self.outer(row)?, self.outer(col)?);
        self.inner.matrix_proxy(row, col)
    }

    fn rhs_proxy(&mut self, row: usize) -> Result<RhsProxy> {
        let row = self.outer(row)?;
        self.inner.rhs_proxy(row)
    }

    fn solution_proxy(&mut self, index: usize) -> Result<SolutionProxy> {
        let index = self.outer(index)?;
        self.inner.solution_proxy(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{CircuitBuilder, DeviceKind};
    use crate::components::test_support::Harness;
    use crate::components::{VoltageSource, Waveform};

    fn divider() -> Arc<SubcircuitDefinition> {
        let mut builder = CircuitBuilder::new();
        builder.add_device(&[1, 3], DeviceKind::resistor(1e3)).unwrap();
        builder.add_device(&[3, 2], DeviceKind::resistor(1e3)).unwrap();
        Arc::new(builder.build_subcircuit(&[1, 2]).unwrap())
    }

    #[test]
    fn test_internal_node_gets_fresh_variable() {
        let mut source = VoltageSource::new([1, 0], Waveform::Constant(2.0));
        let mut sub = SubcircuitModel::new(divider(), vec![1, 0]).unwrap();
        let mut harness = Harness::new(2);
        harness.run(&mut [&mut source, &mut sub]).unwrap();

        // Variable 2 is the source branch, 3 the divider midpoint
        assert_eq!(sub.outer_variable(1), Some(1));
        assert_eq!(sub.outer_variable(2), Some(0));
        assert_eq!(sub.outer_variable(3), Some(3));
        assert!((harness.voltage(3) - 1.0).abs() < 1e-12);
        assert!((source.current() + 1e-3).abs() < 1e-12);
    }

    #[test]
    fn test_inner_branch_variables_are_remapped() {
        // Gain-of-two amplifier: input load on 1, output on 2
        let mut builder = CircuitBuilder::new();
        builder.add_device(&[1, 0], DeviceKind::resistor(1e3)).unwrap();
        builder.add_device(&[2, 0, 1, 0], DeviceKind::Vcvs { gain: 2.0 }).unwrap();
        builder.add_device(&[2, 0], DeviceKind::resistor(1e3)).unwrap();
        let amplifier = Arc::new(builder.build_subcircuit(&[1, 2]).unwrap());

        let mut source = VoltageSource::new([1, 0], Waveform::Constant(1.5));
        let mut sub = SubcircuitModel::new(amplifier, vec![1, 2]).unwrap();
        assert!(!sub.is_nonlinear());
        let mut harness = Harness::new(3);
        harness.run(&mut [&mut source, &mut sub]).unwrap();

        // Inner variable 3 is the VCVS branch, allocated after the source branch
        assert_eq!(sub.outer_variable(3), Some(4));
        assert!((harness.voltage(2) - 3.0).abs() < 1e-12);
        assert_eq!(sub.devices()[1].probe("V"), Some(harness.voltage(2)));
    }

    #[test]
    fn test_terminal_count_must_match() {
        let err = SubcircuitModel::new(divider(), vec![1]).unwrap_err();
        assert!(matches!(
            err,
            SpiceError::WrongTerminalCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }
}
