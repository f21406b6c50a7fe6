//! Variable allocation and bound write handles over the equation system.
//!
//! Devices ask for proxies once, while the adapter is still open, and then
//! stamp through them on every iteration. Freezing fixes the variable count,
//! allocates the [`EquationSystem`] and binds every proxy issued so far to
//! its storage offset.

use std::collections::HashMap;

use log::debug;

use crate::error::{Result, SpiceError};

use super::equations::EquationSystem;
use super::scalar::Scalar;

/// Handle to a coefficient of the system matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixProxy(usize);

/// Handle to an element of the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RhsProxy(usize);

/// Handle to a component of the solution vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolutionProxy(usize);

/// Allocation side of the adapter, used before freeze.
pub trait EquationBuilder {
    /// Number of variables allocated so far.
    fn variable_count(&self) -> usize;

    /// Allocate a new variable and return its index.
    fn add_variable(&mut self) -> Result<usize>;

    /// Proxy for matrix coefficient (row, col). Same coordinates give the same proxy.
    fn matrix_proxy(&mut self, row: usize, col: usize) -> Result<MatrixProxy>;

    /// Proxy for right-hand side element `row`.
    fn rhs_proxy(&mut self, row: usize) -> Result<RhsProxy>;

    /// Proxy for solution component `index`.
    fn solution_proxy(&mut self, index: usize) -> Result<SolutionProxy>;
}

/// Stamping side of the adapter, used after freeze.
pub trait EquationEditor {
    /// Add `value` to the bound matrix coefficient.
    fn add_matrix(&mut self, proxy: MatrixProxy, value: f64) -> Result<()>;

    /// Add `value` to the bound right-hand side element.
    fn add_rhs(&mut self, proxy: RhsProxy, value: f64) -> Result<()>;
}

/// Read access to the last solution.
pub trait SolutionView {
    /// Value of the bound solution component.
    fn solution(&self, proxy: SolutionProxy) -> f64;
}

/// Adapter that owns the equation system and hands out proxies.
#[derive(Debug)]
pub struct EquationSystemAdapter<T: Scalar = f64> {
    variable_count: usize,
    matrix_slots: Vec<(usize, usize)>,
    matrix_lookup: HashMap<(usize, usize), MatrixProxy>,
    rhs_slots: Vec<usize>,
    rhs_lookup: HashMap<usize, RhsProxy>,
    solution_slots: Vec<usize>,
    solution_lookup: HashMap<usize, SolutionProxy>,
    /// Row-major offsets of `matrix_slots`, filled by freeze
    matrix_offsets: Vec<usize>,
    system: Option<EquationSystem<T>>,
}

impl<T: Scalar> Default for EquationSystemAdapter<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Scalar> EquationSystemAdapter<T> {
    /// Create an open adapter with `initial_variables` preallocated variables.
    pub fn new(initial_variables: usize) -> Self {
        Self {
            variable_count: initial_variables,
            matrix_slots: Vec::new(),
            matrix_lookup: HashMap::new(),
            rhs_slots: Vec::new(),
            rhs_lookup: HashMap::new(),
            solution_slots: Vec::new(),
            solution_lookup: HashMap::new(),
            matrix_offsets: Vec::new(),
            system: None,
        }
    }

    /// Whether [`freeze`](Self::freeze) has been called.
    pub fn is_frozen(&self) -> bool {
        self.system.is_some()
    }

    /// Total number of distinct proxies issued.
    pub fn proxy_count(&self) -> usize {
        self.matrix_slots.len() + self.rhs_slots.len() + self.solution_slots.len()
    }

    /// Finalize the variable count, allocate the system and bind all proxies.
    pub fn freeze(&mut self) -> Result<()> {
        if self.is_frozen() {
            return Err(SpiceError::AdapterFrozen);
        }
        let system = EquationSystem::new(self.variable_count);
        self.matrix_offsets = self
            .matrix_slots
            .iter()
            .map(|&(row, col)| system.offset(row, col))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "Equation system frozen: {} variables, {} proxies",
            self.variable_count,
            self.proxy_count()
        );
        self.system = Some(system);
        Ok(())
    }

    /// Zero matrix and right-hand side, keeping variables and bindings.
    pub fn clear(&mut self) {
        if let Some(system) = self.system.as_mut() {
            system.clear();
        }
    }

    /// Force variable `index` to zero.
    pub fn pin_zero(&mut self, index: usize) -> Result<()> {
        let system = self.system_mut()?;
        check_index(index, system.size())?;
        system.pin_zero(index);
        Ok(())
    }

    /// Tie variable `index` to `value` through a Norton source of `conductance`.
    pub fn hold_value(&mut self, index: usize, value: f64, conductance: f64) -> Result<()> {
        let system = self.system_mut()?;
        check_index(index, system.size())?;
        system.hold_value(index, T::from_double(value), T::from_double(conductance))
    }

    /// Whether the solution `x` satisfies the assembled system within tolerance.
    pub fn is_satisfied_by(&self, x: &[f64], relative: f64, absolute: f64) -> bool {
        self.system
            .as_ref()
            .is_some_and(|system| system.is_satisfied_by(x, relative, absolute))
    }

    /// Solve the frozen system.
    pub fn solve(&mut self) -> Result<&[T]> {
        Ok(self.system_mut()?.solve())
    }

    /// Solution component `index` in double precision, 0 before the first solve.
    pub fn solution_value(&self, index: usize) -> f64 {
        self.system
            .as_ref()
            .and_then(|s| s.solution().get(index))
            .map_or(0.0, |v| v.to_double())
    }

    /// The underlying system, available after freeze.
    pub fn system(&self) -> Option<&EquationSystem<T>> {
        self.system.as_ref()
    }

    fn system_mut(&mut self) -> Result<&mut EquationSystem<T>> {
        self.system.as_mut().ok_or(SpiceError::AdapterNotFrozen)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_frozen() {
            Err(SpiceError::AdapterFrozen)
        } else {
            Ok(())
        }
    }
}

fn check_index(index: usize, count: usize) -> Result<()> {
    if index >= count {
        Err(SpiceError::VariableOutOfRange { index, count })
    } else {
        Ok(())
    }
}

impl<T: Scalar> EquationBuilder for EquationSystemAdapter<T> {
    fn variable_count(&self) -> usize {
        self.variable_count
    }

    fn add_variable(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.variable_count += 1;
        Ok(self.variable_count - 1)
    }

    fn matrix_proxy(&mut self, row: usize, col: usize) -> Result<MatrixProxy> {
        self.ensure_open()?;
        check_index(row, self.variable_count)?;
        check_index(col, self.variable_count)?;
        if let Some(&proxy) = self.matrix_lookup.get(&(row, col)) {
            return Ok(proxy);
        }
        let proxy = MatrixProxy(self.matrix_slots.len());
        self.matrix_slots.push((row, col));
        self.matrix_lookup.insert((row, col), proxy);
        Ok(proxy)
    }

    fn rhs_proxy(&mut self, row: usize) -> Result<RhsProxy> {
        self.ensure_open()?;
        check_index(row, self.variable_count)?;
        if let Some(&proxy) = self.rhs_lookup.get(&row) {
            return Ok(proxy);
        }
        let proxy = RhsProxy(self.rhs_slots.len());
        self.rhs_slots.push(row);
        self.rhs_lookup.insert(row, proxy);
        Ok(proxy)
    }

    fn solution_proxy(&mut self, index: usize) -> Result<SolutionProxy> {
        self.ensure_open()?;
        check_index(index, self.variable_count)?;
        if let Some(&proxy) = self.solution_lookup.get(&index) {
            return Ok(proxy);
        }
        let proxy = SolutionProxy(self.solution_slots.len());
        self.solution_slots.push(index);
        self.solution_lookup.insert(index, proxy);
        Ok(proxy)
    }
}

impl<T: Scalar> EquationEditor for EquationSystemAdapter<T> {
    fn add_matrix(&mut self, proxy: MatrixProxy, value: f64) -> Result<()> {
        if value.is_nan() {
            let (row, col) = self.matrix_slots[proxy.0];
            return Err(SpiceError::NaNCoefficient {
                row,
                column: Some(col),
            });
        }
        let offset = *self
            .matrix_offsets
            .get(proxy.0)
            .ok_or(SpiceError::AdapterNotFrozen)?;
        self.system_mut()?.add_at_offset(offset, T::from_double(value));
        Ok(())
    }

    fn add_rhs(&mut self, proxy: RhsProxy, value: f64) -> Result<()> {
        let row = self.rhs_slots[proxy.0];
        self.system_mut()?.add_rhs(row, T::from_double(value))
    }
}

impl<T: Scalar> SolutionView for EquationSystemAdapter<T> {
    fn solution(&self, proxy: SolutionProxy) -> f64 {
        self.solution_value(self.solution_slots[proxy.0])
    }
}

/// A stored solution vector read through the proxies of an adapter.
pub struct StoredSolution<'a, T: Scalar> {
    adapter: &'a EquationSystemAdapter<T>,
    values: &'a [f64],
}

impl<'a, T: Scalar> StoredSolution<'a, T> {
    pub fn new(adapter: &'a EquationSystemAdapter<T>, values: &'a [f64]) -> Self {
        Self { adapter, values }
    }
}

impl<T: Scalar> SolutionView for StoredSolution<'_, T> {
    fn solution(&self, proxy: SolutionProxy) -> f64 {
        let index = self.adapter.solution_slots[proxy.0];
        self.values.get(index).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxies_are_idempotent() {
        let mut adapter = EquationSystemAdapter::<f64>::new(3);
        let a = adapter.matrix_proxy(1, 2).unwrap();
        let b = adapter.matrix_proxy(1, 2).unwrap();
        let c = adapter.matrix_proxy(2, 1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(adapter.rhs_proxy(0).unwrap(), adapter.rhs_proxy(0).unwrap());
        assert_eq!(
            adapter.solution_proxy(2).unwrap(),
            adapter.solution_proxy(2).unwrap()
        );
        assert_eq!(adapter.proxy_count(), 4);
    }

    #[test]
    fn test_frozen_adapter_rejects_allocation() {
        let mut adapter = EquationSystemAdapter::<f64>::new(2);
        let before = adapter.rhs_proxy(1).unwrap();
        adapter.freeze().unwrap();

        assert_eq!(adapter.add_variable(), Err(SpiceError::AdapterFrozen));
        assert_eq!(adapter.matrix_proxy(0, 0), Err(SpiceError::AdapterFrozen));
        assert_eq!(adapter.rhs_proxy(1), Err(SpiceError::AdapterFrozen));
        assert_eq!(adapter.freeze(), Err(SpiceError::AdapterFrozen));

        // Proxies issued before freeze stay usable
        adapter.add_rhs(before, 1.0).unwrap();
    }

    #[test]
    fn test_out_of_range_proxy() {
        let mut adapter = EquationSystemAdapter::<f64>::new(2);
        assert_eq!(
            adapter.matrix_proxy(0, 2),
            Err(SpiceError::VariableOutOfRange { index: 2, count: 2 })
        );
        let extra = adapter.add_variable().unwrap();
        assert_eq!(extra, 2);
        assert!(adapter.matrix_proxy(0, 2).is_ok());
    }

    #[test]
    fn test_stamp_solve_and_read_back() {
        let mut adapter = EquationSystemAdapter::<f64>::new(2);
        let g00 = adapter.matrix_proxy(0, 0).unwrap();
        let g11 = adapter.matrix_proxy(1, 1).unwrap();
        let z1 = adapter.rhs_proxy(1).unwrap();
        let x1 = adapter.solution_proxy(1).unwrap();
        adapter.freeze().unwrap();

        for _ in 0..2 {
            adapter.clear();
            adapter.add_matrix(g00, 1.0).unwrap();
            adapter.add_matrix(g11, 0.5).unwrap();
            adapter.add_rhs(z1, 2.0).unwrap();
            adapter.pin_zero(0).unwrap();
            adapter.solve().unwrap();
            assert_eq!(adapter.solution(x1), 4.0);
        }
    }

    #[test]
    fn test_stored_solution_reads_through_proxies() {
        let mut adapter = EquationSystemAdapter::<f64>::new(3);
        let x2 = adapter.solution_proxy(2).unwrap();
        let x1 = adapter.solution_proxy(1).unwrap();
        adapter.freeze().unwrap();

        let values = [0.0, 1.5, -2.0];
        let stored = StoredSolution::new(&adapter, &values);
        assert_eq!(stored.solution(x1), 1.5);
        assert_eq!(stored.solution(x2), -2.0);
        // The live solution is untouched
        assert_eq!(adapter.solution(x2), 0.0);
    }

    #[test]
    fn test_nan_is_rejected_through_proxy() {
        let mut adapter = EquationSystemAdapter::<f64>::new(2);
        let g = adapter.matrix_proxy(1, 0).unwrap();
        let z = adapter.rhs_proxy(1).unwrap();
        adapter.freeze().unwrap();
        assert_eq!(
            adapter.add_matrix(g, f64::NAN),
            Err(SpiceError::NaNCoefficient {
                row: 1,
                column: Some(0)
            })
        );
        assert_eq!(
            adapter.add_rhs(z, f64::NAN),
            Err(SpiceError::NaNCoefficient { row: 1, column: None })
        );
    }

    #[test]
    fn test_operations_require_freeze() {
        let mut adapter = EquationSystemAdapter::<f64>::new(1);
        assert_eq!(adapter.pin_zero(0), Err(SpiceError::AdapterNotFrozen));
        assert_eq!(adapter.hold_value(0, 1.0, 1e10), Err(SpiceError::AdapterNotFrozen));
        assert!(!adapter.is_satisfied_by(&[0.0], 1e-3, 1e-12));
        assert!(adapter.solve().is_err());
        assert_eq!(adapter.solution_value(0), 0.0);
    }
}
