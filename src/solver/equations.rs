//! Dense MNA equation system and its direct solver.

use crate::error::{Result, SpiceError};

use super::scalar::Scalar;

/// Dense linear system Ax = z.
#[derive(Debug, Clone)]
pub struct EquationSystem<T: Scalar = f64> {
    /// System matrix A (row-major)
    matrix: Vec<T>,
    /// Right-hand side z
    rhs: Vec<T>,
    /// Solution vector x
    solution: Vec<T>,
    /// Scratch copy of A used by the elimination
    work: Vec<T>,
    /// Scratch copy of z used by the elimination
    work_rhs: Vec<T>,
    /// Matrix dimension
    size: usize,
}

impl<T: Scalar> EquationSystem<T> {
    /// Create a zeroed system with `size` variables.
    pub fn new(size: usize) -> Self {
        Self {
            matrix: vec![T::zero(); size * size],
            rhs: vec![T::zero(); size],
            solution: vec![T::zero(); size],
            work: vec![T::zero(); size * size],
            work_rhs: vec![T::zero(); size],
            size,
        }
    }

    /// Number of variables.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Zero the matrix and the right-hand side. The last solution is kept.
    pub fn clear(&mut self) {
        self.matrix.fill(T::zero());
        self.rhs.fill(T::zero());
    }

    /// Add to matrix element at (row, col).
    pub fn add_matrix(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if value.is_nan() {
            return Err(SpiceError::NaNCoefficient {
                row,
                column: Some(col),
            });
        }
        let offset = self.offset(row, col)?;
        self.matrix[offset] += value;
        Ok(())
    }

    /// Add to the right-hand side element at `row`.
    pub fn add_rhs(&mut self, row: usize, value: T) -> Result<()> {
        if value.is_nan() {
            return Err(SpiceError::NaNCoefficient { row, column: None });
        }
        self.check_index(row)?;
        self.rhs[row] += value;
        Ok(())
    }

    /// Add to the matrix through a precomputed row-major offset.
    pub(crate) fn add_at_offset(&mut self, offset: usize, value: T) {
        self.matrix[offset] += value;
    }

    /// Force variable `row` to zero: row and column become identity, rhs becomes 0.
    pub fn pin_zero(&mut self, row: usize) {
        let n = self.size;
        for k in 0..n {
            self.matrix[row * n + k] = T::zero();
            self.matrix[k * n + row] = T::zero();
        }
        self.matrix[row * n + row] = T::one();
        self.rhs[row] = T::zero();
    }

    /// Tie variable `row` to `value` through a Norton source of `conductance`.
    ///
    /// The equation itself is kept, so a variable already fixed by another
    /// equation stays solvable and only sees a small correction.
    pub fn hold_value(&mut self, row: usize, value: T, conductance: T) -> Result<()> {
        self.add_matrix(row, row, conductance)?;
        self.add_rhs(row, conductance * value)
    }

    /// Whether `x` satisfies every equation of the assembled system.
    ///
    /// Row `i` passes when `|sum_j A[i][j] x[j] - z[i]|` stays below
    /// `absolute + relative * m`, `m` being the largest magnitude among
    /// the row's terms and its right-hand side.
    pub fn is_satisfied_by(&self, x: &[f64], relative: f64, absolute: f64) -> bool {
        if x.len() != self.size {
            return false;
        }
        let n = self.size;
        (0..n).all(|i| {
            let target = self.rhs[i].to_double();
            let mut sum = 0.0;
            let mut scale = target.abs();
            for (j, &value) in x.iter().enumerate() {
                let term = self.matrix[i * n + j].to_double() * value;
                sum += term;
                scale = scale.max(term.abs());
            }
            let residual = sum - target;
            residual.is_finite() && residual.abs() <= absolute + relative * scale
        })
    }

    /// Solve the system by Gaussian elimination with partial pivoting.
    ///
    /// The matrix and right-hand side are left untouched. A singular matrix
    /// produces non-finite components in the returned solution.
    pub fn solve(&mut self) -> &[T] {
        let n = self.size;
        self.work.copy_from_slice(&self.matrix);
        self.work_rhs.copy_from_slice(&self.rhs);

        for k in 0..n {
            // Find pivot
            let mut max_val = self.work[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.work[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if max_row != k {
                for j in 0..n {
                    self.work.swap(k * n + j, max_row * n + j);
                }
                self.work_rhs.swap(k, max_row);
            }

            // Eliminate
            let pivot = self.work[k * n + k];
            for i in (k + 1)..n {
                let factor = self.work[i * n + k] / pivot;
                if factor == T::zero() {
                    continue;
                }
                self.work[i * n + k] = T::zero();
                for j in (k + 1)..n {
                    let upper = self.work[k * n + j];
                    self.work[i * n + j] -= factor * upper;
                }
                let upper_rhs = self.work_rhs[k];
                self.work_rhs[i] -= factor * upper_rhs;
            }
        }

        // Back substitution
        for i in (0..n).rev() {
            let mut acc = self.work_rhs[i];
            for j in (i + 1)..n {
                acc -= self.work[i * n + j] * self.solution[j];
            }
            self.solution[i] = acc / self.work[i * n + i];
        }

        &self.solution
    }

    /// Last computed solution.
    pub fn solution(&self) -> &[T] {
        &self.solution
    }

    /// Read matrix element at (row, col).
    pub fn matrix_entry(&self, row: usize, col: usize) -> T {
        self.matrix[row * self.size + col]
    }

    /// Read right-hand side element.
    pub fn rhs_entry(&self, row: usize) -> T {
        self.rhs[row]
    }

    /// Row-major offset of (row, col).
    pub(crate) fn offset(&self, row: usize, col: usize) -> Result<usize> {
        self.check_index(row)?;
        self.check_index(col)?;
        Ok(row * self.size + col)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.size {
            return Err(SpiceError::VariableOutOfRange {
                index,
                count: self.size,
            });
        }
        Ok(())
    }
}
