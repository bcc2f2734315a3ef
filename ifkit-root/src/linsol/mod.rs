//! Linear solver capability and backends.
//!
//! A [`LinearSolver`] is bound to a sparsity pattern once by
//! [`reset`](LinearSolver::reset), then factorized with fresh numeric values as
//! often as needed. Each factorization serves any number of right-hand sides,
//! in either orientation.

mod lu;
#[cfg(feature = "sparse")]
mod sparse_lu;

pub use lu::DenseLu;
#[cfg(feature = "sparse")]
pub use sparse_lu::SparseLu;

use ifkit::{BlockTriangular, Bvec, SparsityPattern};

use crate::error::{Error, Result};

/// A direct linear solver for square systems with a fixed sparsity pattern.
pub trait LinearSolver: Send {
    fn name(&self) -> &str;

    /// Bind the solver to `pattern`, discarding any factorization.
    fn reset(&mut self, pattern: &SparsityPattern) -> Result<()>;

    /// The pattern passed to the last [`reset`](LinearSolver::reset).
    fn pattern(&self) -> Option<&SparsityPattern>;

    /// Factorize the matrix whose non-zeros, in pattern storage order, are `values`.
    fn factorize(&mut self, values: &[f64]) -> Result<()>;

    /// Solve in place for `nrhs` right-hand sides stacked column by column in `rhs`.
    ///
    /// With `transpose`, solves with the transposed matrix.
    fn solve(&self, rhs: &mut [f64], nrhs: usize, transpose: bool) -> Result<()>;

    /// Block triangular form of the pattern, computed once by
    /// [`reset`](LinearSolver::reset).
    fn structure(&self) -> Option<&BlockTriangular>;

    fn structural_rank(&self) -> usize {
        self.structure().map_or(0, BlockTriangular::structural_rank)
    }

    fn is_singular(&self) -> bool {
        self.structure().map_or(true, BlockTriangular::is_singular)
    }

    /// Boolean shadow of [`solve`](LinearSolver::solve) for one lane vector.
    fn structural_solve(&self, rhs: &[Bvec], sol: &mut [Bvec], transpose: bool) -> Result<()> {
        let structure = self.structure().ok_or(Error::NotFactorized)?;
        structure.solve(rhs, sol, transpose);
        Ok(())
    }
}

/// Validate a reset pattern: square, returns its order.
pub(crate) fn check_square(pattern: &SparsityPattern) -> Result<usize> {
    if !pattern.is_square() {
        return Err(Error::DimensionMismatch {
            what: "linear system columns".to_string(),
            expected: pattern.nrow,
            got: pattern.ncol,
        });
    }
    Ok(pattern.nrow)
}

/// Validate the buffer handed to a solve: `nrhs` columns of length `n`.
pub(crate) fn check_rhs(n: usize, rhs: &[f64], nrhs: usize) -> Result<()> {
    if rhs.len() != n * nrhs {
        return Err(Error::DimensionMismatch {
            what: "right-hand side".to_string(),
            expected: n * nrhs,
            got: rhs.len(),
        });
    }
    Ok(())
}
