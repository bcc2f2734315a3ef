use faer::linalg::solvers::SpSolver;
use faer::sparse::linalg::solvers::Lu;
use faer::sparse::SparseColMat;
use faer::Col;
use ifkit::{BlockTriangular, SparsityPattern};

use super::{check_rhs, check_square, LinearSolver};
use crate::error::{Error, Result};

/// Sparse direct LU backed by faer, the `"sparse_lu"` linear solver.
#[derive(Default)]
pub struct SparseLu {
    pattern: Option<SparsityPattern>,
    structure: Option<BlockTriangular>,
    lu: Option<Lu<usize, f64>>,
}

impl SparseLu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for SparseLu {
    fn name(&self) -> &str {
        "sparse_lu"
    }

    fn reset(&mut self, pattern: &SparsityPattern) -> Result<()> {
        check_square(pattern)?;
        self.structure = Some(BlockTriangular::new(pattern));
        self.pattern = Some(pattern.clone());
        self.lu = None;
        Ok(())
    }

    fn pattern(&self) -> Option<&SparsityPattern> {
        self.pattern.as_ref()
    }

    fn structure(&self) -> Option<&BlockTriangular> {
        self.structure.as_ref()
    }

    fn factorize(&mut self, values: &[f64]) -> Result<()> {
        let pattern = self.pattern.as_ref().ok_or(Error::NotFactorized)?;
        if values.len() != pattern.nnz() {
            return Err(Error::DimensionMismatch {
                what: "matrix values".to_string(),
                expected: pattern.nnz(),
                got: values.len(),
            });
        }
        self.lu = None;

        let n = pattern.nrow;
        let triplets: Vec<(usize, usize, f64)> = pattern
            .entries()
            .zip(values)
            .map(|((r, c), &v)| (r, c, v))
            .collect();
        let mat = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|_| Error::SingularMatrix)?;
        // faer's sparse LU panics on singular matrices rather than returning an error.
        let lu = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mat.sp_lu().ok()))
            .ok()
            .flatten()
            .ok_or(Error::SingularMatrix)?;
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&self, rhs: &mut [f64], nrhs: usize, transpose: bool) -> Result<()> {
        let lu = self.lu.as_ref().ok_or(Error::NotFactorized)?;
        let n = self.pattern.as_ref().map_or(0, |p| p.nrow);
        check_rhs(n, rhs, nrhs)?;
        if n == 0 {
            return Ok(());
        }
        for col in rhs.chunks_exact_mut(n) {
            let b = Col::<f64>::from_fn(n, |i| col[i]);
            let x = if transpose {
                lu.solve_transpose(&b)
            } else {
                lu.solve(&b)
            };
            for (i, dst) in col.iter_mut().enumerate() {
                *dst = x[i];
            }
        }
        Ok(())
    }
}
