use ifkit::{BlockTriangular, SparsityPattern};
use num_traits::Float;

use super::{check_rhs, check_square, LinearSolver};
use crate::error::{Error, Result};

/// Result of LU factorization with partial pivoting.
///
/// Stores the combined L/U factors in a single matrix (L below diagonal,
/// U on and above diagonal) plus the row permutation.
pub(crate) struct LuFactors<F> {
    /// Combined L/U matrix: L is below the diagonal (unit diagonal implicit),
    /// U is on and above the diagonal.
    lu: Vec<Vec<F>>,
    /// Row permutation: `perm[i]` is the original row index for factored row `i`.
    perm: Vec<usize>,
    n: usize,
}

/// Factorize an `n x n` matrix via LU decomposition with partial pivoting.
///
/// Returns `None` if the matrix is singular (zero or near-zero pivot).
// Explicit indexing is clearer for pivoted LU: row/col indices drive pivot search and elimination
#[allow(clippy::needless_range_loop)]
pub(crate) fn lu_factor<F: Float>(a: &[Vec<F>]) -> Option<LuFactors<F>> {
    let n = a.len();
    debug_assert!(a.iter().all(|row| row.len() == n));

    let mut lu: Vec<Vec<F>> = a.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();

    let eps = F::from(1e-12).unwrap_or_else(|| F::epsilon());

    for col in 0..n {
        let mut max_val = lu[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let v = lu[row][col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }

        if max_val < eps {
            return None;
        }

        if max_row != col {
            lu.swap(col, max_row);
            perm.swap(col, max_row);
        }

        let pivot = lu[col][col];

        for row in (col + 1)..n {
            let factor = lu[row][col] / pivot;
            lu[row][col] = factor;
            for j in (col + 1)..n {
                let val = lu[col][j];
                lu[row][j] = lu[row][j] - factor * val;
            }
        }
    }

    Some(LuFactors { lu, perm, n })
}

/// Solve `A * x = b` in place using a pre-computed LU factorization.
// Explicit indexing is clearer for forward/back substitution with permuted indices
#[allow(clippy::needless_range_loop)]
pub(crate) fn lu_back_solve<F: Float>(factors: &LuFactors<F>, b: &mut [F]) {
    let n = factors.n;
    debug_assert_eq!(b.len(), n);

    let mut y: Vec<F> = factors.perm.iter().map(|&p| b[p]).collect();

    // L * y' = P b, L has unit diagonal
    for i in 1..n {
        for j in 0..i {
            let l_ij = factors.lu[i][j];
            let y_j = y[j];
            y[i] = y[i] - l_ij * y_j;
        }
    }

    // U * x = y'
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum = sum - factors.lu[i][j] * b[j];
        }
        b[i] = sum / factors.lu[i][i];
    }
}

/// Solve `Aᵀ * x = b` in place using a pre-computed LU factorization.
///
/// With `P A = L U`, the transposed system reads `Uᵀ Lᵀ P x = b`.
#[allow(clippy::needless_range_loop)]
pub(crate) fn lu_back_solve_transpose<F: Float>(factors: &LuFactors<F>, b: &mut [F]) {
    let n = factors.n;
    debug_assert_eq!(b.len(), n);

    // Uᵀ * y = b, forward
    let mut y = vec![F::zero(); n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum = sum - factors.lu[j][i] * y[j];
        }
        y[i] = sum / factors.lu[i][i];
    }

    // Lᵀ * w = y, backward, unit diagonal
    for i in (0..n).rev() {
        for j in (i + 1)..n {
            let l_ji = factors.lu[j][i];
            let w_j = y[j];
            y[i] = y[i] - l_ji * w_j;
        }
    }

    // P x = w
    for i in 0..n {
        b[factors.perm[i]] = y[i];
    }
}

/// Dense LU with partial pivoting, the `"lu"` linear solver.
///
/// The sparse pattern is scattered into a dense matrix at every factorization,
/// which suits the small unknown vectors typical of implicit functions.
#[derive(Default)]
pub struct DenseLu {
    pattern: Option<SparsityPattern>,
    structure: Option<BlockTriangular>,
    factors: Option<LuFactors<f64>>,
}

impl DenseLu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for DenseLu {
    fn name(&self) -> &str {
        "lu"
    }

    fn reset(&mut self, pattern: &SparsityPattern) -> Result<()> {
        check_square(pattern)?;
        self.structure = Some(BlockTriangular::new(pattern));
        self.pattern = Some(pattern.clone());
        self.factors = None;
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
        let n = pattern.nrow;
        let mut a = vec![vec![0.0; n]; n];
        for (&v, (r, c)) in values.iter().zip(pattern.entries()) {
            a[r][c] = v;
        }
        self.factors = None;
        self.factors = Some(lu_factor(&a).ok_or(Error::SingularMatrix)?);
        Ok(())
    }

    fn solve(&self, rhs: &mut [f64], nrhs: usize, transpose: bool) -> Result<()> {
        let factors = self.factors.as_ref().ok_or(Error::NotFactorized)?;
        let n = factors.n;
        check_rhs(n, rhs, nrhs)?;
        if n == 0 {
            return Ok(());
        }
        for col in rhs.chunks_exact_mut(n) {
            if transpose {
                lu_back_solve_transpose(factors, col);
            } else {
                lu_back_solve(factors, col);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One-shot `A * x = b`, `None` if singular.
    fn lu_solve<F: Float>(a: &[Vec<F>], b: &[F]) -> Option<Vec<F>> {
        let factors = lu_factor(a)?;
        let mut x = b.to_vec();
        lu_back_solve(&factors, &mut x);
        Some(x)
    }

    #[test]
    fn lu_solve_identity() {
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let b = vec![3.0, 7.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn lu_solve_2x2() {
        // [2 1] [x0]   [5]
        // [1 3] [x1] = [7]
        // Solution: x0 = 8/5, x1 = 9/5
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let b = vec![5.0, 7.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 1.6).abs() < 1e-12);
        assert!((x[1] - 1.8).abs() < 1e-12);
    }

    #[test]
    fn lu_solve_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let b = vec![3.0, 6.0];
        assert!(lu_solve(&a, &b).is_none());
    }

    #[test]
    fn lu_solve_needs_pivoting() {
        // First pivot is zero: requires row swap
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let b = vec![3.0, 7.0];
        let x = lu_solve(&a, &b).unwrap();
        assert!((x[0] - 7.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn transpose_solve_3x3() {
        // Aᵀ x = b checked by multiplying back.
        let a = vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![7.0, 8.0, 0.0],
        ];
        let b = [14.0, 32.0, 23.0];
        let factors = lu_factor(&a).unwrap();
        let mut x = b;
        lu_back_solve_transpose(&factors, &mut x);
        for j in 0..3 {
            let atx: f64 = (0..3).map(|i| a[i][j] * x[i]).sum();
            assert!((atx - b[j]).abs() < 1e-10, "row {}: {} vs {}", j, atx, b[j]);
        }
    }

    #[test]
    fn dense_lu_multi_rhs() {
        // [2 0 1]
        // [1 3 0]
        // [0 1 4]
        let sp = SparsityPattern::new(3, 3, [(0, 0), (1, 0), (1, 1), (2, 1), (0, 2), (2, 2)]);
        let mut values = vec![0.0; sp.nnz()];
        for (k, (r, c)) in sp.entries().enumerate() {
            values[k] = [[2.0, 0.0, 1.0], [1.0, 3.0, 0.0], [0.0, 1.0, 4.0]][r][c];
        }
        let mut lu = DenseLu::new();
        lu.reset(&sp).unwrap();
        lu.factorize(&values).unwrap();

        let mut rhs = vec![3.0, 4.0, 5.0, 1.0, 0.0, 0.0];
        lu.solve(&mut rhs, 2, false).unwrap();
        // First column: A * [1, 1, 1] = [3, 4, 5]
        for i in 0..3 {
            assert!((rhs[i] - 1.0).abs() < 1e-12);
        }
        let col2 = lu_solve(
            &[vec![2.0, 0.0, 1.0], vec![1.0, 3.0, 0.0], vec![0.0, 1.0, 4.0]],
            &[1.0, 0.0, 0.0],
        )
        .unwrap();
        for i in 0..3 {
            assert!((rhs[3 + i] - col2[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn solve_before_factorize_fails() {
        let mut lu = DenseLu::new();
        lu.reset(&SparsityPattern::diagonal(2)).unwrap();
        let mut rhs = vec![1.0, 2.0];
        assert_eq!(lu.solve(&mut rhs, 1, false), Err(Error::NotFactorized));
    }

    #[test]
    fn numerically_singular_is_reported() {
        let mut lu = DenseLu::new();
        lu.reset(&SparsityPattern::dense(2, 2)).unwrap();
        assert_eq!(lu.factorize(&[1.0, 1.0, 1.0, 1.0]), Err(Error::SingularMatrix));
        assert!(!lu.is_singular());
        assert_eq!(lu.structural_rank(), 2);
    }
}
