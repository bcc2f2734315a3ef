//! The [`Oracle`] capability: a vector function with multiple sparse inputs and
//! outputs that can be evaluated, differentiated and traced for dependencies.
//!
//! # Buffer conventions
//!
//! Every input and output is passed as the slice of its structural non-zeros, in the
//! storage order of its [`SparsityPattern`].
//!
//! - An input slot holding `None` is treated as all zeros.
//! - An output slot holding `None` is not requested and is left alone.
//! - Directional calls (`forward`, `reverse`) stack their `nfwd`/`nadj` directions
//!   direction-major: direction `d` of input `i` occupies
//!   `d * nnz_in(i) .. (d + 1) * nnz_in(i)` of the seed slice.
//! - `reverse` and `sp_reverse` accumulate into their input-side slices (`+=` and
//!   `|=` respectively). `forward`, `eval` and `sp_forward` overwrite.
//!
//! The four propagation operations are mutually consistent: a numeric sensitivity
//! can only be non-zero where the boolean propagation reports a dependency.

use std::sync::Arc;

use crate::bits::Bvec;
use crate::error::{OracleError, Result};
use crate::sparsity::SparsityPattern;

/// Numeric input slots of an oracle call.
pub type Args<'a> = [Option<&'a [f64]>];
/// Numeric output slots of an oracle call.
pub type Outs<'a> = [Option<&'a mut [f64]>];
/// Dependency input slots.
pub type BitArgs<'a> = [Option<&'a [Bvec]>];
/// Dependency output slots.
pub type BitOuts<'a> = [Option<&'a mut [Bvec]>];

/// A differentiable vector function with sparse inputs and outputs.
pub trait Oracle: Send + Sync {
    fn name(&self) -> &str;

    /// Number of inputs.
    fn n_in(&self) -> usize;

    /// Number of outputs.
    fn n_out(&self) -> usize;

    /// Sparsity pattern of input `i`.
    fn sparsity_in(&self, i: usize) -> &SparsityPattern;

    /// Sparsity pattern of output `i`.
    fn sparsity_out(&self, i: usize) -> &SparsityPattern;

    fn nnz_in(&self, i: usize) -> usize {
        self.sparsity_in(i).nnz()
    }

    fn nnz_out(&self, i: usize) -> usize {
        self.sparsity_out(i).nnz()
    }

    /// Scratch lanes required by [`sp_forward`](Oracle::sp_forward) and
    /// [`sp_reverse`](Oracle::sp_reverse).
    fn sz_w(&self) -> usize {
        0
    }

    /// Numeric evaluation.
    fn eval(&self, arg: &Args<'_>, res: &mut Outs<'_>) -> Result<()>;

    /// Oracle computing `∂ out[iout] / ∂ in[iin]`.
    ///
    /// The returned oracle takes the same inputs as `self` and has a single output
    /// of shape `nnz_out(iout) × nnz_in(iin)`. Building it may be expensive;
    /// callers cache the result.
    fn jacobian(&self, iin: usize, iout: usize) -> Result<Arc<dyn Oracle>>;

    /// Forward directional derivatives at `arg` for `nfwd` stacked seed directions.
    fn forward(
        &self,
        arg: &Args<'_>,
        fseed: &Args<'_>,
        fsens: &mut Outs<'_>,
        nfwd: usize,
    ) -> Result<()>;

    /// Adjoint derivatives at `arg` for `nadj` stacked adjoint directions,
    /// accumulated into `asens`.
    fn reverse(
        &self,
        arg: &Args<'_>,
        aseed: &Args<'_>,
        asens: &mut Outs<'_>,
        nadj: usize,
    ) -> Result<()>;

    /// Forward dependency propagation: each output lane set is the union of the
    /// lane sets of the inputs it may depend on.
    fn sp_forward(&self, arg: &BitArgs<'_>, res: &mut BitOuts<'_>, w: &mut [Bvec]) -> Result<()>;

    /// Reverse dependency propagation: every input an output may depend on
    /// receives that output's lanes.
    fn sp_reverse(&self, arg: &mut BitOuts<'_>, res: &BitArgs<'_>, w: &mut [Bvec]) -> Result<()>;
}

impl std::fmt::Debug for dyn Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracle")
            .field("name", &self.name())
            .field("n_in", &self.n_in())
            .field("n_out", &self.n_out())
            .finish()
    }
}

/// Check that a slot list has one entry per input or output.
pub fn check_slots(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(OracleError::DimensionMismatch {
            what: format!("{} slots", what),
            expected,
            got,
        });
    }
    Ok(())
}

/// Check the length of one slot buffer.
pub fn check_len(what: &str, i: usize, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(OracleError::DimensionMismatch {
            what: format!("{} {}", what, i),
            expected,
            got,
        });
    }
    Ok(())
}
