//! One traversal for both derivative propagation and dependency propagation.
//!
//! By the implicit function theorem, with `J = ∂r/∂z` at the solved point,
//!
//! ```text
//! dz = -J⁻¹ (∂r/∂p · dp)                       (forward)
//! p̄ += (∂r/∂p)ᵀ λ,  λ = -J⁻ᵀ (z̄ + (∂g/∂z)ᵀ ḡ)    (reverse)
//! ```
//!
//! where `g` are the auxiliary outputs. [`forward_sweep`] and [`reverse_sweep`]
//! spell this out once over a [`Sweep`], which supplies the oracle propagation
//! and the linear solve for one "ring": real numbers with a factorized solve
//! ([`NumericSweep`]), or dependency bit sets with a structural solve
//! ([`BitSweep`]). A dependency reported by the bit ring therefore covers every
//! numeric sensitivity that can be non-zero.

use ifkit::oracle::Args;
use ifkit::{Bvec, Oracle};

use crate::error::Result;
use crate::linsol::LinearSolver;

/// Oracle propagation and linear solve over one element type.
pub(crate) trait Sweep {
    type Elem: Copy + Default;

    /// Propagate input seeds to output sensitivities, overwriting them.
    fn oracle_forward(
        &mut self,
        seed: &[Option<&[Self::Elem]>],
        sens: &mut [Option<&mut [Self::Elem]>],
    ) -> Result<()>;

    /// Propagate output seeds back to input sensitivities, accumulating.
    fn oracle_reverse(
        &mut self,
        seed: &[Option<&[Self::Elem]>],
        sens: &mut [Option<&mut [Self::Elem]>],
    ) -> Result<()>;

    /// `sol = -J⁻¹ rhs` (or `-J⁻ᵀ rhs`), for every stacked direction.
    fn solve_neg(&mut self, rhs: &[Self::Elem], sol: &mut [Self::Elem], transpose: bool)
        -> Result<()>;
}

/// Real-valued sweep for `ndir` stacked directions at a solved point.
///
/// The linear solver must already be factorized at that point.
pub(crate) struct NumericSweep<'a> {
    pub(crate) oracle: &'a dyn Oracle,
    pub(crate) arg: &'a Args<'a>,
    pub(crate) linsol: &'a dyn LinearSolver,
    pub(crate) ndir: usize,
}

impl Sweep for NumericSweep<'_> {
    type Elem = f64;

    fn oracle_forward(
        &mut self,
        seed: &[Option<&[f64]>],
        sens: &mut [Option<&mut [f64]>],
    ) -> Result<()> {
        self.oracle.forward(self.arg, seed, sens, self.ndir)?;
        Ok(())
    }

    fn oracle_reverse(
        &mut self,
        seed: &[Option<&[f64]>],
        sens: &mut [Option<&mut [f64]>],
    ) -> Result<()> {
        self.oracle.reverse(self.arg, seed, sens, self.ndir)?;
        Ok(())
    }

    fn solve_neg(&mut self, rhs: &[f64], sol: &mut [f64], transpose: bool) -> Result<()> {
        sol.copy_from_slice(rhs);
        self.linsol.solve(sol, self.ndir, transpose)?;
        sol.iter_mut().for_each(|v| *v = -*v);
        Ok(())
    }
}

/// Dependency sweep: one `Bvec` per scalar, 64 independent lanes.
pub(crate) struct BitSweep<'a> {
    pub(crate) oracle: &'a dyn Oracle,
    pub(crate) linsol: &'a dyn LinearSolver,
    pub(crate) w: &'a mut [Bvec],
}

impl Sweep for BitSweep<'_> {
    type Elem = Bvec;

    fn oracle_forward(
        &mut self,
        seed: &[Option<&[Bvec]>],
        sens: &mut [Option<&mut [Bvec]>],
    ) -> Result<()> {
        self.oracle.sp_forward(seed, sens, self.w)?;
        Ok(())
    }

    fn oracle_reverse(
        &mut self,
        seed: &[Option<&[Bvec]>],
        sens: &mut [Option<&mut [Bvec]>],
    ) -> Result<()> {
        self.oracle.sp_reverse(sens, seed, self.w)?;
        Ok(())
    }

    fn solve_neg(&mut self, rhs: &[Bvec], sol: &mut [Bvec], transpose: bool) -> Result<()> {
        self.linsol.structural_solve(rhs, sol, transpose)
    }
}

/// Forward propagation through the implicit function.
///
/// `seed`/`sens` are the rootfinder's input and output slots. The seed on the
/// guess slot `iin` is ignored; `sens[iout]` receives the sensitivity of the
/// unknown. `tmp1`, `tmp2` hold one residual-sized block per direction.
pub(crate) fn forward_sweep<S: Sweep>(
    s: &mut S,
    iin: usize,
    iout: usize,
    seed: &[Option<&[S::Elem]>],
    sens: &mut [Option<&mut [S::Elem]>],
    tmp1: &mut [S::Elem],
    tmp2: &mut [S::Elem],
) -> Result<()> {
    let n_out = sens.len();

    // Residual sensitivity with the unknown held fixed
    {
        let mut seed1: Vec<Option<&[S::Elem]>> = seed.to_vec();
        seed1[iin] = None;
        let mut sens1: Vec<Option<&mut [S::Elem]>> = (0..n_out).map(|_| None).collect();
        sens1[iout] = Some(&mut *tmp1);
        s.oracle_forward(&seed1, &mut sens1)?;
    }

    s.solve_neg(tmp1, tmp2, false)?;
    if let Some(dz) = sens[iout].as_deref_mut() {
        dz.copy_from_slice(tmp2);
    }

    // Auxiliary outputs see the unknown move along the solution manifold
    if sens.iter().enumerate().any(|(o, r)| o != iout && r.is_some()) {
        let mut seed2: Vec<Option<&[S::Elem]>> = seed.iter().copied().collect();
        seed2[iin] = Some(&*tmp2);
        let mut sens2: Vec<Option<&mut [S::Elem]>> = sens
            .iter_mut()
            .enumerate()
            .map(|(o, r)| if o == iout { None } else { r.as_deref_mut() })
            .collect();
        s.oracle_forward(&seed2, &mut sens2)?;
    }
    Ok(())
}

/// Reverse propagation through the implicit function, accumulating into `sens`.
///
/// `seed`/`sens` are the rootfinder's output and input slots. Nothing is ever
/// added to the guess slot `iin`; any value already there is preserved.
pub(crate) fn reverse_sweep<S: Sweep>(
    s: &mut S,
    iin: usize,
    iout: usize,
    seed: &[Option<&[S::Elem]>],
    sens: &mut [Option<&mut [S::Elem]>],
    tmp1: &mut [S::Elem],
    tmp2: &mut [S::Elem],
) -> Result<()> {
    match seed[iout] {
        Some(a) => tmp1.copy_from_slice(a),
        None => tmp1.iter_mut().for_each(|v| *v = S::Elem::default()),
    }

    // Pull auxiliary adjoints back; their unknown part joins the right-hand side
    if seed.iter().enumerate().any(|(o, a)| o != iout && a.is_some()) {
        let mut seed1: Vec<Option<&[S::Elem]>> = seed.to_vec();
        seed1[iout] = None;
        let mut sens1: Vec<Option<&mut [S::Elem]>> = sens
            .iter_mut()
            .enumerate()
            .map(|(i, a)| if i == iin { None } else { a.as_deref_mut() })
            .collect();
        sens1[iin] = Some(&mut *tmp1);
        s.oracle_reverse(&seed1, &mut sens1)?;
    }

    s.solve_neg(tmp1, tmp2, true)?;

    let mut seed2: Vec<Option<&[S::Elem]>> = (0..seed.len()).map(|_| None).collect();
    seed2[iout] = Some(&*tmp2);
    let mut sens2: Vec<Option<&mut [S::Elem]>> = sens
        .iter_mut()
        .enumerate()
        .map(|(i, a)| if i == iin { None } else { a.as_deref_mut() })
        .collect();
    s.oracle_reverse(&seed2, &mut sens2)?;
    Ok(())
}
