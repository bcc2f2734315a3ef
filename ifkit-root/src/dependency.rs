//! Structural dependency propagation through a [`Rootfinder`].
//!
//! Bit `k` of an element's `Bvec` marks "may depend on seed `k`". The
//! propagation is conservative: where it reports no dependency, the numeric
//! sensitivity is zero for every parameter value.

use ifkit::oracle::{BitArgs, BitOuts};
use ifkit::{Bvec, SparsityPattern};

use crate::error::{Error, Result};
use crate::rootfinder::Rootfinder;
use crate::sweep::{forward_sweep, reverse_sweep, BitSweep};

impl Rootfinder {
    /// Forward dependency propagation from the inputs `arg` to the outputs `res`.
    ///
    /// Bits on the guess input never reach any output.
    pub fn sp_forward(&mut self, arg: &BitArgs<'_>, res: &mut BitOuts<'_>) -> Result<()> {
        self.check_inputs("dependency input", arg, 1)?;
        self.check_outputs("dependency output", &*res, 1)?;
        let (iin, iout) = (self.iin, self.iout);
        let (w, tmp1, tmp2) = self.ws.bits();
        let mut sweep = BitSweep {
            oracle: &*self.oracle,
            linsol: &*self.linsol,
            w,
        };
        forward_sweep(&mut sweep, iin, iout, arg, res, tmp1, tmp2)
    }

    /// Reverse dependency propagation: every input an output may depend on
    /// receives that output's bits (OR-accumulated into `arg`).
    pub fn sp_reverse(&mut self, arg: &mut BitOuts<'_>, res: &BitArgs<'_>) -> Result<()> {
        self.check_inputs("dependency input", &*arg, 1)?;
        self.check_outputs("dependency output", res, 1)?;
        let (iin, iout) = (self.iin, self.iout);
        let (w, tmp1, tmp2) = self.ws.bits();
        let mut sweep = BitSweep {
            oracle: &*self.oracle,
            linsol: &*self.linsol,
            w,
        };
        reverse_sweep(&mut sweep, iin, iout, res, arg, tmp1, tmp2)
    }

    /// Structural Jacobian of output `iout` with respect to input `iin`.
    ///
    /// Rows index the non-zeros of the output, columns those of the input.
    /// Assembled from forward propagation, 64 input elements per sweep.
    pub fn dependency_sparsity(&mut self, iin: usize, iout: usize) -> Result<SparsityPattern> {
        if iin >= self.n_in() {
            return Err(Error::InvalidIndex {
                what: "input",
                index: iin,
                len: self.n_in(),
            });
        }
        if iout >= self.n_out() {
            return Err(Error::InvalidIndex {
                what: "output",
                index: iout,
                len: self.n_out(),
            });
        }
        let (nrow, ncol) = (self.nnz_out(iout), self.nnz_in(iin));
        let lanes = Bvec::BITS as usize;

        let mut seed = vec![0 as Bvec; ncol];
        let mut sens = vec![0 as Bvec; nrow];
        let mut entries = Vec::new();
        for start in (0..ncol).step_by(lanes) {
            let end = (start + lanes).min(ncol);
            seed.iter_mut().for_each(|b| *b = 0);
            for (lane, s) in seed[start..end].iter_mut().enumerate() {
                *s = 1 << lane;
            }
            {
                let mut arg: Vec<Option<&[Bvec]>> = vec![None; self.n_in()];
                arg[iin] = Some(&seed[..]);
                let mut res: Vec<Option<&mut [Bvec]>> = (0..self.n_out()).map(|_| None).collect();
                res[iout] = Some(&mut sens[..]);
                self.sp_forward(&arg, &mut res)?;
            }
            for (row, &bits) in sens.iter().enumerate() {
                for lane in 0..end - start {
                    if bits & (1 << lane) != 0 {
                        entries.push((row, start + lane));
                    }
                }
            }
        }
        log::trace!(
            "rootfinder '{}': dependency of output {} on input {}: {} entries",
            self.name(),
            iout,
            iin,
            entries.len()
        );
        Ok(SparsityPattern::new(nrow, ncol, entries))
    }
}
