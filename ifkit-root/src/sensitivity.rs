//! Exact forward and reverse sensitivities of a [`Rootfinder`].
//!
//! All directions of one call share a single Jacobian factorization: forward
//! mode costs one factorization and `nfwd` triangular solves, reverse mode one
//! factorization and `nadj` transposed solves.

use ifkit::oracle::{Args, Outs};

use crate::error::{Error, Result};
use crate::rootfinder::{substitute, Rootfinder};
use crate::sweep::{forward_sweep, reverse_sweep, NumericSweep};

impl Rootfinder {
    /// Forward sensitivities at a solved point, `nfwd` directions stacked per slot.
    ///
    /// `arg` are the rootfinder inputs and `z` the solved unknown (output
    /// `implicit_output` of [`eval`](Rootfinder::eval)). `fseed[i]` holds
    /// `nfwd * nnz_in(i)` values, direction-major; seeds on the guess input are
    /// ignored. `fsens[o]` receives `nfwd * nnz_out(o)` values. With `nfwd == 0`
    /// nothing is evaluated or factorized.
    pub fn forward_into(
        &mut self,
        arg: &Args<'_>,
        z: &[f64],
        fseed: &Args<'_>,
        fsens: &mut Outs<'_>,
        nfwd: usize,
    ) -> Result<()> {
        if nfwd == 0 {
            return Ok(());
        }
        self.check_inputs("input", arg, 1)?;
        self.check_unknown(z)?;
        self.check_inputs("forward seed", fseed, nfwd)?;
        self.check_outputs("forward sensitivity", &*fsens, nfwd)?;

        let at = substitute(arg, self.iin, z);
        self.linearize(&at)?;

        let (iin, iout) = (self.iin, self.iout);
        let (tmp1, tmp2) = self.ws.real(nfwd);
        let mut sweep = NumericSweep {
            oracle: &*self.oracle,
            arg: &at,
            linsol: &*self.linsol,
            ndir: nfwd,
        };
        forward_sweep(&mut sweep, iin, iout, fseed, fsens, tmp1, tmp2)
    }

    /// Reverse sensitivities at a solved point, accumulated into `asens`.
    ///
    /// `aseed[o]` holds `nadj * nnz_out(o)` adjoint values, direction-major;
    /// `asens[i]` receives `nadj * nnz_in(i)`. The guess input has no influence
    /// on the outputs, so `asens[implicit_input]` is never modified.
    pub fn reverse_into(
        &mut self,
        arg: &Args<'_>,
        z: &[f64],
        aseed: &Args<'_>,
        asens: &mut Outs<'_>,
        nadj: usize,
    ) -> Result<()> {
        if nadj == 0 {
            return Ok(());
        }
        self.check_inputs("input", arg, 1)?;
        self.check_unknown(z)?;
        self.check_outputs("adjoint seed", aseed, nadj)?;
        self.check_inputs("adjoint sensitivity", &*asens, nadj)?;

        let at = substitute(arg, self.iin, z);
        self.linearize(&at)?;

        let (iin, iout) = (self.iin, self.iout);
        let (tmp1, tmp2) = self.ws.real(nadj);
        let mut sweep = NumericSweep {
            oracle: &*self.oracle,
            arg: &at,
            linsol: &*self.linsol,
            ndir: nadj,
        };
        reverse_sweep(&mut sweep, iin, iout, aseed, asens, tmp1, tmp2)
    }

    /// Forward sensitivities, one seed set per direction.
    ///
    /// `fseed[d][i]` is direction `d` of input `i`, either `nnz_in(i)` values or
    /// empty for a zero seed. Returns `sens[d][o]` of length `nnz_out(o)`.
    pub fn forward(
        &mut self,
        arg: &[&[f64]],
        z: &[f64],
        fseed: &[Vec<Vec<f64>>],
    ) -> Result<Vec<Vec<Vec<f64>>>> {
        let nfwd = fseed.len();
        if nfwd == 0 {
            return Ok(Vec::new());
        }
        let seeds = stack(fseed, self.n_in(), |i| self.nnz_in(i))?;
        let mut sens: Vec<Vec<f64>> = (0..self.n_out())
            .map(|o| vec![0.0; nfwd * self.nnz_out(o)])
            .collect();

        let args: Vec<Option<&[f64]>> = arg.iter().map(|a| Some(*a)).collect();
        {
            let fseed: Vec<Option<&[f64]>> = seeds.iter().map(|s| s.as_deref()).collect();
            let mut fsens: Vec<Option<&mut [f64]>> = sens.iter_mut().map(|s| Some(&mut s[..])).collect();
            self.forward_into(&args, z, &fseed, &mut fsens, nfwd)?;
        }
        Ok(unstack(&sens, nfwd))
    }

    /// Reverse sensitivities, one adjoint seed set per direction.
    ///
    /// `aseed[d][o]` is direction `d` of output `o`, either `nnz_out(o)` values or
    /// empty for a zero seed. Returns `sens[d][i]` of length `nnz_in(i)`.
    pub fn reverse(
        &mut self,
        arg: &[&[f64]],
        z: &[f64],
        aseed: &[Vec<Vec<f64>>],
    ) -> Result<Vec<Vec<Vec<f64>>>> {
        let nadj = aseed.len();
        if nadj == 0 {
            return Ok(Vec::new());
        }
        let seeds = stack(aseed, self.n_out(), |o| self.nnz_out(o))?;
        let mut sens: Vec<Vec<f64>> = (0..self.n_in())
            .map(|i| vec![0.0; nadj * self.nnz_in(i)])
            .collect();

        let args: Vec<Option<&[f64]>> = arg.iter().map(|a| Some(*a)).collect();
        {
            let aseed: Vec<Option<&[f64]>> = seeds.iter().map(|s| s.as_deref()).collect();
            let mut asens: Vec<Option<&mut [f64]>> = sens.iter_mut().map(|s| Some(&mut s[..])).collect();
            self.reverse_into(&args, z, &aseed, &mut asens, nadj)?;
        }
        Ok(unstack(&sens, nadj))
    }

    /// `dz/dp` for the parameter input `iparam`, as `n` rows of `nnz_in(iparam)`.
    ///
    /// All columns come out of one batched forward sweep with unit seeds.
    pub fn implicit_jacobian(&mut self, arg: &[&[f64]], z: &[f64], iparam: usize) -> Result<Vec<Vec<f64>>> {
        if iparam >= self.n_in() {
            return Err(Error::InvalidIndex {
                what: "parameter input",
                index: iparam,
                len: self.n_in(),
            });
        }
        let n = self.n();
        let m = self.nnz_in(iparam);
        if m == 0 {
            return Ok(vec![Vec::new(); n]);
        }

        let mut seed = vec![0.0; m * m];
        for j in 0..m {
            seed[j * m + j] = 1.0;
        }
        let mut dz = vec![0.0; m * n];

        let args: Vec<Option<&[f64]>> = arg.iter().map(|a| Some(*a)).collect();
        {
            let mut fseed: Vec<Option<&[f64]>> = vec![None; self.n_in()];
            fseed[iparam] = Some(&seed[..]);
            let mut fsens: Vec<Option<&mut [f64]>> = (0..self.n_out()).map(|_| None).collect();
            fsens[self.iout] = Some(&mut dz[..]);
            self.forward_into(&args, z, &fseed, &mut fsens, m)?;
        }

        Ok((0..n)
            .map(|i| (0..m).map(|j| dz[j * n + i]).collect())
            .collect())
    }

    fn check_unknown(&self, z: &[f64]) -> Result<()> {
        if z.len() != self.n() {
            return Err(Error::DimensionMismatch {
                what: "solved unknown".to_string(),
                expected: self.n(),
                got: z.len(),
            });
        }
        Ok(())
    }
}

/// Stack per-direction seeds into one direction-major buffer per slot.
///
/// A slot that is empty in every direction stays `None`.
fn stack(
    seeds: &[Vec<Vec<f64>>],
    nslot: usize,
    nnz: impl Fn(usize) -> usize,
) -> Result<Vec<Option<Vec<f64>>>> {
    let ndir = seeds.len();
    for dir in seeds {
        if dir.len() != nslot {
            return Err(Error::DimensionMismatch {
                what: "seed slots".to_string(),
                expected: nslot,
                got: dir.len(),
            });
        }
    }
    (0..nslot)
        .map(|k| {
            let len = nnz(k);
            if seeds.iter().all(|dir| dir[k].is_empty()) {
                return Ok(None);
            }
            let mut out = vec![0.0; ndir * len];
            for (d, dir) in seeds.iter().enumerate() {
                match dir[k].len() {
                    0 => {}
                    l if l == len => out[d * len..(d + 1) * len].copy_from_slice(&dir[k]),
                    l => {
                        return Err(Error::DimensionMismatch {
                            what: format!("seed {} of direction {}", k, d),
                            expected: len,
                            got: l,
                        })
                    }
                }
            }
            Ok(Some(out))
        })
        .collect()
}

/// Split direction-major slot buffers back into `out[d][slot]`.
fn unstack(buffers: &[Vec<f64>], ndir: usize) -> Vec<Vec<Vec<f64>>> {
    (0..ndir)
        .map(|d| {
            buffers
                .iter()
                .map(|b| {
                    let len = b.len() / ndir;
                    b[d * len..(d + 1) * len].to_vec()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_direction_major() {
        let seeds = vec![
            vec![vec![1.0, 2.0], vec![]],
            vec![vec![3.0, 4.0], vec![]],
        ];
        let stacked = stack(&seeds, 2, |_| 2).unwrap();
        assert_eq!(stacked[0].as_deref(), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        assert!(stacked[1].is_none());
        assert_eq!(unstack(&[vec![1.0, 2.0, 3.0, 4.0]], 2), vec![vec![vec![1.0, 2.0]], vec![vec![3.0, 4.0]]]);
    }

    #[test]
    fn stack_rejects_bad_lengths() {
        let seeds = vec![vec![vec![1.0]]];
        assert!(matches!(
            stack(&seeds, 1, |_| 2),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(stack(&seeds, 2, |_| 1).is_err());
    }
}
