//! Scratch arena owned by a [`Rootfinder`](crate::Rootfinder).
//!
//! Sized once at construction; the real-valued direction buffer grows only when a
//! larger batch of directions than any before is requested.

use ifkit::Bvec;

pub(crate) struct Workspace {
    n: usize,
    sz_w: usize,
    /// Oracle scratch lanes followed by the two `n`-vectors `tmp1`, `tmp2`.
    iw: Vec<Bvec>,
    /// `tmp1`, `tmp2` for numeric sweeps, `n * ndir` each.
    rw: Vec<f64>,
    /// Numeric Jacobian values in pattern storage order.
    pub(crate) jac: Vec<f64>,
    /// Residual at the linearization point.
    pub(crate) r: Vec<f64>,
    /// The unknown during a solve.
    pub(crate) z: Vec<f64>,
    /// Scratch handed to the solve step, `SOLVE_VECTORS` vectors of length `n`.
    pub(crate) solve: Vec<f64>,
}

/// Number of `n`-vectors of solve-step scratch.
pub(crate) const SOLVE_VECTORS: usize = 4;

impl Workspace {
    pub(crate) fn new(sz_w: usize, n: usize, nnz_jac: usize) -> Self {
        Workspace {
            n,
            sz_w,
            iw: vec![0; sz_w + 2 * n],
            rw: vec![0.0; 2 * n],
            jac: vec![0.0; nnz_jac],
            r: vec![0.0; n],
            z: vec![0.0; n],
            solve: vec![0.0; SOLVE_VECTORS * n],
        }
    }

    /// Oracle scratch, `tmp1` and `tmp2` for a dependency sweep.
    pub(crate) fn bits(&mut self) -> (&mut [Bvec], &mut [Bvec], &mut [Bvec]) {
        let (w, tmp) = self.iw.split_at_mut(self.sz_w);
        let (tmp1, tmp2) = tmp.split_at_mut(self.n);
        tmp1.iter_mut().for_each(|b| *b = 0);
        tmp2.iter_mut().for_each(|b| *b = 0);
        (w, tmp1, tmp2)
    }

    /// `tmp1` and `tmp2` for a numeric sweep over `ndir` directions.
    pub(crate) fn real(&mut self, ndir: usize) -> (&mut [f64], &mut [f64]) {
        let len = self.n * ndir;
        if self.rw.len() < 2 * len {
            log::trace!("growing direction buffer to {} directions", ndir);
            self.rw.resize(2 * len, 0.0);
        }
        let (tmp1, rest) = self.rw.split_at_mut(len);
        let tmp2 = &mut rest[..len];
        tmp1.iter_mut().for_each(|x| *x = 0.0);
        tmp2.iter_mut().for_each(|x| *x = 0.0);
        (tmp1, tmp2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_buffers_are_sized_at_construction() {
        let mut ws = Workspace::new(5, 3, 7);
        let (w, t1, t2) = ws.bits();
        assert_eq!((w.len(), t1.len(), t2.len()), (5, 3, 3));
        assert_eq!(ws.jac.len(), 7);
        assert_eq!(ws.solve.len(), 12);
    }

    #[test]
    fn real_buffers_grow_with_direction_count() {
        let mut ws = Workspace::new(0, 2, 4);
        let (t1, t2) = ws.real(1);
        assert_eq!((t1.len(), t2.len()), (2, 2));
        let (t1, t2) = ws.real(4);
        assert_eq!((t1.len(), t2.len()), (8, 8));
        let (t1, _) = ws.real(2);
        assert_eq!(t1.len(), 4);
    }
}
