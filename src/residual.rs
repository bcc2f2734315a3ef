//! Turning user residual code into a full [`Oracle`].
//!
//! A [`Residual`] is written once, generically over [`Scalar`]. [`ResidualOracle`]
//! evaluates it in three modes:
//!
//! - on `f64` for numeric evaluation,
//! - on [`Dual<f64>`] for forward directional derivatives and Jacobian columns,
//! - on [`Bits`] to detect, once at build time, which input non-zeros every output
//!   non-zero may depend on.
//!
//! Reverse derivatives come from the compressed Jacobian: input columns are grouped
//! by a coloring of the detected pattern so that one `Dual` sweep recovers a whole
//! color class, and the Jacobian is then applied transposed.

use std::sync::Arc;

use crate::bits::{Bits, Bvec, LANES};
use crate::dual::Dual;
use crate::error::{OracleError, Result};
use crate::oracle::{check_len, check_slots, Args, BitArgs, BitOuts, Oracle, Outs};
use crate::scalar::Scalar;
use crate::sparsity::SparsityPattern;

/// A vector function written generically over the evaluation scalar.
///
/// `arg[i]` holds the non-zeros of input `i` and `res[o]` the non-zeros of
/// output `o`, both in pattern storage order. Output buffers arrive zeroed.
///
/// Implementations must trace the same expression regardless of `T`: branching
/// on values would make the dependency pattern detected with [`Bits`] unsound.
pub trait Residual: Send + Sync + 'static {
    fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]);
}

struct Slot {
    name: String,
    sparsity: SparsityPattern,
}

struct Inner<R> {
    name: String,
    residual: R,
    inputs: Vec<Slot>,
    outputs: Vec<Slot>,
    /// `deps[o][i]`: which non-zeros of input `i` each non-zero of output `o` may depend on,
    /// as an `nnz_out(o) × nnz_in(i)` pattern.
    deps: Vec<Vec<SparsityPattern>>,
    /// Per input: column coloring of all outputs' blocks stacked vertically.
    colorings: Vec<(Vec<u32>, u32)>,
}

/// Builder for [`ResidualOracle`].
pub struct ResidualOracleBuilder<R> {
    name: String,
    residual: R,
    inputs: Vec<Slot>,
    outputs: Vec<Slot>,
}

impl<R: Residual> ResidualOracleBuilder<R> {
    /// Declare a dense column input with `n` entries.
    pub fn input(self, name: &str, n: usize) -> Self {
        self.input_sparsity(name, SparsityPattern::column(n))
    }

    /// Declare an input with an explicit sparsity pattern.
    pub fn input_sparsity(mut self, name: &str, sparsity: SparsityPattern) -> Self {
        self.inputs.push(Slot {
            name: name.to_string(),
            sparsity,
        });
        self
    }

    /// Declare a dense column output with `n` entries.
    pub fn output(self, name: &str, n: usize) -> Self {
        self.output_sparsity(name, SparsityPattern::column(n))
    }

    /// Declare an output with an explicit sparsity pattern.
    pub fn output_sparsity(mut self, name: &str, sparsity: SparsityPattern) -> Self {
        self.outputs.push(Slot {
            name: name.to_string(),
            sparsity,
        });
        self
    }

    /// Detect the dependency pattern and build the oracle.
    pub fn build(self) -> Result<ResidualOracle<R>> {
        for slots in [&self.inputs, &self.outputs] {
            for (k, slot) in slots.iter().enumerate() {
                if slots[..k].iter().any(|s| s.name == slot.name) {
                    return Err(OracleError::DuplicateName(slot.name.clone()));
                }
            }
        }

        let mut inner = Inner {
            name: self.name,
            residual: self.residual,
            inputs: self.inputs,
            outputs: self.outputs,
            deps: Vec::new(),
            colorings: Vec::new(),
        };
        inner.deps = inner.detect_dependencies();
        inner.colorings = (0..inner.inputs.len())
            .map(|i| inner.stacked_block(i).column_coloring())
            .collect();

        log::debug!(
            "oracle '{}': {} inputs, {} outputs, colors per input {:?}",
            inner.name,
            inner.inputs.len(),
            inner.outputs.len(),
            inner.colorings.iter().map(|c| c.1).collect::<Vec<_>>()
        );

        Ok(ResidualOracle {
            inner: Arc::new(inner),
        })
    }
}

impl<R: Residual> Inner<R> {
    fn nnz_in(&self, i: usize) -> usize {
        self.inputs[i].sparsity.nnz()
    }

    fn nnz_out(&self, o: usize) -> usize {
        self.outputs[o].sparsity.nnz()
    }

    /// Evaluate the residual on owned argument buffers.
    fn call<T: Scalar>(&self, arg: &[Vec<T>]) -> Vec<Vec<T>> {
        let arg_refs: Vec<&[T]> = arg.iter().map(Vec::as_slice).collect();
        let mut res: Vec<Vec<T>> = self
            .outputs
            .iter()
            .map(|s| vec![T::zero(); s.sparsity.nnz()])
            .collect();
        {
            let mut res_refs: Vec<&mut [T]> = res.iter_mut().map(Vec::as_mut_slice).collect();
            self.residual.eval(&arg_refs, &mut res_refs);
        }
        res
    }

    /// Trace [`Bits`] through the residual, 64 input non-zeros at a time.
    fn detect_dependencies(&self) -> Vec<Vec<SparsityPattern>> {
        let mut offsets = Vec::with_capacity(self.inputs.len());
        let mut total = 0;
        for i in 0..self.inputs.len() {
            offsets.push(total);
            total += self.nnz_in(i);
        }

        let mut entries: Vec<Vec<Vec<(usize, usize)>>> =
            vec![vec![Vec::new(); self.inputs.len()]; self.outputs.len()];

        let mut start = 0;
        while start < total {
            let end = (start + LANES).min(total);
            let arg: Vec<Vec<Bits>> = (0..self.inputs.len())
                .map(|i| {
                    (0..self.nnz_in(i))
                        .map(|k| {
                            let g = offsets[i] + k;
                            if g >= start && g < end {
                                Bits::lane(g - start)
                            } else {
                                Bits::NONE
                            }
                        })
                        .collect()
                })
                .collect();

            for (o, out) in self.call(&arg).iter().enumerate() {
                for (row, bits) in out.iter().enumerate() {
                    for lane in bits.lanes() {
                        let g = start + lane;
                        let i = offsets.partition_point(|&off| off <= g) - 1;
                        entries[o][i].push((row, g - offsets[i]));
                    }
                }
            }
            start = end;
        }

        entries
            .into_iter()
            .enumerate()
            .map(|(o, per_input)| {
                per_input
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| SparsityPattern::new(self.nnz_out(o), self.nnz_in(i), e))
                    .collect()
            })
            .collect()
    }

    /// All outputs' dependency blocks on input `i`, stacked by rows.
    fn stacked_block(&self, i: usize) -> SparsityPattern {
        let mut row_off = 0;
        let mut entries = Vec::new();
        for o in 0..self.outputs.len() {
            entries.extend(self.deps[o][i].entries().map(|(r, c)| (r + row_off, c)));
            row_off += self.nnz_out(o);
        }
        SparsityPattern::new(row_off, self.nnz_in(i), entries)
    }

    /// Copy numeric inputs into owned buffers, validating lengths; `None` becomes zeros.
    fn dense_args(&self, arg: &Args<'_>) -> Result<Vec<Vec<f64>>> {
        check_slots("input", self.inputs.len(), arg.len())?;
        arg.iter()
            .enumerate()
            .map(|(i, a)| match a {
                Some(v) => {
                    check_len("input", i, self.nnz_in(i), v.len())?;
                    Ok(v.to_vec())
                }
                None => Ok(vec![0.0; self.nnz_in(i)]),
            })
            .collect()
    }

    fn check_outs(&self, res: &Outs<'_>, ndir: usize) -> Result<()> {
        check_slots("output", self.outputs.len(), res.len())?;
        for (o, r) in res.iter().enumerate() {
            if let Some(r) = r {
                check_len("output", o, self.nnz_out(o) * ndir, r.len())?;
            }
        }
        Ok(())
    }

    /// Values of `∂ out[o] / ∂ in[iin]` for every output, in `deps[o][iin]` storage order.
    fn jacobian_values(&self, arg: &[Vec<f64>], iin: usize) -> Vec<Vec<f64>> {
        let (colors, ncolors) = &self.colorings[iin];
        let mut vals: Vec<Vec<f64>> = (0..self.outputs.len())
            .map(|o| vec![0.0; self.deps[o][iin].nnz()])
            .collect();

        for color in 0..*ncolors {
            let seeded: Vec<Vec<Dual<f64>>> = arg
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    a.iter()
                        .enumerate()
                        .map(|(k, &v)| {
                            if i == iin && colors[k] == color {
                                Dual::variable(v)
                            } else {
                                Dual::constant(v)
                            }
                        })
                        .collect()
                })
                .collect();
            let out = self.call(&seeded);
            for (o, block_vals) in vals.iter_mut().enumerate() {
                for (e, (row, col)) in self.deps[o][iin].entries().enumerate() {
                    if colors[col] == color {
                        block_vals[e] = out[o][row].eps;
                    }
                }
            }
        }
        vals
    }

    /// Dependency lanes of every non-zero of output `o`.
    fn sp_output(&self, arg: &BitArgs<'_>, o: usize, out: &mut [Bvec]) {
        out.iter_mut().for_each(|b| *b = 0);
        for (i, a) in arg.iter().enumerate() {
            if let Some(a) = a {
                for (row, col) in self.deps[o][i].entries() {
                    out[row] |= a[col];
                }
            }
        }
    }

    /// Push lanes seeded on the non-zeros of output `o` back to the inputs.
    fn sp_output_rev(&self, arg: &mut BitOuts<'_>, o: usize, seed: &[Bvec]) {
        for (i, a) in arg.iter_mut().enumerate() {
            if let Some(a) = a {
                for (row, col) in self.deps[o][i].entries() {
                    a[col] |= seed[row];
                }
            }
        }
    }

    fn check_bit_args(&self, arg: &BitArgs<'_>) -> Result<()> {
        check_slots("input", self.inputs.len(), arg.len())?;
        for (i, a) in arg.iter().enumerate() {
            if let Some(a) = a {
                check_len("input", i, self.nnz_in(i), a.len())?;
            }
        }
        Ok(())
    }

    fn check_bit_outs(&self, arg: &BitOuts<'_>) -> Result<()> {
        check_slots("input", self.inputs.len(), arg.len())?;
        for (i, a) in arg.iter().enumerate() {
            if let Some(a) = a {
                check_len("input", i, self.nnz_in(i), a.len())?;
            }
        }
        Ok(())
    }
}

/// [`Oracle`] adapter around a user [`Residual`].
///
/// Cloning is cheap and shares the detected dependency pattern.
pub struct ResidualOracle<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for ResidualOracle<R> {
    fn clone(&self) -> Self {
        ResidualOracle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Residual> ResidualOracle<R> {
    /// Start building an oracle named `name` around `residual`.
    pub fn builder(name: &str, residual: R) -> ResidualOracleBuilder<R> {
        ResidualOracleBuilder {
            name: name.to_string(),
            residual,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// The wrapped residual.
    pub fn residual(&self) -> &R {
        &self.inner.residual
    }

    /// Index of the input called `name`.
    pub fn index_in(&self, name: &str) -> Option<usize> {
        self.inner.inputs.iter().position(|s| s.name == name)
    }

    /// Index of the output called `name`.
    pub fn index_out(&self, name: &str) -> Option<usize> {
        self.inner.outputs.iter().position(|s| s.name == name)
    }

    pub fn name_in(&self, i: usize) -> &str {
        &self.inner.inputs[i].name
    }

    pub fn name_out(&self, o: usize) -> &str {
        &self.inner.outputs[o].name
    }

    /// Detected dependency pattern of output `iout` on input `iin`.
    pub fn dependency(&self, iin: usize, iout: usize) -> &SparsityPattern {
        &self.inner.deps[iout][iin]
    }
}

impl<R: Residual> Oracle for ResidualOracle<R> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn n_in(&self) -> usize {
        self.inner.inputs.len()
    }

    fn n_out(&self) -> usize {
        self.inner.outputs.len()
    }

    fn sparsity_in(&self, i: usize) -> &SparsityPattern {
        &self.inner.inputs[i].sparsity
    }

    fn sparsity_out(&self, i: usize) -> &SparsityPattern {
        &self.inner.outputs[i].sparsity
    }

    fn eval(&self, arg: &Args<'_>, res: &mut Outs<'_>) -> Result<()> {
        let inner = &*self.inner;
        let arg = inner.dense_args(arg)?;
        inner.check_outs(res, 1)?;

        let out = inner.call(&arg);
        for (r, v) in res.iter_mut().zip(out) {
            if let Some(r) = r {
                r.copy_from_slice(&v);
            }
        }
        Ok(())
    }

    fn jacobian(&self, iin: usize, iout: usize) -> Result<Arc<dyn Oracle>> {
        if iin >= self.n_in() {
            return Err(OracleError::IndexOutOfRange {
                what: "input",
                index: iin,
                len: self.n_in(),
            });
        }
        if iout >= self.n_out() {
            return Err(OracleError::IndexOutOfRange {
                what: "output",
                index: iout,
                len: self.n_out(),
            });
        }
        let inner = &*self.inner;
        Ok(Arc::new(JacobianOracle {
            name: format!(
                "jac_{}_{}_{}",
                inner.name, inner.inputs[iin].name, inner.outputs[iout].name
            ),
            sparsity: inner.deps[iout][iin].clone(),
            inner: Arc::clone(&self.inner),
            iin,
            iout,
        }))
    }

    fn forward(
        &self,
        arg: &Args<'_>,
        fseed: &Args<'_>,
        fsens: &mut Outs<'_>,
        nfwd: usize,
    ) -> Result<()> {
        let inner = &*self.inner;
        let arg = inner.dense_args(arg)?;
        check_slots("forward seed", inner.inputs.len(), fseed.len())?;
        for (i, s) in fseed.iter().enumerate() {
            if let Some(s) = s {
                check_len("forward seed", i, inner.nnz_in(i) * nfwd, s.len())?;
            }
        }
        inner.check_outs(fsens, nfwd)?;

        for d in 0..nfwd {
            let seeded: Vec<Vec<Dual<f64>>> = arg
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    let n = a.len();
                    a.iter()
                        .enumerate()
                        .map(|(k, &v)| {
                            let eps = fseed[i].map_or(0.0, |s| s[d * n + k]);
                            Dual::new(v, eps)
                        })
                        .collect()
                })
                .collect();
            let out = inner.call(&seeded);
            for (o, sens) in fsens.iter_mut().enumerate() {
                if let Some(sens) = sens {
                    let n = inner.nnz_out(o);
                    for (dst, y) in sens[d * n..(d + 1) * n].iter_mut().zip(&out[o]) {
                        *dst = y.eps;
                    }
                }
            }
        }
        Ok(())
    }

    fn reverse(
        &self,
        arg: &Args<'_>,
        aseed: &Args<'_>,
        asens: &mut Outs<'_>,
        nadj: usize,
    ) -> Result<()> {
        let inner = &*self.inner;
        let arg = inner.dense_args(arg)?;
        check_slots("adjoint seed", inner.outputs.len(), aseed.len())?;
        for (o, s) in aseed.iter().enumerate() {
            if let Some(s) = s {
                check_len("adjoint seed", o, inner.nnz_out(o) * nadj, s.len())?;
            }
        }
        check_slots("adjoint sensitivity", inner.inputs.len(), asens.len())?;
        for (i, s) in asens.iter().enumerate() {
            if let Some(s) = s {
                check_len("adjoint sensitivity", i, inner.nnz_in(i) * nadj, s.len())?;
            }
        }
        if nadj == 0 || aseed.iter().all(Option::is_none) {
            return Ok(());
        }

        for (iin, sens) in asens.iter_mut().enumerate() {
            let Some(sens) = sens else { continue };
            let vals = inner.jacobian_values(&arg, iin);
            let ni = inner.nnz_in(iin);
            for (o, seed) in aseed.iter().enumerate() {
                let Some(seed) = seed else { continue };
                let no = inner.nnz_out(o);
                for (e, (row, col)) in inner.deps[o][iin].entries().enumerate() {
                    for d in 0..nadj {
                        sens[d * ni + col] += vals[o][e] * seed[d * no + row];
                    }
                }
            }
        }
        Ok(())
    }

    fn sp_forward(&self, arg: &BitArgs<'_>, res: &mut BitOuts<'_>, _w: &mut [Bvec]) -> Result<()> {
        let inner = &*self.inner;
        inner.check_bit_args(arg)?;
        check_slots("output", inner.outputs.len(), res.len())?;
        for (o, r) in res.iter_mut().enumerate() {
            if let Some(r) = r {
                check_len("output", o, inner.nnz_out(o), r.len())?;
                inner.sp_output(arg, o, r);
            }
        }
        Ok(())
    }

    fn sp_reverse(&self, arg: &mut BitOuts<'_>, res: &BitArgs<'_>, _w: &mut [Bvec]) -> Result<()> {
        let inner = &*self.inner;
        inner.check_bit_outs(arg)?;
        check_slots("output", inner.outputs.len(), res.len())?;
        for (o, r) in res.iter().enumerate() {
            if let Some(r) = r {
                check_len("output", o, inner.nnz_out(o), r.len())?;
                inner.sp_output_rev(arg, o, r);
            }
        }
        Ok(())
    }
}

/// Jacobian block generated by [`ResidualOracle::jacobian`].
///
/// Its values come from compressed `Dual` sweeps of the parent residual. An entry in
/// row `r` may depend on every input that output non-zero `r` of the parent depends on.
struct JacobianOracle<R> {
    name: String,
    sparsity: SparsityPattern,
    inner: Arc<Inner<R>>,
    iin: usize,
    iout: usize,
}

impl<R: Residual> Oracle for JacobianOracle<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_in(&self) -> usize {
        self.inner.inputs.len()
    }

    fn n_out(&self) -> usize {
        1
    }

    fn sparsity_in(&self, i: usize) -> &SparsityPattern {
        &self.inner.inputs[i].sparsity
    }

    fn sparsity_out(&self, _i: usize) -> &SparsityPattern {
        &self.sparsity
    }

    fn eval(&self, arg: &Args<'_>, res: &mut Outs<'_>) -> Result<()> {
        let arg = self.inner.dense_args(arg)?;
        check_slots("output", 1, res.len())?;
        if let Some(r) = &mut res[0] {
            check_len("output", 0, self.sparsity.nnz(), r.len())?;
            let vals = self.inner.jacobian_values(&arg, self.iin);
            r.copy_from_slice(&vals[self.iout]);
        }
        Ok(())
    }

    fn jacobian(&self, _iin: usize, _iout: usize) -> Result<Arc<dyn Oracle>> {
        Err(OracleError::Unsupported("jacobian of a generated jacobian"))
    }

    fn forward(
        &self,
        _arg: &Args<'_>,
        _fseed: &Args<'_>,
        _fsens: &mut Outs<'_>,
        _nfwd: usize,
    ) -> Result<()> {
        Err(OracleError::Unsupported("forward derivatives of a generated jacobian"))
    }

    fn reverse(
        &self,
        _arg: &Args<'_>,
        _aseed: &Args<'_>,
        _asens: &mut Outs<'_>,
        _nadj: usize,
    ) -> Result<()> {
        Err(OracleError::Unsupported("reverse derivatives of a generated jacobian"))
    }

    fn sp_forward(&self, arg: &BitArgs<'_>, res: &mut BitOuts<'_>, _w: &mut [Bvec]) -> Result<()> {
        self.inner.check_bit_args(arg)?;
        check_slots("output", 1, res.len())?;
        if let Some(r) = &mut res[0] {
            check_len("output", 0, self.sparsity.nnz(), r.len())?;
            let mut rows = vec![0; self.inner.nnz_out(self.iout)];
            self.inner.sp_output(arg, self.iout, &mut rows);
            for (dst, (row, _)) in r.iter_mut().zip(self.sparsity.entries()) {
                *dst = rows[row];
            }
        }
        Ok(())
    }

    fn sp_reverse(&self, arg: &mut BitOuts<'_>, res: &BitArgs<'_>, _w: &mut [Bvec]) -> Result<()> {
        self.inner.check_bit_outs(arg)?;
        check_slots("output", 1, res.len())?;
        if let Some(r) = res[0] {
            check_len("output", 0, self.sparsity.nnz(), r.len())?;
            let mut rows = vec![0; self.inner.nnz_out(self.iout)];
            for (&b, (row, _)) in r.iter().zip(self.sparsity.entries()) {
                rows[row] |= b;
            }
            self.inner.sp_output_rev(arg, self.iout, &rows);
        }
        Ok(())
    }
}
