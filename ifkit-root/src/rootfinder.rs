//! The rootfinder core.
//!
//! A [`Rootfinder`] wraps an [`Oracle`] whose input `implicit_input` is an unknown
//! `z` and whose output `implicit_output` is a residual `r(z, p)` of the same
//! length. Seen from outside, the rootfinder is itself a function of the same
//! inputs and outputs:
//!
//! - input `implicit_input` is the initial guess for `z`,
//! - output `implicit_output` is the solved `z*` with `r(z*, p) = 0`,
//! - every other output is the oracle's auxiliary output evaluated at `(z*, p)`.
//!
//! Construction validates the oracle, caches the Jacobian `∂r/∂z`, checks its
//! structural rank and binds a linear solver to its pattern. The numeric
//! iteration itself is delegated to a [`RootSolver`] plugin.

use std::sync::Arc;

use ifkit::oracle::{check_len, check_slots, Args, Outs};
use ifkit::{Oracle, SparsityPattern};

use crate::convergence::norm_inf;
use crate::error::{Error, Result};
use crate::linsol::LinearSolver;
use crate::options::{Constraint, Dict, Options};
use crate::plugin::{linsol, rootfinder_registry};
use crate::result::Termination;
use crate::solvers::RootSolver;
use crate::workspace::Workspace;

/// The view of a root-finding problem handed to a [`RootSolver`].
///
/// All parameter inputs are fixed; only the unknown varies.
pub struct RootProblem<'a> {
    oracle: &'a dyn Oracle,
    jac: &'a dyn Oracle,
    linsol: &'a mut dyn LinearSolver,
    arg: &'a Args<'a>,
    iin: usize,
    iout: usize,
    n: usize,
    constraints: &'a [Constraint],
    jac_values: &'a mut [f64],
    work: &'a mut [f64],
}

impl<'a> RootProblem<'a> {
    /// Number of unknowns.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Sign constraints, empty when unconstrained.
    pub fn constraints(&self) -> &'a [Constraint] {
        self.constraints
    }

    /// Scratch owned by the rootfinder: four vectors of length `n`, stacked.
    ///
    /// The first call hands out the whole buffer; later calls get an empty slice.
    pub fn take_work(&mut self) -> &'a mut [f64] {
        std::mem::take(&mut self.work)
    }

    /// Evaluate the residual `r = r(z, p)`.
    pub fn residual(&mut self, z: &[f64], r: &mut [f64]) -> Result<()> {
        let arg = substitute(self.arg, self.iin, z);
        let mut res: Vec<Option<&mut [f64]>> = (0..self.oracle.n_out()).map(|_| None).collect();
        res[self.iout] = Some(r);
        self.oracle.eval(&arg, &mut res)?;
        Ok(())
    }

    /// Evaluate and factorize the Jacobian at `z`.
    ///
    /// A numerically singular Jacobian is reported as [`Error::SingularMatrix`].
    pub fn factorize(&mut self, z: &[f64]) -> Result<()> {
        let arg = substitute(self.arg, self.iin, z);
        self.jac.eval(&arg, &mut [Some(&mut *self.jac_values)])?;
        self.linsol.factorize(self.jac_values)
    }

    /// Solve `J * x = rhs` in place with the last factorization.
    pub fn solve(&self, rhs: &mut [f64]) -> Result<()> {
        self.linsol.solve(rhs, 1, false)
    }
}

/// Length of an optional call slot.
pub(crate) trait SlotLen {
    fn slot_len(&self) -> Option<usize>;
}

impl<T> SlotLen for Option<&[T]> {
    fn slot_len(&self) -> Option<usize> {
        self.map(<[T]>::len)
    }
}

impl<T> SlotLen for Option<&mut [T]> {
    fn slot_len(&self) -> Option<usize> {
        self.as_deref().map(<[T]>::len)
    }
}

/// Copy of `arg` with slot `i` replaced by `v`.
pub(crate) fn substitute<'b>(arg: &Args<'b>, i: usize, v: &'b [f64]) -> Vec<Option<&'b [f64]>> {
    let mut out: Vec<Option<&[f64]>> = arg.to_vec();
    out[i] = Some(v);
    out
}

/// An implicit function defined by `r(z, p) = 0`.
///
/// Not safe for concurrent use: evaluation and differentiation reuse the
/// workspace and the linear solver's factorization, hence `&mut self`.
pub struct Rootfinder {
    name: String,
    plugin: String,
    pub(crate) oracle: Arc<dyn Oracle>,
    jac: Arc<dyn Oracle>,
    jac_sparsity: SparsityPattern,
    pub(crate) iin: usize,
    pub(crate) iout: usize,
    n: usize,
    constraints: Vec<Constraint>,
    pub(crate) linsol: Box<dyn LinearSolver>,
    solver: Box<dyn RootSolver>,
    pub(crate) ws: Workspace,
}

impl std::fmt::Debug for Rootfinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rootfinder")
            .field("name", &self.name)
            .field("plugin", &self.plugin)
            .field("oracle", &self.oracle.name())
            .field("n", &self.n)
            .field("implicit_input", &self.iin)
            .field("implicit_output", &self.iout)
            .field("linear_solver", &self.linsol.name())
            .finish()
    }
}

impl Rootfinder {
    /// Create a rootfinder using the solver plugin `solver`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownPlugin`] if `solver` or the linear solver is not registered.
    /// - [`Error::InvalidIndex`] if `implicit_input`/`implicit_output` are out of range.
    /// - [`Error::DimensionMismatch`] if the unknown or residual is not a dense column,
    ///   their lengths differ, or the Jacobian does not have shape `n × n`.
    /// - [`Error::StructuralSingularity`] if the Jacobian pattern has structural rank `< n`.
    /// - [`Error::ConstraintLength`] if `constraints` is neither empty nor of length `n`.
    pub fn new(name: &str, solver: &str, oracle: Arc<dyn Oracle>, options: Options) -> Result<Self> {
        let plugin = rootfinder_registry().get(solver)?;

        let (iin, iout) = (options.implicit_input, options.implicit_output);
        if iin >= oracle.n_in() {
            return Err(Error::InvalidIndex {
                what: "implicit_input",
                index: iin,
                len: oracle.n_in(),
            });
        }
        if iout >= oracle.n_out() {
            return Err(Error::InvalidIndex {
                what: "implicit_output",
                index: iout,
                len: oracle.n_out(),
            });
        }

        let sp_z = oracle.sparsity_in(iin);
        let sp_r = oracle.sparsity_out(iout);
        if !(sp_z.is_column() && sp_z.is_dense()) {
            return Err(Error::DimensionMismatch {
                what: "unknown (dense column) nnz".to_string(),
                expected: sp_z.nrow * sp_z.ncol,
                got: sp_z.nnz(),
            });
        }
        if !(sp_r.is_column() && sp_r.is_dense()) {
            return Err(Error::DimensionMismatch {
                what: "residual (dense column) nnz".to_string(),
                expected: sp_r.nrow * sp_r.ncol,
                got: sp_r.nnz(),
            });
        }
        let n = sp_z.nnz();
        if sp_r.nnz() != n {
            return Err(Error::DimensionMismatch {
                what: "residual length".to_string(),
                expected: n,
                got: sp_r.nnz(),
            });
        }

        let jac = match options.jacobian_function {
            Some(jac) => {
                if jac.n_in() != oracle.n_in() {
                    return Err(Error::DimensionMismatch {
                        what: "jacobian_function inputs".to_string(),
                        expected: oracle.n_in(),
                        got: jac.n_in(),
                    });
                }
                for i in 0..oracle.n_in() {
                    if jac.nnz_in(i) != oracle.nnz_in(i) {
                        return Err(Error::DimensionMismatch {
                            what: format!("jacobian_function input {}", i),
                            expected: oracle.nnz_in(i),
                            got: jac.nnz_in(i),
                        });
                    }
                }
                if jac.n_out() == 0 {
                    return Err(Error::DimensionMismatch {
                        what: "jacobian_function outputs".to_string(),
                        expected: 1,
                        got: 0,
                    });
                }
                jac
            }
            None => oracle.jacobian(iin, iout)?,
        };

        let jac_sparsity = jac.sparsity_out(0).clone();
        if jac_sparsity.nrow != n || jac_sparsity.ncol != n {
            return Err(Error::DimensionMismatch {
                what: "jacobian rows".to_string(),
                expected: n,
                got: if jac_sparsity.nrow != n {
                    jac_sparsity.nrow
                } else {
                    jac_sparsity.ncol
                },
            });
        }
        let rank = jac_sparsity.structural_rank();
        if rank < n {
            return Err(Error::StructuralSingularity { rank, n });
        }

        if !options.constraints.is_empty() && options.constraints.len() != n {
            return Err(Error::ConstraintLength {
                len: options.constraints.len(),
                n,
            });
        }
        let constraints = options
            .constraints
            .iter()
            .map(|&c| Constraint::try_from(c))
            .collect::<Result<Vec<_>>>()?;

        let solver_impl = (plugin.factory())(&options.solver_options)?;
        let mut linsol = linsol(&options.linear_solver, &options.linear_solver_options)?;
        linsol.reset(&jac_sparsity)?;

        let sz_w = oracle.sz_w().max(jac.sz_w());
        let ws = Workspace::new(sz_w, n, jac_sparsity.nnz());

        log::debug!(
            "rootfinder '{}': plugin '{}', n = {}, nnz(J) = {}, structural rank {}, linear solver '{}'",
            name,
            solver,
            n,
            jac_sparsity.nnz(),
            rank,
            linsol.name()
        );

        Ok(Rootfinder {
            name: name.to_string(),
            plugin: solver.to_string(),
            oracle,
            jac,
            jac_sparsity,
            iin,
            iout,
            n,
            constraints,
            linsol,
            solver: solver_impl,
            ws,
        })
    }

    /// Create a rootfinder from a flat option dictionary.
    ///
    /// See [`Options::from_dict`] for how keys are split between the core and the plugin.
    pub fn from_dict(name: &str, solver: &str, oracle: Arc<dyn Oracle>, dict: &Dict) -> Result<Self> {
        Rootfinder::new(name, solver, oracle, Options::from_dict(dict)?)
    }

    /// Solve and write the requested outputs.
    ///
    /// A missing guess (`arg[implicit_input] == None`) starts from zero. Returns
    /// the solver's termination record; failure to converge is an
    /// [`Error::Convergence`] and leaves `res` untouched.
    pub fn eval_into(&mut self, arg: &Args<'_>, res: &mut Outs<'_>) -> Result<Termination> {
        self.check_inputs("input", arg, 1)?;
        self.check_outputs("output", &*res, 1)?;

        match arg[self.iin] {
            Some(guess) => self.ws.z.copy_from_slice(guess),
            None => self.ws.z.iter_mut().for_each(|v| *v = 0.0),
        }

        let termination = {
            let mut problem = RootProblem {
                oracle: &*self.oracle,
                jac: &*self.jac,
                linsol: &mut *self.linsol,
                arg,
                iin: self.iin,
                iout: self.iout,
                n: self.n,
                constraints: &self.constraints,
                jac_values: &mut self.ws.jac,
                work: &mut self.ws.solve,
            };
            self.solver.solve(&mut problem, &mut self.ws.z)?
        };
        log::debug!(
            "rootfinder '{}': {} after {} iterations, |r| = {:e}",
            self.name,
            termination.reason,
            termination.iterations,
            termination.residual_norm
        );
        if !termination.converged() {
            return Err(Error::Convergence {
                reason: termination.reason,
                iterations: termination.iterations,
                residual_norm: termination.residual_norm,
            });
        }

        let z = &self.ws.z;
        if self.oracle.n_out() > 1 && res.iter().enumerate().any(|(k, r)| k != self.iout && r.is_some()) {
            let at = substitute(arg, self.iin, z);
            let mut aux: Vec<Option<&mut [f64]>> = res
                .iter_mut()
                .enumerate()
                .map(|(k, r)| if k == self.iout { None } else { r.as_deref_mut() })
                .collect();
            self.oracle.eval(&at, &mut aux)?;
        }
        if let Some(out) = res[self.iout].as_deref_mut() {
            out.copy_from_slice(z);
        }
        Ok(termination)
    }

    /// Solve and return every output.
    pub fn eval(&mut self, arg: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        let args: Vec<Option<&[f64]>> = arg.iter().map(|a| Some(*a)).collect();
        let mut out: Vec<Vec<f64>> = (0..self.n_out()).map(|o| vec![0.0; self.nnz_out(o)]).collect();
        {
            let mut res: Vec<Option<&mut [f64]>> = out.iter_mut().map(|o| Some(&mut o[..])).collect();
            self.eval_into(&args, &mut res)?;
        }
        Ok(out)
    }

    /// Re-bind the linear solver to the Jacobian pattern, dropping any factorization.
    pub fn reset(&mut self) -> Result<()> {
        log::debug!("rootfinder '{}': resetting linear solver", self.name);
        self.linsol.reset(&self.jac_sparsity)
    }

    /// Evaluate and factorize the Jacobian at the point `at` (unknown substituted).
    pub(crate) fn linearize(&mut self, at: &Args<'_>) -> Result<()> {
        self.jac.eval(at, &mut [Some(&mut self.ws.jac[..])])?;
        self.linsol.factorize(&self.ws.jac)?;

        if cfg!(debug_assertions) {
            let mut res: Vec<Option<&mut [f64]>> = (0..self.oracle.n_out()).map(|_| None).collect();
            res[self.iout] = Some(&mut self.ws.r[..]);
            self.oracle.eval(at, &mut res)?;
            let r_norm = norm_inf(&self.ws.r);
            if r_norm > 1e-6 {
                log::warn!(
                    "rootfinder '{}': differentiating at a point with |r| = {:e}; \
                     sensitivities assume a converged root",
                    self.name,
                    r_norm
                );
            }
        }
        Ok(())
    }

    /// Validate slots matching the inputs, each holding `ndir` stacked directions.
    pub(crate) fn check_inputs<S: SlotLen>(&self, what: &str, slots: &[S], ndir: usize) -> Result<()> {
        check_slots(what, self.n_in(), slots.len())?;
        for (i, s) in slots.iter().enumerate() {
            if let Some(len) = s.slot_len() {
                check_len(what, i, self.nnz_in(i) * ndir, len)?;
            }
        }
        Ok(())
    }

    /// Validate slots matching the outputs, each holding `ndir` stacked directions.
    pub(crate) fn check_outputs<S: SlotLen>(&self, what: &str, slots: &[S], ndir: usize) -> Result<()> {
        check_slots(what, self.n_out(), slots.len())?;
        for (o, s) in slots.iter().enumerate() {
            if let Some(len) = s.slot_len() {
                check_len(what, o, self.nnz_out(o) * ndir, len)?;
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the solver plugin.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// The residual oracle.
    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    /// The cached Jacobian `∂r/∂z`.
    pub fn jacobian_function(&self) -> &Arc<dyn Oracle> {
        &self.jac
    }

    pub fn jac_sparsity(&self) -> &SparsityPattern {
        &self.jac_sparsity
    }

    /// Number of unknowns.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn implicit_input(&self) -> usize {
        self.iin
    }

    pub fn implicit_output(&self) -> usize {
        self.iout
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn linear_solver(&self) -> &dyn LinearSolver {
        &*self.linsol
    }

    pub fn n_in(&self) -> usize {
        self.oracle.n_in()
    }

    pub fn n_out(&self) -> usize {
        self.oracle.n_out()
    }

    pub fn sparsity_in(&self, i: usize) -> &SparsityPattern {
        self.oracle.sparsity_in(i)
    }

    /// Output `implicit_output` has the unknown's pattern; the others are the oracle's.
    pub fn sparsity_out(&self, o: usize) -> &SparsityPattern {
        if o == self.iout {
            self.oracle.sparsity_in(self.iin)
        } else {
            self.oracle.sparsity_out(o)
        }
    }

    pub fn nnz_in(&self, i: usize) -> usize {
        self.sparsity_in(i).nnz()
    }

    pub fn nnz_out(&self, o: usize) -> usize {
        self.sparsity_out(o).nnz()
    }
}

/// Create a rootfinder with the solver plugin `solver`; same as [`Rootfinder::new`].
pub fn rootfinder(name: &str, solver: &str, oracle: Arc<dyn Oracle>, options: Options) -> Result<Rootfinder> {
    Rootfinder::new(name, solver, oracle, options)
}
