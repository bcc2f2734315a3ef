use crate::convergence::{dot, norm, norm_inf};
use crate::error::{Error, Result};
use crate::line_search::{backtracking_armijo, ArmijoParams};
use crate::options::{
    check_options, get_bool, get_float, get_usize, Constraint, Dict, OptionInfo, OptionKind,
};
use crate::result::{Termination, TerminationReason};
use crate::rootfinder::RootProblem;
use crate::solvers::RootSolver;

/// Options understood by the `"newton"` plugin.
pub const NEWTON_OPTIONS: &[OptionInfo] = &[
    OptionInfo {
        name: "abstol",
        kind: OptionKind::Float,
        description: "Stop when the residual infinity norm is below this value",
    },
    OptionInfo {
        name: "abstol_step",
        kind: OptionKind::Float,
        description: "Stop when the step infinity norm is below this value",
    },
    OptionInfo {
        name: "max_iter",
        kind: OptionKind::Int,
        description: "Maximum number of Newton iterations",
    },
    OptionInfo {
        name: "line_search",
        kind: OptionKind::Bool,
        description: "Backtrack on the squared residual norm",
    },
    OptionInfo {
        name: "armijo_c",
        kind: OptionKind::Float,
        description: "Sufficient decrease parameter of the line search",
    },
    OptionInfo {
        name: "armijo_rho",
        kind: OptionKind::Float,
        description: "Backtracking factor of the line search",
    },
    OptionInfo {
        name: "alpha_min",
        kind: OptionKind::Float,
        description: "Smallest step length tried before the line search gives up",
    },
];

/// Strict constraints keep this fraction of the distance to the boundary.
const FRACTION_TO_BOUNDARY: f64 = 0.99;

/// Configuration for the Newton solver.
#[derive(Debug, Clone)]
pub struct NewtonConfig {
    /// Residual tolerance (infinity norm).
    pub abstol: f64,
    /// Step tolerance (infinity norm).
    pub abstol_step: f64,
    pub max_iter: usize,
    /// Whether to backtrack along the Newton direction.
    pub line_search: bool,
    /// Line search parameters. `alpha_init` is replaced by the constraint step bound.
    pub armijo: ArmijoParams,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            abstol: 1e-12,
            abstol_step: 1e-12,
            max_iter: 100,
            line_search: true,
            armijo: ArmijoParams::default(),
        }
    }
}

impl NewtonConfig {
    /// Read a configuration from plugin options, rejecting unknown keys.
    pub fn from_options(opts: &Dict) -> Result<Self> {
        check_options(NEWTON_OPTIONS, opts)?;
        let d = NewtonConfig::default();
        let config = NewtonConfig {
            abstol: get_float(opts, "abstol", d.abstol)?,
            abstol_step: get_float(opts, "abstol_step", d.abstol_step)?,
            max_iter: get_usize(opts, "max_iter", d.max_iter)?,
            line_search: get_bool(opts, "line_search", d.line_search)?,
            armijo: ArmijoParams {
                c: get_float(opts, "armijo_c", d.armijo.c)?,
                rho: get_float(opts, "armijo_rho", d.armijo.rho)?,
                alpha_init: 1.0,
                alpha_min: get_float(opts, "alpha_min", d.armijo.alpha_min)?,
            },
        };
        if !(config.armijo.rho > 0.0 && config.armijo.rho < 1.0) {
            return Err(Error::InvalidOption {
                name: "armijo_rho".to_string(),
                reason: format!("must lie in (0, 1), got {}", config.armijo.rho),
            });
        }
        Ok(config)
    }
}

/// Damped Newton's method, the `"newton"` rootfinder plugin.
///
/// Each iteration factorizes the Jacobian at the current iterate, solves
/// `J * dz = -r`, bounds the step so that sign constraints stay satisfied and
/// backtracks on `½‖r‖²` until the Armijo condition holds.
#[derive(Debug, Clone, Default)]
pub struct Newton {
    config: NewtonConfig,
}

impl Newton {
    pub fn new(config: NewtonConfig) -> Self {
        Newton { config }
    }

    pub fn from_options(opts: &Dict) -> Result<Self> {
        Ok(Newton::new(NewtonConfig::from_options(opts)?))
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }
}

/// Largest `alpha <= 1` keeping `z + alpha * dz` within the constraints.
fn step_bound(constraints: &[Constraint], z: &[f64], dz: &[f64]) -> f64 {
    let mut alpha = 1.0_f64;
    for ((&c, &zi), &di) in constraints.iter().zip(z).zip(dz) {
        let s = c.sign();
        if s * di >= 0.0 {
            continue;
        }
        let dist = -zi / di;
        let limit = if c.is_strict() {
            FRACTION_TO_BOUNDARY * dist
        } else {
            dist
        };
        alpha = alpha.min(limit.max(0.0));
    }
    alpha
}

/// `out = z + alpha * dz`, snapping non-strict constraints onto their boundary.
fn take_step(constraints: &[Constraint], z: &[f64], dz: &[f64], alpha: f64, out: &mut [f64]) {
    for i in 0..z.len() {
        out[i] = z[i] + alpha * dz[i];
    }
    for (&c, v) in constraints.iter().zip(out.iter_mut()) {
        if !c.is_strict() && c.sign() * *v < 0.0 {
            *v = 0.0;
        }
    }
}

impl RootSolver for Newton {
    fn name(&self) -> &str {
        "newton"
    }

    fn solve(&mut self, problem: &mut RootProblem<'_>, z: &mut [f64]) -> Result<Termination> {
        let config = &self.config;
        let n = problem.n();
        let constraints = problem.constraints();

        if let Some(index) = constraints
            .iter()
            .zip(z.iter())
            .position(|(c, &v)| !c.is_satisfied(v))
        {
            return Err(Error::InfeasibleGuess { index });
        }

        let work = problem.take_work();
        let (r, work) = work.split_at_mut(n);
        let (dz, work) = work.split_at_mut(n);
        let (trial, r_trial) = work.split_at_mut(n);

        problem.residual(z, r)?;
        let mut r_norm = norm_inf(&*r);

        let stop = |iterations, residual_norm, reason| Termination {
            iterations,
            residual_norm,
            reason,
        };

        for iter in 0..config.max_iter {
            if r_norm < config.abstol {
                return Ok(stop(iter, r_norm, TerminationReason::ResidualNorm));
            }

            match problem.factorize(z) {
                Ok(()) => {}
                Err(Error::SingularMatrix) => {
                    return Ok(stop(iter, r_norm, TerminationReason::SingularJacobian));
                }
                Err(e) => return Err(e),
            }

            // Solve J * dz = -r
            for (d, &ri) in dz.iter_mut().zip(r.iter()) {
                *d = -ri;
            }
            problem.solve(dz)?;

            let alpha_max = step_bound(constraints, z, dz);
            let alpha = if config.line_search {
                let f_0 = 0.5 * dot(&*r, &*r);
                let params = ArmijoParams {
                    alpha_init: alpha_max,
                    ..config.armijo.clone()
                };
                // Along the Newton direction, d/dalpha ½‖r‖² = -‖r‖².
                let ls = backtracking_armijo(
                    |alpha| {
                        take_step(constraints, z, dz, alpha, trial);
                        problem.residual(trial, r_trial)?;
                        Ok(0.5 * dot(&*r_trial, &*r_trial))
                    },
                    f_0,
                    -2.0 * f_0,
                    &params,
                )?;
                match ls {
                    Some(ls) => ls.alpha,
                    None => {
                        return Ok(stop(iter, r_norm, TerminationReason::LineSearchFailed));
                    }
                }
            } else if alpha_max < config.armijo.alpha_min {
                return Ok(stop(iter, r_norm, TerminationReason::LineSearchFailed));
            } else {
                alpha_max
            };

            take_step(constraints, z, dz, alpha, trial);
            z.copy_from_slice(trial);
            problem.residual(z, r)?;
            r_norm = norm_inf(&*r);

            log::trace!(
                "newton iter {}: |r| = {:e}, alpha = {}, ||dz||_2 = {:e}",
                iter + 1,
                r_norm,
                alpha,
                norm(&*dz)
            );

            if r_norm < config.abstol {
                return Ok(stop(iter + 1, r_norm, TerminationReason::ResidualNorm));
            }
            if alpha * norm_inf(&*dz) < config.abstol_step {
                return Ok(stop(iter + 1, r_norm, TerminationReason::StepSize));
            }
        }

        let reason = if r_norm < config.abstol {
            TerminationReason::ResidualNorm
        } else {
            TerminationReason::MaxIterations
        };
        Ok(stop(config.max_iter, r_norm, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionValue, Options};
    use crate::rootfinder::Rootfinder;
    use ifkit::{Residual, ResidualOracle, Scalar};
    use std::sync::Arc;

    /// r = [x0² + x1² - 4, x0 - x1]; root (√2, √2) from a positive guess.
    struct Circle;

    impl Residual for Circle {
        fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
            let x = arg[0];
            res[0][0] = x[0] * x[0] + x[1] * x[1] - T::constant(4.0);
            res[0][1] = x[0] - x[1];
        }
    }

    fn circle_solver(config: Options) -> Rootfinder {
        let oracle = ResidualOracle::builder("circle", Circle)
            .input("x", 2)
            .output("r", 2)
            .build()
            .unwrap();
        Rootfinder::new("circle_root", "newton", Arc::new(oracle), config).unwrap()
    }

    #[test]
    fn newton_circle() {
        let mut rf = circle_solver(Options::default());
        let out = rf.eval(&[&[3.0, 1.0]]).unwrap();
        let s = 2.0_f64.sqrt();
        assert!((out[0][0] - s).abs() < 1e-10);
        assert!((out[0][1] - s).abs() < 1e-10);
    }

    #[test]
    fn newton_without_line_search() {
        let mut rf =
            circle_solver(Options::default().with_solver_option("line_search", false));
        let out = rf.eval(&[&[3.0, 1.0]]).unwrap();
        assert!((out[0][0] - 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn newton_max_iter_zero_fails() {
        let mut rf = circle_solver(Options::default().with_solver_option("max_iter", 0usize));
        match rf.eval(&[&[3.0, 1.0]]) {
            Err(Error::Convergence { reason, iterations, .. }) => {
                assert_eq!(reason, TerminationReason::MaxIterations);
                assert_eq!(iterations, 0);
            }
            other => panic!("expected convergence failure, got {:?}", other),
        }
    }

    #[test]
    fn newton_nonnegative_constraint_stays_feasible() {
        let mut rf = circle_solver(Options::default().with_constraints(vec![1, 1]));
        let out = rf.eval(&[&[0.1, 3.0]]).unwrap();
        assert!(out[0].iter().all(|&v| v >= 0.0));
        assert!((out[0][0] - 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn step_bound_respects_constraints() {
        let cons = [Constraint::Positive, Constraint::NonNegative, Constraint::Free];
        let z = [1.0, 1.0, 1.0];
        assert_eq!(step_bound(&cons, &z, &[0.5, 0.5, -10.0]), 1.0);
        assert!((step_bound(&cons, &z, &[-2.0, 0.0, 0.0]) - 0.495).abs() < 1e-15);
        assert!((step_bound(&cons, &z, &[0.0, -4.0, 0.0]) - 0.25).abs() < 1e-15);
    }

    #[test]
    fn take_step_snaps_to_boundary() {
        let cons = [Constraint::NonPositive];
        let mut out = [0.0];
        take_step(&cons, &[-1.0], &[1.5], 1.0, &mut out);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn options_are_validated() {
        let mut opts = Dict::new();
        opts.insert("abstol".into(), OptionValue::Float(1e-8));
        opts.insert("max_iter".into(), OptionValue::Int(7));
        let config = NewtonConfig::from_options(&opts).unwrap();
        assert_eq!(config.abstol, 1e-8);
        assert_eq!(config.max_iter, 7);

        opts.insert("tolerance".into(), OptionValue::Float(1.0));
        assert!(matches!(
            NewtonConfig::from_options(&opts),
            Err(Error::UnknownOption { .. })
        ));

        let mut bad = Dict::new();
        bad.insert("armijo_rho".into(), OptionValue::Float(1.5));
        assert!(matches!(
            NewtonConfig::from_options(&bad),
            Err(Error::InvalidOption { .. })
        ));
    }
}
