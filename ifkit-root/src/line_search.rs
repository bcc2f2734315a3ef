use crate::error::Result;

/// Parameters for the backtracking Armijo line search.
#[derive(Debug, Clone)]
pub struct ArmijoParams {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c: f64,
    /// Backtracking factor (default: 0.5).
    pub rho: f64,
    /// Initial step size (default: 1.0).
    pub alpha_init: f64,
    /// Minimum step size before declaring failure (default: 1e-10).
    pub alpha_min: f64,
}

impl Default for ArmijoParams {
    fn default() -> Self {
        ArmijoParams {
            c: 1e-4,
            rho: 0.5,
            alpha_init: 1.0,
            alpha_min: 1e-10,
        }
    }
}

/// Result of a successful line search.
#[derive(Debug)]
pub struct LineSearchResult {
    /// The accepted step size.
    pub alpha: f64,
    /// Merit value at the accepted step.
    pub value: f64,
    /// Number of merit evaluations used.
    pub evals: usize,
}

/// Backtracking line search satisfying the Armijo (sufficient decrease) condition.
///
/// `merit(alpha)` evaluates the merit function along the search direction, `f_0` is
/// its value at `alpha = 0` and `slope` its directional derivative there. Searches
/// for `alpha` such that `merit(alpha) <= f_0 + c * alpha * slope`.
///
/// Returns `Ok(None)` if `alpha` falls below `alpha_min` or the direction is not a
/// descent direction. Non-finite merit values are treated as insufficient decrease.
pub fn backtracking_armijo<M>(
    mut merit: M,
    f_0: f64,
    slope: f64,
    params: &ArmijoParams,
) -> Result<Option<LineSearchResult>>
where
    M: FnMut(f64) -> Result<f64>,
{
    // Not a descent direction: caller should handle this
    if slope >= 0.0 {
        return Ok(None);
    }

    let mut alpha = params.alpha_init;
    let mut evals = 0;

    loop {
        if alpha < params.alpha_min {
            return Ok(None);
        }

        let f_new = merit(alpha)?;
        evals += 1;

        if f_new.is_finite() && f_new <= f_0 + params.c * alpha * slope {
            return Ok(Some(LineSearchResult {
                alpha,
                value: f_new,
                evals,
            }));
        }

        alpha *= params.rho;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = 0.5 * (x0^2 + x1^2) along d = -x.
    fn quadratic_merit(x: [f64; 2], d: [f64; 2]) -> impl FnMut(f64) -> Result<f64> {
        move |alpha| {
            let a = x[0] + alpha * d[0];
            let b = x[1] + alpha * d[1];
            Ok(0.5 * (a * a + b * b))
        }
    }

    #[test]
    fn armijo_full_step_on_quadratic() {
        let x = [2.0, 3.0];
        let d = [-2.0, -3.0];
        let f_x = 6.5;
        let slope = -13.0;
        let result = backtracking_armijo(quadratic_merit(x, d), f_x, slope, &ArmijoParams::default())
            .unwrap()
            .unwrap();
        assert!((result.alpha - 1.0).abs() < 1e-12);
        assert!(result.value < f_x);
        assert_eq!(result.evals, 1);
    }

    #[test]
    fn armijo_backtracks_on_overshoot() {
        // Direction four times too long: alpha = 1 overshoots, alpha = 0.25 is exact.
        let x = [2.0, 3.0];
        let d = [-8.0, -12.0];
        let result = backtracking_armijo(quadratic_merit(x, d), 6.5, -52.0, &ArmijoParams::default())
            .unwrap()
            .unwrap();
        assert!(result.alpha < 1.0);
        assert!(result.value < 6.5);
    }

    #[test]
    fn armijo_non_descent_returns_none() {
        let x = [2.0, 3.0];
        let d = [2.0, 3.0];
        let result =
            backtracking_armijo(quadratic_merit(x, d), 6.5, 13.0, &ArmijoParams::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn armijo_rejects_nan_merit() {
        let result = backtracking_armijo(|_| Ok(f64::NAN), 1.0, -1.0, &ArmijoParams::default())
            .unwrap();
        assert!(result.is_none());
    }
}
