use std::fmt;

/// Outcome of a numeric root solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Termination {
    /// Number of Newton iterations performed.
    pub iterations: usize,
    /// Infinity norm of the residual at the returned point.
    pub residual_norm: f64,
    /// Reason for termination.
    pub reason: TerminationReason,
}

impl Termination {
    /// Whether the solve reached one of its tolerances.
    ///
    /// A [`StepSize`](TerminationReason::StepSize) stop counts as converged
    /// whatever `residual_norm` is: the iteration stalled, and the rootfinder
    /// accepts the last iterate. Callers that need a small residual should check
    /// `residual_norm` themselves or set `abstol_step` to zero.
    pub fn converged(&self) -> bool {
        self.reason.is_success()
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Residual norm fell below tolerance.
    ResidualNorm,
    /// Step size fell below tolerance. Accepted as converged without a
    /// residual check.
    StepSize,
    /// Reached the maximum number of iterations.
    MaxIterations,
    /// Line search could not find a sufficient decrease.
    LineSearchFailed,
    /// The numeric Jacobian could not be factorized.
    SingularJacobian,
}

impl TerminationReason {
    /// `ResidualNorm` and `StepSize` are successes; see [`Termination::converged`].
    pub fn is_success(self) -> bool {
        matches!(self, TerminationReason::ResidualNorm | TerminationReason::StepSize)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ResidualNorm => write!(f, "residual norm below tolerance"),
            TerminationReason::StepSize => write!(f, "step size below tolerance"),
            TerminationReason::MaxIterations => write!(f, "maximum iterations reached"),
            TerminationReason::LineSearchFailed => write!(f, "line search failed"),
            TerminationReason::SingularJacobian => write!(f, "singular jacobian"),
        }
    }
}
