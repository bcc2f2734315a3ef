//! Numeric solve steps selectable by name through the `"rootfinder"` plugin family.

pub mod newton;

use crate::error::Result;
use crate::result::Termination;
use crate::rootfinder::RootProblem;

/// The numeric iteration behind a rootfinder plugin.
///
/// The core hands over a [`RootProblem`] with the parameters fixed and `z`
/// holding the initial guess. On return `z` must hold the best iterate found.
/// A non-converged [`Termination`] is turned into
/// [`Error::Convergence`](crate::Error::Convergence) by the caller, so
/// implementations only return `Err` for failures that are not about
/// convergence.
pub trait RootSolver: Send {
    fn name(&self) -> &str;

    fn solve(&mut self, problem: &mut RootProblem<'_>, z: &mut [f64]) -> Result<Termination>;
}
