//! Rootfinders for implicit equations `r(z, p) = 0` with exact sensitivities.
//!
//! A [`Rootfinder`] turns a residual [`Oracle`](ifkit::Oracle) into the implicit
//! function `p ↦ z*(p)`. The numeric solve is a named plugin (`"newton"` by
//! default); derivatives are exact and batched through the implicit function
//! theorem, sharing one Jacobian factorization across all directions; dependency
//! propagation follows the same traversal over bit sets.
//!
//! ```ignore
//! let mut rf = rootfinder("sqrt", "newton", Arc::new(oracle), Options::default())?;
//! let out = rf.eval(&[&[1.0], &[4.0]])?;               // z* = 2
//! let dz = rf.implicit_jacobian(&[&[1.0], &[4.0]], &out[0], 1)?; // dz/dp = 0.25
//! ```

pub mod convergence;
mod dependency;
pub mod error;
pub mod line_search;
pub mod linsol;
pub mod options;
pub mod plugin;
pub mod result;
pub mod rootfinder;
mod sensitivity;
pub mod solvers;
mod sweep;
mod workspace;

pub use error::{Error, Result};
pub use line_search::ArmijoParams;
pub use linsol::{DenseLu, LinearSolver};
#[cfg(feature = "sparse")]
pub use linsol::SparseLu;
pub use options::{Constraint, Dict, OptionInfo, OptionKind, OptionValue, Options};
pub use plugin::{
    doc_linsol, doc_rootfinder, has_linsol, has_rootfinder, linsol, load_rootfinder,
    register_linsol, register_rootfinder, rootfinder_plugins,
};
pub use result::{Termination, TerminationReason};
pub use rootfinder::{rootfinder, RootProblem, Rootfinder};
pub use solvers::newton::{Newton, NewtonConfig};
pub use solvers::RootSolver;
