//! Differentiable function layer for implicit solvers.
//!
//! A [`Residual`] is written once over the [`Scalar`] trait and wrapped by
//! [`ResidualOracle`] into an [`Oracle`]: a sparse multi-input, multi-output function
//! exposing numeric evaluation, Jacobian generation, forward and reverse directional
//! derivatives, and boolean dependency propagation. Solvers built on this layer only
//! ever see the [`Oracle`] trait.

pub mod bits;
pub mod dual;
pub mod error;
pub mod float;
pub mod oracle;
pub mod residual;
pub mod scalar;
pub mod sparsity;
mod traits;

pub use bits::{Bits, Bvec};
pub use dual::Dual;
pub use error::{OracleError, Result};
pub use float::Float;
pub use oracle::Oracle;
pub use residual::{Residual, ResidualOracle, ResidualOracleBuilder};
pub use scalar::Scalar;
pub use sparsity::{BlockTriangular, SparsityPattern};

/// Type alias for forward-mode dual numbers over `f64`.
pub type Dual64 = Dual<f64>;
/// Type alias for forward-mode dual numbers over `f32`.
pub type Dual32 = Dual<f32>;
