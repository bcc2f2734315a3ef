//! The [`Scalar`] trait for writing residuals once and evaluating them in every mode.
//!
//! A residual written as `fn r<T: Scalar>(z: &[T], p: &[T]) -> ...` can be evaluated
//! on plain `f64` (numeric), on [`Dual`] (exact directional derivatives) and on
//! [`Bits`] (structural dependency). Residuals must not branch on values: the
//! trait deliberately offers no comparisons, so the three modes always trace the
//! same expression.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::bits::Bits;
use crate::dual::Dual;
use crate::float::Float;

/// Arithmetic scalar accepted by [`Residual`](crate::Residual) implementations.
pub trait Scalar:
    Copy
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a literal to this scalar (zero tangent, no dependency).
    fn constant(v: f64) -> Self;

    #[inline]
    fn zero() -> Self {
        Self::constant(0.0)
    }

    #[inline]
    fn one() -> Self {
        Self::constant(1.0)
    }

    fn recip(self) -> Self;
    fn sqrt(self) -> Self;
    fn powi(self, n: i32) -> Self;
    fn powf(self, n: Self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn tan(self) -> Self;
    fn atan(self) -> Self;
    fn sinh(self) -> Self;
    fn cosh(self) -> Self;
    fn tanh(self) -> Self;
    fn abs(self) -> Self;
}

macro_rules! impl_scalar_primitive {
    ($t:ty) => {
        impl Scalar for $t {
            #[inline]
            fn constant(v: f64) -> Self {
                v as $t
            }
            #[inline]
            fn recip(self) -> Self {
                <$t>::recip(self)
            }
            #[inline]
            fn sqrt(self) -> Self {
                <$t>::sqrt(self)
            }
            #[inline]
            fn powi(self, n: i32) -> Self {
                <$t>::powi(self, n)
            }
            #[inline]
            fn powf(self, n: Self) -> Self {
                <$t>::powf(self, n)
            }
            #[inline]
            fn exp(self) -> Self {
                <$t>::exp(self)
            }
            #[inline]
            fn ln(self) -> Self {
                <$t>::ln(self)
            }
            #[inline]
            fn sin(self) -> Self {
                <$t>::sin(self)
            }
            #[inline]
            fn cos(self) -> Self {
                <$t>::cos(self)
            }
            #[inline]
            fn tan(self) -> Self {
                <$t>::tan(self)
            }
            #[inline]
            fn atan(self) -> Self {
                <$t>::atan(self)
            }
            #[inline]
            fn sinh(self) -> Self {
                <$t>::sinh(self)
            }
            #[inline]
            fn cosh(self) -> Self {
                <$t>::cosh(self)
            }
            #[inline]
            fn tanh(self) -> Self {
                <$t>::tanh(self)
            }
            #[inline]
            fn abs(self) -> Self {
                <$t>::abs(self)
            }
        }
    };
}

impl_scalar_primitive!(f32);
impl_scalar_primitive!(f64);

impl<F: Float> Scalar for Dual<F> {
    #[inline]
    fn constant(v: f64) -> Self {
        Dual::constant(F::lit(v))
    }
    #[inline]
    fn recip(self) -> Self {
        Dual::recip(self)
    }
    #[inline]
    fn sqrt(self) -> Self {
        Dual::sqrt(self)
    }
    #[inline]
    fn powi(self, n: i32) -> Self {
        Dual::powi(self, n)
    }
    #[inline]
    fn powf(self, n: Self) -> Self {
        Dual::powf(self, n)
    }
    #[inline]
    fn exp(self) -> Self {
        Dual::exp(self)
    }
    #[inline]
    fn ln(self) -> Self {
        Dual::ln(self)
    }
    #[inline]
    fn sin(self) -> Self {
        Dual::sin(self)
    }
    #[inline]
    fn cos(self) -> Self {
        Dual::cos(self)
    }
    #[inline]
    fn tan(self) -> Self {
        Dual::tan(self)
    }
    #[inline]
    fn atan(self) -> Self {
        Dual::atan(self)
    }
    #[inline]
    fn sinh(self) -> Self {
        Dual::sinh(self)
    }
    #[inline]
    fn cosh(self) -> Self {
        Dual::cosh(self)
    }
    #[inline]
    fn tanh(self) -> Self {
        Dual::tanh(self)
    }
    #[inline]
    fn abs(self) -> Self {
        Dual::abs(self)
    }
}

// Unary elementals keep their operand's lanes; `powi(0)` is a constant.
impl Scalar for Bits {
    #[inline]
    fn constant(_v: f64) -> Self {
        Bits::NONE
    }
    #[inline]
    fn recip(self) -> Self {
        self
    }
    #[inline]
    fn sqrt(self) -> Self {
        self
    }
    #[inline]
    fn powi(self, n: i32) -> Self {
        if n == 0 {
            Bits::NONE
        } else {
            self
        }
    }
    #[inline]
    fn powf(self, n: Self) -> Self {
        self.union(n)
    }
    #[inline]
    fn exp(self) -> Self {
        self
    }
    #[inline]
    fn ln(self) -> Self {
        self
    }
    #[inline]
    fn sin(self) -> Self {
        self
    }
    #[inline]
    fn cos(self) -> Self {
        self
    }
    #[inline]
    fn tan(self) -> Self {
        self
    }
    #[inline]
    fn atan(self) -> Self {
        self
    }
    #[inline]
    fn sinh(self) -> Self {
        self
    }
    #[inline]
    fn cosh(self) -> Self {
        self
    }
    #[inline]
    fn tanh(self) -> Self {
        self
    }
    #[inline]
    fn abs(self) -> Self {
        self
    }
}
