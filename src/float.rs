use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for the primitive floats (`f32`, `f64`) that carry primal values.
///
/// Dual numbers are generic over this trait; oracles themselves exchange `f64`.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Convert an `f64` literal, mapping unrepresentable values to NaN.
    #[inline]
    fn lit(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(Self::nan)
    }
}

impl Float for f32 {}
impl Float for f64 {}
