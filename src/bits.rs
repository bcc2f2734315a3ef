//! Dependency bits: a scalar that records which seeds a value may depend on.
//!
//! A [`Bvec`] packs 64 independent seed lanes into one word. [`Bits`] wraps a
//! `Bvec` and implements every arithmetic operation as a bitwise OR of its
//! operands, so evaluating a residual on `Bits` inputs yields, for each output,
//! the set of seeded inputs it can structurally reach. Constants carry no lanes.
//!
//! The result over-approximates dependency (a term that cancels numerically,
//! like `z - z`, still reports `z`) but never under-reports it.

use std::fmt;

/// One word of dependency lanes.
pub type Bvec = u64;

/// Number of lanes in a [`Bvec`].
pub const LANES: usize = Bvec::BITS as usize;

/// Dependency scalar: the set of seed lanes a value may depend on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bits(pub Bvec);

impl Bits {
    /// The empty dependency set (constants).
    pub const NONE: Bits = Bits(0);

    /// A value seeded on a single lane.
    #[inline]
    pub fn lane(k: usize) -> Self {
        debug_assert!(k < LANES, "lane {} out of range", k);
        Bits(1 << k)
    }

    /// Union of two dependency sets.
    #[inline]
    pub fn union(self, other: Self) -> Self {
        Bits(self.0 | other.0)
    }

    /// Whether no lane is set.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the set lanes, lowest first.
    pub fn lanes(self) -> impl Iterator<Item = usize> {
        let mut w = self.0;
        std::iter::from_fn(move || {
            if w == 0 {
                return None;
            }
            let bit = w.trailing_zeros() as usize;
            w &= w - 1;
            Some(bit)
        })
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#066b}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanes_iterates_set_bits() {
        let b = Bits::lane(0).union(Bits::lane(5)).union(Bits::lane(63));
        let lanes: Vec<usize> = b.lanes().collect();
        assert_eq!(lanes, vec![0, 5, 63]);
    }

    #[test]
    fn none_is_empty() {
        assert!(Bits::NONE.is_empty());
        assert!(!Bits::lane(3).is_empty());
    }
}
