use num_traits::Float;

/// Compute the L2 norm of a vector.
pub fn norm<F: Float>(v: &[F]) -> F {
    let mut s = F::zero();
    for &x in v {
        s = s + x * x;
    }
    s.sqrt()
}

/// Compute the infinity norm of a vector.
pub fn norm_inf<F: Float>(v: &[F]) -> F {
    v.iter().fold(F::zero(), |m, &x| m.max(x.abs()))
}

/// Compute the dot product of two vectors.
pub fn dot<F: Float>(a: &[F], b: &[F]) -> F {
    debug_assert_eq!(a.len(), b.len());
    let mut s = F::zero();
    for i in 0..a.len() {
        s = s + a[i] * b[i];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norms() {
        let v = [3.0, -4.0];
        assert!((norm(&v) - 5.0).abs() < 1e-15);
        assert!((norm_inf(&v) - 4.0).abs() < 1e-15);
        assert!((dot(&v, &v) - 25.0).abs() < 1e-15);
    }

    #[test]
    fn norm_inf_of_empty_is_zero() {
        assert_eq!(norm_inf::<f64>(&[]), 0.0);
    }
}
