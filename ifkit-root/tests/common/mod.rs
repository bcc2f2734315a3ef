#![allow(dead_code)]

use std::sync::Arc;

use ifkit::{Oracle, Residual, ResidualOracle, Scalar};
use ifkit_root::{Options, Rootfinder};

/// r = z² - p, g = z·p
pub struct Sqrt;

impl Residual for Sqrt {
    fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
        let (z, p) = (arg[0][0], arg[1][0]);
        res[0][0] = z * z - p;
        res[1][0] = z * p;
    }
}

pub fn sqrt_oracle() -> Arc<dyn Oracle> {
    Arc::new(
        ResidualOracle::builder("sqrt", Sqrt)
            .input("z", 1)
            .input("p", 1)
            .output("r", 1)
            .output("g", 1)
            .build()
            .unwrap(),
    )
}

pub fn sqrt_solver(options: Options) -> Rootfinder {
    Rootfinder::new("sqrt_root", "newton", sqrt_oracle(), options).unwrap()
}

/// Three unknowns with a chain of dependencies and an extra parameter `q`
/// that only reaches the auxiliary output:
///
/// ```text
/// r0 = 2 z0 + z1 - p0
/// r1 = z1 + 0.1 z1³ - p1
/// r2 = z2 + exp(0.1 z0) - p2²
/// g  = [z0 · q0, z2 + q0]
/// ```
pub struct Chain;

impl Residual for Chain {
    fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
        let (z, p, q) = (arg[0], arg[1], arg[2]);
        let c = T::constant;
        res[0][0] = c(2.0) * z[0] + z[1] - p[0];
        res[0][1] = z[1] + c(0.1) * z[1] * z[1] * z[1] - p[1];
        res[0][2] = z[2] + (c(0.1) * z[0]).exp() - p[2] * p[2];
        res[1][0] = z[0] * q[0];
        res[1][1] = z[2] + q[0];
    }
}

pub fn chain_oracle() -> Arc<dyn Oracle> {
    Arc::new(
        ResidualOracle::builder("chain", Chain)
            .input("z", 3)
            .input("p", 3)
            .input("q", 1)
            .output("r", 3)
            .output("g", 2)
            .build()
            .unwrap(),
    )
}

pub fn chain_solver(options: Options) -> Rootfinder {
    Rootfinder::new("chain_root", "newton", chain_oracle(), options).unwrap()
}

pub const GUESS: [f64; 3] = [0.0, 0.0, 0.0];
pub const P: [f64; 3] = [1.0, 0.5, 2.0];
pub const Q: [f64; 1] = [0.3];

/// Solve the chain system at `(P, Q)` and return `(z, g)`.
pub fn chain_solution(rf: &mut Rootfinder) -> (Vec<f64>, Vec<f64>) {
    let mut out = rf.eval(&[&GUESS[..], &P[..], &Q[..]]).unwrap();
    let g = out.pop().unwrap();
    let z = out.pop().unwrap();
    (z, g)
}

/// Central difference of every rootfinder output with respect to element `k`
/// of input `i`, re-solving at each perturbed point.
pub fn central_difference(rf: &mut Rootfinder, arg: &[Vec<f64>], i: usize, k: usize) -> Vec<Vec<f64>> {
    let h = 1e-5;
    let mut plus = arg.to_vec();
    plus[i][k] += h;
    let mut minus = arg.to_vec();
    minus[i][k] -= h;
    let eval = |rf: &mut Rootfinder, a: &[Vec<f64>]| {
        let refs: Vec<&[f64]> = a.iter().map(|v| &v[..]).collect();
        rf.eval(&refs).unwrap()
    };
    let fp = eval(rf, &plus);
    let fm = eval(rf, &minus);
    fp.iter()
        .zip(&fm)
        .map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y) / (2.0 * h)).collect())
        .collect()
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
