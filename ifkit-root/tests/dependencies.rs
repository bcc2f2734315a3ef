mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use ifkit::{Bvec, Residual, ResidualOracle, Scalar};
use ifkit_root::{rootfinder, Options, Rootfinder};

fn chain_args() -> Vec<Vec<f64>> {
    vec![GUESS.to_vec(), P.to_vec(), Q.to_vec()]
}

#[test]
fn unknown_depends_on_parameters_through_the_chain() {
    let mut rf = chain_solver(Options::default());
    let sp = rf.dependency_sparsity(1, 0).unwrap();
    assert_eq!((sp.nrow, sp.ncol), (3, 3));
    let entries: Vec<(usize, usize)> = sp.entries().collect();
    // Column-major: p0 → {z0, z2}, p1 → {z0, z1, z2}, p2 → {z2}
    assert_eq!(
        entries,
        vec![(0, 0), (2, 0), (0, 1), (1, 1), (2, 1), (2, 2)]
    );
}

#[test]
fn auxiliary_outputs_combine_both_paths() {
    let mut rf = chain_solver(Options::default());
    let gp = rf.dependency_sparsity(1, 1).unwrap();
    assert_eq!(
        gp.entries().collect::<Vec<_>>(),
        vec![(0, 0), (1, 0), (0, 1), (1, 1), (1, 2)]
    );
    let gq = rf.dependency_sparsity(2, 1).unwrap();
    assert_eq!(gq.entries().collect::<Vec<_>>(), vec![(0, 0), (1, 0)]);
    // q never reaches the unknown
    assert!(rf.dependency_sparsity(2, 0).unwrap().is_empty());
}

#[test]
fn guess_has_no_dependents() {
    let mut rf = chain_solver(Options::default());
    assert!(rf.dependency_sparsity(0, 0).unwrap().is_empty());
    assert!(rf.dependency_sparsity(0, 1).unwrap().is_empty());
}

#[test]
fn no_dependency_means_zero_sensitivity() {
    let mut rf = chain_solver(Options::default());
    let args = chain_args();
    chain_solution(&mut rf);

    for i in 0..3 {
        let patterns: Vec<_> = (0..2).map(|o| rf.dependency_sparsity(i, o).unwrap()).collect();
        for k in 0..args[i].len() {
            let fd = central_difference(&mut rf, &args, i, k);
            for (o, sp) in patterns.iter().enumerate() {
                for (row, d) in fd[o].iter().enumerate() {
                    if !sp.contains(row, k) {
                        assert!(
                            d.abs() < 1e-6,
                            "output {} [{}] moves with input {} [{}] by {}",
                            o,
                            row,
                            i,
                            k,
                            d
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn reverse_propagation_is_the_transpose() {
    let mut rf = chain_solver(Options::default());
    let n_in = rf.n_in();
    let n_out = rf.n_out();

    for o in 0..n_out {
        // One lane per output element
        let seed: Vec<Bvec> = (0..rf.nnz_out(o)).map(|j| 1 << j).collect();
        let mut sens: Vec<Vec<Bvec>> = (0..n_in).map(|i| vec![0; rf.nnz_in(i)]).collect();
        {
            let mut res: Vec<Option<&[Bvec]>> = vec![None; n_out];
            res[o] = Some(&seed[..]);
            let mut arg: Vec<Option<&mut [Bvec]>> = sens.iter_mut().map(|s| Some(&mut s[..])).collect();
            rf.sp_reverse(&mut arg, &res).unwrap();
        }
        for (i, bits) in sens.iter().enumerate() {
            let sp = rf.dependency_sparsity(i, o).unwrap();
            for (k, &b) in bits.iter().enumerate() {
                for j in 0..rf.nnz_out(o) {
                    assert_eq!(
                        b & (1 << j) != 0,
                        sp.contains(j, k),
                        "output {} [{}] / input {} [{}]",
                        o,
                        j,
                        i,
                        k
                    );
                }
            }
        }
    }
}

#[test]
fn sp_reverse_accumulates() {
    let mut rf = chain_solver(Options::default());
    let seed: Vec<Bvec> = vec![0b1, 0, 0];
    let mut z_bits = vec![0b100; 3];
    let mut p_bits = vec![0b10; 3];
    let mut q_bits = vec![0; 1];
    rf.sp_reverse(
        &mut [
            Some(&mut z_bits[..]),
            Some(&mut p_bits[..]),
            Some(&mut q_bits[..]),
        ],
        &[Some(&seed[..]), None],
    )
    .unwrap();
    // z0 depends on p0 and p1
    assert_eq!(p_bits, vec![0b11, 0b11, 0b10]);
    assert_eq!(z_bits, vec![0b100; 3]);
    assert_eq!(q_bits, vec![0]);
}

#[test]
fn sp_forward_with_many_lanes() {
    let mut rf = chain_solver(Options::default());
    let p_bits: Vec<Bvec> = vec![1 << 63, 1 << 1, 1 << 40];
    let mut z_bits = vec![0; 3];
    let mut g_bits = vec![0; 2];
    rf.sp_forward(
        &[Some(&[u64::MAX; 3][..]), Some(&p_bits[..]), None],
        &mut [Some(&mut z_bits[..]), Some(&mut g_bits[..])],
    )
    .unwrap();
    assert_eq!(z_bits, vec![(1 << 63) | 2, 2, (1 << 63) | 2 | (1 << 40)]);
    assert_eq!(g_bits, vec![z_bits[0], z_bits[2]]);
}

#[test]
fn wrong_slot_counts_are_rejected() {
    let mut rf = chain_solver(Options::default());
    let mut z_bits = vec![0; 3];
    assert!(rf
        .sp_forward(&[None, None], &mut [Some(&mut z_bits[..]), None])
        .is_err());
    assert!(rf.dependency_sparsity(3, 0).is_err());
    assert!(rf.dependency_sparsity(0, 2).is_err());
}

/// r_i = z_i - z_{i-1} - p_i: a lower bidiagonal Jacobian.
struct Ladder;

impl Residual for Ladder {
    fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
        let (z, p) = (arg[0], arg[1]);
        for i in 0..z.len() {
            let mut r = z[i] - p[i];
            if i > 0 {
                r = r - z[i - 1];
            }
            res[0][i] = r;
        }
    }
}

fn ladder(n: usize) -> Rootfinder {
    let oracle = ResidualOracle::builder("ladder", Ladder)
        .input("z", n)
        .input("p", n)
        .output("r", n)
        .build()
        .unwrap();
    rootfinder("ladder_root", "newton", Arc::new(oracle), Options::default()).unwrap()
}

#[test]
fn long_ladder_propagates_in_linear_time() {
    let n = 20_000;
    let mut rf = ladder(n);
    assert_eq!(rf.linear_solver().structural_rank(), n);

    let mut p_bits = vec![0 as Bvec; n];
    p_bits[0] = 0b01;
    p_bits[n - 1] = 0b10;
    let mut z_bits = vec![0 as Bvec; n];

    let start = Instant::now();
    for _ in 0..50 {
        rf.sp_forward(&[None, Some(&p_bits[..])], &mut [Some(&mut z_bits[..])])
            .unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());

    // p0 reaches every unknown down the ladder; p_{n-1} only the last one
    assert!(z_bits[..n - 1].iter().all(|&b| b == 0b01));
    assert_eq!(z_bits[n - 1], 0b11);

    let mut seed = vec![0 as Bvec; n];
    seed[0] = 0b100;
    let mut z_bar = vec![0 as Bvec; n];
    let mut p_bar = vec![0 as Bvec; n];
    rf.sp_reverse(&mut [Some(&mut z_bar[..]), Some(&mut p_bar[..])], &[Some(&seed[..])])
        .unwrap();
    assert_eq!(p_bar[0], 0b100);
    assert!(p_bar[1..].iter().all(|&b| b == 0));
    assert!(z_bar.iter().all(|&b| b == 0));
}
