use ifkit::SparsityPattern;
use ifkit_root::{has_linsol, linsol, Dict, Error, LinearSolver};

/// Tridiagonal test matrix with distinct entries, in pattern storage order.
fn tridiagonal(n: usize) -> (SparsityPattern, Vec<f64>, Vec<Vec<f64>>) {
    let mut entries = Vec::new();
    for i in 0..n {
        entries.push((i, i));
        if i + 1 < n {
            entries.push((i + 1, i));
            entries.push((i, i + 1));
        }
    }
    let sp = SparsityPattern::new(n, n, entries);
    let mut dense = vec![vec![0.0; n]; n];
    let values: Vec<f64> = sp
        .entries()
        .map(|(r, c)| {
            let v = if r == c { 4.0 + r as f64 } else { 1.0 + 0.1 * (r + 2 * c) as f64 };
            dense[r][c] = v;
            v
        })
        .collect();
    (sp, values, dense)
}

fn check_solver(solver: &mut dyn LinearSolver) {
    let n = 5;
    let (sp, values, a) = tridiagonal(n);
    solver.reset(&sp).unwrap();
    assert_eq!(solver.structural_rank(), n);
    assert!(!solver.is_singular());
    solver.factorize(&values).unwrap();

    let x: Vec<f64> = (0..n).map(|i| 1.0 - 0.3 * i as f64).collect();
    for transpose in [false, true] {
        let mut rhs: Vec<f64> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if transpose { a[j][i] } else { a[i][j] } * x[j])
                    .sum()
            })
            .collect();
        // Second column: twice the first
        let second: Vec<f64> = rhs.iter().map(|v| 2.0 * v).collect();
        rhs.extend(second);
        solver.solve(&mut rhs, 2, transpose).unwrap();
        for i in 0..n {
            assert!((rhs[i] - x[i]).abs() < 1e-12, "transpose={}", transpose);
            assert!((rhs[n + i] - 2.0 * x[i]).abs() < 1e-12, "transpose={}", transpose);
        }
    }
}

#[test]
fn lu_plugin_solves_both_orientations() {
    let mut solver = linsol("lu", &Dict::new()).unwrap();
    check_solver(&mut *solver);
}

#[test]
fn sparse_lu_plugin_solves_both_orientations() {
    if !has_linsol("sparse_lu") {
        return;
    }
    let mut solver = linsol("sparse_lu", &Dict::new()).unwrap();
    check_solver(&mut *solver);
}

#[test]
fn structural_solve_covers_numeric_fill() {
    let n = 5;
    let (sp, values, _) = tridiagonal(n);
    let mut solver = linsol("lu", &Dict::new()).unwrap();
    solver.reset(&sp).unwrap();
    solver.factorize(&values).unwrap();

    for transpose in [false, true] {
        for k in 0..n {
            let mut e = vec![0.0; n];
            e[k] = 1.0;
            solver.solve(&mut e, 1, transpose).unwrap();

            let mut rhs = vec![0u64; n];
            rhs[k] = 1;
            let mut sol = vec![0u64; n];
            solver.structural_solve(&rhs, &mut sol, transpose).unwrap();
            for i in 0..n {
                if e[i] != 0.0 {
                    assert_eq!(sol[i], 1, "column {} row {} transpose={}", k, i, transpose);
                }
            }
        }
    }
}

#[test]
fn misuse_is_reported() {
    let mut solver = linsol("lu", &Dict::new()).unwrap();
    let mut rhs = vec![1.0];
    assert_eq!(solver.solve(&mut rhs, 1, false), Err(Error::NotFactorized));
    assert_eq!(
        solver.structural_solve(&[1], &mut [0], false),
        Err(Error::NotFactorized)
    );
    assert!(matches!(
        solver.reset(&SparsityPattern::dense(2, 3)),
        Err(Error::DimensionMismatch { .. })
    ));

    solver.reset(&SparsityPattern::new(2, 2, [(0, 0), (1, 0)])).unwrap();
    assert!(solver.is_singular());
    assert_eq!(solver.structural_rank(), 1);
    assert!(matches!(
        solver.factorize(&[1.0]),
        Err(Error::DimensionMismatch { .. })
    ));
}
