use approx::assert_relative_eq;
use ifkit::{Bvec, Oracle, OracleError, Residual, ResidualOracle, Scalar, SparsityPattern};

/// f = [x0·x1 + sin(p0), exp(x2)·p1], g = [x0² + p1]
struct Model;

impl Residual for Model {
    fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
        let (x, p) = (arg[0], arg[1]);
        res[0][0] = x[0] * x[1] + p[0].sin();
        res[0][1] = x[2].exp() * p[1];
        res[1][0] = x[0] * x[0] + p[1];
    }
}

fn model() -> ResidualOracle<Model> {
    ResidualOracle::builder("model", Model)
        .input("x", 3)
        .input("p", 2)
        .output("f", 2)
        .output("g", 1)
        .build()
        .unwrap()
}

const X: [f64; 3] = [0.5, -1.2, 0.3];
const P: [f64; 2] = [0.8, 2.0];

fn eval(oracle: &dyn Oracle, x: &[f64], p: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut f = vec![0.0; 2];
    let mut g = vec![0.0; 1];
    oracle
        .eval(&[Some(x), Some(p)], &mut [Some(&mut f[..]), Some(&mut g[..])])
        .unwrap();
    (f, g)
}

#[test]
fn eval_matches_closed_form() {
    let oracle = model();
    let (f, g) = eval(&oracle, &X, &P);
    assert_relative_eq!(f[0], X[0] * X[1] + P[0].sin(), max_relative = 1e-14);
    assert_relative_eq!(f[1], X[2].exp() * P[1], max_relative = 1e-14);
    assert_relative_eq!(g[0], X[0] * X[0] + P[1], max_relative = 1e-14);
}

#[test]
fn none_input_is_zero_and_none_output_is_skipped() {
    let oracle = model();
    let mut f = vec![0.0; 2];
    oracle.eval(&[Some(&X[..]), None], &mut [Some(&mut f[..]), None]).unwrap();
    assert_relative_eq!(f[0], X[0] * X[1]);
    assert_relative_eq!(f[1], 0.0);
}

#[test]
fn detected_dependencies() {
    let oracle = model();
    let fx = oracle.dependency(0, 0);
    assert!(fx.contains(0, 0) && fx.contains(0, 1) && fx.contains(1, 2));
    assert_eq!(fx.nnz(), 3);
    let fp = oracle.dependency(1, 0);
    assert!(fp.contains(0, 0) && fp.contains(1, 1));
    assert_eq!(fp.nnz(), 2);
    let gx = oracle.dependency(0, 1);
    assert_eq!(gx.entries().collect::<Vec<_>>(), vec![(0, 0)]);
}

#[test]
fn forward_matches_finite_differences() {
    let oracle = model();
    let sx = [0.3, -0.7, 1.1, 0.0, 1.0, 0.0];
    let sp = [0.5, -0.2, 0.0, 0.0];
    let mut df = vec![0.0; 4];
    let mut dg = vec![0.0; 2];
    oracle
        .forward(
            &[Some(&X[..]), Some(&P[..])],
            &[Some(&sx[..]), Some(&sp[..])],
            &mut [Some(&mut df[..]), Some(&mut dg[..])],
            2,
        )
        .unwrap();

    let h = 1e-6;
    for d in 0..2 {
        let xp: Vec<f64> = (0..3).map(|k| X[k] + h * sx[3 * d + k]).collect();
        let xm: Vec<f64> = (0..3).map(|k| X[k] - h * sx[3 * d + k]).collect();
        let pp: Vec<f64> = (0..2).map(|k| P[k] + h * sp[2 * d + k]).collect();
        let pm: Vec<f64> = (0..2).map(|k| P[k] - h * sp[2 * d + k]).collect();
        let (fp, gp) = eval(&oracle, &xp, &pp);
        let (fm, gm) = eval(&oracle, &xm, &pm);
        for j in 0..2 {
            assert_relative_eq!(df[2 * d + j], (fp[j] - fm[j]) / (2.0 * h), epsilon = 1e-7);
        }
        assert_relative_eq!(dg[d], (gp[0] - gm[0]) / (2.0 * h), epsilon = 1e-7);
    }
}

#[test]
fn reverse_is_adjoint_of_forward() {
    let oracle = model();
    let sx = [0.3, -0.7, 1.1];
    let sp = [0.5, -0.2];
    let mut df = vec![0.0; 2];
    let mut dg = vec![0.0; 1];
    oracle
        .forward(
            &[Some(&X[..]), Some(&P[..])],
            &[Some(&sx[..]), Some(&sp[..])],
            &mut [Some(&mut df[..]), Some(&mut dg[..])],
            1,
        )
        .unwrap();

    let af = [1.3, -0.4];
    let ag = [0.9];
    let mut bx = vec![0.0; 3];
    let mut bp = vec![0.0; 2];
    oracle
        .reverse(
            &[Some(&X[..]), Some(&P[..])],
            &[Some(&af[..]), Some(&ag[..])],
            &mut [Some(&mut bx[..]), Some(&mut bp[..])],
            1,
        )
        .unwrap();

    let lhs = df[0] * af[0] + df[1] * af[1] + dg[0] * ag[0];
    let rhs: f64 = sx.iter().zip(&bx).map(|(a, b)| a * b).sum::<f64>()
        + sp.iter().zip(&bp).map(|(a, b)| a * b).sum::<f64>();
    assert_relative_eq!(lhs, rhs, max_relative = 1e-12);
}

#[test]
fn reverse_accumulates() {
    let oracle = model();
    let ag = [1.0];
    let mut bx = vec![10.0, 0.0, 0.0];
    oracle
        .reverse(
            &[Some(&X[..]), Some(&P[..])],
            &[None, Some(&ag[..])],
            &mut [Some(&mut bx[..]), None],
            1,
        )
        .unwrap();
    assert_relative_eq!(bx[0], 10.0 + 2.0 * X[0], max_relative = 1e-14);
    assert_relative_eq!(bx[1], 0.0);
}

#[test]
fn jacobian_oracle_matches_forward_columns() {
    let oracle = model();
    let jac = oracle.jacobian(0, 0).unwrap();
    assert_eq!(jac.n_in(), 2);
    assert_eq!(jac.n_out(), 1);
    let sp = jac.sparsity_out(0).clone();
    assert_eq!((sp.nrow, sp.ncol), (2, 3));

    let mut vals = vec![0.0; sp.nnz()];
    jac.eval(&[Some(&X[..]), Some(&P[..])], &mut [Some(&mut vals[..])]).unwrap();

    for (e, (r, c)) in sp.entries().enumerate() {
        let mut seed = [0.0; 3];
        seed[c] = 1.0;
        let mut df = vec![0.0; 2];
        oracle
            .forward(
                &[Some(&X[..]), Some(&P[..])],
                &[Some(&seed[..]), None],
                &mut [Some(&mut df[..]), None],
                1,
            )
            .unwrap();
        assert_relative_eq!(vals[e], df[r], max_relative = 1e-14);
    }
}

#[test]
fn jacobian_of_jacobian_is_unsupported() {
    let jac = model().jacobian(0, 0).unwrap();
    assert!(matches!(jac.jacobian(0, 0), Err(OracleError::Unsupported(_))));
}

#[test]
fn sp_forward_and_reverse_agree_with_pattern() {
    let oracle = model();
    let bx: [Bvec; 3] = [0b001, 0b010, 0b100];
    let bp: [Bvec; 2] = [0b01000, 0b10000];
    let mut f = [0; 2];
    let mut g = [0; 1];
    oracle
        .sp_forward(&[Some(&bx[..]), Some(&bp[..])], &mut [Some(&mut f[..]), Some(&mut g[..])], &mut [])
        .unwrap();
    assert_eq!(f, [0b01011, 0b10100]);
    assert_eq!(g, [0b10001]);

    let mut rx = [0; 3];
    let mut rp = [0; 2];
    oracle
        .sp_reverse(
            &mut [Some(&mut rx[..]), Some(&mut rp[..])],
            &[Some(&[0b01, 0b10][..]), Some(&[0b100][..])],
            &mut [],
        )
        .unwrap();
    assert_eq!(rx, [0b101, 0b001, 0b010]);
    assert_eq!(rp, [0b001, 0b110]);
}

#[test]
fn wide_inputs_are_detected_in_chunks() {
    struct Sum;
    impl Residual for Sum {
        fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
            // Output k depends on inputs k and k + 100.
            for k in 0..100 {
                res[0][k] = arg[0][k] * arg[0][k + 100];
            }
        }
    }
    let oracle = ResidualOracle::builder("sum", Sum)
        .input("x", 200)
        .output("y", 100)
        .build()
        .unwrap();
    let dep = oracle.dependency(0, 0);
    assert_eq!(dep.nnz(), 200);
    for k in 0..100 {
        assert!(dep.contains(k, k));
        assert!(dep.contains(k, k + 100));
    }
}

#[test]
fn sparse_input_pattern() {
    struct Diag;
    impl Residual for Diag {
        fn eval<T: Scalar>(&self, arg: &[&[T]], res: &mut [&mut [T]]) {
            res[0][0] = arg[0][0] + arg[0][1];
        }
    }
    let oracle = ResidualOracle::builder("diag", Diag)
        .input_sparsity("a", SparsityPattern::diagonal(2))
        .output("s", 1)
        .build()
        .unwrap();
    assert_eq!(oracle.nnz_in(0), 2);
    assert_eq!(oracle.sparsity_in(0).nrow, 2);
    assert!(!oracle.sparsity_in(0).is_column());
}

#[test]
fn duplicate_names_are_rejected() {
    let err = ResidualOracle::builder("dup", Model)
        .input("x", 3)
        .input("x", 2)
        .output("f", 2)
        .build()
        .err()
        .unwrap();
    assert_eq!(err, OracleError::DuplicateName("x".into()));
}

#[test]
fn wrong_lengths_are_reported() {
    let oracle = model();
    let mut f = vec![0.0; 2];
    let err = oracle
        .eval(&[Some(&X[..2]), Some(&P[..])], &mut [Some(&mut f[..]), None])
        .unwrap_err();
    assert!(matches!(err, OracleError::DimensionMismatch { expected: 3, got: 2, .. }));

    let err = oracle.eval(&[Some(&X[..])], &mut [Some(&mut f[..]), None]).unwrap_err();
    assert!(matches!(err, OracleError::DimensionMismatch { expected: 2, got: 1, .. }));

    assert!(matches!(
        oracle.jacobian(2, 0),
        Err(OracleError::IndexOutOfRange { what: "input", index: 2, len: 2 })
    ));
}
