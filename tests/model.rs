//
// Model-layer checks against the real solver: the Hermitian embedding and
// the cone constructions must reproduce known closed-form optima.

extern crate irswipt;

use irswipt::model::{
    equal_to, in_geometric_mean_cone, in_rotated_quadratic_cone, less_than, Expr, Model, Sense,
    SolveStatus,
};
use nalgebra::DMatrix;
use num_complex::Complex64;

#[test]
fn hermitian_trace_objective_attains_the_largest_eigenvalue() {
    // C = [[2, 1-i], [1+i, 3]] has eigenvalues 4 and 1; maximizing
    // Re tr(C^H X) over PSD X with tr(X) <= 1 lands on the largest.
    let c = DMatrix::from_row_slice(
        2,
        2,
        &[
            Complex64::new(2.0, 0.0),
            Complex64::new(1.0, -1.0),
            Complex64::new(1.0, 1.0),
            Complex64::new(3.0, 0.0),
        ],
    );

    let mut m = Model::new(Some("eigmax")).unwrap();
    let x = m.hermitian_psd_variable(Some("X"), 2).unwrap();
    m.constraint(Some("trace"), &x.trace(), less_than(1.0)).unwrap();
    m.objective(None, Sense::Maximize, &x.re_trace(&c)).unwrap();

    assert_eq!(m.solve().unwrap(), SolveStatus::Optimal);
    assert!((m.primal_objective().unwrap() - 4.0).abs() < 1e-6);

    let xv = m.hermitian_value(x).unwrap();
    // The optimizer returns a Hermitian PSD matrix of unit trace.
    assert!((xv[(0, 1)].conj() - xv[(1, 0)]).norm() < 1e-8);
    let tr = xv[(0, 0)].re + xv[(1, 1)].re;
    assert!((tr - 1.0).abs() < 1e-6);
}

#[test]
fn rotated_quadratic_cone_bounds_the_square() {
    // Minimize u subject to u >= (x/2)^2 with x fixed at 3.
    let mut m = Model::new(None).unwrap();
    let x = m.free_variable(Some("x")).unwrap();
    let u = m.nonnegative_variable(Some("u")).unwrap();
    m.constraint(None, &Expr::from(x), equal_to(3.0)).unwrap();
    m.conic_constraint(
        None,
        &[
            Expr::from(u),
            Expr::constant(0.5),
            Expr::from(x).mul(0.5),
        ],
        in_rotated_quadratic_cone(),
    )
    .unwrap();
    m.objective(None, Sense::Minimize, &Expr::from(u)).unwrap();

    assert_eq!(m.solve().unwrap(), SolveStatus::Optimal);
    assert!((m.scalar_value(u).unwrap() - 2.25).abs() < 1e-6);
}

#[test]
fn geometric_mean_cone_caps_the_last_coordinate() {
    // max t subject to (2 * 8)^(1/2) >= t.
    let mut m = Model::new(None).unwrap();
    let a = m.nonnegative_variable(None).unwrap();
    let b = m.nonnegative_variable(None).unwrap();
    let t = m.free_variable(None).unwrap();
    m.constraint(None, &Expr::from(a), equal_to(2.0)).unwrap();
    m.constraint(None, &Expr::from(b), equal_to(8.0)).unwrap();
    m.conic_constraint(
        None,
        &[Expr::from(a), Expr::from(b), Expr::from(t)],
        in_geometric_mean_cone(),
    )
    .unwrap();
    m.objective(None, Sense::Maximize, &Expr::from(t)).unwrap();

    assert_eq!(m.solve().unwrap(), SolveStatus::Optimal);
    assert!((m.scalar_value(t).unwrap() - 4.0).abs() < 1e-6);
}

#[test]
fn an_empty_feasible_set_reports_infeasible() {
    let mut m = Model::new(None).unwrap();
    let x = m.nonnegative_variable(None).unwrap();
    m.constraint(None, &Expr::from(x), less_than(-1.0)).unwrap();
    m.objective(None, Sense::Maximize, &Expr::from(x)).unwrap();
    assert_eq!(m.solve().unwrap(), SolveStatus::Infeasible);
}
