//
// End-to-end design runs on a small two-subband link with one reflecting
// element, exercising the alternating optimization against the real
// interior-point solver.

extern crate irswipt;

use irswipt::{
    AoDriver, CascadedChannel, DesignConfig, DirectChannel, Error, PointOutcome, RateSweep,
    RectennaModel, ScenarioId, SolveOptions, Termination,
};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

fn link() -> (DirectChannel, CascadedChannel) {
    let direct = DirectChannel(DVector::from_vec(vec![
        Complex64::new(1.0, 0.2),
        Complex64::new(-0.4, 0.9),
    ]));
    // One element at fixed unit gain per subband.
    let cascaded = CascadedChannel(DMatrix::from_row_slice(
        1,
        2,
        &[
            Complex64::from_polar(1.0, 0.3),
            Complex64::from_polar(1.0, -1.1),
        ],
    ));
    (direct, cascaded)
}

fn config(rate_constraint: f64) -> DesignConfig {
    DesignConfig {
        rectenna: RectennaModel {
            beta2: 0.0034 * 50.0,
            beta4: 0.3829 * 50.0 * 50.0,
        },
        tx_power: 1.0,
        noise_power: 1e-5,
        rate_constraint,
        tolerance: 1e-6,
        max_iterations: 50,
        solve: SolveOptions {
            candidates: 10_000,
            ..SolveOptions::default()
        },
        seed: 1234,
    }
}

#[test]
fn two_subband_link_converges() {
    let (direct, cascaded) = link();
    let bundle = AoDriver::new(config(0.0)).run(&direct, &cascaded).unwrap();

    assert!(matches!(bundle.termination, Termination::Converged { .. }));
    assert!(bundle.current.is_finite() && bundle.current >= 0.0);
    assert!(bundle.rate > 0.0);
    for theta in bundle.phases.coefficients().iter() {
        assert!((theta.norm() - 1.0).abs() < 1e-12);
    }
    assert!(bundle.waveform.transmit_power() <= 1.0 + 1e-6);
}

#[test]
fn current_sequence_is_monotone_until_convergence() {
    let (direct, cascaded) = link();
    let bundle = AoDriver::new(config(0.0)).run(&direct, &cascaded).unwrap();

    assert!(!bundle.diagnostics.is_empty());
    // Incumbent retention makes the sequence non-decreasing exactly, not
    // merely up to a tolerance.
    for w in bundle.diagnostics.windows(2) {
        assert!(
            w[1].current >= w[0].current,
            "current fell from {} to {}",
            w[0].current,
            w[1].current
        );
    }
    for d in &bundle.diagnostics {
        assert!(d.gain_ratio <= 1.0 + 1e-6);
    }
    let last = bundle.diagnostics.last().unwrap();
    assert!(last.sca_converged || last.degraded);
}

#[test]
fn reruns_with_the_same_seed_reproduce_the_iterate_sequence() {
    let (direct, cascaded) = link();
    let a = AoDriver::new(config(0.0)).run(&direct, &cascaded).unwrap();
    let b = AoDriver::new(config(0.0)).run(&direct, &cascaded).unwrap();

    assert_eq!(a.diagnostics.len(), b.diagnostics.len());
    for (da, db) in a.diagnostics.iter().zip(b.diagnostics.iter()) {
        assert!((da.current - db.current).abs() <= 1e-12 * da.current.abs().max(1.0));
        assert!((da.rate - db.rate).abs() <= 1e-9);
    }
}

#[test]
fn moderate_rate_constraint_is_met() {
    let (direct, cascaded) = link();
    // Well inside the feasible region for this link at -50 dB noise.
    let bundle = AoDriver::new(config(4.0)).run(&direct, &cascaded).unwrap();
    assert!(bundle.rate >= 4.0 - 1e-6);
    assert!(bundle.current >= 0.0);
}

#[test]
fn unreachable_rate_constraint_is_infeasible() {
    let (direct, cascaded) = link();
    // Two subbands at unit power cannot carry 100 bit/s/Hz.
    match AoDriver::new(config(100.0)).run(&direct, &cascaded) {
        Err(Error::Infeasible { rate_constraint }) => {
            assert_eq!(rate_constraint, 100.0);
        }
        other => panic!("expected an infeasible outcome, got {:?}", other.map(|b| b.current)),
    }
}

#[test]
fn rate_sweep_records_the_infeasible_boundary() {
    let (direct, cascaded) = link();
    let sweep = RateSweep::new(config(0.0), vec![0.0, 100.0]);
    let curve = sweep
        .run_scenario(ScenarioId(0), &[(direct, cascaded)])
        .unwrap();

    assert_eq!(curve.points.len(), 2);
    assert!(matches!(
        curve.points[0].outcome,
        PointOutcome::Feasible { .. }
    ));
    assert!(matches!(
        curve.points[1].outcome,
        PointOutcome::Infeasible { rate_constraint } if rate_constraint == 100.0
    ));
}
