//! IRS phase sub-optimizer.
//!
//! For a fixed waveform the surface design reduces to a quadratic gain
//! maximization over unit-modulus reflection coefficients. With
//! \\(h_n(\theta) = d_n + \sum_e \theta_e G_{en}\\) and per-subband weights
//! \\(w_n = |x_{I,n}|^2 + |x_{P,n}|^2\\), lift \\(v = [\theta; 1]\\) so that
//! \\[ \sum_n w_n |h_n(\theta)|^2 = v^H R\, v, \qquad
//!    R = \sum_n w_n\, a_n a_n^H, \\]
//! and relax \\(V = v v^H\\) to a Hermitian PSD matrix with a unit
//! diagonal. The relaxed SDP is rounded through the same randomized
//! rank-one recovery as the waveform problem, screening candidates against
//! the rate constraint and scoring them by the true harvested current.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;

use crate::channel::{CascadedChannel, CompositeChannel, DirectChannel, PhaseVector};
use crate::current::{achievable_rate, RectennaModel};
use crate::error::{Error, Result};
use crate::model::{equal_to, Model, Sense, SolveStatus};
use crate::rounding::{best_feasible, Rank1Sampler};
use crate::waveform::{SolveOptions, WaveformState};

/// Phase problem data, fixed over one sub-optimization pass.
pub struct PhaseProblem<'a> {
    pub direct: &'a DirectChannel,
    pub cascaded: &'a CascadedChannel,
    pub rectenna: RectennaModel,
    pub noise_power: f64,
    /// Minimum rate in bit/s/Hz used to screen rounded candidates.
    pub rate_constraint: f64,
}

/// A rounded phase configuration plus its convergence diagnostic.
#[derive(Clone, Debug)]
pub struct PhaseSolution {
    pub phases: PhaseVector,
    /// Achieved quadratic gain over the relaxed SDP optimum, in `(0, 1]`
    /// up to solver tolerance. Recorded for inspection only.
    pub gain_ratio: f64,
}

struct Candidate {
    phases: PhaseVector,
    composite: CompositeChannel,
    gain: f64,
}

/// Optimize the reflection phases for a fixed waveform.
///
/// When an incumbent phase vector is supplied it seeds the candidate
/// search, so the returned configuration never scores below the design the
/// pass started from.
pub fn optimize_phases<R: Rng + ?Sized>(
    problem: &PhaseProblem,
    waveform: &WaveformState,
    incumbent: Option<&PhaseVector>,
    opts: &SolveOptions,
    rng: &mut R,
) -> Result<PhaseSolution> {
    let subbands = problem.direct.0.len();
    if problem.cascaded.0.ncols() != subbands {
        return Err(Error::DimensionMismatch {
            context: "cascaded channel subbands",
            expected: subbands,
            actual: problem.cascaded.0.ncols(),
        });
    }
    if waveform.x_info.len() != subbands {
        return Err(Error::DimensionMismatch {
            context: "waveform subbands",
            expected: subbands,
            actual: waveform.x_info.len(),
        });
    }
    let elements = problem.cascaded.0.nrows();
    if let Some(p) = incumbent {
        if p.len() != elements {
            return Err(Error::DimensionMismatch {
                context: "incumbent phase vector elements",
                expected: elements,
                actual: p.len(),
            });
        }
    }
    let d = elements + 1;

    let weights: Vec<f64> = (0..subbands)
        .map(|n| waveform.x_info[n].norm_sqr() + waveform.x_power[n].norm_sqr())
        .collect();
    let mut gain_matrix = DMatrix::<Complex64>::zeros(d, d);
    for n in 0..subbands {
        let a = DVector::from_fn(d, |i, _| {
            if i < elements {
                problem.cascaded.0[(i, n)].conj()
            } else {
                problem.direct.0[n].conj()
            }
        });
        gain_matrix += (&a * a.adjoint()).map(|z| weights[n] * z);
    }

    let mut m = Model::new(Some("phases"))?;
    m.set_rel_gap_tolerance(opts.rel_gap)?;
    if let Some(limit) = opts.time_limit {
        m.set_time_limit(limit)?;
    }
    let v = m.hermitian_psd_variable(Some("V"), d)?;
    for i in 0..d {
        let mut sel = DMatrix::<Complex64>::zeros(d, d);
        sel[(i, i)] = Complex64::new(1.0, 0.0);
        m.constraint(Some("diag"), &v.re_trace(&sel), equal_to(1.0))?;
    }
    m.objective(None, Sense::Maximize, &v.re_trace(&gain_matrix))?;

    // The relaxation always admits V = I; anything but Optimal is a solver
    // breakdown.
    match m.solve_with_retry(opts.relaxed_rel_gap)? {
        SolveStatus::Optimal => {}
        status => {
            return Err(Error::Solver(format!(
                "phase subproblem ended with status {:?}",
                status
            )))
        }
    }
    let relaxed_gain = m.primal_objective()?;
    let v_value = m.hermitian_value(v)?;

    let x_info_mat = waveform.info_matrix();
    let x_power_mat = waveform.power_matrix();
    let sampler = Rank1Sampler::new(&v_value);
    let xi = &x_info_mat;
    let candidate_of = |phases: PhaseVector| {
        let composite = CompositeChannel(
            &problem.direct.0 + problem.cascaded.0.transpose() * phases.coefficients(),
        );
        let gain: f64 = composite
            .0
            .iter()
            .zip(weights.iter())
            .map(|(hn, w)| w * hn.norm_sqr())
            .sum();
        Candidate { phases, composite, gain }
    };
    let seed = incumbent.map(|p| candidate_of(p.clone()));
    let (best, _) = best_feasible(
        seed,
        opts.candidates,
        rng,
        |rng| {
            let cand = sampler.draw(rng);
            let anchor = cand[elements].conj();
            candidate_of(PhaseVector::project(&DVector::from_fn(elements, |e, _| {
                cand[e] * anchor
            })))
        },
        |cand: &Candidate| {
            problem.rate_constraint <= 0.0
                || achievable_rate(&cand.composite, xi, waveform.info_ratio, problem.noise_power)
                    >= problem.rate_constraint
        },
        |cand| {
            problem.rectenna.dc_current(
                &cand.composite,
                &x_info_mat,
                &x_power_mat,
                waveform.power_ratio,
            )
        },
    )?;

    let gain_ratio = if relaxed_gain > 0.0 { best.gain / relaxed_gain } else { 1.0 };
    Ok(PhaseSolution { phases: best.phases, gain_ratio })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_waveform_is_rejected() {
        let direct = DirectChannel(DVector::from_element(2, Complex64::new(1.0, 0.0)));
        let cascaded = CascadedChannel(DMatrix::zeros(1, 2));
        let problem = PhaseProblem {
            direct: &direct,
            cascaded: &cascaded,
            rectenna: RectennaModel { beta2: 0.17, beta4: 957.25 },
            noise_power: 1e-5,
            rate_constraint: 0.0,
        };
        let waveform = WaveformState {
            x_info: DVector::from_element(3, Complex64::new(1.0, 0.0)),
            x_power: DVector::from_element(3, Complex64::new(1.0, 0.0)),
            info_ratio: 0.5,
            power_ratio: 0.5,
        };
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        assert!(matches!(
            optimize_phases(&problem, &waveform, None, &SolveOptions::default(), &mut rng),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_incumbent_is_rejected() {
        let direct = DirectChannel(DVector::from_element(2, Complex64::new(1.0, 0.0)));
        let cascaded = CascadedChannel(DMatrix::zeros(1, 2));
        let problem = PhaseProblem {
            direct: &direct,
            cascaded: &cascaded,
            rectenna: RectennaModel { beta2: 0.17, beta4: 957.25 },
            noise_power: 1e-5,
            rate_constraint: 0.0,
        };
        let waveform = WaveformState {
            x_info: DVector::from_element(2, Complex64::new(1.0, 0.0)),
            x_power: DVector::from_element(2, Complex64::new(1.0, 0.0)),
            info_ratio: 0.5,
            power_ratio: 0.5,
        };
        let stale = PhaseVector::from_angles(&[0.0; 3]);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        assert!(matches!(
            optimize_phases(&problem, &waveform, Some(&stale), &SolveOptions::default(), &mut rng),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
