//! Randomized rank-one recovery from relaxed PSD matrices.
//!
//! Both the waveform and the surface-phase sub-problems end with the same
//! step: the relaxed solve returns a PSD matrix of rank possibly greater
//! than one, and an implementable solution is a single vector. The recovery
//! pattern is shared: factor the matrix once through its eigensystem, draw
//! many candidates `U Σ^{1/2} r` with `r` a vector of i.i.d. uniform random
//! phases, and keep the best candidate that passes a domain-specific
//! feasibility check.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::TAU;

use crate::error::{Error, Result};

/// Candidate generator for one relaxed matrix.
///
/// The eigendecomposition happens once at construction; every draw is a
/// matrix-vector product. Draws are rescaled so the implied rank-one matrix
/// carries exactly the relaxed matrix's trace, which keeps any power budget
/// satisfied by the relaxation satisfied by the candidate.
pub struct Rank1Sampler {
    factor: DMatrix<Complex64>,
    trace: f64,
}

impl Rank1Sampler {
    pub fn new(x: &DMatrix<Complex64>) -> Rank1Sampler {
        let n = x.nrows();
        let eig = x.clone().symmetric_eigen();
        let mut factor = eig.eigenvectors;
        for (j, lambda) in eig.eigenvalues.iter().enumerate() {
            // Small negative eigenvalues are solver noise.
            let s = lambda.max(0.0).sqrt();
            for i in 0..n {
                factor[(i, j)] *= Complex64::new(s, 0.0);
            }
        }
        let trace = x.diagonal().iter().map(|d| d.re).sum();
        Rank1Sampler { factor, trace }
    }

    /// The trace of the relaxed matrix, i.e. the power carried by every
    /// candidate.
    pub fn trace(&self) -> f64 {
        self.trace
    }

    /// Draw one candidate vector.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<Complex64> {
        let n = self.factor.nrows();
        let phases = DVector::from_fn(n, |_, _| {
            Complex64::from_polar(1.0, rng.gen::<f64>() * TAU)
        });
        let mut v = &self.factor * phases;
        let norm_sq = v.norm_squared();
        if norm_sq > 0.0 {
            let s = (self.trace / norm_sq).sqrt();
            v.apply(|z| *z *= Complex64::new(s, 0.0));
        }
        v
    }
}

/// Run `draws` candidate evaluations and keep the feasible one with the
/// highest score. The best score is non-decreasing over the draw sequence,
/// and the whole search is deterministic for a fixed generator state.
///
/// The search is seeded with the incumbent solution when one exists: the
/// incumbent is scored first and a random draw replaces it only by strictly
/// beating it, so a feasible incumbent can never be traded for an inferior
/// candidate.
///
/// Fails with [`Error::InvalidCandidate`] when neither the incumbent nor
/// any draw passes the feasibility check.
pub fn best_feasible<T, R, S, F, G>(
    incumbent: Option<T>,
    draws: usize,
    rng: &mut R,
    mut sample: S,
    mut feasible: F,
    mut score: G,
) -> Result<(T, f64)>
where
    R: Rng + ?Sized,
    S: FnMut(&mut R) -> T,
    F: FnMut(&T) -> bool,
    G: FnMut(&T) -> f64,
{
    let mut best: Option<(T, f64)> = None;
    if let Some(cand) = incumbent {
        if feasible(&cand) {
            let s = score(&cand);
            best = Some((cand, s));
        }
    }
    for _ in 0..draws {
        let cand = sample(rng);
        if !feasible(&cand) {
            continue;
        }
        let s = score(&cand);
        if best.as_ref().map_or(true, |(_, b)| s > *b) {
            best = Some((cand, s));
        }
    }
    best.ok_or(Error::InvalidCandidate { draws })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rank2_psd() -> DMatrix<Complex64> {
        let v = DVector::from_vec(vec![
            Complex64::new(1.0, 0.5),
            Complex64::new(-0.3, 0.2),
            Complex64::new(0.0, 1.1),
        ]);
        let w = DVector::from_vec(vec![
            Complex64::new(0.4, 0.0),
            Complex64::new(0.9, -0.6),
            Complex64::new(0.2, 0.3),
        ]);
        &v * v.adjoint() + &w * w.adjoint()
    }

    #[test]
    fn draws_carry_the_relaxed_trace() {
        let x = rank2_psd();
        let sampler = Rank1Sampler::new(&x);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            let v = sampler.draw(&mut rng);
            assert!((v.norm_squared() - sampler.trace()).abs() < 1e-10);
        }
    }

    #[test]
    fn sampling_is_deterministic_for_a_fixed_seed() {
        let x = rank2_psd();
        let sampler = Rank1Sampler::new(&x);
        let a = sampler.draw(&mut ChaCha8Rng::seed_from_u64(7));
        let b = sampler.draw(&mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn rank_one_matrix_reproduces_itself() {
        let v = DVector::from_vec(vec![Complex64::new(2.0, -1.0), Complex64::new(0.5, 0.5)]);
        let x = &v * v.adjoint();
        let sampler = Rank1Sampler::new(&x);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let u = sampler.draw(&mut rng);
        // A rank-one input admits only one candidate up to a global phase.
        let y = &u * u.adjoint();
        for (a, b) in y.iter().zip(x.iter()) {
            assert!((a - b).norm() < 1e-10);
        }
    }

    #[test]
    fn best_feasible_keeps_the_highest_score() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seq = (0..).map(|i| (i * 37) % 10);
        let (best, score) = best_feasible(
            None,
            10,
            &mut rng,
            |_| seq.next().unwrap(),
            |c| c % 2 == 0,
            |c| *c as f64,
        )
        .unwrap();
        assert_eq!(best % 2, 0);
        assert_eq!(score, 8.0);
    }

    #[test]
    fn no_feasible_candidate_is_an_error() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err =
            best_feasible(None, 5, &mut rng, |_| 1u32, |_| false, |_| 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidCandidate { draws: 5 }));
    }

    #[test]
    fn incumbent_survives_inferior_draws() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // Every draw scores below the incumbent; the incumbent must win.
        let (best, score) = best_feasible(
            Some(100u32),
            10,
            &mut rng,
            |_| 3u32,
            |_| true,
            |c| *c as f64,
        )
        .unwrap();
        assert_eq!(best, 100);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn feasible_incumbent_rescues_an_infeasible_draw_set() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (best, _) = best_feasible(
            Some(7u32),
            10,
            &mut rng,
            |_| 3u32,
            |c| *c == 7,
            |c| *c as f64,
        )
        .unwrap();
        assert_eq!(best, 7);
    }

    #[test]
    fn a_draw_must_strictly_beat_the_incumbent() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // Draws tie with the incumbent on score; the incumbent is kept.
        let (best, _) = best_feasible(
            Some(5u32),
            10,
            &mut rng,
            |_| 50u32,
            |_| true,
            |c| (*c % 10) as f64,
        )
        .unwrap();
        assert_eq!(best, 5);
    }
}
