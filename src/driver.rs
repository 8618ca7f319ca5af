//! Outer alternating-optimization driver.
//!
//! One run alternates three steps until the harvested current settles:
//! optimize the surface phases for the incumbent waveform, reassemble the
//! composite channel, then re-optimize the waveform for the new channel.
//! Every candidate search is seeded with the incumbent design, and an
//! iteration whose outcome still scores below the incumbent is discarded
//! in favor of the previous iterate, so the recorded current sequence is
//! non-decreasing.

use log::{debug, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::channel::{assemble, CascadedChannel, CompositeChannel, DirectChannel, PhaseVector};
use crate::current::{achievable_rate, RectennaModel};
use crate::error::{Error, Result};
use crate::phase::{optimize_phases, PhaseProblem};
use crate::waveform::{solve_waveform, SolveOptions, WaveformProblem, WaveformState};

/// Immutable configuration of one design run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DesignConfig {
    pub rectenna: RectennaModel,
    /// Transmit power budget.
    pub tx_power: f64,
    pub noise_power: f64,
    /// Minimum rate in bit/s/Hz; zero for the unconstrained-rate design.
    pub rate_constraint: f64,
    /// Absolute (unconstrained) or relative (rate-constrained) tolerance on
    /// the per-iteration current gain.
    pub tolerance: f64,
    /// Outer iteration cap.
    pub max_iterations: usize,
    /// Inner solver and rounding policy.
    pub solve: SolveOptions,
    /// Seed of the run's random generator; reruns with the same seed and
    /// inputs reproduce the same iterate sequence.
    pub seed: u64,
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// The current gain dropped below the tolerance.
    Converged { iterations: usize },
    /// The iteration cap was reached first; the bundle carries the best
    /// iterate found.
    IterationLimit { iterations: usize },
}

/// Per-iteration convergence record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IterationDiagnostics {
    pub iteration: usize,
    /// True current after the waveform step.
    pub current: f64,
    /// True rate after the waveform step.
    pub rate: f64,
    /// Phase sub-optimizer gain ratio (achieved over relaxed optimum);
    /// zero on a degraded pass.
    pub gain_ratio: f64,
    /// Inner SCA iterations spent by the waveform solver.
    pub sca_iterations: usize,
    /// Whether the inner SCA loop settled within its own iteration cap;
    /// false also on a degraded pass that skipped the waveform solve.
    pub sca_converged: bool,
    /// True when the iteration failed to improve on the incumbent design
    /// and the previous iterate was retained.
    pub degraded: bool,
}

/// The converged design. Immutable once returned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolutionBundle {
    pub phases: PhaseVector,
    pub composite: CompositeChannel,
    pub waveform: WaveformState,
    pub current: f64,
    pub rate: f64,
    pub diagnostics: Vec<IterationDiagnostics>,
    pub termination: Termination,
}

impl SolutionBundle {
    /// Require that the run settled within its iteration cap.
    ///
    /// An [`Termination::IterationLimit`] bundle still carries the best
    /// iterate found; callers that cannot accept a best-effort design turn
    /// it into [`Error::NonConvergence`] here.
    pub fn ensure_converged(self) -> Result<SolutionBundle> {
        match self.termination {
            Termination::Converged { .. } => Ok(self),
            Termination::IterationLimit { iterations } => {
                Err(Error::NonConvergence { max_iterations: iterations })
            }
        }
    }
}

/// Alternating-optimization driver over one channel realization.
pub struct AoDriver {
    config: DesignConfig,
}

impl AoDriver {
    pub fn new(config: DesignConfig) -> AoDriver {
        AoDriver { config }
    }

    pub fn config(&self) -> &DesignConfig {
        &self.config
    }

    /// Run the alternating optimization to a fixed point.
    ///
    /// An [`Error::Infeasible`] from the waveform solver propagates: the
    /// rate constraint cannot be met on this channel and the caller must
    /// record the sweep point as infeasible rather than receive a
    /// fabricated bundle.
    pub fn run(
        &self,
        direct: &DirectChannel,
        cascaded: &CascadedChannel,
    ) -> Result<SolutionBundle> {
        let cfg = &self.config;
        let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);

        let mut phases = PhaseVector::random(cascaded.0.nrows(), &mut rng);
        let mut composite = assemble(direct, cascaded, &phases)?;
        let mut waveform = WaveformState::max_ratio(&composite, cfg.tx_power);
        let mut current = cfg.rectenna.dc_current(
            &composite,
            &waveform.info_matrix(),
            &waveform.power_matrix(),
            waveform.power_ratio,
        );
        let mut rate = achievable_rate(
            &composite,
            &waveform.info_matrix(),
            waveform.info_ratio,
            cfg.noise_power,
        );

        let mut diagnostics = Vec::new();
        for iteration in 1..=cfg.max_iterations {
            let prev_phases = phases.clone();
            let prev_composite = composite.clone();
            let prev_waveform = waveform.clone();
            let prev_rate = rate;

            let phase_problem = PhaseProblem {
                direct,
                cascaded,
                rectenna: cfg.rectenna,
                noise_power: cfg.noise_power,
                rate_constraint: cfg.rate_constraint,
            };
            let mut degraded = false;
            let gain_ratio = match optimize_phases(
                &phase_problem,
                &waveform,
                Some(&prev_phases),
                &cfg.solve,
                &mut rng,
            ) {
                Ok(sol) => {
                    phases = sol.phases;
                    sol.gain_ratio
                }
                Err(Error::InvalidCandidate { draws }) => {
                    debug!("phase rounding found no feasible candidate in {draws} draws; keeping previous phases");
                    degraded = true;
                    0.0
                }
                Err(e) => return Err(e),
            };
            composite = assemble(direct, cascaded, &phases)?;

            let waveform_problem = WaveformProblem {
                channel: &composite,
                rectenna: cfg.rectenna,
                tx_power: cfg.tx_power,
                noise_power: cfg.noise_power,
                rate_constraint: cfg.rate_constraint,
            };
            let (mut new_current, sca_iterations, sca_converged) =
                match solve_waveform(&waveform_problem, &waveform, &cfg.solve, &mut rng) {
                    Ok(sol) => {
                        waveform = sol.state;
                        rate = sol.rate;
                        (sol.current, sol.iterations, sol.converged)
                    }
                    Err(Error::InvalidCandidate { draws }) => {
                        debug!("waveform rounding found no feasible candidate in {draws} draws; keeping previous waveform");
                        degraded = true;
                        let z = cfg.rectenna.dc_current(
                            &composite,
                            &waveform.info_matrix(),
                            &waveform.power_matrix(),
                            waveform.power_ratio,
                        );
                        (z, 0, false)
                    }
                    Err(e) => return Err(e),
                };

            // Never revert to a rate-violating incumbent (the initial
            // maximum-ratio waveform can be one under a rate constraint).
            let prev_feasible = cfg.rate_constraint <= 0.0 || prev_rate >= cfg.rate_constraint;
            if new_current < current && prev_feasible {
                debug!(
                    "iteration {iteration}: current {new_current:.6e} fell below the incumbent {current:.6e}; retaining the previous iterate"
                );
                phases = prev_phases;
                composite = prev_composite;
                waveform = prev_waveform;
                rate = prev_rate;
                new_current = current;
                degraded = true;
            }

            diagnostics.push(IterationDiagnostics {
                iteration,
                current: new_current,
                rate,
                gain_ratio,
                sca_iterations,
                sca_converged,
                degraded,
            });
            debug!(
                "iteration {iteration}: current {new_current:.6e}, rate {rate:.4}, gain ratio {gain_ratio:.4}"
            );

            let delta = (new_current - current).abs();
            let settled = if cfg.rate_constraint > 0.0 {
                delta / new_current.abs().max(f64::MIN_POSITIVE) <= cfg.tolerance
            } else {
                delta <= cfg.tolerance
            };
            current = new_current;
            if settled {
                return Ok(SolutionBundle {
                    phases,
                    composite,
                    waveform,
                    current,
                    rate,
                    diagnostics,
                    termination: Termination::Converged { iterations: iteration },
                });
            }
        }

        warn!(
            "alternating optimization hit the iteration cap of {} without settling",
            cfg.max_iterations
        );
        Ok(SolutionBundle {
            phases,
            composite,
            waveform,
            current,
            rate,
            diagnostics,
            termination: Termination::IterationLimit { iterations: cfg.max_iterations },
        })
    }
}
