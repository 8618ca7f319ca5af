//! Rate-constraint sweeps and the serialized result artifact.
//!
//! One rate-energy curve is traced by re-running the alternating
//! optimization over a grid of minimum-rate constraints and averaging the
//! achieved (rate, current) samples across independent channel
//! realizations. Sweep points past the feasible rate boundary are recorded
//! as infeasible, never as fabricated samples.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::channel::{CascadedChannel, DirectChannel};
use crate::driver::{AoDriver, DesignConfig, SolutionBundle};
use crate::error::{Error, Result};

/// Identifier of one scenario (a fixed choice of geometry, element count
/// and subband count) within a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioId(pub u32);

/// One achieved point on the rate-energy curve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Sample {
    pub rate: f64,
    pub current: f64,
}

/// Outcome of one sweep point after aggregation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PointOutcome {
    Feasible {
        /// Achieved sample, averaged over the channel realizations.
        sample: Sample,
        /// Full bundle of the first realization, kept for convergence
        /// inspection.
        representative: SolutionBundle,
    },
    Infeasible {
        rate_constraint: f64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RatePoint {
    pub rate_constraint: f64,
    pub outcome: PointOutcome,
}

/// The averaged curve of one scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioCurve {
    pub scenario: ScenarioId,
    pub points: Vec<RatePoint>,
}

/// Batch result artifact: a typed mapping from scenario and sweep position
/// to the aggregated record, ready for serialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SweepArtifact {
    curves: BTreeMap<ScenarioId, ScenarioCurve>,
}

impl SweepArtifact {
    pub fn insert(&mut self, curve: ScenarioCurve) {
        self.curves.insert(curve.scenario, curve);
    }

    pub fn get(&self, scenario: ScenarioId, point: usize) -> Option<&RatePoint> {
        self.curves.get(&scenario).and_then(|c| c.points.get(point))
    }

    pub fn curves(&self) -> impl Iterator<Item = &ScenarioCurve> {
        self.curves.values()
    }
}

/// A rate-constraint sweep over one scenario's channel realizations.
///
/// Sweep points are independent of each other; the runs share nothing but
/// the immutable base configuration.
pub struct RateSweep {
    config: DesignConfig,
    rates: Vec<f64>,
}

impl RateSweep {
    /// # Arguments
    /// - `config` Base design configuration; its `rate_constraint` is
    ///   overridden per sweep point.
    /// - `rates` The grid of minimum-rate constraints to trace.
    pub fn new(config: DesignConfig, rates: Vec<f64>) -> RateSweep {
        RateSweep { config, rates }
    }

    /// Trace the curve of one scenario across its channel realizations.
    ///
    /// A point is averaged when every realization admits the constraint;
    /// one infeasible realization marks the whole point infeasible, since
    /// an average over a partial set would misstate the curve.
    pub fn run_scenario(
        &self,
        scenario: ScenarioId,
        realizations: &[(DirectChannel, CascadedChannel)],
    ) -> Result<ScenarioCurve> {
        let mut points = Vec::with_capacity(self.rates.len());
        for &rate_constraint in &self.rates {
            let mut samples: Vec<Sample> = Vec::with_capacity(realizations.len());
            let mut representative = None;
            let mut feasible = true;

            for (k, (direct, cascaded)) in realizations.iter().enumerate() {
                let mut cfg = self.config;
                cfg.rate_constraint = rate_constraint;
                cfg.seed = self.config.seed.wrapping_add(k as u64);
                match AoDriver::new(cfg).run(direct, cascaded) {
                    Ok(bundle) => {
                        samples.push(Sample { rate: bundle.rate, current: bundle.current });
                        if representative.is_none() {
                            representative = Some(bundle);
                        }
                    }
                    Err(Error::Infeasible { .. }) => {
                        info!(
                            "scenario {:?}: rate constraint {rate_constraint} infeasible on realization {k}",
                            scenario
                        );
                        feasible = false;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            let outcome = match (feasible, representative) {
                (true, Some(representative)) => PointOutcome::Feasible {
                    sample: mean_sample(&samples),
                    representative,
                },
                _ => PointOutcome::Infeasible { rate_constraint },
            };
            points.push(RatePoint { rate_constraint, outcome });
        }
        Ok(ScenarioCurve { scenario, points })
    }
}

fn mean_sample(samples: &[Sample]) -> Sample {
    let n = samples.len().max(1) as f64;
    Sample {
        rate: samples.iter().map(|s| s.rate).sum::<f64>() / n,
        current: samples.iter().map(|s| s.current).sum::<f64>() / n,
    }
}
