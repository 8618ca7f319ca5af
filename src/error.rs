//! Error taxonomy for the optimization core.

use thiserror::Error;

/// Errors produced by the optimization core.
///
/// Infeasibility is deliberately a first-class variant: a rate sweep probes
/// constraints at and beyond the feasible boundary, and the caller must be
/// able to tell "no feasible design at this rate" apart from a solver
/// breakdown.
#[derive(Error, Debug)]
pub enum Error {
    /// Channel, phase and waveform shapes disagree. This is a configuration
    /// error; it is never retried.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The convex subproblem admits no feasible point under the current
    /// constraints.
    #[error("subproblem is infeasible at rate constraint {rate_constraint}")]
    Infeasible { rate_constraint: f64 },

    /// The underlying solver errored out, stalled, or exceeded its time
    /// limit. Raised only after one retry with a relaxed precision hint.
    #[error("solver failure: {0}")]
    Solver(String),

    /// An iteration-limited run was escalated to a hard error. The driver
    /// itself returns its best iterate together with
    /// [`Termination::IterationLimit`](crate::driver::Termination); callers
    /// that cannot accept a best-effort design raise this through
    /// [`SolutionBundle::ensure_converged`](crate::driver::SolutionBundle::ensure_converged).
    #[error("did not converge within {max_iterations} iterations")]
    NonConvergence { max_iterations: usize },

    /// The randomized rounding pass found no rank-one candidate satisfying
    /// the rate constraint.
    #[error("no feasible rank-one candidate among {draws} draws")]
    InvalidCandidate { draws: usize },
}

impl From<String> for Error {
    fn from(msg: String) -> Error {
        Error::Solver(msg)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
