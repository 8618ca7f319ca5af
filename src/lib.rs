//!
//! Rate-energy region design for IRS-aided SWIPT links.
//!
//! A transmitter sends a superposed information-plus-power waveform over
//! \\(N\\) subbands towards a receiver that splits the incoming signal
//! between an information decoder and a nonlinear energy harvester, with
//! an intelligent reflecting surface (IRS) of passive phase-shifting
//! elements reshaping the channel in between. The design problem is to
//! pick the per-element reflection phases, the per-subband waveform
//! amplitudes and the receive splitting ratios that maximize the harvested
//! DC current subject to a minimum information rate and a transmit power
//! budget:
//! \\[ \max_{\theta, x_I, x_P, \rho}\ z_{DC} \quad\text{s.t.}\quad
//!    R \ge \bar R,\quad \\|x_I\\|^2 + \\|x_P\\|^2 \le P,\quad
//!    |\theta_e| = 1. \\]
//!
//! The problem is non-convex three times over: the current is a fourth
//! order polynomial in the waveform, the rate couples the waveform with
//! the splitting ratio, and the unit-modulus constraint is a non-convex
//! set. The crate attacks it with the standard relax-and-round toolchain:
//!
//! - [`waveform`] lifts the waveform vectors to Hermitian PSD matrices
//!   (semidefinite relaxation), convexifies the current through a
//!   successive-approximation surrogate ([`current`]) and iterates
//!   interior-point solves to a fixed point;
//! - [`phase`] does the same for the reflection phases through the lifted
//!   unit-diagonal formulation;
//! - [`rounding`] recovers implementable rank-one solutions from either
//!   relaxation by randomized candidate sampling;
//! - [`driver`] alternates the two sub-optimizers over the reassembled
//!   composite channel ([`channel`]) until the current settles, and
//!   [`sweep`] traces whole rate-energy curves across rate constraints
//!   and channel realizations.
//!
//! The semidefinite subproblems run on the MOSEK interior-point optimizer
//! behind the structured [`model`] layer; complex Hermitian variables are
//! carried through their real symmetric embedding. Solver outcomes are
//! first class: an infeasible rate constraint surfaces as
//! [`Error::Infeasible`], never as a fabricated sample.
//!
//! ```no_run
//! use irswipt::{
//!     AoDriver, CascadedChannel, DesignConfig, DirectChannel, RectennaModel, SolveOptions,
//! };
//! use nalgebra::{DMatrix, DVector};
//! use num_complex::Complex64;
//!
//! # fn main() -> Result<(), irswipt::Error> {
//! let direct = DirectChannel(DVector::from_element(2, Complex64::new(1.0, 0.0)));
//! let cascaded = CascadedChannel(DMatrix::from_element(1, 2, Complex64::new(0.5, 0.0)));
//!
//! let driver = AoDriver::new(DesignConfig {
//!     rectenna: RectennaModel { beta2: 0.17, beta4: 957.25 },
//!     tx_power: 1.0,
//!     noise_power: 1e-5,
//!     rate_constraint: 0.0,
//!     tolerance: 1e-6,
//!     max_iterations: 50,
//!     solve: SolveOptions::default(),
//!     seed: 7,
//! });
//! let bundle = driver.run(&direct, &cascaded)?;
//! println!("current {:.3e} at rate {:.2}", bundle.current, bundle.rate);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod current;
pub mod driver;
pub mod error;
pub mod model;
pub mod phase;
pub mod rounding;
pub mod sweep;
pub mod waveform;

pub use channel::{
    assemble, CascadedChannel, CompositeChannel, DirectChannel, PhaseVector,
};
pub use current::RectennaModel;
pub use driver::{AoDriver, DesignConfig, IterationDiagnostics, SolutionBundle, Termination};
pub use error::{Error, Result};
pub use phase::{optimize_phases, PhaseProblem, PhaseSolution};
pub use sweep::{
    PointOutcome, RatePoint, RateSweep, Sample, ScenarioCurve, ScenarioId, SweepArtifact,
};
pub use waveform::{
    solve_waveform, SolveOptions, WaveformProblem, WaveformSolution, WaveformState,
};
