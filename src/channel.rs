//! Channel containers and the composite channel assembler.
//!
//! The optimization core consumes channels, it never generates them: the
//! caller supplies a direct per-subband channel and a cascaded
//! (incident × surface × reflective) per-element-per-subband channel in one
//! agreed subband ordering. The assembler combines them with a unit-modulus
//! phase vector into the effective composite channel.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::error::{Error, Result};

/// Direct-path channel, one complex gain per subband.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectChannel(pub DVector<Complex64>);

/// Cascaded reflected-path channel, one complex gain per
/// (reflecting element, subband) pair. Rows index elements, columns index
/// subbands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CascadedChannel(pub DMatrix<Complex64>);

/// Per-element IRS reflection coefficients, unit modulus by construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseVector(DVector<Complex64>);

impl PhaseVector {
    /// Build from reflection angles in radians.
    pub fn from_angles(angles: &[f64]) -> PhaseVector {
        PhaseVector(DVector::from_iterator(
            angles.len(),
            angles.iter().map(|&a| Complex64::from_polar(1.0, a)),
        ))
    }

    /// Draw a uniformly random phase configuration.
    pub fn random<R: Rng + ?Sized>(n: usize, rng: &mut R) -> PhaseVector {
        PhaseVector(DVector::from_fn(n, |_, _| {
            Complex64::from_polar(1.0, rng.gen::<f64>() * TAU)
        }))
    }

    /// Project arbitrary complex coefficients onto the unit circle,
    /// entry by entry. Zero entries map to 1.
    pub fn project(v: &DVector<Complex64>) -> PhaseVector {
        PhaseVector(v.map(|z| {
            let r = z.norm();
            if r > 0.0 { z / r } else { Complex64::new(1.0, 0.0) }
        }))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn coefficients(&self) -> &DVector<Complex64> {
        &self.0
    }
}

/// The effective end-to-end channel, one complex gain per subband.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompositeChannel(pub DVector<Complex64>);

impl CompositeChannel {
    pub fn subbands(&self) -> usize {
        self.0.len()
    }

    /// Per-subband power gains `|h_n|^2`.
    pub fn power_gains(&self) -> Vec<f64> {
        self.0.iter().map(|h| h.norm_sqr()).collect()
    }
}

/// Combine direct and reflected paths into the composite channel
/// `h_n = d_n + sum_e theta_e G[e,n]`.
///
/// The composite channel is linear in the phase vector for fixed channels.
/// Shape disagreement is a configuration error and fails fast.
pub fn assemble(
    direct: &DirectChannel,
    cascaded: &CascadedChannel,
    phases: &PhaseVector,
) -> Result<CompositeChannel> {
    let n = direct.0.len();
    if cascaded.0.ncols() != n {
        return Err(Error::DimensionMismatch {
            context: "cascaded channel subbands",
            expected: n,
            actual: cascaded.0.ncols(),
        });
    }
    if cascaded.0.nrows() != phases.len() {
        return Err(Error::DimensionMismatch {
            context: "phase vector elements",
            expected: cascaded.0.nrows(),
            actual: phases.len(),
        });
    }

    let reflected = cascaded.0.transpose() * phases.coefficients();
    Ok(CompositeChannel(&direct.0 + reflected))
}

/// The banded channel-correlation matrix `C_k` with entries
/// `C_k[m,n] = conj(h_m) h_n` on the band `m - n = k`, zero elsewhere.
///
/// These matrices turn the auxiliary moments into trace functionals:
/// `t_k(X) = tr(C_k^H X)`.
pub fn correlation_band(h: &CompositeChannel, k: i64) -> DMatrix<Complex64> {
    let n = h.0.len();
    let mut c = DMatrix::<Complex64>::zeros(n, n);
    for m in 0..n {
        let nn = m as i64 - k;
        if (0..n as i64).contains(&nn) {
            let nn = nn as usize;
            c[(m, nn)] = h.0[m].conj() * h.0[nn];
        }
    }
    c
}
