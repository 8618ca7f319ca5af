//! Rectenna output-current model and its convex surrogate.
//!
//! The harvested DC current of a rectenna driven by an \(N\)-subband signal
//! is a second-plus-fourth order polynomial in the per-subband signal
//! moments
//! \\[ t_k(X) = \sum_{m-n=k} h_m \bar h_n X_{mn} = \mathrm{tr}(C_k^H X), \\]
//! where \(C_k\) is the banded channel-correlation matrix of
//! [`crate::channel::correlation_band`]. With power-splitting ratio
//! \(\rho\) feeding the harvester, information matrix \(X_I\) and power
//! matrix \(X_P\), the current is
//! \\[ z = \frac{\beta_2\rho}{2}(t_{I,0}+t_{P,0})
//!        + \frac{3\beta_4\rho^2}{8}\Bigl(\sum_k |t_{P,k}|^2
//!        + 2t_{I,0}^2 + 4t_{I,0}t_{P,0}\Bigr). \\]
//! The fourth-order part is not concave in \((X_I,X_P,\rho)\); the
//! successive-approximation loop replaces it by its first-order expansion
//! around the incumbent iterate. [`RectennaModel::surrogate`] produces the
//! coefficient matrices of that expansion, so that
//! \\[ z \approx \rho\,\bigl(q_I(X_I) + q_P(X_P)\bigr) \\]
//! with \(q_I,q_P\) affine, exact at the expansion point.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::channel::{correlation_band, CompositeChannel};

/// Diode nonlinearity coefficients of the harvesting circuit.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct RectennaModel {
    pub beta2: f64,
    pub beta4: f64,
}

/// The signal moment `t_k(X) = sum_{m-n=k} h_m conj(h_n) X[m,n]`.
///
/// On a Hermitian `X` the moments satisfy `t_{-k} = conj(t_k)`; `t_0` is
/// real and non-negative when `X` is PSD.
pub fn moment(h: &CompositeChannel, x: &DMatrix<Complex64>, k: i64) -> Complex64 {
    let n = h.0.len();
    let mut t = Complex64::new(0.0, 0.0);
    for m in 0..n {
        let nn = m as i64 - k;
        if (0..n as i64).contains(&nn) {
            let nn = nn as usize;
            t += h.0[m] * h.0[nn].conj() * x[(m, nn)];
        }
    }
    t
}

/// Achievable rate in bit/s/Hz,
/// `sum_n log2(1 + infoRatio |h_n|^2 X_I[n,n] / noisePower)`.
pub fn achievable_rate(
    h: &CompositeChannel,
    x_info: &DMatrix<Complex64>,
    info_ratio: f64,
    noise_power: f64,
) -> f64 {
    h.0.iter()
        .enumerate()
        .map(|(n, hn)| (1.0 + info_ratio * hn.norm_sqr() * x_info[(n, n)].re / noise_power).log2())
        .sum()
}

/// Affine-in-`X` surrogate of the current at a fixed expansion point.
///
/// The surrogate value at `(X_I, X_P, rho)` is
/// `rho * (re_tr(a_info^H X_I) + re_tr(a_power^H X_P) + power_offset)`,
/// a global first-order model that coincides with the true current at the
/// expansion point.
#[derive(Clone, Debug)]
pub struct SurrogateCoefficients {
    pub a_info: DMatrix<Complex64>,
    pub a_power: DMatrix<Complex64>,
    pub power_offset: f64,
}

impl RectennaModel {
    /// True (non-relaxed) DC current. The imaginary residue of the complex
    /// cross terms is a numerical artifact and is discarded.
    pub fn dc_current(
        &self,
        h: &CompositeChannel,
        x_info: &DMatrix<Complex64>,
        x_power: &DMatrix<Complex64>,
        power_ratio: f64,
    ) -> f64 {
        let n = h.0.len();
        let t0i = moment(h, x_info, 0).re;
        let t0p = moment(h, x_power, 0).re;

        let mut quartic = t0p * t0p;
        for k in 1..n as i64 {
            quartic += 2.0 * moment(h, x_power, k).norm_sqr();
        }
        quartic += 2.0 * t0i * t0i + 4.0 * t0i * t0p;

        0.5 * self.beta2 * power_ratio * (t0i + t0p)
            + 0.375 * self.beta4 * power_ratio * power_ratio * quartic
    }

    /// Expand the current around the incumbent `(x_info, x_power,
    /// power_ratio)` iterate.
    ///
    /// The second-order part is exact; the fourth-order part contributes
    /// its gradient, with one factor of `rho` frozen at the incumbent
    /// ratio. The tangent constants land in `power_offset`.
    pub fn surrogate(
        &self,
        h: &CompositeChannel,
        x_info: &DMatrix<Complex64>,
        x_power: &DMatrix<Complex64>,
        power_ratio: f64,
    ) -> SurrogateCoefficients {
        let n = h.0.len();
        let c0 = correlation_band(h, 0);
        let t0i = moment(h, x_info, 0).re;
        let t0p = moment(h, x_power, 0).re;
        let g4 = 0.375 * self.beta4 * power_ratio;

        // d/dt_{I,0} of the quartic, times the frozen rho factor.
        let a_info = c0.map(|v| (0.5 * self.beta2 + g4 * 4.0 * (t0i + t0p)) * v);

        // d/dt_{P,k} over every band; the k = 0 band also carries the
        // cross-term derivative 4 t0i.
        let mut a_power = c0.map(|v| (0.5 * self.beta2 + g4 * 4.0 * t0i) * v);
        let mut moment_sq = 0.0;
        for k in -(n as i64 - 1)..n as i64 {
            let tk = moment(h, x_power, k);
            moment_sq += tk.norm_sqr();
            let ck = correlation_band(h, k);
            a_power += ck.map(|v| 2.0 * g4 * tk * v);
        }

        let power_offset = -g4 * (2.0 * t0i * t0i + 4.0 * t0i * t0p + moment_sq);

        SurrogateCoefficients { a_info, a_power, power_offset }
    }
}

impl SurrogateCoefficients {
    /// Evaluate the surrogate numerically (the solver-side counterpart is
    /// expressed through [`crate::model::HermitianVariable::re_trace`]).
    pub fn value(
        &self,
        x_info: &DMatrix<Complex64>,
        x_power: &DMatrix<Complex64>,
        power_ratio: f64,
    ) -> f64 {
        power_ratio * (re_tr(&self.a_info, x_info) + re_tr(&self.a_power, x_power) + self.power_offset)
    }
}

pub(crate) fn re_tr(a: &DMatrix<Complex64>, x: &DMatrix<Complex64>) -> f64 {
    a.iter().zip(x.iter()).map(|(am, xm)| (am.conj() * xm).re).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CompositeChannel;
    use nalgebra::DVector;

    fn lcg(state: &mut u64) -> f64 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (*state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
    }

    fn channel(n: usize, seed: u64) -> CompositeChannel {
        let mut s = seed;
        CompositeChannel(DVector::from_fn(n, |_, _| {
            Complex64::new(lcg(&mut s), lcg(&mut s))
        }))
    }

    fn herm_psd(n: usize, seed: u64) -> DMatrix<Complex64> {
        let mut s = seed;
        let v = DVector::from_fn(n, |_, _| Complex64::new(lcg(&mut s), lcg(&mut s)));
        let w = DVector::from_fn(n, |_, _| Complex64::new(lcg(&mut s), lcg(&mut s)));
        &v * v.adjoint() + &w * w.adjoint()
    }

    #[test]
    fn moments_are_conjugate_symmetric() {
        let h = channel(4, 3);
        let x = herm_psd(4, 7);
        for k in 0..4 {
            let tk = moment(&h, &x, k);
            let tmk = moment(&h, &x, -k);
            assert!((tk.conj() - tmk).norm() < 1e-12);
        }
        assert!(moment(&h, &x, 0).im.abs() < 1e-12);
    }

    #[test]
    fn surrogate_matches_current_at_expansion_point() {
        let model = RectennaModel { beta2: 0.17, beta4: 957.25 };
        let h = channel(3, 5);
        let xi = herm_psd(3, 11);
        let xp = herm_psd(3, 13);
        let rho = 0.6;

        let sur = model.surrogate(&h, &xi, &xp, rho);
        let z = model.dc_current(&h, &xi, &xp, rho);
        assert!((sur.value(&xi, &xp, rho) - z).abs() < 1e-9 * z.abs().max(1.0));
    }

    #[test]
    fn rate_of_diagonal_matrix() {
        let h = CompositeChannel(DVector::from_element(2, Complex64::new(1.0, 0.0)));
        let mut x = DMatrix::<Complex64>::zeros(2, 2);
        x[(0, 0)] = Complex64::new(3.0, 0.0);
        x[(1, 1)] = Complex64::new(1.0, 0.0);
        let r = achievable_rate(&h, &x, 1.0, 1.0);
        assert!((r - (4.0f64.log2() + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn current_is_nonnegative_on_psd_matrices() {
        let model = RectennaModel { beta2: 0.17, beta4 : 957.25 };
        let h = channel(4, 19);
        let z = model.dc_current(&h, &herm_psd(4, 23), &herm_psd(4, 29), 0.5);
        assert!(z >= 0.0);
    }
}
