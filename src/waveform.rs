//! SDR/SCA waveform optimizer.
//!
//! For a fixed composite channel the waveform design problem is
//! \\[ \max_{x_I,x_P,\rho_I,\rho_P} z(x_I,x_P,\rho_P) \quad \text{s.t.}
//!    \quad \\|x_I\\|^2+\\|x_P\\|^2 \le P,\ R(x_I,\rho_I) \ge \bar R,\
//!    \rho_I+\rho_P \le 1, \\]
//! non-convex both through the rank-one waveform outer products and through
//! the fourth-order current \(z\). The solver lifts the waveforms to
//! Hermitian PSD matrix variables (SDR), replaces \(z\) by the affine
//! surrogate of [`RectennaModel::surrogate`] and bounds the remaining
//! ratio-times-quality products through the identity
//! \\[ xy = \Bigl(\frac{x+y}{2}\Bigr)^2 - \Bigl(\frac{x-y}{2}\Bigr)^2, \\]
//! keeping the tangent of the convex square and the exact epigraph of the
//! concave one. Each pass solves one semidefinite program, re-evaluates the
//! true current and repeats until the relative current gain drops below the
//! tolerance. A randomized rank-one recovery closes the relaxation gap.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::channel::CompositeChannel;
use crate::current::{achievable_rate, re_tr, RectennaModel};
use crate::error::{Error, Result};
use crate::model::{
    in_geometric_mean_cone, in_rotated_quadratic_cone, less_than, Expr, Model, ScalarVariable,
    Sense, SolveStatus,
};
use crate::rounding::{best_feasible, Rank1Sampler};

/// Rate feasibility slack for rounded candidates.
const RATE_SLACK: f64 = 1e-9;

/// One waveform design point: the two per-subband waveform vectors and the
/// receive splitting ratios.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaveformState {
    /// Information (modulated) waveform amplitudes.
    pub x_info: DVector<Complex64>,
    /// Power (deterministic multisine) waveform amplitudes.
    pub x_power: DVector<Complex64>,
    /// Fraction of received power routed to the information decoder.
    pub info_ratio: f64,
    /// Fraction of received power routed to the energy harvester.
    pub power_ratio: f64,
}

impl WaveformState {
    /// Maximum-ratio initial guess: both waveforms matched to the channel,
    /// the budget split evenly between them and between the two receive
    /// branches.
    pub fn max_ratio(h: &CompositeChannel, tx_power: f64) -> WaveformState {
        let norm = h.0.norm();
        let x = if norm > 0.0 {
            h.0.map(|hn| hn.conj() * Complex64::new((0.5 * tx_power).sqrt() / norm, 0.0))
        } else {
            DVector::from_element(
                h.0.len(),
                Complex64::new((0.5 * tx_power / h.0.len() as f64).sqrt(), 0.0),
            )
        };
        WaveformState { x_info: x.clone(), x_power: x, info_ratio: 0.5, power_ratio: 0.5 }
    }

    pub fn info_matrix(&self) -> DMatrix<Complex64> {
        &self.x_info * self.x_info.adjoint()
    }

    pub fn power_matrix(&self) -> DMatrix<Complex64> {
        &self.x_power * self.x_power.adjoint()
    }

    /// Total transmitted power of this design point.
    pub fn transmit_power(&self) -> f64 {
        self.x_info.norm_squared() + self.x_power.norm_squared()
    }
}

/// Waveform problem data, fixed over one SCA run.
pub struct WaveformProblem<'a> {
    pub channel: &'a CompositeChannel,
    pub rectenna: RectennaModel,
    pub tx_power: f64,
    pub noise_power: f64,
    /// Minimum rate in bit/s/Hz. Zero deactivates the rate machinery.
    pub rate_constraint: f64,
}

/// Numerical policy of the SCA loop and the embedded rounding step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Relative current-gain tolerance of the SCA fixed point.
    pub tolerance: f64,
    /// Inner iteration cap.
    pub max_iterations: usize,
    /// Number of randomized rank-one candidates.
    pub candidates: usize,
    /// Interior-point relative gap tolerance.
    pub rel_gap: f64,
    /// Relaxed gap tolerance for the single retry after a solver failure.
    pub relaxed_rel_gap: f64,
    /// Wall-clock limit per subproblem solve, seconds.
    pub time_limit: Option<f64>,
}

impl Default for SolveOptions {
    fn default() -> SolveOptions {
        SolveOptions {
            tolerance: 1e-6,
            max_iterations: 50,
            candidates: 10_000,
            rel_gap: 1e-8,
            relaxed_rel_gap: 1e-6,
            time_limit: None,
        }
    }
}

/// Result of one waveform solve: the rounded design point plus diagnostics
/// of the relaxation it was recovered from.
#[derive(Clone, Debug)]
pub struct WaveformSolution {
    pub state: WaveformState,
    /// True current of the rounded design point.
    pub current: f64,
    /// True rate of the rounded design point.
    pub rate: f64,
    /// True current of the final relaxed matrices, an upper estimate of
    /// what rounding can achieve.
    pub relaxed_current: f64,
    /// Final surrogate objective value reported by the solver.
    pub surrogate_bound: f64,
    pub iterations: usize,
    /// False when the iteration cap cut the fixed point short.
    pub converged: bool,
}

struct RelaxedIterate {
    x_info: DMatrix<Complex64>,
    x_power: DMatrix<Complex64>,
    info_ratio: f64,
    power_ratio: f64,
    objective: f64,
}

/// Solve the waveform design problem by SCA from the given initial point,
/// then recover a rank-one design by randomized rounding.
pub fn solve_waveform<R: Rng + ?Sized>(
    problem: &WaveformProblem,
    initial: &WaveformState,
    opts: &SolveOptions,
    rng: &mut R,
) -> Result<WaveformSolution> {
    let h = problem.channel;
    let mut x_info = initial.info_matrix();
    let mut x_power = initial.power_matrix();
    let mut info_ratio = initial.info_ratio;
    let mut power_ratio = initial.power_ratio;
    let mut current = problem.rectenna.dc_current(h, &x_info, &x_power, power_ratio);

    let mut iterations = 0;
    let mut converged = false;
    let mut bound = 0.0;
    while iterations < opts.max_iterations {
        iterations += 1;
        let it =
            solve_subproblem(problem, &x_info, &x_power, info_ratio, power_ratio, opts)?;
        x_info = it.x_info;
        x_power = it.x_power;
        info_ratio = it.info_ratio;
        power_ratio = it.power_ratio;
        bound = it.objective;

        let z = problem.rectenna.dc_current(h, &x_info, &x_power, power_ratio);
        let gain = (z - current).abs() / z.abs().max(f64::MIN_POSITIVE);
        current = z;
        if gain <= opts.tolerance {
            converged = true;
            break;
        }
    }

    let info_sampler = Rank1Sampler::new(&x_info);
    let power_sampler = Rank1Sampler::new(&x_power);
    // The initial design point seeds the search, so rounding can never
    // hand back a candidate inferior to the waveform it started from.
    let ((vi, vp), best_current) = best_feasible(
        Some((initial.x_info.clone(), initial.x_power.clone())),
        opts.candidates,
        rng,
        |rng| (info_sampler.draw(rng), power_sampler.draw(rng)),
        |(vi, _): &(DVector<Complex64>, DVector<Complex64>)| {
            problem.rate_constraint <= 0.0
                || achievable_rate(h, &(vi * vi.adjoint()), info_ratio, problem.noise_power)
                    + RATE_SLACK
                    >= problem.rate_constraint
        },
        |(vi, vp)| {
            problem.rectenna.dc_current(
                h,
                &(vi * vi.adjoint()),
                &(vp * vp.adjoint()),
                power_ratio,
            )
        },
    )?;

    let rate = achievable_rate(h, &(&vi * vi.adjoint()), info_ratio, problem.noise_power);
    Ok(WaveformSolution {
        state: WaveformState { x_info: vi, x_power: vp, info_ratio, power_ratio },
        current: best_current,
        rate,
        relaxed_current: current,
        surrogate_bound: bound,
        iterations,
        converged,
    })
}

/// Build and solve one convexified subproblem around the incumbent iterate.
fn solve_subproblem(
    problem: &WaveformProblem,
    x_info: &DMatrix<Complex64>,
    x_power: &DMatrix<Complex64>,
    info_ratio: f64,
    power_ratio: f64,
    opts: &SolveOptions,
) -> Result<RelaxedIterate> {
    let h = problem.channel;
    let n = h.subbands();
    let sur = problem.rectenna.surrogate(h, x_info, x_power, power_ratio);
    let q_info_bar = re_tr(&sur.a_info, x_info);
    let q_power_bar = re_tr(&sur.a_power, x_power) + sur.power_offset;

    let mut m = Model::new(Some("waveform"))?;
    m.set_rel_gap_tolerance(opts.rel_gap)?;
    if let Some(limit) = opts.time_limit {
        m.set_time_limit(limit)?;
    }

    let xi = m.hermitian_psd_variable(Some("Xi"), n)?;
    let xp = m.hermitian_psd_variable(Some("Xp"), n)?;
    let rho_i = m.nonnegative_variable(Some("rhoI"))?;
    let rho_p = m.nonnegative_variable(Some("rhoP"))?;
    let y_i = m.free_variable(Some("yI"))?;
    let y_p = m.free_variable(Some("yP"))?;

    m.constraint(Some("power"), &xi.trace().add(xp.trace()), less_than(problem.tx_power))?;
    m.constraint(Some("split"), &Expr::from(rho_i).add(rho_p), less_than(1.0))?;

    let q_info = xi.re_trace(&sur.a_info);
    let q_power = xp.re_trace(&sur.a_power).add(sur.power_offset);
    product_lower_bound(&mut m, "yI", y_i, rho_p, &q_info, 0.5 * (power_ratio + q_info_bar))?;
    product_lower_bound(&mut m, "yP", y_p, rho_p, &q_power, 0.5 * (power_ratio + q_power_bar))?;

    if problem.rate_constraint > 0.0 {
        let gains = h.power_gains();
        let mut rows = Vec::with_capacity(n + 1);
        for (nn, gain) in gains.iter().enumerate() {
            let snr = m.nonnegative_variable(None)?;
            let mut sel = DMatrix::<Complex64>::zeros(n, n);
            sel[(nn, nn)] = Complex64::new(gain / problem.noise_power, 0.0);
            let e = xi.re_trace(&sel);
            let e_bar = gain / problem.noise_power * x_info[(nn, nn)].re;
            product_lower_bound(&mut m, "snr", snr, rho_i, &e, 0.5 * (info_ratio + e_bar))?;
            rows.push(Expr::from(snr).add(1.0));
        }
        rows.push(Expr::constant(
            2f64.powf(problem.rate_constraint / n as f64),
        ));
        m.conic_constraint(Some("rate"), &rows, in_geometric_mean_cone())?;
    }

    m.objective(None, Sense::Maximize, &Expr::from(y_i).add(y_p))?;

    match m.solve_with_retry(opts.relaxed_rel_gap)? {
        SolveStatus::Optimal => {}
        SolveStatus::Infeasible => {
            return Err(Error::Infeasible { rate_constraint: problem.rate_constraint })
        }
        SolveStatus::Unbounded => {
            return Err(Error::Solver("waveform subproblem is unbounded".to_string()))
        }
        SolveStatus::Unknown => {
            return Err(Error::Solver(
                "interior-point optimizer stopped without a conclusive status".to_string(),
            ))
        }
    }

    Ok(RelaxedIterate {
        x_info: m.hermitian_value(xi)?,
        x_power: m.hermitian_value(xp)?,
        info_ratio: m.scalar_value(rho_i)?.max(0.0),
        power_ratio: m.scalar_value(rho_p)?.max(0.0),
        objective: m.primal_objective()?,
    })
}

/// Concave lower bound on the product `y <= rho * q` around the tangent
/// point `c = (rho_bar + q_bar) / 2`:
///
/// `rho q = ((rho+q)/2)^2 - ((rho-q)/2)^2`, the convex square kept as its
/// tangent `c (rho+q) - c^2`, the concave square kept exactly through a
/// rotated-quadratic-cone epigraph variable `u >= ((rho-q)/2)^2`.
fn product_lower_bound(
    m: &mut Model,
    name: &str,
    y: ScalarVariable,
    rho: ScalarVariable,
    q: &Expr,
    c: f64,
) -> Result<()> {
    let u = m.nonnegative_variable(None)?;
    m.constraint(
        Some(&format!("{}:tangent", name)),
        &Expr::from(y)
            .add(u)
            .sub(Expr::from(rho).mul(c))
            .sub(q.clone().mul(c)),
        less_than(-c * c),
    )?;
    m.conic_constraint(
        Some(&format!("{}:epigraph", name)),
        &[
            Expr::from(u),
            Expr::constant(0.5),
            Expr::from(rho).sub(q.clone()).mul(0.5),
        ],
        in_rotated_quadratic_cone(),
    )?;
    Ok(())
}
