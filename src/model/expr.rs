//! Affine expressions over model variables.
//!
//! An [`Expr`] is a real-valued affine function of the model's scalar
//! variables and Hermitian matrix variables: a sparse linear part, a
//! constant, and a list of real-trace terms against `barvar`s. Expressions
//! are built with chained `add`/`sub`/`mul` calls and consumed by
//! constraints and objectives.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use num_complex::Complex64;

use super::{HermitianVariable, ScalarVariable};

/// One real-trace term: the coefficients of a symmetric matrix applied to a
/// `barvar`, stored as lower-triangular triplets.
#[derive(Clone)]
struct BarTerm {
    barj: i32,
    subk: Vec<i32>,
    subl: Vec<i32>,
    cof: Vec<f64>,
}

/// A scalar affine expression.
#[derive(Clone, Default)]
pub struct Expr {
    subj: Vec<i32>,
    cof: Vec<f64>,
    fix: f64,
    bar: Vec<BarTerm>,
}

impl Expr {
    /// A constant expression.
    pub fn constant(v: f64) -> Expr {
        Expr { fix: v, ..Expr::default() }
    }

    /// Add another expression.
    pub fn add<E: Into<Expr>>(mut self, other: E) -> Expr {
        let other = other.into();
        self.subj.extend_from_slice(&other.subj);
        self.cof.extend_from_slice(&other.cof);
        self.fix += other.fix;
        self.bar.extend_from_slice(&other.bar);
        self
    }

    /// Subtract another expression.
    pub fn sub<E: Into<Expr>>(self, other: E) -> Expr {
        self.add(other.into().mul(-1.0))
    }

    /// Scale by a constant.
    pub fn mul(mut self, s: f64) -> Expr {
        self.cof.iter_mut().for_each(|c| *c *= s);
        self.fix *= s;
        self.bar.iter_mut().for_each(|t| t.cof.iter_mut().for_each(|c| *c *= s));
        self
    }

    /// The expression \\(\mathrm{Re}\\,\mathrm{tr}(C^H X)\\).
    ///
    /// Writing the Hermitian part of \\(C\\) as \\(H_r + iH_i\\), the
    /// equivalent real symmetric coefficient matrix on the embedded variable
    /// \\(\hat X\\) is
    /// \\(S = \tfrac12\begin{bmatrix}H_r & -H_i\\\\ H_i & H_r\end{bmatrix}\\),
    /// so that \\(\mathrm{tr}(S\hat X) = \mathrm{Re}\\,\mathrm{tr}(C^H X)\\).
    pub(super) fn re_trace(x: &HermitianVariable, c: &DMatrix<Complex64>) -> Expr {
        let n = x.dim;
        let h = (c + c.adjoint()).map(|v| 0.5 * v);

        let mut subk = Vec::new();
        let mut subl = Vec::new();
        let mut cof = Vec::new();

        // Diagonal blocks: Hr/2, lower triangle only.
        for j in 0..n {
            for i in j..n {
                let v = 0.5 * h[(i, j)].re;
                if v != 0.0 {
                    subk.push(i as i32);
                    subl.push(j as i32);
                    cof.push(v);
                    subk.push((n + i) as i32);
                    subl.push((n + j) as i32);
                    cof.push(v);
                }
            }
        }
        // Lower-left block: Hi/2. Rows n+i always lie below columns j.
        for j in 0..n {
            for i in 0..n {
                let v = 0.5 * h[(i, j)].im;
                if v != 0.0 {
                    subk.push((n + i) as i32);
                    subl.push(j as i32);
                    cof.push(v);
                }
            }
        }

        Expr {
            bar: vec![BarTerm { barj: x.barj, subk, subl, cof }],
            ..Expr::default()
        }
    }

    /// Collapse duplicate entries. Returns `(subj, cof, fix, bar)` where
    /// `bar` holds one aggregated `(barj, subk, subl, cof)` tuple per
    /// matrix variable, since the task API rejects duplicate triplets.
    #[allow(clippy::type_complexity)]
    pub(super) fn compacted(&self) -> (Vec<i32>, Vec<f64>, f64, Vec<(i32, Vec<i32>, Vec<i32>, Vec<f64>)>) {
        let mut lin: BTreeMap<i32, f64> = BTreeMap::new();
        for (&j, &c) in self.subj.iter().zip(self.cof.iter()) {
            *lin.entry(j).or_insert(0.0) += c;
        }
        let (subj, cof): (Vec<i32>, Vec<f64>) = lin.into_iter().unzip();

        let mut barmaps: BTreeMap<i32, BTreeMap<(i32, i32), f64>> = BTreeMap::new();
        for t in self.bar.iter() {
            let m = barmaps.entry(t.barj).or_default();
            for ((&k, &l), &v) in t.subk.iter().zip(t.subl.iter()).zip(t.cof.iter()) {
                *m.entry((k, l)).or_insert(0.0) += v;
            }
        }
        let bar = barmaps
            .into_iter()
            .map(|(barj, m)| {
                let mut subk = Vec::with_capacity(m.len());
                let mut subl = Vec::with_capacity(m.len());
                let mut vals = Vec::with_capacity(m.len());
                for ((k, l), v) in m {
                    if v != 0.0 {
                        subk.push(k);
                        subl.push(l);
                        vals.push(v);
                    }
                }
                (barj, subk, subl, vals)
            })
            .filter(|(_, subk, _, _)| !subk.is_empty())
            .collect();

        (subj, cof, self.fix, bar)
    }
}

impl From<ScalarVariable> for Expr {
    fn from(x: ScalarVariable) -> Expr {
        Expr {
            subj: vec![x.idx],
            cof: vec![1.0],
            ..Expr::default()
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Expr {
        Expr::constant(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn herm(n: usize, seed: u64) -> DMatrix<Complex64> {
        // Small deterministic Hermitian matrix, no RNG machinery needed.
        let mut m = DMatrix::<Complex64>::zeros(n, n);
        let mut s = seed;
        let mut next = || {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((s >> 33) as f64) / (u32::MAX as f64) - 0.5
        };
        for i in 0..n {
            for j in 0..n {
                m[(i, j)] = Complex64::new(next(), next());
            }
        }
        (&m + m.adjoint()).map(|v| 0.5 * v)
    }

    /// tr(S Xhat) over the embedded matrix must equal Re tr(C^H X).
    #[test]
    fn embedding_preserves_re_trace() {
        let n = 4;
        let x = herm(n, 7);
        let c = herm(n, 91) + herm(n, 17).map(|v| 0.3 * v);

        let xvar = HermitianVariable { barj: 0, dim: n };
        let e = Expr::re_trace(&xvar, &c);
        let (_, _, _, bar) = e.compacted();
        assert_eq!(bar.len(), 1);
        let (_, subk, subl, cof) = &bar[0];

        // Embed X by hand.
        let d = 2 * n;
        let mut xhat = DMatrix::<f64>::zeros(d, d);
        for i in 0..n {
            for j in 0..n {
                xhat[(i, j)] = x[(i, j)].re;
                xhat[(n + i, n + j)] = x[(i, j)].re;
                xhat[(n + i, j)] = x[(i, j)].im;
                xhat[(i, n + j)] = -x[(i, j)].im;
            }
        }

        // tr(S Xhat) with S given as lower-triangular triplets.
        let mut tr = 0.0;
        for ((&k, &l), &v) in subk.iter().zip(subl.iter()).zip(cof.iter()) {
            let (k, l) = (k as usize, l as usize);
            tr += if k == l { v * xhat[(k, l)] } else { 2.0 * v * xhat[(k, l)] };
        }

        let want: Complex64 = (c.adjoint() * &x).trace();
        assert!(want.im.abs() < 1e-12);
        assert!((tr - want.re).abs() < 1e-12, "tr = {tr}, want = {}", want.re);
    }

    /// The anti-Hermitian part of the coefficient matrix must not contribute.
    #[test]
    fn anti_hermitian_part_is_annihilated() {
        let n = 3;
        let xvar = HermitianVariable { barj: 0, dim: n };

        // A strictly anti-Hermitian coefficient.
        let mut k = DMatrix::<Complex64>::zeros(n, n);
        k[(0, 1)] = Complex64::new(1.0, 2.0);
        k[(1, 0)] = Complex64::new(-1.0, 2.0);
        let e = Expr::re_trace(&xvar, &k);
        let (_, _, _, bar) = e.compacted();
        assert!(bar.is_empty(), "anti-Hermitian coefficient must vanish");
    }

    #[test]
    fn compaction_merges_duplicates() {
        let x = ScalarVariable { idx: 3 };
        let e = Expr::from(x).add(Expr::from(x).mul(2.0)).add(1.5);
        let (subj, cof, fix, bar) = e.compacted();
        assert_eq!(subj, vec![3]);
        assert_eq!(cof, vec![3.0]);
        assert_eq!(fix, 1.5);
        assert!(bar.is_empty());
    }
}
