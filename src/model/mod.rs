//!
//! Structured conic model layer over the MOSEK task API.
//!
//! This is the boundary behind which the interior-point solver lives: the
//! optimization core formulates objective and constraints through [`Model`]
//! and receives a typed [`SolveStatus`] plus primal values back. The layer
//! supports exactly the material the SDR subproblems need:
//!
//! - free and nonnegative scalar variables,
//! - complex Hermitian PSD matrix variables, carried as real symmetric PSD
//!   `barvar`s of twice the dimension through the embedding
//!   \\(X = A + iB \mapsto \begin{bmatrix}A & -B\\\\ B & A\end{bmatrix}\\),
//! - affine expressions mixing scalar terms with real-trace terms
//!   \\(\mathrm{Re}\\,\mathrm{tr}(C^H X)\\) against Hermitian variables,
//! - linear constraints, rotated quadratic cones and the primal geometric
//!   mean cone,
//! - a scalar objective with a sense.
//!
//! A non-optimal solver outcome is a first-class [`SolveStatus`] value, not
//! an error: an infeasible subproblem is a meaningful answer to the caller.

use itertools::izip;
use nalgebra::DMatrix;
use num_complex::Complex64;

mod expr;

pub use expr::Expr;

/// Objective sense.
#[derive(Clone, Copy)]
pub enum Sense {
    Maximize,
    Minimize,
}

/// Outcome of a solve, mapped from the MOSEK interior-point solution status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    /// The solution is optimal within tolerances.
    Optimal,
    /// A certificate of primal infeasibility was found.
    Infeasible,
    /// A certificate of dual infeasibility was found, i.e. the problem is
    /// unbounded.
    Unbounded,
    /// The solver stopped without a conclusive status.
    Unknown,
}

/// A scalar variable handle. Valid only for the model that created it.
#[derive(Clone, Copy)]
pub struct ScalarVariable {
    pub(crate) idx: i32,
}

/// An n×n complex Hermitian PSD matrix variable handle.
///
/// Internally this is a 2n×2n real symmetric PSD `barvar` with the block
/// structure equalities added as linear constraints at creation time.
#[derive(Clone, Copy)]
pub struct HermitianVariable {
    pub(crate) barj: i32,
    pub(crate) dim: usize,
}

impl HermitianVariable {
    /// Complex dimension n of the matrix variable.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The affine expression \\(\mathrm{Re}\\,\mathrm{tr}(C^H X)\\) for this
    /// variable. Only the Hermitian part of `C` contributes; the
    /// anti-Hermitian part is annihilated by any Hermitian \\(X\\).
    pub fn re_trace(&self, c: &DMatrix<Complex64>) -> Expr {
        if c.nrows() != self.dim || c.ncols() != self.dim {
            panic!(
                "coefficient shape {}x{} does not match Hermitian variable dimension {}",
                c.nrows(),
                c.ncols(),
                self.dim
            );
        }
        Expr::re_trace(self, c)
    }

    /// The affine expression \\(\mathrm{Re}\\,\mathrm{tr}(X)\\).
    pub fn trace(&self) -> Expr {
        Expr::re_trace(self, &DMatrix::identity(self.dim, self.dim))
    }
}

//======================================================
// Domains

#[derive(Clone, Copy)]
enum LinearDomainType {
    NonNegative,
    NonPositive,
    Zero,
}

/// A scalar linear bound, created with [`greater_than`], [`less_than`] or
/// [`equal_to`].
#[derive(Clone, Copy)]
pub struct LinearBound {
    dt: LinearDomainType,
    rhs: f64,
}

pub fn greater_than(rhs: f64) -> LinearBound {
    LinearBound { dt: LinearDomainType::NonNegative, rhs }
}
pub fn less_than(rhs: f64) -> LinearBound {
    LinearBound { dt: LinearDomainType::NonPositive, rhs }
}
pub fn equal_to(rhs: f64) -> LinearBound {
    LinearBound { dt: LinearDomainType::Zero, rhs }
}

/// Cone selector for [`Model::conic_constraint`].
#[derive(Clone, Copy)]
pub enum ConeType {
    /// \\(2 x_1 x_2 \geq x_3^2 + \cdots + x_d^2,\ x_1,x_2\geq 0\\)
    RotatedQuadratic,
    /// \\((x_1\cdots x_{d-1})^{1/(d-1)} \geq |x_d|\\)
    GeometricMean,
}

pub fn in_rotated_quadratic_cone() -> ConeType {
    ConeType::RotatedQuadratic
}
pub fn in_geometric_mean_cone() -> ConeType {
    ConeType::GeometricMean
}

//======================================================
// Model

/// The `Model` object encapsulates one convex subproblem and the mapping
/// from structured variables onto task items.
///
/// Variables and constraints are created through the `Model` object and
/// belong to exactly that model. The SCA loops build a fresh model per
/// iteration since the surrogate coefficients change every pass.
pub struct Model {
    /// The MOSEK task.
    task: mosek::Task,
}

impl Model {
    /// Create an empty model.
    ///
    /// # Arguments
    /// - `name` An optional task name.
    pub fn new(name: Option<&str>) -> Result<Model, String> {
        let mut task = mosek::Task::new().ok_or_else(|| "failed to create MOSEK task".to_string())?;
        if let Some(name) = name {
            task.put_task_name(name)?;
        }
        Ok(Model { task })
    }

    /// Set the relative gap termination tolerance of the interior-point
    /// optimizer. Used as the precision hint; a failed solve is retried once
    /// with this relaxed.
    pub fn set_rel_gap_tolerance(&mut self, tol: f64) -> Result<(), String> {
        self.task.put_na_dou_param("MSK_DPAR_INTPNT_CO_TOL_REL_GAP", tol)
    }

    /// Set a wall-clock time limit in seconds on a single solve.
    pub fn set_time_limit(&mut self, seconds: f64) -> Result<(), String> {
        self.task.put_na_dou_param("MSK_DPAR_OPTIMIZER_MAX_TIME", seconds)
    }

    //======================================================
    // Variables

    /// Add a free scalar variable.
    pub fn free_variable(&mut self, name: Option<&str>) -> Result<ScalarVariable, String> {
        self.scalar_variable(name, mosek::Boundkey::FR)
    }

    /// Add a nonnegative scalar variable.
    pub fn nonnegative_variable(&mut self, name: Option<&str>) -> Result<ScalarVariable, String> {
        self.scalar_variable(name, mosek::Boundkey::LO)
    }

    fn scalar_variable(&mut self, name: Option<&str>, bk: i32) -> Result<ScalarVariable, String> {
        let idx = self.task.get_num_var()?;
        self.task.append_vars(1)?;
        if let Some(name) = name {
            self.task.put_var_name(idx, name)?;
        }
        self.task.put_var_bound(idx, bk, 0.0, 0.0)?;
        Ok(ScalarVariable { idx })
    }

    /// Add an n×n complex Hermitian PSD matrix variable.
    ///
    /// The variable is realized as a 2n×2n real symmetric PSD `barvar`
    /// \\(\hat X = \begin{bmatrix}P & Q\\\\ Q^T & S\end{bmatrix}\\) with the
    /// embedding structure \\(P = S\\), \\(Q = -Q^T\\) enforced by linear
    /// equalities, so that \\(X = P + iQ^T\\) is Hermitian and
    /// \\(X \succeq 0 \Leftrightarrow \hat X \succeq 0\\).
    pub fn hermitian_psd_variable(
        &mut self,
        name: Option<&str>,
        dim: usize,
    ) -> Result<HermitianVariable, String> {
        let n = dim;
        let d = 2 * n;
        let barj = self.task.get_num_barvar()?;
        self.task.append_barvars(&[d as i32])?;
        if let Some(name) = name {
            self.task.put_barvar_name(barj, name)?;
        }

        // Structure equalities. For i <= j:
        //   P[i,j] - S[i,j]  = 0
        //   Q[i,j] + Q[j,i]  = 0   (Q[i,i] = 0 for i = j)
        for i in 0..n {
            for j in i..n {
                let coni = self.task.get_num_con()?;
                self.task.append_cons(2)?;

                let m0 = self.task.append_sparse_sym_mat(
                    d as i32,
                    &[j as i32, (n + j) as i32],
                    &[i as i32, (n + i) as i32],
                    &[1.0, -1.0],
                )?;
                self.task.put_bara_ij(coni, barj, &[m0], &[1.0])?;

                let m1 = if i == j {
                    self.task.append_sparse_sym_mat(d as i32, &[(n + i) as i32], &[i as i32], &[1.0])?
                } else {
                    self.task.append_sparse_sym_mat(
                        d as i32,
                        &[(n + j) as i32, (n + i) as i32],
                        &[i as i32, j as i32],
                        &[1.0, 1.0],
                    )?
                };
                self.task.put_bara_ij(coni + 1, barj, &[m1], &[1.0])?;

                self.task
                    .put_con_bound_slice_const(coni, coni + 2, mosek::Boundkey::FX, 0.0, 0.0)?;
            }
        }

        Ok(HermitianVariable { barj, dim: n })
    }

    //======================================================
    // Constraints and objective

    /// Add a scalar linear constraint `expr <dom> rhs`.
    pub fn constraint(&mut self, name: Option<&str>, e: &Expr, dom: LinearBound) -> Result<(), String> {
        let (subj, cof, fix, bar) = e.compacted();
        if let Some(&j) = subj.iter().max() {
            if j >= self.task.get_num_var()? {
                return Err("expression refers to a variable outside this model".to_string());
            }
        }

        let coni = self.task.get_num_con()?;
        self.task.append_cons(1)?;
        if let Some(name) = name {
            self.task.put_con_name(coni, name)?;
        }
        if !subj.is_empty() {
            self.task.put_a_row(coni, subj.as_slice(), cof.as_slice())?;
        }
        for (barj, subk, subl, vals) in bar.iter() {
            let dimbarj = self.task.get_dim_barvar_j(*barj)?;
            let matidx = self.task.append_sparse_sym_mat(
                dimbarj,
                subk.as_slice(),
                subl.as_slice(),
                vals.as_slice(),
            )?;
            self.task.put_bara_ij(coni, *barj, &[matidx], &[1.0])?;
        }

        let rhs = dom.rhs - fix;
        let bk = match dom.dt {
            LinearDomainType::NonNegative => mosek::Boundkey::LO,
            LinearDomainType::NonPositive => mosek::Boundkey::UP,
            LinearDomainType::Zero => mosek::Boundkey::FX,
        };
        self.task.put_con_bound(coni, bk, rhs, rhs)?;
        Ok(())
    }

    /// Add a conic constraint: the stacked affine rows must belong to the
    /// selected cone. Rows may mix scalar and Hermitian trace terms.
    pub fn conic_constraint(
        &mut self,
        name: Option<&str>,
        rows: &[Expr],
        cone: ConeType,
    ) -> Result<(), String> {
        let nelm = rows.len();
        let afei = self.task.get_num_afe()?;
        self.task.append_afes(nelm as i64)?;

        for (i, row) in rows.iter().enumerate() {
            let (subj, cof, fix, bar) = row.compacted();
            let afe = afei + i as i64;
            if !subj.is_empty() {
                self.task.put_afe_f_row(afe, subj.as_slice(), cof.as_slice())?;
            }
            self.task.put_afe_g(afe, fix)?;
            for (barj, subk, subl, vals) in bar.iter() {
                let dimbarj = self.task.get_dim_barvar_j(*barj)?;
                let matidx = self.task.append_sparse_sym_mat(
                    dimbarj,
                    subk.as_slice(),
                    subl.as_slice(),
                    vals.as_slice(),
                )?;
                self.task.put_afe_barf_entry(afe, *barj, &[matidx], &[1.0])?;
            }
        }

        let domidx = match cone {
            ConeType::RotatedQuadratic => self.task.append_r_quadratic_cone_domain(nelm as i64)?,
            ConeType::GeometricMean => self.task.append_primal_geo_mean_cone_domain(nelm as i64)?,
        };
        let afeidxs: Vec<i64> = (afei..afei + nelm as i64).collect();
        self.task
            .append_acc(domidx, afeidxs.as_slice(), vec![0.0; nelm].as_slice())?;
        if let Some(name) = name {
            let acci = self.task.get_num_acc()? - 1;
            self.task.put_acc_name(acci, name)?;
        }
        Ok(())
    }

    /// Set the objective.
    ///
    /// # Arguments
    /// - `name` Optional objective name.
    /// - `sense` Objective sense.
    /// - `e` Scalar objective expression.
    pub fn objective(&mut self, name: Option<&str>, sense: Sense, e: &Expr) -> Result<(), String> {
        let (subj, cof, fix, bar) = e.compacted();
        if let Some(name) = name {
            self.task.put_obj_name(name)?;
        }

        let numvar = self.task.get_num_var()?.max(0) as usize;
        let mut c = vec![0.0; numvar];
        izip!(subj.iter(), cof.iter()).for_each(|(&j, &v)| c[j as usize] = v);
        let allj: Vec<i32> = (0i32..numvar as i32).collect();
        self.task.put_c_list(allj.as_slice(), c.as_slice())?;
        self.task.put_cfix(fix)?;

        let mut barsubj = Vec::new();
        let mut barsubk = Vec::new();
        let mut barsubl = Vec::new();
        let mut barcof = Vec::new();
        for (barj, subk, subl, vals) in bar.iter() {
            barsubj.extend(std::iter::repeat(*barj).take(subk.len()));
            barsubk.extend_from_slice(subk);
            barsubl.extend_from_slice(subl);
            barcof.extend_from_slice(vals);
        }
        if !barsubj.is_empty() {
            self.task.put_barc_block_triplet(
                barsubj.as_slice(),
                barsubk.as_slice(),
                barsubl.as_slice(),
                barcof.as_slice(),
            )?;
        }

        match sense {
            Sense::Minimize => self.task.put_obj_sense(mosek::Objsense::MINIMIZE)?,
            Sense::Maximize => self.task.put_obj_sense(mosek::Objsense::MAXIMIZE)?,
        }
        Ok(())
    }

    //======================================================
    // Optimize

    /// Run the optimizer and map the interior-point solution status to a
    /// [`SolveStatus`].
    pub fn solve(&mut self) -> Result<SolveStatus, String> {
        self.task.put_int_param(mosek::Iparam::REMOVE_UNUSED_SOLUTIONS, 1)?;
        self.task.optimize()?;

        if !self.task.solution_def(mosek::Soltype::ITR)? {
            return Ok(SolveStatus::Unknown);
        }
        let status = match self.task.get_sol_sta(mosek::Soltype::ITR)? {
            mosek::Solsta::OPTIMAL => SolveStatus::Optimal,
            mosek::Solsta::PRIM_INFEAS_CER => SolveStatus::Infeasible,
            mosek::Solsta::DUAL_INFEAS_CER => SolveStatus::Unbounded,
            _ => SolveStatus::Unknown,
        };
        Ok(status)
    }

    /// Run the optimizer once; on a solver error or an inconclusive status,
    /// retry a single time with the relaxed gap tolerance before giving up.
    pub fn solve_with_retry(&mut self, relaxed_tol: f64) -> Result<SolveStatus, String> {
        match self.solve() {
            Ok(SolveStatus::Unknown) | Err(_) => {
                self.set_rel_gap_tolerance(relaxed_tol)?;
                self.solve()
            }
            other => other,
        }
    }

    /// Primal objective value of the interior-point solution.
    pub fn primal_objective(&self) -> Result<f64, String> {
        self.task.get_primal_obj(mosek::Soltype::ITR)
    }

    /// Primal value of a scalar variable.
    pub fn scalar_value(&self, x: ScalarVariable) -> Result<f64, String> {
        let mut v = [0.0];
        self.task
            .get_xx_slice(mosek::Soltype::ITR, x.idx, x.idx + 1, &mut v)?;
        Ok(v[0])
    }

    /// Primal value of a Hermitian matrix variable, reassembled from the
    /// real embedding and symmetrized.
    pub fn hermitian_value(&self, x: HermitianVariable) -> Result<DMatrix<Complex64>, String> {
        let n = x.dim;
        let d = 2 * n;
        let len = d * (d + 1) / 2;
        let mut barx = vec![0.0; len];
        self.task.get_barx_slice(
            mosek::Soltype::ITR,
            x.barj,
            x.barj + 1,
            len as i64,
            barx.as_mut_slice(),
        )?;

        // barx holds the lower triangle packed column by column.
        let mut xhat = DMatrix::<f64>::zeros(d, d);
        let mut p = 0usize;
        for l in 0..d {
            for k in l..d {
                xhat[(k, l)] = barx[p];
                xhat[(l, k)] = barx[p];
                p += 1;
            }
        }

        let mut xc = DMatrix::<Complex64>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                let re = 0.5 * (xhat[(i, j)] + xhat[(n + i, n + j)]);
                let im = 0.5 * (xhat[(n + i, j)] - xhat[(i, n + j)]);
                xc[(i, j)] = Complex64::new(re, im);
            }
        }
        let xc = (&xc + xc.adjoint()).map(|v| 0.5 * v);
        Ok(xc)
    }
}
