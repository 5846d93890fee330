use wide::f64x4;

use crate::solver::error::SolverError;

#[derive(Clone, Debug)]
pub struct SparseMatrix {
    pub values: Vec<f64>,
    pub col_indices: Vec<usize>,
    pub row_offsets: Vec<usize>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl SparseMatrix {
    /// Builds CSR from triplets. Duplicate (row, col) entries are summed, so
    /// assembly can push per-cell contributions without pre-merging.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Self {
        let mut sorted = triplets.to_vec();
        sorted.sort_unstable_by_key(|&(r, c, _)| (r, c));

        let mut values = Vec::with_capacity(sorted.len());
        let mut col_indices = Vec::with_capacity(sorted.len());
        let mut row_counts = vec![0; n_rows];
        let mut last = None;

        for &(r, c, v) in &sorted {
            if last == Some((r, c)) {
                *values.last_mut().unwrap() += v;
            } else {
                values.push(v);
                col_indices.push(c);
                row_counts[r] += 1;
                last = Some((r, c));
            }
        }

        let mut row_offsets = vec![0; n_rows + 1];
        for i in 0..n_rows {
            row_offsets[i + 1] = row_offsets[i] + row_counts[i];
        }

        Self {
            values,
            col_indices,
            row_offsets,
            n_rows,
            n_cols,
        }
    }

    pub fn mat_vec_mul(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.n_cols);
        assert_eq!(y.len(), self.n_rows);

        for i in 0..self.n_rows {
            let mut sum = 0.0;
            for j in self.row_offsets[i]..self.row_offsets[i + 1] {
                sum += self.values[j] * x[self.col_indices[j]];
            }
            y[i] = sum;
        }
    }
}

/// ILU(0) factorization on the sparsity pattern of `a`. L has unit diagonal;
/// both factors share the original pattern.
pub struct Ilu0 {
    values: Vec<f64>,
    col_indices: Vec<usize>,
    row_offsets: Vec<usize>,
    diag: Vec<usize>,
    n: usize,
}

impl Ilu0 {
    pub fn new(a: &SparseMatrix) -> Result<Self, SolverError> {
        let n = a.n_rows;
        let mut values = a.values.clone();
        let col_indices = a.col_indices.clone();
        let row_offsets = a.row_offsets.clone();

        let mut diag = vec![usize::MAX; n];
        for i in 0..n {
            for j in row_offsets[i]..row_offsets[i + 1] {
                if col_indices[j] == i {
                    diag[i] = j;
                }
            }
            if diag[i] == usize::MAX {
                return Err(SolverError::LinearSolve {
                    iterations: 0,
                    residual: f64::NAN,
                });
            }
        }

        // IKJ variant: eliminate row i against all previous rows k present in
        // its pattern, discarding fill outside the pattern.
        for i in 0..n {
            for jk in row_offsets[i]..row_offsets[i + 1] {
                let k = col_indices[jk];
                if k >= i {
                    break;
                }
                let pivot = values[diag[k]];
                if pivot.abs() < 1e-300 {
                    return Err(SolverError::LinearSolve {
                        iterations: 0,
                        residual: f64::NAN,
                    });
                }
                let lik = values[jk] / pivot;
                values[jk] = lik;

                let mut jj = jk + 1;
                let mut kk = diag[k] + 1;
                let row_end = row_offsets[i + 1];
                let k_end = row_offsets[k + 1];
                while jj < row_end && kk < k_end {
                    match col_indices[jj].cmp(&col_indices[kk]) {
                        std::cmp::Ordering::Less => jj += 1,
                        std::cmp::Ordering::Greater => kk += 1,
                        std::cmp::Ordering::Equal => {
                            values[jj] -= lik * values[kk];
                            jj += 1;
                            kk += 1;
                        }
                    }
                }
            }
        }

        Ok(Self {
            values,
            col_indices,
            row_offsets,
            diag,
            n,
        })
    }

    /// z = (L U)^-1 r
    pub fn apply(&self, r: &[f64], z: &mut [f64]) {
        // Forward solve with unit-diagonal L.
        for i in 0..self.n {
            let mut sum = r[i];
            for j in self.row_offsets[i]..self.diag[i] {
                sum -= self.values[j] * z[self.col_indices[j]];
            }
            z[i] = sum;
        }
        // Backward solve with U.
        for i in (0..self.n).rev() {
            let mut sum = z[i];
            for j in self.diag[i] + 1..self.row_offsets[i + 1] {
                sum -= self.values[j] * z[self.col_indices[j]];
            }
            z[i] = sum / self.values[self.diag[i]];
        }
    }
}

/// Convergence record of a successful solve.
#[derive(Clone, Copy, Debug)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
}

/// Right-preconditioned BiCGStab with an ILU(0) preconditioner built from
/// `a`. Converges when the true residual norm drops below
/// `rel_tol * |b - A x0|` (with a small absolute floor).
pub fn solve_bicgstab(
    a: &SparseMatrix,
    b: &[f64],
    x: &mut [f64],
    max_iter: usize,
    rel_tol: f64,
) -> Result<SolveStats, SolverError> {
    let n = b.len();
    let precond = Ilu0::new(a)?;

    let mut r = vec![0.0; n];
    a.mat_vec_mul(x, &mut r);
    let mut i = 0;
    while i + 4 <= n {
        let vb = f64x4::from(&b[i..i + 4]);
        let vr = f64x4::from(&r[i..i + 4]);
        let res: [f64; 4] = (vb - vr).into();
        r[i..i + 4].copy_from_slice(&res);
        i += 4;
    }
    while i < n {
        r[i] = b[i] - r[i];
        i += 1;
    }

    let init_resid = norm(&r);
    let tol = (rel_tol * init_resid).max(1e-14);
    if init_resid <= tol {
        return Ok(SolveStats {
            iterations: 0,
            residual: init_resid,
        });
    }

    let r0 = r.clone();
    let mut rho_old = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut p_hat = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut s_hat = vec![0.0; n];
    let mut t = vec![0.0; n];
    let mut resid = init_resid;

    for iter in 0..max_iter {
        let rho_new = dot(&r0, &r);
        if !rho_new.is_finite() || rho_new.abs() < 1e-30 {
            return Err(SolverError::LinearSolve {
                iterations: iter,
                residual: resid,
            });
        }

        if iter == 0 {
            p.copy_from_slice(&r);
        } else {
            let beta = (rho_new / rho_old) * (alpha / omega);
            let v_beta = f64x4::splat(beta);
            let v_omega = f64x4::splat(omega);
            let mut i = 0;
            while i + 4 <= n {
                let vr = f64x4::from(&r[i..i + 4]);
                let vp = f64x4::from(&p[i..i + 4]);
                let vv = f64x4::from(&v[i..i + 4]);
                let res: [f64; 4] = (vr + v_beta * (vp - v_omega * vv)).into();
                p[i..i + 4].copy_from_slice(&res);
                i += 4;
            }
            while i < n {
                p[i] = r[i] + beta * (p[i] - omega * v[i]);
                i += 1;
            }
        }

        precond.apply(&p, &mut p_hat);
        a.mat_vec_mul(&p_hat, &mut v);
        let r0_v = dot(&r0, &v);
        if r0_v.abs() < 1e-30 {
            return Err(SolverError::LinearSolve {
                iterations: iter,
                residual: resid,
            });
        }
        alpha = rho_new / r0_v;

        let v_alpha = f64x4::splat(alpha);
        let mut i = 0;
        while i + 4 <= n {
            let vr = f64x4::from(&r[i..i + 4]);
            let vv = f64x4::from(&v[i..i + 4]);
            let res: [f64; 4] = (vr - v_alpha * vv).into();
            s[i..i + 4].copy_from_slice(&res);
            i += 4;
        }
        while i < n {
            s[i] = r[i] - alpha * v[i];
            i += 1;
        }

        if norm(&s) <= tol {
            for i in 0..n {
                x[i] += alpha * p_hat[i];
            }
            return Ok(SolveStats {
                iterations: iter + 1,
                residual: norm(&s),
            });
        }

        precond.apply(&s, &mut s_hat);
        a.mat_vec_mul(&s_hat, &mut t);
        let t_t = dot(&t, &t);
        omega = if t_t.abs() < 1e-30 {
            0.0
        } else {
            dot(&t, &s) / t_t
        };

        let v_alpha = f64x4::splat(alpha);
        let v_omega = f64x4::splat(omega);
        let mut i = 0;
        while i + 4 <= n {
            let vx = f64x4::from(&x[i..i + 4]);
            let vp = f64x4::from(&p_hat[i..i + 4]);
            let vsh = f64x4::from(&s_hat[i..i + 4]);
            let vs = f64x4::from(&s[i..i + 4]);
            let vt = f64x4::from(&t[i..i + 4]);
            let res_x: [f64; 4] = (vx + v_alpha * vp + v_omega * vsh).into();
            let res_r: [f64; 4] = (vs - v_omega * vt).into();
            x[i..i + 4].copy_from_slice(&res_x);
            r[i..i + 4].copy_from_slice(&res_r);
            i += 4;
        }
        while i < n {
            x[i] += alpha * p_hat[i] + omega * s_hat[i];
            r[i] = s[i] - omega * t[i];
            i += 1;
        }

        resid = norm(&r);
        if !resid.is_finite() || resid > 1e12 {
            return Err(SolverError::LinearSolve {
                iterations: iter + 1,
                residual: resid,
            });
        }
        if resid <= tol {
            return Ok(SolveStats {
                iterations: iter + 1,
                residual: resid,
            });
        }
        if omega.abs() < 1e-30 {
            return Err(SolverError::LinearSolve {
                iterations: iter + 1,
                residual: resid,
            });
        }

        rho_old = rho_new;
    }

    Err(SolverError::LinearSolve {
        iterations: max_iter,
        residual: resid,
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = f64x4::splat(0.0);
    let mut i = 0;
    let n = a.len();
    while i + 4 <= n {
        let va = f64x4::from(&a[i..i + 4]);
        let vb = f64x4::from(&b[i..i + 4]);
        sum += va * vb;
        i += 4;
    }
    let mut s = sum.reduce_add();
    while i < n {
        s += a[i] * b[i];
        i += 1;
    }
    s
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triplets_sum_duplicates() {
        let triplets = vec![
            (0, 0, 1.0),
            (0, 1, 2.0),
            (0, 0, 3.0),
            (1, 1, 5.0),
        ];
        let m = SparseMatrix::from_triplets(2, 2, &triplets);
        assert_eq!(m.row_offsets, vec![0, 2, 3]);
        assert_eq!(m.col_indices, vec![0, 1, 1]);
        assert_eq!(m.values, vec![4.0, 2.0, 5.0]);
    }

    #[test]
    fn mat_vec_matches_dense() {
        let triplets = vec![
            (0, 0, 2.0),
            (0, 2, -1.0),
            (1, 1, 3.0),
            (2, 0, 1.0),
            (2, 2, 4.0),
        ];
        let m = SparseMatrix::from_triplets(3, 3, &triplets);
        let x = [1.0, 2.0, 3.0];
        let mut y = [0.0; 3];
        m.mat_vec_mul(&x, &mut y);
        assert_eq!(y, [-1.0, 6.0, 13.0]);
    }

    #[test]
    fn ilu0_is_exact_for_triangular_pattern() {
        // Lower-triangular matrix: ILU(0) reproduces it exactly, so the
        // preconditioner solve is a direct solve.
        let triplets = vec![(0, 0, 2.0), (1, 0, 1.0), (1, 1, 4.0), (2, 2, 5.0)];
        let m = SparseMatrix::from_triplets(3, 3, &triplets);
        let ilu = Ilu0::new(&m).unwrap();
        let r = [2.0, 6.0, 10.0];
        let mut z = [0.0; 3];
        ilu.apply(&r, &mut z);
        // 2 z0 = 2; z0 + 4 z1 = 6; 5 z2 = 10
        assert!((z[0] - 1.0).abs() < 1e-14);
        assert!((z[1] - 1.25).abs() < 1e-14);
        assert!((z[2] - 2.0).abs() < 1e-14);
    }

    #[test]
    fn bicgstab_solves_laplacian_like_system() {
        // 1D Poisson stencil, 50 unknowns.
        let n = 50;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        let a = SparseMatrix::from_triplets(n, n, &triplets);

        let x_exact: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut b = vec![0.0; n];
        a.mat_vec_mul(&x_exact, &mut b);

        let mut x = vec![0.0; n];
        let stats = solve_bicgstab(&a, &b, &mut x, 500, 1e-12).unwrap();
        assert!(stats.iterations <= 500);
        for i in 0..n {
            assert!((x[i] - x_exact[i]).abs() < 1e-8, "entry {i}");
        }
    }

    #[test]
    fn bicgstab_handles_nonsymmetric_systems() {
        // Convection-diffusion style upwind stencil.
        let n = 40;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0));
            if i > 0 {
                triplets.push((i, i - 1, -2.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -0.5));
            }
        }
        let a = SparseMatrix::from_triplets(n, n, &triplets);
        let x_exact: Vec<f64> = (0..n).map(|i| 1.0 + 0.01 * i as f64).collect();
        let mut b = vec![0.0; n];
        a.mat_vec_mul(&x_exact, &mut b);

        let mut x = vec![0.0; n];
        solve_bicgstab(&a, &b, &mut x, 500, 1e-12).unwrap();
        for i in 0..n {
            assert!((x[i] - x_exact[i]).abs() < 1e-8, "entry {i}");
        }
    }
}
