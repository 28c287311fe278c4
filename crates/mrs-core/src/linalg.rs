//! Small dense complex linear algebra helpers
//!
//! Shared routines for the operators that need matrix decompositions:
//! coil combination (dominant eigenvector, pre-whitening) and HLSVD
//! (truncated SVD of a Hankel matrix, small eigenvalue problems).
//! Everything here is plain Gaussian elimination, Givens-rotation QR and
//! subspace iteration on `Vec`-backed matrices; the problem sizes are a
//! handful of coils or a couple dozen retained singular vectors.
//!
//! Matrices are row-major `Vec<Vec<Complex64>>`; functions that operate on
//! subspaces take or return a `Vec` of column vectors instead.

use num_complex::Complex64;

use crate::types::{MrsError, MrsResult};

/// Row-major complex matrix.
pub type CMat = Vec<Vec<Complex64>>;

/// Zero matrix of the given size.
pub fn zeros(rows: usize, cols: usize) -> CMat {
    vec![vec![Complex64::new(0.0, 0.0); cols]; rows]
}

/// Conjugate (Hermitian) transpose.
pub fn hermitian(a: &CMat) -> CMat {
    let rows = a.len();
    let cols = if rows > 0 { a[0].len() } else { 0 };
    let mut out = zeros(cols, rows);
    for (i, row) in a.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            out[j][i] = v.conj();
        }
    }
    out
}

/// Matrix product `a · b`.
pub fn matmul(a: &CMat, b: &CMat) -> CMat {
    let rows = a.len();
    let inner = if rows > 0 { a[0].len() } else { 0 };
    let cols = if b.is_empty() { 0 } else { b[0].len() };
    let mut c = zeros(rows, cols);
    for i in 0..rows {
        for k in 0..inner {
            let aik = a[i][k];
            for j in 0..cols {
                c[i][j] += aik * b[k][j];
            }
        }
    }
    c
}

/// Matrix-vector product `a · x`.
pub fn mat_vec(a: &CMat, x: &[Complex64]) -> Vec<Complex64> {
    a.iter()
        .map(|row| row.iter().zip(x.iter()).map(|(&m, &v)| m * v).sum())
        .collect()
}

/// Inner product `<a, b> = a^H b`.
pub fn dot(a: &[Complex64], b: &[Complex64]) -> Complex64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x.conj() * y).sum()
}

/// Euclidean norm of a complex vector.
pub fn vec_norm(a: &[Complex64]) -> f64 {
    a.iter().map(|x| x.norm_sqr()).sum::<f64>().sqrt()
}

/// Solve a small complex linear system `Ax = b` by Gaussian elimination
/// with partial pivoting. Near-singular pivots are skipped, leaving the
/// corresponding unknowns at zero.
pub fn solve_complex_system(a: &CMat, b: &[Complex64]) -> Vec<Complex64> {
    let n = b.len();
    if n == 0 {
        return vec![];
    }

    let mut aug: Vec<Vec<Complex64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.push(b[i]);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_val = aug[col][col].norm();
        let mut max_row = col;
        for row in (col + 1)..n {
            if aug[row][col].norm() > max_val {
                max_val = aug[row][col].norm();
                max_row = row;
            }
        }
        if max_val < 1e-30 {
            continue;
        }
        aug.swap(col, max_row);

        let pivot = aug[col][col];
        for row in (col + 1)..n {
            let factor = aug[row][col] / pivot;
            for j in col..=n {
                let val = aug[col][j];
                aug[row][j] -= factor * val;
            }
        }
    }

    let mut x = vec![Complex64::new(0.0, 0.0); n];
    for i in (0..n).rev() {
        let mut sum = aug[i][n];
        for j in (i + 1)..n {
            sum -= aug[i][j] * x[j];
        }
        if aug[i][i].norm() > 1e-30 {
            x[i] = sum / aug[i][i];
        }
    }

    x
}

/// QR decomposition via Givens rotations. Returns `(Q, R)` with `A = QR`.
pub fn qr_decompose(a: &CMat) -> (CMat, CMat) {
    let n = a.len();
    let mut r: CMat = a.to_vec();
    let mut q = zeros(n, n);
    for (i, row) in q.iter_mut().enumerate() {
        row[i] = Complex64::new(1.0, 0.0);
    }

    for j in 0..n.saturating_sub(1) {
        for i in (j + 1)..n {
            if r[i][j].norm() < 1e-30 {
                continue;
            }
            let a_val = r[j][j];
            let b_val = r[i][j];
            let rr = (a_val.norm_sqr() + b_val.norm_sqr()).sqrt();
            let c = a_val.norm() / rr;
            let s = if a_val.norm() > 1e-30 {
                b_val * a_val.conj() / (a_val.norm() * rr)
            } else {
                Complex64::new(1.0, 0.0)
            };

            for k in 0..n {
                let rj = r[j][k];
                let ri = r[i][k];
                r[j][k] = c * rj + s.conj() * ri;
                r[i][k] = -s * rj + c * ri;
            }
            for k in 0..n {
                let qj = q[k][j];
                let qi = q[k][i];
                q[k][j] = c * qj + s * qi;
                q[k][i] = -s.conj() * qj + c * qi;
            }
        }
    }

    (q, r)
}

/// Eigenvalues of a small complex matrix via shifted QR iteration.
pub fn eigenvalues_qr(matrix: &CMat) -> Vec<Complex64> {
    let n = matrix.len();
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![matrix[0][0]];
    }

    let mut a: CMat = matrix.to_vec();
    let max_iter = 300;

    for it in 0..max_iter {
        // Shift from the trailing diagonal entry, with an occasional
        // exceptional perturbation to break symmetric-spectrum stalls
        let mut shift = a[n - 1][n - 1];
        if it > 0 && it % 25 == 0 {
            let scale = a[n - 1][n - 2].norm().max(1e-3);
            shift += Complex64::new(0.7 * scale, 0.3 * scale);
        }

        for (i, row) in a.iter_mut().enumerate() {
            row[i] -= shift;
        }

        let (q, r) = qr_decompose(&a);
        a = matmul(&r, &q);
        for (i, row) in a.iter_mut().enumerate() {
            row[i] += shift;
        }

        let mut converged = true;
        for i in 1..n {
            if a[i][i - 1].norm() > 1e-12 {
                converged = false;
                break;
            }
        }
        if converged {
            break;
        }
    }

    (0..n).map(|i| a[i][i]).collect()
}

/// Orthonormalize a set of column vectors in place (modified Gram-Schmidt).
/// Columns that collapse to zero are replaced with zero vectors.
pub fn orthonormalize(columns: &mut [Vec<Complex64>]) {
    for j in 0..columns.len() {
        for i in 0..j {
            let proj = dot(&columns[i], &columns[j]);
            let (head, tail) = columns.split_at_mut(j);
            for (t, &h) in tail[0].iter_mut().zip(head[i].iter()) {
                *t -= proj * h;
            }
        }
        let norm = vec_norm(&columns[j]);
        if norm > 1e-30 {
            for v in columns[j].iter_mut() {
                *v /= norm;
            }
        } else {
            for v in columns[j].iter_mut() {
                *v = Complex64::new(0.0, 0.0);
            }
        }
    }
}

/// Truncated SVD of a tall matrix via subspace iteration on `A^H A`.
///
/// Returns `(u_cols, singular_values, v_cols)` with the `k` dominant
/// singular triplets sorted by decreasing singular value. Deterministic:
/// the iteration starts from canonical basis vectors and runs a fixed
/// number of sweeps.
pub fn truncated_svd(a: &CMat, k: usize) -> MrsResult<(Vec<Vec<Complex64>>, Vec<f64>, Vec<Vec<Complex64>>)> {
    let rows = a.len();
    let cols = if rows > 0 { a[0].len() } else { 0 };
    let k = k.min(cols).min(rows);
    if k == 0 {
        return Ok((vec![], vec![], vec![]));
    }

    // Start from canonical basis vectors
    let mut v: Vec<Vec<Complex64>> = (0..k)
        .map(|j| {
            let mut col = vec![Complex64::new(0.0, 0.0); cols];
            col[j] = Complex64::new(1.0, 0.0);
            col
        })
        .collect();

    let ah = hermitian(a);
    let sweeps = 60;
    for _ in 0..sweeps {
        // v <- orth(A^H (A v))
        for col in v.iter_mut() {
            let av = mat_vec(a, col);
            *col = mat_vec(&ah, &av);
        }
        orthonormalize(&mut v);
    }

    let mut triplets: Vec<(f64, Vec<Complex64>, Vec<Complex64>)> = Vec::with_capacity(k);
    for col in v.into_iter() {
        let av = mat_vec(a, &col);
        let sigma = vec_norm(&av);
        if !sigma.is_finite() {
            return Err(MrsError::Numerical(
                "subspace iteration diverged".to_string(),
            ));
        }
        let u = if sigma > 1e-300 {
            av.iter().map(|&x| x / sigma).collect()
        } else {
            vec![Complex64::new(0.0, 0.0); rows]
        };
        triplets.push((sigma, u, col));
    }

    triplets.sort_by(|x, y| y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut sigma = Vec::with_capacity(k);
    let mut u_cols = Vec::with_capacity(k);
    let mut v_cols = Vec::with_capacity(k);
    for (s, u, vc) in triplets {
        sigma.push(s);
        u_cols.push(u);
        v_cols.push(vc);
    }

    Ok((u_cols, sigma, v_cols))
}

/// Dominant eigenvector of a Hermitian positive semi-definite matrix by
/// power iteration from a caller-supplied start vector.
pub fn dominant_eigenvector(s: &CMat, start: &[Complex64], iters: usize) -> Vec<Complex64> {
    let mut v: Vec<Complex64> = start.to_vec();
    let norm = vec_norm(&v);
    if norm > 1e-30 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else if !v.is_empty() {
        v[0] = Complex64::new(1.0, 0.0);
    }

    for _ in 0..iters {
        let mut next = mat_vec(s, &v);
        let norm = vec_norm(&next);
        if norm < 1e-30 {
            break;
        }
        for x in next.iter_mut() {
            *x /= norm;
        }
        v = next;
    }
    v
}

/// Cholesky factorization `C = L L^H` of a Hermitian positive-definite
/// matrix. Fails on non-positive pivots.
pub fn cholesky(c: &CMat) -> MrsResult<CMat> {
    let n = c.len();
    let mut l = zeros(n, n);
    for i in 0..n {
        for j in 0..=i {
            let mut sum = c[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k].conj();
            }
            if i == j {
                let diag = sum.re;
                if diag <= 0.0 || !diag.is_finite() {
                    return Err(MrsError::Numerical(
                        "covariance matrix is not positive definite".to_string(),
                    ));
                }
                l[i][j] = Complex64::new(diag.sqrt(), 0.0);
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Ok(l)
}

/// Solve the lower-triangular system `L y = b` by forward substitution.
pub fn forward_substitute(l: &CMat, b: &[Complex64]) -> Vec<Complex64> {
    let n = b.len();
    let mut y = vec![Complex64::new(0.0, 0.0); n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        if l[i][i].norm() > 1e-30 {
            y[i] = sum / l[i][i];
        }
    }
    y
}
