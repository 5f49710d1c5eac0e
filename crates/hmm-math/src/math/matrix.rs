//! Log-space vector/matrix combination on ndarray views.
//!
//! Every routine reduces through [`log_sum_exp`](super::stable::log_sum_exp),
//! so -inf entries (zero probability) are handled without producing NaN and
//! large magnitudes neither overflow nor underflow.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::stable::log_sum_exp;

/// log-sum-exp of each row: `out[i] = log Σ_j exp(m[i, j])`.
pub fn log_sum_exp_rows(log_m: ArrayView2<'_, f64>) -> Array1<f64> {
    log_m
        .axis_iter(Axis(0))
        .map(|row| log_sum_exp(&row.to_vec()))
        .collect()
}

/// log-sum-exp of each column: `out[j] = log Σ_i exp(m[i, j])`.
pub fn log_sum_exp_cols(log_m: ArrayView2<'_, f64>) -> Array1<f64> {
    log_m
        .axis_iter(Axis(1))
        .map(|col| log_sum_exp(&col.to_vec()))
        .collect()
}

/// Row-vector times matrix in log space.
///
/// `out[j] = log Σ_i exp(log_v[i] + log_m[i, j])`.
pub fn log_vecmat(log_v: ArrayView1<'_, f64>, log_m: ArrayView2<'_, f64>) -> Array1<f64> {
    debug_assert_eq!(log_v.len(), log_m.nrows());
    let mut terms = vec![0.0; log_v.len()];
    log_m
        .axis_iter(Axis(1))
        .map(|col| {
            for (slot, (lv, lm)) in terms.iter_mut().zip(log_v.iter().zip(col.iter())) {
                *slot = lv + lm;
            }
            log_sum_exp(&terms)
        })
        .collect()
}

/// Matrix times column-vector in log space.
///
/// `out[i] = log Σ_j exp(log_m[i, j] + log_v[j])`.
pub fn log_matvec(log_m: ArrayView2<'_, f64>, log_v: ArrayView1<'_, f64>) -> Array1<f64> {
    debug_assert_eq!(log_v.len(), log_m.ncols());
    let mut terms = vec![0.0; log_v.len()];
    log_m
        .axis_iter(Axis(0))
        .map(|row| {
            for (slot, (lm, lv)) in terms.iter_mut().zip(row.iter().zip(log_v.iter())) {
                *slot = lm + lv;
            }
            log_sum_exp(&terms)
        })
        .collect()
}

/// Matrix product in log space.
///
/// `out[i, k] = log Σ_j exp(a[i, j] + b[j, k])`.
pub fn log_matmul(log_a: ArrayView2<'_, f64>, log_b: ArrayView2<'_, f64>) -> Array2<f64> {
    debug_assert_eq!(log_a.ncols(), log_b.nrows());
    let mut out = Array2::zeros((log_a.nrows(), log_b.ncols()));
    for (i, row) in log_a.axis_iter(Axis(0)).enumerate() {
        out.row_mut(i).assign(&log_vecmat(row, log_b));
    }
    out
}

/// Normalize each row of a log matrix in place, staying in log space.
///
/// Returns the per-row log normalizers. Rows with zero mass are left as
/// all -inf and report -inf.
pub fn log_normalize_rows(log_m: &mut Array2<f64>) -> Array1<f64> {
    let lse = log_sum_exp_rows(log_m.view());
    for (mut row, &norm) in log_m.axis_iter_mut(Axis(0)).zip(lse.iter()) {
        if norm.is_finite() {
            row.mapv_inplace(|x| x - norm);
        } else {
            row.fill(f64::NEG_INFINITY);
        }
    }
    lse
}

/// Elementwise natural log of a probability matrix (0 maps to -inf).
pub fn ln_matrix(m: ArrayView2<'_, f64>) -> Array2<f64> {
    m.mapv(f64::ln)
}

/// Normalize a non-negative vector to sum to one, returning the sum.
///
/// A zero (or non-finite) sum leaves NaN entries behind, mirroring
/// [`log_normalize`](super::stable::log_normalize).
pub fn normalize(v: &mut Array1<f64>) -> f64 {
    let sum = v.sum();
    if sum > 0.0 && sum.is_finite() {
        v.mapv_inplace(|x| x / sum);
    } else {
        v.fill(f64::NAN);
    }
    sum
}
