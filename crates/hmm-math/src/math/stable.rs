//! Numerically stable primitives for log-domain probability math.

/// Stable log(sum(exp(values))).
///
/// Returns NEG_INFINITY for empty input or all -inf inputs.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v - max).exp();
    }
    max + sum.ln()
}

/// Stable log(exp(a) + exp(b)).
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    if a == f64::INFINITY || b == f64::INFINITY {
        return f64::INFINITY;
    }
    let m = a.max(b);
    let diff = (a - b).abs();
    m + (-diff).exp().ln_1p()
}

/// Exponentiate and normalize log-weights in place.
///
/// On return `values` holds `exp(v - lse)` and the log normalizer `lse` is
/// returned. When the normalizer is not finite (every weight is -inf, or a
/// NaN was present) the entries are set to NaN: the 0/0 is reported, not
/// papered over.
pub fn log_normalize(values: &mut [f64]) -> f64 {
    let lse = log_sum_exp(values);
    if !lse.is_finite() {
        values.iter_mut().for_each(|v| *v = f64::NAN);
        return lse;
    }
    for v in values.iter_mut() {
        *v = (*v - lse).exp();
    }
    lse
}

/// Index of the largest value, lowest index on ties.
///
/// NaN entries never win. Returns `None` for empty input.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            None if !v.is_nan() => best = Some((i, v)),
            Some((_, bv)) if v > bv => best = Some((i, v)),
            _ => {}
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn log_sum_exp_basic() {
        let v = [0.0, 0.0];
        let out = log_sum_exp(&v);
        assert!(approx_eq(out, 2.0f64.ln(), 1e-12));
    }

    #[test]
    fn log_sum_exp_dominance() {
        let v = [-1000.0, 0.0];
        let out = log_sum_exp(&v);
        assert!(approx_eq(out, 0.0, 1e-12));
    }

    #[test]
    fn log_sum_exp_all_neg_inf() {
        let v = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        let out = log_sum_exp(&v);
        assert!(out.is_infinite() && out.is_sign_negative());
    }

    #[test]
    fn log_sum_exp_empty_is_neg_inf() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn log_sum_exp_very_negative_inputs() {
        // exp(-1e4) underflows, the stabilized sum must not.
        let out = log_sum_exp(&[-1.0e4, -1.0e4]);
        assert!(approx_eq(out, -1.0e4 + 2.0f64.ln(), 1e-9));
    }

    #[test]
    fn log_add_exp_matches_lse() {
        let a = 1.234;
        let b = -0.75;
        let out = log_add_exp(a, b);
        let lse = log_sum_exp(&[a, b]);
        assert!(approx_eq(out, lse, 1e-12));
    }

    #[test]
    fn log_sum_exp_nan_propagates() {
        let out = log_sum_exp(&[0.0, f64::NAN]);
        assert!(out.is_nan());
    }

    #[test]
    fn log_add_exp_infinity_rules() {
        let out = log_add_exp(f64::INFINITY, 1.0);
        assert!(out.is_infinite() && out.is_sign_positive());

        let out2 = log_add_exp(f64::NEG_INFINITY, 2.0);
        assert!(approx_eq(out2, 2.0, 1e-12));
    }

    #[test]
    fn log_normalize_produces_distribution() {
        let mut v = [0.5f64.ln(), 0.25f64.ln(), 0.25f64.ln()];
        let lse = log_normalize(&mut v);
        assert!(approx_eq(lse, 0.0, 1e-12));
        assert!(approx_eq(v[0], 0.5, 1e-12));
        assert!(approx_eq(v.iter().sum::<f64>(), 1.0, 1e-12));
    }

    #[test]
    fn log_normalize_keeps_zero_mass() {
        let mut v = [f64::NEG_INFINITY, -800.0];
        let lse = log_normalize(&mut v);
        assert!(approx_eq(lse, -800.0, 1e-12));
        assert_eq!(v, [0.0, 1.0]);
    }

    #[test]
    fn log_normalize_degenerate_is_nan() {
        let mut v = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        let lse = log_normalize(&mut v);
        assert_eq!(lse, f64::NEG_INFINITY);
        assert!(v.iter().all(|p| p.is_nan()));
    }

    #[test]
    fn argmax_lowest_index_on_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]), Some(1));
        assert_eq!(argmax(&[0.0, 0.0]), Some(0));
        assert_eq!(argmax(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), Some(0));
        assert_eq!(argmax(&[f64::NAN, 1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
