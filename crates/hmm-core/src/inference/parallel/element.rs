//! Filtering elements and the associative operator combining them.
//!
//! Element t stands for the nonnegative K×K matrix
//!   M_0[i, j] = π_j · exp(ll_0[j])                (every row identical)
//!   M_t[i, j] = A_{t-1}[i, j] · exp(ll_t[j])       (t ≥ 1)
//! and the product M_0 · M_1 ⋯ M_t has every row equal to the unnormalized
//! filtered vector at t. Matrix products are associative, so any scan
//! schedule yields the same prefixes.
//!
//! Products of T such matrices underflow, so an element stores
//! `M = diag(exp(log_mass)) · exp(log_cond)` where each row of `log_cond` is a
//! normalized log distribution and `log_mass` holds the log row sums. Rows
//! with zero mass keep `log_mass = -inf` and an all `-inf` conditional row.

use hmm_math::{log_matmul, log_normalize_rows};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// One factor of the forward product, in normalized log form.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterElement {
    log_cond: Array2<f64>,
    log_mass: Array1<f64>,
}

impl FilterElement {
    fn from_log_matrix(mut log_m: Array2<f64>) -> Self {
        let log_mass = log_normalize_rows(&mut log_m);
        Self {
            log_cond: log_m,
            log_mass,
        }
    }

    /// Element for t = 0 from the initial distribution.
    pub fn initial(initial_probs: ArrayView1<'_, f64>, log_likelihoods: ArrayView1<'_, f64>) -> Self {
        let k = initial_probs.len();
        let row: Array1<f64> = &initial_probs.mapv(f64::ln) + &log_likelihoods;
        Self::from_log_matrix(Array2::from_shape_fn((k, k), |(_, j)| row[j]))
    }

    /// Element for t ≥ 1 from `ln A_{t-1}` and the log-likelihood row at t.
    pub fn transition(log_transition: ArrayView2<'_, f64>, log_likelihoods: ArrayView1<'_, f64>) -> Self {
        Self::from_log_matrix(&log_transition + &log_likelihoods)
    }

    /// The identity matrix: neutral on both sides.
    pub fn identity(num_states: usize) -> Self {
        let log_cond = Array2::from_shape_fn((num_states, num_states), |(i, j)| {
            if i == j {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        });
        Self {
            log_cond,
            log_mass: Array1::zeros(num_states),
        }
    }

    /// `self ⊕ later`: the element for the matrix product `self · later`.
    pub fn combine(&self, later: &FilterElement) -> FilterElement {
        // diag(m1) C1 diag(m2) C2 = diag(m1) · (C1 · diag(m2) · C2)
        let weighted = &self.log_cond + &later.log_mass.view().insert_axis(Axis(0));
        let mut product = log_matmul(weighted.view(), later.log_cond.view());
        let row_mass = log_normalize_rows(&mut product);
        FilterElement {
            log_cond: product,
            log_mass: &self.log_mass + &row_mass,
        }
    }

    /// Row-normalized conditional, in log space.
    pub fn log_cond(&self) -> ArrayView2<'_, f64> {
        self.log_cond.view()
    }

    /// Per-row log mass.
    pub fn log_mass(&self) -> ArrayView1<'_, f64> {
        self.log_mass.view()
    }

    /// The element as an explicit matrix. Underflows for long products.
    pub fn to_matrix(&self) -> Array2<f64> {
        let mut m = self.log_cond.mapv(f64::exp);
        for (mut row, mass) in m.axis_iter_mut(Axis(0)).zip(self.log_mass.iter()) {
            let scale = mass.exp();
            row.mapv_inplace(|x| x * scale);
        }
        m
    }
}
