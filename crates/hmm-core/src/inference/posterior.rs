//! Posterior container shared by every smoother.

use hmm_math::argmax;
use ndarray::{Array2, Axis};
use serde::Serialize;

use crate::inference::filter::FilterOutput;

/// Everything a downstream consumer needs from one smoothing pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Posterior {
    /// log p(y_{0:T-1}).
    pub marginal_log_lkhd: f64,
    /// Row t is p(z_t | y_{0:t}).
    pub filtered_probs: Array2<f64>,
    /// Row t is p(z_t | y_{0:t-1}).
    pub predicted_probs: Array2<f64>,
    /// Row t is p(z_t | y_{0:T-1}) (or the lag-truncated estimate for the
    /// fixed-lag smoother). The last row equals the last filtered row.
    pub smoothed_probs: Array2<f64>,
    /// Normalized backward messages, present for two-filter smoothing.
    pub bwd_filter_probs: Option<Array2<f64>>,
}

impl Posterior {
    pub(crate) fn from_filter(
        filter: FilterOutput,
        smoothed_probs: Array2<f64>,
        bwd_filter_probs: Option<Array2<f64>>,
    ) -> Self {
        Self {
            marginal_log_lkhd: filter.log_normalizer,
            filtered_probs: filter.filtered_probs,
            predicted_probs: filter.predicted_probs,
            smoothed_probs,
            bwd_filter_probs,
        }
    }

    /// Number of timesteps T.
    pub fn num_timesteps(&self) -> usize {
        self.smoothed_probs.nrows()
    }

    /// Number of states K.
    pub fn num_states(&self) -> usize {
        self.smoothed_probs.ncols()
    }

    /// Per-timestep argmax of the smoothed marginals.
    ///
    /// This is not the jointly most probable path; use
    /// [`hmm_posterior_mode`](crate::inference::hmm_posterior_mode) for that.
    pub fn marginal_modes(&self) -> Vec<usize> {
        self.smoothed_probs
            .axis_iter(Axis(0))
            .filter_map(|row| argmax(&row.to_vec()))
            .collect()
    }
}
