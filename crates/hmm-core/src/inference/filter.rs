//! Forward filtering (the forward algorithm) in log space.
//!
//! For t = 0..T-1:
//!   predicted_t = π                     (t = 0)
//!   predicted_t = α_{t-1} · A_{t-1}     (t > 0)
//!   α_t ∝ predicted_t ⊙ exp(ll_t)
//!
//! The local normalizers sum to log p(y_{0:T-1}).

use hmm_math::{log_normalize, log_vecmat};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::inference::model::{check_shapes, Dims, LogTransitions, TransitionModel};

/// Output of the forward pass. Doubles as the filtered-only posterior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOutput {
    /// log p(y_{0:T-1}); 0 for an empty sequence.
    pub log_normalizer: f64,
    /// Row t is p(z_t | y_{0:t}).
    pub filtered_probs: Array2<f64>,
    /// Row t is p(z_t | y_{0:t-1}); row 0 is the initial distribution.
    pub predicted_probs: Array2<f64>,
}

impl FilterOutput {
    /// Number of timesteps T.
    pub fn num_timesteps(&self) -> usize {
        self.filtered_probs.nrows()
    }

    /// Number of states K.
    pub fn num_states(&self) -> usize {
        self.filtered_probs.ncols()
    }
}

/// Condition a log-space prior on one row of log-likelihoods.
///
/// Returns the normalized posterior and the local log normalizer, or
/// `DegenerateLikelihood` when every state is impossible.
pub(crate) fn condition_on(
    log_prior: ArrayView1<'_, f64>,
    log_likelihoods: ArrayView1<'_, f64>,
    timestep: usize,
) -> Result<(Array1<f64>, f64)> {
    let mut weights: Vec<f64> = log_prior
        .iter()
        .zip(log_likelihoods.iter())
        .map(|(p, l)| p + l)
        .collect();
    let log_norm = log_normalize(&mut weights);
    if !log_norm.is_finite() {
        return Err(Error::DegenerateLikelihood { timestep });
    }
    Ok((Array1::from(weights), log_norm))
}

/// Run the forward filter.
///
/// `transitions` may be a single K×K matrix or a
/// [`TimeVaryingTransitions`](crate::inference::TimeVaryingTransitions) stack.
pub fn hmm_filter<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<FilterOutput> {
    let Dims {
        num_timesteps,
        num_states,
    } = check_shapes(initial_probs, transitions, log_likelihoods)?;
    let log_transitions = LogTransitions::new(transitions);

    let mut filtered_probs = Array2::zeros((num_timesteps, num_states));
    let mut predicted_probs = Array2::zeros((num_timesteps, num_states));
    let mut log_normalizer = 0.0;

    let mut predicted = initial_probs.to_owned();
    let mut log_predicted = initial_probs.mapv(f64::ln);
    for t in 0..num_timesteps {
        predicted_probs.row_mut(t).assign(&predicted);

        let (filtered, local) = condition_on(log_predicted.view(), log_likelihoods.row(t), t)?;
        log_normalizer += local;
        trace!(timestep = t, local_log_normalizer = local, "filter step");

        if t + 1 < num_timesteps {
            log_predicted = log_vecmat(filtered.mapv(f64::ln).view(), log_transitions.at(t).view());
            predicted = log_predicted.mapv(f64::exp);
        }
        filtered_probs.row_mut(t).assign(&filtered);
    }

    debug!(
        num_timesteps,
        num_states, log_normalizer, "forward filter complete"
    );
    Ok(FilterOutput {
        log_normalizer,
        filtered_probs,
        predicted_probs,
    })
}
