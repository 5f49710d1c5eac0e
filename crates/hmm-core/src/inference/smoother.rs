//! Forward-backward smoothing.
//!
//! Two equivalent formulations:
//! - two-filter: combine the forward filter with the backward messages,
//!   `p(z_t | y_{0:T-1}) ∝ α_t ⊙ β_t`;
//! - RTS: a backward sweep over the filtered and predicted marginals only,
//!   `s_t[i] ∝ α_t[i] · Σ_j A_t[i, j] · s_{t+1}[j] / p_{t+1}[j]`.

use hmm_math::{log_matvec, log_normalize};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::inference::backward::hmm_backward_filter;
use crate::inference::filter::hmm_filter;
use crate::inference::model::{LogTransitions, TransitionModel};
use crate::inference::posterior::Posterior;

/// Relative gap between forward and backward normalizers worth reporting.
const NORMALIZER_MISMATCH_TOLERANCE: f64 = 1e-8;

/// Two-filter smoother. Fills [`Posterior::bwd_filter_probs`].
pub fn hmm_two_filter_smoother<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<Posterior> {
    let forward = hmm_filter(initial_probs, transitions, log_likelihoods)?;
    let backward = hmm_backward_filter(initial_probs, transitions, log_likelihoods)?;

    let gap = (forward.log_normalizer - backward.log_normalizer).abs();
    if gap > NORMALIZER_MISMATCH_TOLERANCE * forward.log_normalizer.abs().max(1.0) {
        warn!(
            forward = forward.log_normalizer,
            backward = backward.log_normalizer,
            "forward and backward normalizers disagree"
        );
    }

    let mut smoothed = Array2::zeros(forward.filtered_probs.dim());
    for t in 0..forward.num_timesteps() {
        let mut weights: Vec<f64> = Zip::from(forward.filtered_probs.row(t))
            .and(backward.backward_messages.row(t))
            .map_collect(|f, b| f.ln() + b.ln())
            .to_vec();
        if !log_normalize(&mut weights).is_finite() {
            return Err(Error::DegenerateLikelihood { timestep: t });
        }
        smoothed.row_mut(t).assign(&Array1::from(weights));
    }

    debug!(
        num_timesteps = forward.num_timesteps(),
        "two-filter smoothing complete"
    );
    Ok(Posterior::from_filter(
        forward,
        smoothed,
        Some(backward.backward_messages),
    ))
}

/// One RTS step: smooth timestep `t` from the smoothed marginal at `t + 1`.
///
/// `log_transition` is `ln A_t`. States with zero smoothed mass contribute
/// nothing, even where the predicted mass is also zero.
pub(crate) fn rts_backward_step(
    filtered: ArrayView1<'_, f64>,
    predicted_next: ArrayView1<'_, f64>,
    smoothed_next: ArrayView1<'_, f64>,
    log_transition: ArrayView2<'_, f64>,
    timestep: usize,
) -> Result<Array1<f64>> {
    let log_ratio: Array1<f64> = Zip::from(smoothed_next)
        .and(predicted_next)
        .map_collect(|&s, &p| {
            if s > 0.0 {
                s.ln() - p.ln()
            } else {
                f64::NEG_INFINITY
            }
        });
    let log_back = log_matvec(log_transition, log_ratio.view());
    let mut weights: Vec<f64> = filtered
        .iter()
        .zip(log_back.iter())
        .map(|(f, b)| f.ln() + b)
        .collect();
    if !log_normalize(&mut weights).is_finite() {
        return Err(Error::DegenerateLikelihood { timestep });
    }
    Ok(Array1::from(weights))
}

/// Rauch-Tung-Striebel smoother. Leaves `bwd_filter_probs` empty.
pub fn hmm_smoother<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<Posterior> {
    let forward = hmm_filter(initial_probs, transitions, log_likelihoods)?;
    let num_timesteps = forward.num_timesteps();
    let mut smoothed = forward.filtered_probs.clone();
    if num_timesteps > 1 {
        let log_transitions = LogTransitions::new(transitions);
        for t in (0..num_timesteps - 1).rev() {
            let row = rts_backward_step(
                forward.filtered_probs.row(t),
                forward.predicted_probs.row(t + 1),
                smoothed.row(t + 1),
                log_transitions.at(t).view(),
                t,
            )?;
            smoothed.row_mut(t).assign(&row);
        }
    }
    debug!(num_timesteps, "rts smoothing complete");
    Ok(Posterior::from_filter(forward, smoothed, None))
}
