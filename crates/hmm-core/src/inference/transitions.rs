//! Expected adjacent-state joints from a smoothed posterior.
//!
//! For each step t → t+1,
//!   ξ_t[i, j] = p(z_t = i, z_{t+1} = j | y_{0:T-1})
//!             ∝ α_t[i] · A_t[i, j] · s_{t+1}[j] / p_{t+1}[j],
//! normalized so every K×K matrix sums to one. Row sums of ξ_t recover the
//! smoothed marginal at t and column sums the one at t + 1.

use hmm_math::log_sum_exp;
use ndarray::{Array1, Array2, Array3, Axis, Zip};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::inference::model::{check_transitions, LogTransitions, TransitionModel};
use crate::inference::posterior::Posterior;

/// Expected transition counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionProbs {
    /// `(T-1, K, K)`; slice t is ξ_t.
    PerStep(Array3<f64>),
    /// Σ_t ξ_t, the sufficient statistic for re-estimating A.
    Summed(Array2<f64>),
}

impl TransitionProbs {
    /// The per-step tensor, if not reduced.
    pub fn per_step(&self) -> Option<&Array3<f64>> {
        match self {
            TransitionProbs::PerStep(xi) => Some(xi),
            TransitionProbs::Summed(_) => None,
        }
    }

    /// The K×K total, summing the per-step tensor when needed.
    pub fn summed(&self) -> Array2<f64> {
        match self {
            TransitionProbs::PerStep(xi) => xi.sum_axis(Axis(0)),
            TransitionProbs::Summed(total) => total.clone(),
        }
    }
}

/// Compute ξ from a smoothed posterior.
///
/// With `reduce_sum` the per-step matrices are summed over time and a
/// single K×K matrix is returned.
pub fn compute_transition_probs<M: TransitionModel + ?Sized>(
    transitions: &M,
    posterior: &Posterior,
    reduce_sum: bool,
) -> Result<TransitionProbs> {
    let (num_timesteps, num_states) = posterior.smoothed_probs.dim();
    for (what, dim) in [
        ("filtered probabilities", posterior.filtered_probs.dim()),
        ("predicted probabilities", posterior.predicted_probs.dim()),
    ] {
        if dim != (num_timesteps, num_states) {
            return Err(Error::shape(
                what,
                format!("{num_timesteps}x{num_states}"),
                format!("{}x{}", dim.0, dim.1),
            ));
        }
    }
    check_transitions(transitions, num_states, num_timesteps)?;

    let num_steps = num_timesteps.saturating_sub(1);
    let log_transitions = LogTransitions::new(transitions);
    let mut xi = Array3::zeros((num_steps, num_states, num_states));
    for t in 0..num_steps {
        let log_ratio: Array1<f64> = Zip::from(posterior.smoothed_probs.row(t + 1))
            .and(posterior.predicted_probs.row(t + 1))
            .map_collect(|&s, &p| {
                if s > 0.0 {
                    s.ln() - p.ln()
                } else {
                    f64::NEG_INFINITY
                }
            });
        let log_filtered = posterior.filtered_probs.row(t).mapv(f64::ln);
        let log_a = log_transitions.at(t);
        let log_joint = Array2::from_shape_fn((num_states, num_states), |(i, j)| {
            log_filtered[i] + log_a[[i, j]] + log_ratio[j]
        });

        let total = log_sum_exp(&log_joint.iter().copied().collect::<Vec<_>>());
        if !total.is_finite() {
            return Err(Error::DegenerateLikelihood { timestep: t + 1 });
        }
        xi.index_axis_mut(Axis(0), t)
            .assign(&log_joint.mapv(|v| (v - total).exp()));
    }

    debug!(num_steps, num_states, reduce_sum, "transition probabilities computed");
    if reduce_sum {
        Ok(TransitionProbs::Summed(xi.sum_axis(Axis(0))))
    } else {
        Ok(TransitionProbs::PerStep(xi))
    }
}
