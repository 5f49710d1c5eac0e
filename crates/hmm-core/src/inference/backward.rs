//! Backward filtering: β messages, normalized per step.
//!
//! β_{T-1} = 1 and, for t < T-1,
//!   β_t[i] ∝ Σ_j A_t[i, j] · exp(ll_{t+1}[j]) · β_{t+1}[j].
//!
//! Each β_t (t < T-1) is rescaled to sum to one and the scale factors are
//! accumulated. Closing the recursion with the initial distribution,
//!   log Σ_k π_k · exp(ll_0[k]) · β_0[k],
//! recovers the same log p(y_{0:T-1}) as the forward filter.

use hmm_math::{log_matvec, log_normalize, log_sum_exp};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::inference::model::{check_shapes, Dims, LogTransitions, TransitionModel};

/// Output of the backward pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackwardOutput {
    /// log p(y_{0:T-1}), including the initial distribution.
    pub log_normalizer: f64,
    /// Row t is β_t rescaled to sum to one; the last row is all ones.
    pub backward_messages: Array2<f64>,
}

/// Run the backward filter.
pub fn hmm_backward_filter<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<BackwardOutput> {
    let Dims {
        num_timesteps,
        num_states,
    } = check_shapes(initial_probs, transitions, log_likelihoods)?;
    let mut backward_messages = Array2::ones((num_timesteps, num_states));
    if num_timesteps == 0 {
        return Ok(BackwardOutput {
            log_normalizer: 0.0,
            backward_messages,
        });
    }
    let log_transitions = LogTransitions::new(transitions);

    let mut log_normalizer = 0.0;
    let mut log_beta = Array1::<f64>::zeros(num_states);
    for t in (0..num_timesteps - 1).rev() {
        let incoming = &log_likelihoods.row(t + 1) + &log_beta;
        let mut weights = log_matvec(log_transitions.at(t).view(), incoming.view()).to_vec();
        let local = log_normalize(&mut weights);
        if !local.is_finite() {
            return Err(Error::DegenerateLikelihood { timestep: t + 1 });
        }
        log_normalizer += local;
        trace!(timestep = t, local_log_normalizer = local, "backward step");

        let beta = Array1::from(weights);
        log_beta = beta.mapv(f64::ln);
        backward_messages.row_mut(t).assign(&beta);
    }

    let closing: Vec<f64> = initial_probs
        .iter()
        .zip(log_likelihoods.row(0).iter())
        .zip(log_beta.iter())
        .map(|((p, l), b)| p.ln() + l + b)
        .collect();
    let local = log_sum_exp(&closing);
    if !local.is_finite() {
        return Err(Error::DegenerateLikelihood { timestep: 0 });
    }
    log_normalizer += local;

    debug!(
        num_timesteps,
        num_states, log_normalizer, "backward filter complete"
    );
    Ok(BackwardOutput {
        log_normalizer,
        backward_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::filter::hmm_filter;
    use ndarray::array;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn normalizer_matches_forward_filter() {
        let pi = array![0.2, 0.5, 0.3];
        let a = array![[0.8, 0.1, 0.1], [0.2, 0.6, 0.2], [0.0, 0.3, 0.7]];
        let ll = array![
            [-1.0, -2.0, -0.5],
            [-0.3, -4.0, -1.5],
            [-2.2, -0.1, -0.9],
            [-1.7, -1.1, -3.0],
        ];
        let fwd = hmm_filter(pi.view(), &a, ll.view()).unwrap();
        let bwd = hmm_backward_filter(pi.view(), &a, ll.view()).unwrap();
        assert!(approx_eq(fwd.log_normalizer, bwd.log_normalizer, 1e-10));
    }

    #[test]
    fn terminal_message_is_ones_and_others_normalized() {
        let pi = array![0.5, 0.5];
        let a = array![[0.95, 0.05], [0.10, 0.90]];
        let ll = array![[-1.0, -2.0], [-0.5, -0.7], [-3.0, -0.1]];
        let bwd = hmm_backward_filter(pi.view(), &a, ll.view()).unwrap();
        assert_eq!(bwd.backward_messages.row(2), array![1.0, 1.0].view());
        for t in 0..2 {
            assert!(approx_eq(bwd.backward_messages.row(t).sum(), 1.0, 1e-12));
        }
    }

    #[test]
    fn single_timestep_closes_with_initial() {
        let pi = array![0.25, 0.75];
        let a = array![[0.5, 0.5], [0.5, 0.5]];
        let ll = array![[0.0, 2.0f64.ln()]];
        let bwd = hmm_backward_filter(pi.view(), &a, ll.view()).unwrap();
        assert!(approx_eq(bwd.log_normalizer, (0.25 + 0.75 * 2.0f64).ln(), 1e-12));
    }

    #[test]
    fn empty_sequence() {
        let pi = array![1.0];
        let a = array![[1.0]];
        let ll = Array2::zeros((0, 1));
        let bwd = hmm_backward_filter(pi.view(), &a, ll.view()).unwrap();
        assert_eq!(bwd.log_normalizer, 0.0);
        assert_eq!(bwd.backward_messages.dim(), (0, 1));
    }

    #[test]
    fn impossible_future_is_an_error() {
        let pi = array![0.5, 0.5];
        let a = array![[0.9, 0.1], [0.1, 0.9]];
        let ll = array![[0.0, 0.0], [0.0, 0.0], [f64::NEG_INFINITY, f64::NEG_INFINITY]];
        let err = hmm_backward_filter(pi.view(), &a, ll.view()).unwrap_err();
        assert!(matches!(err, Error::DegenerateLikelihood { timestep: 2 }));
    }
}
