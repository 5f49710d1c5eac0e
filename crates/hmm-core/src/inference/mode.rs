//! Posterior mode (Viterbi) decoding.
//!
//! Max-sum in log space with backpointers. Ties always resolve to the lowest
//! state index, both in the backpointers and in the terminal state.

use hmm_math::argmax;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::inference::model::{check_shapes, Dims, LogTransitions, TransitionModel};

/// The jointly most probable state path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViterbiPath {
    /// One state index per timestep.
    pub states: Vec<usize>,
    /// log p(z_{0:T-1} = states, y_{0:T-1}).
    pub log_joint: f64,
}

/// Run Viterbi and return the path together with its log joint probability.
pub fn hmm_viterbi<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<ViterbiPath> {
    let Dims {
        num_timesteps,
        num_states,
    } = check_shapes(initial_probs, transitions, log_likelihoods)?;
    if num_timesteps == 0 {
        return Ok(ViterbiPath {
            states: Vec::new(),
            log_joint: 0.0,
        });
    }
    let log_transitions = LogTransitions::new(transitions);

    let mut delta: Array1<f64> = &initial_probs.mapv(f64::ln) + &log_likelihoods.row(0);
    if delta.iter().all(|d| *d == f64::NEG_INFINITY) {
        return Err(Error::DegenerateLikelihood { timestep: 0 });
    }

    let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(num_timesteps - 1);
    let mut scores = vec![0.0; num_states];
    for t in 1..num_timesteps {
        let log_a = log_transitions.at(t - 1);
        let mut next = Array1::zeros(num_states);
        let mut pointers = Vec::with_capacity(num_states);
        for k in 0..num_states {
            for (i, slot) in scores.iter_mut().enumerate() {
                *slot = delta[i] + log_a[[i, k]];
            }
            let best = argmax(&scores).unwrap_or(0);
            pointers.push(best);
            next[k] = scores[best] + log_likelihoods[[t, k]];
        }
        if next.iter().all(|d| *d == f64::NEG_INFINITY) {
            return Err(Error::DegenerateLikelihood { timestep: t });
        }
        backpointers.push(pointers);
        delta = next;
    }

    let last = argmax(&delta.to_vec()).unwrap_or(0);
    let log_joint = delta[last];
    let mut states = vec![last; num_timesteps];
    for t in (0..num_timesteps - 1).rev() {
        states[t] = backpointers[t][states[t + 1]];
    }

    debug!(num_timesteps, num_states, log_joint, "viterbi decoding complete");
    Ok(ViterbiPath { states, log_joint })
}

/// Most probable joint state sequence.
pub fn hmm_posterior_mode<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<Vec<usize>> {
    hmm_viterbi(initial_probs, transitions, log_likelihoods).map(|path| path.states)
}
