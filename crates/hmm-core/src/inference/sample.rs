//! Ancestral sampling of whole state trajectories from the exact posterior.
//!
//! Forward filter once, then sample backwards:
//!   z_{T-1} ~ α_{T-1},
//!   z_t | z_{t+1} = s ~ α_t[i] · A_t[i, s] (normalized over i).
//!
//! The random source is always supplied by the caller.

use ndarray::{ArrayView1, ArrayView2};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::inference::filter::{hmm_filter, FilterOutput};
use crate::inference::model::{check_transitions, TransitionModel};

/// One posterior draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSample {
    /// log p(y_{0:T-1}) from the forward pass used for sampling.
    pub log_normalizer: f64,
    /// Sampled state per timestep.
    pub states: Vec<usize>,
}

/// Several independent draws sharing one forward pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PosteriorSamples {
    /// log p(y_{0:T-1}) from the shared forward pass.
    pub log_normalizer: f64,
    /// One length-T state path per draw.
    pub trajectories: Vec<Vec<usize>>,
}

fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    weights: impl IntoIterator<Item = f64>,
    timestep: usize,
) -> Result<usize> {
    let dist =
        WeightedIndex::new(weights).map_err(|_| Error::DegenerateLikelihood { timestep })?;
    Ok(dist.sample(rng))
}

/// Draw one trajectory given a completed forward pass.
pub fn sample_from_filter<R, M>(
    rng: &mut R,
    filter: &FilterOutput,
    transitions: &M,
) -> Result<Vec<usize>>
where
    R: Rng + ?Sized,
    M: TransitionModel + ?Sized,
{
    let num_timesteps = filter.num_timesteps();
    check_transitions(transitions, filter.num_states(), num_timesteps)?;
    if num_timesteps == 0 {
        return Ok(Vec::new());
    }

    let last = num_timesteps - 1;
    let mut states = vec![0; num_timesteps];
    states[last] = draw(rng, filter.filtered_probs.row(last).iter().copied(), last)?;
    for t in (0..last).rev() {
        let next = states[t + 1];
        let a = transitions.matrix(t);
        let weights = filter
            .filtered_probs
            .row(t)
            .iter()
            .zip(a.column(next).iter())
            .map(|(f, p)| f * p)
            .collect::<Vec<_>>();
        states[t] = draw(rng, weights, t)?;
    }
    Ok(states)
}

/// Draw one trajectory from p(z_{0:T-1} | y_{0:T-1}).
pub fn hmm_posterior_sample<R, M>(
    rng: &mut R,
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<PosteriorSample>
where
    R: Rng + ?Sized,
    M: TransitionModel + ?Sized,
{
    let filter = hmm_filter(initial_probs, transitions, log_likelihoods)?;
    let states = sample_from_filter(rng, &filter, transitions)?;
    Ok(PosteriorSample {
        log_normalizer: filter.log_normalizer,
        states,
    })
}

/// Draw `num_samples` independent trajectories.
pub fn hmm_posterior_samples<R, M>(
    rng: &mut R,
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
    num_samples: usize,
) -> Result<PosteriorSamples>
where
    R: Rng + ?Sized,
    M: TransitionModel + ?Sized,
{
    let filter = hmm_filter(initial_probs, transitions, log_likelihoods)?;
    let trajectories = (0..num_samples)
        .map(|_| sample_from_filter(rng, &filter, transitions))
        .collect::<Result<Vec<_>>>()?;
    debug!(num_samples, "posterior sampling complete");
    Ok(PosteriorSamples {
        log_normalizer: filter.log_normalizer,
        trajectories,
    })
}
