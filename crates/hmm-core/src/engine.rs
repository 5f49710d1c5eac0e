//! Configured entry point over the inference routines.
//!
//! The free functions in [`crate::inference`] never validate distributions
//! and always run a fixed formulation. [`HmmEngine`] picks the formulation
//! from an [`InferenceConfig`] and optionally validates `π` and `A` first.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use tracing::debug;

use crate::config::{Backend, InferenceConfig, SmootherKind};
use crate::error::Result;
use crate::inference::{
    check_shapes, compute_transition_probs, hmm_filter, hmm_fixed_lag_smoother, hmm_posterior_sample,
    hmm_smoother, hmm_two_filter_smoother, hmm_viterbi, parallel_hmm_filter, parallel_hmm_smoother,
    validate_distributions, FilterOutput, Posterior, PosteriorSample, TransitionModel,
    TransitionProbs, ViterbiPath,
};

/// Inference façade carrying an [`InferenceConfig`].
#[derive(Debug, Clone, Default)]
pub struct HmmEngine {
    config: InferenceConfig,
}

impl HmmEngine {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn preflight<M: TransitionModel + ?Sized>(
        &self,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<()> {
        let dims = check_shapes(initial_probs, transitions, log_likelihoods)?;
        if self.config.validate_distributions {
            validate_distributions(
                initial_probs,
                transitions,
                dims.num_timesteps,
                self.config.tolerance,
            )?;
        }
        debug!(
            num_timesteps = dims.num_timesteps,
            num_states = dims.num_states,
            backend = %self.config.backend,
            "inputs accepted"
        );
        Ok(())
    }

    /// Filtered-only posterior.
    pub fn filter<M: TransitionModel + Sync + ?Sized>(
        &self,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<FilterOutput> {
        self.preflight(initial_probs, transitions, log_likelihoods)?;
        match self.config.backend {
            Backend::Sequential => hmm_filter(initial_probs, transitions, log_likelihoods),
            Backend::Parallel => parallel_hmm_filter(
                initial_probs,
                transitions,
                log_likelihoods,
                self.config.schedule,
            ),
        }
    }

    /// Full smoothed posterior.
    pub fn smoother<M: TransitionModel + Sync + ?Sized>(
        &self,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<Posterior> {
        self.preflight(initial_probs, transitions, log_likelihoods)?;
        match (self.config.backend, self.config.smoother) {
            (Backend::Parallel, _) => parallel_hmm_smoother(
                initial_probs,
                transitions,
                log_likelihoods,
                self.config.schedule,
            ),
            (Backend::Sequential, SmootherKind::TwoFilter) => {
                hmm_two_filter_smoother(initial_probs, transitions, log_likelihoods)
            }
            (Backend::Sequential, SmootherKind::Rts) => {
                hmm_smoother(initial_probs, transitions, log_likelihoods)
            }
        }
    }

    /// Viterbi path.
    pub fn posterior_mode<M: TransitionModel + ?Sized>(
        &self,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<ViterbiPath> {
        self.preflight(initial_probs, transitions, log_likelihoods)?;
        hmm_viterbi(initial_probs, transitions, log_likelihoods)
    }

    /// One exact posterior trajectory.
    pub fn sample<R, M>(
        &self,
        rng: &mut R,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
    ) -> Result<PosteriorSample>
    where
        R: Rng + ?Sized,
        M: TransitionModel + ?Sized,
    {
        self.preflight(initial_probs, transitions, log_likelihoods)?;
        hmm_posterior_sample(rng, initial_probs, transitions, log_likelihoods)
    }

    /// Fixed-lag smoothed posterior.
    pub fn fixed_lag_smoother<M: TransitionModel + ?Sized>(
        &self,
        initial_probs: ArrayView1<'_, f64>,
        transitions: &M,
        log_likelihoods: ArrayView2<'_, f64>,
        lag: usize,
    ) -> Result<Posterior> {
        self.preflight(initial_probs, transitions, log_likelihoods)?;
        hmm_fixed_lag_smoother(initial_probs, transitions, log_likelihoods, lag)
    }

    /// Expected transitions from a posterior produced by this engine.
    pub fn transition_probs<M: TransitionModel + ?Sized>(
        &self,
        transitions: &M,
        posterior: &Posterior,
        reduce_sum: bool,
    ) -> Result<TransitionProbs> {
        compute_transition_probs(transitions, posterior, reduce_sum)
    }
}
