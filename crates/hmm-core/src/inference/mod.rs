//! Exact inference for discrete-state hidden Markov models.
//!
//! Every routine takes the same three numeric inputs: an initial
//! distribution `π` (K), a [`TransitionModel`] (one K×K matrix or a stack of
//! T-1), and a T×K matrix of log-likelihoods. All combination happens in log
//! space through `hmm_math`.
//!
//! Sequential routines:
//! - [`hmm_filter`]: forward pass, log normalizer, filtered and predicted marginals
//! - [`hmm_backward_filter`]: normalized backward messages
//! - [`hmm_two_filter_smoother`] / [`hmm_smoother`]: smoothed marginals
//! - [`compute_transition_probs`]: expected adjacent-state joints
//! - [`hmm_posterior_mode`]: Viterbi path
//! - [`hmm_posterior_sample`]: exact trajectory draws
//! - [`hmm_fixed_lag_smoother`] / [`FixedLagSmoother`]: lag-bounded smoothing
//!
//! The [`parallel`] module recomputes filtering and smoothing with
//! associative scans.

pub mod backward;
pub mod filter;
pub mod fixed_lag;
pub mod mode;
pub mod model;
pub mod parallel;
pub mod posterior;
pub mod sample;
pub mod smoother;
pub mod transitions;

pub use backward::{hmm_backward_filter, BackwardOutput};
pub use filter::{hmm_filter, FilterOutput};
pub use fixed_lag::{hmm_fixed_lag_smoother, FixedLagSmoother, LaggedEstimate};
pub use mode::{hmm_posterior_mode, hmm_viterbi, ViterbiPath};
pub use model::{
    check_shapes, validate_distributions, Dims, LogLikelihoodModel, TimeVaryingTransitions,
    TransitionModel,
};
pub use parallel::{parallel_hmm_filter, parallel_hmm_smoother, FilterElement, ScanSchedule};
pub use posterior::Posterior;
pub use sample::{
    hmm_posterior_sample, hmm_posterior_samples, sample_from_filter, PosteriorSample,
    PosteriorSamples,
};
pub use smoother::{hmm_smoother, hmm_two_filter_smoother};
pub use transitions::{compute_transition_probs, TransitionProbs};
