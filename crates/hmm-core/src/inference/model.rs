//! Model inputs: transition capabilities, emission capabilities and input checks.
//!
//! The inference core never sees emission distributions. Collaborators hand it
//! three numeric inputs:
//! - an initial distribution over K states,
//! - a transition model (one K×K matrix, or one per step),
//! - a T×K matrix of log-likelihoods `log p(y_t | z_t = k)`.

use std::borrow::Cow;

use hmm_math::ln_matrix;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Capability: supplies the transition matrix governing step `t → t+1`.
///
/// Row `i` of [`matrix`](TransitionModel::matrix) is `P(z_{t+1} = · | z_t = i)`.
pub trait TransitionModel {
    /// Number of discrete states K.
    fn num_states(&self) -> usize;

    /// Transition matrix for the step from `t` to `t + 1`.
    fn matrix(&self, t: usize) -> ArrayView2<'_, f64>;

    /// Number of steps covered, `None` when the model is stationary.
    fn num_steps(&self) -> Option<usize> {
        None
    }
}

impl TransitionModel for Array2<f64> {
    fn num_states(&self) -> usize {
        self.nrows()
    }

    fn matrix(&self, _t: usize) -> ArrayView2<'_, f64> {
        self.view()
    }
}

/// A stack of (T-1) transition matrices; matrix `t` governs step `t → t+1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeVaryingTransitions {
    matrices: Array3<f64>,
}

impl TimeVaryingTransitions {
    /// Wrap a `(steps, K, K)` stack.
    pub fn new(matrices: Array3<f64>) -> Result<Self> {
        let (_, rows, cols) = matrices.dim();
        if rows != cols {
            return Err(Error::shape(
                "time-varying transition matrix",
                format!("{rows}x{rows}"),
                format!("{rows}x{cols}"),
            ));
        }
        Ok(Self { matrices })
    }

    /// Repeat a single matrix for `steps` steps.
    pub fn repeat(matrix: ArrayView2<'_, f64>, steps: usize) -> Result<Self> {
        let k = matrix.nrows();
        let mut matrices = Array3::zeros((steps, k, matrix.ncols()));
        for mut slot in matrices.axis_iter_mut(Axis(0)) {
            slot.assign(&matrix);
        }
        Self::new(matrices)
    }

    /// Underlying `(steps, K, K)` array.
    pub fn as_array(&self) -> &Array3<f64> {
        &self.matrices
    }
}

impl TransitionModel for TimeVaryingTransitions {
    fn num_states(&self) -> usize {
        self.matrices.dim().1
    }

    fn matrix(&self, t: usize) -> ArrayView2<'_, f64> {
        self.matrices.index_axis(Axis(0), t)
    }

    fn num_steps(&self) -> Option<usize> {
        Some(self.matrices.dim().0)
    }
}

/// Log transition matrices, computed once for stationary models.
pub(crate) enum LogTransitions<'a, M: ?Sized> {
    Stationary(Array2<f64>),
    TimeVarying(&'a M),
}

impl<'a, M: TransitionModel + ?Sized> LogTransitions<'a, M> {
    pub(crate) fn new(model: &'a M) -> Self {
        match model.num_steps() {
            None => LogTransitions::Stationary(ln_matrix(model.matrix(0))),
            Some(_) => LogTransitions::TimeVarying(model),
        }
    }

    /// `ln A_t` for the step `t → t+1`.
    pub(crate) fn at(&self, t: usize) -> Cow<'_, Array2<f64>> {
        match self {
            LogTransitions::Stationary(log_a) => Cow::Borrowed(log_a),
            LogTransitions::TimeVarying(model) => Cow::Owned(ln_matrix(model.matrix(t))),
        }
    }
}

/// Capability: produces the T×K log-likelihood matrix for a sequence of emissions.
///
/// Emission families live outside the core; they only need to implement this.
pub trait LogLikelihoodModel {
    /// One observation.
    type Emission;

    /// Number of discrete states K.
    fn num_states(&self) -> usize;

    /// Entry `(t, k)` is `log p(emissions[t] | z_t = k)`.
    fn log_likelihoods(&self, emissions: &[Self::Emission]) -> Array2<f64>;
}

/// Dimensions of a validated problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dims {
    /// Number of timesteps T.
    pub num_timesteps: usize,
    /// Number of states K.
    pub num_states: usize,
}

/// Check that the three inputs agree on K and that the transition model
/// covers every step. Never broadcasts.
pub fn check_shapes<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Result<Dims> {
    let (num_timesteps, num_states) = log_likelihoods.dim();
    if initial_probs.len() != num_states {
        return Err(Error::shape(
            "initial distribution",
            num_states,
            initial_probs.len(),
        ));
    }
    check_transitions(transitions, num_states, num_timesteps)?;
    if num_states == 0 && num_timesteps > 0 {
        return Err(Error::EmptyStateSpace { num_timesteps });
    }
    Ok(Dims {
        num_timesteps,
        num_states,
    })
}

/// Shape checks for a transition model alone.
pub(crate) fn check_transitions<M: TransitionModel + ?Sized>(
    transitions: &M,
    num_states: usize,
    num_timesteps: usize,
) -> Result<()> {
    check_transition_states(transitions, num_states)?;
    let steps_needed = num_timesteps.saturating_sub(1);
    match transitions.num_steps() {
        Some(steps) if steps != steps_needed => {
            Err(Error::shape("transition steps", steps_needed, steps))
        }
        _ => Ok(()),
    }
}

/// Check that every transition matrix is K×K, ignoring the step count.
pub(crate) fn check_transition_states<M: TransitionModel + ?Sized>(
    transitions: &M,
    num_states: usize,
) -> Result<()> {
    let expected = format!("{num_states}x{num_states}");
    if transitions.num_states() != num_states {
        let k = transitions.num_states();
        return Err(Error::shape("transition matrix", expected, format!("{k}x{k}")));
    }
    if transitions.num_steps().is_none() {
        let m = transitions.matrix(0);
        if m.dim() != (num_states, num_states) {
            return Err(Error::shape(
                "transition matrix",
                expected,
                format!("{}x{}", m.nrows(), m.ncols()),
            ));
        }
    }
    Ok(())
}

/// Check that `probs` is a distribution: non-negative, finite, summing to 1.
pub(crate) fn check_distribution(
    what: &'static str,
    index: usize,
    probs: ArrayView1<'_, f64>,
    tolerance: f64,
) -> Result<()> {
    if let Some(&value) = probs.iter().find(|p| !(p.is_finite() && **p >= 0.0)) {
        return Err(Error::NegativeProbability { what, index, value });
    }
    let sum = probs.sum();
    if (sum - 1.0).abs() > tolerance {
        return Err(Error::InvalidDistribution { what, index, sum });
    }
    Ok(())
}

/// Validate the initial distribution and every transition row.
///
/// Not run by the free inference functions; callers (or
/// [`HmmEngine`](crate::engine::HmmEngine) with validation enabled) opt in.
pub fn validate_distributions<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    num_timesteps: usize,
    tolerance: f64,
) -> Result<()> {
    if initial_probs.is_empty() {
        return Ok(());
    }
    check_distribution("initial distribution", 0, initial_probs, tolerance)?;
    let steps = match transitions.num_steps() {
        Some(steps) => steps,
        None => usize::from(num_timesteps > 1),
    };
    for t in 0..steps {
        for (i, row) in transitions.matrix(t).axis_iter(Axis(0)).enumerate() {
            check_distribution("transition matrix", i, row, tolerance)?;
        }
    }
    Ok(())
}
