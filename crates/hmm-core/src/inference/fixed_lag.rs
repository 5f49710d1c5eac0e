//! Fixed-lag smoothing.
//!
//! The smoother keeps the last `lag + 1` filtered marginals. Once timestep
//! `t + lag` has been filtered, an RTS sweep confined to the window yields
//!   p(z_t | y_{0:t+lag})
//! and timestep `t` leaves the window. With `lag = 0` this is plain
//! filtering; with `lag >= T` every estimate is the full smoothed marginal.

use std::collections::VecDeque;

use hmm_math::log_vecmat;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::inference::filter::condition_on;
use crate::inference::model::{check_shapes, check_transition_states, LogTransitions, TransitionModel};
use crate::inference::posterior::Posterior;
use crate::inference::smoother::rts_backward_step;

/// A smoothed estimate leaving the lag window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaggedEstimate {
    /// Index of the estimated step.
    pub timestep: usize,
    /// p(z_timestep | y_{0:timestep}).
    pub filtered: Array1<f64>,
    /// p(z_timestep | y_{0:timestep-1}); the initial distribution at step 0.
    pub predicted: Array1<f64>,
    /// p(z_timestep | y_{0:timestep+lag}), truncated at the last observation.
    pub smoothed: Array1<f64>,
}

struct WindowEntry {
    timestep: usize,
    filtered: Array1<f64>,
    predicted: Array1<f64>,
}

/// Online fixed-lag smoother over a stream of log-likelihood rows.
pub struct FixedLagSmoother<'a, M: TransitionModel + ?Sized> {
    transitions: &'a M,
    log_transitions: LogTransitions<'a, M>,
    initial_probs: Array1<f64>,
    lag: usize,
    window: VecDeque<WindowEntry>,
    /// α_{t-1}; survives eviction from the window.
    last_filtered: Option<Array1<f64>>,
    steps: usize,
    log_normalizer: f64,
}

impl<'a, M: TransitionModel + ?Sized> FixedLagSmoother<'a, M> {
    /// Start a smoother. Time-varying transitions bound the stream length.
    pub fn new(initial_probs: ArrayView1<'_, f64>, transitions: &'a M, lag: usize) -> Result<Self> {
        let num_states = initial_probs.len();
        // Step count is checked as rows arrive.
        check_transition_states(transitions, num_states)?;
        Ok(Self {
            transitions,
            log_transitions: LogTransitions::new(transitions),
            initial_probs: initial_probs.to_owned(),
            lag,
            window: VecDeque::with_capacity(lag.saturating_add(1).min(1024)),
            last_filtered: None,
            steps: 0,
            log_normalizer: 0.0,
        })
    }

    /// Configured lag.
    pub fn lag(&self) -> usize {
        self.lag
    }

    /// log p(y_{0:t}) over every row pushed so far.
    pub fn log_normalizer(&self) -> f64 {
        self.log_normalizer
    }

    /// Number of rows pushed so far.
    pub fn num_timesteps(&self) -> usize {
        self.steps
    }

    /// Filter one more observation. Returns the estimate for `t - lag` once
    /// it is final.
    pub fn push(&mut self, log_likelihoods: ArrayView1<'_, f64>) -> Result<Option<LaggedEstimate>> {
        let num_states = self.initial_probs.len();
        if log_likelihoods.len() != num_states {
            return Err(Error::shape("log-likelihood row", num_states, log_likelihoods.len()));
        }
        if num_states == 0 {
            return Err(Error::EmptyStateSpace {
                num_timesteps: self.steps + 1,
            });
        }
        let t = self.steps;
        let predicted = match &self.last_filtered {
            None => self.initial_probs.clone(),
            Some(prev) => {
                if let Some(steps) = self.transitions.num_steps() {
                    if t > steps {
                        return Err(Error::shape("transition steps", t, steps));
                    }
                }
                log_vecmat(prev.mapv(f64::ln).view(), self.log_transitions.at(t - 1).view())
                    .mapv(f64::exp)
            }
        };
        let (filtered, local) = condition_on(predicted.mapv(f64::ln).view(), log_likelihoods, t)?;
        self.log_normalizer += local;
        self.steps += 1;
        self.last_filtered = Some(filtered.clone());
        self.window.push_back(WindowEntry {
            timestep: t,
            filtered,
            predicted,
        });
        trace!(timestep = t, window = self.window.len(), "fixed-lag push");

        if self.window.len() > self.lag {
            // Window now spans [t - lag, t].
            let smoothed = self.smooth_window()?;
            let oldest = self.window.pop_front();
            return Ok(oldest.zip(smoothed.into_iter().next()).map(|(entry, smoothed)| {
                LaggedEstimate {
                    timestep: entry.timestep,
                    filtered: entry.filtered,
                    predicted: entry.predicted,
                    smoothed,
                }
            }));
        }
        Ok(None)
    }

    /// Flush the window at the end of the stream.
    pub fn finish(self) -> Result<Vec<LaggedEstimate>> {
        let smoothed = self.smooth_window()?;
        debug!(
            num_timesteps = self.steps,
            lag = self.lag,
            log_normalizer = self.log_normalizer,
            "fixed-lag smoother finished"
        );
        Ok(self
            .window
            .into_iter()
            .zip(smoothed)
            .map(|(entry, smoothed)| LaggedEstimate {
                timestep: entry.timestep,
                filtered: entry.filtered,
                predicted: entry.predicted,
                smoothed,
            })
            .collect())
    }

    /// RTS over the current window, newest entry taken as already smoothed.
    fn smooth_window(&self) -> Result<Vec<Array1<f64>>> {
        let Some(newest) = self.window.back() else {
            return Ok(Vec::new());
        };
        let mut smoothed = vec![newest.filtered.clone(); self.window.len()];
        for idx in (0..self.window.len() - 1).rev() {
            let entry = &self.window[idx];
            let next = &self.window[idx + 1];
            smoothed[idx] = rts_backward_step(
                entry.filtered.view(),
                next.predicted.view(),
                smoothed[idx + 1].view(),
                self.log_transitions.at(entry.timestep).view(),
                entry.timestep,
            )?;
        }
        Ok(smoothed)
    }
}

/// Batch fixed-lag smoothing: `smoothed_probs[t] = p(z_t | y_{0:min(t+lag, T-1)})`.
pub fn hmm_fixed_lag_smoother<M: TransitionModel + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
    lag: usize,
) -> Result<Posterior> {
    let (num_timesteps, num_states) = check_shapes(initial_probs, transitions, log_likelihoods)
        .map(|dims| (dims.num_timesteps, dims.num_states))?;

    let mut smoother = FixedLagSmoother::new(initial_probs, transitions, lag)?;
    let mut estimates = Vec::with_capacity(num_timesteps);
    for row in log_likelihoods.rows() {
        estimates.extend(smoother.push(row)?);
    }
    let marginal_log_lkhd = smoother.log_normalizer();
    estimates.extend(smoother.finish()?);

    let mut filtered_probs = Array2::zeros((num_timesteps, num_states));
    let mut predicted_probs = Array2::zeros((num_timesteps, num_states));
    let mut smoothed_probs = Array2::zeros((num_timesteps, num_states));
    for est in estimates {
        filtered_probs.row_mut(est.timestep).assign(&est.filtered);
        predicted_probs.row_mut(est.timestep).assign(&est.predicted);
        smoothed_probs.row_mut(est.timestep).assign(&est.smoothed);
    }
    Ok(Posterior {
        marginal_log_lkhd,
        filtered_probs,
        predicted_probs,
        smoothed_probs,
        bwd_filter_probs: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::filter::hmm_filter;
    use crate::inference::model::TimeVaryingTransitions;
    use crate::inference::smoother::hmm_smoother;
    use ndarray::{array, s};

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn model() -> (Array1<f64>, Array2<f64>, Array2<f64>) {
        let pi = array![0.6, 0.3, 0.1];
        let a = array![[0.8, 0.15, 0.05], [0.1, 0.7, 0.2], [0.25, 0.25, 0.5]];
        let ll = array![
            [-0.5, -1.2, -3.0],
            [-2.0, -0.3, -0.9],
            [-1.1, -1.1, -0.2],
            [-0.1, -2.5, -1.7],
            [-0.8, -0.6, -2.2],
            [-3.0, -0.4, -0.7],
        ];
        (pi, a, ll)
    }

    #[test]
    fn zero_lag_is_filtering() {
        let (pi, a, ll) = model();
        let fl = hmm_fixed_lag_smoother(pi.view(), &a, ll.view(), 0).unwrap();
        let f = hmm_filter(pi.view(), &a, ll.view()).unwrap();
        for (x, y) in fl.smoothed_probs.iter().zip(f.filtered_probs.iter()) {
            assert!(approx_eq(*x, *y, 1e-12));
        }
        assert!(approx_eq(fl.marginal_log_lkhd, f.log_normalizer, 1e-12));
    }

    #[test]
    fn zero_lag_predicts_from_previous_step() {
        let (pi, a, ll) = model();
        let fl = hmm_fixed_lag_smoother(pi.view(), &a, ll.view(), 0).unwrap();
        let f = hmm_filter(pi.view(), &a, ll.view()).unwrap();
        for ((x, y), z) in fl
            .filtered_probs
            .iter()
            .zip(f.filtered_probs.iter())
            .zip(fl.smoothed_probs.iter())
        {
            assert!(approx_eq(*x, *y, 1e-12));
            assert!(approx_eq(*z, *y, 1e-12));
        }
        for (x, y) in fl.predicted_probs.iter().zip(f.predicted_probs.iter()) {
            assert!(approx_eq(*x, *y, 1e-12));
        }
        // Every step after the first must move off π.
        assert!((1..ll.nrows()).all(|t| fl.predicted_probs.row(t) != pi));
    }

    #[test]
    fn zero_lag_online_emits_every_push() {
        let (pi, a, ll) = model();
        let f = hmm_filter(pi.view(), &a, ll.view()).unwrap();
        let mut smoother = FixedLagSmoother::new(pi.view(), &a, 0).unwrap();
        for t in 0..ll.nrows() {
            let est = smoother.push(ll.row(t)).unwrap().unwrap();
            assert_eq!(est.timestep, t);
            for k in 0..3 {
                assert!(approx_eq(est.predicted[k], f.predicted_probs[[t, k]], 1e-12));
                assert!(approx_eq(est.smoothed[k], f.filtered_probs[[t, k]], 1e-12));
            }
        }
        assert!(approx_eq(smoother.log_normalizer(), f.log_normalizer, 1e-12));
        assert!(smoother.finish().unwrap().is_empty());
    }

    #[test]
    fn zero_lag_checks_time_varying_step_count() {
        let (pi, a, ll) = model();
        let stack = TimeVaryingTransitions::repeat(a.view(), 2).unwrap();
        let mut smoother = FixedLagSmoother::new(pi.view(), &stack, 0).unwrap();
        for t in 0..3 {
            assert!(smoother.push(ll.row(t)).unwrap().is_some());
        }
        let err = smoother.push(ll.row(3)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn lag_beyond_length_is_full_smoothing() {
        let (pi, a, ll) = model();
        let full = hmm_smoother(pi.view(), &a, ll.view()).unwrap();
        for lag in [6, 10, usize::MAX] {
            let fl = hmm_fixed_lag_smoother(pi.view(), &a, ll.view(), lag).unwrap();
            for (x, y) in fl.smoothed_probs.iter().zip(full.smoothed_probs.iter()) {
                assert!(approx_eq(*x, *y, 1e-12));
            }
        }
    }

    #[test]
    fn intermediate_lag_smooths_over_truncated_future() {
        let (pi, a, ll) = model();
        let lag = 2;
        let fl = hmm_fixed_lag_smoother(pi.view(), &a, ll.view(), lag).unwrap();
        let num_timesteps = ll.nrows();
        for t in 0..num_timesteps {
            let horizon = (t + lag).min(num_timesteps - 1);
            let prefix = ll.slice(s![..=horizon, ..]);
            let reference = hmm_smoother(pi.view(), &a, prefix).unwrap();
            for k in 0..3 {
                assert!(approx_eq(fl.smoothed_probs[[t, k]], reference.smoothed_probs[[t, k]], 1e-12));
            }
        }
    }

    #[test]
    fn online_emits_after_lag() {
        let (pi, a, ll) = model();
        let mut smoother = FixedLagSmoother::new(pi.view(), &a, 2).unwrap();
        assert!(smoother.push(ll.row(0)).unwrap().is_none());
        assert!(smoother.push(ll.row(1)).unwrap().is_none());
        let first = smoother.push(ll.row(2)).unwrap().unwrap();
        assert_eq!(first.timestep, 0);
        let tail = smoother.finish().unwrap();
        assert_eq!(tail.iter().map(|e| e.timestep).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn rejects_wrong_row_length() {
        let (pi, a, _) = model();
        let mut smoother = FixedLagSmoother::new(pi.view(), &a, 1).unwrap();
        let err = smoother.push(array![0.0, 0.0].view()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
