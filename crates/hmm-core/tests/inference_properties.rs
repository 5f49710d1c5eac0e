//! Property-based tests for hmm-core inference.
//!
//! Small random models are checked against brute-force enumeration over all
//! K^T state sequences, and the different formulations against each other.

use hmm_core::{
    compute_transition_probs, hmm_backward_filter, hmm_filter, hmm_fixed_lag_smoother, hmm_smoother,
    hmm_two_filter_smoother, hmm_viterbi, parallel_hmm_filter, parallel_hmm_smoother, ScanSchedule,
    TimeVaryingTransitions,
};
use hmm_math::log_sum_exp;
use ndarray::{s, Array1, Array2, Array3};
use proptest::collection::vec;
use proptest::prelude::*;

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-9;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

fn all_close(a: &Array2<f64>, b: &Array2<f64>, tol: f64) -> bool {
    a.dim() == b.dim() && a.iter().zip(b.iter()).all(|(x, y)| approx_eq(*x, *y, tol))
}

/// Random model: strictly positive π and A, finite log-likelihoods.
#[derive(Debug, Clone)]
struct Model {
    pi: Array1<f64>,
    a: Array2<f64>,
    ll: Array2<f64>,
}

impl Model {
    fn num_states(&self) -> usize {
        self.pi.len()
    }

    fn num_timesteps(&self) -> usize {
        self.ll.nrows()
    }

    /// log p(z, y) for one state sequence.
    fn log_joint(&self, states: &[usize]) -> f64 {
        let mut lp = self.pi[states[0]].ln() + self.ll[[0, states[0]]];
        for t in 1..states.len() {
            lp += self.a[[states[t - 1], states[t]]].ln() + self.ll[[t, states[t]]];
        }
        lp
    }

    /// Every state sequence with its log joint.
    fn enumerate(&self) -> Vec<(Vec<usize>, f64)> {
        let k = self.num_states();
        let t = self.num_timesteps();
        let total = k.pow(t as u32);
        (0..total)
            .map(|mut code| {
                let mut states = vec![0; t];
                for slot in states.iter_mut().rev() {
                    *slot = code % k;
                    code /= k;
                }
                let lp = self.log_joint(&states);
                (states, lp)
            })
            .collect()
    }
}

fn normalized(weights: Vec<f64>) -> Array1<f64> {
    let total: f64 = weights.iter().sum();
    Array1::from(weights) / total
}

fn normalized_rows(weights: Vec<f64>, k: usize) -> Array2<f64> {
    let mut m = Array2::from_shape_vec((k, k), weights).unwrap();
    for mut row in m.rows_mut() {
        let total = row.sum();
        row.mapv_inplace(|x| x / total);
    }
    m
}

fn model_strategy(max_states: usize, max_timesteps: usize) -> impl Strategy<Value = Model> {
    (1..=max_states, 1..=max_timesteps).prop_flat_map(|(k, t)| {
        (
            vec(0.05..1.0f64, k),
            vec(0.05..1.0f64, k * k),
            vec(-6.0..0.0f64, t * k),
        )
            .prop_map(move |(pi, a, ll)| Model {
                pi: normalized(pi),
                a: normalized_rows(a, k),
                ll: Array2::from_shape_vec((t, k), ll).unwrap(),
            })
    })
}

// ============================================================================
// Normalizer
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The forward normalizer is the log-sum of every joint.
    #[test]
    fn normalizer_matches_enumeration(m in model_strategy(3, 5)) {
        let joints: Vec<f64> = m.enumerate().into_iter().map(|(_, lp)| lp).collect();
        let expected = log_sum_exp(&joints);
        let out = hmm_filter(m.pi.view(), &m.a, m.ll.view()).unwrap();
        prop_assert!(approx_eq(out.log_normalizer, expected, TOL),
            "filter {} vs enumeration {}", out.log_normalizer, expected);
    }

    /// Forward and backward passes agree on the normalizer.
    #[test]
    fn backward_normalizer_matches_forward(m in model_strategy(4, 8)) {
        let fwd = hmm_filter(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let bwd = hmm_backward_filter(m.pi.view(), &m.a, m.ll.view()).unwrap();
        prop_assert!(approx_eq(fwd.log_normalizer, bwd.log_normalizer, TOL));
    }

    /// With one state the normalizer is the summed log-likelihood.
    #[test]
    fn single_state_normalizer(ll in vec(-10.0..0.0f64, 1..12)) {
        let t = ll.len();
        let expected: f64 = ll.iter().sum();
        let ll = Array2::from_shape_vec((t, 1), ll).unwrap();
        let pi = Array1::ones(1);
        let a = Array2::ones((1, 1));
        let post = hmm_two_filter_smoother(pi.view(), &a, ll.view()).unwrap();
        prop_assert!(approx_eq(post.marginal_log_lkhd, expected, TOL));
        prop_assert!(post.smoothed_probs.iter().all(|p| approx_eq(*p, 1.0, TOL)));
    }
}

// ============================================================================
// Smoothing
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Smoothed marginals equal the enumerated posterior marginals.
    #[test]
    fn smoothed_matches_enumeration(m in model_strategy(3, 5)) {
        let table = m.enumerate();
        let log_z = log_sum_exp(&table.iter().map(|(_, lp)| *lp).collect::<Vec<_>>());
        let mut expected = Array2::zeros((m.num_timesteps(), m.num_states()));
        for (states, lp) in &table {
            let w = (lp - log_z).exp();
            for (t, &z) in states.iter().enumerate() {
                expected[[t, z]] += w;
            }
        }
        let post = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        prop_assert!(all_close(&post.smoothed_probs, &expected, 1e-8));
    }

    /// Two-filter and RTS smoothers agree.
    #[test]
    fn two_filter_matches_rts(m in model_strategy(4, 10)) {
        let two = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let rts = hmm_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        prop_assert!(all_close(&two.smoothed_probs, &rts.smoothed_probs, TOL));
        prop_assert!(all_close(&two.filtered_probs, &rts.filtered_probs, TOL));
    }

    /// The last smoothed row is the last filtered row.
    #[test]
    fn smoothed_ends_at_filtered(m in model_strategy(4, 10)) {
        let post = hmm_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let last = m.num_timesteps() - 1;
        for k in 0..m.num_states() {
            prop_assert!(approx_eq(post.smoothed_probs[[last, k]], post.filtered_probs[[last, k]], TOL));
        }
    }

    /// Every marginal row sums to one.
    #[test]
    fn marginals_are_distributions(m in model_strategy(4, 10)) {
        let post = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        for probs in [&post.filtered_probs, &post.predicted_probs, &post.smoothed_probs] {
            for row in probs.rows() {
                prop_assert!(approx_eq(row.sum(), 1.0, TOL));
                prop_assert!(row.iter().all(|p| *p >= 0.0));
            }
        }
    }

    /// A time-varying stack repeating A behaves like stationary A.
    #[test]
    fn repeated_stack_matches_stationary(m in model_strategy(3, 8)) {
        let steps = m.num_timesteps() - 1;
        let tv = TimeVaryingTransitions::repeat(m.a.view(), steps).unwrap();
        let stationary = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let varying = hmm_two_filter_smoother(m.pi.view(), &tv, m.ll.view()).unwrap();
        prop_assert!(approx_eq(stationary.marginal_log_lkhd, varying.marginal_log_lkhd, TOL));
        prop_assert!(all_close(&stationary.smoothed_probs, &varying.smoothed_probs, TOL));
    }
}

// ============================================================================
// Parallel scans
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every scan schedule reproduces the sequential filter on every prefix.
    #[test]
    fn parallel_filter_matches_sequential(m in model_strategy(3, 12)) {
        for end in 1..=m.num_timesteps() {
            let prefix = m.ll.slice(s![..end, ..]);
            let seq = hmm_filter(m.pi.view(), &m.a, prefix).unwrap();
            for schedule in ScanSchedule::ALL {
                let par = parallel_hmm_filter(m.pi.view(), &m.a, prefix, schedule).unwrap();
                prop_assert!(approx_eq(seq.log_normalizer, par.log_normalizer, TOL),
                    "{schedule} prefix {end}: {} vs {}", seq.log_normalizer, par.log_normalizer);
                prop_assert!(all_close(&seq.filtered_probs, &par.filtered_probs, TOL));
                prop_assert!(all_close(&seq.predicted_probs, &par.predicted_probs, TOL));
            }
        }
    }

    /// The parallel smoother matches the sequential two-filter smoother.
    #[test]
    fn parallel_smoother_matches_sequential(m in model_strategy(4, 12)) {
        let seq = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        for schedule in ScanSchedule::ALL {
            let par = parallel_hmm_smoother(m.pi.view(), &m.a, m.ll.view(), schedule).unwrap();
            prop_assert!(approx_eq(seq.marginal_log_lkhd, par.marginal_log_lkhd, TOL));
            prop_assert!(all_close(&seq.smoothed_probs, &par.smoothed_probs, TOL));
        }
    }
}

// ============================================================================
// Transition probabilities
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Expected transitions match enumeration and sum to T-1.
    #[test]
    fn transition_probs_match_enumeration(m in model_strategy(3, 5)) {
        let table = m.enumerate();
        let log_z = log_sum_exp(&table.iter().map(|(_, lp)| *lp).collect::<Vec<_>>());
        let k = m.num_states();
        let steps = m.num_timesteps() - 1;
        let mut expected = Array3::<f64>::zeros((steps, k, k));
        for (states, lp) in &table {
            let w = (lp - log_z).exp();
            for t in 0..steps {
                expected[[t, states[t], states[t + 1]]] += w;
            }
        }

        let post = hmm_two_filter_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let per_step = compute_transition_probs(&m.a, &post, false).unwrap();
        let xi = per_step.per_step().unwrap();
        prop_assert_eq!(xi.dim(), expected.dim());
        for (x, y) in xi.iter().zip(expected.iter()) {
            prop_assert!(approx_eq(*x, *y, 1e-8));
        }

        let summed = compute_transition_probs(&m.a, &post, true).unwrap().summed();
        prop_assert!(approx_eq(summed.sum(), steps as f64, 1e-8));
    }
}

// ============================================================================
// Fixed lag
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Lag 0 is the filter; a lag covering the sequence is the full smoother.
    #[test]
    fn fixed_lag_limits(m in model_strategy(3, 8)) {
        let filter = hmm_filter(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let zero = hmm_fixed_lag_smoother(m.pi.view(), &m.a, m.ll.view(), 0).unwrap();
        prop_assert!(all_close(&zero.smoothed_probs, &filter.filtered_probs, TOL));
        prop_assert!(approx_eq(zero.marginal_log_lkhd, filter.log_normalizer, TOL));

        let full = hmm_smoother(m.pi.view(), &m.a, m.ll.view()).unwrap();
        let long = hmm_fixed_lag_smoother(m.pi.view(), &m.a, m.ll.view(), m.num_timesteps()).unwrap();
        prop_assert!(all_close(&long.smoothed_probs, &full.smoothed_probs, TOL));
    }

    /// Each lagged row equals the full smoother run on the truncated sequence.
    #[test]
    fn fixed_lag_matches_truncated_smoother(m in model_strategy(3, 8), lag in 0usize..4) {
        let t_total = m.num_timesteps();
        let lagged = hmm_fixed_lag_smoother(m.pi.view(), &m.a, m.ll.view(), lag).unwrap();
        for t in 0..t_total {
            let end = (t + lag + 1).min(t_total);
            let truncated = hmm_smoother(m.pi.view(), &m.a, m.ll.slice(s![..end, ..])).unwrap();
            for k in 0..m.num_states() {
                prop_assert!(approx_eq(lagged.smoothed_probs[[t, k]], truncated.smoothed_probs[[t, k]], TOL));
            }
        }
    }
}

// ============================================================================
// Viterbi
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The Viterbi path attains the maximum joint over every sequence.
    #[test]
    fn viterbi_attains_enumerated_maximum(m in model_strategy(3, 5)) {
        let best = m
            .enumerate()
            .into_iter()
            .map(|(_, lp)| lp)
            .fold(f64::NEG_INFINITY, f64::max);
        let path = hmm_viterbi(m.pi.view(), &m.a, m.ll.view()).unwrap();
        prop_assert_eq!(path.states.len(), m.num_timesteps());
        prop_assert!(approx_eq(path.log_joint, best, TOL));
        prop_assert!(approx_eq(m.log_joint(&path.states), best, TOL));
    }

    /// Flat models decode to state 0 everywhere.
    #[test]
    fn viterbi_ties_pick_lowest_index(k in 1usize..5, t in 1usize..8) {
        let pi = Array1::from_elem(k, 1.0 / k as f64);
        let a = Array2::from_elem((k, k), 1.0 / k as f64);
        let ll = Array2::zeros((t, k));
        let path = hmm_viterbi(pi.view(), &a, ll.view()).unwrap();
        prop_assert_eq!(path.states, vec![0; t]);
    }
}
