//! Filtering and smoothing as associative scans.
//!
//! The forward pass is an inclusive prefix scan over [`FilterElement`]s; the
//! backward messages are a suffix scan over the same elements (without the
//! initial one), since row masses of `M_{t+1} ⋯ M_{T-1}` are exactly
//! `β_t = p(y_{t+1:T-1} | z_t)`. Results match the sequential recursions for
//! every input and every [`ScanSchedule`].

mod element;
mod scan;

pub use element::FilterElement;
pub use scan::{associative_scan, associative_scan_reverse, ScanSchedule};

use hmm_math::{log_normalize, log_vecmat};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::debug;

use crate::error::{Error, Result};
use crate::inference::filter::FilterOutput;
use crate::inference::model::{check_shapes, Dims, LogTransitions, TransitionModel};
use crate::inference::posterior::Posterior;
use scan::par_map;

fn build_elements<M: TransitionModel + Sync + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    log_transitions: &LogTransitions<'_, M>,
    log_likelihoods: ArrayView2<'_, f64>,
) -> Vec<FilterElement> {
    par_map(log_likelihoods.nrows(), |t| {
        if t == 0 {
            FilterElement::initial(initial_probs, log_likelihoods.row(0))
        } else {
            FilterElement::transition(log_transitions.at(t - 1).view(), log_likelihoods.row(t))
        }
    })
}

fn decode_filter<M: TransitionModel + Sync + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    log_transitions: &LogTransitions<'_, M>,
    elements: &[FilterElement],
    schedule: ScanSchedule,
) -> Result<FilterOutput> {
    let num_timesteps = elements.len();
    let num_states = initial_probs.len();
    let prefixes = associative_scan(elements, &FilterElement::combine, schedule);

    let mut filtered_probs = Array2::zeros((num_timesteps, num_states));
    let mut log_normalizer = 0.0;
    for (t, prefix) in prefixes.iter().enumerate() {
        // Every row of a prefix is the same filtered vector.
        log_normalizer = prefix.log_mass()[0];
        if !log_normalizer.is_finite() {
            return Err(Error::DegenerateLikelihood { timestep: t });
        }
        filtered_probs
            .row_mut(t)
            .assign(&prefix.log_cond().row(0).mapv(f64::exp));
    }

    let predicted_rows = par_map(num_timesteps, |t| {
        if t == 0 {
            initial_probs.to_owned()
        } else {
            let log_filtered = filtered_probs.row(t - 1).mapv(f64::ln);
            log_vecmat(log_filtered.view(), log_transitions.at(t - 1).view()).mapv(f64::exp)
        }
    });
    let mut predicted_probs = Array2::zeros((num_timesteps, num_states));
    for (t, row) in predicted_rows.iter().enumerate() {
        predicted_probs.row_mut(t).assign(row);
    }

    Ok(FilterOutput {
        log_normalizer,
        filtered_probs,
        predicted_probs,
    })
}

/// Forward filter computed by an associative scan.
pub fn parallel_hmm_filter<M: TransitionModel + Sync + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
    schedule: ScanSchedule,
) -> Result<FilterOutput> {
    let Dims {
        num_timesteps,
        num_states,
    } = check_shapes(initial_probs, transitions, log_likelihoods)?;
    let log_transitions = LogTransitions::new(transitions);
    let elements = build_elements(initial_probs, &log_transitions, log_likelihoods);
    let out = decode_filter(initial_probs, &log_transitions, &elements, schedule)?;
    debug!(
        num_timesteps,
        num_states,
        %schedule,
        log_normalizer = out.log_normalizer,
        "parallel filter complete"
    );
    Ok(out)
}

/// Two-filter smoother with both passes computed by associative scans.
pub fn parallel_hmm_smoother<M: TransitionModel + Sync + ?Sized>(
    initial_probs: ArrayView1<'_, f64>,
    transitions: &M,
    log_likelihoods: ArrayView2<'_, f64>,
    schedule: ScanSchedule,
) -> Result<Posterior> {
    let Dims {
        num_timesteps,
        num_states,
    } = check_shapes(initial_probs, transitions, log_likelihoods)?;
    let log_transitions = LogTransitions::new(transitions);
    let elements = build_elements(initial_probs, &log_transitions, log_likelihoods);
    let filter = decode_filter(initial_probs, &log_transitions, &elements, schedule)?;
    if num_timesteps == 0 {
        let empty = Array2::zeros((0, num_states));
        return Ok(Posterior::from_filter(filter, empty.clone(), Some(empty)));
    }

    // suffixes[t] = e_{t+1} ⊕ … ⊕ e_{T-1}
    let suffixes = associative_scan_reverse(&elements[1..], &FilterElement::combine, schedule);
    let rows = par_map(num_timesteps, |t| -> Result<(Array1<f64>, Array1<f64>)> {
        let log_beta = suffixes
            .get(t)
            .map_or_else(|| Array1::zeros(num_states), |s| s.log_mass().to_owned());

        let mut weights: Vec<f64> = filter
            .filtered_probs
            .row(t)
            .iter()
            .zip(log_beta.iter())
            .map(|(f, b)| f.ln() + b)
            .collect();
        if !log_normalize(&mut weights).is_finite() {
            return Err(Error::DegenerateLikelihood { timestep: t });
        }

        let beta = if t + 1 == num_timesteps {
            Array1::ones(num_states)
        } else {
            let mut scaled = log_beta.to_vec();
            if !log_normalize(&mut scaled).is_finite() {
                return Err(Error::DegenerateLikelihood { timestep: t + 1 });
            }
            Array1::from(scaled)
        };
        Ok((Array1::from(weights), beta))
    });

    let mut smoothed = Array2::zeros((num_timesteps, num_states));
    let mut backward = Array2::zeros((num_timesteps, num_states));
    for (t, row) in rows.into_iter().enumerate() {
        let (s, b) = row?;
        smoothed.row_mut(t).assign(&s);
        backward.row_mut(t).assign(&b);
    }
    debug!(num_timesteps, num_states, %schedule, "parallel smoothing complete");
    Ok(Posterior::from_filter(filter, smoothed, Some(backward)))
}
