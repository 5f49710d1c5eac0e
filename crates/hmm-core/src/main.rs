//! HMM Inference Core - command line front end.
//!
//! Subcommands:
//! - `casino`: simulate the occasionally dishonest casino and decode it
//! - `infer`: run smoothing and decoding on arrays read from a JSON file
//!
//! stdout carries the JSON payload, stderr carries logs.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use hmm_core::config::{Backend, InferenceConfig, SmootherKind};
use hmm_core::exit_codes::ExitCode;
use hmm_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use hmm_core::{
    Error, HmmEngine, LogLikelihoodModel, ScanSchedule, TimeVaryingTransitions, TransitionModel,
};
use ndarray::{array, Array1, Array2, Array3, ArrayView1, Axis};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Exact inference for discrete hidden Markov models
#[derive(Parser)]
#[command(name = "hmm-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Inference config file (TOML)
    #[arg(long, global = true, env = "HMM_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured backend
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Override the configured scan schedule
    #[arg(long, global = true)]
    schedule: Option<ScanSchedule>,

    /// Override the configured sequential smoother (two-filter, rts)
    #[arg(long, global = true)]
    smoother: Option<SmootherKind>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the occasionally dishonest casino and decode it
    Casino(CasinoArgs),

    /// Smooth and decode arrays from a JSON file
    Infer(InferArgs),
}

#[derive(Args, Debug)]
struct CasinoArgs {
    /// Number of rolls to simulate
    #[arg(long, default_value_t = 300)]
    timesteps: usize,

    /// Seed for the simulation
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Also report fixed-lag estimates with this lag
    #[arg(long)]
    lag: Option<usize>,
}

#[derive(Args, Debug)]
struct InferArgs {
    /// JSON file with initial_probs, transition_matrix and log_likelihoods
    #[arg(long)]
    input: PathBuf,

    /// Sum expected transitions over time
    #[arg(long)]
    reduce_sum: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };
    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match resolve_engine(&cli.global) {
        Ok(engine) => match &cli.command {
            Commands::Casino(args) => run_casino(&engine, args),
            Commands::Infer(args) => run_infer(&engine, args),
        },
        Err(err) => report(&err),
    };
    std::process::exit(exit_code.as_i32());
}

fn resolve_engine(global: &GlobalOpts) -> Result<HmmEngine, Error> {
    let mut config = InferenceConfig::resolve(global.config.as_deref())?;
    if let Some(backend) = global.backend {
        config.backend = backend;
    }
    if let Some(schedule) = global.schedule {
        config.schedule = schedule;
    }
    if let Some(smoother) = global.smoother {
        config.smoother = smoother;
    }
    info!(
        backend = %config.backend,
        schedule = %config.schedule,
        smoother = %config.smoother,
        "configuration resolved"
    );
    Ok(HmmEngine::new(config))
}

fn report(err: &Error) -> ExitCode {
    let code = ExitCode::from(err);
    error!(code = code.code_name(), "{err}");
    eprintln!("error: {err}");
    code
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            ExitCode::Clean
        }
        Err(err) => {
            eprintln!("error: failed to serialize output: {err}");
            ExitCode::InternalError
        }
    }
}

fn rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.axis_iter(Axis(0)).map(|row| row.to_vec()).collect()
}

// ============================================================================
// casino
// ============================================================================

/// Categorical emissions: one row of face probabilities per state.
struct CategoricalEmissions {
    log_probs: Array2<f64>,
}

impl LogLikelihoodModel for CategoricalEmissions {
    type Emission = usize;

    fn num_states(&self) -> usize {
        self.log_probs.nrows()
    }

    fn log_likelihoods(&self, emissions: &[usize]) -> Array2<f64> {
        let mut out = Array2::from_elem((emissions.len(), self.num_states()), f64::NEG_INFINITY);
        for (t, &face) in emissions.iter().enumerate() {
            if face < self.log_probs.ncols() {
                out.row_mut(t).assign(&self.log_probs.column(face));
            }
        }
        out
    }
}

struct Casino {
    initial_probs: Array1<f64>,
    transition_matrix: Array2<f64>,
    emission_probs: Array2<f64>,
}

impl Casino {
    fn new() -> Self {
        let fair = 1.0 / 6.0;
        Self {
            initial_probs: array![0.5, 0.5],
            transition_matrix: array![[0.95, 0.05], [0.10, 0.90]],
            emission_probs: Array2::from_shape_fn((2, 6), |(state, face)| match (state, face) {
                (0, _) => fair,
                (_, 5) => 0.5,
                _ => 0.1,
            }),
        }
    }

    fn emissions(&self) -> CategoricalEmissions {
        CategoricalEmissions {
            log_probs: self.emission_probs.mapv(f64::ln),
        }
    }

    fn simulate<R: Rng + ?Sized>(&self, rng: &mut R, num_timesteps: usize) -> Result<(Vec<usize>, Vec<usize>), Error> {
        let categorical = |probs: ArrayView1<'_, f64>, t: usize| {
            WeightedIndex::new(probs.iter().copied()).map_err(|_| Error::DegenerateLikelihood { timestep: t })
        };
        let mut states: Vec<usize> = Vec::with_capacity(num_timesteps);
        let mut faces = Vec::with_capacity(num_timesteps);
        for t in 0..num_timesteps {
            let state = match states.last() {
                None => categorical(self.initial_probs.view(), t)?.sample(rng),
                Some(&prev) => categorical(self.transition_matrix.row(prev), t)?.sample(rng),
            };
            faces.push(categorical(self.emission_probs.row(state), t)?.sample(rng));
            states.push(state);
        }
        Ok((states, faces))
    }
}

fn preview(states: &[usize]) -> String {
    states.iter().take(60).map(|s| (s + 1).to_string()).collect()
}

fn accuracy(estimate: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 1.0;
    }
    let hits = estimate.iter().zip(truth).filter(|(a, b)| a == b).count();
    hits as f64 / truth.len() as f64
}

fn casino_summary(engine: &HmmEngine, args: &CasinoArgs) -> Result<serde_json::Value, Error> {
    let casino = Casino::new();
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (states, faces) = casino.simulate(&mut rng, args.timesteps)?;
    let ll = casino.emissions().log_likelihoods(&faces);
    let pi = casino.initial_probs.view();
    let a = &casino.transition_matrix;

    let posterior = engine.smoother(pi, a, ll.view())?;
    let viterbi = engine.posterior_mode(pi, a, ll.view())?;
    let marginal = posterior.marginal_modes();
    let mut out = json!({
        "num_timesteps": args.timesteps,
        "seed": args.seed,
        "backend": engine.config().backend.to_string(),
        "smoother": engine.config().smoother.to_string(),
        "marginal_log_lkhd": posterior.marginal_log_lkhd,
        "states_preview": preview(&states),
        "faces_preview": preview(&faces),
        "viterbi_preview": preview(&viterbi.states),
        "viterbi_log_joint": viterbi.log_joint,
        "viterbi_accuracy": accuracy(&viterbi.states, &states),
        "marginal_mode_accuracy": accuracy(&marginal, &states),
        "p_loaded_filtered": posterior.filtered_probs.column(1).to_vec(),
        "p_loaded_smoothed": posterior.smoothed_probs.column(1).to_vec(),
    });
    if let Some(lag) = args.lag {
        let lagged = engine.fixed_lag_smoother(pi, a, ll.view(), lag)?;
        out["lag"] = json!(lag);
        out["p_loaded_fixed_lag"] = json!(lagged.smoothed_probs.column(1).to_vec());
    }
    Ok(out)
}

fn run_casino(engine: &HmmEngine, args: &CasinoArgs) -> ExitCode {
    match casino_summary(engine, args) {
        Ok(value) => print_json(&value),
        Err(err) => report(&err),
    }
}

// ============================================================================
// infer
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum TransitionInput {
    Stationary(Vec<Vec<f64>>),
    TimeVarying(Vec<Vec<Vec<f64>>>),
}

/// `null` log-likelihoods stand for -inf, which JSON cannot express.
#[derive(Deserialize)]
struct InferInput {
    initial_probs: Vec<f64>,
    transition_matrix: TransitionInput,
    log_likelihoods: Vec<Vec<Option<f64>>>,
}

fn matrix(what: &'static str, rows: Vec<Vec<f64>>) -> Result<Array2<f64>, Error> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
        return Err(Error::shape(what, ncols, bad.len()));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|e| Error::shape(what, format!("{nrows}x{ncols}"), e))
}

fn stack(rows: Vec<Vec<Vec<f64>>>) -> Result<TimeVaryingTransitions, Error> {
    let steps = rows.len();
    let mats = rows
        .into_iter()
        .map(|m| matrix("transition matrix", m))
        .collect::<Result<Vec<_>, _>>()?;
    let (k, k2) = mats.first().map_or((0, 0), |m| m.dim());
    let mut out = Array3::zeros((steps, k, k2));
    for (mut slot, m) in out.axis_iter_mut(Axis(0)).zip(&mats) {
        if m.dim() != (k, k2) {
            return Err(Error::shape("transition matrix", format!("{k}x{k2}"), format!("{}x{}", m.nrows(), m.ncols())));
        }
        slot.assign(m);
    }
    TimeVaryingTransitions::new(out)
}

fn infer_with<M: TransitionModel + Sync + ?Sized>(
    engine: &HmmEngine,
    pi: ArrayView1<'_, f64>,
    transitions: &M,
    ll: &Array2<f64>,
    reduce_sum: bool,
) -> Result<serde_json::Value, Error> {
    let posterior = engine.smoother(pi, transitions, ll.view())?;
    let viterbi = engine.posterior_mode(pi, transitions, ll.view())?;
    let xi = engine.transition_probs(transitions, &posterior, reduce_sum)?;
    Ok(json!({
        "marginal_log_lkhd": posterior.marginal_log_lkhd,
        "filtered_probs": rows(&posterior.filtered_probs),
        "predicted_probs": rows(&posterior.predicted_probs),
        "smoothed_probs": rows(&posterior.smoothed_probs),
        "most_likely_states": viterbi.states,
        "viterbi_log_joint": viterbi.log_joint,
        "summed_transition_probs": rows(&xi.summed()),
    }))
}

fn load_input(path: &Path) -> Result<InferInput, ExitCode> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        eprintln!("error: cannot read {}: {err}", path.display());
        ExitCode::IoError
    })?;
    serde_json::from_str(&content).map_err(|err| {
        eprintln!("error: invalid input {}: {err}", path.display());
        ExitCode::InputError
    })
}

fn infer_summary(engine: &HmmEngine, input: InferInput, reduce_sum: bool) -> Result<serde_json::Value, Error> {
    let pi = Array1::from(input.initial_probs);
    let ll = if input.log_likelihoods.is_empty() {
        Array2::zeros((0, pi.len()))
    } else {
        let ll_rows: Vec<Vec<f64>> = input
            .log_likelihoods
            .into_iter()
            .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NEG_INFINITY)).collect::<Vec<f64>>())
            .collect();
        matrix("log-likelihoods", ll_rows)?
    };
    match input.transition_matrix {
        TransitionInput::Stationary(m) => {
            let a = matrix("transition matrix", m)?;
            infer_with(engine, pi.view(), &a, &ll, reduce_sum)
        }
        TransitionInput::TimeVarying(m) => {
            let tv = stack(m)?;
            infer_with(engine, pi.view(), &tv, &ll, reduce_sum)
        }
    }
}

fn run_infer(engine: &HmmEngine, args: &InferArgs) -> ExitCode {
    let input = match load_input(&args.input) {
        Ok(input) => input,
        Err(code) => return code,
    };
    match infer_summary(engine, input, args.reduce_sum) {
        Ok(value) => print_json(&value),
        Err(err) => report(&err),
    }
}
