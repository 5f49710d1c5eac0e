//! Inclusive associative scans under interchangeable schedules.
//!
//! Every schedule computes `out[i] = e_0 ⊕ e_1 ⊕ … ⊕ e_i` for an
//! associative `⊕`; they differ only in how the combinations are grouped.
//! With the `parallel` feature each level of the tree schedules is spread
//! across the rayon pool.

use serde::{Deserialize, Serialize};

/// How a scan groups its combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanSchedule {
    /// Left fold, n - 1 combinations, depth n - 1.
    Sequential,
    /// Hillis-Steele doubling, O(n log n) combinations, depth log n.
    RecursiveDoubling,
    /// Pairwise reduce then down-sweep, O(n) combinations, depth 2 log n.
    #[default]
    WorkEfficient,
}

impl ScanSchedule {
    /// Every schedule, for exhaustive comparisons.
    pub const ALL: [ScanSchedule; 3] = [
        ScanSchedule::Sequential,
        ScanSchedule::RecursiveDoubling,
        ScanSchedule::WorkEfficient,
    ];
}

impl std::str::FromStr for ScanSchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "sequential" | "serial" => Ok(ScanSchedule::Sequential),
            "recursive-doubling" | "hillis-steele" => Ok(ScanSchedule::RecursiveDoubling),
            "work-efficient" | "blelloch" => Ok(ScanSchedule::WorkEfficient),
            _ => Err(format!("unknown scan schedule: {}", s)),
        }
    }
}

impl std::fmt::Display for ScanSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanSchedule::Sequential => write!(f, "sequential"),
            ScanSchedule::RecursiveDoubling => write!(f, "recursive-doubling"),
            ScanSchedule::WorkEfficient => write!(f, "work-efficient"),
        }
    }
}

/// `(0..n).map(f)`, in parallel when the `parallel` feature is enabled.
pub(crate) fn par_map<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..n).map(f).collect()
    }
}

/// Inclusive prefix scan.
pub fn associative_scan<T, F>(elems: &[T], op: &F, schedule: ScanSchedule) -> Vec<T>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    match schedule {
        ScanSchedule::Sequential => sequential(elems, op),
        ScanSchedule::RecursiveDoubling => recursive_doubling(elems, op),
        ScanSchedule::WorkEfficient => work_efficient(elems, op),
    }
}

/// Inclusive suffix scan: `out[i] = e_i ⊕ e_{i+1} ⊕ … ⊕ e_{n-1}`.
pub fn associative_scan_reverse<T, F>(elems: &[T], op: &F, schedule: ScanSchedule) -> Vec<T>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    let reversed: Vec<T> = elems.iter().rev().cloned().collect();
    let flipped = |a: &T, b: &T| op(b, a);
    let mut out = associative_scan(&reversed, &flipped, schedule);
    out.reverse();
    out
}

fn sequential<T: Clone, F: Fn(&T, &T) -> T>(elems: &[T], op: &F) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(elems.len());
    for e in elems {
        let next = match out.last() {
            Some(acc) => op(acc, e),
            None => e.clone(),
        };
        out.push(next);
    }
    out
}

fn recursive_doubling<T, F>(elems: &[T], op: &F) -> Vec<T>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    let n = elems.len();
    let mut current = elems.to_vec();
    let mut offset = 1;
    while offset < n {
        let prev = &current;
        current = par_map(n, |i| {
            if i >= offset {
                op(&prev[i - offset], &prev[i])
            } else {
                prev[i].clone()
            }
        });
        offset *= 2;
    }
    current
}

fn work_efficient<T, F>(elems: &[T], op: &F) -> Vec<T>
where
    T: Clone + Send + Sync,
    F: Fn(&T, &T) -> T + Sync,
{
    let n = elems.len();
    if n < 2 {
        return elems.to_vec();
    }
    let pairs = par_map(n / 2, |i| op(&elems[2 * i], &elems[2 * i + 1]));
    // odd[i] is the prefix ending at 2i + 1.
    let odd = work_efficient(&pairs, op);
    par_map(n, |i| {
        if i == 0 {
            elems[0].clone()
        } else if i % 2 == 1 {
            odd[i / 2].clone()
        } else {
            op(&odd[i / 2 - 1], &elems[i])
        }
    })
}
