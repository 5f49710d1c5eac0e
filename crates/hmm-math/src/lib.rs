//! Log-space math utilities for HMM inference.

pub mod math;

pub use math::matrix::*;
pub use math::stable::*;
