//! Benchmark support crate for nesthill.
//!
//! Builds the schemes and parameter sets shared by the Criterion benchmarks
//! for steady-state solving, `s -> ∞` limits and uniform-bound
//! certification.

pub mod error;
pub mod params;
pub mod schemes;
