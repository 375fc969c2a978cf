//! Benchmark setup error type.
//!
//! Lets setup code propagate engine failures with `?` instead of
//! `.expect()`.

use nesthill_core::KineticsError;

/// Errors that may occur during benchmark setup.
#[derive(Debug, thiserror::Error)]
pub enum BenchSetupError {
    /// Scheme construction or evaluation failed.
    #[error("kinetics setup failed: {0}")]
    Kinetics(#[from] KineticsError),
    /// A site count outside the benchmarked range was requested.
    #[error("site count {sites} is outside 1..={ceiling}")]
    SiteCount {
        /// Requested site count.
        sites: usize,
        /// Largest benchmarked site count.
        ceiling: usize,
    },
}
