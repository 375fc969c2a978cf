//! Benchmark parameter types.
//!
//! Each struct renders as a compact Criterion benchmark identifier.

use std::fmt;

use nesthill_core::SolveMethod;

/// Parameters for a steady-state benchmark run.
#[derive(Clone, Copy, Debug)]
pub struct SteadyStateBenchParams {
    /// Number of binding sites.
    pub sites: usize,
    /// Floating-point solver under test.
    pub method: SolveMethod,
}

impl fmt::Display for SteadyStateBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self.method {
            SolveMethod::ReplacedRow => "replaced_row",
            SolveMethod::Gth => "gth",
        };
        write!(f, "n={},{method}", self.sites)
    }
}

/// Parameters for a uniform-bound benchmark run.
#[derive(Clone, Copy, Debug)]
pub struct BoundBenchParams {
    /// Number of binding sites.
    pub sites: usize,
    /// Time-scale factor at which the bound is checked.
    pub s: f64,
    /// Claimed constant.
    pub claimed: f64,
}

impl fmt::Display for BoundBenchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n={},s={},C={}", self.sites, self.s, self.claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(SolveMethod::ReplacedRow, "n=4,replaced_row")]
    #[case(SolveMethod::Gth, "n=4,gth")]
    fn steady_state_params_render_as_ids(#[case] method: SolveMethod, #[case] expected: &str) {
        let params = SteadyStateBenchParams { sites: 4, method };
        assert_eq!(params.to_string(), expected);
    }

    #[test]
    fn bound_params_render_as_ids() {
        let params = BoundBenchParams {
            sites: 3,
            s: 1000.0,
            claimed: 0.5,
        };
        assert_eq!(params.to_string(), "n=3,s=1000,C=0.5");
    }
}
