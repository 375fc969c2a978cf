//! Stabilized schemes prepared once per benchmark.

use nesthill_core::{
    DEFAULT_MAX_SITES, GeneratorMatrix, KineticGraph, KineticsBuilder, Rate, RateExpr,
};

use crate::error::BenchSetupError;

/// A stabilized scheme together with its symbolic generator.
#[derive(Clone, Debug)]
pub struct PreparedScheme {
    /// Scheme graph.
    pub graph: KineticGraph,
    /// Generator with rates still symbolic in `x` and `s`.
    pub generator: GeneratorMatrix<RateExpr>,
}

/// Builds the `sites`-site scheme stabilized with `q = 1/s`.
///
/// # Errors
/// Returns [`BenchSetupError::SiteCount`] outside `1..=DEFAULT_MAX_SITES`
/// and [`BenchSetupError::Kinetics`] when construction fails.
pub fn stabilized(sites: usize) -> Result<PreparedScheme, BenchSetupError> {
    if sites == 0 || sites > DEFAULT_MAX_SITES {
        return Err(BenchSetupError::SiteCount {
            sites,
            ceiling: DEFAULT_MAX_SITES,
        });
    }
    let kinetics = KineticsBuilder::new()
        .with_warn_sites(DEFAULT_MAX_SITES)
        .build()?;
    let graph = kinetics.stabilized_scheme(sites, &Rate::time_scale(-1))?;
    let generator = GeneratorMatrix::build(&graph)?;
    Ok(PreparedScheme { graph, generator })
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case(1, 2)]
    #[case(4, 16)]
    fn prepares_generator_of_matching_dimension(#[case] sites: usize, #[case] dimension: usize) {
        let prepared = stabilized(sites).expect("site count is benchmarked");
        assert_eq!(prepared.graph.vertices().len(), dimension);
        assert_eq!(prepared.generator.dimension(), dimension);
    }

    #[rstest]
    #[case(0)]
    #[case(DEFAULT_MAX_SITES + 1)]
    fn rejects_out_of_range_site_counts(#[case] sites: usize) {
        assert!(matches!(
            stabilized(sites),
            Err(BenchSetupError::SiteCount { .. })
        ));
    }
}
