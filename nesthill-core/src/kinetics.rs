//! Site-limited entry point for building nested hysteresis schemes.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::{
    Result,
    error::KineticsError,
    graph::{KineticGraph, build_base, iterate, stabilize_extremes},
    rate::Rate,
};

/// Builds schemes for validated site counts.
///
/// Construct instances with [`crate::KineticsBuilder`].
///
/// # Examples
/// ```
/// use nesthill_core::{KineticsBuilder, Rate};
///
/// let kinetics = KineticsBuilder::new().build().expect("defaults are valid");
/// let graph = kinetics
///     .stabilized_scheme(3, &Rate::time_scale(-1))
///     .expect("three sites are within limits");
/// assert_eq!(graph.vertices().len(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kinetics {
    max_sites: usize,
    warn_sites: usize,
}

impl Kinetics {
    pub(crate) fn new(max_sites: usize, warn_sites: usize) -> Self {
        Self {
            max_sites,
            warn_sites,
        }
    }

    /// Returns the site ceiling.
    #[must_use]
    pub fn max_sites(&self) -> usize {
        self.max_sites
    }

    /// Returns the warning threshold.
    #[must_use]
    pub fn warn_sites(&self) -> usize {
        self.warn_sites
    }

    fn check_sites(&self, sites: usize) -> Result<()> {
        if sites == 0 {
            return Err(KineticsError::invalid(
                "sites",
                sites,
                "must be at least one",
            ));
        }
        if sites > self.max_sites {
            return Err(KineticsError::SiteLimitExceeded {
                sites,
                ceiling: self.max_sites,
            });
        }
        if sites > self.warn_sites {
            warn!(
                sites,
                vertices = 1usize << sites,
                threshold = self.warn_sites,
                "state space is large"
            );
        }
        Ok(())
    }

    /// Builds the unstabilized scheme with `sites` binding sites.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for zero sites and
    /// [`KineticsError::SiteLimitExceeded`] above the ceiling.
    #[instrument(name = "core.scheme", err, skip(self), fields(ceiling = self.max_sites))]
    pub fn scheme(&self, sites: usize) -> Result<KineticGraph> {
        self.check_sites(sites)?;
        let graph = iterate(build_base(), sites - 1)?;
        info!(
            vertices = graph.vertices().len(),
            edges = graph.edges().len(),
            "scheme constructed"
        );
        Ok(graph)
    }

    /// Builds the scheme with `sites` binding sites and stabilizes its
    /// extreme states by `q`.
    ///
    /// # Errors
    /// Same as [`Kinetics::scheme`], plus [`KineticsError::InvalidParameter`]
    /// when `q` pushes a rate exponent out of range.
    pub fn stabilized_scheme(&self, sites: usize, q: &Rate) -> Result<KineticGraph> {
        stabilize_extremes(&self.scheme(sites)?, q)
    }

    /// Builds independent schemes for several site counts, in input order.
    ///
    /// Runs in parallel when the `parallel` feature is enabled; results are
    /// identical either way.
    ///
    /// # Errors
    /// Returns the first failure in input order.
    pub fn schemes(&self, site_counts: &[usize]) -> Result<Vec<KineticGraph>> {
        #[cfg(feature = "parallel")]
        {
            site_counts
                .par_iter()
                .map(|&sites| self.scheme(sites))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            site_counts
                .iter()
                .map(|&sites| self.scheme(sites))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{KineticsBuilder, KineticsError, Rate};

    #[rstest]
    #[case(1, 2)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn scheme_has_two_to_the_sites_vertices(#[case] sites: usize, #[case] vertices: usize) {
        let kinetics = KineticsBuilder::new().build().expect("defaults are valid");
        let graph = kinetics.scheme(sites).expect("within limits");
        assert_eq!(graph.vertices().len(), vertices);
    }

    #[test]
    fn rejects_sites_above_ceiling() {
        let kinetics = KineticsBuilder::new()
            .with_max_sites(4)
            .with_warn_sites(2)
            .build()
            .expect("limits are valid");
        let err = kinetics.scheme(5).expect_err("above ceiling");
        assert_eq!(
            err,
            KineticsError::SiteLimitExceeded {
                sites: 5,
                ceiling: 4
            }
        );
        assert!(matches!(
            kinetics.scheme(0),
            Err(KineticsError::InvalidParameter { parameter: "sites", .. })
        ));
    }

    #[rstest]
    #[case(3, "s^2147483647")]
    #[case(2, "x^4294967295")]
    fn stabilizer_reports_exponent_overflow(#[case] sites: usize, #[case] q: &str) {
        let kinetics = KineticsBuilder::new().build().expect("defaults are valid");
        let q: Rate = q.parse().expect("rate parses");
        match kinetics.stabilized_scheme(sites, &q) {
            Err(KineticsError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "rate"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn schemes_preserve_input_order() {
        let kinetics = KineticsBuilder::new().build().expect("defaults are valid");
        let graphs = kinetics.schemes(&[3, 1, 2]).expect("within limits");
        let sites: Vec<_> = graphs.iter().map(|graph| graph.sites()).collect();
        assert_eq!(sites, vec![3, 1, 2]);
        assert!(kinetics.schemes(&[2, 13]).is_err());
    }

    #[rstest]
    #[case(KineticsBuilder::new().with_max_sites(0), "max_sites")]
    #[case(KineticsBuilder::new().with_max_sites(80), "max_sites")]
    #[case(KineticsBuilder::new().with_max_sites(4).with_warn_sites(5), "warn_sites")]
    fn builder_rejects_invalid_limits(#[case] builder: KineticsBuilder, #[case] name: &str) {
        match builder.build() {
            Err(KineticsError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, name),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
