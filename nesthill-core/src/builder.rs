//! Builder utilities for configuring scheme construction.
//!
//! Exposes the site-count limits validated before constructing [`Kinetics`]
//! instances.

use crate::{Result, error::KineticsError, kinetics::Kinetics};

/// Default ceiling on the number of binding sites.
pub const DEFAULT_MAX_SITES: usize = 12;

/// Default site count above which construction logs a warning.
pub const DEFAULT_WARN_SITES: usize = 8;

/// Configures and constructs [`Kinetics`] instances.
///
/// The state space doubles with every site, so the builder carries a hard
/// ceiling and a softer warning threshold.
///
/// # Examples
/// ```
/// use nesthill_core::KineticsBuilder;
///
/// let kinetics = KineticsBuilder::new()
///     .with_max_sites(6)
///     .with_warn_sites(4)
///     .build()
///     .expect("builder configuration is valid");
/// assert_eq!(kinetics.max_sites(), 6);
/// assert_eq!(kinetics.warn_sites(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct KineticsBuilder {
    max_sites: usize,
    warn_sites: usize,
}

impl Default for KineticsBuilder {
    fn default() -> Self {
        Self {
            max_sites: DEFAULT_MAX_SITES,
            warn_sites: DEFAULT_WARN_SITES,
        }
    }
}

impl KineticsBuilder {
    /// Creates a builder populated with default limits.
    ///
    /// # Examples
    /// ```
    /// use nesthill_core::KineticsBuilder;
    ///
    /// let builder = KineticsBuilder::new();
    /// assert_eq!(builder.max_sites(), 12);
    /// assert_eq!(builder.warn_sites(), 8);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the site ceiling.
    #[must_use]
    pub fn with_max_sites(mut self, sites: usize) -> Self {
        self.max_sites = sites;
        self
    }

    /// Returns the configured site ceiling.
    #[must_use]
    pub fn max_sites(&self) -> usize {
        self.max_sites
    }

    /// Overrides the warning threshold.
    #[must_use]
    pub fn with_warn_sites(mut self, sites: usize) -> Self {
        self.warn_sites = sites;
        self
    }

    /// Returns the configured warning threshold.
    #[must_use]
    pub fn warn_sites(&self) -> usize {
        self.warn_sites
    }

    /// Validates the configuration and constructs a [`Kinetics`] instance.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when the ceiling is zero,
    /// when it would overflow the vertex index space, or when the warning
    /// threshold exceeds it.
    ///
    /// # Examples
    /// ```
    /// use nesthill_core::KineticsBuilder;
    ///
    /// let err = KineticsBuilder::new().with_max_sites(0).build();
    /// assert!(err.is_err());
    /// ```
    pub fn build(self) -> Result<Kinetics> {
        if self.max_sites == 0 {
            return Err(KineticsError::invalid(
                "max_sites",
                self.max_sites,
                "must be at least one",
            ));
        }
        if self.max_sites >= usize::BITS as usize {
            return Err(KineticsError::invalid(
                "max_sites",
                self.max_sites,
                "vertex count would overflow",
            ));
        }
        if self.warn_sites > self.max_sites {
            return Err(KineticsError::invalid(
                "warn_sites",
                self.warn_sites,
                "must not exceed max_sites",
            ));
        }
        Ok(Kinetics::new(self.max_sites, self.warn_sites))
    }
}
