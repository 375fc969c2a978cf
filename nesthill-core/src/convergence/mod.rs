//! Convergence of the fully bound probability to a Hill curve as `s -> ∞`.
//!
//! [`ConvergenceAnalyzer`] binds one kinetic graph to a [`MathProvider`] and
//! a [`ReferenceHill`] and answers three questions: the pointwise limit and
//! its `x`-derivative, and whether `|P(x, s) - H(x)| <= C / sqrt(s)` holds
//! uniformly in `x`.

mod bound;

use std::fmt;

use num_rational::BigRational;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::{
    Result,
    error::KineticsError,
    expr::RateExpr,
    field::{Field, power},
    generator::GeneratorMatrix,
    graph::KineticGraph,
    params::Parameters,
    provider::{MathProvider, SupremumSearch},
};

pub(crate) use self::bound::BoundSearch;
pub use self::bound::{BoundVerdict, CancelToken, DEFAULT_MAX_BOXES, SearchBudget};

/// Why a uniform-bound search stopped without a verdict.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InconclusiveReason {
    /// The configured number of boxes was evaluated.
    BudgetExhausted,
    /// The deadline passed.
    DeadlineExpired,
    /// The cancel token fired.
    Cancelled,
}

impl fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BudgetExhausted => "box budget exhausted",
            Self::DeadlineExpired => "deadline expired",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Hill curve `H(x) = x^m / (1 + x^m)`.
///
/// # Examples
/// ```
/// use nesthill_core::ReferenceHill;
///
/// let hill = ReferenceHill::for_sites(3).expect("small site count");
/// assert_eq!(hill.exponent(), 7);
/// assert!((hill.evaluate(2.0) - 128.0 / 129.0).abs() < 1e-15);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ReferenceHill {
    exponent: u32,
}

impl ReferenceHill {
    /// Creates a Hill curve with coefficient `exponent`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `exponent` is zero.
    pub fn new(exponent: u32) -> Result<Self> {
        if exponent == 0 {
            return Err(KineticsError::invalid(
                "exponent",
                exponent,
                "Hill coefficient must be positive",
            ));
        }
        Ok(Self { exponent })
    }

    /// The curve the `sites`-site nested scheme approaches: `m = 2^sites - 1`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `sites` is zero or
    /// the coefficient does not fit in `u32`.
    pub fn for_sites(sites: usize) -> Result<Self> {
        let exponent = u32::try_from(sites)
            .ok()
            .filter(|&sites| (1..u32::BITS).contains(&sites))
            .map(|sites| (1_u32 << sites) - 1)
            .ok_or_else(|| {
                KineticsError::invalid("sites", sites, "must be between 1 and 31")
            })?;
        Self::new(exponent)
    }

    /// Hill coefficient.
    #[must_use]
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// `H(x)`, computed as a logistic in `ln x` so large coefficients do not
    /// overflow. `H(0) = 0`.
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        let log_ratio = -f64::from(self.exponent) * x.ln();
        if log_ratio > 0.0 {
            let decay = (-log_ratio).exp();
            decay / (1.0 + decay)
        } else {
            1.0 / (1.0 + log_ratio.exp())
        }
    }

    /// `dH/dx = m · H · (1 - H) / x`.
    #[must_use]
    pub fn derivative(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return if self.exponent == 1 { 1.0 } else { 0.0 };
        }
        let hill = self.evaluate(x);
        f64::from(self.exponent) * hill * (1.0 - hill) / x
    }

    /// Exact `H(x)` for non-negative rational `x`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `x` is negative.
    pub fn evaluate_exact(&self, x: &BigRational) -> Result<BigRational> {
        let lifted = power(x, self.exponent);
        let total = Self::hill_denominator(x, &lifted)?;
        lifted
            .quotient(&total)
            .ok_or_else(|| KineticsError::invalid("x", x, "1 + x^m vanishes"))
    }

    /// Exact `dH/dx = m x^(m-1) / (1 + x^m)^2`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `x` is negative.
    pub fn derivative_exact(&self, x: &BigRational) -> Result<BigRational> {
        let total = Self::hill_denominator(x, &power(x, self.exponent))?;
        BigRational::from_integer(self.exponent.into())
            .times(&power(x, self.exponent.saturating_sub(1)))
            .quotient(&total.times(&total))
            .ok_or_else(|| KineticsError::invalid("x", x, "1 + x^m vanishes"))
    }

    /// `1 + x^m`, rejecting negative `x`.
    fn hill_denominator(x: &BigRational, lifted: &BigRational) -> Result<BigRational> {
        if !x.is_strictly_positive() && !x.vanishes() {
            return Err(KineticsError::invalid(
                "x",
                x,
                "Hill curves are evaluated at non-negative concentrations",
            ));
        }
        Ok(BigRational::one().plus(lifted))
    }
}

impl fmt::Display for ReferenceHill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x^{0} / (1 + x^{0})", self.exponent)
    }
}

/// Limits and uniform-bound verdict at one concentration and time scale.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport<T> {
    /// `lim_{s -> ∞} P(x, s)`.
    pub limit_value: T,
    /// `lim_{s -> ∞} ∂P/∂x (x, s)`.
    pub derivative_limit: T,
    /// Outcome of the uniform-bound search.
    pub bound: BoundVerdict,
}

impl<T> ConvergenceReport<T> {
    /// Certified constant when the bound holds.
    #[must_use]
    pub fn bound_constant(&self) -> Option<f64> {
        self.bound.constant()
    }

    /// Whether the bound holds; `None` when the search was inconclusive.
    #[must_use]
    pub fn bound_holds(&self) -> Option<bool> {
        self.bound.bound_holds()
    }

    /// Counterexample when the bound is violated.
    #[must_use]
    pub fn counterexample_x(&self) -> Option<f64> {
        self.bound.counterexample_x()
    }
}

impl<T: fmt::Display> fmt::Display for ConvergenceReport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "limit: {}", self.limit_value)?;
        writeln!(f, "derivative limit: {}", self.derivative_limit)?;
        write!(f, "uniform bound: {}", self.bound)
    }
}

/// Convergence questions about one kinetic graph.
///
/// # Examples
/// ```
/// use nesthill_core::{
///     ConvergenceAnalyzer, KineticsBuilder, NumericProvider, Rate, ReferenceHill, SearchBudget,
/// };
///
/// let graph = KineticsBuilder::new()
///     .build()
///     .expect("defaults are valid")
///     .stabilized_scheme(2, &Rate::time_scale(-1))
///     .expect("within limits");
/// let provider = NumericProvider::new();
/// let reference = ReferenceHill::for_sites(2).expect("small site count");
/// let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme shape");
/// let limit = analyzer.limit(&2.0).expect("limit settles");
/// assert!((limit - reference.evaluate(2.0)).abs() < 1e-9);
/// ```
#[derive(Debug)]
pub struct ConvergenceAnalyzer<'a, P> {
    provider: &'a P,
    generator: GeneratorMatrix<RateExpr>,
    reference: ReferenceHill,
}

impl<'a, P: MathProvider> ConvergenceAnalyzer<'a, P> {
    /// Builds the symbolic generator of `graph`.
    ///
    /// # Errors
    /// Returns [`KineticsError::MalformedGraph`] when `graph` does not have
    /// the shape of a nested scheme.
    pub fn new(graph: &KineticGraph, provider: &'a P, reference: ReferenceHill) -> Result<Self> {
        Ok(Self {
            provider,
            generator: GeneratorMatrix::build(graph)?,
            reference,
        })
    }

    /// Symbolic generator under analysis.
    #[must_use]
    pub fn generator(&self) -> &GeneratorMatrix<RateExpr> {
        &self.generator
    }

    /// Reference Hill curve.
    #[must_use]
    pub fn reference(&self) -> ReferenceHill {
        self.reference
    }

    /// `P(x, s)`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for non-positive `x` or
    /// `s` and propagates solver failures.
    pub fn fully_bound(&self, x: P::Value, s: P::Value) -> Result<P::Value> {
        self.provider
            .fully_bound(&self.generator, &Parameters::new(x, s)?)
    }

    /// `∂P/∂x (x, s)`.
    ///
    /// # Errors
    /// Same as [`ConvergenceAnalyzer::fully_bound`].
    pub fn fully_bound_derivative(&self, x: P::Value, s: P::Value) -> Result<P::Value> {
        self.provider
            .fully_bound_derivative(&self.generator, &Parameters::new(x, s)?)
    }

    /// `P` at each `(x, s)` pair, in input order.
    ///
    /// Runs in parallel when the `parallel` feature is enabled.
    ///
    /// # Errors
    /// Returns the first failure in input order.
    pub fn fully_bound_batch(&self, points: &[(P::Value, P::Value)]) -> Result<Vec<P::Value>> {
        #[cfg(feature = "parallel")]
        {
            points
                .par_iter()
                .map(|(x, s)| self.fully_bound(x.clone(), s.clone()))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            points
                .iter()
                .map(|(x, s)| self.fully_bound(x.clone(), s.clone()))
                .collect()
        }
    }

    /// `lim_{s -> ∞} P(x, s)`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for `x <= 0` and
    /// provider failures otherwise.
    pub fn limit(&self, x: &P::Value) -> Result<P::Value> {
        self.provider.limit_fully_bound(&self.generator, x)
    }

    /// `lim_{s -> ∞} ∂P/∂x (x, s)`.
    ///
    /// # Errors
    /// Same as [`ConvergenceAnalyzer::limit`].
    pub fn derivative_limit(&self, x: &P::Value) -> Result<P::Value> {
        self.provider.limit_fully_bound_derivative(&self.generator, x)
    }
}

impl<P: MathProvider + SupremumSearch> ConvergenceAnalyzer<'_, P> {
    /// Decides whether `sup_x |P(x, s) - H(x)| <= claimed / sqrt(s)`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for non-positive `s` or
    /// `claimed`. An exhausted budget is a [`BoundVerdict::Inconclusive`]
    /// verdict, not an error.
    pub fn check_uniform_bound(
        &self,
        s: f64,
        claimed: f64,
        budget: &SearchBudget,
    ) -> Result<BoundVerdict> {
        self.provider
            .check_uniform_bound(&self.generator, &self.reference, s, claimed, budget)
    }

    /// Limits at `x` and the uniform-bound verdict at `s`.
    ///
    /// # Errors
    /// Propagates failures of the individual checks.
    #[instrument(
        name = "core.convergence.report",
        err,
        skip(self, x, budget),
        fields(provider = self.provider.name(), reference = %self.reference),
    )]
    pub fn report(
        &self,
        x: &P::Value,
        s: f64,
        claimed: f64,
        budget: &SearchBudget,
    ) -> Result<ConvergenceReport<P::Value>> {
        let limit_value = self.limit(x)?;
        let derivative_limit = self.derivative_limit(x)?;
        let bound = self.check_uniform_bound(s, claimed, budget)?;
        info!(
            limit = %limit_value,
            derivative_limit = %derivative_limit,
            bound_holds = ?bound.bound_holds(),
            "convergence report"
        );
        Ok(ConvergenceReport {
            limit_value,
            derivative_limit,
            bound,
        })
    }
}

#[cfg(test)]
mod tests;
