//! Math providers: the algebraic capabilities the convergence analysis needs.
//!
//! [`MathProvider`] covers steady states, `x`-derivatives and `s -> ∞`
//! limits of the fully bound probability; [`SupremumSearch`] covers the
//! certified search for `sup_x |P(x, s) - H(x)|`. The analysis is written
//! against these traits, so exact and floating-point backends are
//! interchangeable.

mod exact;
mod numeric;
mod poly;

use crate::{
    Result,
    convergence::{BoundVerdict, ReferenceHill, SearchBudget},
    expr::RateExpr,
    field::Field,
    generator::GeneratorMatrix,
    params::Parameters,
    steady_state::SteadyStateVector,
};

pub use self::{
    exact::ExactProvider,
    numeric::{LimitMethod, LimitSettings, NumericProvider},
};

/// Steady-state, derivative and limit primitives over one scalar field.
pub trait MathProvider: Send + Sync {
    /// Scalar type of every result.
    type Value: Field;

    /// Short backend name for logs and reports.
    fn name(&self) -> &'static str;

    /// Stationary distribution at bound parameters.
    ///
    /// # Errors
    /// Propagates solver failures.
    fn steady_state(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<Self::Value>,
    ) -> Result<SteadyStateVector<Self::Value>>;

    /// Probability of the fully bound state at bound parameters.
    ///
    /// # Errors
    /// Propagates solver failures.
    fn fully_bound(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<Self::Value>,
    ) -> Result<Self::Value> {
        let dimension = generator.dimension();
        self.steady_state(generator, params)?
            .into_inner()
            .pop()
            .ok_or(crate::KineticsError::SingularSystem {
                nullity: 0,
                dimension,
            })
    }

    /// `∂P/∂x` of the fully bound probability at bound parameters.
    ///
    /// # Errors
    /// Propagates solver failures.
    fn fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<Self::Value>,
    ) -> Result<Self::Value>;

    /// `lim_{s -> ∞} P(x, s)`.
    ///
    /// # Errors
    /// Returns [`crate::KineticsError::InvalidParameter`] for `x <= 0` and
    /// backend-specific failures otherwise.
    fn limit_fully_bound(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        x: &Self::Value,
    ) -> Result<Self::Value>;

    /// `lim_{s -> ∞} ∂P/∂x (x, s)`.
    ///
    /// # Errors
    /// Same as [`MathProvider::limit_fully_bound`].
    fn limit_fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        x: &Self::Value,
    ) -> Result<Self::Value>;
}

/// Certified search for the uniform distance between `P(·, s)` and a
/// reference Hill curve.
pub trait SupremumSearch {
    /// Decides whether `sup_{x > 0} |P(x, s) - H(x)| <= claimed / sqrt(s)`.
    ///
    /// # Errors
    /// Returns [`crate::KineticsError::InvalidParameter`] for non-positive `s`
    /// or `claimed`, and generator failures. Budget exhaustion is reported
    /// through [`BoundVerdict::Inconclusive`], not as an error.
    fn check_uniform_bound(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        reference: &ReferenceHill,
        s: f64,
        claimed: f64,
        budget: &SearchBudget,
    ) -> Result<BoundVerdict>;
}

/// Rejects non-positive `x`.
pub(crate) fn require_positive_x<F: Field>(x: &F) -> Result<()> {
    if x.is_strictly_positive() {
        Ok(())
    } else {
        Err(crate::KineticsError::invalid(
            "x",
            x,
            "must be finite and strictly positive",
        ))
    }
}
