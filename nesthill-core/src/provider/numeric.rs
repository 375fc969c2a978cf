//! Floating-point backend: `nalgebra` solves, dual-number derivatives,
//! leading-term or Richardson-extrapolated limits and the certified bound
//! search.

use tracing::{debug, instrument};

use super::{MathProvider, SupremumSearch, require_positive_x};
use crate::{
    Result,
    convergence::{BoundSearch, BoundVerdict, ReferenceHill, SearchBudget},
    error::KineticsError,
    expr::RateExpr,
    field::{Dual, Field},
    generator::{CompiledGenerator, GeneratorMatrix},
    params::Parameters,
    steady_state::{NumericSolver, SteadyStateVector, steady_state_gth},
};

/// How [`NumericProvider`] takes `s -> ∞` limits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitMethod {
    /// GTH elimination over the leading `s`-terms of every rate. Spanning
    /// tree weights are then read off as leading coefficients, so tiny limits
    /// keep their relative precision. Falls back to [`LimitMethod::Richardson`]
    /// when a leading coefficient leaves the `f64` range.
    #[default]
    LeadingTerms,
    /// Richardson extrapolation of samples at growing `s`.
    Richardson,
}

/// Richardson extrapolation settings for `s -> ∞` limits.
///
/// The fully bound probability is a rational function of `s`, analytic in
/// `1/s` at infinity, so samples at `s_k = initial_s · 2^k` are combined into
/// a Richardson table that eliminates successive powers of `1/s`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimitSettings {
    initial_s: f64,
    levels: usize,
    columns: usize,
    tolerance: f64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            initial_s: 64.0,
            levels: 30,
            columns: 6,
            tolerance: 1e-11,
        }
    }
}

impl LimitSettings {
    /// Validates and creates settings.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `initial_s` or
    /// `tolerance` is not finite and positive, or when `levels < 3` or
    /// `columns == 0`.
    pub fn new(initial_s: f64, levels: usize, columns: usize, tolerance: f64) -> Result<Self> {
        if !initial_s.is_finite() || initial_s <= 0.0 {
            return Err(KineticsError::invalid(
                "initial_s",
                initial_s,
                "must be finite and strictly positive",
            ));
        }
        if levels < 3 {
            return Err(KineticsError::invalid(
                "levels",
                levels,
                "at least three levels are needed",
            ));
        }
        if columns == 0 {
            return Err(KineticsError::invalid("columns", columns, "must be positive"));
        }
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(KineticsError::invalid(
                "tolerance",
                tolerance,
                "must be finite and strictly positive",
            ));
        }
        Ok(Self {
            initial_s,
            levels,
            columns,
            tolerance,
        })
    }

    /// First time-scale sample.
    #[must_use]
    pub fn initial_s(&self) -> f64 {
        self.initial_s
    }

    /// Maximum number of samples.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Maximum Richardson columns.
    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Settling tolerance, relative to `|estimate|`.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Extrapolates `sample(s)` to `s -> ∞`.
    pub(super) fn extrapolate(&self, x: f64, mut sample: impl FnMut(f64) -> Result<f64>) -> Result<f64> {
        let mut previous_row: Vec<f64> = Vec::new();
        let mut previous_estimate: Option<f64> = None;
        let mut delta = f64::INFINITY;
        let mut s = self.initial_s;
        for level in 0..self.levels {
            let mut row = vec![sample(s)?];
            let mut factor = 1.0;
            for column in 1..=level.min(self.columns - 1) {
                factor *= 2.0;
                let (Some(current), Some(earlier)) =
                    (row.get(column - 1).copied(), previous_row.get(column - 1).copied())
                else {
                    break;
                };
                row.push(current + (current - earlier) / (factor - 1.0));
            }
            let estimate = row.last().copied().unwrap_or(f64::NAN);
            if let Some(previous) = previous_estimate {
                delta = (estimate - previous).abs();
                if level >= 2 && delta <= self.tolerance * estimate.abs() {
                    debug!(x, level, estimate, delta, "limit settled");
                    return Ok(estimate);
                }
            }
            previous_estimate = Some(estimate);
            previous_row = row;
            s *= 2.0;
        }
        Err(KineticsError::LimitUnresolved {
            x,
            delta,
            levels: self.levels,
        })
    }
}

/// Floating-point backend.
///
/// # Examples
/// ```
/// use nesthill_core::{GeneratorMatrix, MathProvider, NumericProvider, build_base};
///
/// let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
/// let limit = NumericProvider::new()
///     .limit_fully_bound(&generator, &3.0)
///     .expect("limit settles");
/// assert!((limit - 0.75).abs() < 1e-12);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NumericProvider {
    solver: NumericSolver,
    method: LimitMethod,
    limits: LimitSettings,
}

impl NumericProvider {
    /// Creates a provider with default solver and limit settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the steady-state solver.
    #[must_use]
    pub fn with_solver(mut self, solver: NumericSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Returns the steady-state solver.
    #[must_use]
    pub fn solver(&self) -> &NumericSolver {
        &self.solver
    }

    /// Selects how limits are taken.
    #[must_use]
    pub fn with_limit_method(mut self, method: LimitMethod) -> Self {
        self.method = method;
        self
    }

    /// Returns the limit method.
    #[must_use]
    pub fn limit_method(&self) -> LimitMethod {
        self.method
    }

    /// Replaces the Richardson settings.
    #[must_use]
    pub fn with_limit_settings(mut self, limits: LimitSettings) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the Richardson settings.
    #[must_use]
    pub fn limit_settings(&self) -> &LimitSettings {
        &self.limits
    }
}

/// `P` and `∂P/∂x` at `(x, s)` by GTH over dual numbers.
fn fully_bound_with_derivative(compiled: &CompiledGenerator, x: f64, s: f64) -> Result<Dual<f64>> {
    let generator = compiled
        .at_point(&Dual::variable(x), &Dual::constant(s))
        .ok_or_else(|| KineticsError::invalid("s", s, "must be invertible"))?;
    let dimension = generator.dimension();
    steady_state_gth(&generator)?
        .into_inner()
        .pop()
        .ok_or(KineticsError::SingularSystem {
            nullity: 0,
            dimension,
        })
}

/// `lim_{s -> ∞} P(x, s)` from GTH over leading `s`-terms, or `None` when
/// the elimination breaks down in floating point.
fn fully_bound_at_infinity<F: Field>(compiled: &CompiledGenerator, x: &F) -> Option<F> {
    let generator = compiled.leading_in_s(x);
    let pi = match steady_state_gth(&generator) {
        Ok(pi) => pi,
        Err(err) => {
            debug!(error = %err, "leading-term elimination failed");
            return None;
        }
    };
    let fully_bound = pi.into_inner().pop()?;
    debug!(degree = fully_bound.degree(), "leading term of the fully bound probability");
    fully_bound.at_infinity()
}

/// `P` at `(x, s)` by GTH.
fn fully_bound_gth(compiled: &CompiledGenerator, x: f64, s: f64) -> Result<f64> {
    let generator = compiled
        .at_point(&x, &s)
        .ok_or_else(|| KineticsError::invalid("s", s, "must be invertible"))?;
    let dimension = generator.dimension();
    steady_state_gth(&generator)?
        .into_inner()
        .pop()
        .ok_or(KineticsError::SingularSystem {
            nullity: 0,
            dimension,
        })
}

impl MathProvider for NumericProvider {
    type Value = f64;

    fn name(&self) -> &'static str {
        "numeric"
    }

    fn steady_state(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<f64>,
    ) -> Result<SteadyStateVector<f64>> {
        self.solver.solve(&generator.evaluate(params))
    }

    fn fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<f64>,
    ) -> Result<f64> {
        let compiled = generator.compile()?;
        let value = fully_bound_with_derivative(&compiled, *params.x(), *params.s())?;
        Ok(*value.derivative())
    }

    #[instrument(
        name = "core.provider.numeric.limit",
        err,
        skip(self, generator),
        fields(dimension = generator.dimension(), method = ?self.method),
    )]
    fn limit_fully_bound(&self, generator: &GeneratorMatrix<RateExpr>, x: &f64) -> Result<f64> {
        require_positive_x(x)?;
        let compiled = generator.compile()?;
        let leading = match self.method {
            LimitMethod::LeadingTerms => {
                fully_bound_at_infinity(&compiled, x).filter(|limit| limit.is_finite())
            }
            LimitMethod::Richardson => None,
        };
        let limit = match leading {
            Some(limit) => limit,
            None => self
                .limits
                .extrapolate(*x, |s| fully_bound_gth(&compiled, *x, s))?,
        };
        Ok(limit.clamp(0.0, 1.0))
    }

    #[instrument(
        name = "core.provider.numeric.derivative_limit",
        err,
        skip(self, generator),
        fields(dimension = generator.dimension(), method = ?self.method),
    )]
    fn limit_fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        x: &f64,
    ) -> Result<f64> {
        require_positive_x(x)?;
        let compiled = generator.compile()?;
        let leading = match self.method {
            LimitMethod::LeadingTerms => fully_bound_at_infinity(&compiled, &Dual::variable(*x))
                .map(|limit| *limit.derivative())
                .filter(|slope| slope.is_finite()),
            LimitMethod::Richardson => None,
        };
        match leading {
            Some(slope) => Ok(slope),
            None => self.limits.extrapolate(*x, |s| {
                fully_bound_with_derivative(&compiled, *x, s).map(|value| *value.derivative())
            }),
        }
    }
}

impl SupremumSearch for NumericProvider {
    fn check_uniform_bound(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        reference: &ReferenceHill,
        s: f64,
        claimed: f64,
        budget: &SearchBudget,
    ) -> Result<BoundVerdict> {
        BoundSearch::new(generator, *reference, s, claimed)?.run(budget)
    }
}
