//! Exact rational backend.

use num_rational::BigRational;
use tracing::{debug, instrument};

use super::{
    MathProvider, SupremumSearch, require_positive_x,
    poly::{Polynomial, spanning_tree_weights},
};
use crate::{
    Result,
    convergence::{BoundSearch, BoundVerdict, ReferenceHill, SearchBudget},
    error::KineticsError,
    expr::RateExpr,
    field::{Dual, Field},
    generator::GeneratorMatrix,
    params::Parameters,
    steady_state::{SteadyStateVector, null_space, solve_linear, steady_state_exact},
};

/// Exact backend over [`BigRational`].
///
/// Limits come from the leading coefficients in `s` of the spanning-tree
/// polynomials; the derivative limit carries dual-number coefficients through
/// the same determinants.
///
/// # Examples
/// ```
/// use nesthill_core::{ExactProvider, GeneratorMatrix, KineticsBuilder, MathProvider, Rate};
/// use num_rational::BigRational;
///
/// let graph = KineticsBuilder::new()
///     .build()
///     .expect("defaults are valid")
///     .stabilized_scheme(3, &Rate::time_scale(-1))
///     .expect("within limits");
/// let generator = GeneratorMatrix::build(&graph).expect("scheme shape");
/// let x = BigRational::from_integer(2.into());
/// let limit = ExactProvider.limit_fully_bound(&generator, &x).expect("limit exists");
/// assert_eq!(limit.to_string(), "128/129");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExactProvider;

/// Leading-order data of the tree weights: the top degree of their sum and
/// the coefficient of that degree in the fully bound weight, the others, and
/// the total.
struct LeadingTerms<F> {
    fully_bound: F,
    others: F,
    total: F,
}

fn leading_terms<F: Field>(weights: &[Polynomial<F>], dimension: usize) -> Result<LeadingTerms<F>> {
    let (last, rest) = weights
        .split_last()
        .ok_or_else(|| KineticsError::malformed(dimension, "generator has no states"))?;
    let others = rest
        .iter()
        .fold(Polynomial::zero(), |acc, weight| acc.plus(weight));
    let total = others.plus(last);
    let degree = total.degree().ok_or(KineticsError::SingularSystem {
        nullity: dimension,
        dimension,
    })?;
    debug!(fully_bound = %last, total = %total, "spanning-tree polynomials");
    Ok(LeadingTerms {
        fully_bound: last.coefficient(degree),
        others: others.coefficient(degree),
        total: total.coefficient(degree),
    })
}

impl MathProvider for ExactProvider {
    type Value = BigRational;

    fn name(&self) -> &'static str {
        "exact"
    }

    fn steady_state(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<BigRational>,
    ) -> Result<SteadyStateVector<BigRational>> {
        steady_state_exact(&generator.evaluate_exact(params))
    }

    /// Differentiates `M·π = 0, Σπ = 1` implicitly: with `A` the generator
    /// whose last row is replaced by ones, `A·π' = -M'·π` with a zero last
    /// entry on the right.
    #[instrument(
        name = "core.provider.exact.derivative",
        err,
        skip(self, generator, params),
        fields(dimension = generator.dimension(), x = %params.x(), s = %params.s()),
    )]
    fn fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        params: &Parameters<BigRational>,
    ) -> Result<BigRational> {
        let dimension = generator.dimension();
        let evaluated = generator.evaluate_exact(params);
        let pi = steady_state_exact(&evaluated)?.into_inner();
        let derivative = generator.x_derivative().evaluate_exact(params);
        let last = dimension.saturating_sub(1);

        let mut system = evaluated.entries().to_vec();
        for entry in system.iter_mut().skip(last * dimension) {
            *entry = BigRational::one();
        }
        let rhs: Vec<BigRational> = derivative
            .rows()
            .enumerate()
            .map(|(row, entries)| {
                if row == last {
                    return BigRational::zero();
                }
                entries
                    .iter()
                    .zip(&pi)
                    .fold(BigRational::zero(), |acc, (rate, weight)| {
                        acc.minus(&rate.times(weight))
                    })
            })
            .collect();
        let solution = solve_linear(&system, dimension, &rhs).ok_or_else(|| {
            KineticsError::SingularSystem {
                nullity: null_space(evaluated.entries(), dimension, dimension).len(),
                dimension,
            }
        })?;
        solution
            .last()
            .cloned()
            .ok_or(KineticsError::SingularSystem {
                nullity: 0,
                dimension,
            })
    }

    #[instrument(
        name = "core.provider.exact.limit",
        err,
        skip(self, generator),
        fields(dimension = generator.dimension(), x = %x),
    )]
    fn limit_fully_bound(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        x: &BigRational,
    ) -> Result<BigRational> {
        require_positive_x(x)?;
        let dimension = generator.dimension();
        let weights = spanning_tree_weights(generator, x)?;
        let leading = leading_terms(&weights, dimension)?;
        leading
            .fully_bound
            .quotient(&leading.total)
            .ok_or(KineticsError::SingularSystem {
                nullity: dimension,
                dimension,
            })
    }

    /// With `N` the fully bound tree weight and `R` the sum of the others,
    /// `∂P/∂x = (N'R - NR') / (N + R)^2`; at top degree `D` in `s` the limit
    /// is `(N'_D R_D - N_D R'_D) / (N_D + R_D)^2`.
    #[instrument(
        name = "core.provider.exact.derivative_limit",
        err,
        skip(self, generator),
        fields(dimension = generator.dimension(), x = %x),
    )]
    fn limit_fully_bound_derivative(
        &self,
        generator: &GeneratorMatrix<RateExpr>,
        x: &BigRational,
    ) -> Result<BigRational> {
        require_positive_x(x)?;
        let dimension = generator.dimension();
        let weights = spanning_tree_weights(generator, &Dual::variable(x.clone()))?;
        let leading = leading_terms(&weights, dimension)?;
        let numerator = leading
            .fully_bound
            .derivative()
            .times(leading.others.value())
            .minus(&leading.fully_bound.value().times(leading.others.derivative()));
        let total = leading.total.value();
        numerator
            .quotient(&total.times(total))
            .ok_or(KineticsError::SingularSystem {
                nullity: dimension,
                dimension,
            })
    }
}

/// The enclosures of the bound search are certified in floating point with
/// explicit slack, so the exact backend shares the numeric search.
impl SupremumSearch for ExactProvider {
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
