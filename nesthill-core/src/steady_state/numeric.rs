//! Floating-point stationary distributions on `nalgebra`.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, instrument};

use super::{SteadyStateVector, gth::steady_state_gth, normalize};
use crate::{
    Result,
    error::KineticsError,
    generator::GeneratorMatrix,
    graph::{adjacency, closed_classes, strongly_connected},
};

/// Default ceiling on the 2-norm condition estimate of the replaced-row
/// system.
pub const DEFAULT_CONDITION_THRESHOLD: f64 = 1e13;

/// Rows tried as the normalization row, by descending norm.
const CANDIDATE_ROWS: usize = 3;

/// Relative size of negative entries attributed to rounding.
const NEGATIVE_TOLERANCE: f64 = 1e-9;

/// Algorithm used by [`NumericSolver`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolveMethod {
    /// Column-equilibrated LU solve with one equation replaced by the
    /// normalization constraint, guarded by an SVD condition estimate.
    #[default]
    ReplacedRow,
    /// Subtraction-free GTH elimination.
    Gth,
}

/// Configurable floating-point steady-state solver.
///
/// # Examples
/// ```
/// use nesthill_core::{GeneratorMatrix, NumericSolver, Parameters, SolveMethod, build_base};
///
/// let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
/// let numeric = generator.evaluate(&Parameters::new(1.0, 1.0).expect("valid"));
/// for method in [SolveMethod::ReplacedRow, SolveMethod::Gth] {
///     let pi = NumericSolver::new().with_method(method).solve(&numeric).expect("solves");
///     assert!((pi.probabilities()[0] - 0.5).abs() < 1e-12);
/// }
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericSolver {
    method: SolveMethod,
    condition_threshold: f64,
}

impl Default for NumericSolver {
    fn default() -> Self {
        Self {
            method: SolveMethod::default(),
            condition_threshold: DEFAULT_CONDITION_THRESHOLD,
        }
    }
}

impl NumericSolver {
    /// Creates a solver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the solve algorithm.
    #[must_use]
    pub fn with_method(mut self, method: SolveMethod) -> Self {
        self.method = method;
        self
    }

    /// Returns the solve algorithm.
    #[must_use]
    pub fn method(&self) -> SolveMethod {
        self.method
    }

    /// Overrides the condition threshold of the replaced-row solve.
    #[must_use]
    pub fn with_condition_threshold(mut self, threshold: f64) -> Self {
        self.condition_threshold = threshold;
        self
    }

    /// Returns the condition threshold.
    #[must_use]
    pub fn condition_threshold(&self) -> f64 {
        self.condition_threshold
    }

    /// Solves `M·π = 0` with `Σπ = 1`.
    ///
    /// The replaced-row method falls back to GTH elimination when the
    /// equilibrated system loses rank in floating point, when no candidate
    /// system is conditioned within the threshold, or when the solve leaves
    /// negative mass behind.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for a threshold below one or
    /// not finite, [`KineticsError::SingularSystem`] when the transition
    /// structure is not strongly connected, and
    /// [`KineticsError::NumericInstability`] when a rate is not finite or the
    /// system is conditioned beyond the threshold and GTH elimination also
    /// fails. Otherwise the errors of [`super::steady_state_gth`] are
    /// returned.
    #[instrument(
        name = "core.steady_state.numeric",
        err,
        skip(self, generator),
        fields(dimension = generator.dimension(), method = ?self.method),
    )]
    pub fn solve(&self, generator: &GeneratorMatrix<f64>) -> Result<SteadyStateVector<f64>> {
        match self.method {
            SolveMethod::Gth => steady_state_gth(generator),
            SolveMethod::ReplacedRow => self.solve_replaced_row(generator),
        }
    }

    fn solve_replaced_row(&self, generator: &GeneratorMatrix<f64>) -> Result<SteadyStateVector<f64>> {
        let threshold = self.condition_threshold;
        if !threshold.is_finite() || threshold < 1.0 {
            return Err(KineticsError::invalid(
                "condition_threshold",
                threshold,
                "must be finite and at least one",
            ));
        }
        let dimension = generator.dimension();
        if dimension == 0 {
            return Err(KineticsError::malformed(0, "generator has no states"));
        }
        if generator.entries().iter().any(|rate| !rate.is_finite()) {
            return Err(KineticsError::NumericInstability {
                condition: f64::INFINITY,
                threshold,
            });
        }
        let successors = transition_structure(generator);
        if !strongly_connected(&successors) {
            return Err(KineticsError::SingularSystem {
                nullity: closed_classes(&successors),
                dimension,
            });
        }

        let mut matrix = generator.to_dmatrix();
        let scales: Vec<f64> = matrix
            .diagonal()
            .iter()
            .map(|diagonal| {
                let diagonal = diagonal.abs();
                if diagonal.is_normal() { diagonal } else { 1.0 }
            })
            .collect();
        for (column, scale) in scales.iter().enumerate() {
            matrix.column_mut(column).unscale_mut(*scale);
        }

        let nullity = numerical_nullity(&matrix);
        if nullity != 1 {
            debug!(nullity, "equilibrated generator lost rank in floating point");
            return fall_back(generator, f64::INFINITY, threshold);
        }

        let mut rows: Vec<usize> = (0..dimension).collect();
        rows.sort_by(|&a, &b| matrix.row(b).norm().total_cmp(&matrix.row(a).norm()));
        let (condition, system, replaced) = rows
            .iter()
            .take(CANDIDATE_ROWS)
            .map(|&row| {
                let mut system = matrix.clone();
                system.row_mut(row).fill(1.0);
                (condition_estimate(&system), system, row)
            })
            .min_by(|left, right| left.0.total_cmp(&right.0))
            .ok_or_else(|| KineticsError::malformed(dimension, "generator has no rows"))?;
        debug!(replaced, condition, "normalization row selected");
        if condition > threshold {
            return fall_back(generator, condition, threshold);
        }

        let mut rhs = DVector::zeros(dimension);
        if let Some(entry) = rhs.get_mut(replaced) {
            *entry = 1.0;
        }
        let Some(scaled) = system.lu().solve(&rhs) else {
            debug!(condition, "replaced-row factorization is singular");
            return fall_back(generator, condition, threshold);
        };
        let weights: Vec<f64> = scaled
            .iter()
            .zip(&scales)
            .map(|(value, scale)| value / scale)
            .collect();

        let largest = weights.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()));
        let floor = -NEGATIVE_TOLERANCE * largest;
        if let Some(&worst) = weights
            .iter()
            .find(|value| !value.is_finite() || **value < floor)
        {
            debug!(condition, worst, "replaced-row solve left negative mass");
            return fall_back(generator, condition, threshold);
        }
        let clamped = weights.into_iter().map(|value| value.max(0.0)).collect();
        match normalize(clamped) {
            Some(probabilities) => Ok(SteadyStateVector::new(probabilities)),
            None => fall_back(generator, condition, threshold),
        }
    }
}

/// Solves by GTH elimination after the replaced-row system was rejected.
///
/// `condition` is the estimate that disqualified the replaced-row system, or
/// infinity when the equilibrated matrix was rank deficient.
fn fall_back(
    generator: &GeneratorMatrix<f64>,
    condition: f64,
    threshold: f64,
) -> Result<SteadyStateVector<f64>> {
    debug!(condition, threshold, "falling back to GTH elimination");
    match steady_state_gth(generator) {
        Ok(pi) if pi.probabilities().iter().all(|p| p.is_finite()) => Ok(pi),
        Ok(_) => Err(KineticsError::NumericInstability {
            condition: f64::INFINITY,
            threshold,
        }),
        Err(_) if condition > threshold => Err(KineticsError::NumericInstability {
            condition,
            threshold,
        }),
        Err(err) => Err(err),
    }
}

/// Successor lists of the transitions with a positive rate.
fn transition_structure(generator: &GeneratorMatrix<f64>) -> Vec<Vec<usize>> {
    let dimension = generator.dimension();
    let pairs = (0..dimension)
        .flat_map(|source| (0..dimension).map(move |target| (source, target)))
        .filter(|&(source, target)| source != target && generator.rate(source, target) > 0.0);
    adjacency(dimension, pairs)
}

/// Number of singular values within `dimension · ε · σ_max` of zero.
fn numerical_nullity(matrix: &DMatrix<f64>) -> usize {
    let singular = matrix.singular_values();
    let size = f64::from(u32::try_from(matrix.nrows()).unwrap_or(u32::MAX));
    let tolerance = size * f64::EPSILON * singular.max();
    singular.iter().filter(|&&value| value <= tolerance).count()
}

/// 2-norm condition number from the singular values.
fn condition_estimate(matrix: &DMatrix<f64>) -> f64 {
    let singular = matrix.singular_values();
    let smallest = singular.min();
    if smallest > 0.0 {
        singular.max() / smallest
    } else {
        f64::INFINITY
    }
}
