//! Exact null-space extraction over the rationals.

use num_rational::BigRational;
use tracing::instrument;

use super::{SteadyStateVector, normalize};
use crate::{Result, error::KineticsError, field::Field, generator::GeneratorMatrix};

/// Reduces `rows` (each holding `columns` entries) to reduced row echelon
/// form in place and returns the pivot column of each leading row.
fn reduce<F: Field>(rows: &mut [Vec<F>], columns: usize) -> Vec<usize> {
    let mut pivots = Vec::new();
    let mut lead = 0;
    for column in 0..columns {
        if lead == rows.len() {
            break;
        }
        // Largest magnitude keeps floating-point instantiations usable; any
        // non-zero entry would do over the rationals.
        let pivot = rows
            .iter()
            .enumerate()
            .skip(lead)
            .filter_map(|(index, row)| {
                row.get(column)
                    .filter(|entry| !entry.vanishes())
                    .map(|entry| (index, entry.approximate().abs()))
            })
            .max_by(|left, right| left.1.total_cmp(&right.1))
            .map(|(index, _)| index);
        let Some(pivot) = pivot else {
            continue;
        };
        rows.swap(pivot, lead);
        let (before, rest) = rows.split_at_mut(lead);
        let Some((leading, after)) = rest.split_first_mut() else {
            break;
        };
        let Some(inverse) = leading.get(column).and_then(|entry| F::one().quotient(entry)) else {
            continue;
        };
        for entry in leading.iter_mut().skip(column) {
            *entry = entry.times(&inverse);
        }
        for row in before.iter_mut().chain(after.iter_mut()) {
            let Some(factor) = row.get(column).filter(|entry| !entry.vanishes()).cloned() else {
                continue;
            };
            for (entry, pivot_entry) in row.iter_mut().zip(leading.iter()).skip(column) {
                *entry = entry.minus(&factor.times(pivot_entry));
            }
        }
        pivots.push(column);
        lead += 1;
    }
    pivots
}

/// Basis of the null space of a row-major `rows x columns` matrix, one
/// vector per free column of its reduced row echelon form.
pub(crate) fn null_space<F: Field>(matrix: &[F], rows: usize, columns: usize) -> Vec<Vec<F>> {
    let mut reduced: Vec<Vec<F>> = matrix
        .chunks(columns.max(1))
        .take(rows)
        .map(<[F]>::to_vec)
        .collect();
    let pivots = reduce(&mut reduced, columns);
    (0..columns)
        .filter(|column| !pivots.contains(column))
        .map(|free| {
            let mut vector = vec![F::zero(); columns];
            if let Some(entry) = vector.get_mut(free) {
                *entry = F::one();
            }
            for (row, &pivot) in reduced.iter().zip(&pivots) {
                if let (Some(entry), Some(value)) = (vector.get_mut(pivot), row.get(free)) {
                    *entry = value.negated();
                }
            }
            vector
        })
        .collect()
}

/// Solves the square system `matrix · solution = rhs`, or `None` when the
/// matrix is singular.
pub(crate) fn solve_linear<F: Field>(
    matrix: &[F],
    dimension: usize,
    rhs: &[F],
) -> Option<Vec<F>> {
    let mut augmented = (0..dimension)
        .map(|row| {
            let mut equation = matrix.get(row * dimension..(row + 1) * dimension)?.to_vec();
            equation.push(rhs.get(row)?.clone());
            Some(equation)
        })
        .collect::<Option<Vec<_>>>()?;
    let pivots = reduce(&mut augmented, dimension + 1);
    if pivots.len() != dimension || pivots.iter().enumerate().any(|(row, &col)| row != col) {
        return None;
    }
    augmented
        .iter()
        .map(|equation| equation.get(dimension).cloned())
        .collect()
}

/// Exact stationary distribution of a rational generator.
///
/// # Errors
/// Returns [`KineticsError::SingularSystem`] when the null space does not
/// have dimension one.
///
/// # Examples
/// ```
/// use nesthill_core::{GeneratorMatrix, Parameters, build_base, steady_state_exact};
/// use num_rational::BigRational;
///
/// let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
/// let x = BigRational::from_integer(3.into());
/// let params = Parameters::new(x, BigRational::from_integer(1.into())).expect("valid");
/// let pi = steady_state_exact(&generator.evaluate_exact(&params)).expect("unique");
/// assert_eq!(pi.fully_bound().map(ToString::to_string).as_deref(), Some("3/4"));
/// ```
#[instrument(
    name = "core.steady_state.exact",
    err,
    skip(generator),
    fields(dimension = generator.dimension()),
)]
pub fn steady_state_exact(
    generator: &GeneratorMatrix<BigRational>,
) -> Result<SteadyStateVector<BigRational>> {
    let dimension = generator.dimension();
    let singular = |nullity| KineticsError::SingularSystem { nullity, dimension };
    let mut basis = null_space(generator.entries(), dimension, dimension);
    if basis.len() != 1 {
        return Err(singular(basis.len()));
    }
    let vector = basis.pop().ok_or_else(|| singular(0))?;
    let probabilities = normalize(vector).ok_or_else(|| singular(1))?;
    Ok(SteadyStateVector::new(probabilities))
}
