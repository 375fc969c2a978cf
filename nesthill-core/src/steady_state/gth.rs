//! Grassmann–Taksar–Heyman elimination.
//!
//! Each step removes one state and reroutes its inflow through its outflow to
//! the states still present. Diagonals are recomputed as sums of remaining
//! rates, so the procedure never subtracts. The product of the elimination
//! pivots is the spanning in-tree weight of the retained root (Markov chain
//! tree theorem), which the certified bound search reads in log form.

use tracing::instrument;

use super::{SteadyStateVector, normalize};
use crate::{Result, error::KineticsError, field::Field, generator::GeneratorMatrix};

/// Result of eliminating every state except `root`.
#[derive(Clone, Debug)]
pub(crate) struct Elimination<F> {
    /// Stationary weights relative to the root, in original state order; the
    /// root's entry is one.
    pub(crate) relative: Vec<F>,
    /// Outflow of each eliminated state at the moment it was removed.
    pub(crate) pivots: Vec<F>,
}

impl Elimination<f64> {
    /// Natural log of the root's spanning-tree weight.
    pub(crate) fn log_tree_weight(&self) -> f64 {
        self.pivots.iter().map(|pivot| pivot.ln()).sum()
    }

    /// Natural log of the summed relative weights of every state but `root`.
    pub(crate) fn log_relative_mass_excluding(&self, root: usize) -> f64 {
        self.relative
            .iter()
            .enumerate()
            .filter(|&(index, _)| index != root)
            .map(|(_, weight)| *weight)
            .sum::<f64>()
            .ln()
    }
}

/// Eliminates every state except `root`.
///
/// # Errors
/// Returns [`KineticsError::MalformedGraph`] naming the first state whose
/// remaining outflow vanishes, meaning it cannot reach the retained states.
pub(crate) fn eliminate<F: Field>(
    generator: &GeneratorMatrix<F>,
    root: usize,
) -> Result<Elimination<F>> {
    let dimension = generator.dimension();
    if root >= dimension {
        return Err(KineticsError::malformed(
            dimension,
            format_args!("root state {root} is out of range"),
        ));
    }
    let order: Vec<usize> = (0..dimension)
        .filter(|&state| state != root)
        .chain(std::iter::once(root))
        .collect();
    // rates[i][j] is the rate from order[i] to order[j]
    let mut rates: Vec<Vec<F>> = order
        .iter()
        .map(|&source| order.iter().map(|&target| generator.rate(source, target)).collect())
        .collect();

    let mut pivots = Vec::with_capacity(dimension.saturating_sub(1));
    for step in 0..dimension.saturating_sub(1) {
        let (eliminated, remaining) = rates.split_at_mut(step + 1);
        let Some(outgoing) = eliminated.last() else {
            break;
        };
        let outflow = outgoing
            .iter()
            .skip(step + 1)
            .fold(F::zero(), |acc, rate| acc.plus(rate));
        let Some(inverse) = F::one()
            .quotient(&outflow)
            .filter(|_| outflow.is_strictly_positive())
        else {
            let state = order.get(step).copied().unwrap_or(step);
            return Err(KineticsError::malformed(
                dimension,
                format_args!("state {state} cannot reach state {root} through the remaining states"),
            ));
        };
        for (offset, row) in remaining.iter_mut().enumerate() {
            let source = step + 1 + offset;
            let Some(scaled) = row
                .get(step)
                .filter(|inflow| !inflow.vanishes())
                .map(|inflow| inflow.times(&inverse))
            else {
                continue;
            };
            for (target, (rate, rerouted)) in row.iter_mut().zip(outgoing).enumerate().skip(step + 1) {
                if target != source {
                    *rate = rate.plus(&scaled.times(rerouted));
                }
            }
        }
        pivots.push(outflow);
    }

    let mut permuted = vec![F::zero(); dimension];
    if let Some(last) = permuted.last_mut() {
        *last = F::one();
    }
    for (step, pivot) in pivots.iter().enumerate().rev() {
        let inflow = permuted
            .iter()
            .zip(&rates)
            .skip(step + 1)
            .filter_map(|(weight, row)| row.get(step).map(|rate| weight.times(rate)))
            .fold(F::zero(), |acc, term| acc.plus(&term));
        let weight = inflow
            .quotient(pivot)
            .ok_or_else(|| KineticsError::malformed(dimension, "vanishing elimination pivot"))?;
        if let Some(slot) = permuted.get_mut(step) {
            *slot = weight;
        }
    }

    let mut relative = vec![F::zero(); dimension];
    for (&state, weight) in order.iter().zip(permuted) {
        if let Some(slot) = relative.get_mut(state) {
            *slot = weight;
        }
    }
    Ok(Elimination { relative, pivots })
}

/// Stationary distribution by GTH elimination, rooted at the fully bound
/// state.
///
/// # Errors
/// Returns [`KineticsError::MalformedGraph`] when some state cannot reach the
/// fully bound state.
///
/// # Examples
/// ```
/// use nesthill_core::{GeneratorMatrix, Parameters, build_base, steady_state_gth};
///
/// let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
/// let numeric = generator.evaluate(&Parameters::new(3.0, 1.0).expect("valid"));
/// let pi = steady_state_gth(&numeric).expect("strongly connected");
/// assert!((pi.fully_bound().copied().unwrap_or_default() - 0.75).abs() < 1e-15);
/// ```
#[instrument(
    name = "core.steady_state.gth",
    err,
    skip(generator),
    fields(dimension = generator.dimension()),
)]
pub fn steady_state_gth<F: Field>(generator: &GeneratorMatrix<F>) -> Result<SteadyStateVector<F>> {
    let dimension = generator.dimension();
    let root = dimension.checked_sub(1).ok_or_else(|| {
        KineticsError::malformed(0, "generator has no states")
    })?;
    let elimination = eliminate(generator, root)?;
    let probabilities = normalize(elimination.relative)
        .ok_or_else(|| KineticsError::malformed(dimension, "relative weights sum to zero"))?;
    Ok(SteadyStateVector::new(probabilities))
}
