//! Stationary distributions of evaluated generators.
//!
//! Three solvers share the [`SteadyStateVector`] output:
//!
//! - [`steady_state_exact`] extracts the null space over the rationals.
//! - [`NumericSolver`] replaces one equation of a column-equilibrated system
//!   with the normalization constraint and guards the solve with an SVD
//!   condition estimate.
//! - [`steady_state_gth`] runs Grassmann–Taksar–Heyman elimination, which
//!   never subtracts and so stays accurate when rates span many orders of
//!   magnitude.

mod exact;
mod gth;
mod numeric;

use std::fmt;

use crate::field::Field;

pub use self::{
    exact::steady_state_exact,
    gth::steady_state_gth,
    numeric::{DEFAULT_CONDITION_THRESHOLD, NumericSolver, SolveMethod},
};
pub(crate) use self::{
    exact::{null_space, solve_linear},
    gth::eliminate,
};

/// Probability of every state, in the graph's vertex order.
///
/// Entries are non-negative and sum to one; the last entry is the
/// probability of the fully bound state.
#[derive(Clone, Debug, PartialEq)]
pub struct SteadyStateVector<T> {
    probabilities: Vec<T>,
}

impl<T> SteadyStateVector<T> {
    pub(crate) fn new(probabilities: Vec<T>) -> Self {
        Self { probabilities }
    }

    /// Probabilities in vertex order.
    #[must_use]
    pub fn probabilities(&self) -> &[T] {
        &self.probabilities
    }

    /// Probability of the fully bound state.
    #[must_use]
    pub fn fully_bound(&self) -> Option<&T> {
        self.probabilities.last()
    }

    /// Consumes the vector and returns its probabilities.
    #[must_use]
    pub fn into_inner(self) -> Vec<T> {
        self.probabilities
    }
}

impl<T: fmt::Display> fmt::Display for SteadyStateVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, probability) in self.probabilities.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{probability}")?;
        }
        f.write_str(")")
    }
}

/// Scales `weights` to sum to one, or `None` if the sum is not invertible.
pub(crate) fn normalize<F: Field>(weights: Vec<F>) -> Option<Vec<F>> {
    let total = weights.iter().fold(F::zero(), |acc, weight| acc.plus(weight));
    let inverse = F::one().quotient(&total)?;
    Some(weights.iter().map(|weight| weight.times(&inverse)).collect())
}
