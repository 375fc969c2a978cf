//! Markov generator (Laplacian) matrices of kinetic graphs.
//!
//! Column `j` of a generator holds the rates out of vertex `j`: the entry in
//! row `i != j` is the rate of `j -> i` and the diagonal is minus the total
//! outflow, so every column sums to zero.

use std::fmt;

use nalgebra::DMatrix;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use tracing::instrument;

use crate::{
    Result,
    error::KineticsError,
    expr::RateExpr,
    field::{Field, Leading, power},
    graph::KineticGraph,
    params::Parameters,
};

/// Dense square generator matrix stored row-major.
///
/// Symbolic generators hold [`RateExpr`] entries; evaluating one at bound
/// parameters yields a `GeneratorMatrix<F>` over any [`Field`].
///
/// # Examples
/// ```
/// use nesthill_core::{GeneratorMatrix, Parameters, build_base};
///
/// let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
/// assert_eq!(generator.get(1, 0).map(ToString::to_string).as_deref(), Some("x"));
/// let numeric = generator.evaluate(&Parameters::new(3.0, 1.0).expect("valid"));
/// assert_eq!(numeric.column_sums(), vec![0.0, 0.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorMatrix<T> {
    dimension: usize,
    entries: Vec<T>,
}

impl<T> GeneratorMatrix<T> {
    /// Number of states.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Entry at `(row, column)`, if in range.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&T> {
        (row < self.dimension && column < self.dimension)
            .then(|| self.entries.get(row * self.dimension + column))
            .flatten()
    }

    /// Rows in state order.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.entries.chunks(self.dimension.max(1))
    }

    pub(crate) fn entries(&self) -> &[T] {
        &self.entries
    }

    fn at(&self, row: usize, column: usize) -> Option<&T> {
        self.entries.get(row * self.dimension + column)
    }

    fn at_mut(&mut self, row: usize, column: usize) -> Option<&mut T> {
        self.entries.get_mut(row * self.dimension + column)
    }

    fn map_entries<U>(&self, mut map: impl FnMut(usize, usize, &T) -> U) -> GeneratorMatrix<U> {
        let dimension = self.dimension;
        GeneratorMatrix {
            dimension,
            entries: self
                .entries
                .iter()
                .enumerate()
                .map(|(index, entry)| map(index / dimension, index % dimension, entry))
                .collect(),
        }
    }
}

impl GeneratorMatrix<RateExpr> {
    /// Assembles the symbolic generator of `graph`.
    ///
    /// # Errors
    /// Returns [`KineticsError::MalformedGraph`] when `graph` fails
    /// [`KineticGraph::validate_scheme_shape`].
    #[instrument(
        name = "core.generator.build",
        err,
        skip(graph),
        fields(vertices = graph.vertices().len(), edges = graph.edges().len()),
    )]
    pub fn build(graph: &KineticGraph) -> Result<Self> {
        graph.validate_scheme_shape()?;
        let dimension = graph.vertices().len();
        let mut generator = Self {
            dimension,
            entries: vec![RateExpr::zero(); dimension * dimension],
        };
        for edge in graph.edges() {
            let (source, target) = (edge.source(), edge.target());
            // edges are unique per ordered pair, so each off-diagonal entry is one rate
            if let Some(entry) = generator.at_mut(target, source) {
                *entry = RateExpr::from_rate(edge.rate());
            }
            if let Some(diagonal) = generator.at_mut(source, source) {
                diagonal.subtract_rate(edge.rate());
            }
        }
        Ok(generator)
    }

    /// Evaluates every entry at `params`.
    ///
    /// Diagonal entries are recomputed from the evaluated off-diagonal entries
    /// of their column, so columns sum to zero exactly in every field.
    #[must_use]
    pub fn evaluate<F: Field>(&self, params: &Parameters<F>) -> GeneratorMatrix<F> {
        let evaluated = self.map_entries(|row, column, entry| {
            if row == column {
                F::zero()
            } else {
                entry.evaluate(params)
            }
        });
        evaluated.with_balanced_diagonal()
    }

    /// Evaluates every entry at exact rational parameters.
    #[must_use]
    pub fn evaluate_exact(&self, params: &Parameters<BigRational>) -> GeneratorMatrix<BigRational> {
        self.evaluate(params)
    }

    /// Entrywise `∂/∂x`, as used for implicit differentiation of the steady
    /// state.
    #[must_use]
    pub fn x_derivative(&self) -> Self {
        self.map_entries(|_, _, entry| entry.x_derivative())
    }

    /// Symbolic column sums; every entry is identically zero for a generator
    /// assembled by [`GeneratorMatrix::build`].
    #[must_use]
    pub fn conservation_residuals(&self) -> Vec<RateExpr> {
        (0..self.dimension)
            .map(|column| {
                let mut sum = RateExpr::zero();
                for entry in (0..self.dimension).filter_map(|row| self.at(row, column)) {
                    sum.add_expr(entry);
                }
                sum
            })
            .collect()
    }

    pub(crate) fn compile(&self) -> Result<CompiledGenerator> {
        CompiledGenerator::new(self)
    }
}

impl<F: Field> GeneratorMatrix<F> {
    fn outflow(&self, column: usize) -> F {
        (0..self.dimension)
            .filter(|&row| row != column)
            .filter_map(|row| self.at(row, column))
            .fold(F::zero(), |acc, rate| acc.plus(rate))
    }

    /// Recomputes every diagonal entry from the off-diagonal entries of its
    /// column.
    fn with_balanced_diagonal(mut self) -> Self {
        for column in 0..self.dimension {
            let outflow = self.outflow(column);
            if let Some(diagonal) = self.at_mut(column, column) {
                *diagonal = outflow.negated();
            }
        }
        self
    }

    /// Sum of every column: total outflow plus the diagonal, accumulated in
    /// the order the diagonal was derived, so evaluated generators report
    /// exact zeros.
    #[must_use]
    pub fn column_sums(&self) -> Vec<F> {
        (0..self.dimension)
            .map(|column| {
                let outflow = self.outflow(column);
                match self.at(column, column) {
                    Some(diagonal) => outflow.plus(diagonal),
                    None => outflow,
                }
            })
            .collect()
    }

    /// Rate of the transition `source -> target`; zero on the diagonal.
    pub(crate) fn rate(&self, source: usize, target: usize) -> F {
        if source == target {
            F::zero()
        } else {
            self.at(target, source).cloned().unwrap_or_else(F::zero)
        }
    }
}

impl GeneratorMatrix<f64> {
    /// Copies the generator into an `nalgebra` matrix.
    #[must_use]
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.dimension, self.dimension, &self.entries)
    }
}

impl<T: fmt::Display> fmt::Display for GeneratorMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = self.entries.iter().map(ToString::to_string).collect();
        let width = cells.iter().map(String::len).max().unwrap_or(1);
        for row in cells.chunks(self.dimension.max(1)) {
            f.write_str("[")?;
            for (index, cell) in row.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{cell:>width$}")?;
            }
            f.write_str("]\n")?;
        }
        Ok(())
    }
}

/// One monomial contribution to an off-diagonal generator entry.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CompiledTerm {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) coefficient: f64,
    pub(crate) x_power: u32,
    pub(crate) s_power: i32,
}

/// Floating-point form of a symbolic generator for repeated evaluation.
///
/// Besides ordinary evaluation at `(x, s)` it supports the homogeneous form
/// in which `x = numerator / denominator` and every rate is multiplied by
/// `denominator^degree`, which stays finite as `x -> ∞`.
#[derive(Clone, Debug)]
pub(crate) struct CompiledGenerator {
    dimension: usize,
    terms: Vec<CompiledTerm>,
    degree: u32,
}

impl CompiledGenerator {
    fn new(generator: &GeneratorMatrix<RateExpr>) -> Result<Self> {
        let dimension = generator.dimension;
        let mut terms = Vec::new();
        for target in 0..dimension {
            for source in (0..dimension).filter(|&source| source != target) {
                let Some(entry) = generator.at(target, source) else {
                    continue;
                };
                if !entry.is_positive_combination() {
                    return Err(KineticsError::malformed(
                        dimension,
                        format_args!("rate {source} -> {target} = {entry} has a non-positive term"),
                    ));
                }
                for (x_power, s_power, coefficient) in entry.terms() {
                    let value = coefficient.to_f64().filter(|value| *value > 0.0);
                    let Some(value) = value else {
                        return Err(KineticsError::malformed(
                            dimension,
                            format_args!(
                                "rate {source} -> {target} has coefficient {coefficient} \
                                 outside the floating-point range"
                            ),
                        ));
                    };
                    terms.push(CompiledTerm {
                        source,
                        target,
                        coefficient: value,
                        x_power,
                        s_power,
                    });
                }
            }
        }
        let degree = terms.iter().map(|term| term.x_power).max().unwrap_or(0);
        Ok(Self {
            dimension,
            terms,
            degree,
        })
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    /// Assembles a generator whose off-diagonal entries are `weight(term)`
    /// summed per entry.
    pub(crate) fn assemble<F: Field>(
        &self,
        mut weight: impl FnMut(&CompiledTerm) -> F,
    ) -> GeneratorMatrix<F> {
        let dimension = self.dimension;
        let mut entries = vec![F::zero(); dimension * dimension];
        for term in &self.terms {
            if let Some(entry) = entries.get_mut(term.target * dimension + term.source) {
                *entry = entry.plus(&weight(term));
            }
        }
        GeneratorMatrix { dimension, entries }.with_balanced_diagonal()
    }

    /// Evaluates at `(x, s)`; `x` may be zero.
    pub(crate) fn at_point<F: Field>(&self, x: &F, s: &F) -> Option<GeneratorMatrix<F>> {
        let s_inverse = F::one().quotient(s)?;
        Some(self.assemble(|term| {
            let s_factor = if term.s_power >= 0 {
                power(s, term.s_power.unsigned_abs())
            } else {
                power(&s_inverse, term.s_power.unsigned_abs())
            };
            F::from_float_value(term.coefficient)
                .times(&power(x, term.x_power))
                .times(&s_factor)
        }))
    }

    /// Leading terms in `s` of every rate at concentration `x`.
    pub(crate) fn leading_in_s<F: Field>(&self, x: &F) -> GeneratorMatrix<Leading<F>> {
        self.assemble(|term| {
            let coefficient = F::from_float_value(term.coefficient).times(&power(x, term.x_power));
            Leading::new(coefficient, i64::from(term.s_power))
        })
    }

    /// Evaluates the homogeneous form at `x = numerator / denominator`.
    pub(crate) fn homogeneous(&self, numerator: f64, denominator: f64, s: f64) -> GeneratorMatrix<f64> {
        self.assemble(|term| {
            term.coefficient
                * numerator.powi(exponent(term.x_power))
                * denominator.powi(exponent(self.degree - term.x_power))
                * s.powi(term.s_power)
        })
    }
}

fn exponent(power: u32) -> i32 {
    i32::try_from(power).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests;
