//! Univariate polynomials in `s` and fraction-free determinants over them.

use std::fmt;

use crate::{
    Result,
    error::KineticsError,
    expr::RateExpr,
    field::{Field, power},
    generator::GeneratorMatrix,
};

/// Polynomial with coefficients in ascending degree, trimmed so the last
/// coefficient never vanishes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Polynomial<F> {
    coefficients: Vec<F>,
}

impl<F: Field> Polynomial<F> {
    pub(crate) fn zero() -> Self {
        Self {
            coefficients: Vec::new(),
        }
    }

    pub(crate) fn constant(value: F) -> Self {
        Self::from_coefficients(vec![value])
    }

    pub(crate) fn from_coefficients(coefficients: Vec<F>) -> Self {
        let mut polynomial = Self { coefficients };
        polynomial.trim();
        polynomial
    }

    fn trim(&mut self) {
        while self.coefficients.last().is_some_and(Field::vanishes) {
            self.coefficients.pop();
        }
    }

    pub(crate) fn is_zero(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Degree, or `None` for the zero polynomial.
    pub(crate) fn degree(&self) -> Option<usize> {
        self.coefficients.len().checked_sub(1)
    }

    /// Coefficient of `s^degree`; zero beyond the stored range.
    pub(crate) fn coefficient(&self, degree: usize) -> F {
        self.coefficients.get(degree).cloned().unwrap_or_else(F::zero)
    }

    pub(crate) fn plus(&self, other: &Self) -> Self {
        let length = self.coefficients.len().max(other.coefficients.len());
        Self::from_coefficients(
            (0..length)
                .map(|degree| self.coefficient(degree).plus(&other.coefficient(degree)))
                .collect(),
        )
    }

    pub(crate) fn negated(&self) -> Self {
        Self {
            coefficients: self.coefficients.iter().map(Field::negated).collect(),
        }
    }

    pub(crate) fn minus(&self, other: &Self) -> Self {
        self.plus(&other.negated())
    }

    pub(crate) fn times(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let mut product = vec![F::zero(); self.coefficients.len() + other.coefficients.len() - 1];
        for (i, left) in self.coefficients.iter().enumerate() {
            for (slot, right) in product.iter_mut().skip(i).zip(&other.coefficients) {
                *slot = slot.plus(&left.times(right));
            }
        }
        Self::from_coefficients(product)
    }

    /// Quotient of an exact division, or `None` when `divisor` is zero, its
    /// leading coefficient is not invertible, or a remainder is left.
    pub(crate) fn divide_exact(&self, divisor: &Self) -> Option<Self> {
        let divisor_degree = divisor.degree()?;
        let lead_inverse = F::one().quotient(divisor.coefficients.last()?)?;
        let Some(degree) = self.degree() else {
            return Some(Self::zero());
        };
        if degree < divisor_degree {
            return None;
        }
        let mut remainder = self.coefficients.clone();
        let mut quotient = vec![F::zero(); degree - divisor_degree + 1];
        for shift in (0..quotient.len()).rev() {
            let factor = remainder.get(shift + divisor_degree)?.times(&lead_inverse);
            if factor.vanishes() {
                continue;
            }
            for (slot, coefficient) in remainder.iter_mut().skip(shift).zip(&divisor.coefficients) {
                *slot = slot.minus(&factor.times(coefficient));
            }
            if let Some(slot) = quotient.get_mut(shift) {
                *slot = factor;
            }
        }
        remainder
            .iter()
            .all(Field::vanishes)
            .then(|| Self::from_coefficients(quotient))
    }
}

impl<F: Field> fmt::Display for Polynomial<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut first = true;
        for (degree, coefficient) in self.coefficients.iter().enumerate().rev() {
            if coefficient.vanishes() {
                continue;
            }
            if !first {
                f.write_str(" + ")?;
            }
            first = false;
            match degree {
                0 => write!(f, "({coefficient})")?,
                1 => write!(f, "({coefficient})*s")?,
                _ => write!(f, "({coefficient})*s^{degree}")?,
            }
        }
        Ok(())
    }
}

/// Determinant of a square polynomial matrix given by rows, by Bareiss'
/// fraction-free elimination, or `None` when a division fails.
pub(crate) fn determinant<F: Field>(mut rows: Vec<Vec<Polynomial<F>>>) -> Option<Polynomial<F>> {
    let mut negate = false;
    let mut previous = Polynomial::constant(F::one());
    for step in 0..rows.len().saturating_sub(1) {
        if rows.get(step)?.get(step)?.is_zero() {
            let swap = rows
                .iter()
                .skip(step + 1)
                .position(|row| row.get(step).is_some_and(|entry| !entry.is_zero()));
            let Some(offset) = swap else {
                return Some(Polynomial::zero());
            };
            rows.swap(step, step + 1 + offset);
            negate = !negate;
        }
        let (done, rest) = rows.split_at_mut(step + 1);
        let pivot_row = done.last()?;
        let pivot = pivot_row.get(step)?.clone();
        for row in rest {
            let below = row.get(step)?.clone();
            for (entry, above) in row.iter_mut().zip(pivot_row).skip(step + 1) {
                let cross = entry.times(&pivot).minus(&below.times(above));
                *entry = cross.divide_exact(&previous)?;
            }
        }
        previous = pivot;
    }
    let Some(last) = rows.last().and_then(|row| row.last()).cloned() else {
        return Some(Polynomial::constant(F::one()));
    };
    Some(if negate { last.negated() } else { last })
}

/// Spanning in-tree weight of every state as a polynomial in `s`, with `x`
/// bound to `x`.
///
/// Every rate is multiplied by the same power of `s` so no exponent is
/// negative; the common factor cancels from every ratio of tree weights.
///
/// # Errors
/// Returns [`KineticsError::SingularSystem`] when the fraction-free
/// elimination cannot divide exactly.
pub(crate) fn spanning_tree_weights<F: Field>(
    generator: &GeneratorMatrix<RateExpr>,
    x: &F,
) -> Result<Vec<Polynomial<F>>> {
    let dimension = generator.dimension();
    let shift = generator
        .entries()
        .iter()
        .flat_map(RateExpr::terms)
        .map(|(_, s_power, _)| s_power)
        .min()
        .unwrap_or(0)
        .min(0)
        .unsigned_abs();

    // Laplacian L = -M over polynomials in s.
    let mut laplacian = vec![vec![Polynomial::zero(); dimension]; dimension];
    for target in 0..dimension {
        for source in (0..dimension).filter(|&source| source != target) {
            let Some(entry) = generator.get(target, source) else {
                continue;
            };
            let mut rate = Vec::new();
            for (x_power, s_power, coefficient) in entry.terms() {
                let degree = usize::try_from(i64::from(s_power) + i64::from(shift))
                    .map_err(|_| KineticsError::malformed(dimension, "rate exponent overflow"))?;
                if rate.len() <= degree {
                    rate.resize(degree + 1, F::zero());
                }
                let value = F::from_rational(coefficient).times(&power(x, x_power));
                if let Some(slot) = rate.get_mut(degree) {
                    *slot = slot.plus(&value);
                }
            }
            let rate = Polynomial::from_coefficients(rate);
            if let Some(slot) = laplacian.get_mut(target).and_then(|row| row.get_mut(source)) {
                *slot = rate.negated();
            }
            if let Some(slot) = laplacian.get_mut(source).and_then(|row| row.get_mut(source)) {
                *slot = slot.plus(&rate);
            }
        }
    }

    (0..dimension)
        .map(|root| {
            let minor: Vec<Vec<Polynomial<F>>> = laplacian
                .iter()
                .enumerate()
                .filter(|&(row, _)| row != root)
                .map(|(_, entries)| {
                    entries
                        .iter()
                        .enumerate()
                        .filter(|&(column, _)| column != root)
                        .map(|(_, entry)| entry.clone())
                        .collect()
                })
                .collect();
            determinant(minor).ok_or(KineticsError::SingularSystem {
                nullity: 0,
                dimension,
            })
        })
        .collect()
}
