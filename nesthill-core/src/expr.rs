//! Canonical sums of rate monomials used as generator entries.

use std::{collections::BTreeMap, fmt};

use num_rational::BigRational;
use num_traits::{Signed, Zero};

use crate::{
    field::Field,
    params::Parameters,
    rate::{Rate, evaluate_monomial, fmt_monomial},
};

/// A polynomial in `x` and Laurent polynomial in `s` with rational
/// coefficients, kept in canonical form: one coefficient per `(x, s)` power
/// pair, no zero coefficients, terms ordered by power.
///
/// Structural equality of two `RateExpr` values is therefore algebraic
/// equality.
///
/// # Examples
/// ```
/// use nesthill_core::{Rate, RateExpr};
///
/// let mut expr = RateExpr::zero();
/// expr.add_rate(&Rate::binding());
/// expr.add_rate(&Rate::unit());
/// expr.subtract_rate(&Rate::binding());
/// assert_eq!(expr.to_string(), "1");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RateExpr {
    terms: BTreeMap<(u32, i32), BigRational>,
}

impl RateExpr {
    /// The zero expression.
    #[must_use]
    pub fn zero() -> Self {
        Self::default()
    }

    /// An expression holding a single rate.
    #[must_use]
    pub fn from_rate(rate: &Rate) -> Self {
        let mut expr = Self::zero();
        expr.add_rate(rate);
        expr
    }

    fn accumulate(&mut self, key: (u32, i32), coefficient: BigRational) {
        let entry = self.terms.entry(key).or_insert_with(<BigRational as Zero>::zero);
        *entry += coefficient;
        if entry.is_zero() {
            self.terms.remove(&key);
        }
    }

    /// Adds `rate` in place.
    pub fn add_rate(&mut self, rate: &Rate) {
        self.accumulate(
            (rate.x_power(), rate.s_power()),
            rate.coefficient().clone(),
        );
    }

    /// Subtracts `rate` in place.
    pub fn subtract_rate(&mut self, rate: &Rate) {
        self.accumulate(
            (rate.x_power(), rate.s_power()),
            -rate.coefficient().clone(),
        );
    }

    /// Adds another expression in place.
    pub fn add_expr(&mut self, other: &Self) {
        for (&key, coefficient) in &other.terms {
            self.accumulate(key, coefficient.clone());
        }
    }

    /// Returns the additive inverse.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .map(|(&key, coefficient)| (key, -coefficient.clone()))
                .collect(),
        }
    }

    /// Whether the expression is identically zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterates over `(x_power, s_power, coefficient)` in canonical order.
    pub fn terms(&self) -> impl Iterator<Item = (u32, i32, &BigRational)> {
        self.terms
            .iter()
            .map(|(&(x_power, s_power), coefficient)| (x_power, s_power, coefficient))
    }

    /// Whether every coefficient is positive.
    #[must_use]
    pub fn is_positive_combination(&self) -> bool {
        self.terms.values().all(Signed::is_positive)
    }

    /// Evaluates the expression at bound parameters.
    #[must_use]
    pub fn evaluate<F: Field>(&self, params: &Parameters<F>) -> F {
        self.terms().fold(F::zero(), |acc, (x_power, s_power, c)| {
            acc.plus(&evaluate_monomial(c, x_power, s_power, params))
        })
    }

    /// Entrywise `∂/∂x`.
    #[must_use]
    pub fn x_derivative(&self) -> Self {
        let mut derivative = Self::zero();
        for (&(x_power, s_power), coefficient) in &self.terms {
            if x_power > 0 {
                derivative.accumulate(
                    (x_power - 1, s_power),
                    coefficient * BigRational::from_integer(x_power.into()),
                );
            }
        }
        derivative
    }
}

impl fmt::Display for RateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        for (index, (x_power, s_power, coefficient)) in self.terms().enumerate() {
            let magnitude = coefficient.abs();
            match (index, coefficient.is_negative()) {
                (0, true) => f.write_str("-")?,
                (0, false) => {}
                (_, true) => f.write_str(" - ")?,
                (_, false) => f.write_str(" + ")?,
            }
            fmt_monomial(f, &magnitude, x_power, s_power)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn ratio(numerator: i64, denominator: i64) -> BigRational {
        BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
    }

    #[test]
    fn cancels_matching_terms() {
        let rate: Rate = "x*s".parse().expect("rate parses");
        let mut expr = RateExpr::from_rate(&rate);
        expr.subtract_rate(&rate);
        assert!(expr.is_zero());
        assert_eq!(expr, RateExpr::zero());
    }

    #[test]
    fn displays_signed_sum() {
        let mut expr = RateExpr::zero();
        expr.subtract_rate(&"x*s".parse().expect("rate parses"));
        expr.subtract_rate(&Rate::unit());
        assert_eq!(expr.to_string(), "-1 - x*s");
        assert!(!expr.is_positive_combination());
        assert!(expr.negated().is_positive_combination());
    }

    #[test]
    fn derivative_and_evaluation_agree_with_hand_computation() {
        let mut expr = RateExpr::zero();
        expr.add_rate(&"2*x^3*s^-1".parse().expect("rate parses"));
        expr.add_rate(&Rate::binding());
        expr.add_rate(&Rate::unit());
        let params = Parameters::new(ratio(2, 1), ratio(4, 1)).expect("valid parameters");
        // 2·8/4 + 2 + 1
        assert_eq!(expr.evaluate(&params), ratio(7, 1));
        // 6·x²/s + 1 at x = 2, s = 4
        assert_eq!(expr.x_derivative().evaluate(&params), ratio(7, 1));
    }
}
