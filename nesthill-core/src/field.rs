//! Scalar fields shared by the exact and numeric backends.
//!
//! The elimination routines in this crate only need field operations, so they
//! are written once against [`Field`] and instantiated with `f64`, exact
//! rationals, or forward-mode [`Dual`] numbers over either.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Arithmetic required by the generator, elimination, and limit routines.
///
/// Method names avoid the `num-traits` vocabulary so both traits can be in
/// scope without ambiguity.
pub trait Field: Clone + fmt::Debug + fmt::Display + PartialEq + Send + Sync + 'static {
    /// Additive identity.
    fn zero() -> Self;
    /// Multiplicative identity.
    fn one() -> Self;
    /// Embeds an exact rational into the field.
    fn from_rational(value: &BigRational) -> Self;
    /// Embeds a finite float into the field, exactly where the field allows.
    fn from_float_value(value: f64) -> Self;
    /// Returns `self + rhs`.
    #[must_use]
    fn plus(&self, rhs: &Self) -> Self;
    /// Returns `self - rhs`.
    #[must_use]
    fn minus(&self, rhs: &Self) -> Self;
    /// Returns `self * rhs`.
    #[must_use]
    fn times(&self, rhs: &Self) -> Self;
    /// Returns `-self`.
    #[must_use]
    fn negated(&self) -> Self;
    /// Returns `self / rhs`, or `None` when `rhs` is not invertible.
    fn quotient(&self, rhs: &Self) -> Option<Self>;
    /// Whether the value is the additive identity.
    fn vanishes(&self) -> bool;
    /// Whether the value (or its real part) is finite and strictly positive.
    fn is_strictly_positive(&self) -> bool;
    /// Nearest `f64` of the value (or its real part).
    fn approximate(&self) -> f64;
}

impl Field for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_rational(value: &BigRational) -> Self {
        value.to_f64().unwrap_or(f64::NAN)
    }

    fn from_float_value(value: f64) -> Self {
        value
    }

    fn plus(&self, rhs: &Self) -> Self {
        self + rhs
    }

    fn minus(&self, rhs: &Self) -> Self {
        self - rhs
    }

    fn times(&self, rhs: &Self) -> Self {
        self * rhs
    }

    fn negated(&self) -> Self {
        -self
    }

    fn quotient(&self, rhs: &Self) -> Option<Self> {
        (*rhs != 0.0).then(|| self / rhs)
    }

    fn vanishes(&self) -> bool {
        *self == 0.0
    }

    fn is_strictly_positive(&self) -> bool {
        self.is_finite() && *self > 0.0
    }

    fn approximate(&self) -> f64 {
        *self
    }
}

impl Field for BigRational {
    fn zero() -> Self {
        <Self as Zero>::zero()
    }

    fn one() -> Self {
        <Self as One>::one()
    }

    fn from_rational(value: &BigRational) -> Self {
        value.clone()
    }

    fn from_float_value(value: f64) -> Self {
        Self::from_float(value).unwrap_or_else(<Self as Zero>::zero)
    }

    fn plus(&self, rhs: &Self) -> Self {
        self + rhs
    }

    fn minus(&self, rhs: &Self) -> Self {
        self - rhs
    }

    fn times(&self, rhs: &Self) -> Self {
        self * rhs
    }

    fn negated(&self) -> Self {
        -self
    }

    fn quotient(&self, rhs: &Self) -> Option<Self> {
        (!Zero::is_zero(rhs)).then(|| self / rhs)
    }

    fn vanishes(&self) -> bool {
        Zero::is_zero(self)
    }

    fn is_strictly_positive(&self) -> bool {
        Signed::is_positive(self)
    }

    fn approximate(&self) -> f64 {
        ToPrimitive::to_f64(self).unwrap_or(f64::NAN)
    }
}

/// Forward-mode dual number `value + derivative·ε` with `ε² = 0`.
///
/// Seeding a parameter as `Dual::variable(x)` and running any [`Field`]
/// computation yields the derivative with respect to that parameter in the
/// `derivative` component.
#[derive(Clone, Debug, PartialEq)]
pub struct Dual<F> {
    value: F,
    derivative: F,
}

impl<F: Field> Dual<F> {
    /// Creates a dual number from its parts.
    #[must_use]
    pub fn new(value: F, derivative: F) -> Self {
        Self { value, derivative }
    }

    /// Creates the independent variable: derivative one.
    #[must_use]
    pub fn variable(value: F) -> Self {
        Self::new(value, F::one())
    }

    /// Creates a constant: derivative zero.
    #[must_use]
    pub fn constant(value: F) -> Self {
        Self::new(value, F::zero())
    }

    /// Returns the real part.
    #[must_use]
    pub fn value(&self) -> &F {
        &self.value
    }

    /// Returns the derivative part.
    #[must_use]
    pub fn derivative(&self) -> &F {
        &self.derivative
    }
}

impl<F: Field> fmt::Display for Dual<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}ε", self.value, self.derivative)
    }
}

impl<F: Field> Field for Dual<F> {
    fn zero() -> Self {
        Self::constant(F::zero())
    }

    fn one() -> Self {
        Self::constant(F::one())
    }

    fn from_rational(value: &BigRational) -> Self {
        Self::constant(F::from_rational(value))
    }

    fn from_float_value(value: f64) -> Self {
        Self::constant(F::from_float_value(value))
    }

    fn plus(&self, rhs: &Self) -> Self {
        Self::new(
            self.value.plus(&rhs.value),
            self.derivative.plus(&rhs.derivative),
        )
    }

    fn minus(&self, rhs: &Self) -> Self {
        Self::new(
            self.value.minus(&rhs.value),
            self.derivative.minus(&rhs.derivative),
        )
    }

    fn times(&self, rhs: &Self) -> Self {
        Self::new(
            self.value.times(&rhs.value),
            self.value
                .times(&rhs.derivative)
                .plus(&self.derivative.times(&rhs.value)),
        )
    }

    fn negated(&self) -> Self {
        Self::new(self.value.negated(), self.derivative.negated())
    }

    fn quotient(&self, rhs: &Self) -> Option<Self> {
        let value = self.value.quotient(&rhs.value)?;
        let cross = self
            .derivative
            .times(&rhs.value)
            .minus(&self.value.times(&rhs.derivative));
        let derivative = cross.quotient(&rhs.value.times(&rhs.value))?;
        Some(Self::new(value, derivative))
    }

    fn vanishes(&self) -> bool {
        self.value.vanishes() && self.derivative.vanishes()
    }

    fn is_strictly_positive(&self) -> bool {
        self.value.is_strictly_positive()
    }

    fn approximate(&self) -> f64 {
        self.value.approximate()
    }
}

/// Leading term `coefficient · s^degree` of a Laurent series in `s`, for
/// reading `s -> ∞` limits off subtraction-free eliminations.
///
/// Sums keep the term of highest degree and add coefficients on ties, so
/// only sums of same-signed terms are exact. GTH elimination never
/// subtracts, which makes its output exact in this representation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Leading<F> {
    coefficient: F,
    degree: i64,
}

impl<F: Field> Leading<F> {
    /// Creates `coefficient · s^degree`; a vanishing coefficient is stored as
    /// zero of degree zero.
    pub(crate) fn new(coefficient: F, degree: i64) -> Self {
        let degree = if coefficient.vanishes() { 0 } else { degree };
        Self {
            coefficient,
            degree,
        }
    }

    pub(crate) fn degree(&self) -> i64 {
        self.degree
    }

    /// Value as `s -> ∞`: the coefficient for degree zero, zero below it, and
    /// `None` when the series diverges.
    pub(crate) fn at_infinity(&self) -> Option<F> {
        match self.degree {
            0 => Some(self.coefficient.clone()),
            degree if degree < 0 => Some(F::zero()),
            _ => None,
        }
    }
}

impl<F: Field> fmt::Display for Leading<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})*s^{}", self.coefficient, self.degree)
    }
}

impl<F: Field> Field for Leading<F> {
    fn zero() -> Self {
        Self::new(F::zero(), 0)
    }

    fn one() -> Self {
        Self::new(F::one(), 0)
    }

    fn from_rational(value: &BigRational) -> Self {
        Self::new(F::from_rational(value), 0)
    }

    fn from_float_value(value: f64) -> Self {
        Self::new(F::from_float_value(value), 0)
    }

    fn plus(&self, rhs: &Self) -> Self {
        if rhs.vanishes() || (!self.vanishes() && self.degree > rhs.degree) {
            self.clone()
        } else if self.vanishes() || rhs.degree > self.degree {
            rhs.clone()
        } else {
            Self::new(self.coefficient.plus(&rhs.coefficient), self.degree)
        }
    }

    fn minus(&self, rhs: &Self) -> Self {
        self.plus(&rhs.negated())
    }

    fn times(&self, rhs: &Self) -> Self {
        Self::new(
            self.coefficient.times(&rhs.coefficient),
            self.degree.saturating_add(rhs.degree),
        )
    }

    fn negated(&self) -> Self {
        Self::new(self.coefficient.negated(), self.degree)
    }

    fn quotient(&self, rhs: &Self) -> Option<Self> {
        if rhs.vanishes() {
            return None;
        }
        Some(Self::new(
            self.coefficient.quotient(&rhs.coefficient)?,
            self.degree.saturating_sub(rhs.degree),
        ))
    }

    fn vanishes(&self) -> bool {
        self.coefficient.vanishes()
    }

    fn is_strictly_positive(&self) -> bool {
        self.coefficient.is_strictly_positive()
    }

    fn approximate(&self) -> f64 {
        match self.degree {
            0 => self.coefficient.approximate(),
            degree if degree < 0 => 0.0,
            _ => self.coefficient.approximate() * f64::INFINITY,
        }
    }
}

/// Raises `base` to a non-negative integer power by repeated squaring.
pub(crate) fn power<F: Field>(base: &F, exponent: u32) -> F {
    let mut result = F::one();
    let mut square = base.clone();
    let mut remaining = exponent;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.times(&square);
        }
        remaining >>= 1;
        if remaining > 0 {
            square = square.times(&square);
        }
    }
    result
}

/// Parses an exact rational from `"3"`, `"-2/7"`, `"0.125"`, or `"1e-3"`.
///
/// Decimal and scientific literals are read exactly in base ten rather than
/// through their binary floating-point approximation.
pub(crate) fn parse_rational(raw: &str) -> Option<BigRational> {
    let text = raw.trim();
    if let Some((numerator, denominator)) = text.split_once('/') {
        let numerator = parse_rational(numerator)?;
        let denominator = parse_rational(denominator)?;
        return (!Zero::is_zero(&denominator)).then(|| numerator / denominator);
    }
    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    let digits = format!("{whole}{fraction}");
    let unsigned = digits.trim_start_matches(['+', '-']);
    if unsigned.is_empty() || !unsigned.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let numerator: BigInt = digits.parse().ok()?;
    let fraction_digits = i32::try_from(fraction.len()).ok()?;
    let scale = exponent.checked_sub(fraction_digits)?;
    let ten = BigRational::from_integer(BigInt::from(10));
    let magnitude = power(&ten, scale.unsigned_abs());
    let value = BigRational::from_integer(numerator);
    Some(if scale >= 0 {
        value * magnitude
    } else {
        value / magnitude
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ratio(numerator: i64, denominator: i64) -> BigRational {
        BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
    }

    #[rstest]
    #[case("3", ratio(3, 1))]
    #[case("-2/7", ratio(-2, 7))]
    #[case("0.125", ratio(1, 8))]
    #[case("1e-3", ratio(1, 1000))]
    #[case("2.5E2", ratio(250, 1))]
    #[case(" 10/4 ", ratio(5, 2))]
    fn parse_rational_reads_exact_values(#[case] raw: &str, #[case] expected: BigRational) {
        assert_eq!(parse_rational(raw), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("1/0")]
    #[case("1.2.3")]
    #[case(".")]
    fn parse_rational_rejects_garbage(#[case] raw: &str) {
        assert_eq!(parse_rational(raw), None);
    }

    #[test]
    fn dual_quotient_applies_quotient_rule() {
        // d/dx (x / (1 + x)) at x = 2 is 1 / 9.
        let x = Dual::variable(2.0_f64);
        let denominator = Dual::<f64>::one().plus(&x);
        let ratio = x.quotient(&denominator).expect("denominator is non-zero");
        assert!((ratio.value() - 2.0 / 3.0).abs() < 1e-15);
        assert!((ratio.derivative() - 1.0 / 9.0).abs() < 1e-15);
    }

    #[test]
    fn leading_terms_keep_the_highest_degree() {
        let cubic = Leading::new(2.0_f64, 3);
        let linear = Leading::new(5.0_f64, 1);
        assert_eq!(cubic.plus(&linear), cubic);
        assert_eq!(linear.plus(&cubic), cubic);
        assert_eq!(cubic.plus(&cubic), Leading::new(4.0, 3));
        assert_eq!(Leading::zero().plus(&linear), linear);
        assert_eq!(cubic.times(&linear), Leading::new(10.0, 4));
        assert_eq!(linear.quotient(&cubic), Some(Leading::new(2.5, -2)));
        assert_eq!(linear.quotient(&Leading::zero()), None);
        assert_eq!(cubic.minus(&cubic), Leading::zero());
    }

    #[rstest]
    #[case(Leading::new(0.75, 0), Some(0.75))]
    #[case(Leading::new(0.75, -2), Some(0.0))]
    #[case(Leading::new(0.75, 1), None)]
    fn leading_term_value_at_infinity(#[case] term: Leading<f64>, #[case] expected: Option<f64>) {
        assert_eq!(term.at_infinity(), expected);
    }

    #[test]
    fn leading_dual_coefficients_carry_the_derivative() {
        // (x^2 s^2 + s) / (x s^2 + 1) -> x with slope one at x = 3
        let x = Dual::variable(3.0_f64);
        let numerator = Leading::new(x.times(&x), 2).plus(&Leading::new(Dual::one(), 1));
        let denominator = Leading::new(x.clone(), 2).plus(&Leading::one());
        let ratio = numerator.quotient(&denominator).expect("denominator is non-zero");
        let limit = ratio.at_infinity().expect("converges");
        assert!((limit.value() - 3.0).abs() < 1e-15);
        assert!((limit.derivative() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn power_matches_repeated_multiplication() {
        let base = ratio(3, 2);
        assert_eq!(power(&base, 0), ratio(1, 1));
        assert_eq!(power(&base, 5), ratio(243, 32));
    }
}
