//! Monomial transition rates `c · x^a · s^b`.
//!
//! Every weight the construction produces is a monomial in the ligand
//! concentration `x` and the time-scale factor `s` with an exact positive
//! rational coefficient. Keeping weights in this closed form lets the
//! generator be assembled symbolically and evaluated later at any bound
//! parameters.

use std::{fmt, str::FromStr};

use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::{
    Result,
    error::KineticsError,
    field::{Field, parse_rational, power},
    params::Parameters,
};

const EXPONENT_OVERFLOW: &str = "exponent out of range";

/// A transition rate `coefficient · x^x_power · s^s_power`.
///
/// # Examples
/// ```
/// use nesthill_core::Rate;
///
/// let rate: Rate = "2*x*s^-1".parse().expect("rate parses");
/// assert_eq!(rate.x_power(), 1);
/// assert_eq!(rate.s_power(), -1);
/// assert_eq!(rate.to_string(), "2*x*s^-1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rate {
    coefficient: BigRational,
    x_power: u32,
    s_power: i32,
}

impl Rate {
    /// Creates a rate, rejecting non-positive coefficients.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `coefficient <= 0`.
    pub fn new(coefficient: BigRational, x_power: u32, s_power: i32) -> Result<Self> {
        if !coefficient.is_positive() {
            return Err(KineticsError::invalid(
                "rate",
                &coefficient,
                "coefficient must be strictly positive",
            ));
        }
        Ok(Self {
            coefficient,
            x_power,
            s_power,
        })
    }

    /// The constant rate `1`.
    #[must_use]
    pub fn unit() -> Self {
        Self::monomial(0, 0)
    }

    /// The binding rate `x`.
    #[must_use]
    pub fn binding() -> Self {
        Self::monomial(1, 0)
    }

    /// The pure time-scale rate `s^power`; `time_scale(-1)` is the usual `q = 1/s`.
    #[must_use]
    pub fn time_scale(power: i32) -> Self {
        Self::monomial(0, power)
    }

    /// Converts a finite positive float into an exact constant rate.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `value` is not finite
    /// and strictly positive.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(KineticsError::invalid(
                "rate",
                value,
                "must be finite and strictly positive",
            ));
        }
        let coefficient = BigRational::from_float(value)
            .ok_or_else(|| KineticsError::invalid("rate", value, "not representable"))?;
        Self::new(coefficient, 0, 0)
    }

    fn monomial(x_power: u32, s_power: i32) -> Self {
        Self {
            coefficient: <BigRational as One>::one(),
            x_power,
            s_power,
        }
    }

    /// Exact rational coefficient.
    #[must_use]
    pub fn coefficient(&self) -> &BigRational {
        &self.coefficient
    }

    /// Exponent of `x`.
    #[must_use]
    pub fn x_power(&self) -> u32 {
        self.x_power
    }

    /// Exponent of `s`.
    #[must_use]
    pub fn s_power(&self) -> i32 {
        self.s_power
    }

    /// Product of two rates.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when an exponent of the
    /// product overflows.
    pub fn times(&self, other: &Self) -> Result<Self> {
        let overflow =
            || KineticsError::invalid("rate", format_args!("{self} * {other}"), EXPONENT_OVERFLOW);
        Ok(Self {
            coefficient: &self.coefficient * &other.coefficient,
            x_power: self.x_power.checked_add(other.x_power).ok_or_else(overflow)?,
            s_power: self.s_power.checked_add(other.s_power).ok_or_else(overflow)?,
        })
    }

    /// The rate multiplied by one factor of `s`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when the `s` exponent
    /// overflows.
    pub fn scaled_by_s(&self) -> Result<Self> {
        let s_power = self.s_power.checked_add(1).ok_or_else(|| {
            KineticsError::invalid("rate", format_args!("{self} * s"), EXPONENT_OVERFLOW)
        })?;
        Ok(Self {
            s_power,
            ..self.clone()
        })
    }

    /// Evaluates the rate at bound parameters.
    #[must_use]
    pub fn evaluate<F: Field>(&self, params: &Parameters<F>) -> F {
        evaluate_monomial(&self.coefficient, self.x_power, self.s_power, params)
    }
}

pub(crate) fn evaluate_monomial<F: Field>(
    coefficient: &BigRational,
    x_power: u32,
    s_power: i32,
    params: &Parameters<F>,
) -> F {
    let s_factor = if s_power >= 0 {
        power(params.s(), s_power.unsigned_abs())
    } else {
        power(params.s_inverse(), s_power.unsigned_abs())
    };
    F::from_rational(coefficient)
        .times(&power(params.x(), x_power))
        .times(&s_factor)
}

pub(crate) fn fmt_monomial(
    f: &mut fmt::Formatter<'_>,
    coefficient: &BigRational,
    x_power: u32,
    s_power: i32,
) -> fmt::Result {
    let mut factors = Vec::with_capacity(3);
    if !coefficient.is_one() || (x_power == 0 && s_power == 0) {
        factors.push(coefficient.to_string());
    }
    match x_power {
        0 => {}
        1 => factors.push("x".to_owned()),
        k => factors.push(format!("x^{k}")),
    }
    match s_power {
        0 => {}
        1 => factors.push("s".to_owned()),
        k => factors.push(format!("s^{k}")),
    }
    f.write_str(&factors.join("*"))
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_monomial(f, &self.coefficient, self.x_power, self.s_power)
    }
}

impl FromStr for Rate {
    type Err = KineticsError;

    /// Parses products and quotients of `x`, `s`, their integer powers, and
    /// rational or decimal literals, e.g. `1/s`, `2*x*s^-1`, `0.5`.
    fn from_str(raw: &str) -> Result<Self> {
        let reject = |reason| KineticsError::invalid("rate", raw, reason);
        let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if text.is_empty() {
            return Err(reject("empty rate expression"));
        }

        let mut coefficient = <BigRational as One>::one();
        let mut x_power: i64 = 0;
        let mut s_power: i64 = 0;
        let mut divide = false;
        let mut rest = text.as_str();
        loop {
            let end = rest.find(['*', '/']).unwrap_or(rest.len());
            let (factor, tail) = rest.split_at(end);
            let (base, exponent) = match factor.split_once('^') {
                Some((base, exponent)) => (
                    base,
                    exponent
                        .parse::<i64>()
                        .map_err(|_| reject("exponent must be an integer"))?,
                ),
                None => (factor, 1),
            };
            let signed = if divide { exponent.checked_neg() } else { Some(exponent) };
            let accumulate = |total: i64| {
                signed
                    .and_then(|signed| total.checked_add(signed))
                    .ok_or_else(|| reject(EXPONENT_OVERFLOW))
            };
            match base {
                "x" => x_power = accumulate(x_power)?,
                "s" => s_power = accumulate(s_power)?,
                "" => return Err(reject("missing factor")),
                literal => {
                    let value = parse_rational(literal).ok_or_else(|| reject("unknown factor"))?;
                    if value.is_zero() {
                        return Err(reject("coefficient must be strictly positive"));
                    }
                    let magnitude = u32::try_from(exponent.unsigned_abs())
                        .map_err(|_| reject(EXPONENT_OVERFLOW))?;
                    let raised = power(&value, magnitude);
                    let raised = if exponent < 0 { raised.recip() } else { raised };
                    coefficient = if divide {
                        coefficient / raised
                    } else {
                        coefficient * raised
                    };
                }
            }
            let Some(operator) = tail.chars().next() else {
                break;
            };
            divide = operator == '/';
            rest = tail.get(operator.len_utf8()..).unwrap_or_default();
        }

        let x_power = u32::try_from(x_power)
            .map_err(|_| reject("x must appear with a non-negative power"))?;
        let s_power = i32::try_from(s_power).map_err(|_| reject(EXPONENT_OVERFLOW))?;
        Self::new(coefficient, x_power, s_power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use rstest::rstest;

    fn ratio(numerator: i64, denominator: i64) -> BigRational {
        BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
    }

    #[rstest]
    #[case("1/s", ratio(1, 1), 0, -1)]
    #[case("2*x*s^-1", ratio(2, 1), 1, -1)]
    #[case("0.5", ratio(1, 2), 0, 0)]
    #[case("x^3/4", ratio(1, 4), 3, 0)]
    #[case("s * s / x^0", ratio(1, 1), 0, 2)]
    #[case("3/2*s^2", ratio(3, 2), 0, 2)]
    fn parses_rate_expressions(
        #[case] raw: &str,
        #[case] coefficient: BigRational,
        #[case] x_power: u32,
        #[case] s_power: i32,
    ) {
        let rate: Rate = raw.parse().expect("rate parses");
        assert_eq!(rate.coefficient(), &coefficient);
        assert_eq!(rate.x_power(), x_power);
        assert_eq!(rate.s_power(), s_power);
    }

    #[rstest]
    #[case("")]
    #[case("1/x")]
    #[case("y")]
    #[case("0*x")]
    #[case("-2")]
    #[case("x^a")]
    #[case("x**2")]
    fn rejects_invalid_rate_expressions(#[case] raw: &str) {
        let err = raw.parse::<Rate>().expect_err("rate must be rejected");
        assert!(matches!(
            err,
            KineticsError::InvalidParameter {
                parameter: "rate",
                ..
            }
        ));
    }

    #[rstest]
    #[case(Rate::unit(), "1")]
    #[case(Rate::binding(), "x")]
    #[case(Rate::time_scale(-1), "s^-1")]
    #[case(
        Rate::binding().scaled_by_s().and_then(|rate| rate.scaled_by_s()).expect("in range"),
        "x*s^2"
    )]
    fn displays_in_canonical_form(#[case] rate: Rate, #[case] expected: &str) {
        assert_eq!(rate.to_string(), expected);
    }

    #[test]
    fn evaluates_at_exact_parameters() {
        let params = Parameters::new(ratio(2, 1), ratio(10, 1)).expect("valid parameters");
        let rate: Rate = "3*x^2*s^-1".parse().expect("rate parses");
        assert_eq!(rate.evaluate(&params), ratio(6, 5));
    }

    #[test]
    fn times_multiplies_coefficients_and_adds_powers() {
        let left: Rate = "2*x*s^-1".parse().expect("rate parses");
        let right: Rate = "3/4*x^2*s^3".parse().expect("rate parses");
        let product = left.times(&right).expect("exponents in range");
        assert_eq!(product.coefficient(), &ratio(3, 2));
        assert_eq!((product.x_power(), product.s_power()), (3, 2));
    }

    #[rstest]
    #[case::s_power("s^2147483647", "s")]
    #[case::negative_s_power("s^-2147483648", "s^-1")]
    #[case::x_power("x^4294967295", "x")]
    fn times_rejects_exponent_overflow(#[case] left: &str, #[case] right: &str) {
        let left: Rate = left.parse().expect("rate parses");
        let right: Rate = right.parse().expect("rate parses");
        let err = left.times(&right).expect_err("exponent overflows");
        assert!(matches!(
            err,
            KineticsError::InvalidParameter {
                parameter: "rate",
                ..
            }
        ));
    }

    #[test]
    fn scaled_by_s_rejects_exponent_overflow() {
        let rate: Rate = "s^2147483647".parse().expect("rate parses");
        assert!(rate.scaled_by_s().is_err());
        let lowered: Rate = "s^2147483646".parse().expect("rate parses");
        assert_eq!(lowered.scaled_by_s().expect("in range").s_power(), i32::MAX);
    }

    #[rstest]
    #[case("x^9223372036854775807*x")]
    #[case("s/s^-9223372036854775808")]
    fn parse_rejects_exponent_sums_out_of_range(#[case] raw: &str) {
        assert!(raw.parse::<Rate>().is_err());
    }

    #[test]
    fn from_f64_rejects_non_positive() {
        assert!(Rate::from_f64(0.0).is_err());
        assert!(Rate::from_f64(f64::NAN).is_err());
        let rate = Rate::from_f64(0.25).expect("positive float converts");
        assert_eq!(rate.coefficient(), &ratio(1, 4));
    }
}
