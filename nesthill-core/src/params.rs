//! Bound values of the ligand concentration `x` and time-scale factor `s`.

use num_rational::BigRational;

use crate::{
    Result,
    error::KineticsError,
    field::{Field, parse_rational},
};

/// Concrete `(x, s)` at which symbolic rates are evaluated.
///
/// Both values are validated to be strictly positive (and finite for
/// floating-point fields); `1/s` is precomputed for negative `s` powers.
///
/// # Examples
/// ```
/// use nesthill_core::Parameters;
///
/// let params = Parameters::new(2.0, 100.0).expect("valid parameters");
/// assert_eq!(*params.x(), 2.0);
/// assert!(Parameters::new(-1.0, 100.0).is_err());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters<F> {
    x: F,
    s: F,
    s_inverse: F,
}

impl<F: Field> Parameters<F> {
    /// Validates and binds `x` and `s`.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] naming `x` or `s` when the
    /// value is not strictly positive and finite.
    pub fn new(x: F, s: F) -> Result<Self> {
        if !x.is_strictly_positive() {
            return Err(KineticsError::invalid(
                "x",
                &x,
                "must be finite and strictly positive",
            ));
        }
        if !s.is_strictly_positive() {
            return Err(KineticsError::invalid(
                "s",
                &s,
                "must be finite and strictly positive",
            ));
        }
        let s_inverse = F::one()
            .quotient(&s)
            .ok_or_else(|| KineticsError::invalid("s", &s, "must be invertible"))?;
        Ok(Self { x, s, s_inverse })
    }

    /// Ligand concentration.
    #[must_use]
    pub fn x(&self) -> &F {
        &self.x
    }

    /// Time-scale factor.
    #[must_use]
    pub fn s(&self) -> &F {
        &self.s
    }

    /// Reciprocal of the time-scale factor.
    #[must_use]
    pub fn s_inverse(&self) -> &F {
        &self.s_inverse
    }
}

impl Parameters<f64> {
    /// Converts floating-point parameters into exact rationals.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] for values with no exact
    /// rational representation.
    pub fn to_exact(&self) -> Result<Parameters<BigRational>> {
        let convert = |name, value: f64| {
            BigRational::from_float(value)
                .ok_or_else(|| KineticsError::invalid(name, value, "not representable"))
        };
        Parameters::new(convert("x", self.x)?, convert("s", self.s)?)
    }
}

impl Parameters<BigRational> {
    /// Parses exact parameters from decimal, scientific or `p/q` text.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when either value does
    /// not parse or is not strictly positive.
    ///
    /// # Examples
    /// ```
    /// use nesthill_core::Parameters;
    ///
    /// let params = Parameters::parse("3/2", "1e3").expect("valid parameters");
    /// assert_eq!(params.s_inverse().to_string(), "1/1000");
    /// ```
    pub fn parse(x: &str, s: &str) -> Result<Self> {
        let read = |name, raw: &str| {
            parse_rational(raw)
                .ok_or_else(|| KineticsError::invalid(name, raw, "not a rational number"))
        };
        Self::new(read("x", x)?, read("s", s)?)
    }
}
