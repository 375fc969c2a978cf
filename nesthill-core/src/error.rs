//! Error types for the nested hysteresis engine.
//!
//! Defines the error enum exposed by the public API, its stable
//! machine-readable codes, and a convenient result alias.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::convergence::InconclusiveReason;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Error type produced while building, solving, or analysing kinetic schemes.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum KineticsError {
    /// A caller-supplied parameter was outside its admissible range.
    #[error("invalid parameter `{parameter}` = {value}: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Rendered value supplied by the caller.
        value: Arc<str>,
        /// Constraint the value violated.
        reason: &'static str,
    },
    /// A graph did not satisfy the structural invariants of a kinetic scheme.
    #[error("malformed kinetic graph with {vertices} vertices: {reason}")]
    MalformedGraph {
        /// Number of vertices in the rejected graph.
        vertices: usize,
        /// Description of the violated invariant, naming vertices or edges.
        reason: Arc<str>,
    },
    /// The generator's null space did not have dimension one.
    #[error("generator of dimension {dimension} has a null space of dimension {nullity}")]
    SingularSystem {
        /// Dimension of the computed null space.
        nullity: usize,
        /// Number of states in the generator.
        dimension: usize,
    },
    /// The numeric steady-state solve was too ill-conditioned to trust.
    #[error("condition estimate {condition:e} exceeds the threshold {threshold:e}")]
    NumericInstability {
        /// Best condition number estimate across the candidate systems.
        condition: f64,
        /// Configured threshold the estimate exceeded.
        threshold: f64,
    },
    /// The uniform-bound search stopped before reaching a verdict.
    #[error(
        "uniform bound check inconclusive after {boxes_examined} boxes ({reason}); largest gap seen {best_gap:e}"
    )]
    ConvergenceCheckInconclusive {
        /// Number of search boxes evaluated before stopping.
        boxes_examined: usize,
        /// Largest pointwise gap observed so far.
        best_gap: f64,
        /// Why the search stopped.
        reason: InconclusiveReason,
    },
    /// The requested number of sites exceeds the configured ceiling.
    #[error("{sites} sites exceed the configured ceiling of {ceiling}")]
    SiteLimitExceeded {
        /// Requested number of binding sites.
        sites: usize,
        /// Maximum number of sites accepted by the engine.
        ceiling: usize,
    },
    /// An extrapolated limit failed to settle within the configured levels.
    #[error("limit at x = {x} did not settle after {levels} levels (last change {delta:e})")]
    LimitUnresolved {
        /// Ligand concentration at which the limit was requested.
        x: f64,
        /// Magnitude of the last change between extrapolation levels.
        delta: f64,
        /// Number of extrapolation levels evaluated.
        levels: usize,
    },
}

define_error_codes! {
    /// Stable codes describing [`KineticsError`] variants.
    enum KineticsErrorCode for KineticsError {
        /// A caller-supplied parameter was outside its admissible range.
        InvalidParameter => InvalidParameter { .. } => "KINETICS_INVALID_PARAMETER",
        /// A graph did not satisfy the structural invariants of a kinetic scheme.
        MalformedGraph => MalformedGraph { .. } => "KINETICS_MALFORMED_GRAPH",
        /// The generator's null space did not have dimension one.
        SingularSystem => SingularSystem { .. } => "KINETICS_SINGULAR_SYSTEM",
        /// The numeric steady-state solve was too ill-conditioned to trust.
        NumericInstability => NumericInstability { .. } => "KINETICS_NUMERIC_INSTABILITY",
        /// The uniform-bound search stopped before reaching a verdict.
        ConvergenceCheckInconclusive => ConvergenceCheckInconclusive { .. } => "KINETICS_CONVERGENCE_CHECK_INCONCLUSIVE",
        /// The requested number of sites exceeds the configured ceiling.
        SiteLimitExceeded => SiteLimitExceeded { .. } => "KINETICS_SITE_LIMIT_EXCEEDED",
        /// An extrapolated limit failed to settle within the configured levels.
        LimitUnresolved => LimitUnresolved { .. } => "KINETICS_LIMIT_UNRESOLVED",
    }
}

impl KineticsError {
    /// Builds an [`KineticsError::InvalidParameter`] from any displayable value.
    pub(crate) fn invalid(
        parameter: &'static str,
        value: impl fmt::Display,
        reason: &'static str,
    ) -> Self {
        Self::InvalidParameter {
            parameter,
            value: Arc::from(value.to_string()),
            reason,
        }
    }

    /// Builds a [`KineticsError::MalformedGraph`] with a formatted reason.
    pub(crate) fn malformed(vertices: usize, reason: impl fmt::Display) -> Self {
        Self::MalformedGraph {
            vertices,
            reason: Arc::from(reason.to_string()),
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, KineticsError>;
