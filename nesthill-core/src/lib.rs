//! Nested hysteresis kinetics core library.
//!
//! Builds the recursive multi-site binding schemes, assembles their
//! generator matrices with symbolic rates in `x` and `s`, solves for steady
//! states exactly or numerically, and analyses how the fully bound
//! probability converges to a Hill curve as `s -> ∞`.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
mod convergence;
mod error;
mod expr;
mod field;
mod generator;
mod graph;
mod kinetics;
mod params;
mod provider;
mod rate;
mod steady_state;

pub use crate::{
    builder::{DEFAULT_MAX_SITES, DEFAULT_WARN_SITES, KineticsBuilder},
    convergence::{
        BoundVerdict, CancelToken, ConvergenceAnalyzer, ConvergenceReport, DEFAULT_MAX_BOXES,
        InconclusiveReason, ReferenceHill, SearchBudget,
    },
    error::{KineticsError, KineticsErrorCode, Result},
    expr::RateExpr,
    field::{Dual, Field},
    generator::GeneratorMatrix,
    graph::{
        KineticGraph, StateVertex, Transition, WeightedEdge, build_base, iterate,
        stabilize_extremes, step,
    },
    kinetics::Kinetics,
    params::Parameters,
    provider::{
        ExactProvider, LimitMethod, LimitSettings, MathProvider, NumericProvider, SupremumSearch,
    },
    rate::Rate,
    steady_state::{
        DEFAULT_CONDITION_THRESHOLD, NumericSolver, SolveMethod, SteadyStateVector,
        steady_state_exact, steady_state_gth,
    },
};
