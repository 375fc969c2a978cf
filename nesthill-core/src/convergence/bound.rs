//! Certified branch-and-bound search for `sup_x |P(x, s) - H(x)|`.
//!
//! At fixed `s` the fully bound probability is `P = N / (N + R)`, where `N`
//! is the spanning in-tree weight of the fully bound state and `R` the summed
//! weights of the others. Both are polynomials in `x` with non-negative
//! coefficients, so on a box `[a, b]`
//!
//! ```text
//! 1 / (1 + R(b) / N(a)) <= P(x) <= 1 / (1 + R(a) / N(b))
//! ```
//!
//! and `H` is increasing, which bounds `|P - H|` over the whole box. The two
//! unbounded boxes use the tree weight of the empty state at `x = 0` and the
//! homogeneous form of the generator at `x = ∞`. Tree weights come from GTH
//! pivots in log space, so the bounds never suffer cancellation.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use super::{InconclusiveReason, ReferenceHill};
use crate::{
    Result,
    error::KineticsError,
    expr::RateExpr,
    generator::{CompiledGenerator, GeneratorMatrix},
    steady_state::eliminate,
};

/// Default number of boxes a search may evaluate.
pub const DEFAULT_MAX_BOXES: usize = 10_000;

const BATCH_SIZE: usize = 256;
const LOWER_CUT: f64 = 1e-2;
const UPPER_CUT: f64 = 1e2;
const TAIL_FACTOR: f64 = 16.0;

/// Shared flag that stops a running search at the next batch boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Reports whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Limits on the work a uniform-bound search may do.
///
/// # Examples
/// ```
/// use std::time::{Duration, Instant};
///
/// use nesthill_core::{CancelToken, SearchBudget};
///
/// let token = CancelToken::new();
/// let budget = SearchBudget::new(500)
///     .with_deadline(Instant::now() + Duration::from_secs(5))
///     .with_cancel_token(token.clone());
/// assert_eq!(budget.max_boxes(), 500);
/// assert!(!token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct SearchBudget {
    max_boxes: usize,
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BOXES)
    }
}

impl SearchBudget {
    /// Allows at most `max_boxes` box evaluations, with no deadline.
    #[must_use]
    pub fn new(max_boxes: usize) -> Self {
        Self {
            max_boxes,
            deadline: None,
            cancel: None,
        }
    }

    /// Stops the search once `deadline` has passed.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stops the search once `token` is cancelled.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Maximum number of box evaluations.
    #[must_use]
    pub fn max_boxes(&self) -> usize {
        self.max_boxes
    }

    /// Configured deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn stop_reason(&self, examined: usize) -> Option<InconclusiveReason> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some(InconclusiveReason::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(InconclusiveReason::DeadlineExpired);
        }
        (examined >= self.max_boxes).then_some(InconclusiveReason::BudgetExhausted)
    }
}

/// Outcome of a uniform-bound search.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundVerdict {
    /// Every box was certified; `constant` is the largest certified
    /// `bound · sqrt(s)` and never exceeds `claimed`.
    Holds {
        /// Certified constant.
        constant: f64,
        /// Constant the caller asked about.
        claimed: f64,
        /// Boxes evaluated.
        boxes: usize,
    },
    /// A point whose gap exceeds the claimed bound.
    Violated {
        /// Ligand concentration of the counterexample.
        counterexample_x: f64,
        /// `|P(x, s) - H(x)|` at the counterexample.
        gap: f64,
        /// `claimed / sqrt(s)`.
        threshold: f64,
    },
    /// The budget ran out before every box was decided.
    Inconclusive {
        /// Why the search stopped.
        reason: InconclusiveReason,
        /// Boxes evaluated.
        boxes_examined: usize,
        /// Largest pointwise gap observed.
        best_gap: f64,
    },
}

impl BoundVerdict {
    /// `Some(true)` when the bound holds, `Some(false)` when it is violated
    /// and `None` when the search was inconclusive.
    #[must_use]
    pub fn bound_holds(&self) -> Option<bool> {
        match self {
            Self::Holds { .. } => Some(true),
            Self::Violated { .. } => Some(false),
            Self::Inconclusive { .. } => None,
        }
    }

    /// Certified constant of a verdict that holds.
    #[must_use]
    pub fn constant(&self) -> Option<f64> {
        match self {
            Self::Holds { constant, .. } => Some(*constant),
            _ => None,
        }
    }

    /// Counterexample of a violated verdict.
    #[must_use]
    pub fn counterexample_x(&self) -> Option<f64> {
        match self {
            Self::Violated {
                counterexample_x, ..
            } => Some(*counterexample_x),
            _ => None,
        }
    }

    /// Turns an inconclusive verdict into an error.
    ///
    /// # Errors
    /// Returns [`KineticsError::ConvergenceCheckInconclusive`] for
    /// [`BoundVerdict::Inconclusive`].
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Inconclusive {
                reason,
                boxes_examined,
                best_gap,
            } => Err(KineticsError::ConvergenceCheckInconclusive {
                boxes_examined,
                best_gap,
                reason,
            }),
            decided => Ok(decided),
        }
    }
}

impl fmt::Display for BoundVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holds {
                constant,
                claimed,
                boxes,
            } => write!(
                f,
                "holds: certified constant {constant:.6} <= {claimed} over {boxes} boxes"
            ),
            Self::Violated {
                counterexample_x,
                gap,
                threshold,
            } => write!(
                f,
                "violated at x = {counterexample_x:.6}: gap {gap:.3e} > {threshold:.3e}"
            ),
            Self::Inconclusive {
                reason,
                boxes_examined,
                best_gap,
            } => write!(
                f,
                "inconclusive ({reason}) after {boxes_examined} boxes; largest gap {best_gap:.3e}"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SearchBox {
    /// `(0, upper]`
    Lower { upper: f64 },
    /// `[lower, upper]`
    Finite { lower: f64, upper: f64 },
    /// `[lower, ∞)`
    Upper { lower: f64 },
}

impl SearchBox {
    fn initial() -> [Self; 3] {
        [
            Self::Lower { upper: LOWER_CUT },
            Self::Finite {
                lower: LOWER_CUT,
                upper: UPPER_CUT,
            },
            Self::Upper { lower: UPPER_CUT },
        ]
    }

    /// Point whose gap is sampled for counterexamples.
    fn representative(self) -> f64 {
        match self {
            Self::Lower { upper } => upper,
            Self::Finite { lower, upper } => (lower * upper).sqrt(),
            Self::Upper { lower } => lower,
        }
    }

    fn split(self) -> [Self; 2] {
        match self {
            Self::Lower { upper } => {
                let cut = upper / TAIL_FACTOR;
                [
                    Self::Lower { upper: cut },
                    Self::Finite { lower: cut, upper },
                ]
            }
            Self::Finite { lower, upper } => {
                let middle = (lower * upper).sqrt();
                [
                    Self::Finite {
                        lower,
                        upper: middle,
                    },
                    Self::Finite {
                        lower: middle,
                        upper,
                    },
                ]
            }
            Self::Upper { lower } => {
                let cut = lower * TAIL_FACTOR;
                [
                    Self::Finite { lower, upper: cut },
                    Self::Upper { lower: cut },
                ]
            }
        }
    }
}

/// `1 / (1 + e^log_ratio)` without overflow.
fn logistic(log_ratio: f64) -> f64 {
    if log_ratio > 0.0 {
        let decay = (-log_ratio).exp();
        decay / (1.0 + decay)
    } else {
        1.0 / (1.0 + log_ratio.exp())
    }
}

/// Log tree weight of the fully bound state and log summed weight of the
/// others.
#[derive(Clone, Copy, Debug)]
struct LogMasses {
    fully_bound: f64,
    others: f64,
}

impl LogMasses {
    fn of(generator: &GeneratorMatrix<f64>) -> Option<Self> {
        let root = generator.dimension().checked_sub(1)?;
        let elimination = eliminate(generator, root).ok()?;
        let fully_bound = elimination.log_tree_weight();
        let others = fully_bound + elimination.log_relative_mass_excluding(root);
        (!fully_bound.is_nan() && !others.is_nan()).then_some(Self {
            fully_bound,
            others,
        })
    }

    fn probability(self) -> f64 {
        logistic(self.others - self.fully_bound)
    }
}

#[derive(Clone, Copy, Debug)]
struct Evaluation {
    point: f64,
    gap: f64,
    bound: Option<f64>,
}

/// Prepared search at one time scale.
#[derive(Debug)]
pub(crate) struct BoundSearch {
    compiled: CompiledGenerator,
    reference: ReferenceHill,
    s: f64,
    claimed: f64,
    threshold: f64,
    slack: f64,
    /// Log tree weight of the empty state at `x = 0`.
    empty_at_zero: Option<f64>,
    /// Log tree weight of the fully bound state in the homogeneous form at
    /// `x = ∞`.
    fully_bound_at_infinity: Option<f64>,
}

impl BoundSearch {
    /// Validates inputs and precomputes the tail anchors.
    ///
    /// # Errors
    /// Returns [`KineticsError::InvalidParameter`] when `s` or `claimed` is
    /// not finite and positive, and [`KineticsError::MalformedGraph`] when the
    /// generator has a non-positive rate term.
    pub(crate) fn new(
        generator: &GeneratorMatrix<RateExpr>,
        reference: ReferenceHill,
        s: f64,
        claimed: f64,
    ) -> Result<Self> {
        if !s.is_finite() || s <= 0.0 {
            return Err(KineticsError::invalid(
                "s",
                s,
                "must be finite and strictly positive",
            ));
        }
        if !claimed.is_finite() || claimed <= 0.0 {
            return Err(KineticsError::invalid(
                "claimed",
                claimed,
                "must be finite and strictly positive",
            ));
        }
        let compiled = generator.compile()?;
        let dimension = compiled.dimension();
        let empty_at_zero = compiled
            .at_point(&0.0, &s)
            .and_then(|at_zero| eliminate(&at_zero, 0).ok())
            .map(|elimination| elimination.log_tree_weight());
        let fully_bound_at_infinity = dimension.checked_sub(1).and_then(|root| {
            eliminate(&compiled.homogeneous(1.0, 0.0, s), root)
                .ok()
                .map(|elimination| elimination.log_tree_weight())
        });
        let cube = (dimension as f64).powi(3);
        Ok(Self {
            compiled,
            reference,
            s,
            claimed,
            threshold: claimed / s.sqrt(),
            slack: cube * 16.0 * f64::EPSILON,
            empty_at_zero,
            fully_bound_at_infinity,
        })
    }

    fn masses_at(&self, x: f64) -> Option<LogMasses> {
        LogMasses::of(&self.compiled.at_point(&x, &self.s)?)
    }

    fn point_gap(&self, x: f64) -> Result<f64> {
        let masses = self.masses_at(x).ok_or_else(|| {
            KineticsError::malformed(
                self.compiled.dimension(),
                format_args!("steady state at x = {x} is not defined"),
            )
        })?;
        Ok((masses.probability() - self.reference.evaluate(x)).abs())
    }

    /// Upper bound on `|P - H|` over the box, or `None` when a tree weight
    /// cannot be evaluated there.
    fn box_bound(&self, search_box: SearchBox) -> Option<f64> {
        let hill = |x: f64| self.reference.evaluate(x);
        match search_box {
            SearchBox::Lower { upper } => {
                let at_upper = self.masses_at(upper)?;
                let highest = logistic(self.empty_at_zero? - at_upper.fully_bound);
                Some(highest.max(hill(upper)))
            }
            SearchBox::Finite { lower, upper } => {
                let at_lower = self.masses_at(lower)?;
                let at_upper = self.masses_at(upper)?;
                let lowest = logistic(at_upper.others - at_lower.fully_bound);
                let highest = logistic(at_lower.others - at_upper.fully_bound);
                Some((highest - hill(lower)).max(hill(upper) - lowest))
            }
            SearchBox::Upper { lower } => {
                let scaled = LogMasses::of(&self.compiled.homogeneous(1.0, lower.recip(), self.s))?;
                let lowest = logistic(scaled.others - self.fully_bound_at_infinity?);
                Some((1.0 - hill(lower)).max(1.0 - lowest))
            }
        }
    }

    fn evaluate(&self, search_box: SearchBox) -> Result<Evaluation> {
        let point = search_box.representative();
        Ok(Evaluation {
            point,
            gap: self.point_gap(point)?,
            bound: self.box_bound(search_box),
        })
    }

    fn evaluate_batch(&self, batch: &[SearchBox]) -> Result<Vec<Evaluation>> {
        #[cfg(feature = "parallel")]
        {
            batch
                .par_iter()
                .map(|&search_box| self.evaluate(search_box))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            batch
                .iter()
                .map(|&search_box| self.evaluate(search_box))
                .collect()
        }
    }

    /// Runs the search until every box is certified, a counterexample is
    /// found or the budget stops it.
    ///
    /// # Errors
    /// Returns [`KineticsError::MalformedGraph`] when the steady state at a
    /// sample point is undefined.
    #[instrument(
        name = "core.convergence.bound",
        err,
        skip(self, budget),
        fields(
            s = self.s,
            claimed = self.claimed,
            dimension = self.compiled.dimension(),
            max_boxes = budget.max_boxes(),
        ),
    )]
    pub(crate) fn run(&self, budget: &SearchBudget) -> Result<BoundVerdict> {
        let mut frontier: VecDeque<SearchBox> = SearchBox::initial().into_iter().collect();
        let mut examined = 0_usize;
        let mut certified = 0_usize;
        let mut constant = 0.0_f64;
        let mut best_gap = 0.0_f64;
        let scale = self.s.sqrt();

        while !frontier.is_empty() {
            if let Some(reason) = budget.stop_reason(examined) {
                info!(%reason, examined, certified, best_gap, "bound search stopped");
                return Ok(BoundVerdict::Inconclusive {
                    reason,
                    boxes_examined: examined,
                    best_gap,
                });
            }
            let take = frontier
                .len()
                .min(BATCH_SIZE)
                .min(budget.max_boxes() - examined);
            let batch: Vec<SearchBox> = frontier.drain(..take).collect();
            let evaluations = self.evaluate_batch(&batch)?;
            examined += batch.len();
            record_boxes_examined(batch.len());

            for (search_box, evaluation) in batch.into_iter().zip(evaluations) {
                best_gap = best_gap.max(evaluation.gap);
                if evaluation.gap > self.threshold + self.slack {
                    info!(
                        x = evaluation.point,
                        gap = evaluation.gap,
                        examined,
                        "bound violated"
                    );
                    return Ok(BoundVerdict::Violated {
                        counterexample_x: evaluation.point,
                        gap: evaluation.gap,
                        threshold: self.threshold,
                    });
                }
                match evaluation.bound {
                    Some(bound) if bound + self.slack <= self.threshold => {
                        certified += 1;
                        record_box_certified();
                        constant = constant.max(bound * scale);
                    }
                    _ => frontier.extend(search_box.split()),
                }
            }
            debug!(examined, certified, pending = frontier.len(), "bound search batch");
        }

        info!(constant, examined, "bound certified");
        Ok(BoundVerdict::Holds {
            constant,
            claimed: self.claimed,
            boxes: examined,
        })
    }
}

#[cfg(feature = "metrics")]
fn record_boxes_examined(count: usize) {
    metrics::counter!("nesthill_bound_boxes_examined").increment(count as u64);
}

#[cfg(not(feature = "metrics"))]
fn record_boxes_examined(_count: usize) {}

#[cfg(feature = "metrics")]
fn record_box_certified() {
    metrics::counter!("nesthill_bound_boxes_certified").increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_box_certified() {}
