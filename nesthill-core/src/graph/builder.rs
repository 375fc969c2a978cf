//! Recursive doubling construction of nested hysteresis schemes.

use tracing::{debug, instrument};

use super::{KineticGraph, StateVertex, Transition, WeightedEdge};
use crate::{Result, error::KineticsError, rate::Rate};

/// Builds the single-site scheme: `(0) -> (1)` at rate `x`, `(1) -> (0)` at
/// rate `1`.
///
/// # Examples
/// ```
/// use nesthill_core::build_base;
///
/// let base = build_base();
/// assert_eq!(base.vertices().len(), 2);
/// assert_eq!(base.edges().first().map(|edge| edge.rate().to_string()).as_deref(), Some("x"));
/// ```
#[must_use]
pub fn build_base() -> KineticGraph {
    let vertices = vec![StateVertex::new([false]), StateVertex::new([true])];
    let edges = vec![
        WeightedEdge {
            source: 0,
            target: 1,
            site: 0,
            direction: Transition::Binding,
            rate: Rate::binding(),
        },
        WeightedEdge {
            source: 1,
            target: 0,
            site: 0,
            direction: Transition::Unbinding,
            rate: Rate::unit(),
        },
    ];
    KineticGraph::from_validated(vertices, edges)
}

/// Doubles `graph` into a scheme with one more site.
///
/// The result holds a 0-copy of `graph` (new site empty) followed by a 1-copy
/// (new site occupied), with every copied rate multiplied by `s`. Two unscaled
/// edges join the copies: the lowest-occupancy vertex unbinds the new site at
/// rate `1` and the highest-occupancy vertex binds it at rate `x`. Ties in
/// occupancy resolve to the earliest vertex for the lowest and the latest for
/// the highest, following a stable ascending sort.
///
/// # Errors
/// Returns [`KineticsError::MalformedGraph`] when `graph` fails
/// [`KineticGraph::validate_scheme_shape`], and
/// [`KineticsError::InvalidParameter`] when scaling a rate by `s` overflows
/// its exponent.
#[instrument(
    name = "core.graph.step",
    err,
    skip(graph),
    fields(sites = graph.sites(), edges = graph.edges().len()),
)]
pub fn step(graph: &KineticGraph) -> Result<KineticGraph> {
    let sites = graph.validate_scheme_shape()?;
    let count = graph.vertices().len();

    let mut order: Vec<usize> = (0..count).collect();
    let weight = |index: usize| graph.vertices().get(index).map(StateVertex::hamming_weight);
    order.sort_by_key(|&index| weight(index));
    let (Some(&first), Some(&last)) = (order.first(), order.last()) else {
        return Err(KineticsError::malformed(count, "graph has no vertices"));
    };
    let (Some(lowest), Some(highest)) = (graph.vertices().get(first), graph.vertices().get(last))
    else {
        return Err(KineticsError::malformed(count, "extreme vertex out of range"));
    };

    let vertices: Vec<StateVertex> = [false, true]
        .into_iter()
        .flat_map(|occupied| {
            graph
                .vertices()
                .iter()
                .map(move |vertex| vertex.extended(occupied))
        })
        .collect();

    let mut edges = Vec::with_capacity(2 * graph.edges().len() + 2);
    for offset in [0, count] {
        for edge in graph.edges() {
            edges.push(WeightedEdge {
                source: edge.source + offset,
                target: edge.target + offset,
                site: edge.site,
                direction: edge.direction,
                rate: edge.rate.scaled_by_s()?,
            });
        }
    }
    edges.push(WeightedEdge {
        source: first + count,
        target: first,
        site: sites,
        direction: Transition::Unbinding,
        rate: Rate::unit(),
    });
    edges.push(WeightedEdge {
        source: last,
        target: last + count,
        site: sites,
        direction: Transition::Binding,
        rate: Rate::binding(),
    });

    debug!(first = %lowest, last = %highest, "joined copies");
    Ok(KineticGraph::from_validated(vertices, edges))
}

/// Applies [`step`] `steps` times to `base`, yielding a `steps + 1` site
/// scheme when `base` is [`build_base`].
///
/// # Errors
/// Propagates [`step`] failures.
///
/// # Examples
/// ```
/// use nesthill_core::{build_base, iterate};
///
/// let graph = iterate(build_base(), 2).expect("construction succeeds");
/// assert_eq!(graph.sites(), 3);
/// assert_eq!(graph.vertices().len(), 8);
/// ```
pub fn iterate(base: KineticGraph, steps: usize) -> Result<KineticGraph> {
    (0..steps).try_fold(base, |graph, _| step(&graph))
}
