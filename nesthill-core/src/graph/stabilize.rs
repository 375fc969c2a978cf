//! Slowing the transitions out of the two extreme occupancy states.

use tracing::instrument;

use super::{KineticGraph, Transition};
use crate::{Result, error::KineticsError, rate::Rate};

/// Site introduced by the single-site base graph.
const BASE_SITE: usize = 0;

/// Multiplies by `q` the two edges leaving the extreme states along the base
/// site: binding out of the all-empty state and unbinding out of the fully
/// bound state. Every other rate is unchanged.
///
/// # Errors
/// Returns [`KineticsError::MalformedGraph`] when `graph` fails
/// [`KineticGraph::validate_scheme_shape`] or lacks either extreme edge, and
/// [`KineticsError::InvalidParameter`] when multiplying by `q` overflows an
/// exponent.
///
/// # Examples
/// ```
/// use nesthill_core::{Rate, build_base, iterate, stabilize_extremes};
///
/// let graph = iterate(build_base(), 2).expect("construction succeeds");
/// let stabilized = stabilize_extremes(&graph, &Rate::time_scale(-1))
///     .expect("scheme has extreme edges");
/// let changed = graph
///     .edges()
///     .iter()
///     .zip(stabilized.edges())
///     .filter(|(before, after)| before != after)
///     .count();
/// assert_eq!(changed, 2);
/// ```
#[instrument(
    name = "core.graph.stabilize",
    err,
    skip(graph, q),
    fields(sites = graph.sites(), q = %q),
)]
pub fn stabilize_extremes(graph: &KineticGraph, q: &Rate) -> Result<KineticGraph> {
    let sites = graph.validate_scheme_shape()?;
    let count = graph.vertices().len();
    let empty = 0;
    let full = count.saturating_sub(1);

    let leaving = |source: usize, direction: Transition| {
        graph
            .edges()
            .iter()
            .position(|edge| {
                edge.source == source && edge.site == BASE_SITE && edge.direction == direction
            })
            .ok_or_else(|| {
                let label = graph
                    .vertices()
                    .get(source)
                    .map_or_else(|| format!("state {source}"), ToString::to_string);
                KineticsError::malformed(
                    count,
                    format_args!(
                        "{label} has no {direction} edge on site {BASE_SITE} of the {sites}-site scheme"
                    ),
                )
            })
    };
    let targets = [
        leaving(empty, Transition::Binding)?,
        leaving(full, Transition::Unbinding)?,
    ];

    let edges = graph
        .edges()
        .iter()
        .enumerate()
        .map(|(index, edge)| {
            if targets.contains(&index) {
                Ok(edge.with_rate(edge.rate().times(q)?))
            } else {
                Ok(edge.clone())
            }
        })
        .collect::<Result<_>>()?;
    Ok(KineticGraph::from_validated(graph.vertices().to_vec(), edges))
}
