//! Weighted occupancy graphs of multi-site binding schemes.
//!
//! A [`KineticGraph`] stores its vertices in construction order. That order is
//! the indexing contract for the generator and every steady-state vector: the
//! all-empty state comes first and the fully bound state last.

mod builder;
mod stabilize;

use std::{collections::HashSet, fmt};

use crate::{Result, error::KineticsError, rate::Rate};

pub use self::{
    builder::{build_base, iterate, step},
    stabilize::stabilize_extremes,
};

/// Occupancy of every binding site, one flag per site.
///
/// # Examples
/// ```
/// use nesthill_core::StateVertex;
///
/// let vertex = StateVertex::new([false, true, true]);
/// assert_eq!(vertex.hamming_weight(), 2);
/// assert_eq!(vertex.to_string(), "(0,1,1)");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateVertex(Box<[bool]>);

impl StateVertex {
    /// Creates a vertex from per-site occupancy flags.
    #[must_use]
    pub fn new(occupancy: impl Into<Box<[bool]>>) -> Self {
        Self(occupancy.into())
    }

    /// Number of binding sites.
    #[must_use]
    pub fn sites(&self) -> usize {
        self.0.len()
    }

    /// Per-site occupancy flags.
    #[must_use]
    pub fn occupancy(&self) -> &[bool] {
        &self.0
    }

    /// Number of occupied sites.
    #[must_use]
    pub fn hamming_weight(&self) -> usize {
        self.0.iter().filter(|&&bound| bound).count()
    }

    /// Whether no site is occupied.
    #[must_use]
    pub fn is_empty_state(&self) -> bool {
        self.0.iter().all(|&bound| !bound)
    }

    /// Whether every site is occupied.
    #[must_use]
    pub fn is_full_state(&self) -> bool {
        self.0.iter().all(|&bound| bound)
    }

    /// The vertex with one more site appended.
    #[must_use]
    pub(crate) fn extended(&self, occupied: bool) -> Self {
        let mut sites = Vec::with_capacity(self.0.len() + 1);
        sites.extend_from_slice(&self.0);
        sites.push(occupied);
        Self::new(sites)
    }

    /// The single site at which `self` and `other` differ, if exactly one.
    fn single_flip(&self, other: &Self) -> Option<usize> {
        if self.sites() != other.sites() {
            return None;
        }
        let mut differing = self
            .0
            .iter()
            .zip(other.0.iter())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(site, _)| site);
        let site = differing.next()?;
        differing.next().is_none().then_some(site)
    }
}

impl fmt::Display for StateVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (index, &bound) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(if bound { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

/// Whether an edge occupies or vacates its site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The site becomes occupied.
    Binding,
    /// The site is vacated.
    Unbinding,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Binding => "binding",
            Self::Unbinding => "unbinding",
        })
    }
}

/// A directed transition between two vertices that differ in one site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedEdge {
    source: usize,
    target: usize,
    site: usize,
    direction: Transition,
    rate: Rate,
}

impl WeightedEdge {
    /// Index of the source vertex.
    #[must_use]
    pub fn source(&self) -> usize {
        self.source
    }

    /// Index of the target vertex.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Site flipped by the transition.
    #[must_use]
    pub fn site(&self) -> usize {
        self.site
    }

    /// Whether the transition binds or unbinds.
    #[must_use]
    pub fn direction(&self) -> Transition {
        self.direction
    }

    /// Transition rate.
    #[must_use]
    pub fn rate(&self) -> &Rate {
        &self.rate
    }

    pub(crate) fn with_rate(&self, rate: Rate) -> Self {
        Self {
            rate,
            ..self.clone()
        }
    }
}

/// Immutable weighted digraph over occupancy states.
///
/// Graphs come from [`build_base`], [`step`], [`iterate`] and
/// [`stabilize_extremes`], or from [`KineticGraph::from_parts`], which checks
/// the per-vertex and per-edge invariants. Whole-scheme invariants (vertex
/// count, extreme vertex placement) are checked by each consumer through
/// [`KineticGraph::validate_scheme_shape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KineticGraph {
    vertices: Vec<StateVertex>,
    edges: Vec<WeightedEdge>,
}

impl KineticGraph {
    /// Assembles a graph from vertices and `(source, target, rate)` triples.
    ///
    /// # Errors
    /// Returns [`KineticsError::MalformedGraph`] when the vertex list is empty,
    /// vertices have different site counts or repeat, an edge index is out of
    /// range, an edge does not flip exactly one site, or an edge repeats.
    ///
    /// # Examples
    /// ```
    /// use nesthill_core::{KineticGraph, Rate, StateVertex};
    ///
    /// let graph = KineticGraph::from_parts(
    ///     vec![StateVertex::new([false]), StateVertex::new([true])],
    ///     vec![(0, 1, Rate::binding()), (1, 0, Rate::unit())],
    /// )
    /// .expect("graph is well formed");
    /// assert_eq!(graph.validate_scheme_shape().expect("scheme shape"), 1);
    /// ```
    pub fn from_parts(
        vertices: Vec<StateVertex>,
        edges: Vec<(usize, usize, Rate)>,
    ) -> Result<Self> {
        let count = vertices.len();
        let Some(sites) = vertices.first().map(StateVertex::sites) else {
            return Err(KineticsError::malformed(0, "graph has no vertices"));
        };
        if sites == 0 {
            return Err(KineticsError::malformed(count, "vertices have no sites"));
        }
        let mut seen = HashSet::with_capacity(count);
        for vertex in &vertices {
            if vertex.sites() != sites {
                return Err(KineticsError::malformed(
                    count,
                    format_args!("vertex {vertex} has {} sites, expected {sites}", vertex.sites()),
                ));
            }
            if !seen.insert(vertex) {
                return Err(KineticsError::malformed(
                    count,
                    format_args!("vertex {vertex} appears more than once"),
                ));
            }
        }

        let mut pairs = HashSet::with_capacity(edges.len());
        let mut weighted = Vec::with_capacity(edges.len());
        for (source, target, rate) in edges {
            let (Some(from), Some(to)) = (vertices.get(source), vertices.get(target)) else {
                return Err(KineticsError::malformed(
                    count,
                    format_args!("edge {source} -> {target} references a missing vertex"),
                ));
            };
            let Some(site) = from.single_flip(to) else {
                return Err(KineticsError::malformed(
                    count,
                    format_args!("edge {from} -> {to} does not flip exactly one site"),
                ));
            };
            if !pairs.insert((source, target)) {
                return Err(KineticsError::malformed(
                    count,
                    format_args!("edge {from} -> {to} appears more than once"),
                ));
            }
            let direction = if to.occupancy().get(site) == Some(&true) {
                Transition::Binding
            } else {
                Transition::Unbinding
            };
            weighted.push(WeightedEdge {
                source,
                target,
                site,
                direction,
                rate,
            });
        }

        Ok(Self {
            vertices,
            edges: weighted,
        })
    }

    /// Constructs a graph whose invariants the caller has already established.
    pub(crate) fn from_validated(vertices: Vec<StateVertex>, edges: Vec<WeightedEdge>) -> Self {
        Self { vertices, edges }
    }

    /// Vertices in indexing order.
    #[must_use]
    pub fn vertices(&self) -> &[StateVertex] {
        &self.vertices
    }

    /// Edges in construction order.
    #[must_use]
    pub fn edges(&self) -> &[WeightedEdge] {
        &self.edges
    }

    /// Number of binding sites per vertex.
    #[must_use]
    pub fn sites(&self) -> usize {
        self.vertices.first().map_or(0, StateVertex::sites)
    }

    /// Checks the whole-scheme invariants and returns the site count `n`.
    ///
    /// # Errors
    /// Returns [`KineticsError::MalformedGraph`] when the vertex count is not
    /// `2^n` for the vertices' site count `n`, or when the all-empty and fully
    /// bound vertices are not first and last.
    pub fn validate_scheme_shape(&self) -> Result<usize> {
        let count = self.vertices.len();
        if !count.is_power_of_two() {
            return Err(KineticsError::malformed(
                count,
                "vertex count is not a power of two",
            ));
        }
        let sites = count.trailing_zeros() as usize;
        if self.sites() != sites {
            return Err(KineticsError::malformed(
                count,
                format_args!("{count} vertices cannot carry {} sites", self.sites()),
            ));
        }
        let extremes = self
            .vertices
            .first()
            .zip(self.vertices.last())
            .filter(|(first, last)| first.is_empty_state() && last.is_full_state());
        if extremes.is_none() {
            return Err(KineticsError::malformed(
                count,
                "all-empty vertex must come first and fully bound vertex last",
            ));
        }
        Ok(sites)
    }

    /// Whether every vertex can reach every other vertex.
    #[must_use]
    pub fn is_strongly_connected(&self) -> bool {
        let pairs = self.edges.iter().map(|edge| (edge.source, edge.target));
        strongly_connected(&adjacency(self.vertices.len(), pairs))
    }
}

/// Successor lists of a digraph on `count` vertices; out-of-range pairs are
/// dropped.
pub(crate) fn adjacency(
    count: usize,
    pairs: impl IntoIterator<Item = (usize, usize)>,
) -> Vec<Vec<usize>> {
    let mut successors = vec![Vec::new(); count];
    for (source, target) in pairs {
        if target < count
            && let Some(list) = successors.get_mut(source)
        {
            list.push(target);
        }
    }
    successors
}

/// Flags every vertex reachable from `start`, including `start` itself.
fn reachable_from(successors: &[Vec<usize>], start: usize) -> Vec<bool> {
    let mut visited = vec![false; successors.len()];
    let mut stack = Vec::new();
    if let Some(seen) = visited.get_mut(start) {
        *seen = true;
        stack.push(start);
    }
    while let Some(vertex) = stack.pop() {
        for &next in successors.get(vertex).into_iter().flatten() {
            if let Some(seen) = visited.get_mut(next)
                && !*seen
            {
                *seen = true;
                stack.push(next);
            }
        }
    }
    visited
}

/// Whether the digraph is non-empty and strongly connected.
pub(crate) fn strongly_connected(successors: &[Vec<usize>]) -> bool {
    let count = successors.len();
    if count == 0 {
        return false;
    }
    let mut predecessors = vec![Vec::new(); count];
    for (source, targets) in successors.iter().enumerate() {
        for &target in targets {
            if let Some(list) = predecessors.get_mut(target) {
                list.push(source);
            }
        }
    }
    let all = |flags: Vec<bool>| flags.into_iter().all(|seen| seen);
    all(reachable_from(successors, 0)) && all(reachable_from(&predecessors, 0))
}

/// Number of closed communicating classes, which is the dimension of the
/// kernel of a generator with this transition structure.
pub(crate) fn closed_classes(successors: &[Vec<usize>]) -> usize {
    let reach: Vec<Vec<bool>> = (0..successors.len())
        .map(|vertex| reachable_from(successors, vertex))
        .collect();
    reach
        .iter()
        .enumerate()
        .filter(|(vertex, reached)| {
            let closed = reached
                .iter()
                .zip(&reach)
                .filter(|(seen, _)| **seen)
                .all(|(_, back)| back.get(*vertex) == Some(&true));
            // a closed class is counted once, at its lowest vertex
            let lowest = reached.iter().position(|seen| *seen) == Some(*vertex);
            closed && lowest
        })
        .count()
}

impl fmt::Display for KineticGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} sites, {} vertices, {} edges",
            self.sites(),
            self.vertices.len(),
            self.edges.len()
        )?;
        for edge in &self.edges {
            let (Some(source), Some(target)) =
                (self.vertices.get(edge.source), self.vertices.get(edge.target))
            else {
                return Err(fmt::Error);
            };
            writeln!(
                f,
                "  {source} -> {target}  [site {}, {}]  {}",
                edge.site, edge.direction, edge.rate
            )?;
        }
        Ok(())
    }
}
