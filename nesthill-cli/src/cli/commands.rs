//! Command implementations and argument parsing for the `nesthill` CLI.

use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use nesthill_core::{
    BoundVerdict, ConvergenceAnalyzer, DEFAULT_MAX_BOXES, DEFAULT_MAX_SITES, DEFAULT_WARN_SITES,
    ExactProvider, Field, GeneratorMatrix, KineticGraph, KineticsBuilder, KineticsError,
    MathProvider, NumericProvider, NumericSolver, Parameters, Rate, ReferenceHill, SearchBudget,
    SolveMethod, StateVertex,
};
use num_rational::BigRational;
use thiserror::Error;
use tracing::{Span, field, info, instrument};

const DEFAULT_SITES: usize = 3;
const DEFAULT_Q: &str = "1/s";
const DEFAULT_S: &str = "1000";
const DEFAULT_BOUND_S: f64 = 1000.0;
const DEFAULT_CONSTANT: f64 = 0.5;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "nesthill",
    about = "Build nested hysteresis binding schemes and compare them with Hill curves."
)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the vertices and weighted edges of a scheme.
    Graph(SchemeArgs),
    /// Solve the stationary distribution at one `(x, s)`.
    SteadyState(SteadyStateArgs),
    /// Report the `s -> ∞` limit of the fully bound probability and its slope.
    Limit(LimitArgs),
    /// Check `sup_x |P(x, s) - H(x)| <= C / sqrt(s)` by certified search.
    CheckBound(BoundArgs),
}

/// Options selecting the scheme every command works on.
#[derive(Debug, Args, Clone)]
pub struct SchemeArgs {
    /// Number of binding sites.
    #[arg(long, default_value_t = DEFAULT_SITES)]
    pub sites: usize,

    /// Rate of the stabilizing transitions, such as `1/s` or `2*s^-2`.
    #[arg(long, default_value = DEFAULT_Q)]
    pub q: Rate,

    /// Build the raw recursive scheme without extreme-state stabilization.
    #[arg(long)]
    pub unstabilized: bool,

    /// Largest accepted site count.
    #[arg(long = "max-sites", default_value_t = DEFAULT_MAX_SITES)]
    pub max_sites: usize,
}

/// Parameter values as text, so exact runs keep every digit.
#[derive(Debug, Args, Clone)]
pub struct PointArgs {
    /// Ligand concentration, as a decimal, `1e-3` or `p/q`.
    #[arg(long)]
    pub x: String,

    /// Time-scale factor.
    #[arg(long, default_value = DEFAULT_S)]
    pub s: String,

    /// Use exact rational arithmetic.
    #[arg(long)]
    pub exact: bool,
}

/// Floating-point solver choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolverMethod {
    /// Condition-checked LU solve with a normalization row.
    ReplacedRow,
    /// Subtraction-free GTH elimination.
    Gth,
}

impl From<SolverMethod> for SolveMethod {
    fn from(method: SolverMethod) -> Self {
        match method {
            SolverMethod::ReplacedRow => Self::ReplacedRow,
            SolverMethod::Gth => Self::Gth,
        }
    }
}

/// Options accepted by `steady-state`.
#[derive(Debug, Args, Clone)]
pub struct SteadyStateArgs {
    /// Scheme selection.
    #[command(flatten)]
    pub scheme: SchemeArgs,

    /// Evaluation point.
    #[command(flatten)]
    pub point: PointArgs,

    /// Floating-point solver; ignored with `--exact`.
    #[arg(long, value_enum, default_value_t = SolverMethod::ReplacedRow)]
    pub method: SolverMethod,
}

/// Options accepted by `limit`.
#[derive(Debug, Args, Clone)]
pub struct LimitArgs {
    /// Scheme selection.
    #[command(flatten)]
    pub scheme: SchemeArgs,

    /// Ligand concentration, as a decimal, `1e-3` or `p/q`.
    #[arg(long)]
    pub x: String,

    /// Use exact rational arithmetic.
    #[arg(long)]
    pub exact: bool,
}

/// Options accepted by `check-bound`.
#[derive(Debug, Args, Clone)]
pub struct BoundArgs {
    /// Scheme selection.
    #[command(flatten)]
    pub scheme: SchemeArgs,

    /// Time-scale factor at which the bound is checked.
    #[arg(long, default_value_t = DEFAULT_BOUND_S)]
    pub s: f64,

    /// Claimed constant `C`.
    #[arg(long, default_value_t = DEFAULT_CONSTANT)]
    pub constant: f64,

    /// Hill exponent of the reference curve; defaults to `2^sites - 1`.
    #[arg(long)]
    pub hill: Option<u32>,

    /// Largest number of boxes to examine.
    #[arg(long = "max-boxes", default_value_t = DEFAULT_MAX_BOXES)]
    pub max_boxes: usize,

    /// Wall-clock limit for the search.
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// The engine rejected the request.
    #[error(transparent)]
    Core(#[from] KineticsError),
}

/// A scalar result from either backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Exact rational.
    Exact(BigRational),
    /// Floating-point approximation.
    Numeric(f64),
}

impl Value {
    /// Floating-point view of the value.
    #[must_use]
    pub fn approximate(&self) -> f64 {
        match self {
            Self::Exact(value) => value.approximate(),
            Self::Numeric(value) => *value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value} (~{:.12})", value.approximate()),
            Self::Numeric(value) => write!(f, "{value:.12}"),
        }
    }
}

/// Outcome of one command, ready for [`render_summary`].
#[derive(Debug, Clone)]
pub enum ExecutionSummary {
    /// Output of `graph`.
    Graph {
        /// Constructed scheme.
        graph: KineticGraph,
    },
    /// Output of `steady-state`.
    SteadyState {
        /// Backend that produced the distribution.
        backend: &'static str,
        /// Vertices in generator order.
        states: Vec<StateVertex>,
        /// Stationary probability of each vertex.
        probabilities: Vec<Value>,
    },
    /// Output of `limit`.
    Limit {
        /// Evaluation point.
        x: Value,
        /// Reference curve matching the site count.
        reference: ReferenceHill,
        /// Reference value at `x`.
        hill: Value,
        /// `lim P(x, s)`.
        limit: Value,
        /// `lim ∂P/∂x (x, s)`.
        derivative_limit: Value,
    },
    /// Output of `check-bound`.
    Bound {
        /// Reference curve.
        reference: ReferenceHill,
        /// Time-scale factor checked.
        s: f64,
        /// Search outcome.
        verdict: BoundVerdict,
    },
}

/// Executes the CLI command represented by `cli`.
///
/// # Errors
/// Returns [`CliError::Core`] when the engine rejects the scheme or
/// parameters.
///
/// # Examples
/// ```
/// use nesthill_cli::cli::{Cli, Command, ExecutionSummary, SchemeArgs, run_cli};
///
/// let cli = Cli {
///     command: Command::Graph(SchemeArgs {
///         sites: 2,
///         q: "1/s".parse().expect("rate parses"),
///         unstabilized: false,
///         max_sites: 12,
///     }),
/// };
/// match run_cli(cli).expect("command succeeds") {
///     ExecutionSummary::Graph { graph } => assert_eq!(graph.vertices().len(), 4),
///     other => panic!("unexpected summary: {other:?}"),
/// }
/// ```
#[instrument(name = "cli.run", err, skip(cli), fields(command = field::Empty))]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    let span = Span::current();
    match cli.command {
        Command::Graph(args) => {
            span.record("command", field::display("graph"));
            run_graph(&args)
        }
        Command::SteadyState(args) => {
            span.record("command", field::display("steady-state"));
            run_steady_state(&args)
        }
        Command::Limit(args) => {
            span.record("command", field::display("limit"));
            run_limit(&args)
        }
        Command::CheckBound(args) => {
            span.record("command", field::display("check-bound"));
            run_check_bound(&args)
        }
    }
}

#[instrument(
    name = "cli.scheme",
    err,
    skip(args),
    fields(sites = args.sites, q = %args.q, stabilized = !args.unstabilized),
)]
pub(super) fn build_scheme(args: &SchemeArgs) -> Result<KineticGraph, CliError> {
    let kinetics = KineticsBuilder::new()
        .with_max_sites(args.max_sites)
        .with_warn_sites(DEFAULT_WARN_SITES.min(args.max_sites))
        .build()?;
    let graph = if args.unstabilized {
        kinetics.scheme(args.sites)?
    } else {
        kinetics.stabilized_scheme(args.sites, &args.q)?
    };
    Ok(graph)
}

#[instrument(name = "cli.graph", err, skip(args))]
pub(super) fn run_graph(args: &SchemeArgs) -> Result<ExecutionSummary, CliError> {
    let graph = build_scheme(args)?;
    info!(
        vertices = graph.vertices().len(),
        edges = graph.edges().len(),
        "graph command completed"
    );
    Ok(ExecutionSummary::Graph { graph })
}

#[instrument(
    name = "cli.steady_state",
    err,
    skip(args),
    fields(x = %args.point.x, s = %args.point.s, backend = field::Empty),
)]
pub(super) fn run_steady_state(args: &SteadyStateArgs) -> Result<ExecutionSummary, CliError> {
    let graph = build_scheme(&args.scheme)?;
    let generator = GeneratorMatrix::build(&graph)?;
    let exact = Parameters::parse(&args.point.x, &args.point.s)?;
    let (backend, probabilities) = if args.point.exact {
        let provider = ExactProvider;
        let pi = provider.steady_state(&generator, &exact)?;
        let values = pi.into_inner().into_iter().map(Value::Exact).collect();
        (provider.name(), values)
    } else {
        let provider = NumericProvider::new()
            .with_solver(NumericSolver::new().with_method(args.method.into()));
        let pi = provider.steady_state(&generator, &approximate(&exact)?)?;
        let values = pi.into_inner().into_iter().map(Value::Numeric).collect();
        (provider.name(), values)
    };
    Span::current().record("backend", field::display(backend));
    info!(states = graph.vertices().len(), "steady-state command completed");
    Ok(ExecutionSummary::SteadyState {
        backend,
        states: graph.vertices().to_vec(),
        probabilities,
    })
}

#[instrument(
    name = "cli.limit",
    err,
    skip(args),
    fields(x = %args.x, exact = args.exact),
)]
pub(super) fn run_limit(args: &LimitArgs) -> Result<ExecutionSummary, CliError> {
    let graph = build_scheme(&args.scheme)?;
    let reference = ReferenceHill::for_sites(graph.sites())?;
    let exact = Parameters::parse(&args.x, "1")?;
    let summary = if args.exact {
        let provider = ExactProvider;
        let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference)?;
        let x = exact.x();
        ExecutionSummary::Limit {
            x: Value::Exact(x.clone()),
            reference,
            hill: Value::Exact(reference.evaluate_exact(x)?),
            limit: Value::Exact(analyzer.limit(x)?),
            derivative_limit: Value::Exact(analyzer.derivative_limit(x)?),
        }
    } else {
        let provider = NumericProvider::new();
        let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference)?;
        let x = exact.x().approximate();
        ExecutionSummary::Limit {
            x: Value::Numeric(x),
            reference,
            hill: Value::Numeric(reference.evaluate(x)),
            limit: Value::Numeric(analyzer.limit(&x)?),
            derivative_limit: Value::Numeric(analyzer.derivative_limit(&x)?),
        }
    };
    info!(%reference, "limit command completed");
    Ok(summary)
}

#[instrument(
    name = "cli.check_bound",
    err,
    skip(args),
    fields(
        s = args.s,
        constant = args.constant,
        max_boxes = args.max_boxes,
        verdict = field::Empty,
    ),
)]
pub(super) fn run_check_bound(args: &BoundArgs) -> Result<ExecutionSummary, CliError> {
    let graph = build_scheme(&args.scheme)?;
    let reference = match args.hill {
        Some(exponent) => ReferenceHill::new(exponent)?,
        None => ReferenceHill::for_sites(graph.sites())?,
    };
    let mut budget = SearchBudget::new(args.max_boxes);
    if let Some(seconds) = args.timeout_secs {
        budget = budget.with_deadline(Instant::now() + Duration::from_secs(seconds));
    }
    let provider = NumericProvider::new();
    let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference)?;
    let verdict = analyzer.check_uniform_bound(args.s, args.constant, &budget)?;
    let label = match verdict.bound_holds() {
        Some(true) => "holds",
        Some(false) => "violated",
        None => "inconclusive",
    };
    Span::current().record("verdict", field::display(label));
    info!(%reference, verdict = label, "check-bound command completed");
    Ok(ExecutionSummary::Bound {
        reference,
        s: args.s,
        verdict,
    })
}

/// Rounds exact parameters to the nearest floating-point values.
fn approximate(exact: &Parameters<BigRational>) -> Result<Parameters<f64>, CliError> {
    Ok(Parameters::new(
        exact.x().approximate(),
        exact.s().approximate(),
    )?)
}

/// Renders `summary` to `writer` as plain text.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use nesthill_cli::cli::{ExecutionSummary, Value, render_summary};
/// # use nesthill_core::StateVertex;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let summary = ExecutionSummary::SteadyState {
///     backend: "numeric",
///     states: vec![StateVertex::new([false]), StateVertex::new([true])],
///     probabilities: vec![Value::Numeric(0.25), Value::Numeric(0.75)],
/// };
/// let mut buffer = Vec::new();
/// render_summary(&summary, &mut buffer)?;
/// assert_eq!(
///     String::from_utf8(buffer)?,
///     "backend: numeric\n(0)\t0.250000000000\n(1)\t0.750000000000\n"
/// );
/// # Ok(())
/// # }
/// ```
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    match summary {
        ExecutionSummary::Graph { graph } => write!(writer, "{graph}"),
        ExecutionSummary::SteadyState {
            backend,
            states,
            probabilities,
        } => {
            writeln!(writer, "backend: {backend}")?;
            for (state, probability) in states.iter().zip(probabilities) {
                writeln!(writer, "{state}\t{probability}")?;
            }
            Ok(())
        }
        ExecutionSummary::Limit {
            x,
            reference,
            hill,
            limit,
            derivative_limit,
        } => {
            writeln!(writer, "x: {x}")?;
            writeln!(writer, "reference: {reference}")?;
            writeln!(writer, "reference value: {hill}")?;
            writeln!(writer, "limit: {limit}")?;
            writeln!(writer, "derivative limit: {derivative_limit}")
        }
        ExecutionSummary::Bound {
            reference,
            s,
            verdict,
        } => {
            writeln!(writer, "reference: {reference}")?;
            writeln!(writer, "s: {s}")?;
            writeln!(writer, "verdict: {verdict}")
        }
    }
}
