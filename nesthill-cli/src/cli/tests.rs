//! Unit tests for argument parsing, command execution and rendering.

use super::commands::build_scheme;
use super::{
    BoundArgs, Cli, CliError, Command, ExecutionSummary, LimitArgs, PointArgs, SchemeArgs,
    SolverMethod, SteadyStateArgs, Value, render_summary, run_cli,
};

use clap::Parser;
use nesthill_core::{BoundVerdict, KineticsBuilder, KineticsError, Rate};
use nesthill_test_support::tracing::CaptureLayer;
use num_rational::BigRational;
use rstest::{fixture, rstest};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[fixture]
fn scheme() -> SchemeArgs {
    SchemeArgs {
        sites: 3,
        q: "1/s".parse().expect("rate parses"),
        unstabilized: false,
        max_sites: 12,
    }
}

fn ratio(numerator: i64, denominator: i64) -> BigRational {
    BigRational::new(numerator.into(), denominator.into())
}

fn run_expecting_error(command: Command, reason: &str) -> CliError {
    match run_cli(Cli { command }) {
        Ok(summary) => panic!("{reason}: got {summary:?}"),
        Err(err) => err,
    }
}

#[test]
fn parses_check_bound_flags_with_defaults() -> TestResult {
    let cli = Cli::try_parse_from([
        "nesthill",
        "check-bound",
        "--hill",
        "6",
        "--timeout-secs",
        "5",
    ])?;
    let Command::CheckBound(args) = cli.command else {
        panic!("expected check-bound");
    };
    assert_eq!(args.scheme.sites, 3);
    assert_eq!(args.scheme.q, "1/s".parse::<Rate>()?);
    assert_eq!(args.hill, Some(6));
    assert_eq!(args.timeout_secs, Some(5));
    assert_eq!(args.constant, 0.5);
    assert_eq!(args.s, 1000.0);
    Ok(())
}

#[rstest]
#[case("replaced-row", SolverMethod::ReplacedRow)]
#[case("gth", SolverMethod::Gth)]
fn parses_solver_method(#[case] raw: &str, #[case] expected: SolverMethod) -> TestResult {
    let cli = Cli::try_parse_from([
        "nesthill",
        "steady-state",
        "--x",
        "2",
        "--method",
        raw,
        "--q",
        "2*s^-2",
    ])?;
    let Command::SteadyState(args) = cli.command else {
        panic!("expected steady-state");
    };
    assert_eq!(args.method, expected);
    assert_eq!(args.point.s, "1000");
    assert!(!args.point.exact);
    assert_eq!(args.scheme.q, "2*s^-2".parse::<Rate>()?);
    Ok(())
}

#[test]
fn rejects_unparsable_rate() {
    let result = Cli::try_parse_from(["nesthill", "graph", "--q", "banana"]);
    assert!(result.is_err());
}

#[rstest]
fn graph_matches_core_construction(scheme: SchemeArgs) -> TestResult {
    let expected = KineticsBuilder::new()
        .build()?
        .stabilized_scheme(3, &scheme.q)?;
    match run_cli(Cli {
        command: Command::Graph(scheme),
    })? {
        ExecutionSummary::Graph { graph } => assert_eq!(graph, expected),
        other => panic!("unexpected summary: {other:?}"),
    }
    Ok(())
}

#[rstest]
fn unstabilized_graph_uses_the_raw_scheme(mut scheme: SchemeArgs) -> TestResult {
    scheme.unstabilized = true;
    let graph = build_scheme(&scheme)?;
    assert_eq!(graph, KineticsBuilder::new().build()?.scheme(3)?);
    Ok(())
}

#[rstest]
fn exact_steady_state_of_single_site(mut scheme: SchemeArgs) -> TestResult {
    scheme.sites = 1;
    scheme.unstabilized = true;
    let summary = run_cli(Cli {
        command: Command::SteadyState(SteadyStateArgs {
            scheme,
            point: PointArgs {
                x: "3".into(),
                s: "5".into(),
                exact: true,
            },
            method: SolverMethod::ReplacedRow,
        }),
    })?;
    let ExecutionSummary::SteadyState {
        backend,
        states,
        probabilities,
    } = summary
    else {
        panic!("expected a steady state");
    };
    assert_eq!(backend, "exact");
    assert_eq!(states.len(), 2);
    assert_eq!(
        probabilities,
        vec![Value::Exact(ratio(1, 4)), Value::Exact(ratio(3, 4))]
    );
    Ok(())
}

#[rstest]
fn numeric_solvers_agree(scheme: SchemeArgs) -> TestResult {
    let solve = |method: SolverMethod| -> Result<Vec<f64>, CliError> {
        let summary = run_cli(Cli {
            command: Command::SteadyState(SteadyStateArgs {
                scheme: scheme.clone(),
                point: PointArgs {
                    x: "3/2".into(),
                    s: "100".into(),
                    exact: false,
                },
                method,
            }),
        })?;
        match summary {
            ExecutionSummary::SteadyState { probabilities, .. } => {
                Ok(probabilities.iter().map(Value::approximate).collect())
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    };
    let replaced = solve(SolverMethod::ReplacedRow)?;
    let gth = solve(SolverMethod::Gth)?;
    assert_eq!(replaced.len(), 8);
    for (left, right) in replaced.iter().zip(&gth) {
        assert!((left - right).abs() < 1e-10, "{left} vs {right}");
    }
    assert!((replaced.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    Ok(())
}

#[rstest]
fn exact_limit_matches_hill_seven(scheme: SchemeArgs) -> TestResult {
    let summary = run_cli(Cli {
        command: Command::Limit(LimitArgs {
            scheme,
            x: "2".into(),
            exact: true,
        }),
    })?;
    let ExecutionSummary::Limit {
        reference,
        hill,
        limit,
        derivative_limit,
        ..
    } = summary
    else {
        panic!("expected a limit");
    };
    assert_eq!(reference.exponent(), 7);
    assert_eq!(limit, Value::Exact(ratio(128, 129)));
    assert_eq!(hill, limit);
    assert_eq!(derivative_limit, Value::Exact(ratio(448, 16_641)));
    Ok(())
}

#[rstest]
fn numeric_limit_is_close_to_exact(scheme: SchemeArgs) -> TestResult {
    let summary = run_cli(Cli {
        command: Command::Limit(LimitArgs {
            scheme,
            x: "2".into(),
            exact: false,
        }),
    })?;
    let ExecutionSummary::Limit {
        limit,
        derivative_limit,
        ..
    } = summary
    else {
        panic!("expected a limit");
    };
    assert!((limit.approximate() - 128.0 / 129.0).abs() < 1e-9);
    assert!((derivative_limit.approximate() - 448.0 / 16_641.0).abs() < 1e-9);
    Ok(())
}

#[rstest]
fn check_bound_reports_violation_for_hill_six(scheme: SchemeArgs) -> TestResult {
    let summary = run_cli(Cli {
        command: Command::CheckBound(BoundArgs {
            scheme,
            s: 1000.0,
            constant: 0.5,
            hill: Some(6),
            max_boxes: 5_000,
            timeout_secs: None,
        }),
    })?;
    let ExecutionSummary::Bound {
        reference, verdict, ..
    } = summary
    else {
        panic!("expected a bound verdict");
    };
    assert_eq!(reference.exponent(), 6);
    assert!(matches!(verdict, BoundVerdict::Violated { .. }));
    Ok(())
}

#[rstest]
#[case(13, 12, 12)]
#[case(5, 4, 4)]
fn rejects_sites_above_ceiling(
    mut scheme: SchemeArgs,
    #[case] sites: usize,
    #[case] max_sites: usize,
    #[case] expected_ceiling: usize,
) {
    scheme.sites = sites;
    scheme.max_sites = max_sites;
    let err = run_expecting_error(Command::Graph(scheme), "oversized scheme must fail");
    match err {
        CliError::Core(KineticsError::SiteLimitExceeded { sites: seen, ceiling }) => {
            assert_eq!(seen, sites);
            assert_eq!(ceiling, expected_ceiling);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
#[case("abc", "1000", "x")]
#[case("-2", "1000", "x")]
#[case("2", "0", "s")]
fn rejects_bad_points(
    scheme: SchemeArgs,
    #[case] x: &str,
    #[case] s: &str,
    #[case] parameter: &str,
) {
    let err = run_expecting_error(
        Command::SteadyState(SteadyStateArgs {
            scheme,
            point: PointArgs {
                x: x.into(),
                s: s.into(),
                exact: false,
            },
            method: SolverMethod::Gth,
        }),
        "invalid point must fail",
    );
    match err {
        CliError::Core(KineticsError::InvalidParameter { parameter: name, .. }) => {
            assert_eq!(name, parameter);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn render_limit_lists_each_quantity() -> TestResult {
    let summary = ExecutionSummary::Limit {
        x: Value::Numeric(2.0),
        reference: nesthill_core::ReferenceHill::new(7)?,
        hill: Value::Exact(ratio(128, 129)),
        limit: Value::Exact(ratio(128, 129)),
        derivative_limit: Value::Numeric(0.25),
    };
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "x: 2.000000000000");
    assert_eq!(lines[1], "reference: x^7 / (1 + x^7)");
    assert!(lines[3].starts_with("limit: 128/129 (~0.99224806"));
    assert_eq!(lines[4], "derivative limit: 0.250000000000");
    Ok(())
}

#[rstest]
fn render_graph_starts_with_its_shape(mut scheme: SchemeArgs) -> TestResult {
    scheme.sites = 2;
    let summary = run_cli(Cli {
        command: Command::Graph(scheme),
    })?;
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    assert!(text.starts_with("2 sites, 4 vertices, "), "{text}");
    Ok(())
}

#[rstest]
fn run_cli_records_command_spans(scheme: SchemeArgs) -> TestResult {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    tracing::subscriber::with_default(subscriber, || {
        run_cli(Cli {
            command: Command::Graph(scheme),
        })
    })?;

    let run = layer.span("cli.run").ok_or("cli.run span must exist")?;
    assert_eq!(run.fields.get("command").map(String::as_str), Some("graph"));
    let built = layer.span("cli.scheme").ok_or("cli.scheme span must exist")?;
    assert_eq!(built.fields.get("sites").map(String::as_str), Some("3"));
    assert_eq!(built.fields.get("stabilized").map(String::as_str), Some("true"));
    assert!(layer.span("core.scheme").is_some());
    assert!(layer.has_event(Level::INFO, "graph command completed"));
    Ok(())
}

#[rstest]
fn failing_command_logs_error(mut scheme: SchemeArgs) {
    scheme.sites = 0;
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, || {
        run_cli(Cli {
            command: Command::Graph(scheme),
        })
    });
    assert!(result.is_err());
    let errors = layer
        .events()
        .into_iter()
        .filter(|event| event.level == Level::ERROR)
        .count();
    assert!(errors >= 1);
}

#[rstest]
#[case("s^2147483647")]
#[case("2*s^2147483646")]
fn overflowing_stabilizer_exponent_is_rejected(mut scheme: SchemeArgs, #[case] raw: &str) {
    scheme.q = raw.parse().expect("exponent fits i32");
    let err = run_expecting_error(Command::Graph(scheme), "stabilizer exponent must overflow");
    match err {
        CliError::Core(KineticsError::InvalidParameter { parameter, .. }) => {
            assert_eq!(parameter, "rate");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
