//! End-to-end checks of the stabilized three-site scheme against Hill(7).

use std::sync::OnceLock;
use std::time::Instant;

use nesthill_core::{
    BoundVerdict, CancelToken, ConvergenceAnalyzer, InconclusiveReason, KineticGraph,
    KineticsBuilder, NumericProvider, NumericSolver, Rate, ReferenceHill, SearchBudget,
    SolveMethod,
};
use proptest::prelude::*;
use rstest::{fixture, rstest};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn stabilized_three_site() -> KineticGraph {
    let q: Rate = "1/s".parse().expect("rate parses");
    KineticsBuilder::new()
        .build()
        .expect("defaults are valid")
        .stabilized_scheme(3, &q)
        .expect("within limits")
}

#[fixture]
fn three_site() -> KineticGraph {
    init_tracing();
    stabilized_three_site()
}

/// Certified constant of the Hill(7) bound at `s = 1000`, searched once.
fn certified_hill_seven_constant() -> f64 {
    static CONSTANT: OnceLock<f64> = OnceLock::new();
    *CONSTANT.get_or_init(|| {
        let graph = stabilized_three_site();
        let provider = NumericProvider::new();
        let reference = ReferenceHill::for_sites(3).expect("small");
        let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme");
        analyzer
            .check_uniform_bound(1000.0, 0.5, &SearchBudget::new(5_000))
            .expect("valid inputs")
            .constant()
            .expect("Hill(7) bound holds at s = 1000")
    })
}

#[rstest]
#[case(1.0)]
#[case(2.0)]
#[case(5.0)]
fn scaled_pointwise_gap_stays_bounded_and_shrinks(three_site: KineticGraph, #[case] x: f64) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::new(7).expect("positive");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let scales = [10.0, 100.0, 1000.0, 10_000.0];
    let points: Vec<(f64, f64)> = scales.iter().map(|&s| (x, s)).collect();
    let values = analyzer.fully_bound_batch(&points).expect("solves");
    let scaled: Vec<f64> = values
        .iter()
        .zip(scales)
        .map(|(p, s)| (p - reference.evaluate(x)).abs() * s.sqrt())
        .collect();
    assert!(scaled.iter().all(|&gap| gap <= 1.0), "{scaled:?}");
    assert!(scaled.windows(2).all(|pair| pair[1] < pair[0]), "{scaled:?}");
}

#[rstest]
fn hill_seven_bound_holds_at_half(three_site: KineticGraph) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let verdict = analyzer
        .check_uniform_bound(1000.0, 0.5, &SearchBudget::new(5_000))
        .expect("valid inputs");
    match verdict {
        BoundVerdict::Holds {
            constant,
            claimed,
            boxes,
        } => {
            assert!(constant <= claimed);
            assert_eq!(claimed, 0.5);
            assert!(boxes >= 3);
        }
        other => panic!("unexpected verdict: {other}"),
    }
}

#[rstest]
fn hill_six_bound_is_violated(three_site: KineticGraph) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::new(6).expect("positive");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let verdict = analyzer
        .check_uniform_bound(1000.0, 0.5, &SearchBudget::new(5_000))
        .expect("valid inputs");
    let x = verdict.counterexample_x().expect("bound is violated");
    let gap = (analyzer.fully_bound(x, 1000.0).expect("solves") - reference.evaluate(x)).abs();
    assert!(gap > 0.5 / 1000f64.sqrt());
    assert_eq!(verdict.bound_holds(), Some(false));
}

#[rstest]
fn cancelled_search_is_inconclusive(three_site: KineticGraph) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let token = CancelToken::new();
    token.cancel();
    let verdict = analyzer
        .check_uniform_bound(1000.0, 0.5, &SearchBudget::new(5_000).with_cancel_token(token))
        .expect("valid inputs");
    assert_eq!(
        verdict,
        BoundVerdict::Inconclusive {
            reason: InconclusiveReason::Cancelled,
            boxes_examined: 0,
            best_gap: 0.0,
        }
    );
    assert!(verdict.into_result().is_err());
}

#[rstest]
fn expired_deadline_is_inconclusive(three_site: KineticGraph) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let budget = SearchBudget::new(5_000).with_deadline(Instant::now());
    let verdict = analyzer
        .check_uniform_bound(1000.0, 0.5, &budget)
        .expect("valid inputs");
    assert!(matches!(
        verdict,
        BoundVerdict::Inconclusive {
            reason: InconclusiveReason::DeadlineExpired,
            ..
        }
    ));
}

#[rstest]
fn numeric_report_matches_hill_limits(three_site: KineticGraph) {
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&three_site, &provider, reference).expect("scheme");
    let report = analyzer
        .report(&2.0, 1000.0, 0.5, &SearchBudget::new(5_000))
        .expect("report completes");
    assert!((report.limit_value - 128.0 / 129.0).abs() < 1e-9);
    assert!((report.derivative_limit - 448.0 / 16_641.0).abs() < 1e-9);
    assert_eq!(report.bound_holds(), Some(true));
    assert!(report.bound_constant().is_some_and(|constant| constant <= 0.5));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn certified_constant_dominates_every_sampled_gap(log_x in -3.0_f64..3.0) {
        let constant = certified_hill_seven_constant();
        let graph = stabilized_three_site();
        let provider =
            NumericProvider::new().with_solver(NumericSolver::new().with_method(SolveMethod::Gth));
        let reference = ReferenceHill::for_sites(3).expect("small");
        let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme");
        let x = 10_f64.powf(log_x);
        let value = analyzer.fully_bound(x, 1000.0);
        prop_assert!(value.is_ok(), "x = {x}: {value:?}");
        let gap = (value.unwrap_or_default() - reference.evaluate(x)).abs() * 1000_f64.sqrt();
        prop_assert!(gap <= constant + 1e-9, "x = {x}: scaled gap {gap} exceeds {constant}");
    }
}
