//! Unit tests for the convergence analysis.

use num_bigint::BigInt;
use num_rational::BigRational;
use rstest::rstest;

use super::{
    BoundVerdict, ConvergenceAnalyzer, InconclusiveReason, ReferenceHill, SearchBudget,
};
use crate::{
    ExactProvider, KineticGraph, KineticsBuilder, KineticsError, NumericProvider, Rate,
    field::Field,
};

fn stabilized(sites: usize) -> KineticGraph {
    KineticsBuilder::new()
        .build()
        .expect("defaults are valid")
        .stabilized_scheme(sites, &Rate::time_scale(-1))
        .expect("within limits")
}

fn ratio(numerator: i64, denominator: i64) -> BigRational {
    BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
}

#[rstest]
#[case(1, 1)]
#[case(2, 3)]
#[case(3, 7)]
#[case(5, 31)]
fn hill_coefficient_doubles_per_site(#[case] sites: usize, #[case] exponent: u32) {
    assert_eq!(
        ReferenceHill::for_sites(sites).map(|hill| hill.exponent()),
        Ok(exponent)
    );
}

#[rstest]
#[case(0)]
#[case(32)]
fn hill_rejects_unrepresentable_site_counts(#[case] sites: usize) {
    assert!(matches!(
        ReferenceHill::for_sites(sites),
        Err(KineticsError::InvalidParameter { parameter: "sites", .. })
    ));
}

#[test]
fn hill_rejects_zero_coefficient() {
    assert!(matches!(
        ReferenceHill::new(0),
        Err(KineticsError::InvalidParameter { parameter: "exponent", .. })
    ));
}

#[test]
fn hill_saturates_at_both_ends() {
    let hill = ReferenceHill::new(7).expect("positive");
    assert_eq!(hill.evaluate(0.0), 0.0);
    assert_eq!(hill.evaluate(f64::INFINITY), 1.0);
    assert!((hill.evaluate(1.0) - 0.5).abs() < 1e-15);
    assert!(hill.evaluate(1e-60) < 1e-300);
    assert!((ReferenceHill::new(4095).expect("positive").evaluate(2.0) - 1.0).abs() < 1e-15);
}

#[rstest]
#[case(0.5)]
#[case(1.0)]
#[case(1.3)]
#[case(4.0)]
fn hill_derivative_matches_central_difference(#[case] x: f64) {
    let hill = ReferenceHill::new(7).expect("positive");
    let step = 1e-6;
    let difference = (hill.evaluate(x + step) - hill.evaluate(x - step)) / (2.0 * step);
    assert!((hill.derivative(x) - difference).abs() < 1e-6);
}

#[test]
fn exact_hill_matches_closed_form() {
    let hill = ReferenceHill::new(7).expect("positive");
    assert_eq!(hill.evaluate_exact(&ratio(2, 1)), Ok(ratio(128, 129)));
    assert_eq!(hill.derivative_exact(&ratio(2, 1)), Ok(ratio(448, 129 * 129)));
    assert_eq!(hill.evaluate_exact(&ratio(0, 1)), Ok(ratio(0, 1)));
    assert_eq!(hill.to_string(), "x^7 / (1 + x^7)");
}

#[rstest]
#[case(7, ratio(-1, 1))]
#[case(2, ratio(-3, 2))]
fn exact_hill_rejects_negative_concentration(#[case] exponent: u32, #[case] x: BigRational) {
    let hill = ReferenceHill::new(exponent).expect("positive");
    for result in [hill.evaluate_exact(&x), hill.derivative_exact(&x)] {
        match result {
            Err(KineticsError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "x"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[rstest]
#[case(InconclusiveReason::BudgetExhausted, "box budget exhausted")]
#[case(InconclusiveReason::DeadlineExpired, "deadline expired")]
#[case(InconclusiveReason::Cancelled, "cancelled")]
fn inconclusive_reasons_display(#[case] reason: InconclusiveReason, #[case] expected: &str) {
    assert_eq!(reason.to_string(), expected);
}

#[test]
fn batch_evaluation_matches_pointwise() {
    let graph = stabilized(3);
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme shape");
    let points = [(0.5, 10.0), (1.0, 100.0), (2.0, 1000.0), (5.0, 1e4)];
    let batch = analyzer.fully_bound_batch(&points).expect("solves");
    for ((x, s), value) in points.iter().zip(&batch) {
        let single = analyzer.fully_bound(*x, *s).expect("solves");
        assert_eq!(single, *value);
    }
    assert!(matches!(
        analyzer.fully_bound_batch(&[(1.0, 10.0), (-1.0, 10.0)]),
        Err(KineticsError::InvalidParameter { parameter: "x", .. })
    ));
}

#[test]
fn exact_report_combines_limits_and_bound() {
    let graph = stabilized(3);
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer =
        ConvergenceAnalyzer::new(&graph, &ExactProvider, reference).expect("scheme shape");
    let report = analyzer
        .report(&ratio(2, 1), 1000.0, 0.5, &SearchBudget::default())
        .expect("report completes");
    assert_eq!(Ok(report.limit_value.clone()), reference.evaluate_exact(&ratio(2, 1)));
    assert_eq!(Ok(report.derivative_limit.clone()), reference.derivative_exact(&ratio(2, 1)));
    assert_eq!(report.bound_holds(), Some(true));
    assert_eq!(report.counterexample_x(), None);
    let constant = report.bound_constant().expect("bound holds");
    assert!(constant <= 0.5);
    let x = ratio(11, 10);
    let pointwise = analyzer
        .fully_bound(x.clone(), ratio(1000, 1))
        .expect("unique steady state")
        .minus(&reference.evaluate_exact(&x).expect("x is positive"))
        .approximate()
        .abs();
    assert!(constant >= pointwise * 1000f64.sqrt());
    assert!(report.to_string().starts_with("limit: 128/129\n"));
}

#[test]
fn tiny_budget_is_inconclusive() {
    let graph = stabilized(3);
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(3).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme shape");
    let verdict = analyzer
        .check_uniform_bound(1000.0, 0.5, &SearchBudget::new(2))
        .expect("valid inputs");
    match verdict {
        BoundVerdict::Inconclusive {
            reason,
            boxes_examined,
            best_gap,
        } => {
            assert_eq!(reason, InconclusiveReason::BudgetExhausted);
            assert_eq!(boxes_examined, 2);
            assert!(best_gap < 0.5 / 1000f64.sqrt());
        }
        other => panic!("unexpected verdict: {other:?}"),
    }
}

#[rstest]
#[case(0.0, 0.5, "s")]
#[case(f64::NAN, 0.5, "s")]
#[case(1000.0, 0.0, "claimed")]
#[case(1000.0, f64::INFINITY, "claimed")]
fn bound_check_rejects_invalid_inputs(
    #[case] s: f64,
    #[case] claimed: f64,
    #[case] parameter: &str,
) {
    let graph = stabilized(2);
    let provider = NumericProvider::new();
    let reference = ReferenceHill::for_sites(2).expect("small");
    let analyzer = ConvergenceAnalyzer::new(&graph, &provider, reference).expect("scheme shape");
    match analyzer.check_uniform_bound(s, claimed, &SearchBudget::default()) {
        Err(KineticsError::InvalidParameter { parameter: actual, .. }) => {
            assert_eq!(actual, parameter);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
