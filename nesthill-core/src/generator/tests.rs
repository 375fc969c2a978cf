//! Unit tests for generator assembly and evaluation.

use num_bigint::BigInt;
use num_rational::BigRational;
use proptest::prelude::*;

use crate::{
    KineticsBuilder, KineticsError, Rate,
    expr::RateExpr,
    field::{Dual, Field},
    graph::{build_base, iterate, stabilize_extremes},
    params::Parameters,
};

use super::GeneratorMatrix;

fn ratio(numerator: i64, denominator: i64) -> BigRational {
    BigRational::new(BigInt::from(numerator), BigInt::from(denominator))
}

#[test]
fn single_site_generator_matches_closed_form() {
    let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
    let rendered: Vec<Vec<String>> = generator
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();
    assert_eq!(rendered, vec![vec!["-x", "1"], vec!["x", "-1"]]);

    let params = Parameters::new(ratio(3, 2), ratio(7, 1)).expect("valid parameters");
    let exact = generator.evaluate_exact(&params);
    assert_eq!(exact.get(0, 0), Some(&ratio(-3, 2)));
    assert_eq!(exact.get(1, 0), Some(&ratio(3, 2)));
    assert_eq!(exact.get(0, 1), Some(&ratio(1, 1)));
    assert_eq!(exact.get(2, 0), None);
}

#[test]
fn symbolic_columns_cancel() {
    let graph = stabilize_extremes(
        &iterate(build_base(), 2).expect("construction succeeds"),
        &Rate::time_scale(-1),
    )
    .expect("scheme has extreme edges");
    let generator = GeneratorMatrix::build(&graph).expect("scheme shape");
    assert!(
        generator
            .conservation_residuals()
            .iter()
            .all(|residual| residual.is_zero())
    );
}

#[test]
fn derivative_keeps_columns_balanced() {
    let generator = GeneratorMatrix::build(&iterate(build_base(), 1).expect("construction"))
        .expect("scheme shape");
    let derivative = generator.x_derivative();
    assert!(
        derivative
            .conservation_residuals()
            .iter()
            .all(|residual| residual.is_zero())
    );
    assert_eq!(
        derivative.get(1, 0).map(ToString::to_string).as_deref(),
        Some("s")
    );
}

#[test]
fn compiled_generator_matches_symbolic_evaluation() {
    let graph = stabilize_extremes(
        &iterate(build_base(), 2).expect("construction succeeds"),
        &Rate::time_scale(-1),
    )
    .expect("scheme has extreme edges");
    let generator = GeneratorMatrix::build(&graph).expect("scheme shape");
    let compiled = generator.compile().expect("positive rates");
    let (x, s) = (1.75, 12.0);
    let direct = generator.evaluate(&Parameters::new(x, s).expect("valid"));
    let fast = compiled.at_point(&x, &s).expect("s is invertible");
    for (left, right) in direct.rows().flatten().zip(fast.rows().flatten()) {
        assert!((left - right).abs() <= 1e-12 * left.abs().max(1.0));
    }

    // Homogeneous form at x = 3/2 is the ordinary form scaled by 2^degree.
    let homogeneous = compiled.homogeneous(3.0, 2.0, s);
    let ordinary = compiled.at_point(&1.5, &s).expect("s is invertible");
    for (left, right) in homogeneous.rows().flatten().zip(ordinary.rows().flatten()) {
        assert!((left - 2.0 * right).abs() <= 1e-12 * left.abs().max(1.0));
    }
}

#[test]
fn dual_evaluation_carries_x_derivative() {
    let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
    let compiled = generator.compile().expect("positive rates");
    let dual = compiled
        .at_point(&Dual::variable(2.0), &Dual::constant(5.0))
        .expect("s is invertible");
    let binding = dual.rate(0, 1);
    assert_eq!(*binding.value(), 2.0);
    assert_eq!(*binding.derivative(), 1.0);
    assert_eq!(dual.rate(1, 1), Dual::<f64>::zero());
}

#[test]
fn off_diagonal_entries_hold_the_edge_rate() {
    let graph = iterate(build_base(), 1).expect("construction succeeds");
    let generator = GeneratorMatrix::build(&graph).expect("scheme shape");
    for edge in graph.edges() {
        assert_eq!(
            generator.get(edge.target(), edge.source()),
            Some(&RateExpr::from_rate(edge.rate()))
        );
    }
}

#[test]
fn compiling_rejects_signed_off_diagonal_entries() {
    let mut signed = RateExpr::from_rate(&Rate::binding());
    signed.subtract_rate(&Rate::unit());
    let generator = GeneratorMatrix {
        dimension: 2,
        entries: vec![RateExpr::zero(), RateExpr::from_rate(&Rate::unit()), signed, RateExpr::zero()],
    };
    let err = generator.compile().expect_err("signed rate must be rejected");
    assert!(matches!(err, KineticsError::MalformedGraph { vertices: 2, .. }));
    assert!(err.to_string().contains("non-positive term"));
}

#[test]
fn display_aligns_entries() {
    let generator = GeneratorMatrix::build(&build_base()).expect("base is a scheme");
    assert_eq!(generator.to_string(), "[-x,  1]\n[ x, -1]\n");
}

proptest! {
    #[test]
    fn evaluated_columns_sum_to_exactly_zero(
        sites in 1usize..5,
        x in 1e-3f64..1e3,
        s in 1e-2f64..1e4,
        stabilized in any::<bool>(),
    ) {
        let kinetics = KineticsBuilder::new().build().expect("defaults are valid");
        let graph = if stabilized {
            kinetics.stabilized_scheme(sites, &Rate::time_scale(-1))
        } else {
            kinetics.scheme(sites)
        }
        .expect("within limits");
        let generator = GeneratorMatrix::build(&graph).expect("scheme shape");
        let numeric = generator.evaluate(&Parameters::new(x, s).expect("valid"));
        let matrix = numeric.to_dmatrix();
        prop_assert_eq!(matrix.nrows(), 1usize << sites);
        for column in 0..numeric.dimension() {
            let outflow: f64 = (0..numeric.dimension())
                .filter(|&row| row != column)
                .map(|row| matrix[(row, column)])
                .sum();
            prop_assert_eq!(matrix[(column, column)], -outflow);
        }
    }
}
