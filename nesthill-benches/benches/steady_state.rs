//! Steady-state solver benchmarks.
//!
//! Compares the replaced-row and GTH floating-point solvers across site
//! counts, and times the exact rational solve on small schemes.
#![expect(
    missing_docs,
    reason = "Criterion macros generate items without doc comments"
)]
#![expect(
    clippy::shadow_reuse,
    reason = "Criterion bench_with_input closures rebind parameter names"
)]
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use nesthill_benches::{error::BenchSetupError, params::SteadyStateBenchParams, schemes};
use nesthill_core::{NumericSolver, Parameters, SolveMethod, steady_state_exact};
use num_bigint::BigInt;
use num_rational::BigRational;

/// Site counts for the floating-point solvers.
const NUMERIC_SITES: &[usize] = &[2, 4, 6, 8];

/// Site counts for the exact solver.
const EXACT_SITES: &[usize] = &[2, 3, 4];

/// Ligand concentration at which every system is solved.
const X: f64 = 2.0;

/// Time-scale factor at which every system is solved.
const S: f64 = 1000.0;

fn numeric_steady_state_impl(c: &mut Criterion) -> Result<(), BenchSetupError> {
    let mut group = c.benchmark_group("numeric_steady_state");
    let params = Parameters::new(X, S)?;

    for &sites in NUMERIC_SITES {
        let prepared = schemes::stabilized(sites)?;
        let matrix = prepared.generator.evaluate(&params);
        for method in [SolveMethod::ReplacedRow, SolveMethod::Gth] {
            let solver = NumericSolver::new().with_method(method);
            let bench_params = SteadyStateBenchParams { sites, method };
            group.bench_with_input(
                BenchmarkId::from_parameter(&bench_params),
                &matrix,
                |b, matrix| {
                    b.iter(|| solver.solve(matrix));
                },
            );
        }
    }

    group.finish();
    Ok(())
}

fn exact_steady_state_impl(c: &mut Criterion) -> Result<(), BenchSetupError> {
    let mut group = c.benchmark_group("exact_steady_state");
    group.sample_size(20);
    let params = Parameters::new(
        BigRational::from_integer(BigInt::from(2)),
        BigRational::from_integer(BigInt::from(1000)),
    )?;

    for &sites in EXACT_SITES {
        let prepared = schemes::stabilized(sites)?;
        let matrix = prepared.generator.evaluate_exact(&params);
        group.bench_with_input(BenchmarkId::from_parameter(sites), &matrix, |b, matrix| {
            b.iter(|| steady_state_exact(matrix));
        });
    }

    group.finish();
    Ok(())
}

fn numeric_steady_state(c: &mut Criterion) {
    if let Err(err) = numeric_steady_state_impl(c) {
        panic!("numeric_steady_state benchmark setup failed: {err}");
    }
}

fn exact_steady_state(c: &mut Criterion) {
    if let Err(err) = exact_steady_state_impl(c) {
        panic!("exact_steady_state benchmark setup failed: {err}");
    }
}

criterion_group!(benches, numeric_steady_state, exact_steady_state);
criterion_main!(benches);
