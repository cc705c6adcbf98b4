use vegasir::callbacks::{FileWriterCallback, SimpleCallback, SinkCallback};
use vegasir::core::estimators::{cumulative, BasicEstimators, Estimators};
use vegasir::core::*;
use vegasir::integrators::vegas::{self, VegasCheckpoint, VegasPoint};
use vegasir::pdf::VegasPdf;

use assert_approx_eq::assert_approx_eq;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::Serialize;
use std::fs::read_to_string;
use tempfile::NamedTempFile;

fn assert_eq_rng<R>(lhs: &R, rhs: &R)
where
    R: Rng + Serialize,
{
    assert_eq!(
        serde_json::to_string(lhs).unwrap(),
        serde_json::to_string(rhs).unwrap()
    );
}

fn rng() -> Pcg64 {
    Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
}

struct MyIntegrand {}

impl Integrand<f64, VegasPoint<f64>> for MyIntegrand {
    // the integral of 4*x1*x2 over the unit square:
    // int_0^1 dx1 int_0^1 dx2 4*x1*x2 = 4 * (1/2) * (1/2) = 1
    fn call(&self, point: &VegasPoint<f64>) -> CallResult<f64> {
        let x = point.coordinates();
        let val = 4.0 * x[0] * x[1];

        CallResult::new(val, vec![(x[0], val)])
    }

    fn dim(&self) -> usize {
        2
    }

    fn histograms_1d(&self) -> Vec<vegasir::histograms::HistogramSpecification<f64>> {
        vec![vegasir::histograms::HistogramSpecification::new(
            0.0, 1.0, 10,
        )]
    }
}

fn compare_checkpoints(
    chkpt: &VegasCheckpoint<f64, Pcg64>,
    target: &VegasCheckpoint<f64, Pcg64>,
) {
    // TOLERANCE to use in floating point comparisons.
    const TOLERANCE: f64 = 1e-15;

    assert_eq!(chkpt.estimators().calls(), target.estimators().calls());

    // check the mean
    assert_approx_eq!(
        chkpt.estimators().mean(),
        target.estimators().mean(),
        TOLERANCE
    );

    // check the variance
    assert_approx_eq!(
        chkpt.estimators().var(),
        target.estimators().var(),
        TOLERANCE
    );

    // the grids used must be identical
    assert_eq!(chkpt.pdf(), target.pdf());

    // there is one histogram
    assert_eq!(chkpt.histograms().len(), 1);
    assert_eq!(target.histograms().len(), 1);

    assert_approx_eq!(
        chkpt.histograms()[0].mean(),
        target.histograms()[0].mean(),
        TOLERANCE
    );

    let bins = chkpt.histograms()[0].bins();
    let bins_target = target.histograms()[0].bins();

    assert_eq!(bins.len(), 10);

    for (bin, target) in bins.iter().zip(bins_target.iter()) {
        assert_approx_eq!(bin.mean(), target.mean(), TOLERANCE);
        assert_approx_eq!(bin.var(), target.var(), TOLERANCE);
    }
}

#[test]
fn vegas_iteration_is_reproducible() {
    // The number of calls in the iteration
    const CALLS: usize = 1_000;

    let mut rng_check = rng();
    let pdf = VegasPdf::new(2, 64).unwrap();

    let chkpts = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SimpleCallback {},
        1.5,
        &[CALLS],
    )
    .unwrap();

    assert_eq!(chkpts.len(), 1);
    let chkpt = &chkpts[0];

    // compare random number generators before the iteration
    assert_eq_rng(chkpt.rng_before(), &rng());

    // the iteration consumed exactly `dim` random numbers per call
    for _ in 0..CALLS * 2 {
        let _: f64 = rng_check.gen();
    }
    assert_eq_rng(chkpt.rng_after(), &rng_check);

    // we requested 1000 calls
    assert_eq!(chkpt.estimators().calls(), CALLS);

    // a second run with the same seed reproduces the result bit for bit
    let chkpts_again = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SinkCallback {},
        1.5,
        &[CALLS],
    )
    .unwrap();

    assert_eq!(
        chkpt.estimators().mean(),
        chkpts_again[0].estimators().mean()
    );
    assert_eq!(
        chkpt.estimators().var(),
        chkpts_again[0].estimators().var()
    );
}

#[test]
fn vegas_converges_to_known_integral() {
    let pdf = VegasPdf::new(2, 128).unwrap();

    let chkpts = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SinkCallback {},
        1.5,
        &[20_000; 5],
    )
    .unwrap();

    let combined = cumulative(chkpts.iter().map(|c| c.estimators()));

    assert_eq!(combined.calls(), 100_000);
    assert!(combined.std() > 0.0);
    assert!(combined.std() < 2e-2);

    // the integral of 4*x1*x2 over the unit square is one
    assert_approx_eq!(combined.mean(), 1.0, 5.0 * combined.std());

    // the chi-square per degree of freedom must not expose inconsistent iterations
    assert!(combined.chi_sq_dof().unwrap() < 5.0);

    // the histogram sums up to the integral of its own iteration
    for chkpt in &chkpts {
        assert_approx_eq!(
            chkpt.histograms()[0].mean(),
            chkpt.estimators().mean(),
            1e-10
        );
    }
}

#[test]
fn vegas_refinement_narrows_error() {
    let pdf = VegasPdf::new(2, 128).unwrap();

    let chkpts = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SinkCallback {},
        1.5,
        &[20_000; 5],
    )
    .unwrap();

    // adaptation must not increase the uncertainty over the flat start
    let first = chkpts.first().unwrap().estimators().std();
    let last = chkpts.last().unwrap().estimators().std();

    assert!(last < first);
}

#[test]
fn vegas_grids_stay_well_formed() {
    let pdf = VegasPdf::new(2, 32).unwrap();

    let chkpts = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SinkCallback {},
        1.5,
        &[5_000; 4],
    )
    .unwrap();

    for chkpt in &chkpts {
        let pdf = chkpt.pdf();

        for dimension in 0..pdf.dimensions() {
            let mut previous = 0.0;
            let mut sum = 0.0;

            for bin in 0..pdf.bins() {
                let boundary = pdf.boundary(dimension, bin);
                assert!(boundary > previous);
                sum += pdf.width(dimension, bin);
                previous = boundary;
            }

            assert_eq!(previous, 1.0);
            assert_approx_eq!(sum, 1.0, 1e-14);
        }
    }

    // the first iteration used the uniform grid, later ones an adapted one
    assert_eq!(chkpts[0].pdf(), &pdf);
    assert!(chkpts[1].pdf() != &pdf);
}

#[test]
fn vegas_resumes_from_checkpoints() {
    // The number of calls in the iteration
    const CALLS: usize = 1_000;

    let iterations = [CALLS; 5];
    let pdf = VegasPdf::new(2, 32).unwrap();

    // Perform the integration over all the iterations and store the checkpoints
    let check_points = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SimpleCallback {},
        1.5,
        &iterations,
    )
    .unwrap();

    // Consistency check
    assert_eq!(check_points.len(), iterations.len());

    // Clone the final result and store it as a target
    let final_target = check_points.last().unwrap().clone();

    // Restart the integration from each checkpoint and make sure the final result agrees with
    // the one computed above.
    check_points
        .into_iter()
        .enumerate()
        .for_each(|(index, cp)| {
            // Resume the iteration from the given checkpoint
            let resumed = vegas::resume_integration_from_checkpoints(
                &MyIntegrand {},
                vec![cp],
                &SimpleCallback {},
                1.5,
                &vec![CALLS; iterations.len() - index - 1],
            )
            .unwrap()
            .into_iter()
            .last()
            .unwrap();

            compare_checkpoints(&resumed, &final_target);
        });
}

#[test]
fn vegas_writes_checkpoints_to_file() {
    // create a temporary file to write to
    let file = NamedTempFile::new().unwrap();
    let path = file.path();

    // define the calls per iteration
    let iterations = [1000, 100];

    // define a callback function
    let callback = FileWriterCallback::new(&path);

    let pdf = VegasPdf::new(2, 16).unwrap();

    // perform a full integration over the two iterations
    let original = vegas::integrate(&MyIntegrand {}, &pdf, &rng(), &callback, 1.5, &iterations)
        .unwrap();

    let chkpt_file = read_to_string(&path).expect("Unable to read checkpoint file");
    let chkpts: Vec<VegasCheckpoint<f64, Pcg64>> =
        serde_json::from_str(&chkpt_file).expect("Unable to deserialize checkpoint from json.");

    // make sure all the checkpoints have been written and read
    assert_eq!(original.len(), chkpts.len());

    for (chkpt, original) in chkpts.iter().zip(original.iter()) {
        assert_eq!(chkpt.estimators().calls(), original.estimators().calls());
        assert_eq!(chkpt.estimators().mean(), original.estimators().mean());
        assert_eq!(chkpt.estimators().var(), original.estimators().var());
        assert_eq!(chkpt.pdf(), original.pdf());
        assert_eq_rng(chkpt.rng_after(), original.rng_after());
    }
}

#[test]
fn vegas_cumulative_over_single_iteration_is_identity() {
    let pdf = VegasPdf::new(2, 16).unwrap();

    let chkpts = vegas::integrate(
        &MyIntegrand {},
        &pdf,
        &rng(),
        &SinkCallback {},
        1.5,
        &[1000],
    )
    .unwrap();

    let combined = cumulative(chkpts.iter().map(|c| c.estimators()));

    assert_eq!(combined.calls(), chkpts[0].estimators().calls());
    assert_eq!(combined.mean(), chkpts[0].estimators().mean());
    assert_eq!(combined.var(), chkpts[0].estimators().var());
    assert_eq!(combined.chi_sq_dof(), None);
}
