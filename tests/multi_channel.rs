use vegasir::callbacks::{SimpleCumulativeCallback, SinkCallback};
use vegasir::core::estimators::{cumulative, BasicEstimators, Estimators};
use vegasir::core::*;
use vegasir::integrators::multi_channel::{self, MultiChannelPoint};
use vegasir::pdf::VegasPdf;

use assert_approx_eq::assert_approx_eq;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::Serialize;

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

struct Cubic {}

impl Integrand<f64, MultiChannelPoint<f64>> for Cubic {
    // int_0^1 dx 3*x^2 = 1, strongly peaked towards x = 1
    fn call(&self, point: &MultiChannelPoint<f64>) -> CallResult<f64> {
        let x = point.coordinates()[0];

        CallResult::new(3.0 * x * x, vec![])
    }

    fn dim(&self) -> usize {
        1
    }
}

fn channels() -> Vec<VegasPdf<f64>> {
    vec![
        // a flat channel and one pre-shaped towards the peak at x = 1
        VegasPdf::new(1, 8).unwrap(),
        VegasPdf::read("0.4 0.65 0.8 0.9 0.95 0.98 0.99 1\n".as_bytes()).unwrap(),
    ]
}

#[test]
fn multi_channel_iteration_is_reproducible() {
    const CALLS: usize = 1_000;

    let mut rng_check = rng();

    let chkpts = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SimpleCumulativeCallback {},
        1.5,
        0.25,
        0.01,
        &[CALLS],
    )
    .unwrap();

    assert_eq!(chkpts.len(), 1);
    let chkpt = &chkpts[0];

    // compare random number generators before the iteration
    assert_eq_rng(chkpt.rng_before(), &rng());

    // the iteration consumed exactly `dim + 1` random numbers per call
    for _ in 0..CALLS * 2 {
        let _: f64 = rng_check.gen();
    }
    assert_eq_rng(chkpt.rng_after(), &rng_check);

    assert_eq!(chkpt.estimators().calls(), CALLS);
    assert_eq!(chkpt.estimators().non_finite_calls(), 0);

    // a second run with the same seed reproduces the result bit for bit
    let chkpts_again = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
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
fn multi_channel_converges_to_known_integral() {
    let chkpts = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
        &[10_000; 5],
    )
    .unwrap();

    let combined = cumulative(chkpts.iter().map(|c| c.estimators()));

    assert_eq!(combined.calls(), 50_000);
    assert!(combined.std() > 0.0);
    assert!(combined.std() < 2e-2);

    // the integral of 3*x^2 over the unit interval is one
    assert_approx_eq!(combined.mean(), 1.0, 5.0 * combined.std());
    assert!(combined.chi_sq_dof().unwrap() < 5.0);
}

#[test]
fn multi_channel_weights_stay_normalized() {
    let chkpts = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
        &[2_000; 6],
    )
    .unwrap();

    for chkpt in &chkpts {
        let weights = chkpt.channel_weights();
        let sum: f64 = weights.iter().sum();

        assert_approx_eq!(sum, 1.0, 1e-12);

        for &weight in weights {
            assert!(weight >= 0.01);
        }
    }

    // the weights adapted away from their starting values
    assert!(chkpts.last().unwrap().channel_weights() != [0.5, 0.5]);
}

#[test]
fn multi_channel_grids_stay_well_formed() {
    let chkpts = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
        &[2_000; 4],
    )
    .unwrap();

    for chkpt in &chkpts {
        for pdf in chkpt.channels() {
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
    }
}

#[test]
fn multi_channel_resumes_from_checkpoints() {
    const CALLS: usize = 1_000;

    let iterations = [CALLS; 4];

    let check_points = multi_channel::integrate(
        &Cubic {},
        &channels(),
        &[0.5, 0.5],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
        &iterations,
    )
    .unwrap();

    assert_eq!(check_points.len(), iterations.len());

    let final_target = check_points.last().unwrap().clone();

    check_points
        .into_iter()
        .enumerate()
        .for_each(|(index, cp)| {
            let resumed = multi_channel::resume_integration_from_checkpoints(
                &Cubic {},
                vec![cp],
                &SinkCallback {},
                1.5,
                0.25,
                0.01,
                &vec![CALLS; iterations.len() - index - 1],
            )
            .unwrap()
            .into_iter()
            .last()
            .unwrap();

            assert_eq!(
                resumed.estimators().calls(),
                final_target.estimators().calls()
            );
            assert_eq!(
                resumed.estimators().mean(),
                final_target.estimators().mean()
            );
            assert_eq!(resumed.estimators().var(), final_target.estimators().var());
            assert_eq!(resumed.channel_weights(), final_target.channel_weights());
            assert_eq!(resumed.channels(), final_target.channels());
            assert_eq_rng(resumed.rng_after(), final_target.rng_after());
        });
}

#[test]
fn multi_channel_rejects_invalid_configurations() {
    // weights that do not sum to one
    assert_eq!(
        multi_channel::integrate(
            &Cubic {},
            &channels(),
            &[0.5, 0.6],
            &rng(),
            &SinkCallback {},
            1.5,
            0.25,
            0.01,
            &[1000],
        )
        .unwrap_err(),
        IntegrationError::InvalidChannelWeights
    );

    // negative weights
    assert_eq!(
        multi_channel::integrate(
            &Cubic {},
            &channels(),
            &[1.5, -0.5],
            &rng(),
            &SinkCallback {},
            1.5,
            0.25,
            0.01,
            &[1000],
        )
        .unwrap_err(),
        IntegrationError::InvalidChannelWeights
    );

    // one weight per channel
    assert_eq!(
        multi_channel::integrate(
            &Cubic {},
            &channels(),
            &[1.0],
            &rng(),
            &SinkCallback {},
            1.5,
            0.25,
            0.01,
            &[1000],
        )
        .unwrap_err(),
        IntegrationError::ChannelCountMismatch {
            weights: 1,
            channels: 2
        }
    );

    // empty schedule
    assert_eq!(
        multi_channel::integrate(
            &Cubic {},
            &channels(),
            &[0.5, 0.5],
            &rng(),
            &SinkCallback {},
            1.5,
            0.25,
            0.01,
            &[],
        )
        .unwrap_err(),
        IntegrationError::EmptyIterationSchedule
    );

    // dimension mismatch between the integrand and a channel grid
    struct TwoDim {}

    impl Integrand<f64, MultiChannelPoint<f64>> for TwoDim {
        fn call(&self, _: &MultiChannelPoint<f64>) -> CallResult<f64> {
            CallResult::new(1.0, vec![])
        }

        fn dim(&self) -> usize {
            2
        }
    }

    assert_eq!(
        multi_channel::integrate(
            &TwoDim {},
            &channels(),
            &[0.5, 0.5],
            &rng(),
            &SinkCallback {},
            1.5,
            0.25,
            0.01,
            &[1000],
        )
        .unwrap_err(),
        IntegrationError::DimensionMismatch {
            integrand: 2,
            pdf: 1
        }
    );
}

#[test]
fn multi_channel_single_channel_reduces_to_importance_sampling() {
    // with a single channel the combined weight is the reciprocal of that channel's density
    let channel = vec![VegasPdf::<f64>::new(1, 16).unwrap()];

    let chkpts = multi_channel::integrate(
        &Cubic {},
        &channel,
        &[1.0],
        &rng(),
        &SinkCallback {},
        1.5,
        0.25,
        0.01,
        &[10_000; 3],
    )
    .unwrap();

    let combined = cumulative(chkpts.iter().map(|c| c.estimators()));

    assert_approx_eq!(combined.mean(), 1.0, 5.0 * combined.std());
}
