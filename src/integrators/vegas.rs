//! The VEGAS integrator.
//!
//! VEGAS samples from a separable probability density given by a [`VegasPdf`] and reshapes the
//! bins of that density between iterations, so that regions in which the integrand's squared
//! contributions concentrate are sampled with more, narrower bins.
use crate::callbacks::Callback;
use crate::core::estimators::{Estimators, KahanEstimators};
use crate::core::{Checkpoint, Integrand, IntegrationError};
use crate::histograms::HistogramEstimators;
use crate::pdf::VegasPdf;

use num_traits::{Float, FromPrimitive};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Point in the unit hypercube drawn from a [`VegasPdf`].
///
/// The point owns all of its data; it is handed to the integrand by reference and dropped when
/// the call is finished.
#[derive(Clone, Debug)]
pub struct VegasPoint<T> {
    random_numbers: Vec<T>,
    coordinates: Vec<T>,
    bin: Vec<usize>,
    weight: T,
}

impl<T> VegasPoint<T>
where
    T: Float + FromPrimitive,
{
    /// Maps the uniform `random_numbers` into the hypercube using the bins of `pdf`.
    pub fn new(pdf: &VegasPdf<T>, random_numbers: Vec<T>) -> Self {
        let mut coordinates = vec![T::zero(); random_numbers.len()];
        let mut bin = vec![0; random_numbers.len()];
        let weight = pdf.map(&random_numbers, &mut coordinates, &mut bin);

        Self {
            random_numbers,
            coordinates,
            bin,
            weight,
        }
    }

    /// The raw uniform draws this point was generated from. Integrands may use them for
    /// auxiliary sampling of their own.
    pub fn random_numbers(&self) -> &[T] {
        &self.random_numbers
    }

    /// The coordinates of the point on the hypercube.
    pub fn coordinates(&self) -> &[T] {
        &self.coordinates
    }

    /// The bin the point fell into, for each dimension.
    pub fn bin(&self) -> &[usize] {
        &self.bin
    }

    /// The weight of the point, the Jacobian of the bin-to-coordinate map.
    pub fn weight(&self) -> T {
        self.weight
    }
}

/// A checkpoint saves the state of the VEGAS integrator after an iteration: the random number
/// generator before and after the iteration, the estimators, the grid the iteration sampled
/// from, the per-bin adjustment data the next refinement needs, and the histograms.
/// Checkpoints can be used to restart or resume integrations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VegasCheckpoint<T, R> {
    rng_before: R,
    rng_after: R,
    estimators: KahanEstimators<T>,
    pdf: VegasPdf<T>,
    adjustment_data: Vec<T>,
    histograms: Vec<HistogramEstimators<T>>,
}

impl<T, R> VegasCheckpoint<T, R> {
    /// Returns the random number generator before this checkpoint's iteration.
    pub fn rng_before(&self) -> &R {
        &self.rng_before
    }

    /// Returns the random number generator after this checkpoint's iteration.
    pub fn rng_after(&self) -> &R {
        &self.rng_after
    }

    /// Returns the estimators of this checkpoint's iteration.
    pub fn estimators(&self) -> &KahanEstimators<T> {
        &self.estimators
    }

    /// Returns the grid this checkpoint's iteration sampled from.
    pub fn pdf(&self) -> &VegasPdf<T> {
        &self.pdf
    }

    /// Returns the per-bin accumulated squared contributions of this checkpoint's iteration.
    pub fn adjustment_data(&self) -> &[T] {
        &self.adjustment_data
    }

    /// Access the histograms.
    pub fn histograms(&self) -> &Vec<HistogramEstimators<T>> {
        &self.histograms
    }
}

impl<T, R> Checkpoint for VegasCheckpoint<T, R>
where
    T: Float + FromPrimitive,
{
    type NumType = T;
    type Est = KahanEstimators<T>;

    fn estimators(&self) -> &Self::Est {
        &self.estimators
    }
}

/// Performs a single iteration with `calls` integrand evaluations, advancing `rng` by exactly
/// `calls * pdf.dimensions()` uniform values.
fn integrate_iteration<T, R, I>(
    integrand: &I,
    pdf: &VegasPdf<T>,
    rng: &mut R,
    calls: usize,
) -> VegasCheckpoint<T, R>
where
    I: Integrand<T, VegasPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    let rng_before = rng.clone();

    let dimensions = pdf.dimensions();
    let bins = pdf.bins();

    let mut estimators = KahanEstimators::default();
    let mut adjustment_data = vec![T::zero(); dimensions * bins];
    let mut histograms: Vec<_> = integrand
        .histograms_1d()
        .iter()
        .map(|h| h.get_accumulator())
        .collect();

    for _ in 0..calls {
        // sample a new point on the hypercube
        let random_numbers: Vec<T> = (0..dimensions).map(|_| rng.gen()).collect();
        let point = VegasPoint::new(pdf, random_numbers);

        // evaluate the integrand and undo the bias of the non-uniform sampling density
        let result = integrand.call(&point);
        let value = result.val() * point.weight();

        if estimators.record(value) {
            // save the square for each bin in order to adjust the grid later
            let square = value * value;
            for (dimension, &bin) in point.bin().iter().enumerate() {
                let index = dimension * bins + bin;
                adjustment_data[index] = adjustment_data[index] + square;
            }

            debug_assert_eq!(result.observables_1d().len(), histograms.len());

            for (histogram, &(observable, val)) in
                histograms.iter_mut().zip(result.observables_1d())
            {
                histogram.fill(observable, val * point.weight());
            }
        }
    }

    let calls = estimators.calls();

    VegasCheckpoint {
        rng_before,
        rng_after: rng.clone(),
        estimators,
        pdf: pdf.clone(),
        adjustment_data,
        histograms: histograms
            .into_iter()
            .map(|h| h.to_histogram_estimators(calls))
            .collect(),
    }
}

/// The iteration loop shared by [`integrate`] and [`resume_integration_from_checkpoints`].
fn integrate_with_history<T, R, I>(
    integrand: &I,
    mut pdf: VegasPdf<T>,
    mut rng: R,
    callback: &impl Callback<VegasCheckpoint<T, R>>,
    alpha: T,
    iterations: &[usize],
    mut checkpoints: Vec<VegasCheckpoint<T, R>>,
) -> Vec<VegasCheckpoint<T, R>>
where
    I: Integrand<T, VegasPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    checkpoints.reserve(iterations.len());

    for &calls in iterations {
        let checkpoint = integrate_iteration(integrand, &pdf, &mut rng, calls);
        checkpoints.push(checkpoint);

        if !callback.print(&checkpoints) {
            break;
        }

        let last = &checkpoints[checkpoints.len() - 1];
        pdf = last.pdf().refine(alpha, last.adjustment_data());
    }

    checkpoints
}

/// Integrates the `integrand` over the unit hypercube using the VEGAS algorithm, starting from
/// the grid `pdf`, either a fresh one created with [`VegasPdf::new`] or an already adapted one.
///
/// The random number generator in its initial state is provided in `rng` together with a
/// `callback` function that is called with the checkpoints of all finished iterations and may
/// stop the integration by returning `false`. The number of calls of the integrand per iteration
/// is stored in the slice `iterations`; after every iteration except a stopped one the grid is
/// refined with the damping exponent `alpha`, which is usually set between `1` and `2`.
///
/// # Errors
///
/// An empty iteration schedule and a dimension mismatch between the integrand and the grid are
/// configuration errors, reported before any work is done.
pub fn integrate<T, R, I>(
    integrand: &I,
    pdf: &VegasPdf<T>,
    rng: &R,
    callback: &impl Callback<VegasCheckpoint<T, R>>,
    alpha: T,
    iterations: &[usize],
) -> Result<Vec<VegasCheckpoint<T, R>>, IntegrationError>
where
    I: Integrand<T, VegasPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    if iterations.is_empty() {
        return Err(IntegrationError::EmptyIterationSchedule);
    }

    if integrand.dim() != pdf.dimensions() {
        return Err(IntegrationError::DimensionMismatch {
            integrand: integrand.dim(),
            pdf: pdf.dimensions(),
        });
    }

    Ok(integrate_with_history(
        integrand,
        pdf.clone(),
        rng.clone(),
        callback,
        alpha,
        iterations,
        Vec::new(),
    ))
}

/// Resumes an integration from a previously obtained checkpoint history: the grid of the last
/// checkpoint is refined with its adjustment data and the random number generator continues in
/// its state after the last iteration, so the resumed run reproduces the remainder of an
/// uninterrupted one. The returned history contains the given checkpoints followed by the new
/// ones; `iterations` may be empty, in which case the history is returned unchanged.
///
/// # Errors
///
/// An empty checkpoint history and a dimension mismatch between the integrand and the grid are
/// configuration errors, reported before any work is done.
pub fn resume_integration_from_checkpoints<T, R, I>(
    integrand: &I,
    checkpoints: Vec<VegasCheckpoint<T, R>>,
    callback: &impl Callback<VegasCheckpoint<T, R>>,
    alpha: T,
    iterations: &[usize],
) -> Result<Vec<VegasCheckpoint<T, R>>, IntegrationError>
where
    I: Integrand<T, VegasPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    let last = checkpoints
        .last()
        .ok_or(IntegrationError::EmptyCheckpointHistory)?;

    if integrand.dim() != last.pdf().dimensions() {
        return Err(IntegrationError::DimensionMismatch {
            integrand: integrand.dim(),
            pdf: last.pdf().dimensions(),
        });
    }

    let pdf = last.pdf().refine(alpha, last.adjustment_data());
    let rng = last.rng_after().clone();

    Ok(integrate_with_history(
        integrand,
        pdf,
        rng,
        callback,
        alpha,
        iterations,
        checkpoints,
    ))
}
