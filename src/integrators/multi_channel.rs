//! The multi-channel integrator.
//!
//! Multi-channel integration generalizes VEGAS to integrands with several distinct peaks: each
//! *channel* is a [`VegasPdf`] of its own, and every call first selects a channel according to
//! the channel weights and then samples a point from the selected channel's grid. The weight of
//! the point is derived from the combined density of all enabled channels, which reduces the
//! variance wherever at least one channel models the integrand well. Between iterations the
//! adaptation happens on two levels: each channel's grid refines its bins from the calls that
//! selected it, and the channel weights shift towards the channels that explain more of the
//! integrand's variance.
use crate::callbacks::Callback;
use crate::core::estimators::{Estimators, KahanEstimators};
use crate::core::{Checkpoint, Integrand, IntegrationError};
use crate::histograms::HistogramEstimators;
use crate::pdf::VegasPdf;

use log::debug;
use num_traits::{Float, FromPrimitive};
use rand::distributions::{Distribution, Standard};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Discrete distribution over the enabled channels.
///
/// Sampling consumes exactly one uniform value, which keeps the number of draws per call fixed
/// at `dim + 1` and thereby the generator offset computable for stream partitioning.
struct ChannelSelector<T> {
    cumulative: Vec<T>,
    channels: Vec<usize>,
}

impl<T: Float> ChannelSelector<T> {
    fn new(channel_weights: &[T]) -> Self {
        let mut cumulative = Vec::with_capacity(channel_weights.len());
        let mut channels = Vec::with_capacity(channel_weights.len());
        let mut sum = T::zero();

        for (channel, &weight) in channel_weights.iter().enumerate() {
            if weight > T::zero() {
                sum = sum + weight;
                cumulative.push(sum);
                channels.push(channel);
            }
        }

        Self {
            cumulative,
            channels,
        }
    }

    /// The indices of the channels with non-zero weight, in increasing order.
    fn enabled(&self) -> &[usize] {
        &self.channels
    }

    /// Selects a channel from the uniform value `random_number`.
    fn select(&self, random_number: T) -> usize {
        debug_assert!(!self.channels.is_empty());
        debug_assert!(random_number >= T::zero() && random_number < T::one());

        // rescale so that rounding in the weight sum cannot leave the table
        let target = random_number * self.cumulative[self.cumulative.len() - 1];
        let index = self
            .cumulative
            .partition_point(|&c| c <= target)
            .min(self.channels.len() - 1);

        self.channels[index]
    }
}

/// Point in the unit hypercube sampled through one channel of a multi-channel integration.
#[derive(Clone, Debug)]
pub struct MultiChannelPoint<T> {
    random_numbers: Vec<T>,
    coordinates: Vec<T>,
    bin: Vec<usize>,
    channel: usize,
    densities: Vec<T>,
    weight: T,
}

impl<T> MultiChannelPoint<T>
where
    T: Float + FromPrimitive,
{
    fn new(
        channels: &[VegasPdf<T>],
        channel_weights: &[T],
        selector: &ChannelSelector<T>,
        channel: usize,
        random_numbers: Vec<T>,
    ) -> Self {
        let dimensions = random_numbers.len();
        let mut coordinates = vec![T::zero(); dimensions];
        let mut bin = vec![0; dimensions];

        channels[channel].map(&random_numbers, &mut coordinates, &mut bin);

        // the weight combines the densities of all enabled channels at this point; the density
        // of the selected channel is always positive, so the sum never vanishes
        let mut densities = vec![T::zero(); channels.len()];
        let mut total_density = T::zero();

        for &enabled in selector.enabled() {
            let density = channels[enabled].density(&coordinates);
            densities[enabled] = density;
            total_density = total_density + channel_weights[enabled] * density;
        }

        Self {
            random_numbers,
            coordinates,
            bin,
            channel,
            densities,
            weight: total_density.recip(),
        }
    }

    /// The raw uniform draws this point was generated from, without the draw that selected the
    /// channel.
    pub fn random_numbers(&self) -> &[T] {
        &self.random_numbers
    }

    /// The coordinates of the point on the hypercube, mapped by the selected channel's grid.
    pub fn coordinates(&self) -> &[T] {
        &self.coordinates
    }

    /// The bin the point fell into in the selected channel's grid, for each dimension.
    pub fn bin(&self) -> &[usize] {
        &self.bin
    }

    /// The channel that was selected for this point.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The density each channel's grid assigns to this point; disabled channels have density
    /// zero.
    pub fn densities(&self) -> &[T] {
        &self.densities
    }

    /// The weight of the point, the inverse of the weighted sum of the enabled channels'
    /// densities.
    pub fn weight(&self) -> T {
        self.weight
    }
}

/// A checkpoint saves the state of the multi-channel integrator after an iteration: the random
/// number generator before and after the iteration, the estimators, the channel grids and
/// weights the iteration sampled from, the adjustment data both refinements need, and the
/// histograms. Checkpoints can be used to restart or resume integrations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MultiChannelCheckpoint<T, R> {
    rng_before: R,
    rng_after: R,
    estimators: KahanEstimators<T>,
    channels: Vec<VegasPdf<T>>,
    channel_weights: Vec<T>,
    adjustment_data: Vec<T>,
    bin_adjustment_data: Vec<Vec<T>>,
    histograms: Vec<HistogramEstimators<T>>,
}

impl<T, R> MultiChannelCheckpoint<T, R> {
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

    /// Returns the channel grids this checkpoint's iteration sampled from.
    pub fn channels(&self) -> &[VegasPdf<T>] {
        &self.channels
    }

    /// Returns the channel weights this checkpoint's iteration sampled with.
    pub fn channel_weights(&self) -> &[T] {
        &self.channel_weights
    }

    /// Returns the per-channel accumulated contributions that drive the channel-weight
    /// refinement.
    pub fn adjustment_data(&self) -> &[T] {
        &self.adjustment_data
    }

    /// Returns, for every channel, the per-bin accumulated squared contributions of the calls
    /// that selected it, which drive the refinement of that channel's grid.
    pub fn bin_adjustment_data(&self) -> &[Vec<T>] {
        &self.bin_adjustment_data
    }

    /// Access the histograms.
    pub fn histograms(&self) -> &Vec<HistogramEstimators<T>> {
        &self.histograms
    }
}

impl<T, R> Checkpoint for MultiChannelCheckpoint<T, R>
where
    T: Float + FromPrimitive,
{
    type NumType = T;
    type Est = KahanEstimators<T>;

    fn estimators(&self) -> &Self::Est {
        &self.estimators
    }
}

/// Computes new channel weights from the per-channel `adjustment_data` accumulated during an
/// iteration.
///
/// The new weight of a channel is proportional to $w^{1-\beta} W^\beta$ with $w$ its old weight
/// and $W$ its adjustment data; `beta` between zero (keep the old weights) and one (follow the
/// data alone) damps the adaptation. Channels whose weight is exactly zero stay disabled. All
/// other channels are clamped from below by `min_weight` so that a fluctuation cannot
/// irrecoverably shut off a channel, and the result sums to one with every enabled channel at or
/// above the floor. If the adjustment data vanishes entirely there is nothing to adapt from and
/// the old weights are returned.
pub fn refine_channel_weights<T>(
    channel_weights: &[T],
    adjustment_data: &[T],
    min_weight: T,
    beta: T,
) -> Vec<T>
where
    T: Float + FromPrimitive,
{
    debug_assert_eq!(channel_weights.len(), adjustment_data.len());

    let mut new_weights: Vec<T> = channel_weights
        .iter()
        .zip(adjustment_data.iter())
        .map(|(&weight, &data)| {
            if weight > T::zero() && data > T::zero() {
                weight.powf(T::one() - beta) * data.powf(beta)
            } else {
                T::zero()
            }
        })
        .collect();

    let sum = new_weights.iter().fold(T::zero(), |acc, &w| acc + w);

    if sum <= T::zero() {
        debug!("all channel adjustment data vanishes, weights left unchanged");
        return channel_weights.to_vec();
    }

    let normalized: Vec<T> = new_weights.iter().map(|&weight| weight / sum).collect();

    // pin channels at the floor and distribute the remaining mass over the others in proportion
    // to their normalized weights, repeating if the rescaling pushes another channel below the
    // floor
    let enabled = channel_weights.iter().filter(|&&w| w > T::zero()).count();
    let mut pinned: Vec<bool> = channel_weights
        .iter()
        .zip(normalized.iter())
        .map(|(&old, &weight)| old > T::zero() && weight < min_weight)
        .collect();

    loop {
        let pinned_count = pinned
            .iter()
            .zip(channel_weights.iter())
            .filter(|&(&p, &old)| p && old > T::zero())
            .count();
        let pinned_mass = T::from_usize(pinned_count).unwrap() * min_weight;
        let free_mass = T::one() - pinned_mass;

        if pinned_count == enabled || free_mass <= T::zero() {
            // the floor does not leave room for anything else; fall back to equal weights for
            // all enabled channels
            let equal = T::from_usize(enabled).unwrap().recip();
            for (weight, &old) in new_weights.iter_mut().zip(channel_weights.iter()) {
                *weight = if old > T::zero() { equal } else { T::zero() };
            }
            break;
        }

        let free_sum = normalized
            .iter()
            .zip(pinned.iter())
            .filter(|&(_, &p)| !p)
            .fold(T::zero(), |acc, (&weight, _)| acc + weight);
        let scale = free_mass / free_sum;

        let mut repeat = false;

        for (channel, weight) in new_weights.iter_mut().enumerate() {
            if channel_weights[channel] <= T::zero() {
                continue;
            }

            if pinned[channel] {
                *weight = min_weight;
                continue;
            }

            let scaled = normalized[channel] * scale;

            if scaled < min_weight {
                pinned[channel] = true;
                repeat = true;
            } else {
                *weight = scaled;
            }
        }

        if !repeat {
            break;
        }
    }

    new_weights
}

fn validate_channels<T, P, I>(
    integrand: &I,
    channels: &[VegasPdf<T>],
    channel_weights: &[T],
) -> Result<(), IntegrationError>
where
    I: Integrand<T, P>,
    T: Float + FromPrimitive,
{
    if channel_weights.len() != channels.len() {
        return Err(IntegrationError::ChannelCountMismatch {
            weights: channel_weights.len(),
            channels: channels.len(),
        });
    }

    for pdf in channels {
        if pdf.dimensions() != integrand.dim() {
            return Err(IntegrationError::DimensionMismatch {
                integrand: integrand.dim(),
                pdf: pdf.dimensions(),
            });
        }
    }

    if channel_weights.iter().any(|&weight| weight < T::zero()) {
        return Err(IntegrationError::InvalidChannelWeights);
    }

    let sum = channel_weights.iter().fold(T::zero(), |acc, &w| acc + w);

    if (sum - T::one()).abs() > T::epsilon().sqrt() {
        return Err(IntegrationError::InvalidChannelWeights);
    }

    if !channel_weights.iter().any(|&weight| weight > T::zero()) {
        return Err(IntegrationError::NoEnabledChannels);
    }

    Ok(())
}

/// Performs a single iteration with `calls` integrand evaluations, advancing `rng` by exactly
/// `calls * (dim + 1)` uniform values, one per dimension plus one for the channel selection.
fn integrate_iteration<T, R, I>(
    integrand: &I,
    channels: &[VegasPdf<T>],
    channel_weights: &[T],
    rng: &mut R,
    calls: usize,
) -> MultiChannelCheckpoint<T, R>
where
    I: Integrand<T, MultiChannelPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    let rng_before = rng.clone();

    let dimensions = integrand.dim();
    let selector = ChannelSelector::new(channel_weights);

    let mut estimators = KahanEstimators::default();
    let mut adjustment_data = vec![T::zero(); channels.len()];
    let mut bin_adjustment_data: Vec<Vec<T>> = channels
        .iter()
        .map(|pdf| vec![T::zero(); pdf.dimensions() * pdf.bins()])
        .collect();
    let mut histograms: Vec<_> = integrand
        .histograms_1d()
        .iter()
        .map(|h| h.get_accumulator())
        .collect();

    for _ in 0..calls {
        // sample a new point on the hypercube through a randomly selected channel
        let random_numbers: Vec<T> = (0..dimensions).map(|_| rng.gen()).collect();
        let channel = selector.select(rng.gen());
        let point = MultiChannelPoint::new(
            channels,
            channel_weights,
            &selector,
            channel,
            random_numbers,
        );

        let result = integrand.call(&point);
        let value = result.val() * point.weight();

        if estimators.record(value) {
            let square = value * value;

            // save the square for each bin of the selected channel's grid
            let bins = channels[channel].bins();
            for (dimension, &bin) in point.bin().iter().enumerate() {
                let index = dimension * bins + bin;
                bin_adjustment_data[channel][index] = bin_adjustment_data[channel][index] + square;
            }

            // these are the values that drive the channel-weight refinement
            let weighted_square = square * point.weight();
            for (data, &density) in adjustment_data.iter_mut().zip(point.densities().iter()) {
                *data = *data + density * weighted_square;
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

    MultiChannelCheckpoint {
        rng_before,
        rng_after: rng.clone(),
        estimators,
        channels: channels.to_vec(),
        channel_weights: channel_weights.to_vec(),
        adjustment_data,
        bin_adjustment_data,
        histograms: histograms
            .into_iter()
            .map(|h| h.to_histogram_estimators(calls))
            .collect(),
    }
}

/// The iteration loop shared by [`integrate`] and [`resume_integration_from_checkpoints`].
#[allow(clippy::too_many_arguments)]
fn integrate_with_history<T, R, I>(
    integrand: &I,
    mut channels: Vec<VegasPdf<T>>,
    mut channel_weights: Vec<T>,
    mut rng: R,
    callback: &impl Callback<MultiChannelCheckpoint<T, R>>,
    alpha: T,
    beta: T,
    min_weight: T,
    iterations: &[usize],
    mut checkpoints: Vec<MultiChannelCheckpoint<T, R>>,
) -> Vec<MultiChannelCheckpoint<T, R>>
where
    I: Integrand<T, MultiChannelPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    checkpoints.reserve(iterations.len());

    for &calls in iterations {
        let checkpoint =
            integrate_iteration(integrand, &channels, &channel_weights, &mut rng, calls);
        checkpoints.push(checkpoint);

        if !callback.print(&checkpoints) {
            break;
        }

        // the two-level adaptation: every channel reshapes its own bins, then the channel
        // weights shift towards the channels explaining more of the variance
        let last = &checkpoints[checkpoints.len() - 1];
        channels = last
            .channels()
            .iter()
            .zip(last.bin_adjustment_data().iter())
            .map(|(pdf, data)| pdf.refine(alpha, data))
            .collect();
        channel_weights = refine_channel_weights(
            last.channel_weights(),
            last.adjustment_data(),
            min_weight,
            beta,
        );
    }

    checkpoints
}

/// Integrates the `integrand` over the unit hypercube using multi-channel importance sampling
/// with the given `channels` and their initial `channel_weights`, which must sum to one.
/// Channels with weight zero are disabled and never sampled from.
///
/// The random number generator in its initial state is provided in `rng` together with a
/// `callback` function that is called with the checkpoints of all finished iterations and may
/// stop the integration by returning `false`. The number of calls of the integrand per iteration
/// is stored in the slice `iterations`. After every iteration except a stopped one the channel
/// grids are refined with the damping exponent `alpha` and the channel weights with the damping
/// exponent `beta` (typically `0.25`), where `min_weight` keeps every enabled channel alive.
///
/// # Errors
///
/// An empty iteration schedule, a dimension mismatch between the integrand and a channel grid,
/// a weight vector whose length differs from the number of channels, negative weights, weights
/// not summing to one, and all-zero weights are configuration errors, reported before any work
/// is done.
#[allow(clippy::too_many_arguments)]
pub fn integrate<T, R, I>(
    integrand: &I,
    channels: &[VegasPdf<T>],
    channel_weights: &[T],
    rng: &R,
    callback: &impl Callback<MultiChannelCheckpoint<T, R>>,
    alpha: T,
    beta: T,
    min_weight: T,
    iterations: &[usize],
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, IntegrationError>
where
    I: Integrand<T, MultiChannelPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    if iterations.is_empty() {
        return Err(IntegrationError::EmptyIterationSchedule);
    }

    validate_channels(integrand, channels, channel_weights)?;

    Ok(integrate_with_history(
        integrand,
        channels.to_vec(),
        channel_weights.to_vec(),
        rng.clone(),
        callback,
        alpha,
        beta,
        min_weight,
        iterations,
        Vec::new(),
    ))
}

/// Resumes a multi-channel integration from a previously obtained checkpoint history: the
/// channel grids and weights of the last checkpoint are refined with its adjustment data and the
/// random number generator continues in its state after the last iteration, so the resumed run
/// reproduces the remainder of an uninterrupted one. The returned history contains the given
/// checkpoints followed by the new ones; `iterations` may be empty, in which case the history is
/// returned unchanged.
///
/// # Errors
///
/// An empty checkpoint history and a dimension mismatch between the integrand and a channel
/// grid are configuration errors, reported before any work is done.
#[allow(clippy::too_many_arguments)]
pub fn resume_integration_from_checkpoints<T, R, I>(
    integrand: &I,
    checkpoints: Vec<MultiChannelCheckpoint<T, R>>,
    callback: &impl Callback<MultiChannelCheckpoint<T, R>>,
    alpha: T,
    beta: T,
    min_weight: T,
    iterations: &[usize],
) -> Result<Vec<MultiChannelCheckpoint<T, R>>, IntegrationError>
where
    I: Integrand<T, MultiChannelPoint<T>>,
    T: Float + FromPrimitive,
    R: Clone + Rng,
    Standard: Distribution<T>,
{
    let last = checkpoints
        .last()
        .ok_or(IntegrationError::EmptyCheckpointHistory)?;

    validate_channels(integrand, last.channels(), last.channel_weights())?;

    let channels: Vec<_> = last
        .channels()
        .iter()
        .zip(last.bin_adjustment_data().iter())
        .map(|(pdf, data)| pdf.refine(alpha, data))
        .collect();
    let channel_weights = refine_channel_weights(
        last.channel_weights(),
        last.adjustment_data(),
        min_weight,
        beta,
    );
    let rng = last.rng_after().clone();

    Ok(integrate_with_history(
        integrand,
        channels,
        channel_weights,
        rng,
        callback,
        alpha,
        beta,
        min_weight,
        iterations,
        checkpoints,
    ))
}
