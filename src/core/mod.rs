//! The core module
pub mod estimators;

use crate::core::estimators::Estimators;
use crate::histograms::HistogramSpecification;
use num_traits::{Float, FromPrimitive};
use std::fmt;

/// The result of a call to an integrand.
///
/// It contains the value of the integrand for the given point and, for each one-dimensional
/// histogram requested by the integrand, both the value of the observable (used to determine the
/// bin in the histogram) and the value to be filled into the bin.
///
/// The value to fill into the bin is not necessarily the value of the integrand in order to allow
/// simple counting (by simply filling a 1). The integrators multiply every filled value with the
/// weight of the point before it is committed to the histogram, in the same way the value of the
/// integrand itself is weighted.
#[derive(Debug)]
pub struct CallResult<T> {
    val: T,
    observables_1d: Vec<(T, T)>,
}

impl<T: Copy> CallResult<T> {
    /// Create a new call result. The vector `observables_1d` must have as many entries as the
    /// integrand declares histograms; it stays empty for integrands without histograms.
    pub const fn new(val: T, observables_1d: Vec<(T, T)>) -> Self {
        Self {
            val,
            observables_1d,
        }
    }

    /// The value of the integrand at the evaluated point.
    pub fn val(&self) -> T {
        self.val
    }

    /// For each requested histogram, the observable and the value to be filled into its bin.
    pub fn observables_1d(&self) -> &[(T, T)] {
        &self.observables_1d
    }
}

/// Trait which every integrand must implement.
///
/// The type `P` is the point type of the integrator the integrand is used with:
/// [`VegasPoint`](crate::integrators::vegas::VegasPoint) for the VEGAS integrator and
/// [`MultiChannelPoint`](crate::integrators::multi_channel::MultiChannelPoint) for the
/// multi-channel integrator. For reproducibility the integrand must be a pure function of the
/// point; it may use the point's raw random numbers for auxiliary sampling of its own.
pub trait Integrand<T: Copy, P>: Send + Sync {
    /// Calculates the value of the integrand at the given `point`, whose coordinates lie on the
    /// hypercube with as many dimensions as specified by `dim()`.
    fn call(&self, point: &P) -> CallResult<T>;

    /// Returns how many dimensions the integrand has.
    fn dim(&self) -> usize;

    /// Defines the one-dimensional histograms to be filled during the integration.
    ///
    /// If histograms are requested, their corresponding observables and bin values have to be
    /// computed while calling `call` and returned as part of the result.
    fn histograms_1d(&self) -> Vec<HistogramSpecification<T>> {
        vec![]
    }
}

/// Common view of the checkpoints produced by the integrators after each iteration.
///
/// Callbacks are generic over this trait so that the same callback implementation works with
/// every integrator in this crate.
pub trait Checkpoint {
    /// The numeric type of the integration.
    type NumType: Float + FromPrimitive;

    /// The estimator type produced by the integrator.
    type Est: Estimators<Self::NumType>;

    /// Returns the estimators of this checkpoint's iteration.
    fn estimators(&self) -> &Self::Est;
}

/// Configuration errors that are reported before an integration performs any work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IntegrationError {
    /// The iteration-call schedule contains no entries.
    EmptyIterationSchedule,
    /// An integration cannot be resumed from an empty checkpoint history.
    EmptyCheckpointHistory,
    /// The dimension of the integrand differs from the dimension of a grid.
    DimensionMismatch {
        /// Dimension reported by the integrand.
        integrand: usize,
        /// Dimension of the offending grid.
        pdf: usize,
    },
    /// The number of channel weights differs from the number of channels.
    ChannelCountMismatch {
        /// Number of supplied weights.
        weights: usize,
        /// Number of supplied channels.
        channels: usize,
    },
    /// The channel weights contain negative entries or do not sum to one within tolerance.
    InvalidChannelWeights,
    /// Every channel weight is zero, leaving nothing to sample from.
    NoEnabledChannels,
}

impl fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyIterationSchedule => write!(f, "the iteration-call schedule is empty"),
            Self::EmptyCheckpointHistory => {
                write!(f, "cannot resume from an empty checkpoint history")
            }
            Self::DimensionMismatch { integrand, pdf } => write!(
                f,
                "the integrand has {} dimension(s) but the grid has {}",
                integrand, pdf
            ),
            Self::ChannelCountMismatch { weights, channels } => write!(
                f,
                "{} channel weight(s) supplied for {} channel(s)",
                weights, channels
            ),
            Self::InvalidChannelWeights => {
                write!(f, "channel weights must be non-negative and sum to one")
            }
            Self::NoEnabledChannels => write!(f, "all channel weights are zero"),
        }
    }
}

impl std::error::Error for IntegrationError {}
