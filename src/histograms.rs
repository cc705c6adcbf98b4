//! This module contains everything related to histograms.
use crate::core::estimators::{BasicEstimators, MeanVar};
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Define a one-dimensional histogram to be filled by the Monte Carlo integrators.
///
/// A histogram subdivides the range from `left` (inclusive) to `right` (exclusive) into `bins`
/// bins of equal size. Observables outside of the range are ignored when filling.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HistogramSpecification<T> {
    left: T,
    right: T,
    bins: usize,
}

impl<T> HistogramSpecification<T>
where
    T: Copy + Float + FromPrimitive,
{
    /// Constructs the specification of a histogram covering the range from `left` to `right`
    /// with `bins` bins.
    pub fn new(left: T, right: T, bins: usize) -> Self {
        debug_assert!(left < right);
        debug_assert!(bins > 0);

        Self { left, right, bins }
    }

    /// Returns the left boundary of the binned range.
    pub fn left(&self) -> T {
        self.left
    }

    /// Returns the right boundary of the binned range.
    pub fn right(&self) -> T {
        self.right
    }

    /// Returns the number of bins.
    pub const fn bins(&self) -> usize {
        self.bins
    }

    /// Get an accumulator for the histogram.
    /// This is supposed to be sent to a computational unit.
    /// After all units have finished computing, the different
    /// accumulators can be combined.
    pub(crate) fn get_accumulator(&self) -> HistogramAccumulator<T> {
        HistogramAccumulator {
            sums: vec![(T::zero(), T::zero()); self.bins],
            specification: self.clone(),
        }
    }

    /// Compute the index of the bin into which the observable `x` belongs.
    fn compute_bin(&self, x: T) -> Option<usize> {
        if x < self.left || x >= self.right {
            return None;
        }

        let bins = T::from_usize(self.bins).unwrap();
        let index = ((x - self.left) / (self.right - self.left) * bins)
            .to_usize()
            .unwrap();

        Some(index)
    }
}

/// Intermediate representation of a histogram.
///
/// For each bin, the sum and the sum of the squares of the values filled into it are stored.
/// Accumulators filled by independent workers over disjoint slices of the random stream can be
/// combined using the `Add`/`AddAssign` traits before converting them to a
/// [`HistogramEstimators`], which stores the mean and the variance of each bin in terms of a
/// [`MeanVar`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HistogramAccumulator<T> {
    sums: Vec<(T, T)>,
    specification: HistogramSpecification<T>,
}

impl<T> HistogramAccumulator<T>
where
    T: Copy + Float + FromPrimitive,
{
    /// Add the `value` to the bin corresponding to the provided `observable`. Values that are
    /// zero or non-finite and observables outside of the histogram range are ignored.
    pub fn fill(&mut self, observable: T, value: T) {
        if !value.is_finite() || value == T::zero() {
            return;
        }

        if let Some(bin) = self.specification.compute_bin(observable) {
            self.sums[bin].0 = self.sums[bin].0 + value;
            self.sums[bin].1 = self.sums[bin].1 + value * value;
        }
    }

    /// Convert the accumulator into a `HistogramEstimators`.
    pub(crate) fn to_histogram_estimators(self, calls: usize) -> HistogramEstimators<T> {
        HistogramEstimators::new(calls, self)
    }
}

impl<T> Add for HistogramAccumulator<T>
where
    T: Copy + Float + PartialEq,
{
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        debug_assert!(self.specification == other.specification);

        for (lhs, rhs) in self.sums.iter_mut().zip(other.sums.into_iter()) {
            lhs.0 = lhs.0 + rhs.0;
            lhs.1 = lhs.1 + rhs.1;
        }

        self
    }
}

impl<T> AddAssign for HistogramAccumulator<T>
where
    T: Copy + Float + PartialEq,
{
    fn add_assign(&mut self, other: Self) {
        debug_assert!(self.specification == other.specification);

        for (lhs, rhs) in self.sums.iter_mut().zip(other.sums.into_iter()) {
            lhs.0 = lhs.0 + rhs.0;
            lhs.1 = lhs.1 + rhs.1;
        }
    }
}

/// Estimators for histograms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistogramEstimators<T> {
    limits: HistogramSpecification<T>,
    calls: usize,
    mean_var: Vec<MeanVar<T>>,
}

impl<T: Copy> HistogramEstimators<T> {
    /// Returns the estimators for all bins.
    pub fn bins(&self) -> &Vec<MeanVar<T>> {
        &self.mean_var
    }

    /// Returns the specification of the histogram.
    pub fn limits(&self) -> &HistogramSpecification<T> {
        &self.limits
    }
}

impl<T> HistogramEstimators<T>
where
    T: Float + FromPrimitive,
{
    fn new(calls: usize, accumulator: HistogramAccumulator<T>) -> Self {
        Self {
            calls,
            limits: accumulator.specification,
            mean_var: accumulator
                .sums
                .into_iter()
                .map(|(sum, sumsq)| {
                    let calls = T::from_usize(calls).unwrap();
                    MeanVar::new(
                        sum / calls,
                        (sumsq - sum * sum / calls) / calls / (calls - T::one()),
                    )
                })
                .collect(),
        }
    }
}

impl<T> BasicEstimators<T> for HistogramEstimators<T>
where
    T: Float,
{
    fn mean(&self) -> T {
        self.mean_var
            .iter()
            .fold(T::zero(), |mean, x| mean + x.mean())
    }

    fn var(&self) -> T {
        self.mean_var.iter().fold(T::zero(), |var, x| var + x.var())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_accumulator() {
        let specification = HistogramSpecification::<f64>::new(0.0, 2.0, 4);

        assert_eq!(specification.left(), 0.0);
        assert_eq!(specification.right(), 2.0);
        assert_eq!(specification.bins(), 4);

        let mut accumulator_1 = specification.get_accumulator();
        assert_eq!(&accumulator_1.sums, &vec![(0.0, 0.0); 4]);

        accumulator_1.fill(0.75, 1.0);
        assert_eq!(accumulator_1.sums[1], (1.0, 1.0));

        // outside of the range, ignored
        accumulator_1.fill(2.5, 1.0);
        accumulator_1.fill(-0.5, 1.0);
        // zero and non-finite values are ignored
        accumulator_1.fill(0.75, 0.0);
        accumulator_1.fill(0.75, f64::NAN);
        assert_eq!(accumulator_1.sums[1], (1.0, 1.0));

        let mut accumulator_2 = specification.get_accumulator();
        accumulator_2.fill(1.5, 2.0);
        assert_eq!(accumulator_2.sums[3], (2.0, 4.0));

        let accumulator_sum = accumulator_1 + accumulator_2;
        assert_eq!(accumulator_sum.sums[1], (1.0, 1.0));
        assert_eq!(accumulator_sum.sums[3], (2.0, 4.0));
    }

    #[test]
    fn test_histogram_estimators() {
        let specification = HistogramSpecification::<f64>::new(0.0, 1.0, 2);
        let mut accumulator = specification.get_accumulator();

        accumulator.fill(0.25, 2.0);
        accumulator.fill(0.75, 4.0);

        let estimators = accumulator.to_histogram_estimators(2);

        assert_eq!(estimators.bins().len(), 2);
        assert_eq!(estimators.bins()[0].mean(), 1.0);
        assert_eq!(estimators.bins()[1].mean(), 2.0);
        // the histogram total is the sum over its bins
        assert_eq!(estimators.mean(), 3.0);
    }
}
