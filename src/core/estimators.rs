//! This module contains everything related to estimators.
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};

/// Basic estimators, like the mean, variance, and the standard deviation.
pub trait BasicEstimators<T: Float> {
    /// Returns the mean value.
    fn mean(&self) -> T;

    /// Returns the variance, $V$.
    fn var(&self) -> T;

    /// Returns the standard deviation, $\sigma = \sqrt{V}$.
    fn std(&self) -> T {
        self.var().sqrt()
    }
}

/// More estimators.
pub trait Estimators<T: Float>: BasicEstimators<T> {
    /// Returns the number of times $N$, the integrand has been called.
    fn calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nf}$, the integrand has been called
    /// and its return value was non-finite.
    fn non_finite_calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nz}$, the integrand has been called
    /// and its return value was non-zero.
    fn non_zero_calls(&self) -> usize;
}

/// A struct implementing the `BasicEstimator<T>` trait.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MeanVar<T> {
    mean: T,
    var: T,
}

impl<T: std::ops::Add<Output = T>> std::ops::Add for MeanVar<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            mean: self.mean + other.mean,
            var: self.var + other.var,
        }
    }
}

impl<T> MeanVar<T> {
    /// Constructor.
    pub const fn new(mean: T, var: T) -> Self {
        Self { mean, var }
    }
}

impl<T: Float> BasicEstimators<T> for MeanVar<T> {
    fn mean(&self) -> T {
        self.mean
    }

    fn var(&self) -> T {
        self.var
    }
}

/// Compensated (Kahan) accumulator.
///
/// Keeps a running sum together with a compensation term that tracks the rounding error of every
/// addition, so that millions of small contributions do not drown in the rounding noise of a
/// plain sum. Two accumulators combine by plain addition of their components, which is what makes
/// worker-local sums composable (see the crate-level notes on reproducibility).
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct KahanSum<T> {
    sum: T,
    compensation: T,
}

impl<T: Float> KahanSum<T> {
    /// Adds `value` to the running sum.
    pub fn add(&mut self, value: T) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// Returns the accumulated total.
    pub fn total(&self) -> T {
        self.sum
    }
}

impl<T: Float> Default for KahanSum<T> {
    fn default() -> Self {
        Self {
            sum: T::zero(),
            compensation: T::zero(),
        }
    }
}

impl<T: Float> std::ops::Add for KahanSum<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            compensation: self.compensation + other.compensation,
        }
    }
}

/// Estimators accumulated with compensated summation.
///
/// This is the estimator type shared by the integrators in this crate. It stores the raw sums of
/// the weighted contributions and their squares together with the call counters; mean and
/// variance are derived quantities.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KahanEstimators<T> {
    sum: KahanSum<T>,
    sumsq: KahanSum<T>,
    calls: usize,
    non_finite_calls: usize,
    non_zero_calls: usize,
}

impl<T: Float> Default for KahanEstimators<T> {
    fn default() -> Self {
        Self {
            sum: KahanSum::default(),
            sumsq: KahanSum::default(),
            calls: 0,
            non_finite_calls: 0,
            non_zero_calls: 0,
        }
    }
}

impl<T: Float> std::ops::Add for KahanEstimators<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            sumsq: self.sumsq + other.sumsq,
            calls: self.calls + other.calls,
            non_finite_calls: self.non_finite_calls + other.non_finite_calls,
            non_zero_calls: self.non_zero_calls + other.non_zero_calls,
        }
    }
}

impl<T: Float> KahanEstimators<T> {
    /// Folds the contribution of one call into the running sums. Returns `true` if the value
    /// entered the sums, i.e. it was finite and non-zero; zero values only advance the call
    /// counter and non-finite values are counted separately instead of poisoning the sums.
    pub fn record(&mut self, value: T) -> bool {
        self.calls += 1;

        if value == T::zero() {
            return false;
        }

        self.non_zero_calls += 1;

        if !value.is_finite() {
            self.non_finite_calls += 1;
            return false;
        }

        self.sum.add(value);
        self.sumsq.add(value * value);

        true
    }
}

impl<T> BasicEstimators<T> for KahanEstimators<T>
where
    T: Float + FromPrimitive,
{
    fn mean(&self) -> T {
        // TODO: Get rid of unwrap.
        self.sum.total() / T::from_usize(self.calls).unwrap()
    }

    fn var(&self) -> T {
        // TODO: Get rid of unwrap
        let calls = T::from_usize(self.calls).unwrap();
        let sum = self.sum.total();
        (self.sumsq.total() - sum * sum / calls) / calls / (calls - T::one())
    }
}

impl<T> Estimators<T> for KahanEstimators<T>
where
    T: Float + FromPrimitive,
{
    fn calls(&self) -> usize {
        self.calls
    }

    fn non_finite_calls(&self) -> usize {
        self.non_finite_calls
    }

    fn non_zero_calls(&self) -> usize {
        self.non_zero_calls
    }
}

/// Cumulative result of a sequence of iterations, combined with inverse-variance weighting.
#[derive(Clone, Debug)]
pub struct CumulativeResult<T> {
    calls: usize,
    mean: T,
    var: T,
    chi_sq_dof: Option<T>,
}

impl<T: Copy> CumulativeResult<T> {
    /// Returns the combined number of calls of all iterations.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// The goodness-of-fit statistic $\chi^2 / \mathrm{dof}$ of the per-iteration estimates
    /// against the combined estimate. It is `None` for fewer than two iterations, for which the
    /// statistic is undefined.
    pub fn chi_sq_dof(&self) -> Option<T> {
        self.chi_sq_dof
    }
}

impl<T: Float> BasicEstimators<T> for CumulativeResult<T> {
    fn mean(&self) -> T {
        self.mean
    }

    fn var(&self) -> T {
        self.var
    }
}

/// Combines the estimators of an ordered sequence of iterations into a cumulative result.
///
/// Each iteration enters with a weight inverse to its variance. Iterations with non-positive
/// variance carry no usable uncertainty and are excluded from the weighting and from $\chi^2$;
/// if no iteration has a positive variance, the plain average of the iteration means is returned
/// with zero variance. The cumulative result of a single iteration is that iteration's mean and
/// variance, unchanged.
pub fn cumulative<'a, T, E, I>(estimators: I) -> CumulativeResult<T>
where
    T: Float + FromPrimitive + 'a,
    E: Estimators<T> + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let stats: Vec<(usize, T, T)> = estimators
        .into_iter()
        .map(|e| (e.calls(), e.mean(), e.var()))
        .collect();

    let calls = stats.iter().map(|s| s.0).sum();

    if let [(_, mean, var)] = stats[..] {
        return CumulativeResult {
            calls,
            mean,
            var,
            chi_sq_dof: None,
        };
    }

    let mut inv_var_sum = T::zero();
    let mut weighted_mean_sum = T::zero();

    for &(_, mean, var) in &stats {
        if var > T::zero() {
            let inv_var = var.recip();
            inv_var_sum = inv_var_sum + inv_var;
            weighted_mean_sum = weighted_mean_sum + mean * inv_var;
        }
    }

    let (mean, var) = if inv_var_sum > T::zero() {
        (weighted_mean_sum / inv_var_sum, inv_var_sum.recip())
    } else if stats.is_empty() {
        (T::zero(), T::zero())
    } else {
        // every iteration came out with zero variance
        let n = T::from_usize(stats.len()).unwrap();
        let sum = stats.iter().fold(T::zero(), |acc, &(_, m, _)| acc + m);
        (sum / n, T::zero())
    };

    let chi_sq_dof = if stats.len() > 1 {
        let chi_sq = stats.iter().fold(T::zero(), |acc, &(_, m, v)| {
            if v > T::zero() {
                let distance = m - mean;
                acc + distance * distance / v
            } else {
                acc
            }
        });
        Some(chi_sq / T::from_usize(stats.len() - 1).unwrap())
    } else {
        None
    };

    CumulativeResult {
        calls,
        mean,
        var,
        chi_sq_dof,
    }
}
