//! The per-dimension probability density function (pdf) that the adaptive integrators sample
//! from, together with its refinement algorithm and a line-oriented text interface.

use log::debug;
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Errors arising from constructing or deserializing a [`VegasPdf`].
#[derive(Debug)]
pub enum PdfError {
    /// The grid was requested with zero dimensions.
    ZeroDimensions,
    /// The grid was requested with zero bins.
    ZeroBins,
    /// The serialized input contains no boundaries.
    Empty,
    /// A line of the serialized input has a different number of boundaries than the first line.
    BinCountMismatch {
        /// Number of boundaries of the first line.
        expected: usize,
        /// Number of boundaries found.
        found: usize,
        /// Zero-based index of the offending line.
        dimension: usize,
    },
    /// A boundary is not strictly larger than its predecessor.
    NonMonotonic {
        /// Zero-based dimension of the offending boundary.
        dimension: usize,
        /// Zero-based bin of the offending boundary.
        bin: usize,
    },
    /// A boundary lies outside the interval (0, 1], or the last boundary of a dimension is not
    /// exactly one.
    OutOfRange {
        /// Zero-based dimension of the offending boundary.
        dimension: usize,
        /// Zero-based bin of the offending boundary.
        bin: usize,
    },
    /// A token of the serialized input is not a number.
    InvalidNumber {
        /// Zero-based dimension of the offending token.
        dimension: usize,
        /// Zero-based bin of the offending token.
        bin: usize,
    },
    /// Reading the serialized input failed.
    Io(io::Error),
}

impl Display for PdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroDimensions => write!(f, "a grid must have at least one dimension"),
            Self::ZeroBins => write!(f, "a grid must have at least one bin"),
            Self::Empty => write!(f, "the serialized grid contains no boundaries"),
            Self::BinCountMismatch {
                expected,
                found,
                dimension,
            } => write!(
                f,
                "dimension {} has {} boundaries instead of {}",
                dimension, found, expected
            ),
            Self::NonMonotonic { dimension, bin } => write!(
                f,
                "boundary {} of dimension {} is not strictly increasing",
                bin, dimension
            ),
            Self::OutOfRange { dimension, bin } => write!(
                f,
                "boundary {} of dimension {} lies outside (0, 1]",
                bin, dimension
            ),
            Self::InvalidNumber { dimension, bin } => write!(
                f,
                "boundary {} of dimension {} is not a number",
                bin, dimension
            ),
            Self::Io(error) => write!(f, "reading the serialized grid failed: {}", error),
        }
    }
}

impl std::error::Error for PdfError {}

/// The probability density function of the VEGAS algorithm.
///
/// For every dimension the unit interval is partitioned into the same number of bins, stored as
/// their monotonically increasing upper boundaries; the last boundary of every dimension is
/// exactly one. Points are drawn uniformly in bin space, which gives every bin the same
/// probability $1/B$ regardless of its width. Narrow bins therefore translate into a high
/// sampling density. The boundaries are never mutated: [`VegasPdf::refine`] produces a new grid,
/// so that earlier grids referenced by iteration results remain valid.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VegasPdf<T> {
    bins: usize,
    x: Vec<T>,
}

impl<T> VegasPdf<T>
where
    T: Float + FromPrimitive,
{
    /// Creates a grid with `dimensions` dimensions and `bins` equally sized bins in each of them.
    ///
    /// # Errors
    ///
    /// Requesting zero dimensions or zero bins is a configuration error.
    pub fn new(dimensions: usize, bins: usize) -> Result<Self, PdfError> {
        if dimensions == 0 {
            return Err(PdfError::ZeroDimensions);
        }

        if bins == 0 {
            return Err(PdfError::ZeroBins);
        }

        let bins_t = T::from_usize(bins).unwrap();
        let x = (0..dimensions)
            .flat_map(|_| (1..=bins).map(|bin| T::from_usize(bin).unwrap() / bins_t))
            .collect();

        Ok(Self { bins, x })
    }

    /// Returns the number of dimensions of the grid.
    pub fn dimensions(&self) -> usize {
        self.x.len() / self.bins
    }

    /// Returns the number of bins of the grid in each dimension.
    pub const fn bins(&self) -> usize {
        self.bins
    }

    /// Returns the upper boundary of `bin` in `dimension`.
    pub fn boundary(&self, dimension: usize, bin: usize) -> T {
        self.x[dimension * self.bins + bin]
    }

    /// Returns the width of `bin` in `dimension`.
    pub fn width(&self, dimension: usize, bin: usize) -> T {
        self.boundary(dimension, bin) - self.lower(dimension, bin)
    }

    fn lower(&self, dimension: usize, bin: usize) -> T {
        if bin == 0 {
            T::zero()
        } else {
            self.boundary(dimension, bin - 1)
        }
    }

    /// Maps the uniform `random_numbers` into the hypercube, writing the mapped coordinates and
    /// the selected bin indices into `coordinates` and `bin`. Returns the weight of the point,
    /// the Jacobian of the bin-to-coordinate transformation.
    pub(crate) fn map(&self, random_numbers: &[T], coordinates: &mut [T], bin: &mut [usize]) -> T {
        debug_assert_eq!(random_numbers.len(), self.dimensions());

        let bins_t = T::from_usize(self.bins).unwrap();
        let mut weight = T::one();

        for (dimension, &random_number) in random_numbers.iter().enumerate() {
            debug_assert!(random_number >= T::zero() && random_number < T::one());

            let position = random_number * bins_t;
            // rounding may push the scaled position onto the upper edge of the last bin
            let index = position.to_usize().unwrap().min(self.bins - 1);
            let lower = self.lower(dimension, index);
            let width = self.boundary(dimension, index) - lower;

            coordinates[dimension] = lower + (position - T::from_usize(index).unwrap()) * width;
            bin[dimension] = index;
            weight = weight * width * bins_t;
        }

        weight
    }

    /// Returns the sampling density of the grid at the hypercube point `coordinates`, the product
    /// over all dimensions of $1 / (B w)$ with $w$ the width of the bin containing the
    /// coordinate.
    pub fn density(&self, coordinates: &[T]) -> T {
        debug_assert_eq!(coordinates.len(), self.dimensions());

        let bins_t = T::from_usize(self.bins).unwrap();
        let mut density = T::one();

        for (dimension, &coordinate) in coordinates.iter().enumerate() {
            let row = &self.x[dimension * self.bins..(dimension + 1) * self.bins];
            let bin = row
                .partition_point(|&boundary| boundary <= coordinate)
                .min(self.bins - 1);
            density = density / (self.width(dimension, bin) * bins_t);
        }

        density
    }

    /// Refines the grid using the per-bin `adjustment_data` accumulated during an iteration and
    /// returns the new grid. The number of bins and dimensions stay the same.
    ///
    /// Each dimension is treated independently. The raw per-bin values are first smoothed with a
    /// three-point moving average (two points at the edges) to suppress statistical noise. A
    /// dimension whose smoothed values sum to zero carries no information and keeps its
    /// boundaries. Every bin is then assigned the importance
    /// $\left( \frac{r - 1}{\ln r} \right)^\alpha$ with $r$ its share of the smoothed sum; at
    /// $r = 1$ the expression is evaluated as its analytic limit, one, and bins with non-positive
    /// smoothed value get zero importance. Finally the new boundaries are placed where the
    /// importance accumulated over the old bins crosses multiples of the per-bin average, with
    /// linear interpolation inside the crossing bin. Larger values of `alpha` (typically between
    /// one and two) make the adaptation more aggressive.
    pub fn refine(&self, alpha: T, adjustment_data: &[T]) -> Self {
        let bins = self.bins;
        let dimensions = self.dimensions();

        debug_assert_eq!(adjustment_data.len(), dimensions * bins);

        let mut new_pdf = self.clone();
        let mut smoothed = vec![T::zero(); bins];

        let two = T::from_usize(2).unwrap();
        let three = T::from_usize(3).unwrap();

        for dimension in 0..dimensions {
            let data = &adjustment_data[dimension * bins..(dimension + 1) * bins];

            if bins == 1 {
                // a single bin spans the whole interval, there is nothing to move
                continue;
            }

            smoothed[0] = (data[0] + data[1]) / two;
            for bin in 1..bins - 1 {
                smoothed[bin] = (data[bin - 1] + data[bin] + data[bin + 1]) / three;
            }
            smoothed[bins - 1] = (data[bins - 2] + data[bins - 1]) / two;

            let norm = smoothed.iter().fold(T::zero(), |acc, &value| acc + value);

            if norm <= T::zero() {
                debug!(
                    "adjustment data of dimension {} has zero norm, boundaries left unchanged",
                    dimension
                );
                continue;
            }

            let mut importance_sum = T::zero();
            for value in smoothed.iter_mut() {
                let importance = if *value > T::zero() {
                    let r = *value / norm;
                    if r == T::one() {
                        T::one()
                    } else {
                        ((r - T::one()) / r.ln()).powf(alpha)
                    }
                } else {
                    T::zero()
                };
                *value = importance;
                importance_sum = importance_sum + importance;
            }

            let average_per_bin = importance_sum / T::from_usize(bins).unwrap();

            if average_per_bin <= T::zero() {
                debug!(
                    "importance of dimension {} vanishes, boundaries left unchanged",
                    dimension
                );
                continue;
            }

            let mut accumulated = T::zero();
            let mut old_bin = 0;

            for new_bin in 0..bins - 1 {
                while accumulated < average_per_bin && old_bin != bins {
                    accumulated = accumulated + smoothed[old_bin];
                    old_bin += 1;
                }

                let lower = self.lower(dimension, old_bin - 1);
                let upper = self.boundary(dimension, old_bin - 1);

                accumulated = accumulated - average_per_bin;
                new_pdf.x[dimension * bins + new_bin] =
                    upper - accumulated * (upper - lower) / smoothed[old_bin - 1];
            }

            new_pdf.x[dimension * bins + bins - 1] = T::one();
        }

        new_pdf
    }
}

impl<T> VegasPdf<T>
where
    T: Display,
{
    /// Writes the bin boundaries of the grid to `writer`, one line per dimension with the
    /// boundaries of that dimension in increasing order, separated by single spaces.
    ///
    /// # Errors
    ///
    /// Forwards the errors of the underlying writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for row in self.x.chunks(self.bins) {
            for (bin, boundary) in row.iter().enumerate() {
                if bin > 0 {
                    write!(writer, " ")?;
                }
                write!(writer, "{}", boundary)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }
}

impl<T> VegasPdf<T>
where
    T: Float + FromStr,
{
    /// Reads bin boundaries in the format produced by [`VegasPdf::write`] from `reader`; both
    /// spaces and commas are accepted as separators. The number of dimensions and bins is
    /// implied by the number of lines and the number of boundaries per line.
    ///
    /// # Errors
    ///
    /// Input with non-monotonic boundaries, boundaries outside (0, 1], a last boundary different
    /// from one, a varying number of boundaries per line, or unparsable tokens is rejected.
    pub fn read<R: BufRead>(reader: R) -> Result<Self, PdfError> {
        let mut bins = 0;
        let mut x: Vec<T> = Vec::new();
        let mut dimension = 0;

        for line in reader.lines() {
            let line = line.map_err(PdfError::Io)?;

            if line.trim().is_empty() {
                continue;
            }

            let mut previous = T::zero();
            let mut count = 0;

            for (bin, token) in line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|token| !token.is_empty())
                .enumerate()
            {
                let boundary: T = token
                    .parse()
                    .map_err(|_| PdfError::InvalidNumber { dimension, bin })?;

                if boundary <= previous {
                    return Err(PdfError::NonMonotonic { dimension, bin });
                }

                if boundary > T::one() {
                    return Err(PdfError::OutOfRange { dimension, bin });
                }

                previous = boundary;
                count += 1;
                x.push(boundary);
            }

            if count == 0 {
                continue;
            }

            if previous != T::one() {
                return Err(PdfError::OutOfRange {
                    dimension,
                    bin: count - 1,
                });
            }

            if dimension == 0 {
                bins = count;
            } else if count != bins {
                return Err(PdfError::BinCountMismatch {
                    expected: bins,
                    found: count,
                    dimension,
                });
            }

            dimension += 1;
        }

        if x.is_empty() {
            return Err(PdfError::Empty);
        }

        Ok(Self { bins, x })
    }
}
