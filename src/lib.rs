#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! The crate `vegasir` provides adaptive [Monte Carlo integration] routines based on the VEGAS
//! algorithm and its multi-channel generalization, which allow to efficiently approximate definite
//! multi-dimensional [integrals] with sharply peaked integrands. This crate is a redesign and
//! companion of the library [`hep-mc`].
//!
//! # Features
//!
//! This library was designed with the following features as essential in mind:
//!
//! - **Generic numeric type**. The numeric type used in this library is not fixed, but instead a
//! generic parameter, so that the integration routines can be used with either `f32`, `f64`, or a
//! custom numeric type that implements the `Float` trait from the `num-traits` crate.
//! - **Generic random number generator**. Every random number generator that implements the `Rng`
//! trait from the `rand` crate can be used with every integrator in this crate.
//! - **Reproducibility**. As far as the numeric type allows this, all results produced with
//! `vegasir` are completely reproducible, in the sense that the results only depend on the used
//! random number generator and the chosen seed. Every integrator consumes a fixed number of
//! uniform values per call, so the state of the generator is a computable function of the number
//! of calls performed; this is the basis for splitting an iteration over independent workers that
//! each skip ahead to a private slice of the random stream.
//! - **Adaptive importance sampling**. Between iterations the integrators reshape their sampling
//! density: the VEGAS integrator adapts the bin boundaries of a per-dimension grid, and the
//! multi-channel integrator additionally adapts the probabilities with which its channels are
//! selected.
//! - **Non-finite number filtering**. All integrators filter out non-finite numbers such as `inf`
//! or `nan`, which integrands sometimes produce in extreme regions of their integration domain due
//! to finite numerical precision. When this happens the result of the corresponding call is kept
//! out of the running sums to not destroy the integration and a counter is increased that keeps
//! track of how often this happened.
//! - **Zero tracking**. If your integrand returns zero, another counter will be increased to keep
//! track of the efficiency of the integration.
//! - **Checkpoints**. Each iteration produces a checkpoint containing the state of the random
//! number generator before and after the iteration, the grid and channel weights that were used,
//! and the raw adjustment data the next refinement needs. An integration can be resumed from any
//! checkpoint and replays without a difference in the final results.
//! - **Histograms**. Often one is not only interested in the integral itself, but also in
//! integrals over smaller integration (sub-)domains: histograms! They can be estimated along with
//! the full integral itself, without any additional integrand evaluations.
//!
//! # What is ...?
//!
//! This section is a dictionary of terms that are used in this documentation. Given
//!
//! $$ I = \prod_{i=1}^d \int_0^1 \mathrm{d} x_i f(x_1, x_2, \ldots, x_d) $$
//!
//! we approximate $I$ using importance sampling with
//!
//! $$ I \approx \frac{1}{N} \sum_{j=1}^N w^{(j)} f \left( x_1^{(j)}, x_2^{(j)}, \ldots,
//! x_d^{(j)} \right) $$
//!
//! where the points are drawn from an adaptable probability density and $w^{(j)}$ is the weight
//! that undoes the bias of drawing from that density. We use the following terms:
//!
//! - the number of *calls* or the *sample size* is $N$, which is the number of times the integrand
//! is evaluated. We assume that this is the expensive operation;
//! - the *integrand* is the function, $f(x_1, x_2, \ldots, x_d)$, that is being integrated,
//! - the number of *dimensions*, $d$, is the number of dimensions of the integration domain,
//! - the *grid* or *pdf* is the per-dimension partition of $[0,1]$ into bins of adaptable width
//! that defines the sampling density,
//! - a *channel* is one such grid among several that the multi-channel integrator selects
//! probabilistically,
//! - the *weight* of a point is the Jacobian of the bin-to-coordinate map, which exactly
//! compensates for the non-uniform bin density,
//! - *efficiency* is the percentage of times the integrand evaluated to a value different from
//! zero. If your integrand returns zero very often, for example in 99% of the time, then the
//! efficiency is only 1%. This number should not be too small, otherwise it is possible that the
//! statistical uncertainties are underestimated.
//!
//! [Monte Carlo integration]: https://en.wikipedia.org/wiki/Monte_Carlo_integration
//! [integrals]: https://en.wikipedia.org/wiki/Integral
//! [`hep-mc`]: https://github.com/cschwan/hep-mc

pub mod callbacks;
pub mod core;
pub mod histograms;
pub mod integrators;
pub mod pdf;

pub use crate::core::*;
