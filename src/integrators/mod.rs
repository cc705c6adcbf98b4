//! This module contains the integrators of this crate.
pub mod multi_channel;
pub mod vegas;
