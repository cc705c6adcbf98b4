//! Implementation of different callback functions.
use crate::core::estimators::{cumulative, BasicEstimators, Estimators};
use crate::core::Checkpoint;
use log::error;
use serde::Serialize;
use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Trait for implementing callbacks for iterative MC algorithms.
///
/// The method is invoked once after every finished iteration with the full checkpoint history so
/// far. Returning `false` stops the integration gracefully before the next iteration starts; all
/// callbacks provided by this crate always continue.
pub trait Callback<C> {
    /// This method is called after each successfully finished iteration and may print information
    /// about it. The integration continues for as long as `true` is returned.
    fn print(&self, chkpts: &[C]) -> bool;
}

/// A callback function that does nothing
pub struct SinkCallback {}

impl<C> Callback<C> for SinkCallback {
    fn print(&self, _: &[C]) -> bool {
        true
    }
}

/// A callback function that prints the result of each individual iteration
pub struct SimpleCallback {}

impl<C> Callback<C> for SimpleCallback
where
    C: Checkpoint,
    C::NumType: Display,
{
    fn print(&self, chkpts: &[C]) -> bool {
        let iteration = chkpts.len();
        // Make sure that there is at least one checkpoint
        // otherwise do nothing.
        if let Some(chkpt) = chkpts.last() {
            let estimators = chkpt.estimators();
            println!("iteration {} finished.", iteration - 1);
            println!(
                "this iteration: N={} E={} \u{b1} {}",
                estimators.calls(),
                estimators.mean(),
                estimators.std()
            );
        }

        true
    }
}

/// Simple cumulative callback that shows the result of the individual iteration together with
/// the cumulative result combining it with the previous iterations by inverse-variance
/// weighting, including the $\chi^2 / \mathrm{dof}$ goodness-of-fit statistic.
pub struct SimpleCumulativeCallback {}

impl<C> Callback<C> for SimpleCumulativeCallback
where
    C: Checkpoint,
    C::NumType: Display,
{
    fn print(&self, chkpts: &[C]) -> bool {
        let iteration = chkpts.len();

        if let Some(chkpt) = chkpts.last() {
            let estimators = chkpt.estimators();
            let combined = cumulative(chkpts.iter().map(|c| c.estimators()));
            let chi_sq_dof = combined.chi_sq_dof().map_or_else(
                || "undefined".to_string(),
                |chi_sq_dof| chi_sq_dof.to_string(),
            );

            println!(
                "[iteration {}: N={} E={} \u{b1} {}] [cumulative: N={} E={} \u{b1} {} chi2/dof={}]",
                iteration - 1,
                estimators.calls(),
                estimators.mean(),
                estimators.std(),
                combined.calls(),
                combined.mean(),
                combined.std(),
                chi_sq_dof,
            );
        }

        true
    }
}

/// A callback function that writes the checkpoint history to a file as JSON after every
/// iteration, overwriting the previous state of the file. A run that was interrupted can be
/// picked up again from the last fully written history.
pub struct FileWriterCallback {
    path: PathBuf,
}

impl FileWriterCallback {
    /// Constructs a callback writing to the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl<C: Serialize> Callback<C> for FileWriterCallback {
    fn print(&self, chkpts: &[C]) -> bool {
        match File::create(&self.path) {
            Ok(file) => {
                if let Err(err) = serde_json::to_writer(BufWriter::new(file), chkpts) {
                    error!("serializing checkpoints failed: {}", err);
                }
            }
            Err(err) => error!("creating checkpoint file failed: {}", err),
        }

        true
    }
}
