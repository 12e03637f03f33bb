//! Errors that can occur in arl_pipeline

use thiserror::Error;

use crate::{backend::BackendError, image::ImageError, vis::VisError};

#[derive(Error, Debug)]
/// Errors that can occur while parsing the command line
pub enum CLIError {
    /// When a bad value is given for a command line argument
    #[error("Invalid command line argument {option}. Expected {expected}, received {received}")]
    InvalidCommandLineArgument {
        /// The argument name within the clap app
        option: String,
        /// Description of what was expected
        expected: String,
        /// What was received instead
        received: String,
    },
}

#[derive(Error, Debug)]
/// All the errors that can occur while running the imaging pipeline
pub enum PipelineError {
    /// An error derived from [`CLIError`]
    #[error(transparent)]
    CLIError(#[from] CLIError),

    /// An error from clap while parsing arguments, this includes `--help` and
    /// `--version`.
    #[cfg(feature = "cli")]
    #[error(transparent)]
    ClapError(#[from] clap::Error),

    /// The arguments were parsed but the pipeline should not run.
    #[error("Dry run")]
    DryRun {},

    /// An image buffer couldn't be allocated.
    #[error("Couldn't allocate {name} image: {source}")]
    ImageAlloc {
        /// Which image was being allocated
        name: &'static str,
        /// The underlying error
        source: ImageError,
    },

    /// A visibility buffer couldn't be allocated.
    #[error("Couldn't allocate visibilities: {0}")]
    VisAlloc(#[from] VisError),

    /// An error from the imaging library.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// An invalid pipeline configuration
    #[error("Invalid pipeline configuration: {0}")]
    BadConfig(String),
}
