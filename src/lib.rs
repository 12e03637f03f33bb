#![warn(missing_docs)]
#![warn(clippy::missing_safety_doc)]
#![warn(clippy::missing_errors_doc)]

//! arl_pipeline drives the imaging routines of the Algorithm Reference Library
//! (ARL) through its C wrapper, and exports the resulting images to FITS.
//!
//! # Examples
//!
//! Here's an example of how to export an image.
//!
//! ```rust
//! use arl_pipeline::{export_image_to_fits, read_fits_image, Image};
//! use tempfile::tempdir;
//!
//! // define a temporary directory for output files
//! let tmp_dir = tempdir().unwrap();
//! let fits_path = tmp_dir.path().join("image.fits");
//!
//! // allocate an image with one frequency, one polarisation and 2x2 pixels
//! let mut image = Image::new([1, 1, 2, 2]).unwrap();
//! image.as_slice_mut().copy_from_slice(&[1., 2., 3., 4.]);
//!
//! export_image_to_fits(&image, &fits_path, None).unwrap();
//!
//! // fits axes are in the reverse order
//! let (axes, data) = read_fits_image(&fits_path, 0).unwrap();
//! assert_eq!(axes, vec![2, 2, 1, 1]);
//! assert_eq!(data, vec![1., 2., 3., 4.]);
//! ```
//!
//! # Details
//!
//! The imaging itself happens behind the [`ImagingBackend`] trait. With the
//! `arl` feature, [`backend::arl::ArlBackend`] binds it to `libarlffi`, and
//! [`PipelineContext::run`] drives it through the whole simulate, image,
//! deconvolve and restore sequence.

pub use marlu;
pub use marlu::ndarray;

pub mod backend;
pub use backend::{BackendError, ImagingBackend};

pub mod error;
pub use error::PipelineError;

pub mod image;
pub use image::{Image, ImageError, POLARISATION_FRAME_BYTES, WCS_BYTES};

pub mod io;
pub use io::{create_output_dir, export_image_to_fits, read_fits_image};

pub mod pipeline;
pub use pipeline::{PipelineContext, PipelineContextBuilder, PipelineReport};

pub mod vis;
pub use vis::{vis_data_size, VisRecord, Visibility};

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
pub(crate) mod test_common;

/// Time an expression, adding the elapsed time to the entry for `$name` in
/// `$durations` (a `HashMap<String, Duration>`), and evaluate to the result of
/// the expression.
///
/// # Examples
///
/// ```rust
/// use arl_pipeline::with_increment_duration;
/// use std::{collections::HashMap, time::Duration};
///
/// let mut durations = HashMap::<String, Duration>::new();
/// let x = with_increment_duration!(durations, "sum", (0..10).sum::<i32>());
/// assert_eq!(x, 45);
/// assert!(durations.contains_key("sum"));
/// ```
#[macro_export]
macro_rules! with_increment_duration {
    ($durations:expr, $name:expr, $expr:expr) => {{
        let _now = std::time::Instant::now();
        let _res = $expr;
        *$durations
            .entry($name.into())
            .or_insert(std::time::Duration::default()) += _now.elapsed();
        _res
    }};
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, thread::sleep, time::Duration};

    #[test]
    fn test_with_increment_duration_accumulates() {
        let mut durations = HashMap::<String, Duration>::new();
        with_increment_duration!(durations, "nap", sleep(Duration::from_millis(3)));
        with_increment_duration!(durations, "nap", sleep(Duration::from_millis(4)));
        assert_eq!(durations.len(), 1);
        assert!(durations["nap"] >= Duration::from_millis(7));
    }

    #[test]
    fn test_with_increment_duration_returns_value() {
        let mut durations = HashMap::<String, Duration>::new();
        let result: Result<u8, ()> = with_increment_duration!(durations, "ok", Ok(3));
        assert_eq!(result, Ok(3));
        assert!(durations.contains_key("ok"));
    }
}
