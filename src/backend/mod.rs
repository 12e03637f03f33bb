//! The external imaging routines the pipeline drives.
//!
//! Everything interesting (visibility simulation, prediction, gridding,
//! deconvolution and restoration) happens inside an imaging library. The
//! [`ImagingBackend`] trait is the seam between that library and this crate:
//! every output buffer is allocated here and handed over to be filled in place.

#[cfg(feature = "arl")]
pub mod arl;

use thiserror::Error;

use crate::{Image, Visibility};

#[derive(Error, Debug)]
/// Errors that can occur at the boundary with the imaging library
pub enum BackendError {
    /// An image dimension that the library can't represent.
    #[error("image shape {shape:?} has an axis longer than the imaging library supports")]
    ShapeTooLarge {
        /// The offending shape
        shape: [usize; 4],
    },

    /// A shape from the library that can't describe an image.
    #[error("imaging library returned an invalid image shape {shape:?}")]
    InvalidShape {
        /// The shape, as returned by the library
        shape: Vec<i64>,
    },

    /// A visibility buffer too large for the library.
    #[error("{nvis} visibilities of {npol} polarisations is too many for the imaging library")]
    VisTooLarge {
        /// number of visibilities
        nvis: usize,
        /// number of polarisations
        npol: usize,
    },

    /// A telescope configuration name which can't be passed to the library.
    #[error("invalid telescope configuration name {0:?}")]
    InvalidConfigName(String),

    /// The library reported a failure in one of its routines.
    #[error("{routine} failed: {message}")]
    Routine {
        /// The name of the routine
        routine: &'static str,
        /// What went wrong
        message: String,
    },
}

/// The routines of an imaging library, in the form the pipeline calls them.
///
/// Output arguments are always pre-allocated by the caller, with the shape from
/// [`ImagingBackend::image_shape`] for images.
pub trait ImagingBackend {
    /// The shape `[frequency, polarisation, y, x]` of the test image for the
    /// given frequencies and cell size (radians).
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn image_shape(&mut self, freq: &[f64], cellsize: f64) -> Result<[usize; 4], BackendError>;

    /// Simulate visibilities for the named telescope configuration into `vis`.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn create_visibility(
        &mut self,
        config_name: &str,
        times: &[f64],
        freq: &[f64],
        channel_bandwidth: &[f64],
        vis: &mut Visibility,
    ) -> Result<(), BackendError>;

    /// Fill `image` with the standard test image.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn create_test_image(
        &mut self,
        freq: &[f64],
        cellsize: f64,
        image: &mut Image,
    ) -> Result<(), BackendError>;

    /// Predict the visibilities of `model` at the coordinates of `vis_in`,
    /// writing them to `vis_out`.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn predict_2d(
        &mut self,
        vis_in: &Visibility,
        model: &Image,
        vis_out: &mut Visibility,
    ) -> Result<(), BackendError>;

    /// Fill `model` with an image (and its coordinate system) matching `vis`.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn create_image_from_visibility(
        &mut self,
        vis: &Visibility,
        model: &mut Image,
    ) -> Result<(), BackendError>;

    /// Invert `vis` onto the grid of `model`, writing the dirty image, or the
    /// point spread function if `dopsf`, to `out`. Returns the sum of weights.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn invert_2d(
        &mut self,
        vis: &Visibility,
        model: &Image,
        dopsf: bool,
        out: &mut Image,
    ) -> Result<f64, BackendError>;

    /// Deconvolve `psf` from `dirty`, writing the clean components to `comp`
    /// and what is left to `residual`.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn deconvolve_cube(
        &mut self,
        dirty: &Image,
        psf: &Image,
        comp: &mut Image,
        residual: &mut Image,
    ) -> Result<(), BackendError>;

    /// Restore the clean components `comp` with `psf`, optionally adding
    /// `residual`, into `restored`.
    ///
    /// # Errors
    ///
    /// Will return a [`BackendError`] if the library fails.
    fn restore_cube(
        &mut self,
        comp: &Image,
        psf: &Image,
        residual: Option<&Image>,
        restored: &mut Image,
    ) -> Result<(), BackendError>;
}
