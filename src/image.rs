//! Four-dimensional image buffers, as exchanged with the imaging library.
//!
//! An [`Image`] owns three independent buffers: the pixel data, and two
//! fixed-capacity opaque metadata blobs (the world coordinate system and the
//! polarisation frame) whose contents are only ever interpreted by the imaging
//! library itself.

use crate::marlu::ndarray::{Array4, ArrayView4, ArrayViewMut4};
use itertools::Itertools;
use log::trace;
use thiserror::Error;

/// Capacity in bytes of the opaque world coordinate system blob.
pub const WCS_BYTES: usize = 2996;

/// Capacity in bytes of the opaque polarisation frame blob.
pub const POLARISATION_FRAME_BYTES: usize = 114;

#[derive(Error, Debug)]
/// Errors that can occur while allocating an [`Image`]
pub enum ImageError {
    /// The product of the shape does not fit in a `usize`.
    #[error("image shape {shape:?} has too many elements")]
    ShapeOverflow {
        /// The requested shape
        shape: [usize; 4],
    },

    /// The allocator could not provide a buffer.
    #[error("could not allocate {bytes} bytes for {buffer}")]
    Allocation {
        /// Which buffer was being allocated
        buffer: &'static str,
        /// The number of bytes requested
        bytes: usize,
    },
}

/// A zeroed vector of `len` elements, or an error if the allocator refuses.
fn try_zeroed<T: Clone + Default>(len: usize, buffer: &'static str) -> Result<Vec<T>, ImageError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ImageError::Allocation {
            buffer,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    v.resize(len, T::default());
    Ok(v)
}

/// A 4D raster of `f64` with its metadata blobs.
///
/// Axes are ordered outer to inner as `[frequency, polarisation, y, x]`, and
/// the data is always stored contiguously in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array4<f64>,
    wcs: Box<[u8]>,
    polarisation_frame: Box<[u8]>,
}

impl Image {
    /// Allocate a zero-initialised image of the given shape.
    ///
    /// Zero-length axes are allowed and give an empty data buffer. The metadata
    /// blobs are always [`WCS_BYTES`] and [`POLARISATION_FRAME_BYTES`] long.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arl_pipeline::Image;
    ///
    /// let image = Image::new([1, 1, 2, 2]).unwrap();
    /// assert_eq!(image.size(), 4);
    /// assert!(image.data().iter().all(|&x| x == 0.0));
    /// ```
    ///
    /// # Errors
    ///
    /// Will return [`ImageError::ShapeOverflow`] if the element count does not
    /// fit in a `usize`, or [`ImageError::Allocation`] if any of the three
    /// buffers cannot be allocated.
    pub fn new(shape: [usize; 4]) -> Result<Self, ImageError> {
        let size = shape
            .iter()
            .try_fold(1_usize, |acc, &n| acc.checked_mul(n))
            .filter(|size| size.checked_mul(std::mem::size_of::<f64>()).is_some())
            .ok_or(ImageError::ShapeOverflow { shape })?;
        trace!(
            "allocating image {} ({} elements)",
            shape.iter().join("x"),
            size
        );

        let data = try_zeroed::<f64>(size, "image data")?;
        let wcs = try_zeroed::<u8>(WCS_BYTES, "wcs")?.into_boxed_slice();
        let polarisation_frame =
            try_zeroed::<u8>(POLARISATION_FRAME_BYTES, "polarisation frame")?.into_boxed_slice();

        let data = Array4::from_shape_vec(shape, data)
            .map_err(|_| ImageError::ShapeOverflow { shape })?;

        Ok(Self {
            data,
            wcs,
            polarisation_frame,
        })
    }

    /// The shape of the data, `[frequency, polarisation, y, x]`.
    pub fn shape(&self) -> [usize; 4] {
        let (num_freqs, num_pols, num_y, num_x) = self.data.dim();
        [num_freqs, num_pols, num_y, num_x]
    }

    /// The number of elements in the data buffer.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// A view of the pixel data.
    pub fn data(&self) -> ArrayView4<f64> {
        self.data.view()
    }

    /// A mutable view of the pixel data.
    pub fn data_mut(&mut self) -> ArrayViewMut4<f64> {
        self.data.view_mut()
    }

    /// The pixel data as a flat row-major slice.
    pub fn as_slice(&self) -> &[f64] {
        // Always in standard layout, we never transpose or slice the owned array.
        self.data
            .as_slice()
            .unwrap_or_else(|| unreachable!("image data is always contiguous"))
    }

    /// The pixel data as a mutable flat row-major slice.
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        self.data
            .as_slice_mut()
            .unwrap_or_else(|| unreachable!("image data is always contiguous"))
    }

    /// The opaque world coordinate system blob.
    pub fn wcs(&self) -> &[u8] {
        &self.wcs
    }

    /// The opaque world coordinate system blob, mutably.
    pub fn wcs_mut(&mut self) -> &mut [u8] {
        &mut self.wcs
    }

    /// The opaque polarisation frame blob.
    pub fn polarisation_frame(&self) -> &[u8] {
        &self.polarisation_frame
    }

    /// The opaque polarisation frame blob, mutably.
    pub fn polarisation_frame_mut(&mut self) -> &mut [u8] {
        &mut self.polarisation_frame
    }

    /// Split the image into its three independently owned buffers:
    /// `(data, wcs, polarisation_frame)`.
    pub fn into_parts(self) -> (Array4<f64>, Box<[u8]>, Box<[u8]>) {
        (self.data, self.wcs, self.polarisation_frame)
    }
}
