//! Bindings to `libarlffi`, the C wrapper around the Algorithm Reference
//! Library (ARL).
//!
//! The wrapper embeds a Python interpreter which hosts ARL itself. It is
//! started once per process, the first time an [`ArlBackend`] is created, and
//! lives until the process exits.
//!
//! The wrapper exchanges data through two plain C structs, which are mirrored
//! here by [`ArlVis`] and [`ArlImage`]. They only ever borrow the buffers of a
//! [`Visibility`] or an [`Image`] for the duration of a single call.

use std::{
    ffi::CString,
    os::raw::{c_char, c_int, c_void},
    sync::Once,
};

use log::{debug, trace};

use super::{BackendError, ImagingBackend};
use crate::{Image, Visibility};

/// Mirror of the wrapper's `ARLVis`.
#[repr(C)]
struct ArlVis {
    nvis: usize,
    npol: c_int,
    data: *mut c_void,
}

/// Mirror of the wrapper's `Image`.
#[repr(C)]
struct ArlImage {
    size: usize,
    data_shape: [c_int; 4],
    data: *mut c_void,
    wcs: *mut c_char,
    polarisation_frame: *mut c_char,
}

extern "C" {
    fn arl_initialize();
    fn helper_get_image_shape(freq: *const f64, cellsize: f64, shape: *mut c_int);
    fn arl_create_visibility(
        config_name: *const c_char,
        times: *const f64,
        freq: *const f64,
        channel_bandwidth: *const f64,
        res_vis: *mut ArlVis,
    );
    fn arl_create_test_image(frequency: *const f64, cellsize: f64, res_img: *mut ArlImage);
    fn arl_predict_2d(vis_in: *const ArlVis, img: *const ArlImage, vis_out: *mut ArlVis);
    fn arl_create_image_from_visibility(vis_in: *const ArlVis, img_out: *mut ArlImage);
    fn arl_invert_2d(
        vis_in: *const ArlVis,
        img_in: *const ArlImage,
        dopsf: bool,
        out: *mut ArlImage,
        sumwt: *mut f64,
    );
    fn arl_deconvolve_cube(
        dirty: *mut ArlImage,
        psf: *mut ArlImage,
        restored: *mut ArlImage,
        residual: *mut ArlImage,
    );
    fn arl_restore_cube(
        model: *mut ArlImage,
        psf: *mut ArlImage,
        residual: *mut ArlImage,
        restored: *mut ArlImage,
    );
}

static ARL_INIT: Once = Once::new();

fn arl_shape(image: &Image) -> Result<[c_int; 4], BackendError> {
    let shape = image.shape();
    let mut data_shape = [0 as c_int; 4];
    for (c_len, &len) in data_shape.iter_mut().zip(shape.iter()) {
        *c_len = c_int::try_from(len).map_err(|_| BackendError::ShapeTooLarge { shape })?;
    }
    Ok(data_shape)
}

/// Describe `image` for a call where the wrapper only reads from it.
///
/// The wrapper's prototypes take the same struct for inputs and outputs, so the
/// pointers are `*mut`, but nothing is written through them.
fn arl_image(image: &Image) -> Result<ArlImage, BackendError> {
    Ok(ArlImage {
        size: image.size(),
        data_shape: arl_shape(image)?,
        data: image.as_slice().as_ptr() as *mut c_void,
        wcs: image.wcs().as_ptr() as *mut c_char,
        polarisation_frame: image.polarisation_frame().as_ptr() as *mut c_char,
    })
}

/// Describe `image` for a call which fills it in.
fn arl_image_mut(image: &mut Image) -> Result<ArlImage, BackendError> {
    let data_shape = arl_shape(image)?;
    let size = image.size();
    Ok(ArlImage {
        size,
        data_shape,
        data: image.as_slice_mut().as_mut_ptr() as *mut c_void,
        wcs: image.wcs_mut().as_mut_ptr() as *mut c_char,
        polarisation_frame: image.polarisation_frame_mut().as_mut_ptr() as *mut c_char,
    })
}

fn arl_vis_npol(vis: &Visibility) -> Result<c_int, BackendError> {
    c_int::try_from(vis.npol()).map_err(|_| BackendError::VisTooLarge {
        nvis: vis.nvis(),
        npol: vis.npol(),
    })
}

fn arl_vis(vis: &Visibility) -> Result<ArlVis, BackendError> {
    Ok(ArlVis {
        nvis: vis.nvis(),
        npol: arl_vis_npol(vis)?,
        data: vis.as_bytes().as_ptr() as *mut c_void,
    })
}

fn arl_vis_mut(vis: &mut Visibility) -> Result<ArlVis, BackendError> {
    Ok(ArlVis {
        nvis: vis.nvis(),
        npol: arl_vis_npol(vis)?,
        data: vis.as_bytes_mut().as_mut_ptr() as *mut c_void,
    })
}

/// Every wrapper routine reads at least the first element of its frequency
/// arrays.
fn require_non_empty(routine: &'static str, name: &str, values: &[f64]) -> Result<(), BackendError> {
    if values.is_empty() {
        return Err(BackendError::Routine {
            routine,
            message: format!("{name} must not be empty"),
        });
    }
    Ok(())
}

/// The ARL imaging routines, through `libarlffi`.
#[derive(Debug)]
pub struct ArlBackend {
    _private: (),
}

impl ArlBackend {
    /// Start the embedded interpreter if this is the first backend in the
    /// process, and return a handle to the routines.
    pub fn new() -> Self {
        ARL_INIT.call_once(|| {
            debug!("initialising libarlffi");
            unsafe { arl_initialize() };
        });
        Self { _private: () }
    }
}

impl Default for ArlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagingBackend for ArlBackend {
    fn image_shape(&mut self, freq: &[f64], cellsize: f64) -> Result<[usize; 4], BackendError> {
        require_non_empty("helper_get_image_shape", "freq", freq)?;
        trace!("helper_get_image_shape(cellsize={cellsize})");
        let mut c_shape = [0 as c_int; 4];
        unsafe { helper_get_image_shape(freq.as_ptr(), cellsize, c_shape.as_mut_ptr()) };
        let mut shape = [0_usize; 4];
        for (len, &c_len) in shape.iter_mut().zip(c_shape.iter()) {
            *len = usize::try_from(c_len).map_err(|_| BackendError::InvalidShape {
                shape: c_shape.iter().map(|&n| n as i64).collect(),
            })?;
        }
        Ok(shape)
    }

    fn create_visibility(
        &mut self,
        config_name: &str,
        times: &[f64],
        freq: &[f64],
        channel_bandwidth: &[f64],
        vis: &mut Visibility,
    ) -> Result<(), BackendError> {
        for (name, values) in [
            ("times", times),
            ("freq", freq),
            ("channel_bandwidth", channel_bandwidth),
        ] {
            require_non_empty("arl_create_visibility", name, values)?;
        }
        let c_config_name = CString::new(config_name)
            .map_err(|_| BackendError::InvalidConfigName(config_name.to_string()))?;
        let mut res_vis = arl_vis_mut(vis)?;
        trace!("arl_create_visibility({config_name})");
        unsafe {
            arl_create_visibility(
                c_config_name.as_ptr(),
                times.as_ptr(),
                freq.as_ptr(),
                channel_bandwidth.as_ptr(),
                &mut res_vis,
            );
        }
        Ok(())
    }

    fn create_test_image(
        &mut self,
        freq: &[f64],
        cellsize: f64,
        image: &mut Image,
    ) -> Result<(), BackendError> {
        require_non_empty("arl_create_test_image", "freq", freq)?;
        let mut res_img = arl_image_mut(image)?;
        trace!("arl_create_test_image(cellsize={cellsize})");
        unsafe { arl_create_test_image(freq.as_ptr(), cellsize, &mut res_img) };
        Ok(())
    }

    fn predict_2d(
        &mut self,
        vis_in: &Visibility,
        model: &Image,
        vis_out: &mut Visibility,
    ) -> Result<(), BackendError> {
        let c_vis_in = arl_vis(vis_in)?;
        let c_model = arl_image(model)?;
        let mut c_vis_out = arl_vis_mut(vis_out)?;
        trace!("arl_predict_2d");
        unsafe { arl_predict_2d(&c_vis_in, &c_model, &mut c_vis_out) };
        Ok(())
    }

    fn create_image_from_visibility(
        &mut self,
        vis: &Visibility,
        model: &mut Image,
    ) -> Result<(), BackendError> {
        let c_vis = arl_vis(vis)?;
        let mut c_model = arl_image_mut(model)?;
        trace!("arl_create_image_from_visibility");
        unsafe { arl_create_image_from_visibility(&c_vis, &mut c_model) };
        Ok(())
    }

    fn invert_2d(
        &mut self,
        vis: &Visibility,
        model: &Image,
        dopsf: bool,
        out: &mut Image,
    ) -> Result<f64, BackendError> {
        let c_vis = arl_vis(vis)?;
        let c_model = arl_image(model)?;
        let mut c_out = arl_image_mut(out)?;
        let mut sumwt = 0.0;
        trace!("arl_invert_2d(dopsf={dopsf})");
        unsafe { arl_invert_2d(&c_vis, &c_model, dopsf, &mut c_out, &mut sumwt) };
        Ok(sumwt)
    }

    fn deconvolve_cube(
        &mut self,
        dirty: &Image,
        psf: &Image,
        comp: &mut Image,
        residual: &mut Image,
    ) -> Result<(), BackendError> {
        let mut c_dirty = arl_image(dirty)?;
        let mut c_psf = arl_image(psf)?;
        let mut c_comp = arl_image_mut(comp)?;
        let mut c_residual = arl_image_mut(residual)?;
        trace!("arl_deconvolve_cube");
        unsafe { arl_deconvolve_cube(&mut c_dirty, &mut c_psf, &mut c_comp, &mut c_residual) };
        Ok(())
    }

    fn restore_cube(
        &mut self,
        comp: &Image,
        psf: &Image,
        residual: Option<&Image>,
        restored: &mut Image,
    ) -> Result<(), BackendError> {
        let mut c_comp = arl_image(comp)?;
        let mut c_psf = arl_image(psf)?;
        let mut c_residual = residual.map(arl_image).transpose()?;
        let mut c_restored = arl_image_mut(restored)?;
        let residual_ptr = c_residual
            .as_mut()
            .map_or(std::ptr::null_mut(), |r| r as *mut ArlImage);
        trace!("arl_restore_cube(residual={})", residual.is_some());
        unsafe { arl_restore_cube(&mut c_comp, &mut c_psf, residual_ptr, &mut c_restored) };
        Ok(())
    }
}
