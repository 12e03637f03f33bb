//! Export [`Image`]s as double precision FITS images.

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_int, c_long, c_void},
    path::Path,
};

use cfg_if::cfg_if;
use log::{error, trace};

use super::error::IOError;
use crate::{
    marlu::{
        fitsio::{hdu::HduInfo, FitsFile},
        fitsio_sys,
    },
    Image,
};

/// The number of axes in every image this module writes.
const NAXIS: c_int = 4;

/// Size of the buffers cfitsio fills with status text and error messages.
const FLEN_STATUS: usize = 31;
const FLEN_ERRMSG: usize = 81;

cfg_if! {
    if #[cfg(unix)] {
        /// The raw bytes of `path` for cfitsio, `None` if it holds a NUL.
        fn path_to_cstring(path: &Path) -> Option<CString> {
            use std::os::unix::ffi::OsStrExt;
            CString::new(path.as_os_str().as_bytes()).ok()
        }
    } else {
        /// `path` for cfitsio, `None` if it isn't unicode or holds a NUL.
        fn path_to_cstring(path: &Path) -> Option<CString> {
            path.to_str().and_then(|p| CString::new(p).ok())
        }
    }
}

/// Pop every message off cfitsio's error stack, oldest first.
fn drain_fits_messages() -> Vec<String> {
    let mut messages = Vec::new();
    loop {
        let mut buf = [0 as c_char; FLEN_ERRMSG];
        // ffgmsg = fits_read_errmsg
        unsafe {
            fitsio_sys::ffgmsg(buf.as_mut_ptr());
        }
        if buf[0] == 0 {
            break;
        }
        let message = unsafe { CStr::from_ptr(buf.as_ptr()) };
        messages.push(message.to_string_lossy().trim_end().to_string());
    }
    messages
}

/// The short cfitsio description of a status code.
fn fits_status_text(status: c_int) -> String {
    let mut buf = [0 as c_char; FLEN_STATUS];
    // ffgerr = fits_get_errstatus
    unsafe {
        fitsio_sys::ffgerr(status, buf.as_mut_ptr());
        CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
    }
}

/// Log a non-zero cfitsio status along with the whole error stack, and turn it
/// into an [`IOError::FitsStatus`].
fn report_fits_status(status: c_int, fits_filename: &str, source_line: u32) -> IOError {
    let status_text = fits_status_text(status);
    let messages = drain_fits_messages();
    error!("cfitsio status {status} ({status_text}) writing {fits_filename}");
    for message in &messages {
        error!("  {message}");
    }
    IOError::FitsStatus {
        status,
        status_text,
        messages,
        fits_filename: fits_filename.to_string(),
        source_file: file!(),
        source_line,
    }
}

/// Write the data of `image` to `path` as a 4-axis double precision image.
///
/// FITS axes run fastest first, so `NAXIS1..NAXIS4` are the image shape
/// reversed: `[x, y, polarisation, frequency]`.
///
/// If `path` does not exist, a new file is created and the image becomes its
/// primary array. If it does exist, it is opened for writing and the image is
/// appended as a new IMAGE extension, leaving the existing HDUs alone.
///
/// Every cfitsio step shares one status. Once a step fails, cfitsio skips the
/// rest, but the file is still closed if it was opened. A non-zero status is
/// logged with every message from the cfitsio error stack before it is
/// returned.
///
/// `history`, if given, is written as a `HISTORY` card.
///
/// # Examples
///
/// ```rust
/// use arl_pipeline::{export_image_to_fits, Image};
/// use tempfile::tempdir;
///
/// let tmp_dir = tempdir().unwrap();
/// let mut image = Image::new([1, 1, 2, 2]).unwrap();
/// image.as_slice_mut().copy_from_slice(&[1., 2., 3., 4.]);
/// export_image_to_fits(&image, tmp_dir.path().join("image.fits"), None).unwrap();
/// ```
///
/// # Errors
///
/// Will return [`IOError::InvalidPath`] if `path` can't be given to cfitsio,
/// [`IOError::ShapeTooLarge`] if an axis doesn't fit a C `long`, and
/// [`IOError::FitsStatus`] if any cfitsio step failed.
pub fn export_image_to_fits<P: AsRef<Path>>(
    image: &Image,
    path: P,
    history: Option<&str>,
) -> Result<(), IOError> {
    let path = path.as_ref();
    let fits_filename = path.display().to_string();
    let invalid_path = || IOError::InvalidPath {
        path: path.to_path_buf(),
        source_file: file!(),
        source_line: line!(),
    };
    let c_path = path_to_cstring(path).ok_or_else(invalid_path)?;
    let c_history = history
        .map(|h| CString::new(h).map_err(|_| invalid_path()))
        .transpose()?;
    let c_comment = CString::new(format!(
        "Created by {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ))
    .map_err(|_| invalid_path())?;

    let shape = image.shape();
    let mut naxes: [c_long; 4] = [0; 4];
    for (naxis, &len) in naxes.iter_mut().zip(shape.iter().rev()) {
        *naxis = c_long::try_from(len).map_err(|_| IOError::ShapeTooLarge {
            shape,
            fits_filename: fits_filename.clone(),
            source_file: file!(),
            source_line: line!(),
        })?;
    }
    let num_elements = image.size() as i64;

    let mut status = 0;
    let mut exists = 0;
    let mut fptr: *mut fitsio_sys::fitsfile = std::ptr::null_mut();

    trace!("checking whether {} exists", fits_filename);
    unsafe {
        // ffexist = fits_file_exists
        fitsio_sys::ffexist(
            c_path.as_ptr(), /* I - input filename or URL            */
            &mut exists,     /* O -  2 = a compressed version exists */
            &mut status,     /* IO - error status                    */
        );
    }

    if exists != 0 {
        trace!("opening existing fits file {}", fits_filename);
        unsafe {
            // ffopen = fits_open_file
            fitsio_sys::ffopen(
                &mut fptr,       /* O - FITS file pointer                   */
                c_path.as_ptr(), /* I - full name of file to open           */
                1,               /* I - 0 = open readonly; 1 = read/write   */
                &mut status,     /* IO - error status                       */
            );
        }
    } else {
        trace!("creating fits file {}", fits_filename);
        unsafe {
            // ffinit = fits_create_file
            fitsio_sys::ffinit(
                &mut fptr,       /* O - FITS file pointer                   */
                c_path.as_ptr(), /* I - name of file to create              */
                &mut status,     /* IO - error status                       */
            );
        }
    }

    if !fptr.is_null() {
        // -64 means DOUBLE_IMG.
        trace!("creating {:?} double image in {}", naxes, fits_filename);
        unsafe {
            // ffcrim = fits_create_img
            fitsio_sys::ffcrim(
                fptr,               /* I - FITS file pointer           */
                -64,                /* I - bits per pixel              */
                NAXIS,              /* I - number of axes in the array */
                naxes.as_mut_ptr(), /* I - size of each axis           */
                &mut status,        /* IO - error status               */
            );
        }

        if num_elements > 0 {
            trace!("writing {} pixels to {}", num_elements, fits_filename);
            // cfitsio copies out of the array before byte-swapping, it is
            // never written through.
            let pixels = image.as_slice().as_ptr() as *mut c_void;
            unsafe {
                // ffppr = fits_write_img
                fitsio_sys::ffppr(
                    fptr,                         /* I - FITS file pointer                       */
                    fitsio_sys::TDOUBLE as c_int, /* I - datatype of the array                   */
                    1,                            /* I - first vector element to write (1 = 1st) */
                    num_elements,                 /* I - number of values to write               */
                    pixels,                       /* I - array of values that are written        */
                    &mut status,                  /* IO - error status                           */
                );
            }
        }

        unsafe {
            // ffpcom = fits_write_comment
            fitsio_sys::ffpcom(
                fptr,               /* I - FITS file pointer   */
                c_comment.as_ptr(), /* I - comment string      */
                &mut status,        /* IO - error status       */
            );
        }
        if let Some(c_history) = c_history.as_ref() {
            unsafe {
                // ffphis = fits_write_history
                fitsio_sys::ffphis(
                    fptr,               /* I - FITS file pointer  */
                    c_history.as_ptr(), /* I - history string     */
                    &mut status,        /* IO - error status      */
                );
            }
        }

        // cfitsio closes the file even when status is already non-zero.
        trace!("closing fits file {}", fits_filename);
        unsafe {
            // ffclos = fits_close_file
            fitsio_sys::ffclos(fptr, &mut status);
        }
    }

    match status {
        0 => Ok(()),
        status => Err(report_fits_status(status, &fits_filename, line!())),
    }
}

/// Read the image in HDU `hdu_num` (0-indexed) of the fits file at `path`.
///
/// Returns the axis lengths in FITS order (`NAXIS1` first) and the pixel
/// values in file order.
///
/// # Errors
///
/// Will return [`IOError::FitsOpen`] if the file can't be opened,
/// [`IOError::NotImage`] if the HDU isn't an image, and [`IOError::FitsIO`] for
/// any other fitsio failure.
pub fn read_fits_image<P: AsRef<Path>>(
    path: P,
    hdu_num: usize,
) -> Result<(Vec<usize>, Vec<f64>), IOError> {
    let fits_filename = path.as_ref().display().to_string();
    let mut fptr = FitsFile::open(path.as_ref()).map_err(|fits_error| IOError::FitsOpen {
        fits_error,
        fits_filename: fits_filename.clone(),
        source_file: file!(),
        source_line: line!(),
    })?;
    let fits_io = |fits_error| IOError::FitsIO {
        fits_error,
        fits_filename: fits_filename.clone(),
        hdu_num,
        source_file: file!(),
        source_line: line!(),
    };
    let hdu = fptr.hdu(hdu_num).map_err(fits_io)?;
    if !matches!(hdu.info, HduInfo::ImageInfo { .. }) {
        return Err(IOError::NotImage {
            fits_filename: fits_filename.clone(),
            hdu_num,
        });
    }

    let naxis: i64 = hdu.read_key(&mut fptr, "NAXIS").map_err(fits_io)?;
    let mut axes = Vec::with_capacity(naxis.max(0) as usize);
    for i in 1..=naxis {
        let len: i64 = hdu
            .read_key(&mut fptr, &format!("NAXIS{i}"))
            .map_err(fits_io)?;
        axes.push(len.max(0) as usize);
    }
    let data: Vec<f64> = if axes.iter().product::<usize>() == 0 {
        vec![]
    } else {
        hdu.read_image(&mut fptr).map_err(fits_io)?
    };
    Ok((axes, data))
}
