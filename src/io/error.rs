//! Errors that can occur in the io module

use std::path::PathBuf;
use thiserror::Error;

use crate::marlu::fitsio;

#[derive(Error, Debug)]
#[allow(clippy::upper_case_acronyms)]
/// All the errors that can occur in file io operations
pub enum IOError {
    /// A path which can't be handed to cfitsio.
    #[error("{source_file}:{source_line}\nInvalid fits path {path:?}")]
    InvalidPath {
        /// The offending path
        path: PathBuf,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// An image with an axis longer than a fits axis can describe.
    #[error("{source_file}:{source_line}\nCan't write {fits_filename}, shape {shape:?} is too large for fits")]
    ShapeTooLarge {
        /// The shape of the image
        shape: [usize; 4],
        /// The filename of the fits file
        fits_filename: String,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A non-zero cfitsio status at the end of a chain of cfitsio calls.
    #[error("{source_file}:{source_line}\ncfitsio status {status} ({status_text}) writing {fits_filename}")]
    FitsStatus {
        /// The cfitsio status code
        status: i32,
        /// The short description of `status` from cfitsio
        status_text: String,
        /// Every message that was on the cfitsio error stack
        messages: Vec<String>,
        /// The filename of the fits file
        fits_filename: String,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// Error when opening a fits file.
    #[error("{source_file}:{source_line}\nCouldn't open {fits_filename}: {fits_error}")]
    FitsOpen {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file
        fits_filename: String,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A generic error associated with the fitsio crate.
    #[error("{source_file}:{source_line}\n{fits_filename} HDU {hdu_num}: {fits_error}")]
    FitsIO {
        /// The [`fitsio::errors::Error`]
        fits_error: fitsio::errors::Error,
        /// The filename of the fits file where the error occurred
        fits_filename: String,
        /// The hdu number in the fits file where the error occurred
        hdu_num: usize,
        /// The file where the error originated (usually `file!()`)
        source_file: &'static str,
        /// The line number where the error originated (usually `line!()`)
        source_line: u32,
    },

    /// A HDU which is expected to be an image, but isn't.
    #[error("{fits_filename} HDU {hdu_num} is not an image")]
    NotImage {
        /// The filename of the fits file
        fits_filename: String,
        /// The hdu number
        hdu_num: usize,
    },
}

impl IOError {
    /// The cfitsio status code behind this error, 0 if it didn't come from
    /// cfitsio.
    pub fn fits_status(&self) -> i32 {
        match self {
            Self::FitsStatus { status, .. } => *status,
            Self::FitsOpen { fits_error, .. } | Self::FitsIO { fits_error, .. } => {
                match fits_error {
                    fitsio::errors::Error::Fits(e) => e.status,
                    _ => 0,
                }
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IOError;
    use crate::read_fits_image;
    use tempfile::tempdir;

    #[test]
    fn test_fits_status_of_open_error() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("garbage.fits");
        std::fs::write(&path, b"this is not a fits file").unwrap();
        let err = read_fits_image(&path, 0).unwrap_err();
        assert!(matches!(err, IOError::FitsOpen { .. }));
        assert_ne!(err.fits_status(), 0);
    }

    #[test]
    fn test_fits_status_without_cfitsio() {
        let err = IOError::NotImage {
            fits_filename: "image.fits".into(),
            hdu_num: 1,
        };
        assert_eq!(err.fits_status(), 0);
        let err = IOError::InvalidPath {
            path: "nul\0byte.fits".into(),
            source_file: file!(),
            source_line: line!(),
        };
        assert_eq!(err.fits_status(), 0);
    }
}
