//! Input and Ouput data file format modules

pub mod error;
pub mod fits;

use std::path::Path;

use log::{debug, warn};

pub use self::fits::{export_image_to_fits, read_fits_image};

/// Permissions of a newly created output directory: `rwxr-xr-x`.
pub const OUTPUT_DIR_MODE: u32 = 0o755;

/// Create the directory at `path` to hold output files.
///
/// On unix the directory is created with [`OUTPUT_DIR_MODE`] (before the
/// umask). A directory that already exists is fine. Any other failure is
/// logged and returned, the caller decides whether it matters.
///
/// # Errors
///
/// Will return the [`std::io::Error`] from creating the directory, unless it
/// only says that the directory already exists.
pub fn create_output_dir<P: AsRef<Path>>(path: P) -> Result<(), std::io::Error> {
    let path = path.as_ref();
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(OUTPUT_DIR_MODE);
    }
    match builder.create(path) {
        Ok(()) => {
            debug!("created output directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => {
            debug!("output directory {} already exists", path.display());
            Ok(())
        }
        Err(e) => {
            warn!("couldn't create output directory {}: {}", path.display(), e);
            Err(e)
        }
    }
}
