//! The fixed simulate, image, deconvolve and restore sequence.
use crate::{
    create_output_dir, export_image_to_fits, io::error::IOError, with_increment_duration, Image,
    ImagingBackend, PipelineError, Visibility,
};
use derive_builder::Builder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

/// Frequency of the single default channel, in Hz.
pub const DEFAULT_FREQ: f64 = 1e8;
/// Bandwidth of the single default channel, in Hz.
pub const DEFAULT_CHANNEL_BANDWIDTH: f64 = 1e6;
/// Image cell size, in radians.
pub const DEFAULT_CELLSIZE: f64 = 0.0005;
/// Telescope configuration to simulate.
pub const DEFAULT_CONFIG_NAME: &str = "LOWBD2-CORE";
/// The number of visibilities LOWBD2-CORE produces for a single time and
/// channel.
pub const DEFAULT_NVIS: usize = 13695;
/// Number of polarisations.
pub const DEFAULT_NPOL: usize = 1;
/// Where the images are written.
pub const DEFAULT_OUT_DIR: &str = "results";

/// The images which are exported, in order. Each is written to
/// `<name>.fits` in the output directory.
pub const OUTPUT_NAMES: [&str; 5] = ["m31image", "dirty", "psf", "residual", "restored"];

// backend steps, output directory, exports
const NUM_STEPS: u64 = 9 + 1 + OUTPUT_NAMES.len() as u64;

/// Options for a pipeline run
///
/// Anything not given to the builder takes its value from
/// [`PipelineContext::default`].
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(default)]
pub struct PipelineContext {
    /// Channel frequencies in Hz
    pub freq: Vec<f64>,
    /// Channel bandwidths in Hz, one for each frequency
    pub channel_bandwidth: Vec<f64>,
    /// Observation times in seconds
    pub times: Vec<f64>,
    /// Image cell size in radians
    pub cellsize: f64,
    /// Name of the telescope configuration
    #[builder(setter(into))]
    pub config_name: String,
    /// Number of visibilities to allocate
    pub nvis: usize,
    /// Number of polarisations to allocate
    pub npol: usize,
    /// Directory to write images to
    #[builder(setter(into))]
    pub out_dir: PathBuf,
    /// Whether to draw progress bars
    pub draw_progress: bool,
    /// A HISTORY card for every exported image
    #[builder(setter(into, strip_option))]
    pub history: Option<String>,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self {
            freq: vec![DEFAULT_FREQ],
            channel_bandwidth: vec![DEFAULT_CHANNEL_BANDWIDTH],
            times: vec![0.0],
            cellsize: DEFAULT_CELLSIZE,
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            nvis: DEFAULT_NVIS,
            npol: DEFAULT_NPOL,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            draw_progress: true,
            history: None,
        }
    }
}

impl Display for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Will simulate {} visibilities of {} polarisations with the {} configuration.",
            self.nvis, self.npol, self.config_name
        )?;
        writeln!(
            f,
            "Frequencies (Hz): [{}], bandwidths (Hz): [{}], times (s): [{}].",
            self.freq.iter().join(", "),
            self.channel_bandwidth.iter().join(", "),
            self.times.iter().join(", ")
        )?;
        writeln!(f, "Will image with a cell size of {} rad.", self.cellsize)?;
        writeln!(
            f,
            "Will write {} to {}.",
            OUTPUT_NAMES.iter().map(|name| format!("{name}.fits")).join(", "),
            self.out_dir.display()
        )?;
        writeln!(
            f,
            "{} draw progress.",
            if self.draw_progress {
                "Will"
            } else {
                "Will not"
            }
        )?;
        Ok(())
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct PipelineReport {
    /// The shape of every image
    pub shape: [usize; 4],
    /// Sum of weights of the dirty image
    pub sumwt_dirty: f64,
    /// Sum of weights of the point spread function
    pub sumwt_psf: f64,
    /// Each output path, with the result of exporting to it
    pub exports: Vec<(PathBuf, Result<(), IOError>)>,
    /// Time spent in each step of this run
    pub durations: HashMap<String, Duration>,
}

impl PipelineReport {
    /// The paths which could not be written.
    pub fn failed_exports(&self) -> impl Iterator<Item = &Path> {
        self.exports
            .iter()
            .filter(|(_, result)| result.is_err())
            .map(|(path, _)| path.as_path())
    }
}

impl PipelineContext {
    /// Check that the channel description is consistent.
    ///
    /// # Errors
    ///
    /// Will return [`PipelineError::BadConfig`] if `freq` or `times` is empty,
    /// if there isn't one bandwidth per frequency, or if `cellsize` is not a
    /// positive number.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.freq.is_empty() {
            return Err(PipelineError::BadConfig("no frequencies given".into()));
        }
        if self.channel_bandwidth.len() != self.freq.len() {
            return Err(PipelineError::BadConfig(format!(
                "{} channel bandwidths given for {} frequencies",
                self.channel_bandwidth.len(),
                self.freq.len()
            )));
        }
        if self.times.is_empty() {
            return Err(PipelineError::BadConfig("no times given".into()));
        }
        if !(self.cellsize.is_finite() && self.cellsize > 0.) {
            return Err(PipelineError::BadConfig(format!(
                "cellsize must be positive, not {}",
                self.cellsize
            )));
        }
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        let draw_target = if self.draw_progress {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let progress = ProgressBar::with_draw_target(Some(NUM_STEPS), draw_target);
        match ProgressStyle::default_bar()
            .template("{msg:28}: [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:2}/{len:2}")
        {
            Ok(style) => progress.set_style(style.progress_chars("=> ")),
            Err(e) => warn!("bad progress template: {e}"),
        }
        progress
    }

    /// Run the whole imaging sequence with `backend`, then export the images
    /// to [`PipelineContext::out_dir`].
    ///
    /// # Errors
    ///
    /// Will return [`PipelineError::BadConfig`] if the context is invalid, an
    /// allocation error if a buffer can't be allocated, or
    /// [`PipelineError::Backend`] if any backend routine fails. Export
    /// failures are not errors, they are listed in the [`PipelineReport`].
    pub fn run<B: ImagingBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<PipelineReport, PipelineError> {
        self.validate()?;
        let progress = self.progress_bar();
        let mut durations = HashMap::<String, Duration>::new();

        progress.set_message("image shape");
        let shape = with_increment_duration!(
            durations,
            "shape",
            backend.image_shape(&self.freq, self.cellsize)
        )?;
        debug!("image shape {:?}", shape);
        progress.inc(1);

        let alloc = |name: &'static str| {
            trace!("allocating {} image", name);
            Image::new(shape).map_err(|source| PipelineError::ImageAlloc { name, source })
        };
        let mut model = alloc("model")?;
        let mut m31image = alloc("m31image")?;
        let mut dirty = alloc("dirty")?;
        let mut psf = alloc("psf")?;
        let mut comp = alloc("comp")?;
        let mut residual = alloc("residual")?;
        let mut restored = alloc("restored")?;

        debug!("allocating 2 x {} visibilities of {} pols", self.nvis, self.npol);
        let mut vt = Visibility::new(self.nvis, self.npol)?;
        let mut vtmp = Visibility::new(self.nvis, self.npol)?;

        progress.set_message("simulating visibilities");
        with_increment_duration!(
            durations,
            "create_visibility",
            backend.create_visibility(
                &self.config_name,
                &self.times,
                &self.freq,
                &self.channel_bandwidth,
                &mut vt,
            )
        )?;
        progress.inc(1);

        progress.set_message("creating test image");
        with_increment_duration!(
            durations,
            "create_test_image",
            backend.create_test_image(&self.freq, self.cellsize, &mut m31image)
        )?;
        progress.inc(1);

        progress.set_message("predicting");
        with_increment_duration!(
            durations,
            "predict",
            backend.predict_2d(&vt, &m31image, &mut vtmp)
        )?;
        // the predicted visibilities replace the simulated ones
        drop(vt);
        let vt = vtmp;
        progress.inc(1);

        progress.set_message("creating model image");
        with_increment_duration!(
            durations,
            "create_image",
            backend.create_image_from_visibility(&vt, &mut model)
        )?;
        progress.inc(1);

        progress.set_message("inverting dirty image");
        let sumwt_dirty = with_increment_duration!(
            durations,
            "invert",
            backend.invert_2d(&vt, &model, false, &mut dirty)
        )?;
        debug!("dirty sumwt {}", sumwt_dirty);
        progress.inc(1);

        progress.set_message("inverting psf");
        let sumwt_psf = with_increment_duration!(
            durations,
            "invert",
            backend.invert_2d(&vt, &model, true, &mut psf)
        )?;
        debug!("psf sumwt {}", sumwt_psf);
        progress.inc(1);

        progress.set_message("deconvolving");
        with_increment_duration!(
            durations,
            "deconvolve",
            backend.deconvolve_cube(&dirty, &psf, &mut comp, &mut residual)
        )?;
        progress.inc(1);

        progress.set_message("restoring");
        with_increment_duration!(
            durations,
            "restore",
            backend.restore_cube(&comp, &psf, Some(&residual), &mut restored)
        )?;
        progress.inc(1);
        drop(vt);

        progress.set_message("creating output directory");
        // exports into a missing directory fail on their own
        let _ = create_output_dir(&self.out_dir);
        progress.inc(1);

        let exports = OUTPUT_NAMES
            .iter()
            .zip([&m31image, &dirty, &psf, &residual, &restored])
            .map(|(name, image)| {
                progress.set_message(format!("writing {name}"));
                let path = self.out_dir.join(format!("{name}.fits"));
                let result = with_increment_duration!(
                    durations,
                    "write",
                    export_image_to_fits(image, &path, self.history.as_deref())
                );
                match &result {
                    Ok(()) => info!("wrote {}", path.display()),
                    Err(e) => warn!("couldn't write {}: {}", path.display(), e),
                }
                progress.inc(1);
                (path, result)
            })
            .collect();

        progress.finish_with_message("done");

        Ok(PipelineReport {
            shape,
            sumwt_dirty,
            sumwt_psf,
            exports,
            durations,
        })
    }
}
