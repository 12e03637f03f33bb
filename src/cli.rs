//! Command Line Interface helpers for arl_pipeline

use crate::{
    error::{
        CLIError::InvalidCommandLineArgument,
        PipelineError::{self, ClapError, DryRun},
    },
    ImagingBackend, PipelineContext, PipelineContextBuilder, PipelineReport,
};
use clap::{
    arg, command,
    ErrorKind::{ArgumentNotFound, DisplayHelp, DisplayVersion},
    ValueHint::DirPath,
};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use prettytable::{format as prettyformat, row, table, Table};
use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    time::Duration,
};

/// A pipeline context, parsed from the command line.
pub struct PipelineArgs {
    /// What to run
    pub context: PipelineContext,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write many info-level log lines of how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (GIT_HEAD_REF, GIT_COMMIT_HASH) {
        (Some(hr), Some(hash)) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                hash,
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        _ => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

impl Display for PipelineArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;
        fmt_build_info(f)?;
        write!(f, "{}", self.context)
    }
}

/// Reduce an optional clap value to `Ok(None)` when the argument is absent.
fn optional<T>(result: Result<T, clap::Error>) -> Result<Option<T>, PipelineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == ArgumentNotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl PipelineArgs {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, PipelineError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        command!()
            .next_line_help(false)
            .about("Simulate LOW visibilities of the M31 test image with the Algorithm Reference \
                    Library, image, deconvolve and restore them, and write the images to FITS.")
            .args(&[
                // simulation options
                arg!(--freq <HZ> "Frequencies of the simulated channels [default: 1e8]")
                    .help_heading("SIMULATION")
                    .multiple_values(true)
                    .required(false),
                arg!(--"channel-bandwidth" <HZ> "Bandwidth of each channel [default: 1e6]")
                    .help_heading("SIMULATION")
                    .multiple_values(true)
                    .required(false),
                arg!(--times <SECONDS> "Observation times [default: 0]")
                    .help_heading("SIMULATION")
                    .multiple_values(true)
                    .required(false),
                arg!(--config <NAME> "Telescope configuration [default: LOWBD2-CORE]")
                    .help_heading("SIMULATION")
                    .required(false),
                arg!(--nvis <COUNT> "Number of visibilities the configuration produces [default: 13695]")
                    .help_heading("SIMULATION")
                    .required(false),
                arg!(--npol <COUNT> "Number of polarisations [default: 1]")
                    .help_heading("SIMULATION")
                    .required(false),

                // imaging options
                arg!(--cellsize <RAD> "Image cell size in radians [default: 0.0005]")
                    .help_heading("IMAGING")
                    .required(false),

                // output options
                arg!(-o --"out-dir" <DIR> "Directory to write images to [default: results]")
                    .help_heading("OUTPUT")
                    .value_hint(DirPath)
                    .required(false),

                arg!(--"dry-run" "Just print the summary and exit"),
                arg!(--"no-draw-progress" "do not show progress bars"),
            ])
            .try_get_matches_from(args)
            .map_err(ClapError)
    }

    fn parse_context_matches(
        matches: &clap::ArgMatches,
    ) -> Result<PipelineContextBuilder, PipelineError> {
        let mut builder = PipelineContextBuilder::default();
        if let Some(freq) = optional(matches.values_of_t::<f64>("freq"))? {
            builder.freq(freq);
        }
        if let Some(channel_bandwidth) =
            optional(matches.values_of_t::<f64>("channel-bandwidth"))?
        {
            builder.channel_bandwidth(channel_bandwidth);
        }
        if let Some(times) = optional(matches.values_of_t::<f64>("times"))? {
            builder.times(times);
        }
        if let Some(config_name) = matches.value_of("config") {
            builder.config_name(config_name);
        }
        if let Some(nvis) = optional(matches.value_of_t::<usize>("nvis"))? {
            builder.nvis(nvis);
        }
        if let Some(npol) = optional(matches.value_of_t::<usize>("npol"))? {
            if npol == 0 {
                return Err(PipelineError::CLIError(InvalidCommandLineArgument {
                    option: "--npol <COUNT>".into(),
                    expected: "a positive, non-zero integer".into(),
                    received: format!("{}", npol),
                }));
            }
            builder.npol(npol);
        }
        if let Some(cellsize) = optional(matches.value_of_t::<f64>("cellsize"))? {
            if !(cellsize.is_finite() && cellsize > 0.) {
                return Err(PipelineError::CLIError(InvalidCommandLineArgument {
                    option: "--cellsize <RAD>".into(),
                    expected: "a positive number of radians".into(),
                    received: format!("{}", cellsize),
                }));
            }
            builder.cellsize(cellsize);
        }
        if let Some(out_dir) = matches.value_of("out-dir") {
            builder.out_dir(out_dir);
        }
        builder.draw_progress(!matches.is_present("no-draw-progress"));
        Ok(builder)
    }

    /// Parse an iterator of arguments, `args` into a `PipelineArgs`. The
    /// command line itself is kept as the history of every exported image.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - `PipelineError::CLIError` if the arguments are invalid.
    /// - `PipelineError::DryRun` if `--dry-run` was given, after the summary
    ///     has been logged.
    pub fn from_args<I, T>(args: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        let matches = Self::get_matches(args.clone())?;
        trace!("arg matches:\n{:?}", &matches);

        let mut builder = Self::parse_context_matches(&matches)?;

        let words: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        match shlex::try_join(words.iter().map(String::as_str)) {
            Ok(history) => {
                builder.history(history);
            }
            Err(e) => warn!("not recording command line in history: {e}"),
        }

        let context = builder
            .build()
            .map_err(|e| PipelineError::BadConfig(e.to_string()))?;

        if context.channel_bandwidth.len() != context.freq.len() {
            return Err(PipelineError::CLIError(InvalidCommandLineArgument {
                option: "--channel-bandwidth <HZ>...".into(),
                expected: format!("one bandwidth for each of {} frequencies", context.freq.len()),
                received: format!("{} bandwidths", context.channel_bandwidth.len()),
            }));
        }

        let result = Self { context };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Run the pipeline with `backend`.
    ///
    /// # Errors
    ///
    /// See [`PipelineContext::run`].
    pub fn run<B: ImagingBackend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<PipelineReport, PipelineError> {
        self.context.run(backend)
    }
}

/// A table of each output image and whether it was written.
pub fn report_table(report: &PipelineReport) -> Table {
    let mut export_table = table!(["image", "status"]);
    export_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
    for (path, result) in &report.exports {
        let status = match result {
            Ok(()) => "written".to_string(),
            Err(e) => format!("FAILED: {e}"),
        };
        export_table.add_row(row![path.display(), status]);
    }
    export_table
}

/// Parse `args`, then run the pipeline with the backend from `new_backend`,
/// returning a process exit code.
///
/// The backend is only created once the arguments are known to be good, so
/// `--help`, `--version` and `--dry-run` never touch the imaging library.
/// Images which couldn't be exported are reported, but don't change the exit
/// code.
pub fn main_with_backend<I, T, B, F>(args: I, new_backend: F) -> i32
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
    B: ImagingBackend,
    F: FnOnce() -> B,
{
    let pipeline_args = match PipelineArgs::from_args(args) {
        Ok(pipeline_args) => pipeline_args,
        Err(DryRun {}) => {
            info!("Dry run. No files will be written.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    let mut backend = new_backend();
    match pipeline_args.run(&mut backend) {
        Ok(report) => {
            info!(
                "total duration: {:?}",
                report
                    .durations
                    .iter()
                    .sorted_by(|(a, _), (b, _)| a.cmp(b))
                    .fold(Duration::ZERO, |duration_sum, (name, duration)| {
                        info!("{} duration: {:?}", name, duration);
                        duration_sum + *duration
                    })
            );
            info!(
                "dirty sumwt: {}, psf sumwt: {}",
                report.sumwt_dirty, report.sumwt_psf
            );
            info!("exports:\n{}", report_table(&report));
            let num_failed = report.failed_exports().count();
            if num_failed > 0 {
                warn!("{} of {} images were not written", num_failed, report.exports.len());
            }
            0
        }
        Err(e) => {
            eprintln!("imaging error: {e}");
            1
        }
    }
}

/// Parse `args` and run the pipeline with `libarlffi`, returning a process
/// exit code.
#[cfg(feature = "arl")]
pub fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    main_with_backend(args, crate::backend::arl::ArlBackend::new)
}
