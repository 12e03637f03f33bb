use approx::assert_abs_diff_eq;
use arl_pipeline::{
    cli::main_with_backend, read_fits_image, PipelineContextBuilder, PipelineError,
};
use glob::glob;
use std::path::PathBuf;
use tempfile::tempdir;

mod common;
use common::{get_bitpix, SyntheticBackend};

fn fits_files_in(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = glob(dir.join("*.fits").to_str().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    paths.sort();
    paths
}

#[test]
fn test_synthetic_pipeline_writes_five_images() {
    let tmp_dir = tempdir().unwrap();
    let out_dir = tmp_dir.path().join("results");

    let context = PipelineContextBuilder::default()
        .freq(vec![1e8])
        .cellsize(0.0005)
        .nvis(64)
        .out_dir(&out_dir)
        .draw_progress(false)
        .build()
        .unwrap();

    let mut backend = SyntheticBackend::default();
    let report = context.run(&mut backend).unwrap();
    assert_eq!(backend.num_calls, 9);
    assert_eq!(report.shape, [1, 1, 32, 32]);
    assert_abs_diff_eq!(report.sumwt_dirty, 64.);
    assert_abs_diff_eq!(report.sumwt_psf, 64.);

    let names: Vec<_> = fits_files_in(&out_dir)
        .iter()
        .map(|path| path.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "dirty.fits",
            "m31image.fits",
            "psf.fits",
            "residual.fits",
            "restored.fits"
        ]
    );

    for path in fits_files_in(&out_dir) {
        assert_eq!(get_bitpix(&path), -64);
        let (axes, data) = read_fits_image(&path, 0).unwrap();
        assert_eq!(axes, vec![32, 32, 1, 1]);
        assert_eq!(data.len(), 32 * 32);
    }

    // the test image peaks in the centre pixel
    let (_, m31) = read_fits_image(out_dir.join("m31image.fits"), 0).unwrap();
    assert_abs_diff_eq!(m31[16 * 32 + 16], 1.);

    // restoring adds the residual back
    let (_, dirty) = read_fits_image(out_dir.join("dirty.fits"), 0).unwrap();
    let (_, restored) = read_fits_image(out_dir.join("restored.fits"), 0).unwrap();
    for (d, r) in dirty.iter().zip(restored.iter()) {
        assert_abs_diff_eq!(d, r, epsilon = 1e-12);
    }

    for name in ["shape", "predict", "invert", "deconvolve", "restore", "write"] {
        assert!(report.durations.contains_key(name), "no duration for {name}");
    }
}

#[test]
fn test_synthetic_pipeline_into_existing_dir() {
    let tmp_dir = tempdir().unwrap();
    let out_dir = tmp_dir.path().to_path_buf();
    std::fs::write(out_dir.join("notes.txt"), "not an image").unwrap();

    let context = PipelineContextBuilder::default()
        .nvis(16)
        .out_dir(&out_dir)
        .draw_progress(false)
        .build()
        .unwrap();
    let report = context.run(&mut SyntheticBackend::default()).unwrap();

    assert_eq!(report.failed_exports().count(), 0);
    assert_eq!(fits_files_in(&out_dir).len(), 5);
    assert!(out_dir.join("notes.txt").is_file());
}

#[test]
fn test_failed_export_does_not_block_later_ones() {
    let tmp_dir = tempdir().unwrap();
    let out_dir = tmp_dir.path().join("results");
    std::fs::create_dir(&out_dir).unwrap();
    // not a fits file, so it can't be appended to
    std::fs::write(out_dir.join("m31image.fits"), "garbage").unwrap();

    let context = PipelineContextBuilder::default()
        .nvis(16)
        .out_dir(&out_dir)
        .draw_progress(false)
        .build()
        .unwrap();
    let report = context.run(&mut SyntheticBackend::default()).unwrap();

    let failed: Vec<_> = report.failed_exports().collect();
    assert_eq!(failed, vec![out_dir.join("m31image.fits").as_path()]);
    assert_eq!(
        std::fs::read_to_string(out_dir.join("m31image.fits")).unwrap(),
        "garbage"
    );
    for name in ["dirty", "psf", "residual", "restored"] {
        let (axes, _) = read_fits_image(out_dir.join(format!("{name}.fits")), 0).unwrap();
        assert_eq!(axes, vec![32, 32, 1, 1]);
    }
}

#[test]
fn test_rerun_appends_hdus() {
    let tmp_dir = tempdir().unwrap();
    let out_dir = tmp_dir.path().join("results");
    let context = PipelineContextBuilder::default()
        .nvis(16)
        .out_dir(&out_dir)
        .draw_progress(false)
        .build()
        .unwrap();

    context.run(&mut SyntheticBackend::default()).unwrap();
    context.run(&mut SyntheticBackend::default()).unwrap();

    for path in fits_files_in(&out_dir) {
        let (first, _) = read_fits_image(&path, 0).unwrap();
        let (second, _) = read_fits_image(&path, 1).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_mismatched_channels_rejected() {
    let context = PipelineContextBuilder::default()
        .freq(vec![1e8, 1.2e8])
        .draw_progress(false)
        .build()
        .unwrap();
    assert!(matches!(
        context.run(&mut SyntheticBackend::default()),
        Err(PipelineError::BadConfig(_))
    ));
}

#[test]
fn test_main_with_synthetic_backend() {
    let tmp_dir = tempdir().unwrap();
    let out_dir = tmp_dir.path().join("results");

    #[rustfmt::skip]
    let args = [
        "arl_pipeline",
        "--freq", "1e8", "1.1e8",
        "--channel-bandwidth", "1e6", "1e6",
        "--cellsize", "0.001",
        "--nvis", "32",
        "--no-draw-progress",
        "-o", out_dir.to_str().unwrap(),
    ];
    assert_eq!(main_with_backend(args, SyntheticBackend::default), 0);

    let paths = fits_files_in(&out_dir);
    assert_eq!(paths.len(), 5);
    for path in paths {
        let (axes, _) = read_fits_image(&path, 0).unwrap();
        assert_eq!(axes, vec![16, 16, 1, 2]);
    }
}
