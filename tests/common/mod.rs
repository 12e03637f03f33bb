use arl_pipeline::{
    marlu::{fitsio::FitsFile, Complex},
    BackendError, Image, ImagingBackend, VisRecord, Visibility,
};
use std::path::Path;

/// An angular extent, in radians, which sets the number of pixels on each
/// side of a synthetic image for a given cell size.
const FIELD_OF_VIEW: f64 = 0.016;

/// A deterministic stand-in for the imaging library. Images are small
/// gaussians, so the pipeline can run without an interpreter.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    pub num_calls: usize,
}

fn gaussian(image: &mut Image, amplitude: f64, sigma: f64) {
    let [_, _, ny, nx] = image.shape();
    let (cy, cx) = ((ny / 2) as f64, (nx / 2) as f64);
    for ((_, _, y, x), value) in image.data_mut().indexed_iter_mut() {
        let r2 = (y as f64 - cy).powi(2) + (x as f64 - cx).powi(2);
        *value = amplitude * (-r2 / (2. * sigma * sigma)).exp();
    }
}

impl ImagingBackend for SyntheticBackend {
    fn image_shape(&mut self, freq: &[f64], cellsize: f64) -> Result<[usize; 4], BackendError> {
        self.num_calls += 1;
        let npixel = (FIELD_OF_VIEW / cellsize).round() as usize;
        Ok([freq.len(), 1, npixel, npixel])
    }

    fn create_visibility(
        &mut self,
        _config_name: &str,
        times: &[f64],
        freq: &[f64],
        channel_bandwidth: &[f64],
        vis: &mut Visibility,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        let npol = vis.npol();
        for index in 0..vis.nvis() {
            let record = VisRecord {
                uvw: [index as f64, -(index as f64), 0.],
                time: times[index % times.len()],
                frequency: freq[index % freq.len()],
                channel_bandwidth: channel_bandwidth[index % channel_bandwidth.len()],
                integration_time: 1.,
                antenna1: 0,
                antenna2: index as i64 + 1,
                vis: vec![Complex::new(0., 0.); npol],
                weight: vec![1.; npol],
                imaging_weight: vec![1.; npol],
            };
            vis.write_record(index, &record).map_err(|e| BackendError::Routine {
                routine: "create_visibility",
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn create_test_image(
        &mut self,
        _freq: &[f64],
        _cellsize: f64,
        image: &mut Image,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        gaussian(image, 1., 3.);
        Ok(())
    }

    fn predict_2d(
        &mut self,
        vis_in: &Visibility,
        _model: &Image,
        vis_out: &mut Visibility,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        vis_out.as_bytes_mut().copy_from_slice(vis_in.as_bytes());
        Ok(())
    }

    fn create_image_from_visibility(
        &mut self,
        _vis: &Visibility,
        model: &mut Image,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        model.as_slice_mut().iter_mut().for_each(|x| *x = 0.);
        Ok(())
    }

    fn invert_2d(
        &mut self,
        vis: &Visibility,
        _model: &Image,
        dopsf: bool,
        out: &mut Image,
    ) -> Result<f64, BackendError> {
        self.num_calls += 1;
        if dopsf {
            gaussian(out, 1., 1.);
        } else {
            gaussian(out, 0.8, 3.);
        }
        Ok(vis.nvis() as f64)
    }

    fn deconvolve_cube(
        &mut self,
        dirty: &Image,
        _psf: &Image,
        comp: &mut Image,
        residual: &mut Image,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        for ((c, r), &d) in comp
            .as_slice_mut()
            .iter_mut()
            .zip(residual.as_slice_mut().iter_mut())
            .zip(dirty.as_slice())
        {
            (*c, *r) = if d > 0.1 { (d, 0.) } else { (0., d) };
        }
        Ok(())
    }

    fn restore_cube(
        &mut self,
        comp: &Image,
        _psf: &Image,
        residual: Option<&Image>,
        restored: &mut Image,
    ) -> Result<(), BackendError> {
        self.num_calls += 1;
        restored.as_slice_mut().copy_from_slice(comp.as_slice());
        if let Some(residual) = residual {
            for (x, r) in restored.as_slice_mut().iter_mut().zip(residual.as_slice()) {
                *x += r;
            }
        }
        Ok(())
    }
}

/// The `BITPIX` of the primary HDU at `path`.
pub fn get_bitpix<P: AsRef<Path>>(path: P) -> i64 {
    let mut fptr = FitsFile::open(path).unwrap();
    let hdu = fptr.primary_hdu().unwrap();
    hdu.read_key::<i64>(&mut fptr, "BITPIX").unwrap()
}
