use crate::{
    marlu::Complex,
    vis::VisRecord,
    BackendError, Image, ImagingBackend, Visibility,
};

/// The shape of every image handed out by [`RecordingBackend`].
pub const TEST_SHAPE: [usize; 4] = [1, 1, 4, 4];

/// An imaging backend which records each call, and fills its outputs with
/// values that identify where they came from.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    /// routine names, in call order
    pub calls: Vec<&'static str>,
    /// the `dopsf` argument of each `invert_2d` call
    pub dopsf: Vec<bool>,
    /// whether `create_image_from_visibility` saw the predicted visibilities
    pub imaged_predicted: Option<bool>,
    /// whether `restore_cube` was given a residual
    pub restored_with_residual: Option<bool>,
    /// a routine which should fail
    pub fail_on: Option<&'static str>,
}

impl RecordingBackend {
    pub fn failing_on(routine: &'static str) -> Self {
        Self {
            fail_on: Some(routine),
            ..Default::default()
        }
    }

    fn record(&mut self, routine: &'static str) -> Result<(), BackendError> {
        self.calls.push(routine);
        if self.fail_on == Some(routine) {
            return Err(BackendError::Routine {
                routine,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn fill(image: &mut Image, value: f64) {
    image.as_slice_mut().iter_mut().for_each(|x| *x = value);
}

impl ImagingBackend for RecordingBackend {
    fn image_shape(&mut self, _freq: &[f64], _cellsize: f64) -> Result<[usize; 4], BackendError> {
        self.record("image_shape")?;
        Ok(TEST_SHAPE)
    }

    fn create_visibility(
        &mut self,
        _config_name: &str,
        times: &[f64],
        freq: &[f64],
        channel_bandwidth: &[f64],
        vis: &mut Visibility,
    ) -> Result<(), BackendError> {
        self.record("create_visibility")?;
        let npol = vis.npol();
        let record = VisRecord {
            uvw: [1., 2., 3.],
            time: times[0],
            frequency: freq[0],
            channel_bandwidth: channel_bandwidth[0],
            vis: vec![Complex::new(0., 0.); npol],
            weight: vec![1.; npol],
            imaging_weight: vec![1.; npol],
            ..Default::default()
        };
        vis.write_record(0, &record).unwrap();
        Ok(())
    }

    fn create_test_image(
        &mut self,
        _freq: &[f64],
        _cellsize: f64,
        image: &mut Image,
    ) -> Result<(), BackendError> {
        self.record("create_test_image")?;
        fill(image, 1.);
        image.wcs_mut()[0] = b'T';
        Ok(())
    }

    fn predict_2d(
        &mut self,
        vis_in: &Visibility,
        _model: &Image,
        vis_out: &mut Visibility,
    ) -> Result<(), BackendError> {
        self.record("predict_2d")?;
        let mut record = vis_in.record(0).unwrap();
        record.vis.iter_mut().for_each(|v| *v = Complex::new(1., -1.));
        vis_out.write_record(0, &record).unwrap();
        Ok(())
    }

    fn create_image_from_visibility(
        &mut self,
        vis: &Visibility,
        model: &mut Image,
    ) -> Result<(), BackendError> {
        self.record("create_image_from_visibility")?;
        let record = vis.record(0).unwrap();
        self.imaged_predicted = Some(record.vis[0] == Complex::new(1., -1.) && record.uvw[0] == 1.);
        model.wcs_mut()[0] = b'M';
        Ok(())
    }

    fn invert_2d(
        &mut self,
        _vis: &Visibility,
        _model: &Image,
        dopsf: bool,
        out: &mut Image,
    ) -> Result<f64, BackendError> {
        self.record("invert_2d")?;
        self.dopsf.push(dopsf);
        fill(out, if dopsf { 3. } else { 2. });
        Ok(if dopsf { 20. } else { 10. })
    }

    fn deconvolve_cube(
        &mut self,
        dirty: &Image,
        _psf: &Image,
        comp: &mut Image,
        residual: &mut Image,
    ) -> Result<(), BackendError> {
        self.record("deconvolve_cube")?;
        for ((c, r), d) in comp
            .as_slice_mut()
            .iter_mut()
            .zip(residual.as_slice_mut().iter_mut())
            .zip(dirty.as_slice())
        {
            *c = d * 0.75;
            *r = d * 0.25;
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
        self.record("restore_cube")?;
        self.restored_with_residual = Some(residual.is_some());
        restored.as_slice_mut().copy_from_slice(comp.as_slice());
        if let Some(residual) = residual {
            for (x, r) in restored.as_slice_mut().iter_mut().zip(residual.as_slice()) {
                *x += r;
            }
        }
        Ok(())
    }
}
