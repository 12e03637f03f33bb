//! Visibility buffers, as exchanged with the imaging library.
//!
//! The library treats a visibility set as one flat byte buffer of fixed-size,
//! big-endian records. This crate never interprets the records during a
//! pipeline run, but [`Visibility::record`] and [`Visibility::write_record`]
//! decode and encode them for inspection and testing.

use crate::marlu::Complex;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::trace;
use std::io::Cursor;
use thiserror::Error;

/// Bytes per record shared by all polarisations: uvw (3), time, frequency,
/// channel bandwidth and integration time as `f64`, then antenna1 and antenna2
/// as `i64`.
pub const VIS_RECORD_BYTES: usize = 72;

/// Bytes per record per polarisation: a `Complex<f64>` visibility, a weight and
/// an imaging weight.
pub const VIS_POL_BYTES: usize = 32;

/// The size in bytes of the buffer holding `nvis` records of `npol`
/// polarisations, or `None` on overflow.
///
/// # Examples
///
/// ```rust
/// use arl_pipeline::vis_data_size;
///
/// assert_eq!(vis_data_size(13695, 1), Some(104 * 13695));
/// ```
pub fn vis_data_size(nvis: usize, npol: usize) -> Option<usize> {
    VIS_POL_BYTES
        .checked_mul(npol)?
        .checked_add(VIS_RECORD_BYTES)?
        .checked_mul(nvis)
}

#[derive(Error, Debug)]
/// Errors that can occur while allocating or accessing a [`Visibility`]
pub enum VisError {
    /// The buffer size does not fit in a `usize`.
    #[error("{nvis} visibilities of {npol} polarisations is too large")]
    SizeOverflow {
        /// number of visibilities requested
        nvis: usize,
        /// number of polarisations requested
        npol: usize,
    },

    /// The allocator could not provide a buffer.
    #[error("could not allocate {bytes} bytes for visibilities")]
    Allocation {
        /// The number of bytes requested
        bytes: usize,
    },

    /// A record index past the end of the buffer.
    #[error("visibility record {index} is out of range (nvis={nvis})")]
    RecordOutOfRange {
        /// the index requested
        index: usize,
        /// number of visibilities in the buffer
        nvis: usize,
    },

    /// A record whose per-polarisation vectors don't match the buffer.
    #[error("visibility record has {found} polarisations, expected {expected}")]
    PolarisationMismatch {
        /// number of polarisations in the buffer
        expected: usize,
        /// number of polarisations in the record
        found: usize,
    },
}

/// A single decoded visibility record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisRecord {
    /// baseline coordinates in metres
    pub uvw: [f64; 3],
    /// time
    pub time: f64,
    /// frequency in Hz
    pub frequency: f64,
    /// channel bandwidth in Hz
    pub channel_bandwidth: f64,
    /// integration time in seconds
    pub integration_time: f64,
    /// index of the first antenna
    pub antenna1: i64,
    /// index of the second antenna
    pub antenna2: i64,
    /// visibility for each polarisation
    pub vis: Vec<Complex<f64>>,
    /// weight for each polarisation
    pub weight: Vec<f64>,
    /// imaging weight for each polarisation
    pub imaging_weight: Vec<f64>,
}

/// An owned visibility set: `nvis` records of `npol` polarisations.
#[derive(Debug, Clone, PartialEq)]
pub struct Visibility {
    nvis: usize,
    npol: usize,
    data: Vec<u8>,
}

impl Visibility {
    /// Allocate a zeroed visibility buffer sized by [`vis_data_size`].
    ///
    /// # Errors
    ///
    /// Will return [`VisError::SizeOverflow`] if the buffer size overflows, or
    /// [`VisError::Allocation`] if the allocation fails.
    pub fn new(nvis: usize, npol: usize) -> Result<Self, VisError> {
        let bytes = vis_data_size(nvis, npol).ok_or(VisError::SizeOverflow { nvis, npol })?;
        trace!("allocating {} bytes for {}x{} visibilities", bytes, nvis, npol);
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| VisError::Allocation { bytes })?;
        data.resize(bytes, 0);
        Ok(Self { nvis, npol, data })
    }

    /// The number of visibility records.
    pub fn nvis(&self) -> usize {
        self.nvis
    }

    /// The number of polarisations per record.
    pub fn npol(&self) -> usize {
        self.npol
    }

    /// The raw record buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The raw record buffer, mutably.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn record_stride(&self) -> usize {
        VIS_RECORD_BYTES + VIS_POL_BYTES * self.npol
    }

    /// Decode the record at `index`, or `None` if it is out of range.
    pub fn record(&self, index: usize) -> Option<VisRecord> {
        if index >= self.nvis {
            return None;
        }
        let stride = self.record_stride();
        let mut cur = Cursor::new(&self.data[index * stride..(index + 1) * stride]);
        // the slice is exactly one record long, so these reads can't run short.
        let read_f64 = |cur: &mut Cursor<&[u8]>| cur.read_f64::<BigEndian>().unwrap_or(0.);
        let mut record = VisRecord {
            uvw: [read_f64(&mut cur), read_f64(&mut cur), read_f64(&mut cur)],
            time: read_f64(&mut cur),
            frequency: read_f64(&mut cur),
            channel_bandwidth: read_f64(&mut cur),
            integration_time: read_f64(&mut cur),
            ..VisRecord::default()
        };
        record.antenna1 = cur.read_i64::<BigEndian>().unwrap_or(0);
        record.antenna2 = cur.read_i64::<BigEndian>().unwrap_or(0);
        record.vis = (0..self.npol)
            .map(|_| Complex::new(read_f64(&mut cur), read_f64(&mut cur)))
            .collect();
        record.weight = (0..self.npol).map(|_| read_f64(&mut cur)).collect();
        record.imaging_weight = (0..self.npol).map(|_| read_f64(&mut cur)).collect();
        Some(record)
    }

    /// Encode `record` into the buffer at `index`.
    ///
    /// # Errors
    ///
    /// Will return [`VisError::RecordOutOfRange`] if `index` is past the end of
    /// the buffer, or [`VisError::PolarisationMismatch`] if any of the
    /// per-polarisation vectors has the wrong length.
    pub fn write_record(&mut self, index: usize, record: &VisRecord) -> Result<(), VisError> {
        if index >= self.nvis {
            return Err(VisError::RecordOutOfRange {
                index,
                nvis: self.nvis,
            });
        }
        for found in [
            record.vis.len(),
            record.weight.len(),
            record.imaging_weight.len(),
        ] {
            if found != self.npol {
                return Err(VisError::PolarisationMismatch {
                    expected: self.npol,
                    found,
                });
            }
        }
        let stride = self.record_stride();
        let mut buf = &mut self.data[index * stride..(index + 1) * stride];
        // writing into a slice of exactly the right length never fails.
        let put = |buf: &mut &mut [u8], x: f64| {
            let _ = buf.write_f64::<BigEndian>(x);
        };
        for &x in &record.uvw {
            put(&mut buf, x);
        }
        put(&mut buf, record.time);
        put(&mut buf, record.frequency);
        put(&mut buf, record.channel_bandwidth);
        put(&mut buf, record.integration_time);
        let _ = buf.write_i64::<BigEndian>(record.antenna1);
        let _ = buf.write_i64::<BigEndian>(record.antenna2);
        for vis in &record.vis {
            put(&mut buf, vis.re);
            put(&mut buf, vis.im);
        }
        for &x in record.weight.iter().chain(record.imaging_weight.iter()) {
            put(&mut buf, x);
        }
        Ok(())
    }
}
