use ndarray::{s, Array2};

use crate::math::azimuth;
use crate::messages::{PriVideo, ScanGeometry};
use crate::prelude::{StageError, StageResult};

/// One revolution of raw video, addressable by (azimuth, range gate).
/// Rows are overwritten as new PRIs arrive for the same azimuth.
pub struct VideoBuffer {
    samples: Array2<f32>,
    geometry: ScanGeometry,
}

impl VideoBuffer {
    pub fn new() -> Self {
        Self {
            samples: Array2::zeros((0, 0)),
            geometry: ScanGeometry::default(),
        }
    }

    pub fn store(&mut self, video: &PriVideo) -> StageResult<()> {
        let rows = video.geometry.azimuth_count as usize;
        if video.azimuth as usize >= rows {
            return Err(StageError::InvalidInput(format!(
                "azimuth {} outside scan of {}",
                video.azimuth, rows
            )));
        }

        let (current_rows, current_cols) = self.samples.dim();
        if rows != current_rows {
            self.samples = Array2::zeros((rows, video.samples.len()));
        } else if video.samples.len() > current_cols {
            let mut grown = Array2::zeros((rows, video.samples.len()));
            grown
                .slice_mut(s![.., ..current_cols])
                .assign(&self.samples);
            self.samples = grown;
        }
        self.geometry = video.geometry;

        let mut row = self.samples.row_mut(video.azimuth as usize);
        row.fill(0.0);
        for (cell, &value) in row.iter_mut().zip(video.samples.iter()) {
            *cell = value;
        }
        Ok(())
    }

    pub fn sample(&self, azimuth: u32, gate: u32) -> Option<f32> {
        self.samples
            .get((azimuth as usize, gate as usize))
            .copied()
    }

    /// Azimuth wraps around the scan; gates outside the row yield `None`.
    pub fn sample_wrapped(&self, azimuth: i64, gate: i64) -> Option<f32> {
        if gate < 0 || self.azimuth_count() == 0 {
            return None;
        }
        let azimuth = azimuth::wrap_index(azimuth, self.azimuth_count());
        self.sample(azimuth, gate as u32)
    }

    pub fn geometry(&self) -> ScanGeometry {
        self.geometry
    }

    pub fn azimuth_count(&self) -> u32 {
        self.samples.nrows() as u32
    }

    pub fn gate_count(&self) -> u32 {
        self.samples.ncols() as u32
    }

    pub fn clear(&mut self) {
        self.samples = Array2::zeros((0, 0));
    }
}

impl Default for VideoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageHeader;

    fn pri(azimuth: u32, samples: Vec<f32>) -> PriVideo {
        PriVideo::new(
            MessageHeader::new(1, 0.0),
            azimuth,
            ScanGeometry::new(8, 0.0, 1.0),
            samples,
        )
    }

    #[test]
    fn stored_rows_are_addressable_with_wraparound() {
        let mut buffer = VideoBuffer::new();
        buffer.store(&pri(0, vec![1.0, 2.0, 3.0])).unwrap();
        buffer.store(&pri(7, vec![4.0, 5.0])).unwrap();
        assert_eq!(buffer.sample(0, 2), Some(3.0));
        assert_eq!(buffer.sample_wrapped(-1, 1), Some(5.0));
        assert_eq!(buffer.sample_wrapped(8, 0), Some(1.0));
        assert_eq!(buffer.sample_wrapped(0, 3), None);
        assert_eq!(buffer.sample_wrapped(0, -1), None);
    }

    #[test]
    fn longer_pri_grows_buffer_without_losing_rows() {
        let mut buffer = VideoBuffer::new();
        buffer.store(&pri(1, vec![1.0, 2.0])).unwrap();
        buffer.store(&pri(2, vec![0.0, 0.0, 0.0, 9.0])).unwrap();
        assert_eq!(buffer.gate_count(), 4);
        assert_eq!(buffer.sample(1, 1), Some(2.0));
        assert_eq!(buffer.sample(2, 3), Some(9.0));
    }

    #[test]
    fn azimuth_outside_scan_is_rejected() {
        let mut buffer = VideoBuffer::new();
        assert!(buffer.store(&pri(8, vec![1.0])).is_err());
    }
}
