use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use super::MessageHeader;

/// Maps azimuth indices and range gates of a rotating scan to physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanGeometry {
    /// Number of PRIs in one full revolution.
    pub azimuth_count: u32,
    /// Range of gate 0 in metres.
    pub range_min: f64,
    /// Metres per range gate.
    pub gate_size: f64,
}

impl Default for ScanGeometry {
    fn default() -> Self {
        Self {
            azimuth_count: 4096,
            range_min: 0.0,
            gate_size: 15.0,
        }
    }
}

impl ScanGeometry {
    pub fn new(azimuth_count: u32, range_min: f64, gate_size: f64) -> Self {
        Self {
            azimuth_count,
            range_min,
            gate_size,
        }
    }

    pub fn half_scan(&self) -> u32 {
        self.azimuth_count / 2
    }

    /// Azimuth in radians of a (possibly fractional) azimuth index.
    pub fn azimuth_radians(&self, azimuth: f64) -> f64 {
        if self.azimuth_count == 0 {
            return 0.0;
        }
        azimuth * TAU / f64::from(self.azimuth_count)
    }

    /// Range in metres of a (possibly fractional) range gate.
    pub fn range_metres(&self, gate: f64) -> f64 {
        self.range_min + gate * self.gate_size
    }
}

/// One PRI worth of range-gated samples at a single azimuth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriVideo {
    pub header: MessageHeader,
    /// Azimuth index in `0..geometry.azimuth_count`.
    pub azimuth: u32,
    pub geometry: ScanGeometry,
    pub samples: Vec<f32>,
}

impl PriVideo {
    pub fn new(
        header: MessageHeader,
        azimuth: u32,
        geometry: ScanGeometry,
        samples: Vec<f32>,
    ) -> Self {
        Self {
            header,
            azimuth,
            geometry,
            samples,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.header.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_converts_indices_to_physical_units() {
        let geometry = ScanGeometry::new(360, 100.0, 10.0);
        assert!((geometry.azimuth_radians(90.0) - TAU / 4.0).abs() < 1e-12);
        assert_eq!(geometry.range_metres(5.0), 150.0);
        assert_eq!(geometry.half_scan(), 180);
    }
}
