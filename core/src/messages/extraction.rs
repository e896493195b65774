use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::MessageHeader;
use crate::math::geometry;

/// Point report reduced from one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub when: f64,
    /// Metres.
    pub range: f64,
    /// Radians clockwise from north.
    pub azimuth: f64,
    /// Radians above the horizon.
    pub elevation: f64,
    /// East of the radar, metres.
    pub x: f64,
    /// North of the radar, metres.
    pub y: f64,
    pub correlated: bool,
    pub num_correlations: u32,
    pub attributes: BTreeMap<String, f64>,
}

impl Extraction {
    pub fn new(when: f64, range: f64, azimuth: f64, elevation: f64) -> Self {
        let ground = range * elevation.cos();
        Self {
            when,
            range,
            azimuth,
            elevation,
            x: ground * azimuth.sin(),
            y: ground * azimuth.cos(),
            correlated: false,
            num_correlations: 0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: f64) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// East/north/up position relative to the radar.
    pub fn position(&self) -> Vector3<f64> {
        geometry::rae_to_enu(self.range, self.azimuth, self.elevation)
    }
}

/// Batch of point reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionsMessage {
    pub header: MessageHeader,
    pub extractions: Vec<Extraction>,
}

impl ExtractionsMessage {
    pub fn new(header: MessageHeader, extractions: Vec<Extraction>) -> Self {
        Self {
            header,
            extractions,
        }
    }

    pub fn len(&self) -> usize {
        self.extractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn derived_xy_follow_clockwise_from_north_convention() {
        let east = Extraction::new(0.0, 1000.0, FRAC_PI_2, 0.0);
        assert!((east.x - 1000.0).abs() < 1e-9);
        assert!(east.y.abs() < 1e-9);

        let north = Extraction::new(0.0, 1000.0, 0.0, 0.0);
        assert!((north.y - 1000.0).abs() < 1e-9);
    }
}
