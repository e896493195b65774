use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::geometry;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeodeticPoint {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Metres above the reference surface.
    pub altitude: f64,
}

impl GeodeticPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// Conversion between local east/north/up offsets and geodetic positions.
pub trait GeodeticConverter: Send {
    /// Position of an east/north/up offset from `origin`.
    fn enu_to_geodetic(&self, origin: &GeodeticPoint, enu: &Vector3<f64>) -> GeodeticPoint;

    fn rae_to_geodetic(
        &self,
        origin: &GeodeticPoint,
        range: f64,
        azimuth: f64,
        elevation: f64,
    ) -> GeodeticPoint {
        self.enu_to_geodetic(origin, &geometry::rae_to_enu(range, azimuth, elevation))
    }
}

/// Local-tangent-plane conversion on a sphere. Adequate over the few tens
/// of kilometres a surveillance radar covers.
#[derive(Debug, Clone, Copy)]
pub struct SphericalEarth {
    pub radius: f64,
}

impl SphericalEarth {
    pub const MEAN_RADIUS: f64 = 6_371_008.8;
}

impl Default for SphericalEarth {
    fn default() -> Self {
        Self {
            radius: Self::MEAN_RADIUS,
        }
    }
}

impl GeodeticConverter for SphericalEarth {
    fn enu_to_geodetic(&self, origin: &GeodeticPoint, enu: &Vector3<f64>) -> GeodeticPoint {
        let lat0 = origin.latitude.to_radians();
        let north = enu.y / self.radius;
        let east = enu.x / (self.radius * lat0.cos().max(1e-9));
        GeodeticPoint {
            latitude: origin.latitude + north.to_degrees(),
            longitude: origin.longitude + east.to_degrees(),
            altitude: origin.altitude + enu.z,
        }
    }
}
