pub mod azimuth;
pub mod geodetic;
pub mod geometry;
pub mod stats;

pub use geodetic::{GeodeticConverter, GeodeticPoint, SphericalEarth};
pub use stats::WeightedMoments;
