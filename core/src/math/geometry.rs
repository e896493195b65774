use nalgebra::Vector3;

/// Range/azimuth/elevation to east/north/up. Azimuth is clockwise from
/// north, elevation above the local horizon, both in radians.
pub fn rae_to_enu(range: f64, azimuth: f64, elevation: f64) -> Vector3<f64> {
    let ground = range * elevation.cos();
    Vector3::new(
        ground * azimuth.sin(),
        ground * azimuth.cos(),
        range * elevation.sin(),
    )
}

/// Elevation at which a target at slant `range` sits `height` metres above
/// the radar. Clamped so impossible geometry yields +/- 90 degrees.
pub fn elevation_for_height(range: f64, height: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    (height / range).clamp(-1.0, 1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn straight_up_has_no_horizontal_component() {
        let up = rae_to_enu(100.0, 0.3, FRAC_PI_2);
        assert!(up.x.abs() < 1e-9 && up.y.abs() < 1e-9);
        assert!((up.z - 100.0).abs() < 1e-9);
    }

    #[test]
    fn elevation_for_height_is_clamped() {
        assert!((elevation_for_height(10.0, 50.0) - FRAC_PI_2).abs() < 1e-12);
        assert_eq!(elevation_for_height(0.0, 50.0), 0.0);
    }
}
