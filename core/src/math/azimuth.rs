/// Reduces a signed azimuth index into `0..count`.
pub fn wrap_index(azimuth: i64, count: u32) -> u32 {
    if count == 0 {
        return 0;
    }
    azimuth.rem_euclid(i64::from(count)) as u32
}

/// Shortest distance around the scan circle between two azimuth indices.
pub fn circular_distance(a: u32, b: u32, count: u32) -> u32 {
    if count == 0 {
        return a.abs_diff(b);
    }
    let direct = (a % count).abs_diff(b % count);
    direct.min(count - direct)
}

/// Signed shortest offset from `from` to `to`, in `(-count/2, count/2]`.
pub fn signed_offset(from: f64, to: f64, count: u32) -> f64 {
    let full = f64::from(count);
    let half = full / 2.0;
    let mut delta = to - from;
    if delta > half {
        delta -= full;
    } else if delta <= -half {
        delta += full;
    }
    delta
}

/// Reduces a fractional azimuth index into `[0, count)`.
pub fn wrap_fractional(azimuth: f64, count: u32) -> f64 {
    let full = f64::from(count);
    if full <= 0.0 {
        return azimuth;
    }
    let wrapped = azimuth.rem_euclid(full);
    if wrapped >= full {
        0.0
    } else {
        wrapped
    }
}
