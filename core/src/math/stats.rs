/// Power-weighted first moments over a set of cells.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedMoments {
    pub weight: f64,
    pub azimuth: f64,
    pub range: f64,
    pub count: usize,
}

impl WeightedMoments {
    pub fn add(&mut self, azimuth: f64, range: f64, power: f64) {
        self.weight += power;
        self.azimuth += azimuth * power;
        self.range += range * power;
        self.count += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Weighted mean (azimuth, range); `None` without positive weight.
    pub fn mean(&self) -> Option<(f64, f64)> {
        if self.weight <= 0.0 {
            return None;
        }
        Some((self.azimuth / self.weight, self.range / self.weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_moments_have_no_mean() {
        assert_eq!(WeightedMoments::default().mean(), None);
    }

    #[test]
    fn mean_is_power_weighted() {
        let mut moments = WeightedMoments::default();
        moments.add(10.0, 100.0, 1.0);
        moments.add(20.0, 200.0, 3.0);
        assert_eq!(moments.mean(), Some((17.5, 175.0)));
    }
}
