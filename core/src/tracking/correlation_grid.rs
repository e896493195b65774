use nalgebra::Vector3;
use ndarray::Array2;

use crate::messages::Extraction;
use crate::prelude::{StageError, StageResult};

#[derive(Debug, Clone)]
pub struct GridEntry {
    pub when: f64,
    pub extraction: Extraction,
    /// East/north/up metres.
    pub position: Vector3<f64>,
    /// Point-to-point estimate from the correlate, if one was found.
    pub velocity: Option<Vector3<f64>>,
    /// Detections in the correlation chain ending here.
    pub chain_length: usize,
    /// A track has already been declared for this chain.
    pub promoted: bool,
}

/// Age limits for correlation, seconds. Entries younger than `too_new`
/// or older than `too_old` are not correlated; entries older than
/// `very_old` are pruned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeWindow {
    pub too_new: f64,
    pub too_old: f64,
    pub very_old: f64,
}

/// Location of an entry: bin coordinates plus index within the bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef {
    pub bin: (usize, usize),
    pub index: usize,
}

/// Square bins over `-max_range..max_range`. Rows and columns 0 and `n + 1`
/// are never populated, so every interior bin has a full 3x3 neighbourhood.
pub struct CorrelationGrid {
    bins: Array2<Vec<GridEntry>>,
    bin_size: f64,
    max_range: f64,
    interior: usize,
}

impl CorrelationGrid {
    pub fn new(max_range: f64, bin_size: f64) -> StageResult<Self> {
        if !(bin_size > 0.0 && max_range > 0.0) {
            return Err(StageError::InvalidConfig(
                "grid range and bin size must be positive".into(),
            ));
        }
        let interior = (2.0 * max_range / bin_size).ceil() as usize;
        let side = interior + 2;
        Ok(Self {
            bins: Array2::default((side, side)),
            bin_size,
            max_range,
            interior,
        })
    }

    /// Interior bins per axis.
    pub fn interior(&self) -> usize {
        self.interior
    }

    pub fn len(&self) -> usize {
        self.bins.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.iter().all(Vec::is_empty)
    }

    /// Bin holding `(x, y)`; guard-margin and outside positions are errors.
    pub fn bin(&self, x: f64, y: f64) -> StageResult<(usize, usize)> {
        if !(x.is_finite() && y.is_finite()) {
            return Err(StageError::InvalidInput(format!(
                "position ({x}, {y}) is not finite"
            )));
        }
        let index = |v: f64| ((v + self.max_range) / self.bin_size).floor() as i64 + 1;
        let (ix, iy) = (index(x), index(y));
        let limit = self.interior as i64;
        if (1..=limit).contains(&ix) && (1..=limit).contains(&iy) {
            Ok((ix as usize, iy as usize))
        } else {
            Err(StageError::BinOutOfRange {
                x: ix,
                y: iy,
                limit: self.interior,
            })
        }
    }

    /// Prunes very old entries from the 3x3 neighbourhood of `centre`,
    /// then returns the closest survivor within `radius_squared` whose age
    /// at `now` lies inside the correlation window.
    pub fn closest(
        &mut self,
        centre: (usize, usize),
        position: &Vector3<f64>,
        now: f64,
        window: &AgeWindow,
        radius_squared: f64,
    ) -> Option<EntryRef> {
        let mut best: Option<(EntryRef, f64)> = None;
        for bx in centre.0 - 1..=centre.0 + 1 {
            for by in centre.1 - 1..=centre.1 + 1 {
                let entries = &mut self.bins[[bx, by]];
                entries.retain(|entry| now - entry.when <= window.very_old);
                for (index, entry) in entries.iter().enumerate() {
                    let age = now - entry.when;
                    if age < window.too_new || age > window.too_old {
                        continue;
                    }
                    let distance = (entry.position - position).norm_squared();
                    if distance >= radius_squared {
                        continue;
                    }
                    if best.map_or(true, |(_, closest)| distance < closest) {
                        best = Some((EntryRef { bin: (bx, by), index }, distance));
                    }
                }
            }
        }
        best.map(|(found, _)| found)
    }

    pub fn get_mut(&mut self, at: EntryRef) -> Option<&mut GridEntry> {
        self.bins.get_mut([at.bin.0, at.bin.1])?.get_mut(at.index)
    }

    pub fn insert(&mut self, bin: (usize, usize), entry: GridEntry) {
        self.bins[[bin.0, bin.1]].push(entry);
    }

    pub fn clear(&mut self) {
        self.bins.iter_mut().for_each(Vec::clear);
    }
}
