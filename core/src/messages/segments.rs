use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{MessageHeader, ScanGeometry};

/// Contiguous run of over-threshold range gates on one azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SegmentBounds")]
pub struct Segment {
    azimuth: u32,
    start: u32,
    stop: u32,
}

/// Wire form of a [`Segment`], checked before it becomes one.
#[derive(Deserialize)]
struct SegmentBounds {
    azimuth: u32,
    start: u32,
    stop: u32,
}

impl TryFrom<SegmentBounds> for Segment {
    type Error = String;

    fn try_from(bounds: SegmentBounds) -> Result<Self, Self::Error> {
        Segment::new(bounds.azimuth, bounds.start, bounds.stop).ok_or_else(|| {
            format!(
                "segment on azimuth {} starts at gate {} after it stops at {}",
                bounds.azimuth, bounds.start, bounds.stop
            )
        })
    }
}

impl Segment {
    /// Returns `None` when `start > stop`.
    pub fn new(azimuth: u32, start: u32, stop: u32) -> Option<Self> {
        (start <= stop).then_some(Self {
            azimuth,
            start,
            stop,
        })
    }

    pub fn azimuth(&self) -> u32 {
        self.azimuth
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn stop(&self) -> u32 {
        self.stop
    }

    pub fn cell_count(&self) -> usize {
        (self.stop - self.start) as usize + 1
    }

    /// Adjacency test against a segment on a neighbouring azimuth: the
    /// range intervals overlap once each is dilated by one gate, so a
    /// single empty gate between them still connects.
    pub fn touches(&self, other: &Segment) -> bool {
        self.start <= other.stop.saturating_add(2) && other.start <= self.stop.saturating_add(2)
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.start..=self.stop).map(move |gate| (self.azimuth, gate))
    }
}

/// Centroid of an extraction in fractional (azimuth index, range gate).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub azimuth: f64,
    pub range: f64,
}

/// Aggregates computed over every cell of an extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub peak_power: f32,
    pub peak_range: u32,
    pub peak_azimuth: u32,
    pub total_power: f64,
    pub cell_count: usize,
    /// `None` when the extraction carried no power.
    pub centroid: Option<Centroid>,
    /// Signed gates walked from the centroid toward near range (<= 0).
    pub range_drop_off_near: i32,
    /// Signed gates walked toward far range (>= 0).
    pub range_drop_off_far: i32,
    /// Signed azimuths walked counter-clockwise (<= 0).
    pub azimuth_drop_off_left: i32,
    /// Signed azimuths walked clockwise (>= 0).
    pub azimuth_drop_off_right: i32,
}

/// Segments forming one extraction (or one PRI), with the number of
/// azimuths they cover and, once annotated, their statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentList {
    segments: Vec<Segment>,
    span: u32,
    stats: Option<ExtractionStats>,
}

impl SegmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_span(span: u32) -> Self {
        Self {
            segments: Vec::new(),
            span,
            stats: None,
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        let mut list = Self {
            segments,
            span: 0,
            stats: None,
        };
        list.span = list.distinct_azimuths();
        list
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Moves every segment of `other` into `self`. Span becomes the wider of
    /// the two; callers extending a list into a new azimuth bump it first.
    pub fn merge(&mut self, mut other: SegmentList) {
        self.segments.append(&mut other.segments);
        self.span = self.span.max(other.span);
        self.stats = None;
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn span(&self) -> u32 {
        self.span
    }

    pub fn set_span(&mut self, span: u32) {
        self.span = span;
    }

    pub fn cell_count(&self) -> usize {
        self.segments.iter().map(Segment::cell_count).sum()
    }

    pub fn distinct_azimuths(&self) -> u32 {
        self.segments
            .iter()
            .map(Segment::azimuth)
            .collect::<BTreeSet<_>>()
            .len() as u32
    }

    pub fn stats(&self) -> Option<&ExtractionStats> {
        self.stats.as_ref()
    }

    pub fn set_stats(&mut self, stats: ExtractionStats) {
        self.stats = Some(stats);
    }
}

impl<'a> IntoIterator for &'a SegmentList {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Segments of one PRI (segmenter output) or one completed extraction
/// (connector and later stages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMessage {
    pub header: MessageHeader,
    pub geometry: ScanGeometry,
    pub segments: SegmentList,
}

impl SegmentMessage {
    pub fn new(header: MessageHeader, geometry: ScanGeometry, segments: SegmentList) -> Self {
        Self {
            header,
            geometry,
            segments,
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
    fn segment_rejects_inverted_bounds() {
        assert!(Segment::new(0, 5, 4).is_none());
        assert_eq!(Segment::new(0, 4, 4).map(|s| s.cell_count()), Some(1));
    }

    #[test]
    fn touching_dilates_both_segments_by_one_gate() {
        let a = Segment::new(0, 10, 12).unwrap();
        assert!(a.touches(&Segment::new(1, 13, 20).unwrap()));
        assert!(a.touches(&Segment::new(1, 14, 20).unwrap()));
        assert!(a.touches(&Segment::new(1, 0, 8).unwrap()));
        assert!(!a.touches(&Segment::new(1, 15, 20).unwrap()));
        assert!(!a.touches(&Segment::new(1, 0, 7).unwrap()));
    }

    #[test]
    fn inverted_segment_is_rejected_when_deserialized() {
        let inverted = serde_json::from_str::<Segment>(r#"{"azimuth":0,"start":5,"stop":2}"#);
        assert!(inverted.is_err());

        let segment: Segment =
            serde_json::from_str(r#"{"azimuth":3,"start":2,"stop":5}"#).unwrap();
        assert_eq!(segment.cell_count(), 4);
        assert_eq!(serde_json::to_string(&segment).unwrap(), r#"{"azimuth":3,"start":2,"stop":5}"#);
    }

    #[test]
    fn merge_keeps_widest_span_and_all_cells() {
        let mut left = SegmentList::with_span(3);
        left.push(Segment::new(0, 0, 4).unwrap());
        let mut right = SegmentList::with_span(5);
        right.push(Segment::new(1, 2, 3).unwrap());
        left.merge(right);
        assert_eq!(left.span(), 5);
        assert_eq!(left.cell_count(), 7);
    }
}
