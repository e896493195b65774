use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::math::azimuth;
use crate::messages::{Message, Segment, SegmentList, SegmentMessage, SequenceCounter};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::processing::video_buffer::VideoBuffer;
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};

/// Quadratic fit of the minimum centre distance of two equal circles, as a
/// fraction of their diameter, against the fraction of area they share.
const OVERLAP_CALIBRATION: [f64; 3] = [1.0, -1.458, 0.458];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSplitterConfig {
    pub enabled: bool,
    /// Expected target half-width in range gates.
    pub range_half_width: u32,
    /// Expected target half-width in azimuths.
    pub azimuth_half_width: u32,
    /// Largest fraction of area two targets may share and still be split.
    pub overlap: f64,
}

impl Default for SegmentSplitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            range_half_width: 4,
            azimuth_half_width: 4,
            overlap: 0.25,
        }
    }
}

impl SegmentSplitterConfig {
    /// Minimum centre distance as a fraction of target diameter.
    pub fn separation_factor(&self) -> f64 {
        let o = self.overlap;
        let [c0, c1, c2] = OVERLAP_CALIBRATION;
        (c0 + c1 * o + c2 * o * o).clamp(0.0, 1.0)
    }
}

/// Strict 3x3 local maximum inside an extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub azimuth: u32,
    pub range: u32,
    pub value: f32,
    pub neighbourhood: f32,
}

/// Splits extractions containing several targets into one extraction per
/// target, using the raw video to locate intensity peaks.
pub struct SegmentSplitter {
    config: SegmentSplitterConfig,
    video: VideoBuffer,
    extractions_in: usize,
    extractions_out: usize,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl SegmentSplitter {
    pub const NAME: &'static str = "SegmentSplitter";

    pub fn new(config: SegmentSplitterConfig) -> Self {
        Self {
            config,
            video: VideoBuffer::new(),
            extractions_in: 0,
            extractions_out: 0,
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        }
    }

    pub fn video(&self) -> &VideoBuffer {
        &self.video
    }

    fn candidates(&self, segments: &SegmentList) -> Vec<Peak> {
        let mut peaks = Vec::new();
        for (az, gate) in segments.iter().flat_map(Segment::cells) {
            let Some(value) = self.video.sample(az, gate) else {
                continue;
            };
            let mut neighbourhood = value;
            let mut is_peak = true;
            for da in -1i64..=1 {
                for dr in -1i64..=1 {
                    if da == 0 && dr == 0 {
                        continue;
                    }
                    if let Some(neighbour) = self
                        .video
                        .sample_wrapped(i64::from(az) + da, i64::from(gate) + dr)
                    {
                        neighbourhood += neighbour;
                        if neighbour >= value {
                            is_peak = false;
                        }
                    }
                }
            }
            if is_peak {
                peaks.push(Peak {
                    azimuth: az,
                    range: gate,
                    value,
                    neighbourhood,
                });
            }
        }
        peaks
    }

    /// Peaks that survive greedy suppression, strongest first.
    pub fn find_peaks(&self, segments: &SegmentList, azimuth_count: u32) -> Vec<Peak> {
        let mut candidates = self.candidates(segments);
        candidates.sort_by(|a, b| {
            b.value
                .total_cmp(&a.value)
                .then(b.neighbourhood.total_cmp(&a.neighbourhood))
                .then(a.azimuth.cmp(&b.azimuth))
                .then(a.range.cmp(&b.range))
        });

        let factor = self.config.separation_factor();
        let range_axis = 2.0 * f64::from(self.config.range_half_width) * factor;
        let azimuth_axis = 2.0 * f64::from(self.config.azimuth_half_width) * factor;
        let excluded = |a: &Peak, b: &Peak| -> bool {
            let dr = f64::from(a.range) - f64::from(b.range);
            let da = f64::from(azimuth::circular_distance(a.azimuth, b.azimuth, azimuth_count));
            let term = |delta: f64, axis: f64| {
                if axis > 0.0 {
                    (delta / axis).powi(2)
                } else if delta == 0.0 {
                    0.0
                } else {
                    f64::INFINITY
                }
            };
            term(dr, range_axis) + term(da, azimuth_axis) < 1.0
        };

        let mut kept: Vec<Peak> = Vec::new();
        for candidate in candidates {
            if kept.iter().all(|peak| !excluded(peak, &candidate)) {
                kept.push(candidate);
            }
        }
        kept
    }

    /// Portions of `segments` inside the window around `peak`.
    pub fn clip(&self, segments: &SegmentList, peak: &Peak, azimuth_count: u32) -> SegmentList {
        let low = peak.range.saturating_sub(self.config.range_half_width);
        let high = peak.range.saturating_add(self.config.range_half_width);
        let clipped = segments
            .iter()
            .filter(|segment| {
                azimuth::circular_distance(segment.azimuth(), peak.azimuth, azimuth_count)
                    <= self.config.azimuth_half_width
            })
            .filter_map(|segment| {
                Segment::new(
                    segment.azimuth(),
                    segment.start().max(low),
                    segment.stop().min(high),
                )
            })
            .collect();
        SegmentList::from_segments(clipped)
    }

    fn split(&mut self, extraction: SegmentMessage, outbox: &mut Outbox<'_>) {
        self.extractions_in += 1;
        let azimuth_count = extraction.geometry.azimuth_count;
        let peaks = self.find_peaks(&extraction.segments, azimuth_count);

        if peaks.len() <= 1 {
            self.extractions_out += 1;
            let header = self.sequence.next_header(extraction.timestamp());
            outbox.send(Message::Segments(SegmentMessage { header, ..extraction }));
            return;
        }

        self.logger.detail(&format!(
            "splitting {} cells into {} targets",
            extraction.segments.cell_count(),
            peaks.len()
        ));
        for peak in &peaks {
            let list = self.clip(&extraction.segments, peak, azimuth_count);
            if list.is_empty() {
                continue;
            }
            self.extractions_out += 1;
            let header = self.sequence.next_header(extraction.timestamp());
            outbox.send(Message::Segments(SegmentMessage::new(
                header,
                extraction.geometry,
                list,
            )));
        }
    }
}

impl Default for SegmentSplitter {
    fn default() -> Self {
        Self::new(SegmentSplitterConfig::default())
    }
}

impl Configurable for SegmentSplitter {
    type Config = SegmentSplitterConfig;

    fn config(&self) -> &SegmentSplitterConfig {
        &self.config
    }

    fn apply_config(&mut self, config: SegmentSplitterConfig) -> StageResult<()> {
        if !(0.0..=1.0).contains(&config.overlap) {
            return Err(StageError::InvalidConfig(format!(
                "overlap {} outside [0, 1]",
                config.overlap
            )));
        }
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for SegmentSplitter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()> {
        self.metrics.record_processed();
        let mut outbox = Outbox::new(sink);
        match message {
            Message::Video(video) => {
                if let Err(err) = self.video.store(&video) {
                    self.metrics.record_rejected();
                    self.logger.warn(&format!("video not stored: {}", err));
                }
                outbox.send(Message::Video(video));
            }
            Message::Segments(extraction) => {
                if self.config.enabled {
                    self.split(extraction, &mut outbox);
                } else {
                    outbox.send(Message::Segments(extraction));
                }
            }
            other => {
                self.metrics.record_rejected();
                return Err(StageError::UnexpectedMessage {
                    stage: Self::NAME,
                    kind: other.kind(),
                });
            }
        }
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, _sink: &mut dyn MessageSink) -> StageResult<()> {
        self.video.clear();
        self.extractions_in = 0;
        self.extractions_out = 0;
        Ok(())
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("extractions_in", self.extractions_in as f64)
            .with_counter("extractions_out", self.extractions_out as f64)
            .with_counter("overlap", self.config.overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MessageHeader, PriVideo, ScanGeometry};

    const AZIMUTHS: u32 = 16;
    const GATES: usize = 32;

    fn geometry() -> ScanGeometry {
        ScanGeometry::new(AZIMUTHS, 0.0, 1.0)
    }

    /// Three azimuths of flat 10.0 video over gates 8..=22 with the given peaks.
    fn load_blob(splitter: &mut SegmentSplitter, peaks: &[(u32, u32, f32)]) -> SegmentList {
        let mut sink: Vec<Message> = Vec::new();
        let mut list = SegmentList::new();
        for az in 0..AZIMUTHS {
            let mut samples = vec![0.0; GATES];
            if (3..=5).contains(&az) {
                for sample in &mut samples[8..=22] {
                    *sample = 10.0;
                }
                list.push(Segment::new(az, 8, 22).unwrap());
            }
            for &(peak_az, gate, value) in peaks {
                if peak_az == az {
                    samples[gate as usize] = value;
                }
            }
            let video = PriVideo::new(MessageHeader::new(1, 0.0), az, geometry(), samples);
            splitter.process(Message::Video(video), &mut sink).unwrap();
        }
        list.set_span(3);
        list
    }

    fn split(splitter: &mut SegmentSplitter, list: SegmentList) -> Vec<SegmentList> {
        let mut sink: Vec<Message> = Vec::new();
        let message = SegmentMessage::new(MessageHeader::new(9, 1.0), geometry(), list);
        splitter.process(Message::Segments(message), &mut sink).unwrap();
        sink.into_iter()
            .filter_map(|m| match m {
                Message::Segments(msg) => Some(msg.segments),
                _ => None,
            })
            .collect()
    }

    fn splitter() -> SegmentSplitter {
        SegmentSplitter::new(SegmentSplitterConfig {
            range_half_width: 3,
            azimuth_half_width: 2,
            overlap: 0.0,
            ..Default::default()
        })
    }

    fn contains(list: &SegmentList, az: u32, gate: u32) -> bool {
        list.iter()
            .any(|s| s.azimuth() == az && s.start() <= gate && gate <= s.stop())
    }

    #[test]
    fn calibration_maps_no_overlap_to_full_diameter() {
        let config = SegmentSplitterConfig {
            overlap: 0.0,
            ..Default::default()
        };
        assert_eq!(config.separation_factor(), 1.0);
        let full = SegmentSplitterConfig {
            overlap: 1.0,
            ..Default::default()
        };
        assert!(full.separation_factor().abs() < 1e-9);
    }

    #[test]
    fn well_separated_peaks_produce_one_extraction_each() {
        let mut splitter = splitter();
        let list = load_blob(&mut splitter, &[(4, 10, 100.0), (4, 20, 80.0)]);
        let parts = split(&mut splitter, list);
        assert_eq!(parts.len(), 2);
        assert!(contains(&parts[0], 4, 10) && !contains(&parts[0], 4, 20));
        assert!(contains(&parts[1], 4, 20) && !contains(&parts[1], 4, 10));
        assert!(parts.iter().all(|p| p.span() == 3));
    }

    #[test]
    fn close_peaks_keep_only_the_taller() {
        let mut splitter = splitter();
        let list = load_blob(&mut splitter, &[(4, 10, 80.0), (4, 14, 100.0)]);
        let peaks = splitter.find_peaks(&list, AZIMUTHS);
        assert_eq!(peaks.len(), 1);
        assert_eq!((peaks[0].azimuth, peaks[0].range), (4, 14));

        let parts = split(&mut splitter, list.clone());
        assert_eq!(parts, vec![list]);
    }

    #[test]
    fn clipping_drops_segments_outside_the_window() {
        let splitter = splitter();
        let mut list = SegmentList::new();
        list.push(Segment::new(4, 0, 2).unwrap());
        list.push(Segment::new(4, 5, 30).unwrap());
        list.push(Segment::new(9, 10, 12).unwrap());
        let peak = Peak {
            azimuth: 4,
            range: 10,
            value: 1.0,
            neighbourhood: 1.0,
        };
        let clipped = splitter.clip(&list, &peak, AZIMUTHS);
        assert_eq!(clipped.segments(), &[Segment::new(4, 7, 13).unwrap()]);
    }

    #[test]
    fn window_wraps_around_azimuth_zero() {
        let splitter = splitter();
        let mut list = SegmentList::new();
        list.push(Segment::new(15, 9, 11).unwrap());
        list.push(Segment::new(1, 9, 11).unwrap());
        let peak = Peak {
            azimuth: 0,
            range: 10,
            value: 1.0,
            neighbourhood: 1.0,
        };
        assert_eq!(splitter.clip(&list, &peak, AZIMUTHS).len(), 2);
    }

    #[test]
    fn video_is_passed_through() {
        let mut splitter = splitter();
        let mut sink: Vec<Message> = Vec::new();
        let video = PriVideo::new(MessageHeader::new(1, 0.0), 2, geometry(), vec![1.0; 4]);
        splitter.process(Message::Video(video.clone()), &mut sink).unwrap();
        assert_eq!(sink, vec![Message::Video(video)]);
        assert_eq!(splitter.video().sample(2, 3), Some(1.0));
    }
}
