use serde::{Deserialize, Serialize};

use crate::math::{azimuth, WeightedMoments};
use crate::messages::{
    Centroid, ExtractionStats, Message, Segment, SegmentList, SegmentMessage, SequenceCounter,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::processing::video_buffer::VideoBuffer;
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentStatsConfig {
    pub enabled: bool,
    /// A drop-off walk stops when a cell falls by more than this fraction of
    /// the previous cell.
    pub drop_off_fraction: f64,
    /// A drop-off walk stops below `mean power * min_power_ratio`.
    pub min_power_ratio: f64,
}

impl Default for SegmentStatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drop_off_fraction: 0.5,
            min_power_ratio: 0.5,
        }
    }
}

/// Annotates extractions with power, peak, centroid and extent statistics.
pub struct SegmentStatsStage {
    config: SegmentStatsConfig,
    video: VideoBuffer,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl SegmentStatsStage {
    pub const NAME: &'static str = "SegmentStats";

    pub fn new(config: SegmentStatsConfig) -> Self {
        Self {
            config,
            video: VideoBuffer::new(),
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        }
    }

    pub fn video(&self) -> &VideoBuffer {
        &self.video
    }

    pub fn compute(&self, segments: &SegmentList, azimuth_count: u32) -> ExtractionStats {
        let half = azimuth_count / 2;
        let mut low = WeightedMoments::default();
        let mut high = WeightedMoments::default();
        let mut stats = ExtractionStats::default();
        let mut peak: Option<f32> = None;

        for (az, gate) in segments.iter().flat_map(Segment::cells) {
            let power = self.video.sample(az, gate).unwrap_or(0.0);
            let moments = if az < half { &mut low } else { &mut high };
            moments.add(f64::from(az), f64::from(gate), f64::from(power));
            stats.total_power += f64::from(power);
            stats.cell_count += 1;
            if peak.map_or(true, |best| power > best) {
                peak = Some(power);
                stats.peak_power = power;
                stats.peak_azimuth = az;
                stats.peak_range = gate;
            }
        }

        stats.centroid = combine_halves(&low, &high, azimuth_count);
        if let Some(centroid) = stats.centroid {
            self.measure_drop_off(&mut stats, centroid, azimuth_count);
        }
        stats
    }

    fn measure_drop_off(&self, stats: &mut ExtractionStats, centroid: Centroid, azimuth_count: u32) {
        let floor = stats.total_power / stats.cell_count.max(1) as f64 * self.config.min_power_ratio;
        let az = azimuth::wrap_index(centroid.azimuth.round() as i64, azimuth_count);
        let origin = (i64::from(az), centroid.range.round() as i64);
        let range_limit = i64::from(self.video.gate_count());
        let azimuth_limit = i64::from(azimuth_count / 2);

        stats.range_drop_off_near = -self.walk(origin, (0, -1), floor, range_limit);
        stats.range_drop_off_far = self.walk(origin, (0, 1), floor, range_limit);
        stats.azimuth_drop_off_left = -self.walk(origin, (-1, 0), floor, azimuth_limit);
        stats.azimuth_drop_off_right = self.walk(origin, (1, 0), floor, azimuth_limit);
    }

    /// Cells stepped from `origin` before power falls below `floor` or drops
    /// too sharply. Azimuth steps continue across the scan seam.
    fn walk(&self, origin: (i64, i64), step: (i64, i64), floor: f64, limit: i64) -> i32 {
        let Some(start) = self.video.sample_wrapped(origin.0, origin.1) else {
            return 0;
        };
        let keep = 1.0 - self.config.drop_off_fraction;
        let mut previous = f64::from(start);
        let mut steps = 0;
        while steps < limit {
            let next = steps + 1;
            let Some(value) = self
                .video
                .sample_wrapped(origin.0 + next * step.0, origin.1 + next * step.1)
            else {
                break;
            };
            let value = f64::from(value);
            if value < floor || value < previous * keep {
                break;
            }
            previous = value;
            steps = next;
        }
        steps as i32
    }

    fn annotate(&mut self, mut extraction: SegmentMessage, outbox: &mut Outbox<'_>) {
        let stats = self.compute(&extraction.segments, extraction.geometry.azimuth_count);
        if stats.centroid.is_none() {
            self.logger.detail(&format!(
                "no power over {} cells, centroid left unset",
                stats.cell_count
            ));
        }
        extraction.segments.set_stats(stats);
        extraction.header = self.sequence.next_header(extraction.timestamp());
        outbox.send(Message::Segments(extraction));
    }
}

/// Joins the centroids of the `[0, half)` and `[half, full)` azimuth
/// halves. When they are more than half a scan apart the extraction
/// straddles azimuth zero, so the low half is moved up by a full scan
/// before averaging.
fn combine_halves(low: &WeightedMoments, high: &WeightedMoments, azimuth_count: u32) -> Option<Centroid> {
    let full = f64::from(azimuth_count);
    let (azimuth, range) = match (low.mean(), high.mean()) {
        (None, None) => return None,
        (Some(mean), None) | (None, Some(mean)) => mean,
        (Some((low_az, _)), Some((high_az, _))) => {
            let weight = low.weight + high.weight;
            let range = (low.range + high.range) / weight;
            let azimuth = if high_az - low_az > full / 2.0 {
                (low.weight * (low_az + full) + high.weight * high_az) / weight
            } else {
                (low.azimuth + high.azimuth) / weight
            };
            (azimuth, range)
        }
    };
    Some(Centroid {
        azimuth: azimuth::wrap_fractional(azimuth, azimuth_count),
        range,
    })
}

impl Default for SegmentStatsStage {
    fn default() -> Self {
        Self::new(SegmentStatsConfig::default())
    }
}

impl Configurable for SegmentStatsStage {
    type Config = SegmentStatsConfig;

    fn config(&self) -> &SegmentStatsConfig {
        &self.config
    }

    fn apply_config(&mut self, config: SegmentStatsConfig) -> StageResult<()> {
        if !(0.0..=1.0).contains(&config.drop_off_fraction) {
            return Err(StageError::InvalidConfig(format!(
                "drop_off_fraction {} outside [0, 1]",
                config.drop_off_fraction
            )));
        }
        if !(config.min_power_ratio >= 0.0) {
            return Err(StageError::InvalidConfig(
                "min_power_ratio must be non-negative".into(),
            ));
        }
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for SegmentStatsStage {
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
            }
            Message::Segments(extraction) => {
                if self.config.enabled {
                    self.annotate(extraction, &mut outbox);
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
        Ok(())
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("drop_off_fraction", self.config.drop_off_fraction)
            .with_counter("min_power_ratio", self.config.min_power_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MessageHeader, PriVideo, ScanGeometry};

    fn load(stage: &mut SegmentStatsStage, azimuth_count: u32, rows: &[(u32, Vec<f32>)]) {
        let mut sink: Vec<Message> = Vec::new();
        for (az, samples) in rows {
            let video = PriVideo::new(
                MessageHeader::new(1, 0.0),
                *az,
                ScanGeometry::new(azimuth_count, 0.0, 1.0),
                samples.clone(),
            );
            stage.process(Message::Video(video), &mut sink).unwrap();
        }
        assert!(sink.is_empty());
    }

    fn list(segments: &[(u32, u32, u32)]) -> SegmentList {
        SegmentList::from_segments(
            segments
                .iter()
                .map(|&(az, start, stop)| Segment::new(az, start, stop).unwrap())
                .collect(),
        )
    }

    #[test]
    fn centroid_across_azimuth_zero_stays_near_zero() {
        let mut stage = SegmentStatsStage::default();
        let mut row = vec![0.0; 8];
        row[5] = 10.0;
        load(&mut stage, 360, &[(359, row.clone()), (1, row)]);

        let stats = stage.compute(&list(&[(359, 5, 5), (1, 5, 5)]), 360);
        let centroid = stats.centroid.unwrap();
        assert!(
            centroid.azimuth < 1.0 || centroid.azimuth > 359.0,
            "centroid at {}",
            centroid.azimuth
        );
        assert_eq!(centroid.range, 5.0);
        assert_eq!(stats.cell_count, 2);
        assert_eq!(stats.total_power, 20.0);
    }

    #[test]
    fn weighted_centroid_leans_toward_stronger_cells() {
        let mut stage = SegmentStatsStage::default();
        load(
            &mut stage,
            360,
            &[(100, vec![0.0, 0.0, 30.0, 10.0]), (101, vec![0.0, 0.0, 10.0, 10.0])],
        );
        let stats = stage.compute(&list(&[(100, 2, 3), (101, 2, 3)]), 360);
        let centroid = stats.centroid.unwrap();
        assert!((centroid.azimuth - 100.333_333).abs() < 1e-5);
        assert!((centroid.range - 2.333_333).abs() < 1e-5);
        assert_eq!((stats.peak_azimuth, stats.peak_range), (100, 2));
        assert_eq!(stats.peak_power, 30.0);
    }

    #[test]
    fn zero_power_extraction_has_no_centroid() {
        let mut stage = SegmentStatsStage::default();
        load(&mut stage, 16, &[(3, vec![0.0; 4])]);
        let stats = stage.compute(&list(&[(3, 0, 3)]), 16);
        assert_eq!(stats.centroid, None);
        assert_eq!(stats.cell_count, 4);
        assert_eq!(stats.range_drop_off_far, 0);
    }

    #[test]
    fn drop_off_walk_stops_at_floor_or_sharp_fall() {
        let row = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 5.0, 10.0, 20.0, 10.0, 5.0, 2.0];
        let mut stage = SegmentStatsStage::new(SegmentStatsConfig {
            drop_off_fraction: 0.6,
            min_power_ratio: 0.5,
            ..Default::default()
        });
        load(&mut stage, 64, &[(10, row)]);
        let extraction = list(&[(10, 10, 16)]);

        let stats = stage.compute(&extraction, 64);
        assert_eq!(stats.centroid.map(|c| c.range), Some(13.0));
        assert_eq!(stats.range_drop_off_far, 2);
        assert_eq!(stats.range_drop_off_near, -2);
        assert_eq!(stats.azimuth_drop_off_left, 0);
        assert_eq!(stats.azimuth_drop_off_right, 0);

        stage
            .apply_config(SegmentStatsConfig {
                drop_off_fraction: 0.4,
                min_power_ratio: 0.5,
                ..Default::default()
            })
            .unwrap();
        let stats = stage.compute(&extraction, 64);
        assert_eq!(stats.range_drop_off_far, 0);
    }

    #[test]
    fn azimuth_walk_continues_across_the_seam() {
        let mut stage = SegmentStatsStage::new(SegmentStatsConfig {
            drop_off_fraction: 0.9,
            min_power_ratio: 0.1,
            ..Default::default()
        });
        let rows: Vec<(u32, Vec<f32>)> = [14, 15, 0, 1]
            .iter()
            .map(|&az| (az, vec![0.0, 10.0]))
            .collect();
        load(&mut stage, 16, &rows);
        let stats = stage.compute(&list(&[(15, 1, 1), (0, 1, 1)]), 16);
        // Centroid 15.5 rounds onto azimuth 0; the left walk crosses into 15 and 14.
        assert_eq!(stats.azimuth_drop_off_right, 1);
        assert_eq!(stats.azimuth_drop_off_left, -2);
    }

    #[test]
    fn annotated_extraction_carries_stats() {
        let mut stage = SegmentStatsStage::default();
        load(&mut stage, 16, &[(2, vec![5.0, 5.0])]);
        let mut sink: Vec<Message> = Vec::new();
        let message = SegmentMessage::new(
            MessageHeader::new(4, 2.0),
            ScanGeometry::new(16, 0.0, 1.0),
            list(&[(2, 0, 1)]),
        );
        stage.process(Message::Segments(message), &mut sink).unwrap();
        match &sink[0] {
            Message::Segments(msg) => {
                assert_eq!(msg.segments.stats().map(|s| s.cell_count), Some(2));
                assert_eq!(msg.timestamp(), 2.0);
            }
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[test]
    fn invalid_fraction_leaves_config_untouched() {
        let mut stage = SegmentStatsStage::default();
        let bad = SegmentStatsConfig {
            drop_off_fraction: 1.5,
            ..Default::default()
        };
        assert!(stage.apply_config(bad).is_err());
        assert_eq!(stage.config().drop_off_fraction, 0.5);
    }
}
