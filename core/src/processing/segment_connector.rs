use serde::{Deserialize, Serialize};

use crate::math::azimuth;
use crate::messages::{
    Message, ScanGeometry, Segment, SegmentList, SegmentMessage, SequenceCounter,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::processing::segment_tree::SegmentForest;
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConnectorConfig {
    pub enabled: bool,
    /// PRIs per revolution used by the ring filter; 0 takes the value from
    /// the incoming scan geometry.
    pub scan_resolution: u32,
}

impl Default for SegmentConnectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_resolution: 0,
        }
    }
}

/// Grows 2-D extractions out of the segments of successive PRIs.
pub struct SegmentConnector {
    config: SegmentConnectorConfig,
    forest: SegmentForest,
    old_segments: Vec<Segment>,
    previous: Option<(f64, ScanGeometry)>,
    ring_filtered: usize,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl SegmentConnector {
    pub const NAME: &'static str = "SegmentConnector";

    pub fn new(config: SegmentConnectorConfig) -> Self {
        Self {
            config,
            forest: SegmentForest::new(),
            old_segments: Vec::new(),
            previous: None,
            ring_filtered: 0,
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        }
    }

    /// Index pairs `(old, new)` of touching segments. Both inputs must be
    /// sorted by start gate and non-overlapping, so one merge-like pass
    /// finds every pair.
    pub fn touching_pairs(old: &[Segment], new: &[Segment]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < old.len() && j < new.len() {
            let (a, b) = (&old[i], &new[j]);
            if a.touches(b) {
                pairs.push((i, j));
                if a.stop() <= b.stop() {
                    i += 1;
                } else {
                    j += 1;
                }
            } else if a.stop() < b.start() {
                i += 1;
            } else {
                j += 1;
            }
        }
        pairs
    }

    fn resolution(&self, geometry: &ScanGeometry) -> u32 {
        if self.config.scan_resolution > 0 {
            self.config.scan_resolution
        } else {
            geometry.azimuth_count
        }
    }

    fn ring_limit(&self, geometry: &ScanGeometry) -> u32 {
        self.resolution(geometry) / 2
    }

    /// Whether `new` continues on the azimuth right after the previous PRI.
    /// Either side being empty leaves nothing to join.
    fn follows_previous(&self, new: &[Segment], geometry: &ScanGeometry) -> bool {
        match (self.old_segments.first(), new.first()) {
            (Some(old), Some(new)) => {
                let next = azimuth::wrap_index(i64::from(old.azimuth()) + 1, self.resolution(geometry));
                new.azimuth() == next
            }
            _ => true,
        }
    }

    fn emit(&mut self, outbox: &mut Outbox<'_>, timestamp: f64, geometry: ScanGeometry, list: SegmentList) {
        let header = self.sequence.next_header(timestamp);
        outbox.send(Message::Segments(SegmentMessage::new(header, geometry, list)));
    }

    fn connect_pri(&mut self, pri: SegmentMessage, outbox: &mut Outbox<'_>) {
        let new_segments = pri.segments.segments().to_vec();

        self.forest.begin_generation(&new_segments);
        if self.follows_previous(&new_segments, &pri.geometry) {
            for (old, new) in Self::touching_pairs(&self.old_segments, &new_segments) {
                self.forest.connect(old, new);
            }
        } else {
            self.logger.detail(&format!(
                "azimuth {} does not follow the previous PRI, closing open extractions",
                new_segments[0].azimuth()
            ));
        }

        let finished = self.forest.take_finished();
        if let Some((timestamp, geometry)) = self.previous {
            for list in finished {
                self.emit(outbox, timestamp, geometry, list);
            }
        }

        self.forest.attach_new_segments();

        let limit = self.ring_limit(&pri.geometry);
        let oversized = self.forest.take_oversized(limit);
        if !oversized.is_empty() {
            self.ring_filtered += oversized.len();
            self.logger.record(&format!(
                "ring filter completed {} extraction(s) spanning more than {} azimuths",
                oversized.len(),
                limit
            ));
        }
        for list in oversized {
            self.emit(outbox, pri.timestamp(), pri.geometry, list);
        }

        self.forest.end_generation();
        self.old_segments = new_segments;
        self.previous = Some((pri.timestamp(), pri.geometry));
    }
}

impl Default for SegmentConnector {
    fn default() -> Self {
        Self::new(SegmentConnectorConfig::default())
    }
}

impl Configurable for SegmentConnector {
    type Config = SegmentConnectorConfig;

    fn config(&self) -> &SegmentConnectorConfig {
        &self.config
    }

    fn apply_config(&mut self, config: SegmentConnectorConfig) -> StageResult<()> {
        if config.scan_resolution == 1 {
            return Err(StageError::InvalidConfig(
                "scan_resolution must be 0 or at least 2".into(),
            ));
        }
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for SegmentConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()> {
        let pri = match message {
            Message::Segments(pri) => pri,
            other => {
                self.metrics.record_rejected();
                return Err(StageError::UnexpectedMessage {
                    stage: Self::NAME,
                    kind: other.kind(),
                });
            }
        };
        self.metrics.record_processed();

        let mut outbox = Outbox::new(sink);
        if self.config.enabled {
            self.connect_pri(pri, &mut outbox);
        } else {
            outbox.send(Message::Segments(pri));
        }
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, sink: &mut dyn MessageSink) -> StageResult<()> {
        let mut outbox = Outbox::new(sink);
        let pending = self.forest.drain();
        if let Some((timestamp, geometry)) = self.previous.take() {
            for list in pending {
                self.emit(&mut outbox, timestamp, geometry, list);
            }
        }
        self.old_segments.clear();
        self.ring_filtered = 0;
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("active_trees", self.forest.active_trees() as f64)
            .with_counter("ring_filtered", self.ring_filtered as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageHeader;

    struct RefusingSink;

    impl MessageSink for RefusingSink {
        fn send(&mut self, _message: Message) -> bool {
            false
        }
    }

    fn seg(azimuth: u32, start: u32, stop: u32) -> Segment {
        Segment::new(azimuth, start, stop).unwrap()
    }

    fn pri(azimuth: u32, segments: Vec<Segment>) -> Message {
        let mut list = SegmentList::with_span(1);
        for segment in segments {
            list.push(segment);
        }
        Message::Segments(SegmentMessage::new(
            MessageHeader::new(u64::from(azimuth) + 1, f64::from(azimuth) * 0.01),
            ScanGeometry::new(16, 0.0, 1.0),
            list,
        ))
    }

    fn extractions(messages: &[Message]) -> Vec<&SegmentList> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Segments(msg) => Some(&msg.segments),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sweep_finds_every_touching_pair() {
        let old = [seg(0, 0, 5), seg(0, 7, 9), seg(0, 20, 22)];
        let new = [seg(1, 0, 3), seg(1, 5, 6), seg(1, 10, 12), seg(1, 25, 30)];
        assert_eq!(
            SegmentConnector::touching_pairs(&old, &new),
            vec![(0, 0), (0, 1), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn diagonal_neighbours_join_but_two_gate_gap_does_not() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 10, 12), seg(0, 40, 42)]), &mut sink).unwrap();
        connector.process(pri(1, vec![seg(1, 13, 15), seg(1, 45, 47)]), &mut sink).unwrap();
        connector.process(pri(2, vec![]), &mut sink).unwrap();

        let lists = extractions(&sink);
        assert_eq!(lists.len(), 3);
        let joined = lists.iter().find(|l| l.len() == 2).unwrap();
        assert_eq!(joined.span(), 2);
        assert_eq!(lists.iter().filter(|l| l.len() == 1).count(), 2);
    }

    #[test]
    fn one_empty_gate_between_segments_still_connects() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 10, 12)]), &mut sink).unwrap();
        connector.process(pri(1, vec![seg(1, 14, 16)]), &mut sink).unwrap();
        connector.process(pri(2, vec![]), &mut sink).unwrap();

        let lists = extractions(&sink);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 2);
        assert_eq!(lists[0].span(), 2);
    }

    #[test]
    fn skipped_azimuth_closes_open_extractions() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 10, 12)]), &mut sink).unwrap();
        connector.process(pri(2, vec![seg(2, 10, 12)]), &mut sink).unwrap();
        assert_eq!(extractions(&sink).len(), 1);
        connector.process(pri(3, vec![]), &mut sink).unwrap();

        let lists = extractions(&sink);
        assert_eq!(lists.len(), 2);
        assert!(lists.iter().all(|l| l.len() == 1 && l.span() == 1));
    }

    #[test]
    fn successor_wraps_around_the_scan() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(15, vec![seg(15, 4, 6)]), &mut sink).unwrap();
        connector.process(pri(0, vec![seg(0, 4, 6)]), &mut sink).unwrap();
        connector.process(pri(1, vec![]), &mut sink).unwrap();

        let lists = extractions(&sink);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].span(), 2);
    }

    #[test]
    fn refused_extraction_is_not_emitted_again() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 10, 12)]), &mut sink).unwrap();

        let err = connector.process(pri(1, vec![]), &mut RefusingSink).unwrap_err();
        assert!(matches!(
            err,
            StageError::Delivery { stage: "SegmentConnector", failed: 1 }
        ));
        assert_eq!(connector.status().delivery_failures, 1);
        assert_eq!(connector.status().counter("active_trees"), Some(0.0));

        connector.process(pri(2, vec![]), &mut sink).unwrap();
        connector.reset(&mut sink).unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn extraction_is_emitted_once_no_new_segment_reaches_it() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 10, 12)]), &mut sink).unwrap();
        connector.process(pri(1, vec![seg(1, 11, 11)]), &mut sink).unwrap();
        assert!(sink.is_empty());
        connector.process(pri(2, vec![seg(2, 50, 52)]), &mut sink).unwrap();
        let lists = extractions(&sink);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].cell_count(), 4);
        assert_eq!(lists[0].span(), 2);
        assert_eq!(sink[0].timestamp(), 0.01);
    }

    #[test]
    fn two_blobs_bridged_by_one_segment_become_one_extraction() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 0, 2), seg(0, 10, 12)]), &mut sink).unwrap();
        connector.process(pri(1, vec![seg(1, 0, 2), seg(1, 10, 12)]), &mut sink).unwrap();
        connector.process(pri(2, vec![seg(2, 0, 12)]), &mut sink).unwrap();
        connector.process(pri(3, vec![]), &mut sink).unwrap();

        let lists = extractions(&sink);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 5);
        assert_eq!(lists[0].span(), 3);
    }

    #[test]
    fn ring_filter_force_completes_regions_wider_than_half_a_scan() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        for azimuth in 0..9 {
            connector.process(pri(azimuth, vec![seg(azimuth, 3, 4)]), &mut sink).unwrap();
        }
        let lists = extractions(&sink);
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].span(), 9);
        assert_eq!(connector.status().counter("ring_filtered"), Some(1.0));
        assert_eq!(connector.status().counter("active_trees"), Some(0.0));
    }

    #[test]
    fn reset_flushes_growing_extractions() {
        let mut connector = SegmentConnector::default();
        let mut sink: Vec<Message> = Vec::new();
        connector.process(pri(0, vec![seg(0, 1, 2), seg(0, 8, 9)]), &mut sink).unwrap();
        assert!(sink.is_empty());
        connector.reset(&mut sink).unwrap();
        assert_eq!(extractions(&sink).len(), 2);
        assert_eq!(connector.status().counter("active_trees"), Some(0.0));
    }
}
