use serde::{Deserialize, Serialize};

use crate::messages::{
    Message, PriVideo, Segment, SegmentList, SegmentMessage, SequenceCounter,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriSegmenterConfig {
    pub enabled: bool,
    /// Samples at or above this value are part of a segment.
    pub threshold: f32,
}

impl Default for PriSegmenterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 100.0,
        }
    }
}

/// Thresholds each PRI into runs of over-threshold range gates.
pub struct PriSegmenter {
    config: PriSegmenterConfig,
    busy: bool,
    pri_count: usize,
    segment_count: usize,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl PriSegmenter {
    pub const NAME: &'static str = "PriSegmenter";

    pub fn new(config: PriSegmenterConfig) -> Self {
        Self {
            config,
            busy: false,
            pri_count: 0,
            segment_count: 0,
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        }
    }

    /// Maximal runs of `samples[i] >= threshold`, in increasing range order.
    pub fn segment(azimuth: u32, samples: &[f32], threshold: f32) -> SegmentList {
        let mut segments = SegmentList::with_span(1);
        let mut pending: Option<u32> = None;

        for (gate, &value) in samples.iter().enumerate() {
            let gate = gate as u32;
            match (value >= threshold, pending) {
                (true, None) => pending = Some(gate),
                (false, Some(start)) => {
                    push_run(&mut segments, azimuth, start, gate - 1);
                    pending = None;
                }
                _ => {}
            }
        }
        if let Some(start) = pending {
            push_run(&mut segments, azimuth, start, samples.len() as u32 - 1);
        }
        segments
    }

    fn process_video(&mut self, video: PriVideo, outbox: &mut Outbox<'_>) {
        self.pri_count += 1;
        let segments = Self::segment(video.azimuth, &video.samples, self.config.threshold);

        if segments.is_empty() {
            if self.busy {
                // Busy -> idle: one empty list tells downstream the detections ended.
                self.busy = false;
                self.logger
                    .detail(&format!("idle from azimuth {}", video.azimuth));
                let header = self.sequence.next_header(video.timestamp());
                outbox.send(Message::Segments(SegmentMessage::new(
                    header,
                    video.geometry,
                    SegmentList::new(),
                )));
            }
            return;
        }

        self.busy = true;
        self.segment_count += segments.len();
        let header = self.sequence.next_header(video.timestamp());
        outbox.send(Message::Segments(SegmentMessage::new(
            header,
            video.geometry,
            segments,
        )));
    }
}

fn push_run(segments: &mut SegmentList, azimuth: u32, start: u32, stop: u32) {
    if let Some(segment) = Segment::new(azimuth, start, stop) {
        segments.push(segment);
    }
}

impl Default for PriSegmenter {
    fn default() -> Self {
        Self::new(PriSegmenterConfig::default())
    }
}

impl Configurable for PriSegmenter {
    type Config = PriSegmenterConfig;

    fn config(&self) -> &PriSegmenterConfig {
        &self.config
    }

    fn apply_config(&mut self, config: PriSegmenterConfig) -> StageResult<()> {
        if !config.threshold.is_finite() {
            return Err(StageError::InvalidConfig(
                "threshold must be finite".into(),
            ));
        }
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for PriSegmenter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()> {
        let video = match message {
            Message::Video(video) => video,
            other => {
                self.metrics.record_rejected();
                return Err(StageError::UnexpectedMessage {
                    stage: Self::NAME,
                    kind: other.kind(),
                });
            }
        };
        self.metrics.record_processed();
        if !self.config.enabled {
            return Ok(());
        }

        let mut outbox = Outbox::new(sink);
        self.process_video(video, &mut outbox);
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, _sink: &mut dyn MessageSink) -> StageResult<()> {
        self.busy = false;
        self.pri_count = 0;
        self.segment_count = 0;
        Ok(())
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("threshold", f64::from(self.config.threshold))
            .with_counter("pri_count", self.pri_count as f64)
            .with_counter("segment_count", self.segment_count as f64)
            .with_counter("busy", if self.busy { 1.0 } else { 0.0 })
    }
}
