use serde::{Deserialize, Serialize};

use crate::messages::{
    Extraction, ExtractionsMessage, Message, SegmentMessage, SequenceCounter,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};

/// Which cell of an extraction becomes its point report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointPolicy {
    Centroid,
    Peak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment2ExtractionConfig {
    pub enabled: bool,
    pub policy: PointPolicy,
    /// Points collected before a batch is sent.
    pub buffer_length: usize,
    /// Elevation assigned to every point, radians.
    pub elevation: f64,
}

impl Default for Segment2ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: PointPolicy::Centroid,
            buffer_length: 1,
            elevation: 0.0,
        }
    }
}

/// Reduces annotated extractions to point reports and batches them.
pub struct Segment2Extraction {
    config: Segment2ExtractionConfig,
    pending: Vec<Extraction>,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl Segment2Extraction {
    pub const NAME: &'static str = "Segment2Extraction";

    pub fn new(config: Segment2ExtractionConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Point report for one extraction, `None` without statistics.
    pub fn reduce(&self, extraction: &SegmentMessage) -> Option<Extraction> {
        let stats = extraction.segments.stats()?;
        let peak = (f64::from(stats.peak_azimuth), f64::from(stats.peak_range));
        let (azimuth, gate) = match (self.config.policy, stats.centroid) {
            (PointPolicy::Centroid, Some(centroid)) => (centroid.azimuth, centroid.range),
            _ => peak,
        };

        let geometry = &extraction.geometry;
        let point = Extraction::new(
            extraction.timestamp(),
            geometry.range_metres(gate),
            geometry.azimuth_radians(azimuth),
            self.config.elevation,
        )
        .with_attribute("peak_power", f64::from(stats.peak_power))
        .with_attribute("total_power", stats.total_power)
        .with_attribute("cell_count", stats.cell_count as f64)
        .with_attribute("span", f64::from(extraction.segments.span()));
        Some(point)
    }

    fn flush(&mut self, outbox: &mut Outbox<'_>) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let timestamp = batch.last().map_or(0.0, |point| point.when);
        let header = self.sequence.next_header(timestamp);
        outbox.send(Message::Extractions(ExtractionsMessage::new(header, batch)));
    }
}

impl Default for Segment2Extraction {
    fn default() -> Self {
        Self::new(Segment2ExtractionConfig::default())
    }
}

impl Configurable for Segment2Extraction {
    type Config = Segment2ExtractionConfig;

    fn config(&self) -> &Segment2ExtractionConfig {
        &self.config
    }

    fn apply_config(&mut self, config: Segment2ExtractionConfig) -> StageResult<()> {
        if config.buffer_length == 0 {
            return Err(StageError::InvalidConfig(
                "buffer_length must be at least 1".into(),
            ));
        }
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for Segment2Extraction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()> {
        let extraction = match message {
            Message::Segments(extraction) => extraction,
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

        let Some(point) = self.reduce(&extraction) else {
            self.metrics.record_rejected();
            self.logger.warn(&format!(
                "extraction {} arrived without statistics",
                extraction.header.sequence
            ));
            return Ok(());
        };
        self.pending.push(point);

        let mut outbox = Outbox::new(sink);
        if self.pending.len() >= self.config.buffer_length {
            self.flush(&mut outbox);
        }
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, sink: &mut dyn MessageSink) -> StageResult<()> {
        let mut outbox = Outbox::new(sink);
        self.flush(&mut outbox);
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("pending", self.pending.len() as f64)
            .with_counter("buffer_length", self.config.buffer_length as f64)
    }
}
