use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::math::geodetic::{GeodeticConverter, GeodeticPoint, SphericalEarth};
use crate::math::geometry;
use crate::messages::{
    Extraction, Message, SequenceCounter, TrackMessage, TrackStatus,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};
use crate::tracking::correlation_grid::{AgeWindow, CorrelationGrid, GridEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInitiatorConfig {
    pub enabled: bool,
    /// Correlation distance and grid bin edge, metres.
    pub search_radius: f64,
    /// Half-width of the square covered by the grid, metres.
    pub max_range: f64,
    /// Detections a chain needs before a track is declared.
    pub correlation_scans: usize,
    pub rotation_duration: f64,
    pub time_scaling: f64,
    pub too_new_rotations: f64,
    pub too_old_rotations: f64,
    pub very_old_rotations: f64,
    /// Altitude assumed for every target, metres above the reference surface.
    pub assumed_altitude: f64,
    /// Radar position.
    pub origin: GeodeticPoint,
}

impl Default for TrackInitiatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_radius: 500.0,
            max_range: 60_000.0,
            correlation_scans: 3,
            rotation_duration: 4.0,
            time_scaling: 1.0,
            too_new_rotations: 0.5,
            too_old_rotations: 1.5,
            very_old_rotations: 3.5,
            assumed_altitude: 0.0,
            origin: GeodeticPoint::default(),
        }
    }
}

impl TrackInitiatorConfig {
    fn validate(&self) -> StageResult<()> {
        if self.search_radius <= 0.0 || self.max_range <= 0.0 {
            return Err(StageError::InvalidConfig(
                "search_radius and max_range must be positive".into(),
            ));
        }
        if self.max_range / self.search_radius > 1_000.0 {
            return Err(StageError::InvalidConfig(format!(
                "grid of {} m bins over {} m is too large",
                self.search_radius, self.max_range
            )));
        }
        if self.correlation_scans < 2 {
            return Err(StageError::InvalidConfig(
                "correlation_scans must be at least 2".into(),
            ));
        }
        if self.rotation_duration <= 0.0 || self.time_scaling <= 0.0 {
            return Err(StageError::InvalidConfig(
                "rotation_duration and time_scaling must be positive".into(),
            ));
        }
        let ordered = 0.0 < self.too_new_rotations
            && self.too_new_rotations < self.too_old_rotations
            && self.too_old_rotations < self.very_old_rotations;
        if !ordered {
            return Err(StageError::InvalidConfig(
                "expected 0 < too_new < too_old < very_old".into(),
            ));
        }
        Ok(())
    }

    pub fn age_window(&self) -> AgeWindow {
        let period = self.rotation_duration * self.time_scaling;
        AgeWindow {
            too_new: self.too_new_rotations * period,
            too_old: self.too_old_rotations * period,
            very_old: self.very_old_rotations * period,
        }
    }
}

/// One-shot track declaration from detections correlated across scans.
pub struct TrackInitiator {
    config: TrackInitiatorConfig,
    window: AgeWindow,
    radius_squared: f64,
    grid: CorrelationGrid,
    converter: Box<dyn GeodeticConverter>,
    next_id: u64,
    initiated: usize,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl TrackInitiator {
    pub const NAME: &'static str = "TrackInitiator";

    pub fn new(config: TrackInitiatorConfig) -> StageResult<Self> {
        Self::with_converter(config, Box::new(SphericalEarth::default()))
    }

    pub fn with_converter(
        config: TrackInitiatorConfig,
        converter: Box<dyn GeodeticConverter>,
    ) -> StageResult<Self> {
        config.validate()?;
        Ok(Self {
            window: config.age_window(),
            radius_squared: config.search_radius * config.search_radius,
            grid: CorrelationGrid::new(config.max_range, config.search_radius)?,
            config,
            converter,
            next_id: 1,
            initiated: 0,
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        })
    }

    pub fn window(&self) -> &AgeWindow {
        &self.window
    }

    pub fn grid(&self) -> &CorrelationGrid {
        &self.grid
    }

    fn correlate(&mut self, extraction: Extraction, outbox: &mut Outbox<'_>) {
        let bin = match self.grid.bin(extraction.x, extraction.y) {
            Ok(bin) => bin,
            Err(err) => {
                self.metrics.record_rejected();
                self.logger
                    .warn(&format!("dropping detection at t={}: {err}", extraction.when));
                return;
            }
        };

        let now = extraction.when;
        let position = Vector3::new(extraction.x, extraction.y, 0.0);
        let found = self
            .grid
            .closest(bin, &position, now, &self.window, self.radius_squared);

        let mut entry = GridEntry {
            when: now,
            extraction,
            position,
            velocity: None,
            chain_length: 1,
            promoted: false,
        };
        let mut declare_from = None;
        if let Some(previous) = found.and_then(|at| self.grid.get_mut(at)) {
            previous.extraction.correlated = true;
            previous.extraction.num_correlations += 1;
            entry.extraction.correlated = true;
            entry.extraction.num_correlations = 1;
            entry.velocity = Some((position - previous.position) / (now - previous.when));
            entry.chain_length = previous.chain_length + 1;
            entry.promoted = previous.promoted;
            if entry.chain_length >= self.config.correlation_scans && !entry.promoted {
                previous.promoted = true;
                entry.promoted = true;
                declare_from = Some(previous.extraction.clone());
            }
        }

        if let Some(previous) = declare_from {
            let declaration = self.declare(&entry, previous);
            outbox.send(declaration);
        }
        self.grid.insert(bin, entry);
    }

    fn declare(&mut self, entry: &GridEntry, previous: Extraction) -> Message {
        let id = self.next_id.to_string();
        self.next_id += 1;
        self.initiated += 1;

        let origin = &self.config.origin;
        let extraction = &entry.extraction;
        let height = self.config.assumed_altitude - origin.altitude;
        let elevation = geometry::elevation_for_height(extraction.range, height);
        let enu = geometry::rae_to_enu(extraction.range, extraction.azimuth, elevation);
        let velocity = entry.velocity.unwrap_or_else(Vector3::zeros);

        let estimate =
            self.converter
                .rae_to_geodetic(origin, extraction.range, extraction.azimuth, elevation);
        let ahead = self.converter.enu_to_geodetic(origin, &(enu + velocity));
        let geodetic_velocity = Vector3::new(
            ahead.latitude - estimate.latitude,
            ahead.longitude - estimate.longitude,
            ahead.altitude - estimate.altitude,
        );

        self.logger.record(&format!(
            "track {id} initiated at t={} after {} correlated detections",
            entry.when, entry.chain_length
        ));

        let header = self.sequence.next_header(entry.when);
        let mut message = TrackMessage::new(
            header,
            id,
            TrackStatus::Tentative,
            entry.when,
            enu,
            velocity,
        );
        message.is_new = true;
        message.estimate = Some(estimate);
        message.geodetic_velocity = Some(geodetic_velocity);
        message.num_extractions = entry.chain_length;
        message.extractions = vec![previous, extraction.clone()];
        Message::Track(message)
    }
}

impl Configurable for TrackInitiator {
    type Config = TrackInitiatorConfig;

    fn config(&self) -> &TrackInitiatorConfig {
        &self.config
    }

    fn apply_config(&mut self, config: TrackInitiatorConfig) -> StageResult<()> {
        config.validate()?;
        let regrid = config.max_range != self.config.max_range
            || config.search_radius != self.config.search_radius;
        if regrid {
            self.grid = CorrelationGrid::new(config.max_range, config.search_radius)?;
            self.logger.record("grid geometry changed, correlation history cleared");
        }
        self.window = config.age_window();
        self.radius_squared = config.search_radius * config.search_radius;
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for TrackInitiator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn process(&mut self, message: Message, sink: &mut dyn MessageSink) -> StageResult<()> {
        let batch = match message {
            Message::Extractions(batch) => batch,
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
        for extraction in batch.extractions {
            self.correlate(extraction, &mut outbox);
        }
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, _sink: &mut dyn MessageSink) -> StageResult<()> {
        self.grid.clear();
        Ok(())
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("grid_entries", self.grid.len() as f64)
            .with_counter("tracks_initiated", self.initiated as f64)
    }
}
