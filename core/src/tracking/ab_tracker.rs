use serde::{Deserialize, Serialize};

use crate::messages::{
    ExtractionsMessage, Message, SequenceCounter, TrackMessage, TrackStatus,
};
use crate::prelude::{
    Configurable, MessageSink, Outbox, ProcessingStage, StageError, StageResult,
};
use crate::telemetry::{LogManager, MetricsRecorder, StageStatus};
use crate::tracking::track::{Gains, Track, TrackState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbTrackerConfig {
    pub enabled: bool,
    pub alpha: f64,
    pub beta: f64,
    /// Gate around a track's prediction, metres.
    pub association_radius: f64,
    /// Detections needed to promote an initiating track.
    pub initiation_count: usize,
    pub initiation_rotation_count: f64,
    pub coast_rotation_count: f64,
    /// Seconds per antenna revolution.
    pub rotation_duration: f64,
    pub time_scaling: f64,
    /// Updates closer together than this, seconds, are ignored.
    pub min_update_interval: f64,
}

impl Default for AbTrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.5,
            beta: 0.3,
            association_radius: 100.0,
            initiation_count: 3,
            initiation_rotation_count: 3.0,
            coast_rotation_count: 3.0,
            rotation_duration: 4.0,
            time_scaling: 1.0,
            min_update_interval: 1e-3,
        }
    }
}

impl AbTrackerConfig {
    fn validate(&self) -> StageResult<()> {
        if !(0.0..=2.0).contains(&self.alpha) || !(0.0..=2.0).contains(&self.beta) {
            return Err(StageError::InvalidConfig(
                "alpha and beta must lie in 0..=2".into(),
            ));
        }
        if self.association_radius <= 0.0 {
            return Err(StageError::InvalidConfig(
                "association_radius must be positive".into(),
            ));
        }
        if self.initiation_count == 0 {
            return Err(StageError::InvalidConfig(
                "initiation_count must be at least 1".into(),
            ));
        }
        if self.rotation_duration <= 0.0 || self.time_scaling <= 0.0 {
            return Err(StageError::InvalidConfig(
                "rotation_duration and time_scaling must be positive".into(),
            ));
        }
        if self.initiation_rotation_count < 0.0 || self.coast_rotation_count < 0.0 {
            return Err(StageError::InvalidConfig(
                "rotation counts must not be negative".into(),
            ));
        }
        if self.min_update_interval < 0.0 {
            return Err(StageError::InvalidConfig(
                "min_update_interval must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// Durations and squared gate computed from the config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedLimits {
    pub max_initiation_duration: f64,
    pub coast_duration: f64,
    pub association_radius_squared: f64,
}

impl DerivedLimits {
    pub fn from_config(config: &AbTrackerConfig) -> Self {
        let period = config.rotation_duration * config.time_scaling;
        Self {
            max_initiation_duration: config.initiation_rotation_count * period,
            coast_duration: config.coast_rotation_count * period,
            association_radius_squared: config.association_radius * config.association_radius,
        }
    }
}

/// Nearest-neighbour alpha-beta tracker with an initiate/alive/drop
/// lifecycle per track.
pub struct AbTracker {
    config: AbTrackerConfig,
    limits: DerivedLimits,
    tracks: Vec<Track>,
    next_id: u64,
    sequence: SequenceCounter,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl AbTracker {
    pub const NAME: &'static str = "AbTracker";

    /// Builds a tracker, rejecting an invalid config.
    pub fn new(config: AbTrackerConfig) -> StageResult<Self> {
        config.validate()?;
        Ok(Self {
            limits: DerivedLimits::from_config(&config),
            config,
            tracks: Vec::new(),
            next_id: 1,
            sequence: SequenceCounter::new(),
            metrics: MetricsRecorder::new(),
            logger: LogManager::new(Self::NAME),
        })
    }

    pub fn limits(&self) -> &DerivedLimits {
        &self.limits
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn gains(&self) -> Gains {
        Gains {
            alpha: self.config.alpha,
            beta: self.config.beta,
            min_update_interval: self.config.min_update_interval,
        }
    }

    /// Index of the closest associable track whose prediction at `when`
    /// lies inside the gate around `position`.
    fn nearest(&self, position: &nalgebra::Vector3<f64>, when: f64) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| track.is_associable())
            .map(|(index, track)| (index, (track.predict(when) - position).norm_squared()))
            .filter(|&(_, distance)| distance < self.limits.association_radius_squared)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index)
    }

    fn associate(&mut self, batch: &ExtractionsMessage) {
        let gains = self.gains();
        for extraction in &batch.extractions {
            let position = extraction.position();
            let when = extraction.when;
            match self.nearest(&position, when) {
                Some(index) => {
                    let track = &mut self.tracks[index];
                    if !track.update(&position, when, &gains) {
                        continue;
                    }
                    let promoted = track.register_detection(
                        when,
                        self.limits.max_initiation_duration,
                        self.config.initiation_count,
                    );
                    if promoted {
                        self.logger.record(&format!("track {} promoted at t={when}", track.id));
                    }
                }
                None => {
                    let id = self.next_id.to_string();
                    self.next_id += 1;
                    self.logger.detail(&format!("track {id} initiating at t={when}"));
                    let mut track = Track::new(id, position, when);
                    track.register_detection(
                        when,
                        self.limits.max_initiation_duration,
                        self.config.initiation_count,
                    );
                    self.tracks.push(track);
                }
            }
        }
    }

    fn report(&mut self, track: &Track, status: TrackStatus, when: f64, is_new: bool) -> Message {
        let header = self.sequence.next_header(when);
        let mut message = TrackMessage::new(
            header,
            track.id.clone(),
            status,
            when,
            track.predict(when),
            track.velocity,
        );
        message.is_new = is_new;
        message.num_extractions = track.hits;
        Message::Track(message)
    }

    /// Emits reports for updated tracks, drops stale ones and discards
    /// initiating tracks that ran out of time.
    fn revisit(&mut self, now: f64, outbox: &mut Outbox<'_>) {
        let mut tracks = std::mem::take(&mut self.tracks);
        tracks.retain_mut(|track| {
            let updated = track.take_updated();
            match track.state {
                TrackState::Alive if updated => {
                    let is_new = track.mark_reported();
                    let when = track.last_update;
                    let report = self.report(track, TrackStatus::Confirmed, when, is_new);
                    outbox.send(report);
                    true
                }
                TrackState::Alive => {
                    if !track.is_stale(now, self.limits.coast_duration) {
                        return true;
                    }
                    track.state = TrackState::Dropping;
                    self.logger.record(&format!("track {} dropped at t={now}", track.id));
                    let report = self.report(track, TrackStatus::Dropping, now, false);
                    outbox.send(report);
                    false
                }
                TrackState::Initiating => {
                    if !track.initiation_expired(now, self.limits.max_initiation_duration) {
                        return true;
                    }
                    track.state = TrackState::Uninitiating;
                    self.logger.detail(&format!("track {} failed to initiate", track.id));
                    false
                }
                TrackState::Uninitiating | TrackState::Dropping => false,
            }
        });
        self.tracks = tracks;
    }
}

impl Configurable for AbTracker {
    type Config = AbTrackerConfig;

    fn config(&self) -> &AbTrackerConfig {
        &self.config
    }

    fn apply_config(&mut self, config: AbTrackerConfig) -> StageResult<()> {
        config.validate()?;
        self.limits = DerivedLimits::from_config(&config);
        self.config = config;
        Ok(())
    }
}

impl ProcessingStage for AbTracker {
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

        let now = batch
            .extractions
            .iter()
            .map(|extraction| extraction.when)
            .fold(batch.header.timestamp, f64::max);
        self.associate(&batch);

        let mut outbox = Outbox::new(sink);
        self.revisit(now, &mut outbox);
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn reset(&mut self, sink: &mut dyn MessageSink) -> StageResult<()> {
        let mut outbox = Outbox::new(sink);
        let tracks = std::mem::take(&mut self.tracks);
        for mut track in tracks {
            if track.state == TrackState::Alive {
                track.state = TrackState::Dropping;
                let when = track.last_update;
                let report = self.report(&track, TrackStatus::Dropping, when, false);
                outbox.send(report);
            }
        }
        self.logger.record("all tracks cleared");
        outbox.finish(Self::NAME, &self.metrics)
    }

    fn status(&self) -> StageStatus {
        StageStatus::new(Self::NAME, self.config.enabled, &self.metrics)
            .with_counter("track_count", self.tracks.len() as f64)
            .with_counter("alpha", self.config.alpha)
            .with_counter("beta", self.config.beta)
    }
}
