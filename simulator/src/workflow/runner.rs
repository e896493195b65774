use crate::generator::scenario::{GeneratorConfig, ScenarioGenerator};
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use plotcore::messages::{Message, PriVideo, TrackMessage, TrackStatus};
use plotcore::prelude::{Configurable, ProcessingStage};
use plotcore::processing::{
    PriSegmenter, Segment2Extraction, SegmentConnector, SegmentSplitter, SegmentStatsStage,
};
use plotcore::telemetry::StageStatus;
use plotcore::tracking::{AbTracker, TrackInitiator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub scenario: Option<String>,
    pub pri_count: usize,
    pub point_count: usize,
    /// Alpha-beta tracker output in emission order.
    pub track_reports: Vec<TrackMessage>,
    /// Track initiator declarations.
    pub initiations: Vec<TrackMessage>,
    pub statuses: Vec<StageStatus>,
}

impl WorkflowResult {
    /// Distinct alpha-beta track ids that reached `Confirmed`.
    pub fn confirmed_tracks(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .track_reports
            .iter()
            .filter(|report| report.status == TrackStatus::Confirmed)
            .map(|report| report.track_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// The stages of one run, wired in processing order.
struct Chain {
    segmenter: PriSegmenter,
    connector: SegmentConnector,
    splitter: SegmentSplitter,
    stats: SegmentStatsStage,
    reducer: Segment2Extraction,
    tracker: AbTracker,
    initiator: TrackInitiator,
}

/// Hands every input to `stage`, optionally flushing it afterwards, and
/// returns what it emitted.
fn pass(
    stage: &mut dyn ProcessingStage,
    inputs: Vec<Message>,
    flush: bool,
) -> anyhow::Result<Vec<Message>> {
    let mut outputs = Vec::new();
    for message in inputs {
        let kind = message.kind();
        stage
            .process(message, &mut outputs)
            .with_context(|| format!("{} failed on a {kind} message", stage.name()))?;
    }
    if flush {
        stage
            .reset(&mut outputs)
            .with_context(|| format!("flushing {}", stage.name()))?;
    }
    Ok(outputs)
}

impl Chain {
    fn build(config: &WorkflowConfig) -> anyhow::Result<Self> {
        let mut segmenter = PriSegmenter::default();
        segmenter
            .apply_config(config.segmenter.clone())
            .context("configuring segmenter")?;
        let mut connector = SegmentConnector::default();
        connector
            .apply_config(config.connector.clone())
            .context("configuring segment connector")?;
        let mut splitter = SegmentSplitter::default();
        splitter
            .apply_config(config.splitter.clone())
            .context("configuring segment splitter")?;
        let mut stats = SegmentStatsStage::default();
        stats
            .apply_config(config.stats.clone())
            .context("configuring segment stats")?;
        let mut reducer = Segment2Extraction::default();
        reducer
            .apply_config(config.reducer.clone())
            .context("configuring segment2extraction")?;
        let tracker = AbTracker::new(config.tracker.clone()).context("configuring tracker")?;
        let initiator =
            TrackInitiator::new(config.initiator.clone()).context("configuring initiator")?;

        Ok(Self {
            segmenter,
            connector,
            splitter,
            stats,
            reducer,
            tracker,
            initiator,
        })
    }

    /// Video goes to the segmenter and, ahead of any extraction, to the
    /// splitter, which forwards it to the stats stage. Point batches fan
    /// out to both trackers.
    fn route(
        &mut self,
        video: Option<PriVideo>,
        flush: bool,
        result: &mut WorkflowResult,
    ) -> anyhow::Result<()> {
        let videos: Vec<Message> = video.into_iter().map(Message::Video).collect();
        result.pri_count += videos.len();

        let to_connector = pass(&mut self.segmenter, videos.clone(), flush)?;
        let extractions = pass(&mut self.connector, to_connector, flush)?;
        let mut to_splitter = videos;
        to_splitter.extend(extractions);
        let to_stats = pass(&mut self.splitter, to_splitter, flush)?;
        let to_reducer = pass(&mut self.stats, to_stats, flush)?;
        let points = pass(&mut self.reducer, to_reducer, flush)?;

        result.point_count += points
            .iter()
            .map(|message| match message {
                Message::Extractions(batch) => batch.len(),
                _ => 0,
            })
            .sum::<usize>();

        for message in pass(&mut self.tracker, points.clone(), flush)? {
            if let Message::Track(report) = message {
                result.track_reports.push(report);
            }
        }
        for message in pass(&mut self.initiator, points, flush)? {
            if let Message::Track(report) = message {
                result.initiations.push(report);
            }
        }
        Ok(())
    }

    fn statuses(&self) -> Vec<StageStatus> {
        vec![
            self.segmenter.status(),
            self.connector.status(),
            self.splitter.status(),
            self.stats.status(),
            self.reducer.status(),
            self.tracker.status(),
            self.initiator.status(),
        ]
    }
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        self.execute_scenario(&self.config.generator)
    }

    /// Runs a fresh chain over every scan of `scenario`, then flushes it.
    pub fn execute_scenario(&self, scenario: &GeneratorConfig) -> anyhow::Result<WorkflowResult> {
        let mut chain = Chain::build(&self.config)?;
        let mut generator = ScenarioGenerator::new(scenario.clone())?;
        let mut result = WorkflowResult {
            scenario: scenario.scenario.clone(),
            ..Default::default()
        };

        for scan in 0..scenario.scans {
            for video in generator.scan(scan) {
                chain
                    .route(Some(video), false, &mut result)
                    .with_context(|| format!("processing scan {scan}"))?;
            }
        }
        chain
            .route(None, true, &mut result)
            .context("flushing the chain")?;
        result.statuses = chain.statuses();

        log::info!(
            "run complete: {} PRIs, {} points, {} confirmed tracks, {} initiations",
            result.pri_count,
            result.point_count,
            result.confirmed_tracks().len(),
            result.initiations.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::scenario::TargetConfig;

    fn small_config() -> WorkflowConfig {
        let mut cfg = WorkflowConfig::from_args(4, 360, 300, 1);
        cfg.generator.gate_size = 10.0;
        cfg.generator.rotation_duration = 1.0;
        cfg.generator.targets = vec![
            TargetConfig {
                range: 2000.0,
                bearing: 60.0,
                velocity: [10.0, 0.0],
                ..Default::default()
            },
            TargetConfig {
                range: 2500.0,
                bearing: 250.0,
                ..Default::default()
            },
        ];
        cfg.tracker.initiation_count = 2;
        cfg.sync_rotation();
        cfg
    }

    #[test]
    fn runner_executes_workflow() {
        let cfg = small_config();
        let result = Runner::new(cfg.clone()).execute().unwrap();
        assert_eq!(result.pri_count, 4 * 360);
        assert_eq!(result.point_count, 2 * 4);
        assert_eq!(result.confirmed_tracks(), vec!["1", "2"]);
        assert_eq!(result.initiations.len(), 2);
        assert_eq!(result.statuses.len(), 7);
        assert_eq!(result.statuses[0].processed, 4 * 360);
    }

    #[test]
    fn flush_drops_every_live_track() {
        let result = Runner::new(small_config()).execute().unwrap();
        let dropped = result
            .track_reports
            .iter()
            .filter(|report| report.is_dropping())
            .count();
        assert_eq!(dropped, 2);
    }

    #[test]
    fn invalid_stage_config_is_reported() {
        let mut cfg = small_config();
        cfg.reducer.buffer_length = 0;
        let err = Runner::new(cfg).execute().unwrap_err();
        assert!(format!("{err:#}").contains("segment2extraction"));
    }
}
