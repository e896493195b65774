use anyhow::Context;
use plotcore::processing::{
    PriSegmenterConfig, Segment2ExtractionConfig, SegmentConnectorConfig, SegmentSplitterConfig,
    SegmentStatsConfig,
};
use plotcore::tracking::{AbTrackerConfig, TrackInitiatorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::generator::scenario::GeneratorConfig;

/// Everything one simulator run needs: the synthetic scenario plus the
/// parameters of every stage in the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub generator: GeneratorConfig,
    pub segmenter: PriSegmenterConfig,
    pub connector: SegmentConnectorConfig,
    pub splitter: SegmentSplitterConfig,
    pub stats: SegmentStatsConfig,
    pub reducer: Segment2ExtractionConfig,
    pub tracker: AbTrackerConfig,
    pub initiator: TrackInitiatorConfig,
    /// Address the status bridge listens on.
    pub bind: SocketAddr,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            segmenter: PriSegmenterConfig::default(),
            connector: SegmentConnectorConfig::default(),
            splitter: SegmentSplitterConfig::default(),
            stats: SegmentStatsConfig::default(),
            reducer: Segment2ExtractionConfig::default(),
            tracker: AbTrackerConfig::default(),
            initiator: TrackInitiatorConfig::default(),
            bind: SocketAddr::from(([127, 0, 0, 1], 9000)),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    /// Default chain driven by a generator sized from the command line.
    /// The trackers inherit the generator's rotation period.
    pub fn from_args(scans: u32, azimuth_count: u32, gate_count: usize, seed: u64) -> Self {
        let mut config = Self::default();
        config.generator.scans = scans;
        config.generator.azimuth_count = azimuth_count;
        config.generator.gate_count = gate_count;
        config.generator.seed = seed;
        config.sync_rotation();
        config
    }

    pub fn sync_rotation(&mut self) {
        let rotation = self.generator.rotation_duration;
        self.tracker.rotation_duration = rotation;
        self.initiator.rotation_duration = rotation;
    }
}
