use plotcore::messages::TrackMessage;
use plotcore::telemetry::StageStatus;
use serde::{Deserialize, Serialize};

use crate::workflow::runner::WorkflowResult;

/// Snapshot served by the status bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusModel {
    pub scenario: Option<String>,
    pub pri_count: usize,
    pub point_count: usize,
    pub confirmed_tracks: usize,
    pub stages: Vec<StageStatus>,
    pub track_reports: Vec<TrackMessage>,
    pub initiations: Vec<TrackMessage>,
}

impl From<WorkflowResult> for StatusModel {
    fn from(result: WorkflowResult) -> Self {
        Self {
            confirmed_tracks: result.confirmed_tracks().len(),
            scenario: result.scenario,
            pri_count: result.pri_count,
            point_count: result.point_count,
            stages: result.statuses,
            track_reports: result.track_reports,
            initiations: result.initiations,
        }
    }
}
