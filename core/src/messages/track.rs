use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{Extraction, MessageHeader};
use crate::math::geodetic::GeodeticPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    Tentative,
    Confirmed,
    Dropping,
}

/// Track report. The alpha-beta tracker sends one per update and a final
/// `Dropping` one; the initiator sends a single `Tentative` one per track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMessage {
    pub header: MessageHeader,
    pub track_id: String,
    pub status: TrackStatus,
    /// First report for this track id.
    pub is_new: bool,
    pub when: f64,
    /// East/north/up metres relative to the radar.
    pub position: Vector3<f64>,
    /// East/north/up metres per second.
    pub velocity: Vector3<f64>,
    pub estimate: Option<GeodeticPoint>,
    /// Degrees/s latitude, degrees/s longitude, metres/s altitude.
    pub geodetic_velocity: Option<Vector3<f64>>,
    pub num_extractions: usize,
    pub extractions: Vec<Extraction>,
}

impl TrackMessage {
    pub fn new(
        header: MessageHeader,
        track_id: impl Into<String>,
        status: TrackStatus,
        when: f64,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> Self {
        Self {
            header,
            track_id: track_id.into(),
            status,
            is_new: false,
            when,
            position,
            velocity,
            estimate: None,
            geodetic_velocity: None,
            num_extractions: 0,
            extractions: Vec::new(),
        }
    }

    pub fn is_dropping(&self) -> bool {
        self.status == TrackStatus::Dropping
    }
}
