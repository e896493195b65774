pub mod extraction;
pub mod header;
pub mod segments;
pub mod track;
pub mod video;

use serde::{Deserialize, Serialize};

pub use extraction::{Extraction, ExtractionsMessage};
pub use header::{MessageHeader, SequenceCounter};
pub use segments::{Centroid, ExtractionStats, Segment, SegmentList, SegmentMessage};
pub use track::{TrackMessage, TrackStatus};
pub use video::{PriVideo, ScanGeometry};

/// Every message type that flows between stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Video(PriVideo),
    Segments(SegmentMessage),
    Extractions(ExtractionsMessage),
    Track(TrackMessage),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Video(_) => "video",
            Message::Segments(_) => "segments",
            Message::Extractions(_) => "extractions",
            Message::Track(_) => "track",
        }
    }

    pub fn header(&self) -> &MessageHeader {
        match self {
            Message::Video(msg) => &msg.header,
            Message::Segments(msg) => &msg.header,
            Message::Extractions(msg) => &msg.header,
            Message::Track(msg) => &msg.header,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.header().timestamp
    }
}
