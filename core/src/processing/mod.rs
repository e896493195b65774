pub mod pri_segmenter;
pub mod segment2extraction;
pub mod segment_connector;
pub mod segment_splitter;
pub mod segment_stats;
pub mod segment_tree;
pub mod video_buffer;

pub use pri_segmenter::{PriSegmenter, PriSegmenterConfig};
pub use segment2extraction::{PointPolicy, Segment2Extraction, Segment2ExtractionConfig};
pub use segment_connector::{SegmentConnector, SegmentConnectorConfig};
pub use segment_splitter::{Peak, SegmentSplitter, SegmentSplitterConfig};
pub use segment_stats::{SegmentStatsConfig, SegmentStatsStage};
pub use segment_tree::{Flavor, SegmentForest};
pub use video_buffer::VideoBuffer;
