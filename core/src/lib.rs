//! Plot-to-track processing chain for a rotating surveillance radar.
//!
//! PRI video is cut into threshold segments, connected into 2-D
//! extractions, split where targets overlap, measured, reduced to point
//! reports and finally associated into tracks. Every step is a
//! [`ProcessingStage`] exchanging [`Message`]s with an external router.

pub mod math;
pub mod messages;
pub mod prelude;
pub mod processing;
pub mod telemetry;
pub mod tracking;

pub use messages::Message;
pub use prelude::{Configurable, MessageSink, ProcessingStage, StageError, StageResult};
