pub mod log;
pub mod metrics;
pub mod status;

pub use self::log::LogManager;
pub use self::metrics::{Metrics, MetricsRecorder};
pub use self::status::StageStatus;
