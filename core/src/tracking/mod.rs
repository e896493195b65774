pub mod ab_tracker;
pub mod correlation_grid;
pub mod track;
pub mod track_initiator;

pub use ab_tracker::{AbTracker, AbTrackerConfig, DerivedLimits};
pub use correlation_grid::{AgeWindow, CorrelationGrid, GridEntry};
pub use track::{Gains, Track, TrackState};
pub use track_initiator::{TrackInitiator, TrackInitiatorConfig};
