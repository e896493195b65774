use nalgebra::Vector3;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Collecting detections until the initiation count is reached.
    Initiating,
    Alive,
    /// Failed to initiate in time; removed without a report.
    Uninitiating,
    /// Coasted too long; removed after its final report.
    Dropping,
}

/// Fixed filter gains plus the minimum time step an update may use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gains {
    pub alpha: f64,
    pub beta: f64,
    pub min_update_interval: f64,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: String,
    pub state: TrackState,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub last_update: f64,
    /// Detection times while initiating, oldest first.
    pub initiation: VecDeque<f64>,
    /// Detections associated over the track's life, the first included.
    pub hits: usize,
    bootstrap_updates: u32,
    updated: bool,
    reported: bool,
}

impl Track {
    pub fn new(id: String, position: Vector3<f64>, when: f64) -> Self {
        Self {
            id,
            state: TrackState::Initiating,
            position,
            velocity: Vector3::zeros(),
            last_update: when,
            initiation: VecDeque::new(),
            hits: 1,
            bootstrap_updates: 0,
            updated: false,
            reported: false,
        }
    }

    /// Constant-velocity extrapolation to `when`.
    pub fn predict(&self, when: f64) -> Vector3<f64> {
        self.position + self.velocity * (when - self.last_update)
    }

    /// Only initiating and alive tracks take part in association.
    pub fn is_associable(&self) -> bool {
        matches!(self.state, TrackState::Initiating | TrackState::Alive)
    }

    /// Folds a measurement into the estimate. Returns `false`, leaving the
    /// track untouched, when the step is shorter than the minimum interval.
    pub fn update(&mut self, measured: &Vector3<f64>, when: f64, gains: &Gains) -> bool {
        let dt = when - self.last_update;
        if dt < gains.min_update_interval {
            return false;
        }

        match self.state {
            TrackState::Initiating => {
                let estimate = (measured - self.position) / dt;
                self.velocity = if self.bootstrap_updates == 0 {
                    estimate
                } else {
                    (self.velocity + estimate) * 0.5
                };
                self.bootstrap_updates += 1;
                self.position = *measured;
            }
            TrackState::Alive => {
                let predicted = self.predict(when);
                let error = measured - predicted;
                self.position = predicted + error * gains.alpha;
                self.velocity += error * (gains.beta / dt);
            }
            TrackState::Uninitiating | TrackState::Dropping => return false,
        }

        self.last_update = when;
        self.hits += 1;
        self.updated = true;
        true
    }

    /// Records an initiating detection at `when`, forgetting those older
    /// than `max_duration`. Promotes to `Alive` once `count` remain.
    pub fn register_detection(&mut self, when: f64, max_duration: f64, count: usize) -> bool {
        if self.state != TrackState::Initiating {
            return false;
        }
        self.initiation.push_back(when);
        while self
            .initiation
            .front()
            .is_some_and(|&oldest| when - oldest > max_duration)
        {
            self.initiation.pop_front();
        }
        if self.initiation.len() >= count {
            self.state = TrackState::Alive;
            self.initiation.clear();
            return true;
        }
        false
    }

    /// An initiating track whose oldest detection is past `max_duration`.
    pub fn initiation_expired(&self, now: f64, max_duration: f64) -> bool {
        self.state == TrackState::Initiating
            && self
                .initiation
                .front()
                .is_some_and(|&oldest| now - oldest > max_duration)
    }

    pub fn is_stale(&self, now: f64, coast_duration: f64) -> bool {
        now - self.last_update > coast_duration
    }

    /// Clears the per-cycle update flag, returning whether it was set.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }

    /// Marks the track as reported, returning whether this is the first time.
    pub fn mark_reported(&mut self) -> bool {
        !std::mem::replace(&mut self.reported, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAINS: Gains = Gains {
        alpha: 0.5,
        beta: 0.25,
        min_update_interval: 1e-3,
    };

    fn alive_at_origin() -> Track {
        let mut track = Track::new("7".into(), Vector3::zeros(), 0.0);
        track.state = TrackState::Alive;
        track.velocity = Vector3::new(10.0, 0.0, 0.0);
        track
    }

    #[test]
    fn bootstrap_takes_first_estimate_then_averages() {
        let mut track = Track::new("1".into(), Vector3::zeros(), 0.0);
        assert!(track.update(&Vector3::new(10.0, 0.0, 0.0), 1.0, &GAINS));
        assert_eq!(track.velocity, Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(track.position, Vector3::new(10.0, 0.0, 0.0));

        assert!(track.update(&Vector3::new(40.0, 0.0, 0.0), 2.0, &GAINS));
        assert_eq!(track.velocity, Vector3::new(20.0, 0.0, 0.0));
        assert_eq!(track.position, Vector3::new(40.0, 0.0, 0.0));
    }

    #[test]
    fn alive_update_applies_alpha_and_beta() {
        let mut track = alive_at_origin();
        // Predicted (20, 0, 0), measured (24, 0, 0): error 4 over 2 s.
        assert!(track.update(&Vector3::new(24.0, 0.0, 0.0), 2.0, &GAINS));
        assert!((track.position.x - 22.0).abs() < 1e-12);
        assert!((track.velocity.x - 10.5).abs() < 1e-12);
        assert_eq!(track.last_update, 2.0);
    }

    #[test]
    fn short_steps_are_ignored() {
        let mut track = alive_at_origin();
        assert!(!track.update(&Vector3::new(5.0, 5.0, 0.0), 0.0005, &GAINS));
        assert_eq!(track.position, Vector3::zeros());
        assert_eq!(track.hits, 1);
        assert!(!track.take_updated());
    }

    #[test]
    fn promotion_needs_count_within_window() {
        let mut track = Track::new("1".into(), Vector3::zeros(), 0.0);
        assert!(!track.register_detection(5.0, 3.0, 2));
        assert_eq!(track.initiation.len(), 1);
        assert!(track.register_detection(6.0, 3.0, 2));
        assert_eq!(track.state, TrackState::Alive);
        assert!(track.initiation.is_empty());
    }

    #[test]
    fn initiation_expires_after_max_duration() {
        let mut track = Track::new("1".into(), Vector3::zeros(), 0.0);
        assert!(!track.initiation_expired(10.0, 3.0));
        track.register_detection(0.0, 3.0, 2);
        assert!(!track.initiation_expired(3.0, 3.0));
        assert!(track.initiation_expired(3.5, 3.0));
    }

    #[test]
    fn first_report_is_flagged_once() {
        let mut track = alive_at_origin();
        assert!(track.mark_reported());
        assert!(!track.mark_reported());
    }
}
