use anyhow::{ensure, Context};
use plotcore::math::azimuth::circular_distance;
use plotcore::messages::{MessageHeader, PriVideo, ScanGeometry};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// A point target moving at constant velocity, painted as a small blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Initial range, metres.
    pub range: f64,
    /// Initial bearing, degrees clockwise from north.
    pub bearing: f64,
    /// East/north velocity, metres per second.
    pub velocity: [f64; 2],
    pub amplitude: f32,
    /// Half-extent of the blob in range gates.
    pub gate_extent: u32,
    /// Half-extent of the blob in azimuth cells.
    pub azimuth_extent: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            range: 3000.0,
            bearing: 45.0,
            velocity: [0.0, 0.0],
            amplitude: 800.0,
            gate_extent: 1,
            azimuth_extent: 1,
        }
    }
}

impl TargetConfig {
    /// East/north position at `time` seconds.
    fn position(&self, time: f64) -> (f64, f64) {
        let bearing = self.bearing.to_radians();
        (
            self.range * bearing.sin() + self.velocity[0] * time,
            self.range * bearing.cos() + self.velocity[1] * time,
        )
    }
}

/// Configuration for generating synthetic scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub azimuth_count: u32,
    pub gate_count: usize,
    pub range_min: f64,
    pub gate_size: f64,
    /// Seconds per antenna revolution.
    pub rotation_duration: f64,
    pub scans: u32,
    /// Upper bound of the uniform background noise.
    pub noise: f32,
    pub seed: u64,
    pub targets: Vec<TargetConfig>,
    pub description: Option<String>,
    pub scenario: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            azimuth_count: 1024,
            gate_count: 512,
            range_min: 0.0,
            gate_size: 15.0,
            rotation_duration: 4.0,
            scans: 8,
            noise: 20.0,
            seed: 0,
            targets: vec![
                TargetConfig {
                    velocity: [12.0, -4.0],
                    ..Default::default()
                },
                TargetConfig {
                    range: 5200.0,
                    bearing: 200.0,
                    velocity: [-6.0, 9.0],
                    amplitude: 1200.0,
                    gate_extent: 2,
                    ..Default::default()
                },
            ],
            description: None,
            scenario: None,
        }
    }
}

impl GeneratorConfig {
    pub fn geometry(&self) -> ScanGeometry {
        ScanGeometry::new(self.azimuth_count, self.range_min, self.gate_size)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.azimuth_count >= 2, "azimuth_count must be at least 2");
        ensure!(self.gate_count > 0, "gate_count must be positive");
        ensure!(self.gate_size > 0.0, "gate_size must be positive");
        ensure!(
            self.rotation_duration > 0.0,
            "rotation_duration must be positive"
        );
        ensure!(self.noise >= 0.0, "noise must not be negative");
        Ok(())
    }
}

/// Cell a target occupies at one instant.
struct Footprint {
    azimuth: u32,
    gate: i64,
    amplitude: f32,
    gate_extent: i64,
    azimuth_extent: u32,
}

/// Produces PRI video one azimuth at a time, scan after scan.
pub struct ScenarioGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    sequence: u64,
}

impl ScenarioGenerator {
    pub fn new(config: GeneratorConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid generator config")?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            sequence: 0,
        })
    }

    fn timestamp(&self, scan: u32, azimuth: u32) -> f64 {
        let turn = f64::from(azimuth) / f64::from(self.config.azimuth_count);
        (f64::from(scan) + turn) * self.config.rotation_duration
    }

    fn footprint(&self, target: &TargetConfig, time: f64) -> Footprint {
        let (east, north) = target.position(time);
        let range = east.hypot(north);
        let bearing = east.atan2(north).rem_euclid(TAU);
        let count = self.config.azimuth_count;
        let azimuth = ((bearing / TAU * f64::from(count)).round() as u32) % count;
        let gate = ((range - self.config.range_min) / self.config.gate_size).round() as i64;
        Footprint {
            azimuth,
            gate,
            amplitude: target.amplitude,
            gate_extent: i64::from(target.gate_extent),
            azimuth_extent: target.azimuth_extent,
        }
    }

    /// Video of one PRI. Targets are sampled at the PRI's own time.
    pub fn pri(&mut self, scan: u32, azimuth: u32) -> PriVideo {
        let time = self.timestamp(scan, azimuth);
        let noise = self.config.noise;
        let mut samples: Vec<f32> = (0..self.config.gate_count)
            .map(|_| {
                if noise > 0.0 {
                    self.rng.gen_range(0.0..noise)
                } else {
                    0.0
                }
            })
            .collect();

        let footprints: Vec<Footprint> = self
            .config
            .targets
            .iter()
            .map(|target| self.footprint(target, time))
            .collect();
        for footprint in footprints {
            let azimuth_offset = circular_distance(azimuth, footprint.azimuth, self.config.azimuth_count);
            if azimuth_offset > footprint.azimuth_extent {
                continue;
            }
            for offset in -footprint.gate_extent..=footprint.gate_extent {
                let Ok(gate) = usize::try_from(footprint.gate + offset) else {
                    continue;
                };
                let Some(sample) = samples.get_mut(gate) else {
                    continue;
                };
                // Linear taper so the centre cell is the unique peak.
                let falloff = (offset.unsigned_abs() as f32 + azimuth_offset as f32) * 0.2;
                *sample += footprint.amplitude * (1.0 - falloff).max(0.1);
            }
        }

        self.sequence += 1;
        PriVideo::new(
            MessageHeader::new(self.sequence, time),
            azimuth,
            self.config.geometry(),
            samples,
        )
    }

    pub fn scan(&mut self, scan: u32) -> Vec<PriVideo> {
        (0..self.config.azimuth_count)
            .map(|azimuth| self.pri(scan, azimuth))
            .collect()
    }
}
