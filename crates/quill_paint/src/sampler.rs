//! Pointer sample resampling
//!
//! The sampler sits between the raw pointer stream and the outline builder.
//! It bounds the spatial gap between consecutive samples by inserting
//! interpolated samples, and repairs out-of-range input in place. It never
//! fails and never transforms coordinates.

use quill_core::{Point, Sample};

/// Samples closer than this to the previous kept sample are dropped
const COINCIDENT_EPSILON: f32 = 1e-3;

/// How synthetic samples are placed inside a gap
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    /// Straight line between the two real samples
    Linear,
    /// Catmull-Rom through the two preceding samples and a projected next point
    #[default]
    CatmullRom,
}

/// Optional positional smoothing applied to raw input before resampling
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Smoothing {
    #[default]
    None,
    /// Exponential moving average; `factor` in `0.0..1.0` is the weight of the
    /// previous position
    Exponential { factor: f32 },
}

/// Configuration for the sampler
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Largest allowed distance between consecutive emitted samples
    pub max_gap_px: f32,
    /// Upper bound on synthetic samples inserted for one input event
    pub max_inserted_per_gap: usize,
    /// Lower clamp for pressure
    pub min_pressure: f32,
    pub interpolation: Interpolation,
    pub smoothing: Smoothing,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_gap_px: 2.0,
            max_inserted_per_gap: 32,
            min_pressure: 0.05,
            interpolation: Interpolation::CatmullRom,
            smoothing: Smoothing::None,
        }
    }
}

/// Resampling state for one stroke
#[derive(Debug, Default)]
pub struct Sampler {
    config: SamplerConfig,
    samples: Vec<Sample>,
}

impl Sampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Begin a new stroke, discarding any previous samples
    ///
    /// Returns the normalized first sample, or `None` if its position was
    /// unusable (the next valid sample then starts the stroke).
    pub fn start(&mut self, sample: Sample) -> Option<Sample> {
        self.samples.clear();
        self.add_sample(sample).first().copied()
    }

    /// Feed one raw sample, returning the samples emitted for it
    ///
    /// The slice holds zero or more interpolated samples followed by the
    /// normalized input sample. It is empty when the input was dropped.
    pub fn add_sample(&mut self, raw: Sample) -> &[Sample] {
        let first_new = self.samples.len();

        let Some(mut sample) = self.normalize(raw) else {
            tracing::trace!("sampler: dropping sample with non-finite position");
            return &self.samples[first_new..];
        };

        let Some(last) = self.samples.last().copied() else {
            self.samples.push(sample);
            return &self.samples[first_new..];
        };

        if let Smoothing::Exponential { factor } = self.config.smoothing {
            let factor = factor.clamp(0.0, 0.99);
            let smoothed = last.position().lerp(sample.position(), 1.0 - factor);
            sample.x = smoothed.x;
            sample.y = smoothed.y;
        }

        let gap = last.position().distance(sample.position());
        if gap < COINCIDENT_EPSILON {
            return &self.samples[first_new..];
        }

        let max_gap = self.config.max_gap_px.max(COINCIDENT_EPSILON);
        let needed = ((gap / max_gap).ceil() as usize).saturating_sub(1);
        let inserted = needed.min(self.config.max_inserted_per_gap);
        if needed > inserted {
            tracing::trace!(
                "sampler: gap of {:.1}px needs {} samples, capped at {}",
                gap,
                needed,
                inserted
            );
        }

        let before_last = self
            .samples
            .len()
            .checked_sub(2)
            .map(|i| self.samples[i].position())
            .unwrap_or_else(|| last.position());

        for k in 1..=inserted {
            let t = k as f32 / (inserted + 1) as f32;
            let mut synthetic = last.lerp(&sample, t);
            if self.config.interpolation == Interpolation::CatmullRom {
                let p = catmull_rom(before_last, last.position(), sample.position(), t);
                synthetic.x = p.x;
                synthetic.y = p.y;
            }
            self.samples.push(synthetic);
        }
        self.samples.push(sample);

        &self.samples[first_new..]
    }

    /// Samples emitted so far
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// End the stroke, handing over the ordered sample list
    pub fn finish(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }

    /// Drop all samples without producing a result
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    fn normalize(&self, raw: Sample) -> Option<Sample> {
        if !raw.position().is_finite() {
            return None;
        }
        let min_pressure = self.config.min_pressure.clamp(0.0, 1.0);
        let pressure = if raw.pressure.is_finite() {
            raw.pressure.clamp(min_pressure, 1.0)
        } else {
            1.0
        };
        let tilt = |v: f32| if v.is_finite() { v.clamp(-90.0, 90.0) } else { 0.0 };
        Some(Sample {
            pressure,
            tilt_x: tilt(raw.tilt_x),
            tilt_y: tilt(raw.tilt_y),
            ..raw
        })
    }
}

/// Uniform Catmull-Rom between `p1` and `p2`, with `p3` projected forward
fn catmull_rom(p0: Point, p1: Point, p2: Point, t: f32) -> Point {
    let p3 = p2 + (p2 - p1);
    let t2 = t * t;
    let t3 = t2 * t;
    let axis = |a: f32, b: f32, c: f32, d: f32| {
        0.5 * (2.0 * b
            + (-a + c) * t
            + (2.0 * a - 5.0 * b + 4.0 * c - d) * t2
            + (-a + 3.0 * b - 3.0 * c + d) * t3)
    };
    Point::new(
        axis(p0.x, p1.x, p2.x, p3.x),
        axis(p0.y, p1.y, p2.y, p3.y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> SamplerConfig {
        SamplerConfig {
            interpolation: Interpolation::Linear,
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn test_gap_is_filled() {
        let mut sampler = Sampler::new(linear());
        sampler.start(Sample::new(0.0, 0.0, 1.0, 0.0));
        let emitted = sampler.add_sample(Sample::new(10.0, 0.0, 1.0, 10.0)).len();

        // 10px at a 2px maximum gap: 4 synthetic + the real sample
        assert_eq!(emitted, 5);
        for pair in sampler.samples().windows(2) {
            assert!(pair[0].position().distance(pair[1].position()) <= 2.0 + 1e-4);
        }
    }

    #[test]
    fn test_insertions_are_capped() {
        let mut sampler = Sampler::new(SamplerConfig {
            max_inserted_per_gap: 3,
            ..linear()
        });
        sampler.start(Sample::new(0.0, 0.0, 1.0, 0.0));
        let emitted = sampler.add_sample(Sample::new(100.0, 0.0, 1.0, 1.0)).len();
        assert_eq!(emitted, 4);
    }

    #[test]
    fn test_pressure_is_clamped() {
        let mut sampler = Sampler::new(SamplerConfig::default());
        let first = sampler.start(Sample::new(0.0, 0.0, -2.0, 0.0)).unwrap();
        assert_eq!(first.pressure, 0.05);

        let emitted = sampler.add_sample(Sample::new(1.0, 0.0, 7.0, 1.0));
        assert_eq!(emitted.last().unwrap().pressure, 1.0);

        let emitted = sampler.add_sample(Sample::new(2.0, 0.0, f32::NAN, 2.0));
        assert_eq!(emitted.last().unwrap().pressure, 1.0);
    }

    #[test]
    fn test_coincident_and_invalid_samples_emit_nothing() {
        let mut sampler = Sampler::new(SamplerConfig::default());
        sampler.start(Sample::new(5.0, 5.0, 0.5, 0.0));
        assert!(sampler.add_sample(Sample::new(5.0, 5.0, 0.9, 1.0)).is_empty());
        assert!(sampler.add_sample(Sample::new(f32::NAN, 5.0, 0.9, 2.0)).is_empty());
        assert_eq!(sampler.len(), 1);
    }

    #[test]
    fn test_catmull_rom_passes_through_endpoints() {
        let p0 = Point::new(0.0, 0.0);
        let p1 = Point::new(2.0, 0.0);
        let p2 = Point::new(4.0, 2.0);
        assert!(catmull_rom(p0, p1, p2, 0.0).distance(p1) < 1e-5);
        assert!(catmull_rom(p0, p1, p2, 1.0).distance(p2) < 1e-5);
    }

    #[test]
    fn test_finish_hands_over_and_resets() {
        let mut sampler = Sampler::new(SamplerConfig::default());
        sampler.start(Sample::new(0.0, 0.0, 1.0, 0.0));
        sampler.add_sample(Sample::new(1.0, 1.0, 1.0, 1.0));
        let samples = sampler.finish();
        assert_eq!(samples.len(), 2);
        assert!(sampler.is_empty());
    }
}
