//! Pointer samples

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// One recorded input event, in the active layer's local coordinate space
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    /// Normalised pen pressure (0.0 to 1.0)
    pub pressure: f32,
    /// Pen tilt in degrees along X (-90 to 90)
    pub tilt_x: f32,
    /// Pen tilt in degrees along Y (-90 to 90)
    pub tilt_y: f32,
    /// Event timestamp in milliseconds
    pub t: f64,
}

impl Sample {
    /// Sample without tilt
    pub const fn new(x: f32, y: f32, pressure: f32, t: f64) -> Self {
        Self {
            x,
            y,
            pressure,
            tilt_x: 0.0,
            tilt_y: 0.0,
            t,
        }
    }

    pub const fn with_tilt(mut self, tilt_x: f32, tilt_y: f32) -> Self {
        self.tilt_x = tilt_x;
        self.tilt_y = tilt_y;
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Linear interpolation of every field
    pub fn lerp(&self, other: &Sample, t: f32) -> Sample {
        Sample {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            pressure: self.pressure + (other.pressure - self.pressure) * t,
            tilt_x: self.tilt_x + (other.tilt_x - self.tilt_x) * t,
            tilt_y: self.tilt_y + (other.tilt_y - self.tilt_y) * t,
            t: self.t + (other.t - self.t) * t as f64,
        }
    }
}
