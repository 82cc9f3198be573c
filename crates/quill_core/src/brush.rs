//! Brush settings and pressure response

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Compositing intent of a stroke
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrokeMode {
    /// Paint the brush color over the layer
    #[default]
    Pen,
    /// Subtract alpha from the layer
    Eraser,
}

/// Mapping from normalised pressure to a width factor
///
/// The curve is always chosen explicitly. `Identity` reproduces the literal
/// input path and is the default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum PressureCurve {
    #[default]
    Identity,
    /// `pressure ^ exponent`
    Power { exponent: f32 },
    /// Remap `0..1` onto `min..max`
    Range { min: f32, max: f32 },
}

impl PressureCurve {
    pub fn apply(&self, pressure: f32) -> f32 {
        let p = pressure.clamp(0.0, 1.0);
        match *self {
            PressureCurve::Identity => p,
            PressureCurve::Power { exponent } => p.powf(exponent.max(f32::EPSILON)),
            PressureCurve::Range { min, max } => min + (max - min) * p,
        }
    }
}

/// Read-only brush snapshot captured when a stroke starts
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    /// Stroke diameter in canvas pixels at full pressure
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
    pub mode: StrokeMode,
}

impl BrushSettings {
    pub const MIN_SIZE: f32 = 0.5;

    pub fn pen(size: f32, color: Color) -> Self {
        Self {
            size,
            color,
            opacity: 1.0,
            mode: StrokeMode::Pen,
        }
    }

    pub fn eraser(size: f32) -> Self {
        Self {
            size,
            color: Color::WHITE,
            opacity: 1.0,
            mode: StrokeMode::Eraser,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Copy with out-of-range values repaired
    pub fn sanitized(&self) -> Self {
        let size = if self.size.is_finite() {
            self.size.max(Self::MIN_SIZE)
        } else {
            Self::MIN_SIZE
        };
        let opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            size,
            opacity,
            ..*self
        }
    }
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self::pen(4.0, Color::BLACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_curve_is_literal() {
        let curve = PressureCurve::Identity;
        assert_eq!(curve.apply(0.25), 0.25);
        assert_eq!(curve.apply(1.5), 1.0);
    }

    #[test]
    fn test_range_and_power_curves() {
        assert_eq!(PressureCurve::Range { min: 0.5, max: 1.0 }.apply(0.0), 0.5);
        assert!((PressureCurve::Power { exponent: 2.0 }.apply(0.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_sanitized_settings() {
        let settings = BrushSettings {
            size: -3.0,
            color: Color::RED,
            opacity: 4.0,
            mode: StrokeMode::Pen,
        }
        .sanitized();
        assert_eq!(settings.size, BrushSettings::MIN_SIZE);
        assert_eq!(settings.opacity, 1.0);
    }
}
