//! Surface bridge
//!
//! Wraps a synthesized field (or a fallback coverage mask) into a placed,
//! blend-aware [`Drawable`] the compositor can take ownership of.

use quill_core::{BrushSettings, Color, Point, Rect, StrokeMode};
use quill_paint::CoverageMask;

use crate::texture::DistanceField;

/// Coverage of a texel at signed distance `d` with an anti-aliasing band of
/// `aa_width` canvas pixels outside the outline
pub fn coverage(d: f32, aa_width: f32) -> f32 {
    let aa = aa_width.max(f32::EPSILON);
    ((aa - d) / aa).clamp(0.0, 1.0)
}

/// How a drawable combines with what is beneath it
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawableBlend {
    /// Source-over with the stroke color
    AlphaOver { color: Color, opacity: f32 },
    /// Destination alpha reduced by coverage
    AlphaSubtract { opacity: f32 },
}

impl DrawableBlend {
    pub fn for_brush(settings: &BrushSettings) -> Self {
        match settings.mode {
            StrokeMode::Pen => DrawableBlend::AlphaOver {
                color: settings.color,
                opacity: settings.opacity,
            },
            StrokeMode::Eraser => DrawableBlend::AlphaSubtract {
                opacity: settings.opacity,
            },
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            DrawableBlend::AlphaOver { opacity, .. } | DrawableBlend::AlphaSubtract { opacity } => {
                *opacity
            }
        }
    }

    /// Payload color; erasers carry opaque white
    pub fn color(&self) -> Color {
        match self {
            DrawableBlend::AlphaOver { color, .. } => *color,
            DrawableBlend::AlphaSubtract { .. } => Color::WHITE,
        }
    }
}

/// What a drawable renders from
#[derive(Debug)]
pub enum DrawablePayload {
    Field(DistanceField),
    /// Hard-edged fallback coverage
    Mask(CoverageMask),
}

/// A placed stroke image ready for compositing
#[derive(Debug)]
pub struct Drawable {
    bounds: Rect,
    payload: DrawablePayload,
    blend: DrawableBlend,
    aa_width: f32,
}

impl Drawable {
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn origin(&self) -> Point {
        self.bounds.origin
    }

    pub fn payload(&self) -> &DrawablePayload {
        &self.payload
    }

    pub fn blend(&self) -> DrawableBlend {
        self.blend
    }

    pub fn aa_width(&self) -> f32 {
        self.aa_width
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.payload, DrawablePayload::Mask(_))
    }

    /// Stroke coverage at a canvas point, before opacity
    pub fn coverage_at(&self, p: Point) -> f32 {
        match &self.payload {
            DrawablePayload::Mask(mask) => mask.coverage_at(p),
            DrawablePayload::Field(field) => match field.host() {
                Ok(host) => coverage(host.sample(p), self.aa_width),
                Err(e) => {
                    tracing::warn!("drawable field unavailable: {}", e);
                    0.0
                }
            },
        }
    }
}

/// Converts synthesis output into drawables
#[derive(Clone, Copy, Debug)]
pub struct SurfaceBridge {
    aa_width: f32,
}

impl Default for SurfaceBridge {
    fn default() -> Self {
        Self { aa_width: 1.0 }
    }
}

impl SurfaceBridge {
    pub fn new(aa_width: f32) -> Self {
        Self {
            aa_width: aa_width.max(f32::EPSILON),
        }
    }

    pub fn aa_width(&self) -> f32 {
        self.aa_width
    }

    /// Place a field at `bounds`, taking ownership of it
    pub fn to_drawable(&self, field: DistanceField, bounds: Rect, blend: DrawableBlend) -> Drawable {
        Drawable {
            bounds,
            payload: DrawablePayload::Field(field),
            blend,
            aa_width: self.aa_width,
        }
    }

    /// Wrap a fallback mask
    pub fn from_mask(&self, mask: CoverageMask, blend: DrawableBlend) -> Drawable {
        Drawable {
            bounds: mask.bounds(),
            payload: DrawablePayload::Mask(mask),
            blend,
            aa_width: self.aa_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{FieldExtent, HostField};

    #[test]
    fn test_coverage_band() {
        assert_eq!(coverage(-3.0, 1.0), 1.0);
        assert_eq!(coverage(0.0, 1.0), 1.0);
        assert_eq!(coverage(0.25, 1.0), 0.75);
        assert_eq!(coverage(1.0, 1.0), 0.0);
        assert_eq!(coverage(7.0, 1.0), 0.0);
    }

    #[test]
    fn test_blend_follows_brush_mode() {
        let pen = BrushSettings::pen(4.0, Color::RED).with_opacity(0.5);
        assert_eq!(
            DrawableBlend::for_brush(&pen),
            DrawableBlend::AlphaOver {
                color: Color::RED,
                opacity: 0.5
            }
        );
        let eraser = DrawableBlend::for_brush(&BrushSettings::eraser(10.0));
        assert_eq!(eraser, DrawableBlend::AlphaSubtract { opacity: 1.0 });
        assert_eq!(eraser.color(), Color::WHITE);
    }

    #[test]
    fn test_drawable_is_placed_at_bounds() {
        let bounds = Rect::new(10.0, 20.0, 2.0, 1.0);
        let field = HostField::new(
            FieldExtent::new(bounds, 1.0),
            vec![[-1.0, 0.0, 0.0, 0.0], [2.0, 0.0, 0.0, 0.0]],
        );
        let drawable = SurfaceBridge::default().to_drawable(
            DistanceField::Host(field),
            bounds,
            DrawableBlend::AlphaSubtract { opacity: 1.0 },
        );
        assert_eq!(drawable.origin(), Point::new(10.0, 20.0));
        assert_eq!(drawable.coverage_at(Point::new(10.5, 20.5)), 1.0);
        assert_eq!(drawable.coverage_at(Point::new(11.5, 20.5)), 0.0);
        assert_eq!(drawable.coverage_at(Point::new(0.0, 0.0)), 0.0);
        assert!(!drawable.is_fallback());
    }
}
