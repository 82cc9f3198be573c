//! Compositor contract and the host-side reference layer
//!
//! A compositor owns the drawables of committed strokes. [`RasterLayer`]
//! keeps a base image plus an ordered list of stroke entries and flattens
//! them into premultiplied RGBA on demand, so removing an entry restores
//! the exact pixels it covered.

use quill_core::{Color, Point};
use quill_gpu::{coverage, Drawable, DrawableBlend, DrawablePayload, HostField};
use quill_paint::CoverageMask;
use slotmap::{new_key_type, SlotMap};

use crate::commit::StrokeRecord;

new_key_type! {
    /// Handle to a drawable attached to a compositor
    pub struct DrawableId;
}

/// A stroke drawable together with its description
#[derive(Debug)]
pub struct LayerEntry {
    pub drawable: Drawable,
    pub record: StrokeRecord,
}

/// Sink for committed stroke drawables
pub trait Compositor {
    /// Append an entry on top of the layer
    ///
    /// The entry's record is stamped with the returned id.
    fn attach(&mut self, entry: LayerEntry) -> DrawableId;

    /// Remove an entry, handing it back to the caller
    fn detach(&mut self, id: DrawableId) -> Option<LayerEntry>;
}

/// Premultiplied RGBA pixel
pub type Pixel = [f32; 4];

/// Host raster layer with a fixed base image
#[derive(Debug)]
pub struct RasterLayer {
    width: u32,
    height: u32,
    base: Vec<Pixel>,
    entries: SlotMap<DrawableId, LayerEntry>,
    /// Bottom to top
    order: Vec<DrawableId>,
}

impl RasterLayer {
    /// Fully transparent layer
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Color::TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self::from_pixels(
            width,
            height,
            vec![color.premultiplied(); width as usize * height as usize],
        )
    }

    /// Layer over existing premultiplied pixels, row-major
    pub fn from_pixels(width: u32, height: u32, base: Vec<Pixel>) -> Self {
        debug_assert_eq!(base.len(), width as usize * height as usize);
        Self {
            width,
            height,
            base,
            entries: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn base(&self) -> &[Pixel] {
        &self.base
    }

    /// Attached entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn entry(&self, id: DrawableId) -> Option<&LayerEntry> {
        self.entries.get(id)
    }

    /// Entries from bottom to top
    pub fn entries(&self) -> impl Iterator<Item = &LayerEntry> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(*id))
    }

    /// Composite every entry over the base image
    pub fn flatten(&self) -> Vec<Pixel> {
        let mut pixels = self.base.clone();
        for entry in self.entries() {
            self.composite(&mut pixels, &entry.drawable);
        }
        pixels
    }

    fn composite(&self, pixels: &mut [Pixel], drawable: &Drawable) {
        let source = match drawable.payload() {
            DrawablePayload::Field(field) => match field.host() {
                Ok(host) => Source::Field(host, drawable.aa_width()),
                Err(e) => {
                    tracing::warn!("skipping drawable without a readable field: {}", e);
                    return;
                }
            },
            DrawablePayload::Mask(mask) => Source::Mask(mask),
        };

        let bounds = drawable.bounds();
        let x0 = bounds.min().x.floor().max(0.0) as u32;
        let y0 = bounds.min().y.floor().max(0.0) as u32;
        let x1 = (bounds.max().x.ceil().max(0.0) as u32).min(self.width);
        let y1 = (bounds.max().y.ceil().max(0.0) as u32).min(self.height);

        let blend = drawable.blend();
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let k = source.coverage_at(center) * blend.opacity();
                if k <= 0.0 {
                    continue;
                }
                let dst = &mut pixels[(y * self.width + x) as usize];
                blend_pixel(dst, blend, k);
            }
        }
    }
}

enum Source<'a> {
    Field(&'a HostField, f32),
    Mask(&'a CoverageMask),
}

impl Source<'_> {
    fn coverage_at(&self, p: Point) -> f32 {
        match self {
            Source::Field(field, aa_width) => coverage(field.sample(p), *aa_width),
            Source::Mask(mask) => mask.coverage_at(p),
        }
    }
}

/// Blend one premultiplied pixel with weight `k` (coverage times opacity)
fn blend_pixel(dst: &mut Pixel, blend: DrawableBlend, k: f32) {
    match blend {
        DrawableBlend::AlphaOver { color, .. } => {
            let src = color.premultiplied().map(|c| c * k);
            let keep = 1.0 - src[3];
            for (d, s) in dst.iter_mut().zip(src) {
                *d = s + *d * keep;
            }
        }
        DrawableBlend::AlphaSubtract { .. } => {
            let keep = 1.0 - k;
            for d in dst.iter_mut() {
                *d *= keep;
            }
        }
    }
}

impl Compositor for RasterLayer {
    fn attach(&mut self, mut entry: LayerEntry) -> DrawableId {
        let id = self.entries.insert_with_key(|id| {
            entry.record.drawable = Some(id);
            entry
        });
        self.order.push(id);
        tracing::trace!("layer: attached {:?} ({} entries)", id, self.order.len());
        id
    }

    fn detach(&mut self, id: DrawableId) -> Option<LayerEntry> {
        let mut entry = self.entries.remove(id)?;
        self.order.retain(|other| *other != id);
        entry.record.drawable = None;
        tracing::trace!("layer: detached {:?} ({} entries)", id, self.order.len());
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{BrushSettings, Point, Rect, StrokeId};
    use quill_gpu::SurfaceBridge;
    use quill_paint::fill_polygon;

    fn square_entry(settings: BrushSettings) -> LayerEntry {
        let square = [
            Point::new(2.0, 2.0),
            Point::new(6.0, 2.0),
            Point::new(6.0, 6.0),
            Point::new(2.0, 6.0),
        ];
        let bounds = Rect::new(0.0, 0.0, 8.0, 8.0);
        let drawable = SurfaceBridge::default()
            .from_mask(fill_polygon(&square, bounds), DrawableBlend::for_brush(&settings));
        LayerEntry {
            drawable,
            record: StrokeRecord::new(StrokeId::new(1), &settings, Vec::new(), bounds),
        }
    }

    #[test]
    fn test_alpha_over_premultiplies() {
        let mut layer = RasterLayer::new(8, 8);
        layer.attach(square_entry(
            BrushSettings::pen(4.0, Color::RED).with_opacity(0.5),
        ));
        let pixels = layer.flatten();
        assert_eq!(pixels[3 * 8 + 3], [0.5, 0.0, 0.0, 0.5]);
        assert_eq!(pixels[0], [0.0; 4]);
    }

    #[test]
    fn test_alpha_subtract_clears_covered_pixels() {
        let mut layer = RasterLayer::filled(8, 8, Color::BLUE);
        layer.attach(square_entry(BrushSettings::eraser(4.0)));
        let pixels = layer.flatten();
        assert_eq!(pixels[4 * 8 + 4], [0.0; 4]);
        assert_eq!(pixels[7 * 8 + 7], Color::BLUE.premultiplied());
    }

    #[test]
    fn test_detach_restores_base() {
        let mut layer = RasterLayer::filled(8, 8, Color::WHITE);
        let id = layer.attach(square_entry(BrushSettings::pen(4.0, Color::BLACK)));
        assert_eq!(layer.entry(id).unwrap().record.drawable, Some(id));
        assert_ne!(layer.flatten(), layer.base());

        let entry = layer.detach(id).unwrap();
        assert_eq!(entry.record.drawable, None);
        assert!(layer.is_empty());
        assert_eq!(layer.flatten(), layer.base());
        assert!(layer.detach(id).is_none());
    }
}
