//! CPU fallback rasterization
//!
//! When the distance-field path is unavailable (device allocation failure,
//! synthesis failure, unrecoverable geometry) the stroke is still rendered,
//! with hard edges, into a coverage mask covering the stroke bounds. Masks
//! hold one texel per canvas pixel up to [`MAX_MASK_DIM`] texels per side;
//! larger bounds are covered at a coarser pitch.

use quill_core::{Point, Rect};
use smallvec::SmallVec;

/// Longest mask edge, in texels
pub const MAX_MASK_DIM: u32 = 4096;

/// One scanline crossing: x position and edge direction (+1 upward, -1 downward)
pub type Crossing = (f32, i32);

/// Per-texel coverage over a pixel-aligned rectangle
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageMask {
    bounds: Rect,
    width: u32,
    height: u32,
    /// Canvas pixels per texel, at least 1
    pitch: f32,
    coverage: Vec<f32>,
}

impl CoverageMask {
    /// Empty mask over `bounds`, capped at [`MAX_MASK_DIM`] texels per side
    pub fn new(bounds: Rect) -> Self {
        Self::with_max_dim(bounds, MAX_MASK_DIM)
    }

    /// Empty mask with at most `max_dim` texels per side
    pub fn with_max_dim(bounds: Rect, max_dim: u32) -> Self {
        let max_dim = max_dim.max(1);
        let longest = bounds.width().max(bounds.height()).max(1.0);
        let pitch = (longest / max_dim as f32).max(1.0);
        let texels = |extent: f32| ((extent / pitch).ceil().max(1.0) as u32).min(max_dim);
        let (width, height) = (texels(bounds.width()), texels(bounds.height()));
        if pitch > 1.0 {
            tracing::debug!(
                "{}x{} mask over {}x{} px at pitch {:.2}",
                width,
                height,
                bounds.width(),
                bounds.height(),
                pitch
            );
        }
        Self {
            bounds,
            width,
            height,
            pitch,
            coverage: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Canvas pixels per texel
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.coverage[self.index(x, y)]
    }

    fn set(&mut self, x: u32, y: u32, value: f32) {
        let i = self.index(x, y);
        self.coverage[i] = value;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Canvas-space centre of texel `(x, y)`
    pub fn texel_center(&self, x: u32, y: u32) -> Point {
        self.bounds.origin + Point::new(x as f32 + 0.5, y as f32 + 0.5) * self.pitch
    }

    /// Coverage of the texel containing canvas point `p`, zero outside
    pub fn coverage_at(&self, p: Point) -> f32 {
        let local = (p - self.bounds.origin) * (1.0 / self.pitch);
        if local.x < 0.0 || local.y < 0.0 {
            return 0.0;
        }
        let (x, y) = (local.x.floor() as u32, local.y.floor() as u32);
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.get(x, y)
    }

    /// Number of texels with any coverage
    pub fn covered_texels(&self) -> usize {
        self.coverage.iter().filter(|c| **c > 0.0).count()
    }
}

/// Sorted crossings of a closed polygon with the horizontal line at `y`
pub fn scanline_crossings(points: &[Point], y: f32) -> SmallVec<[Crossing; 16]> {
    let mut crossings: SmallVec<[Crossing; 16]> = SmallVec::new();
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        let direction = if a.y <= y && b.y > y {
            1
        } else if b.y <= y && a.y > y {
            -1
        } else {
            continue;
        };
        let t = (y - a.y) / (b.y - a.y);
        crossings.push((a.x + (b.x - a.x) * t, direction));
    }
    crossings.sort_by(|l, r| l.0.total_cmp(&r.0));
    crossings
}

/// Non-zero winding for each texel centre along one row
///
/// Texel `x` is centred at `x0 + (x + 0.5) * pitch`. `crossings` must come
/// from [`scanline_crossings`] at the row's centre.
pub fn row_winding(
    crossings: &[Crossing],
    x0: f32,
    pitch: f32,
    width: u32,
    mut visit: impl FnMut(u32, i32),
) {
    let mut winding = 0;
    let mut next = 0;
    for x in 0..width {
        let cx = x0 + (x as f32 + 0.5) * pitch;
        while next < crossings.len() && crossings[next].0 <= cx {
            winding -= crossings[next].1;
            next += 1;
        }
        visit(x, winding);
    }
}

/// Hard-edged non-zero fill of a closed polygon
pub fn fill_polygon(points: &[Point], bounds: Rect) -> CoverageMask {
    let mut mask = CoverageMask::new(bounds);
    if points.len() < 3 {
        return mask;
    }
    let pitch = mask.pitch;
    for y in 0..mask.height {
        let cy = bounds.y() + (y as f32 + 0.5) * pitch;
        let crossings = scanline_crossings(points, cy);
        row_winding(&crossings, bounds.x(), pitch, mask.width, |x, winding| {
            if winding != 0 {
                mask.set(x, y, 1.0);
            }
        });
    }
    mask
}

/// Stamp filled discs `(center, radius)` into a mask
pub fn stamp_disks(discs: impl IntoIterator<Item = (Point, f32)>, bounds: Rect) -> CoverageMask {
    let mut mask = CoverageMask::new(bounds);
    for (center, radius) in discs {
        let local = (center - bounds.origin) * (1.0 / mask.pitch);
        let reach = radius / mask.pitch;
        let x_min = (local.x - reach).floor().max(0.0) as u32;
        let y_min = (local.y - reach).floor().max(0.0) as u32;
        let x_max = ((local.x + reach).ceil().max(0.0) as u32).min(mask.width);
        let y_max = ((local.y + reach).ceil().max(0.0) as u32).min(mask.height);
        let r_sq = radius * radius;
        for y in y_min..y_max {
            for x in x_min..x_max {
                if mask.texel_center(x, y).distance(center).powi(2) <= r_sq {
                    mask.set(x, y, 1.0);
                }
            }
        }
    }
    mask
}
