//! Host reference implementation of the synthesis passes

use quill_core::Point;
use quill_paint::raster::{row_winding, scanline_crossings};

use super::{FieldJob, FieldPasses, Result};
use crate::texture::{DistanceField, FieldExtent, HostField, PingPong, NO_EDGE_DISTANCE};

/// `[nearest x, nearest y, distance, edge id]`
type SeedTexel = [f32; 4];

const EMPTY: SeedTexel = [0.0, 0.0, NO_EDGE_DISTANCE, -1.0];

/// Host grids for one synthesis run
pub struct CpuPasses {
    extent: FieldExtent,
    grids: PingPong<Vec<SeedTexel>>,
}

impl CpuPasses {
    pub fn new(extent: FieldExtent) -> Self {
        let count = extent.texel_count();
        Self {
            extent,
            grids: PingPong::new(vec![EMPTY; count], vec![EMPTY; count]),
        }
    }

    /// Nearest edge id per texel of the current grid
    pub fn edge_ids(&self) -> Vec<i32> {
        self.grids.current().iter().map(|t| t[3] as i32).collect()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.extent.width + x) as usize
    }
}

impl FieldPasses for CpuPasses {
    fn seed(&mut self, job: &FieldJob) -> Result<()> {
        let extent = self.extent;
        let origin = extent.bounds.origin;
        let inv = 1.0 / extent.texel_size;
        let mut grid = vec![EMPTY; extent.texel_count()];

        for edge in job.edges {
            let (a, b) = (edge.start(), edge.end());
            let lo = Point::new(a.x.min(b.x), a.y.min(b.y)) - origin;
            let hi = Point::new(a.x.max(b.x), a.y.max(b.y)) - origin;
            let x0 = ((lo.x - job.seed_radius) * inv).floor().max(0.0) as u32;
            let y0 = ((lo.y - job.seed_radius) * inv).floor().max(0.0) as u32;
            let x1 = (((hi.x + job.seed_radius) * inv).ceil().max(0.0) as u32).min(extent.width);
            let y1 = (((hi.y + job.seed_radius) * inv).ceil().max(0.0) as u32).min(extent.height);

            for y in y0..y1 {
                for x in x0..x1 {
                    let p = extent.texel_center(x, y);
                    let q = edge.closest_point(p);
                    let d = q.distance(p);
                    let texel = &mut grid[self.index(x, y)];
                    if d <= job.seed_radius && d < texel[2] {
                        *texel = [q.x, q.y, d, edge.id as f32];
                    }
                }
            }
        }

        let seeded = grid.iter().filter(|t| t[3] >= 0.0).count();
        tracing::trace!("seed pass marked {} of {} texels", seeded, grid.len());
        let (_, next) = self.grids.split();
        *next = grid;
        self.grids.swap();
        Ok(())
    }

    fn propagate(&mut self, job: &FieldJob, step: u32) -> Result<()> {
        let extent = self.extent;
        let (width, height) = (extent.width as i64, extent.height as i64);
        let step = step as i64;
        let (src, dst) = self.grids.split();

        for y in 0..height {
            for x in 0..width {
                let p = extent.texel_center(x as u32, y as u32);
                let mut best = src[(y * width + x) as usize];

                for dy in -1..=1i64 {
                    for dx in -1..=1i64 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (cx, cy) = (x + dx * step, y + dy * step);
                        if cx < 0 || cy < 0 || cx >= width || cy >= height {
                            continue;
                        }
                        let candidate = src[(cy * width + cx) as usize];
                        if candidate[3] < 0.0 {
                            continue;
                        }
                        let edge = &job.edges[candidate[3] as usize];
                        let q = edge.closest_point(p);
                        let d = q.distance(p);
                        if best[3] < 0.0 || d < best[2] - job.tie_epsilon {
                            best = [q.x, q.y, d, candidate[3]];
                        }
                    }
                }

                dst[(y * width + x) as usize] = best;
            }
        }

        self.grids.swap();
        Ok(())
    }

    fn encode(&mut self, job: &FieldJob) -> Result<DistanceField> {
        let extent = self.extent;
        let polygon: Vec<Point> = job.edges.iter().map(|e| e.start()).collect();
        let grid = self.grids.current();
        let mut texels = vec![[NO_EDGE_DISTANCE, 0.0, 0.0, -1.0]; extent.texel_count()];

        for y in 0..extent.height {
            let cy = extent.texel_center(0, y).y;
            let crossings = scanline_crossings(&polygon, cy);
            row_winding(
                &crossings,
                extent.bounds.x(),
                extent.texel_size,
                extent.width,
                |x, winding| {
                    let i = (y * extent.width + x) as usize;
                    let seed = grid[i];
                    if seed[3] < 0.0 {
                        return;
                    }
                    let p = extent.texel_center(x, y);
                    let q = job.edges[seed[3] as usize].closest_point(p);
                    let d = q.distance(p);
                    let signed = if winding != 0 { -d } else { d };
                    texels[i] = [signed, q.x - p.x, q.y - p.y, seed[3]];
                },
            );
        }

        Ok(DistanceField::Host(HostField::new(extent, texels)))
    }
}
