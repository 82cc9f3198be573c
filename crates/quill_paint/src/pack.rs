//! Geometry packing
//!
//! Converts an outline polygon into the two GPU-facing representations:
//! a triangulated fill mesh (live preview and fallback fill) and an ordered
//! edge list (seed geometry for distance-field synthesis).

use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex as LyonFillVertex,
    VertexBuffers,
};
use lyon::math::point;
use lyon::path::PathEvent;
use quill_core::{Point, Rect};

use crate::error::{GeometryError, Result};
use crate::outline::OutlinePolygon;

/// A fill mesh vertex: canvas position plus UV inside the stroke bounds
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FillVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Triangulated fill geometry
#[derive(Clone, Debug, Default)]
pub struct FillBuffer {
    pub vertices: Vec<FillVertex>,
    /// Triangle list, always a multiple of 3
    pub indices: Vec<u32>,
    /// Whether the outline needed self-intersection repair
    pub repaired: bool,
}

impl FillBuffer {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append another mesh, rebasing its indices past the current vertices
    pub fn append(&mut self, other: FillBuffer) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
        self.repaired |= other.repaired;
    }

    /// Sum of absolute triangle areas
    pub fn area(&self) -> f32 {
        self.indices
            .chunks_exact(3)
            .map(|tri| {
                let [a, b, c] = [tri[0], tri[1], tri[2]]
                    .map(|i| Point::from_array(self.vertices[i as usize].position));
                ((b - a).cross(c - a) * 0.5).abs()
            })
            .sum()
    }
}

/// One outline segment with its outward normal, packed for upload
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Edge {
    pub p0: [f32; 2],
    pub p1: [f32; 2],
    pub normal: [f32; 2],
    /// Index of the edge in traversal order
    pub id: u32,
    pub _pad: u32,
}

impl Edge {
    pub fn start(&self) -> Point {
        Point::from_array(self.p0)
    }

    pub fn end(&self) -> Point {
        Point::from_array(self.p1)
    }

    pub fn outward_normal(&self) -> Point {
        Point::from_array(self.normal)
    }

    /// Closest point on the segment to `p`
    pub fn closest_point(&self, p: Point) -> Point {
        quill_core::geometry::closest_point_on_segment(p, self.start(), self.end())
    }

    pub fn distance(&self, p: Point) -> f32 {
        self.closest_point(p).distance(p)
    }
}

/// Ordered edge list of one outline
#[derive(Clone, Debug, Default)]
pub struct EdgeBuffer {
    pub edges: Vec<Edge>,
}

impl EdgeBuffer {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Polygon vertices in traversal order
    pub fn loop_points(&self) -> Vec<Point> {
        self.edges.iter().map(Edge::start).collect()
    }
}

/// Configuration for geometry packing
#[derive(Clone, Debug)]
pub struct PackConfig {
    /// Minimum margin around the outline, in canvas pixels
    pub min_margin_px: f32,
    /// Margin as a fraction of the maximum stroke width
    pub margin_factor: f32,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            min_margin_px: 4.0,
            margin_factor: 0.5,
        }
    }
}

/// Packs outlines into fill meshes and edge lists
#[derive(Clone, Debug, Default)]
pub struct GeometryPacker {
    config: PackConfig,
}

impl GeometryPacker {
    pub fn new(config: PackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Padded, pixel-snapped bounds of an outline
    pub fn bounds(&self, polygon: &OutlinePolygon) -> Rect {
        self.pad(polygon.bounds(), polygon.max_half_width())
    }

    /// Pad raw outline bounds for a stroke of the given half-width
    pub fn pad(&self, bounds: Rect, max_half_width: f32) -> Rect {
        let stroke_span = 2.0 * max_half_width;
        let margin = self
            .config
            .min_margin_px
            .max(stroke_span * self.config.margin_factor);
        bounds.expand(margin).round_out()
    }

    /// Edge list in traversal order plus the padded bounds
    pub fn to_edges(&self, polygon: &OutlinePolygon) -> (EdgeBuffer, Rect) {
        let points = polygon.points();
        let edges = points
            .iter()
            .enumerate()
            .map(|(i, &p0)| {
                let p1 = points[(i + 1) % points.len()];
                let d = (p1 - p0).normalize();
                Edge {
                    p0: p0.to_array(),
                    p1: p1.to_array(),
                    // Interior is on the left of a counter-clockwise loop.
                    normal: [d.y, -d.x],
                    id: i as u32,
                    _pad: 0,
                }
            })
            .collect();
        (EdgeBuffer { edges }, self.bounds(polygon))
    }

    /// Triangulate an outline
    ///
    /// Simple outlines are ear clipped, so every outline vertex appears in
    /// the mesh exactly once. Self-intersecting outlines are repaired through
    /// lyon's non-zero fill tessellator.
    pub fn triangulate(&self, polygon: &OutlinePolygon) -> Result<FillBuffer> {
        let points = polygon.points();
        if points.len() < 3 {
            return Err(GeometryError::Degenerate(points.len()));
        }
        let bounds = self.bounds(polygon);

        if is_simple(points) {
            if let Some(indices) = ear_clip(points) {
                return Ok(FillBuffer {
                    vertices: points.iter().map(|p| fill_vertex(*p, bounds)).collect(),
                    indices,
                    repaired: false,
                });
            }
            tracing::debug!(
                "ear clipping stalled on {} vertices, repairing outline",
                points.len()
            );
        }

        repair_tessellate(points, bounds)
    }
}

fn fill_vertex(p: Point, bounds: Rect) -> FillVertex {
    let w = bounds.width().max(f32::EPSILON);
    let h = bounds.height().max(f32::EPSILON);
    FillVertex {
        position: p.to_array(),
        uv: [(p.x - bounds.x()) / w, (p.y - bounds.y()) / h],
    }
}

/// Proper crossing test (shared endpoints and touching do not count)
fn segments_cross(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = (b - a).cross(c - a);
    let o2 = (b - a).cross(d - a);
    let o3 = (d - c).cross(a - c);
    let o4 = (d - c).cross(b - c);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Whether no two non-adjacent edges of the loop cross
fn is_simple(points: &[Point]) -> bool {
    let n = points.len();
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if segments_cross(a, b, points[j], points[(j + 1) % n]) {
                return false;
            }
        }
    }
    true
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    (b - a).cross(p - a) >= 0.0 && (c - b).cross(p - b) >= 0.0 && (a - c).cross(p - c) >= 0.0
}

/// Ear clipping over a counter-clockwise simple polygon
fn ear_clip(points: &[Point]) -> Option<Vec<u32>> {
    let mut ring: Vec<usize> = (0..points.len()).collect();
    let mut indices = Vec::with_capacity(3 * (points.len() - 2));
    let scale = Rect::from_points(points)
        .map(|r| r.width().max(r.height()))
        .unwrap_or(1.0)
        .max(1.0);
    let collinear_eps = 1e-6 * scale * scale;

    let mut cursor = 0;
    while ring.len() > 3 {
        let m = ring.len();
        let mut clipped = None;

        for offset in 0..m {
            let k = (cursor + offset) % m;
            let (ia, ib, ic) = (ring[(k + m - 1) % m], ring[k], ring[(k + 1) % m]);
            let (a, b, c) = (points[ia], points[ib], points[ic]);
            if (b - a).cross(c - b) <= collinear_eps {
                continue;
            }
            let blocked = ring.iter().any(|&j| {
                j != ia
                    && j != ib
                    && j != ic
                    && points[j] != a
                    && points[j] != b
                    && points[j] != c
                    && point_in_triangle(points[j], a, b, c)
            });
            if !blocked {
                clipped = Some(k);
                break;
            }
        }

        // No convex ear: drop a flat vertex if there is one.
        let k = match clipped {
            Some(k) => k,
            None => (0..m).find(|&k| {
                let (a, b, c) = (
                    points[ring[(k + m - 1) % m]],
                    points[ring[k]],
                    points[ring[(k + 1) % m]],
                );
                (b - a).cross(c - b).abs() <= collinear_eps
            })?,
        };

        indices.extend_from_slice(&[
            ring[(k + m - 1) % m] as u32,
            ring[k] as u32,
            ring[(k + 1) % m] as u32,
        ]);
        ring.remove(k);
        cursor = k % ring.len();
    }

    indices.extend(ring.iter().map(|&i| i as u32));
    Some(indices)
}

/// Non-zero tessellation through lyon for outlines ear clipping cannot take
fn repair_tessellate(points: &[Point], bounds: Rect) -> Result<FillBuffer> {
    let mut events = Vec::with_capacity(points.len() + 2);
    events.push(PathEvent::Begin {
        at: point(points[0].x, points[0].y),
    });
    for pair in points.windows(2) {
        events.push(PathEvent::Line {
            from: point(pair[0].x, pair[0].y),
            to: point(pair[1].x, pair[1].y),
        });
    }
    let last = points[points.len() - 1];
    events.push(PathEvent::End {
        last: point(last.x, last.y),
        first: point(points[0].x, points[0].y),
        close: true,
    });

    let mut geometry: VertexBuffers<FillVertex, u32> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    let options = FillOptions::default()
        .with_tolerance(0.1)
        .with_fill_rule(FillRule::NonZero);

    tessellator
        .tessellate(
            events.iter().cloned(),
            &options,
            &mut BuffersBuilder::new(&mut geometry, |vertex: LyonFillVertex| {
                let p = vertex.position();
                fill_vertex(Point::new(p.x, p.y), bounds)
            }),
        )
        .map_err(|e| GeometryError::Tessellation(format!("{:?}", e)))?;

    if geometry.indices.is_empty() {
        return Err(GeometryError::Tessellation(
            "repair produced no triangles".into(),
        ));
    }

    Ok(FillBuffer {
        vertices: geometry.vertices,
        indices: geometry.indices,
        repaired: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::OutlineBuilder;
    use quill_core::Sample;

    fn square() -> OutlinePolygon {
        OutlinePolygon::from_points(
            vec![
                Point::new(0.0, 0.0),
                Point::new(4.0, 0.0),
                Point::new(4.0, 4.0),
                Point::new(0.0, 4.0),
            ],
            2.0,
        )
    }

    #[test]
    fn test_triangulate_square() {
        let fill = GeometryPacker::default().triangulate(&square()).unwrap();
        assert_eq!(fill.vertices.len(), 4);
        assert_eq!(fill.indices.len(), 6);
        assert!((fill.area() - 16.0).abs() < 1e-4);
        assert!(!fill.repaired);
    }

    #[test]
    fn test_concave_polygon_area_matches() {
        // L-shape, counter-clockwise
        let polygon = OutlinePolygon::from_points(
            vec![
                Point::new(0.0, 0.0),
                Point::new(6.0, 0.0),
                Point::new(6.0, 2.0),
                Point::new(2.0, 2.0),
                Point::new(2.0, 6.0),
                Point::new(0.0, 6.0),
            ],
            1.0,
        );
        let fill = GeometryPacker::default().triangulate(&polygon).unwrap();
        assert_eq!(fill.vertices.len(), polygon.len());
        assert_eq!(fill.indices.len() % 3, 0);
        assert!((fill.area() - polygon.area()).abs() < 1e-3);
    }

    #[test]
    fn test_stroke_outline_triangulates_every_vertex() {
        let samples: Vec<Sample> = (0..20)
            .map(|i| {
                let x = i as f32 * 1.5;
                Sample::new(x, (x * 0.3).sin() * 2.0, 0.5 + 0.02 * i as f32, i as f64)
            })
            .collect();
        let outline = OutlineBuilder::default().build(&samples, 6.0).unwrap();
        let packer = GeometryPacker::default();
        let fill = packer.triangulate(&outline).unwrap();
        let (edges, _) = packer.to_edges(&outline);

        assert_eq!(edges.len(), fill.vertices.len());
        assert!((fill.area() - outline.area()).abs() < 1e-2 * outline.area());
    }

    #[test]
    fn test_append_rebases_indices() {
        let packer = GeometryPacker::default();
        let mut mesh = packer.triangulate(&square()).unwrap();
        let shifted = OutlinePolygon::from_points(
            square().points().iter().map(|p| *p + Point::new(10.0, 0.0)).collect(),
            2.0,
        );
        mesh.append(packer.triangulate(&shifted).unwrap());

        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangle_count(), 4);
        assert!(mesh.indices[6..].iter().all(|&i| (4..8).contains(&i)));
        assert!((mesh.area() - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_self_intersection_is_repaired() {
        // Bow-tie
        let polygon = OutlinePolygon::from_points(
            vec![
                Point::new(0.0, 0.0),
                Point::new(4.0, 4.0),
                Point::new(4.0, 0.0),
                Point::new(0.0, 4.0),
            ],
            1.0,
        );
        let fill = GeometryPacker::default().triangulate(&polygon).unwrap();
        assert!(fill.repaired);
        assert!(!fill.is_empty());
        assert!((fill.area() - 8.0).abs() < 1e-2);
    }

    #[test]
    fn test_degenerate_outline_is_an_error() {
        let polygon = OutlinePolygon::from_points(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)], 1.0);
        assert_eq!(
            GeometryPacker::default().triangulate(&polygon).unwrap_err(),
            GeometryError::Degenerate(2)
        );
    }

    #[test]
    fn test_edges_follow_traversal_with_outward_normals() {
        let packer = GeometryPacker::default();
        let (edges, bounds) = packer.to_edges(&square());

        assert_eq!(edges.len(), 4);
        for (i, edge) in edges.edges.iter().enumerate() {
            assert_eq!(edge.id, i as u32);
            let mid = edge.start().lerp(edge.end(), 0.5);
            let outside = mid + edge.outward_normal();
            assert_eq!(quill_core::geometry::winding_number(outside, &edges.loop_points()), 0);
        }

        // margin = max(4, 2 * 2.0 * 0.5) = 4
        assert_eq!(bounds, Rect::new(-4.0, -4.0, 12.0, 12.0));
    }

    #[test]
    fn test_margin_scales_with_stroke_width() {
        let packer = GeometryPacker::default();
        let wide = OutlinePolygon::from_points(square().points().to_vec(), 10.0);
        // margin = max(4, 20 * 0.5) = 10
        assert_eq!(packer.bounds(&wide), Rect::new(-10.0, -10.0, 24.0, 24.0));
    }
}
