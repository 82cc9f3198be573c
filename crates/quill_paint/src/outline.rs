//! Variable-width stroke outlines
//!
//! Turns a sampled centerline into one closed, counter-clockwise polygon:
//! the right offset stream, a round cap at the end, the left offset stream
//! walked backwards, and a round cap at the start. A single sample becomes a
//! regular polygon approximating a circle.
//!
//! Gentle corners get miter joins. Sharp corners and reversals get a round
//! join on the outer side while the inner side runs through the centerline
//! point; the resulting self-overlap is only meaningful under non-zero fill.

use std::f32::consts::{PI, TAU};

use quill_core::geometry::signed_area;
use quill_core::{PressureCurve, Point, Rect, Sample};

/// Smallest half-width the builder will emit
const MIN_HALF_WIDTH: f32 = 0.05;

/// Consecutive points closer than this collapse into one
const DUPLICATE_EPSILON: f32 = 1e-4;

/// Configuration for outline construction
#[derive(Clone, Debug)]
pub struct OutlineConfig {
    /// Pressure to width factor
    pub curve: PressureCurve,
    /// Target chord length for round caps and dots, in canvas pixels
    pub cap_chord_px: f32,
    pub min_cap_segments: usize,
    pub max_cap_segments: usize,
    /// Corners whose miter offset scale would exceed this get round joins
    pub miter_limit: f32,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            curve: PressureCurve::Identity,
            cap_chord_px: 1.0,
            min_cap_segments: 4,
            max_cap_segments: 32,
            miter_limit: 2.0,
        }
    }
}

/// Closed stroke silhouette, counter-clockwise (positive shoelace area)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutlinePolygon {
    points: Vec<Point>,
    max_half_width: f32,
}

impl OutlinePolygon {
    /// Wrap an existing loop, normalizing it to counter-clockwise order
    pub fn from_points(mut points: Vec<Point>, max_half_width: f32) -> Self {
        dedup_loop(&mut points);
        if signed_area(&points) < 0.0 {
            points.reverse();
        }
        Self {
            points,
            max_half_width,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Largest local half-width used to build the outline
    pub fn max_half_width(&self) -> f32 {
        self.max_half_width
    }

    pub fn area(&self) -> f32 {
        signed_area(&self.points)
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_points(&self.points).unwrap_or(Rect::ZERO)
    }
}

/// Builds outline polygons from sample lists
#[derive(Clone, Debug, Default)]
pub struct OutlineBuilder {
    config: OutlineConfig,
}

impl OutlineBuilder {
    pub fn new(config: OutlineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutlineConfig {
        &self.config
    }

    /// Local half-width for a sample
    ///
    /// `base_size` is the stroke diameter at full curve response.
    pub fn half_width(&self, base_size: f32, pressure: f32) -> f32 {
        (base_size * self.config.curve.apply(pressure) * 0.5).max(MIN_HALF_WIDTH)
    }

    /// Build the closed outline, `None` when no sample has a finite position
    pub fn build(&self, samples: &[Sample], base_size: f32) -> Option<OutlinePolygon> {
        // Collapse coincident centerline points, keeping the wider sample.
        let mut centers: Vec<(Point, f32)> = Vec::with_capacity(samples.len());
        for sample in samples {
            let p = sample.position();
            if !p.is_finite() {
                continue;
            }
            let w = self.half_width(base_size, sample.pressure);
            match centers.last_mut() {
                Some((last, last_w)) if last.distance(p) < DUPLICATE_EPSILON => {
                    *last_w = last_w.max(w);
                }
                _ => centers.push((p, w)),
            }
        }

        let max_half_width = centers
            .iter()
            .map(|(_, w)| *w)
            .fold(MIN_HALF_WIDTH, f32::max);

        let polygon = match centers.len() {
            0 => return None,
            1 => self.dot(centers[0].0, centers[0].1),
            _ => self.ribbon(&centers),
        };

        Some(OutlinePolygon::from_points(polygon, max_half_width))
    }

    /// Segment count for an arc, always even so the arc apex is a vertex
    fn cap_segments(&self, radius: f32, sweep: f32) -> usize {
        let chord = self.config.cap_chord_px.max(0.05);
        let min = self.config.min_cap_segments.max(2);
        let segments = ((sweep * radius / chord).ceil() as usize)
            .clamp(min, self.config.max_cap_segments.max(min));
        segments + (segments & 1)
    }

    /// Regular polygon approximating a disc
    fn dot(&self, center: Point, radius: f32) -> Vec<Point> {
        let segments = self.cap_segments(radius, TAU).max(8);
        (0..segments)
            .map(|k| {
                let angle = TAU * k as f32 / segments as f32;
                center + Point::new(angle.cos(), angle.sin()) * radius
            })
            .collect()
    }

    /// Arc around `center` from `from_angle` through `sweep`, endpoints excluded
    fn arc(
        &self,
        out: &mut Vec<Point>,
        center: Point,
        radius: f32,
        from_angle: f32,
        sweep: f32,
        segments: usize,
    ) {
        for k in 1..segments {
            let angle = from_angle + sweep * k as f32 / segments as f32;
            out.push(center + Point::new(angle.cos(), angle.sin()) * radius);
        }
    }

    fn half_arc(&self, out: &mut Vec<Point>, center: Point, radius: f32, from_angle: f32) {
        let segments = self.cap_segments(radius, PI);
        self.arc(out, center, radius, from_angle, PI, segments);
    }

    fn ribbon(&self, centers: &[(Point, f32)]) -> Vec<Point> {
        let n = centers.len();
        let segments: Vec<(Point, f32)> = centers
            .windows(2)
            .map(|pair| {
                let d = pair[1].0 - pair[0].0;
                (d.normalize(), d.length())
            })
            .collect();

        let mut left = Vec::with_capacity(n);
        let mut right = Vec::with_capacity(n);

        let (start, start_w) = centers[0];
        let start_normal = segments[0].0.perp();
        left.push(start + start_normal * start_w);
        right.push(start - start_normal * start_w);

        for i in 1..n - 1 {
            let (p, w) = centers[i];
            let (incoming, len_in) = segments[i - 1];
            let (outgoing, len_out) = segments[i];
            match self.miter(incoming, outgoing, w, len_in.min(len_out)) {
                Some((normal, scale)) => {
                    left.push(p + normal * (w * scale));
                    right.push(p - normal * (w * scale));
                }
                None => self.round_join(&mut left, &mut right, p, w, incoming, outgoing),
            }
        }

        let (end, end_w) = centers[n - 1];
        let end_normal = segments[n - 2].0.perp();
        left.push(end + end_normal * end_w);
        right.push(end - end_normal * end_w);

        let mut loop_points =
            Vec::with_capacity(left.len() + right.len() + 2 * self.config.max_cap_segments);

        loop_points.extend_from_slice(&right);
        self.half_arc(&mut loop_points, end, end_w, (-end_normal.y).atan2(-end_normal.x));
        loop_points.extend(left.iter().rev());
        self.half_arc(&mut loop_points, start, start_w, start_normal.y.atan2(start_normal.x));

        loop_points
    }

    /// Miter normal and offset scale, `None` when the corner needs a round join
    fn miter(&self, incoming: Point, outgoing: Point, w: f32, shortest: f32) -> Option<(Point, f32)> {
        let bisector = (incoming + outgoing).normalize();
        if bisector == Point::ZERO {
            return None;
        }
        let cos_half = bisector.dot(incoming);
        if cos_half < 1.0 / self.config.miter_limit.max(1.0) {
            return None;
        }
        // Inner offsets from both ends of a segment must not pass each other.
        let tan_half = (1.0 - cos_half * cos_half).max(0.0).sqrt() / cos_half;
        if w * tan_half > 0.5 * shortest {
            return None;
        }
        Some((bisector.perp(), 1.0 / cos_half))
    }

    /// Both segment offsets at `p`, bridged by an arc on the outer side and
    /// by the centerline point on the inner side
    fn round_join(
        &self,
        left: &mut Vec<Point>,
        right: &mut Vec<Point>,
        p: Point,
        w: f32,
        incoming: Point,
        outgoing: Point,
    ) {
        let (n0, n1) = (incoming.perp(), outgoing.perp());
        let turn = incoming.cross(outgoing).atan2(incoming.dot(outgoing));
        // Left turns put the right side outside the corner.
        let (outer, inner, side) = if turn >= 0.0 {
            (right, left, -1.0)
        } else {
            (left, right, 1.0)
        };

        let from = n0 * side;
        let chord = self.config.cap_chord_px.max(0.05);
        let segments =
            ((turn.abs() * w / chord).ceil() as usize).clamp(1, self.config.max_cap_segments.max(1));
        outer.push(p + from * w);
        self.arc(outer, p, w, from.y.atan2(from.x), turn, segments);
        outer.push(p + n1 * (w * side));

        inner.push(p - n0 * (w * side));
        inner.push(p);
        inner.push(p - n1 * (w * side));
    }
}

/// Remove consecutive duplicates, including across the wrap-around
fn dedup_loop(points: &mut Vec<Point>) {
    points.dedup_by(|b, a| a.distance(*b) < DUPLICATE_EPSILON);
    while points.len() > 1 {
        let (first, last) = (points[0], points[points.len() - 1]);
        if first.distance(last) < DUPLICATE_EPSILON {
            points.pop();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight() -> Vec<Sample> {
        vec![Sample::new(0.0, 0.0, 1.0, 0.0), Sample::new(10.0, 0.0, 1.0, 1.0)]
    }

    #[test]
    fn test_empty_samples_have_no_outline() {
        assert!(OutlineBuilder::default().build(&[], 4.0).is_none());
    }

    #[test]
    fn test_straight_stroke_bounds() {
        let outline = OutlineBuilder::default().build(&straight(), 4.0).unwrap();
        let bounds = outline.bounds();

        assert!((bounds.min().x + 2.0).abs() < 1e-3);
        assert!((bounds.min().y + 2.0).abs() < 1e-3);
        assert!((bounds.max().x - 12.0).abs() < 1e-3);
        assert!((bounds.max().y - 2.0).abs() < 1e-3);
        assert!(outline.area() > 0.0);
    }

    #[test]
    fn test_straight_stroke_has_parallel_sides() {
        let outline = OutlineBuilder::default().build(&straight(), 4.0).unwrap();
        let points = outline.points();

        // Right side then the end cap: the first edge runs along y = -2.
        assert_eq!(points[0], Point::new(0.0, -2.0));
        assert_eq!(points[1], Point::new(10.0, -2.0));

        let top = points
            .windows(2)
            .filter(|pair| (pair[0].y - 2.0).abs() < 1e-5 && (pair[1].y - 2.0).abs() < 1e-5)
            .count();
        assert_eq!(top, 1);
    }

    #[test]
    fn test_tap_is_a_disc() {
        let builder = OutlineBuilder::default();
        let outline = builder.build(&[Sample::new(3.0, 4.0, 0.5, 0.0)], 8.0).unwrap();
        let radius = builder.half_width(8.0, 0.5);

        assert_eq!(radius, 2.0);
        for p in outline.points() {
            assert!((p.distance(Point::new(3.0, 4.0)) - radius).abs() < 1e-4);
        }
        let circle = PI * radius * radius;
        assert!(outline.area() > 0.8 * circle && outline.area() <= circle);
    }

    #[test]
    fn test_winding_is_counter_clockwise_for_any_direction() {
        let builder = OutlineBuilder::default();
        for (dx, dy) in [(1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (-0.7, -0.7)] {
            let samples: Vec<Sample> = (0..8)
                .map(|i| Sample::new(dx * i as f32 * 2.0, dy * i as f32 * 2.0, 0.8, i as f64))
                .collect();
            let outline = builder.build(&samples, 6.0).unwrap();
            assert!(outline.area() > 0.0, "direction ({dx}, {dy})");
        }
    }

    #[test]
    fn test_coincident_samples_collapse_to_dot() {
        let samples = [
            Sample::new(1.0, 1.0, 0.4, 0.0),
            Sample::new(1.0, 1.0, 1.0, 1.0),
        ];
        let builder = OutlineBuilder::default();
        let outline = builder.build(&samples, 4.0).unwrap();
        for p in outline.points() {
            assert!((p.distance(Point::new(1.0, 1.0)) - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_non_finite_samples_have_no_outline() {
        let samples = [
            Sample::new(f32::NAN, 0.0, 1.0, 0.0),
            Sample::new(2.0, f32::INFINITY, 1.0, 1.0),
        ];
        assert!(OutlineBuilder::default().build(&samples, 4.0).is_none());
    }

    #[test]
    fn test_hairpin_covers_its_tip_and_both_legs() {
        use quill_core::geometry::winding_number;

        let samples: Vec<Sample> = [0.0, 5.0, 10.0, 5.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, x)| Sample::new(*x, 0.0, 1.0, i as f64))
            .collect();
        let outline = OutlineBuilder::default().build(&samples, 6.0).unwrap();
        let points = outline.points();

        for p in [
            Point::new(12.5, 0.5),
            Point::new(10.5, 2.5),
            Point::new(9.5, -2.5),
            Point::new(5.5, 2.5),
            Point::new(4.5, -2.5),
            Point::new(-2.5, 0.5),
        ] {
            assert_ne!(winding_number(p, points), 0, "{p:?}");
        }
        assert_eq!(winding_number(Point::new(14.0, 0.0), points), 0);
    }

    #[test]
    fn test_gentle_corner_keeps_a_miter() {
        let samples = [
            Sample::new(0.0, 0.0, 1.0, 0.0),
            Sample::new(10.0, 0.0, 1.0, 1.0),
            Sample::new(20.0, 1.0, 1.0, 2.0),
        ];
        let outline = OutlineBuilder::default().build(&samples, 2.0).unwrap();
        let center = Point::new(10.0, 0.0);
        assert!(!outline.points().contains(&center));
    }

    #[test]
    fn test_reversal_routes_the_inner_side_through_the_corner() {
        let samples = [
            Sample::new(0.0, 0.0, 1.0, 0.0),
            Sample::new(10.0, 0.0, 1.0, 1.0),
            Sample::new(0.0, 0.0, 1.0, 2.0),
        ];
        let outline = OutlineBuilder::default().build(&samples, 4.0).unwrap();
        assert!(outline.points().contains(&Point::new(10.0, 0.0)));
        assert!(outline.area() > 0.0);
    }
}
