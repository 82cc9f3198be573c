//! WGSL compute shaders for distance-field synthesis
//!
//! All three passes share the same uniform block and edge layout:
//!
//! - [`seed_shader`] marks texels near an edge
//! - [`propagate_shader`] runs one Jump Flooding step
//! - [`encode_shader`] writes the final signed field
//!
//! Intermediate texels are `(nearest.x, nearest.y, distance, edge id)`.

/// Uniforms, edge records and helpers prepended to every pass
const COMMON: &str = r#"
struct Params {
    origin: vec2<f32>,
    texel_size: f32,
    seed_radius: f32,
    width: u32,
    height: u32,
    step: u32,
    edge_count: u32,
    tie_epsilon: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}

struct Edge {
    p0: vec2<f32>,
    p1: vec2<f32>,
    normal: vec2<f32>,
    id: u32,
    _pad: u32,
}

const NO_EDGE_DISTANCE: f32 = 1.0e9;

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> edges: array<Edge>;

fn texel_center(coord: vec2<u32>) -> vec2<f32> {
    return params.origin + (vec2<f32>(coord) + vec2<f32>(0.5)) * params.texel_size;
}

fn closest_on_edge(p: vec2<f32>, e: Edge) -> vec2<f32> {
    let ab = e.p1 - e.p0;
    let len_sq = dot(ab, ab);
    if (len_sq <= 1.0e-12) {
        return e.p0;
    }
    let t = clamp(dot(p - e.p0, ab) / len_sq, 0.0, 1.0);
    return e.p0 + ab * t;
}

fn in_bounds(coord: vec2<i32>) -> bool {
    return coord.x >= 0 && coord.y >= 0
        && coord.x < i32(params.width) && coord.y < i32(params.height);
}
"#;

const SEED_BODY: &str = r#"
@group(0) @binding(2) var dst: texture_storage_2d<rgba32float, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let p = texel_center(gid.xy);
    var best = vec4<f32>(0.0, 0.0, NO_EDGE_DISTANCE, -1.0);
    for (var i = 0u; i < params.edge_count; i++) {
        let q = closest_on_edge(p, edges[i]);
        let d = distance(p, q);
        if (d <= params.seed_radius && d < best.z) {
            best = vec4<f32>(q, d, f32(edges[i].id));
        }
    }
    textureStore(dst, vec2<i32>(gid.xy), best);
}
"#;

const PROPAGATE_BODY: &str = r#"
@group(0) @binding(2) var src: texture_2d<f32>;
@group(0) @binding(3) var dst: texture_storage_2d<rgba32float, write>;

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let coord = vec2<i32>(gid.xy);
    let p = texel_center(gid.xy);
    let jump = i32(params.step);
    var best = textureLoad(src, coord, 0);

    for (var dy = -1; dy <= 1; dy++) {
        for (var dx = -1; dx <= 1; dx++) {
            if (dx == 0 && dy == 0) {
                continue;
            }
            let c = coord + vec2<i32>(dx, dy) * jump;
            if (!in_bounds(c)) {
                continue;
            }
            let candidate = textureLoad(src, c, 0);
            if (candidate.w < 0.0) {
                continue;
            }
            let q = closest_on_edge(p, edges[u32(candidate.w)]);
            let d = distance(p, q);
            if (best.w < 0.0 || d < best.z - params.tie_epsilon) {
                best = vec4<f32>(q, d, candidate.w);
            }
        }
    }
    textureStore(dst, coord, best);
}
"#;

const ENCODE_BODY: &str = r#"
@group(0) @binding(2) var src: texture_2d<f32>;
@group(0) @binding(3) var dst: texture_storage_2d<rgba32float, write>;

fn cross2(a: vec2<f32>, b: vec2<f32>) -> f32 {
    return a.x * b.y - a.y * b.x;
}

fn winding(p: vec2<f32>) -> i32 {
    var w = 0;
    for (var i = 0u; i < params.edge_count; i++) {
        let a = edges[i].p0;
        let b = edges[i].p1;
        if (a.y <= p.y) {
            if (b.y > p.y && cross2(b - a, p - a) > 0.0) {
                w += 1;
            }
        } else if (b.y <= p.y && cross2(b - a, p - a) < 0.0) {
            w -= 1;
        }
    }
    return w;
}

@compute @workgroup_size(8, 8)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let coord = vec2<i32>(gid.xy);
    let seed = textureLoad(src, coord, 0);
    if (seed.w < 0.0) {
        textureStore(dst, coord, vec4<f32>(NO_EDGE_DISTANCE, 0.0, 0.0, -1.0));
        return;
    }
    let p = texel_center(gid.xy);
    let q = closest_on_edge(p, edges[u32(seed.w)]);
    let d = distance(p, q);
    let signed_distance = select(d, -d, winding(p) != 0);
    textureStore(dst, coord, vec4<f32>(signed_distance, q - p, seed.w));
}
"#;

/// Workgroup edge length shared by all passes
pub const WORKGROUP_SIZE: u32 = 8;

/// Full source of the seed pass
pub fn seed_shader() -> String {
    [COMMON, SEED_BODY].concat()
}

/// Full source of one propagation step
pub fn propagate_shader() -> String {
    [COMMON, PROPAGATE_BODY].concat()
}

/// Full source of the encode pass
pub fn encode_shader() -> String {
    [COMMON, ENCODE_BODY].concat()
}
