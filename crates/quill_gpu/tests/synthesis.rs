//! Distance-field synthesis against real stroke outlines

use quill_core::{Point, Sample};
use quill_gpu::buffers::{BufferAllocator, BufferConfig, BufferManager, BufferUsage, WgpuAllocator};
use quill_gpu::{DistanceField, GpuContext, SynthesisConfig, SynthesisError, Synthesizer};
use quill_paint::{EdgeBuffer, GeometryPacker, OutlineBuilder};

fn arc_stroke() -> (EdgeBuffer, quill_core::Rect) {
    let samples: Vec<Sample> = (0..16)
        .map(|i| {
            let a = i as f32 * 0.15;
            Sample::new(30.0 * a.cos(), 30.0 * a.sin(), 0.6 + 0.02 * i as f32, i as f64)
        })
        .collect();
    let outline = OutlineBuilder::default().build(&samples, 10.0).unwrap();
    GeometryPacker::default().to_edges(&outline)
}

#[test]
fn test_distance_vanishes_on_edges_and_flips_across_them() {
    let (edges, bounds) = arc_stroke();
    let mut synth = Synthesizer::cpu(SynthesisConfig::default());
    let field = synth.synthesize(&edges.edges, None, bounds).unwrap();
    let field = field.host().unwrap();

    for edge in &edges.edges {
        let mid = edge.start().lerp(edge.end(), 0.5);
        let n = edge.outward_normal();
        assert!(field.sample(mid).abs() < 0.5, "edge {} midpoint", edge.id);
        assert!(field.sample(mid - n * 1.5) < 0.0, "edge {} inside", edge.id);
        assert!(field.sample(mid + n * 1.5) > 0.0, "edge {} outside", edge.id);
    }
}

#[test]
fn test_every_texel_finds_an_edge() {
    let (edges, bounds) = arc_stroke();
    let mut synth = Synthesizer::cpu(SynthesisConfig::default());
    let field = synth.synthesize(&edges.edges, None, bounds).unwrap();
    let field = field.host().unwrap();
    let (w, h) = field.dimensions();

    for y in 0..h {
        for x in 0..w {
            let id = field.edge_id(x, y);
            assert!(id >= 0 && (id as usize) < edges.len());
            // The stored offset lands on the reported edge.
            let nearest = field.nearest_point(x, y);
            assert!(edges.edges[id as usize].distance(nearest) < 1e-3);
        }
    }
}

#[test]
fn test_resolution_scale_keeps_canvas_units() {
    let (edges, bounds) = arc_stroke();
    let mut coarse = Synthesizer::cpu(SynthesisConfig::default());
    let mut fine = Synthesizer::cpu(SynthesisConfig {
        resolution_scale: 2.0,
        ..SynthesisConfig::default()
    });
    let a = coarse.synthesize(&edges.edges, None, bounds).unwrap();
    let b = fine.synthesize(&edges.edges, None, bounds).unwrap();
    assert_eq!(b.extent().width, 2 * a.extent().width);

    let point = Point::new(30.0, 0.0) + Point::new(0.25, 0.25);
    let (da, db) = (a.host().unwrap().sample(point), b.host().unwrap().sample(point));
    assert!((da - db).abs() < 0.5, "{da} vs {db}");
}

#[test]
fn test_texture_limit_aborts_synthesis() {
    let (edges, bounds) = arc_stroke();
    let mut synth = Synthesizer::cpu(SynthesisConfig {
        max_texture_dim: 16,
        ..SynthesisConfig::default()
    });
    let err = synth.synthesize(&edges.edges, None, bounds).unwrap_err();
    assert!(matches!(err, SynthesisError::TextureTooLarge { max: 16, .. }));
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_device_field_matches_cpu_reference() {
    let context = match GpuContext::headless_blocking() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("skipping: {e}");
            return;
        }
    };

    let (edges, bounds) = arc_stroke();

    let mut buffers = BufferManager::new(WgpuAllocator::new(context.clone()), BufferConfig::default());
    let handle = buffers
        .upload("edges", bytemuck::cast_slice(&edges.edges), BufferUsage::Storage)
        .unwrap();
    let uploaded = buffers.get(handle).unwrap();
    let device_edges = WgpuAllocator::as_wgpu(uploaded.raw());

    let mut gpu = Synthesizer::with_context(SynthesisConfig::default(), Some(context));
    let device = gpu.synthesize(&edges.edges, device_edges, bounds).unwrap();
    assert!(matches!(device, DistanceField::Device(_)));

    let mut cpu = Synthesizer::cpu(SynthesisConfig::default());
    let reference = cpu.synthesize(&edges.edges, None, bounds).unwrap();

    let (gpu_field, cpu_field) = (device.host().unwrap(), reference.host().unwrap());
    assert_eq!(gpu_field.dimensions(), cpu_field.dimensions());
    for (g, c) in gpu_field.texels().iter().zip(cpu_field.texels()) {
        assert!((g[0].abs() - c[0].abs()).abs() < 1e-3);
        if c[0].abs() > 1e-3 {
            assert_eq!(g[0].signum(), c[0].signum());
        }
    }

    drop(uploaded);
    buffers.release_all();
    assert_eq!(buffers.allocator().live_allocations(), 0);
}
