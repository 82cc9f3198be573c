//! Stroke sessions
//!
//! [`StrokeEngine`] drives one stroke at a time through the pipeline:
//!
//! - while the pointer is down, every sample extends a cheap preview mesh by
//!   one capsule per resampled segment, so per-sample work does not grow
//!   with the stroke
//! - on finish the outline is packed, its edges uploaded and synthesized
//!   into a distance field, bridged into a drawable and committed to the
//!   history
//!
//! Resource and synthesis failures never drop a stroke. Device failures
//! degrade to CPU polygon rasterization and tessellation failures to disk
//! stamping; the cause is reported in [`Finalized`].

use quill_core::{BrushSettings, Command, History, Rect, Sample, StrokeId, StrokeIdGenerator};
use quill_gpu::{
    BufferAllocator, BufferConfig, BufferError, BufferManager, BufferUsage, DistanceField,
    DrawableBlend, GpuContext, HostAllocator, SurfaceBridge, SynthesisConfig, SynthesisError,
    Synthesizer, WgpuAllocator,
};
use quill_paint::{
    fill_polygon, stamp_disks, EdgeBuffer, FillBuffer, GeometryError, GeometryPacker,
    OutlineBuilder, OutlineConfig, PackConfig, Sampler, SamplerConfig,
};
use thiserror::Error;

use crate::commit::{commit, StrokeCommand, StrokeRecord};
use crate::compositor::{Compositor, DrawableId};

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrokeError {
    #[error("a stroke session is already active")]
    SessionActive,

    #[error("no stroke session is active")]
    NoSession,

    /// Every sample of the session had an unusable position
    #[error("stroke has no usable samples")]
    Empty,
}

pub type Result<T> = std::result::Result<T, StrokeError>;

/// Why a stroke left the distance-field path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackCause {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// How the committed drawable was produced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPath {
    /// Synthesized signed distance field
    DistanceField,
    /// Hard-edged polygon fill
    Rasterized,
    /// Disks along the centerline
    Stamped,
}

/// Engine configuration
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub sampler: SamplerConfig,
    pub outline: OutlineConfig,
    pub pack: PackConfig,
    pub buffers: BufferConfig,
    pub synthesis: SynthesisConfig,
    /// Anti-aliasing band in canvas pixels
    pub aa_width: f32,
    /// Stream samples to the device while the stroke is in progress
    pub streaming: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            outline: OutlineConfig::default(),
            pack: PackConfig::default(),
            buffers: BufferConfig::default(),
            synthesis: SynthesisConfig::default(),
            aa_width: 1.0,
            streaming: false,
        }
    }
}

impl EngineConfig {
    /// Defaults with `QUILL_*` environment overrides applied
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            buffers: defaults.buffers.clone().with_env_overrides(),
            synthesis: defaults.synthesis.clone().with_env_overrides(),
            ..defaults
        }
    }
}

/// Live preview update for the in-progress stroke
///
/// `appended` holds only the triangles added by this call. Its indices
/// already point into the session mesh returned by
/// [`StrokeEngine::preview_mesh`], so a renderer can append it as is.
#[derive(Clone, Debug, Default)]
pub struct Preview {
    pub generation: u64,
    pub appended: FillBuffer,
    /// Session mesh vertex count before `appended`
    pub base_vertex: u32,
    /// Padded bounds of the whole stroke so far
    pub bounds: Rect,
}

/// Outcome of finishing a stroke
#[derive(Debug)]
pub struct Finalized {
    pub stroke: StrokeId,
    pub drawable: Option<DrawableId>,
    pub bounds: Rect,
    pub path: RenderPath,
    /// Set when the stroke degraded to a fallback path
    pub degraded: Option<FallbackCause>,
    /// Whether the committed samples were read back from the device stream
    pub streamed: bool,
}

#[derive(Debug)]
struct Session {
    settings: BrushSettings,
    streaming: bool,
    preview: PreviewMesh,
}

/// Session fill mesh, one capsule per resampled segment
///
/// Capsules overlap at the shared samples; the union is the stroke.
#[derive(Debug, Default)]
struct PreviewMesh {
    mesh: FillBuffer,
    /// Samples already covered by the mesh
    meshed: usize,
    /// Unpadded outline bounds of every meshed piece
    outline_bounds: Option<Rect>,
    max_half_width: f32,
}

impl PreviewMesh {
    /// Mesh the samples past `meshed`, returning the new triangles and the
    /// vertex count they start at
    fn extend(
        &mut self,
        samples: &[Sample],
        size: f32,
        outline: &OutlineBuilder,
        packer: &GeometryPacker,
    ) -> (FillBuffer, u32) {
        let base_vertex = self.mesh.vertices.len();
        let first_index = self.mesh.indices.len();
        let mut repaired = false;

        for k in self.meshed..samples.len() {
            let piece = &samples[k.saturating_sub(1)..=k];
            let Some(polygon) = outline.build(piece, size) else {
                continue;
            };
            match packer.triangulate(&polygon) {
                Ok(fill) => {
                    let bounds = polygon.bounds();
                    self.outline_bounds = Some(match self.outline_bounds {
                        Some(seen) => seen.union(&bounds),
                        None => bounds,
                    });
                    self.max_half_width = self.max_half_width.max(polygon.max_half_width());
                    repaired |= fill.repaired;
                    self.mesh.append(fill);
                }
                Err(e) => tracing::trace!("preview segment {} without fill: {}", k, e),
            }
        }
        self.meshed = samples.len();

        let appended = FillBuffer {
            vertices: self.mesh.vertices[base_vertex..].to_vec(),
            indices: self.mesh.indices[first_index..].to_vec(),
            repaired,
        };
        (appended, base_vertex as u32)
    }

    fn bounds(&self, packer: &GeometryPacker) -> Rect {
        self.outline_bounds
            .map(|bounds| packer.pad(bounds, self.max_half_width))
            .unwrap_or(Rect::ZERO)
    }
}

/// Drives stroke sessions from first sample to committed command
pub struct StrokeEngine<A: BufferAllocator = HostAllocator> {
    config: EngineConfig,
    sampler: Sampler,
    outline: OutlineBuilder,
    packer: GeometryPacker,
    buffers: BufferManager<A>,
    synthesizer: Synthesizer,
    bridge: SurfaceBridge,
    ids: StrokeIdGenerator,
    session: Option<Session>,
    generation: u64,
}

impl StrokeEngine<HostAllocator> {
    /// Host buffers and the CPU synthesizer
    pub fn new(config: EngineConfig) -> Self {
        Self::with_allocator(config, HostAllocator::new(), None)
    }
}

impl StrokeEngine<WgpuAllocator> {
    /// Device buffers and the wgpu synthesizer
    pub fn with_gpu(config: EngineConfig, context: GpuContext) -> Self {
        Self::with_allocator(config, WgpuAllocator::new(context.clone()), Some(context))
    }
}

impl<A: BufferAllocator> StrokeEngine<A> {
    pub fn with_allocator(config: EngineConfig, allocator: A, context: Option<GpuContext>) -> Self {
        Self {
            sampler: Sampler::new(config.sampler.clone()),
            outline: OutlineBuilder::new(config.outline.clone()),
            packer: GeometryPacker::new(config.pack.clone()),
            buffers: BufferManager::new(allocator, config.buffers.clone()),
            synthesizer: Synthesizer::with_context(config.synthesis.clone(), context),
            bridge: SurfaceBridge::new(config.aa_width),
            ids: StrokeIdGenerator::new(),
            session: None,
            generation: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &BufferManager<A> {
        &self.buffers
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Mutable synthesizer access, e.g. to install a pass guard
    pub fn synthesizer_mut(&mut self) -> &mut Synthesizer {
        &mut self.synthesizer
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Buffers currently owned by the engine
    pub fn live_buffers(&self) -> usize {
        self.buffers.live_buffers()
    }

    /// Samples accepted by the current session
    pub fn samples(&self) -> &[Sample] {
        self.sampler.samples()
    }

    /// Fill mesh of the active session, as built by its previews
    pub fn preview_mesh(&self) -> Option<&FillBuffer> {
        self.session.as_ref().map(|s| &s.preview.mesh)
    }

    /// Whether `preview` is the newest one of the active session
    pub fn is_current(&self, preview: &Preview) -> bool {
        self.session.is_some() && preview.generation == self.generation
    }

    /// Start a stroke with a snapshot of the brush settings
    pub fn begin(&mut self, settings: BrushSettings, first: Sample) -> Result<Preview> {
        if self.session.is_some() {
            return Err(StrokeError::SessionActive);
        }

        let settings = settings.sanitized();
        let mut streaming = self.config.streaming;
        if streaming {
            if let Err(e) = self.buffers.begin_stream() {
                tracing::warn!("sample streaming unavailable, batching instead: {}", e);
                streaming = false;
            }
        }
        self.session = Some(Session {
            settings,
            streaming,
            preview: PreviewMesh::default(),
        });

        self.sampler.start(first);
        self.stream_emitted(0);
        self.generation += 1;
        tracing::debug!(
            "stroke session started ({:?}, size {})",
            settings.mode,
            settings.size
        );
        Ok(self.preview())
    }

    /// Feed one pointer sample and extend the preview
    pub fn add_sample(&mut self, sample: Sample) -> Result<Preview> {
        if self.session.is_none() {
            return Err(StrokeError::NoSession);
        }
        let first_new = self.sampler.len();
        self.sampler.add_sample(sample);
        self.stream_emitted(first_new);
        self.generation += 1;
        Ok(self.preview())
    }

    /// Abandon the stroke, releasing its samples and buffers
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        self.sampler.reset();
        self.buffers.abort_stream();
        self.buffers.release_all();
        self.generation += 1;
        tracing::debug!("stroke session cancelled ({:?})", session.settings.mode);
        true
    }

    /// Render the stroke and commit it to `history` as one command
    pub fn finish(
        &mut self,
        history: &mut History<StrokeCommand>,
        layer: &mut (dyn Compositor + 'static),
    ) -> Result<Finalized> {
        let session = self.session.take().ok_or(StrokeError::NoSession)?;
        self.generation += 1;

        let emitted = self.sampler.finish();
        let (samples, streamed) = if session.streaming {
            self.consume_stream(emitted)
        } else {
            (emitted, false)
        };

        let Some(outline) = self.outline.build(&samples, session.settings.size) else {
            self.buffers.release_all();
            tracing::debug!("stroke finished without usable samples");
            return Err(StrokeError::Empty);
        };

        let blend = DrawableBlend::for_brush(&session.settings);
        let (edges, bounds) = self.packer.to_edges(&outline);

        let (drawable, path, degraded) = match self.packer.triangulate(&outline) {
            Ok(fill) => {
                tracing::trace!(
                    "outline triangulates into {} triangles (repaired: {})",
                    fill.triangle_count(),
                    fill.repaired
                );
                let synthesized = self.synthesize(&edges, bounds);
                self.buffers.release_all();
                match synthesized {
                    Ok(field) => (
                        self.bridge.to_drawable(field, bounds, blend),
                        RenderPath::DistanceField,
                        None,
                    ),
                    Err(cause) => {
                        tracing::warn!("stroke falls back to polygon rasterization: {}", cause);
                        let mask = fill_polygon(outline.points(), bounds);
                        (
                            self.bridge.from_mask(mask, blend),
                            RenderPath::Rasterized,
                            Some(cause),
                        )
                    }
                }
            }
            Err(e) => {
                self.buffers.release_all();
                tracing::warn!("stroke falls back to disk stamping: {}", e);
                let size = session.settings.size;
                let discs = samples
                    .iter()
                    .map(|s| (s.position(), self.outline.half_width(size, s.pressure)));
                let mask = stamp_disks(discs, bounds);
                (
                    self.bridge.from_mask(mask, blend),
                    RenderPath::Stamped,
                    Some(FallbackCause::Geometry(e)),
                )
            }
        };

        let stroke = self.ids.next();
        let record = StrokeRecord::new(stroke, &session.settings, samples, bounds);
        let mut command = commit(record, drawable);
        command.apply(layer);
        let drawable = command.attached();
        history.push(command);

        tracing::debug!(
            "stroke {:?} committed via {:?} ({} edges, {}x{})",
            stroke,
            path,
            edges.len(),
            bounds.width(),
            bounds.height()
        );

        Ok(Finalized {
            stroke,
            drawable,
            bounds,
            path,
            degraded,
            streamed,
        })
    }

    fn preview(&mut self) -> Preview {
        let Some(session) = self.session.as_mut() else {
            return Preview {
                generation: self.generation,
                ..Preview::default()
            };
        };
        let size = session.settings.size;
        let (appended, base_vertex) =
            session
                .preview
                .extend(self.sampler.samples(), size, &self.outline, &self.packer);

        Preview {
            generation: self.generation,
            appended,
            base_vertex,
            bounds: session.preview.bounds(&self.packer),
        }
    }

    /// Close the device stream and finalize from what it holds
    ///
    /// The host samples are used instead when the stream cannot be read
    /// back or disagrees with them in length.
    fn consume_stream(&mut self, emitted: Vec<Sample>) -> (Vec<Sample>, bool) {
        let read = self
            .buffers
            .finish_stream()
            .and_then(|closed| self.buffers.read_stream(&closed));
        match read {
            Ok(samples) if samples.len() == emitted.len() => {
                tracing::trace!("finalizing {} streamed samples", samples.len());
                (samples, true)
            }
            Ok(samples) => {
                tracing::warn!(
                    "sample stream holds {} of {} samples, finalizing from the host copy",
                    samples.len(),
                    emitted.len()
                );
                (emitted, false)
            }
            Err(e) => {
                tracing::warn!("reading the sample stream back failed: {}", e);
                (emitted, false)
            }
        }
    }

    /// Append samples emitted since `first_new` to the device stream
    fn stream_emitted(&mut self, first_new: usize) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.streaming {
            return;
        }
        let emitted = &self.sampler.samples()[first_new.min(self.sampler.len())..];
        for sample in emitted {
            if let Err(e) = self.buffers.stream_append(sample) {
                tracing::warn!("sample streaming stopped: {}", e);
                self.buffers.abort_stream();
                session.streaming = false;
                break;
            }
        }
    }

    /// Upload the edge list and synthesize its field
    ///
    /// The caller releases the uploaded buffer whatever the outcome.
    fn synthesize(
        &mut self,
        edges: &EdgeBuffer,
        bounds: Rect,
    ) -> std::result::Result<DistanceField, FallbackCause> {
        let edge_handle = self.buffers.upload(
            "Quill Edge Buffer",
            bytemuck::cast_slice(&edges.edges),
            BufferUsage::Storage,
        )?;

        let device_edges = self.buffers.get(edge_handle)?;
        let field = self
            .synthesizer
            .synthesize(&edges.edges, A::as_wgpu(device_edges.raw()), bounds)?;
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::RasterLayer;
    use quill_core::Color;

    #[test]
    fn test_second_begin_is_rejected() {
        let mut engine = StrokeEngine::new(EngineConfig::default());
        engine
            .begin(BrushSettings::default(), Sample::new(0.0, 0.0, 1.0, 0.0))
            .unwrap();
        let err = engine
            .begin(BrushSettings::default(), Sample::new(5.0, 5.0, 1.0, 1.0))
            .unwrap_err();
        assert_eq!(err, StrokeError::SessionActive);
        assert!(engine.is_active());
    }

    #[test]
    fn test_samples_require_a_session() {
        let mut engine = StrokeEngine::new(EngineConfig::default());
        let mut history = History::new();
        let mut layer = RasterLayer::new(4, 4);
        assert_eq!(
            engine.add_sample(Sample::new(1.0, 1.0, 1.0, 0.0)).unwrap_err(),
            StrokeError::NoSession
        );
        assert_eq!(
            engine.finish(&mut history, &mut layer).unwrap_err(),
            StrokeError::NoSession
        );
        assert!(!engine.cancel());
    }

    #[test]
    fn test_newer_preview_supersedes_older() {
        let mut engine = StrokeEngine::new(EngineConfig::default());
        let first = engine
            .begin(BrushSettings::pen(4.0, Color::BLACK), Sample::new(0.0, 0.0, 1.0, 0.0))
            .unwrap();
        assert!(engine.is_current(&first));
        assert!(first.appended.area() > 0.0);
        assert_eq!(first.base_vertex, 0);

        let second = engine.add_sample(Sample::new(10.0, 0.0, 1.0, 16.0)).unwrap();
        assert!(!engine.is_current(&first));
        assert!(engine.is_current(&second));
        assert!(second.generation > first.generation);
        assert!(!second.appended.is_empty());
        assert_eq!(second.base_vertex as usize, first.appended.vertices.len());
        assert!(second.bounds.width() > first.bounds.width());

        engine.cancel();
        assert!(!engine.is_current(&second));
    }

    #[test]
    fn test_unusable_samples_commit_nothing() {
        let mut engine = StrokeEngine::new(EngineConfig::default());
        let mut history = History::new();
        let mut layer = RasterLayer::new(4, 4);
        let preview = engine
            .begin(BrushSettings::default(), Sample::new(f32::NAN, 0.0, 1.0, 0.0))
            .unwrap();
        assert!(preview.appended.is_empty());
        assert_eq!(preview.bounds, Rect::ZERO);

        assert_eq!(
            engine.finish(&mut history, &mut layer).unwrap_err(),
            StrokeError::Empty
        );
        assert!(history.is_empty());
        assert!(layer.is_empty());
        assert!(!engine.is_active());
    }

    #[test]
    fn test_preview_work_stays_flat_on_long_strokes() {
        let mut engine = StrokeEngine::new(EngineConfig::default());
        engine
            .begin(BrushSettings::pen(6.0, Color::BLACK), Sample::new(100.0, 0.0, 1.0, 0.0))
            .unwrap();

        let mut appended = Vec::new();
        for i in 1..=1500 {
            let a = i as f32 * 0.015;
            let sample = Sample::new(100.0 * a.cos(), 100.0 * a.sin(), 1.0, i as f64 * 8.0);
            let meshed_before = engine.preview_mesh().unwrap().vertices.len();
            let preview = engine.add_sample(sample).unwrap();

            assert_eq!(preview.base_vertex as usize, meshed_before);
            let mesh = engine.preview_mesh().unwrap();
            assert_eq!(mesh.vertices.len(), meshed_before + preview.appended.vertices.len());
            assert!(preview
                .appended
                .indices
                .iter()
                .all(|&v| (meshed_before..mesh.vertices.len()).contains(&(v as usize))));
            appended.push(preview.appended.vertices.len());
        }

        // One capsule per emitted sample, whatever the stroke length.
        let early = appended[..100].iter().max().copied().unwrap();
        let late = appended[appended.len() - 100..].iter().max().copied().unwrap();
        assert!(early <= 64 && late <= 64, "early {early}, late {late}");
        assert!(engine.samples().len() >= 1500);
    }
}
