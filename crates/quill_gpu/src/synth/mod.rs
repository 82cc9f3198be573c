//! Distance-field synthesis
//!
//! Each stroke runs through a fixed state machine:
//!
//! ```text
//! Idle → SeedInit → Propagating(step)… → Encoding → Done
//!           └──────────────┴───────────────┴──────→ Failed
//! ```
//!
//! **SeedInit** marks every texel within the seed radius of an edge with
//! that edge and its nearest point. **Propagating** runs Jump Flooding with
//! strictly decreasing power-of-two steps ending at 1, ping-ponging between
//! two textures. **Encoding** recomputes the exact distance to the winning
//! edge and signs it with the non-zero winding rule.
//!
//! The passes themselves are supplied by a backend implementing
//! [`FieldPasses`]; the driver owns the sequencing.

mod cpu;
mod gpu;

pub use cpu::CpuPasses;
pub use gpu::{FieldPipelines, WgpuPasses};

use quill_core::Rect;
use quill_paint::Edge;
use thiserror::Error;

use crate::context::{env_f32, env_u32, GpuContext};
use crate::texture::{DistanceField, FieldExtent};

/// Synthesis failures; any of them aborts the run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("field of {width}x{height} texels exceeds the {max} texel limit")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("no edges to synthesize from")]
    NoEdges,

    #[error("{pass} pass failed: {message}")]
    Pass { pass: &'static str, message: String },

    #[error("readback failed: {0}")]
    Readback(String),
}

pub type Result<T> = std::result::Result<T, SynthesisError>;

/// Progress of one synthesis run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    SeedInit,
    Propagating { step: u32 },
    Encoding,
    Done,
    Failed,
}

/// Synthesizer configuration
#[derive(Clone, Debug)]
pub struct SynthesisConfig {
    /// Texels per canvas pixel
    pub resolution_scale: f32,
    /// Seed marking radius, in canvas pixels
    pub seed_radius: f32,
    /// Largest texture edge, in texels
    pub max_texture_dim: u32,
    /// A propagated candidate must be closer by more than this to win
    pub tie_epsilon: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            seed_radius: 1.0,
            max_texture_dim: 4096,
            tie_epsilon: 1e-4,
        }
    }
}

impl SynthesisConfig {
    /// Apply `QUILL_SDF_MAX_TEXTURE_DIM` and `QUILL_SDF_RESOLUTION_SCALE`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_u32("QUILL_SDF_MAX_TEXTURE_DIM") {
            self.max_texture_dim = v.max(1);
        }
        if let Some(v) = env_f32("QUILL_SDF_RESOLUTION_SCALE") {
            self.resolution_scale = v.clamp(0.125, 8.0);
        }
        tracing::info!(
            "synthesis config: resolution_scale={}, max_texture_dim={}, seed_radius={}",
            self.resolution_scale,
            self.max_texture_dim,
            self.seed_radius
        );
        self
    }
}

/// Jump Flooding step sequence for a texture
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JumpFloodPlan {
    steps: Vec<u32>,
}

impl JumpFloodPlan {
    /// `max(1, ceil(log2(max(w, h))))` passes: `2^(n-1), …, 2, 1`
    pub fn for_extent(width: u32, height: u32) -> Self {
        let longest = width.max(height).max(1);
        let passes = longest.next_power_of_two().trailing_zeros().max(1);
        Self {
            steps: (0..passes).rev().map(|k| 1 << k).collect(),
        }
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Everything a pass needs to know about the current run
#[derive(Clone, Copy, Debug)]
pub struct FieldJob<'a> {
    pub edges: &'a [Edge],
    pub extent: FieldExtent,
    pub seed_radius: f32,
    pub tie_epsilon: f32,
}

/// One backend's implementation of the three passes
pub trait FieldPasses {
    fn seed(&mut self, job: &FieldJob) -> Result<()>;

    fn propagate(&mut self, job: &FieldJob, step: u32) -> Result<()>;

    fn encode(&mut self, job: &FieldJob) -> Result<DistanceField>;
}

/// Which backend runs the passes
#[derive(Debug)]
pub enum SynthesisBackend {
    Cpu,
    Wgpu(GpuContext),
}

/// Called with every state a run enters, before its pass; an error aborts
/// the run with that error
pub type PassGuard = Box<dyn FnMut(SynthesisState) -> Result<()> + Send>;

/// Drives seed, propagation and encoding for one stroke at a time
pub struct Synthesizer {
    config: SynthesisConfig,
    backend: SynthesisBackend,
    /// Compiled on first device run
    pipelines: Option<FieldPipelines>,
    state: SynthesisState,
    transitions: Vec<SynthesisState>,
    guard: Option<PassGuard>,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("state", &self.state)
            .field("guarded", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig, backend: SynthesisBackend) -> Self {
        Self {
            config,
            backend,
            pipelines: None,
            state: SynthesisState::Idle,
            transitions: Vec::new(),
            guard: None,
        }
    }

    /// Install a guard consulted before every pass, replacing any previous one
    pub fn set_pass_guard(&mut self, guard: impl FnMut(SynthesisState) -> Result<()> + Send + 'static) {
        self.guard = Some(Box::new(guard));
    }

    pub fn clear_pass_guard(&mut self) {
        self.guard = None;
    }

    /// CPU reference synthesizer
    pub fn cpu(config: SynthesisConfig) -> Self {
        Self::new(config, SynthesisBackend::Cpu)
    }

    /// Pick the device backend when a context is available
    pub fn with_context(config: SynthesisConfig, context: Option<GpuContext>) -> Self {
        match context {
            Some(context) => Self::new(config, SynthesisBackend::Wgpu(context)),
            None => Self::cpu(config),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn backend(&self) -> &SynthesisBackend {
        &self.backend
    }

    pub fn state(&self) -> SynthesisState {
        self.state
    }

    /// States visited by the most recent run, in order
    pub fn transitions(&self) -> &[SynthesisState] {
        &self.transitions
    }

    /// Texture extent for `bounds`, checked against the size limit
    pub fn extent(&self, bounds: Rect) -> Result<FieldExtent> {
        let extent = FieldExtent::new(bounds, self.config.resolution_scale);
        let max = match &self.backend {
            SynthesisBackend::Cpu => self.config.max_texture_dim,
            SynthesisBackend::Wgpu(context) => self
                .config
                .max_texture_dim
                .min(context.limits().max_texture_dimension_2d),
        };
        if extent.width > max || extent.height > max {
            return Err(SynthesisError::TextureTooLarge {
                width: extent.width,
                height: extent.height,
                max,
            });
        }
        Ok(extent)
    }

    /// Synthesize the field of one outline
    ///
    /// `device_edges` is the uploaded copy of `edges`, when the caller
    /// already has one on the device.
    pub fn synthesize(
        &mut self,
        edges: &[Edge],
        device_edges: Option<&wgpu::Buffer>,
        bounds: Rect,
    ) -> Result<DistanceField> {
        self.state = SynthesisState::Idle;
        self.transitions.clear();
        self.transitions.push(SynthesisState::Idle);

        let result = self.run(edges, device_edges, bounds);
        match &result {
            Ok(field) => {
                self.enter(SynthesisState::Done);
                let extent = field.extent();
                tracing::debug!(
                    "synthesized {}x{} field from {} edges",
                    extent.width,
                    extent.height,
                    edges.len()
                );
            }
            Err(e) => {
                self.enter(SynthesisState::Failed);
                tracing::warn!("distance field synthesis failed: {}", e);
            }
        }
        result
    }

    fn run(
        &mut self,
        edges: &[Edge],
        device_edges: Option<&wgpu::Buffer>,
        bounds: Rect,
    ) -> Result<DistanceField> {
        if edges.is_empty() {
            return Err(SynthesisError::NoEdges);
        }
        let extent = self.extent(bounds)?;
        let job = FieldJob {
            edges,
            extent,
            seed_radius: self.config.seed_radius.max(extent.texel_size),
            tie_epsilon: self.config.tie_epsilon,
        };
        let plan = JumpFloodPlan::for_extent(extent.width, extent.height);

        let (state, transitions, guard) = (&mut self.state, &mut self.transitions, &mut self.guard);
        let enter = |s| {
            push_state(state, transitions, s);
            match guard.as_mut() {
                Some(guard) => guard(s),
                None => Ok(()),
            }
        };

        match &self.backend {
            SynthesisBackend::Cpu => {
                let mut passes = CpuPasses::new(extent);
                drive(&mut passes, &job, &plan, enter)
            }
            SynthesisBackend::Wgpu(context) => {
                let pipelines = match self.pipelines.take() {
                    Some(pipelines) => pipelines,
                    None => FieldPipelines::new(context)?,
                };
                let pipelines = self.pipelines.insert(pipelines);
                let mut passes = WgpuPasses::new(context.clone(), pipelines, &job, device_edges)?;
                drive(&mut passes, &job, &plan, enter)
            }
        }
    }

    fn enter(&mut self, state: SynthesisState) {
        push_state(&mut self.state, &mut self.transitions, state);
    }
}

fn push_state(current: &mut SynthesisState, log: &mut Vec<SynthesisState>, state: SynthesisState) {
    tracing::trace!("synthesis: {:?} -> {:?}", current, state);
    *current = state;
    log.push(state);
}

/// Run the passes of `plan` in dependency order
pub fn drive<P: FieldPasses>(
    passes: &mut P,
    job: &FieldJob,
    plan: &JumpFloodPlan,
    mut enter: impl FnMut(SynthesisState) -> Result<()>,
) -> Result<DistanceField> {
    enter(SynthesisState::SeedInit)?;
    passes.seed(job)?;

    for &step in plan.steps() {
        enter(SynthesisState::Propagating { step })?;
        passes.propagate(job, step)?;
    }

    enter(SynthesisState::Encoding)?;
    passes.encode(job)
}
