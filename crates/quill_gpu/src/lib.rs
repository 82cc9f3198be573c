//! Quill GPU
//!
//! Device-side half of the stroke pipeline: buffer management, signed
//! distance field synthesis (CPU reference and wgpu compute backends) and
//! the bridge that turns a field into a compositor drawable.

pub mod bridge;
pub mod buffers;
pub mod context;
pub mod shaders;
pub mod synth;
pub mod texture;

pub use bridge::{coverage, Drawable, DrawableBlend, DrawablePayload, SurfaceBridge};
pub use buffers::{
    BufferAllocator, BufferConfig, BufferError, BufferHandle, BufferManager, BufferUsage,
    HostAllocator, StreamedSamples, WgpuAllocator,
};
pub use context::{GpuContext, GpuContextError};
pub use synth::{
    JumpFloodPlan, PassGuard, SynthesisBackend, SynthesisConfig, SynthesisError, SynthesisState, Synthesizer,
};
pub use texture::{DeviceField, DistanceField, FieldExtent, HostField};
