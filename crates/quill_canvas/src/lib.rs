//! Quill Canvas
//!
//! Stroke sessions on top of the paint and GPU stages:
//!
//! - [`StrokeEngine`] runs one pointer stroke from first sample to commit
//! - [`StrokeCommand`] is the undoable unit pushed for every finished stroke
//! - [`RasterLayer`] is a host compositor that flattens committed strokes
//!
//! # Example
//!
//! ```rust
//! use quill_canvas::{EngineConfig, RasterLayer, StrokeEngine};
//! use quill_core::{BrushSettings, Color, History, Sample};
//!
//! let mut engine = StrokeEngine::new(EngineConfig::default());
//! let mut layer = RasterLayer::new(32, 32);
//! let mut history = History::new();
//!
//! engine.begin(BrushSettings::pen(4.0, Color::BLACK), Sample::new(4.0, 16.0, 1.0, 0.0))?;
//! engine.add_sample(Sample::new(28.0, 16.0, 1.0, 16.0))?;
//! let done = engine.finish(&mut history, &mut layer)?;
//!
//! assert!(done.degraded.is_none());
//! assert!(history.undo(&mut layer));
//! # Ok::<(), quill_canvas::StrokeError>(())
//! ```

pub mod commit;
pub mod compositor;
pub mod engine;

pub use commit::{commit, StrokeCommand, StrokeRecord};
pub use compositor::{Compositor, DrawableId, LayerEntry, Pixel, RasterLayer};
pub use engine::{
    EngineConfig, FallbackCause, Finalized, Preview, RenderPath, StrokeEngine, StrokeError,
};
