//! Quill Core
//!
//! Shared vocabulary for the stroke rendering pipeline:
//!
//! - **Geometry**: points, rectangles, winding and area helpers
//! - **Input**: pointer samples and brush settings snapshots
//! - **History**: the command contract committed strokes satisfy
//!
//! # Example
//!
//! ```rust
//! use quill_core::history::{Command, History};
//!
//! struct Push(u32);
//!
//! impl Command for Push {
//!     type Target = Vec<u32>;
//!     fn apply(&mut self, target: &mut Vec<u32>) { target.push(self.0); }
//!     fn rollback(&mut self, target: &mut Vec<u32>) { target.pop(); }
//! }
//!
//! let mut doc = Vec::new();
//! let mut history = History::new();
//! history.execute(Push(7), &mut doc);
//! assert!(history.undo(&mut doc));
//! assert!(doc.is_empty());
//! ```

pub mod brush;
pub mod color;
pub mod geometry;
pub mod history;
pub mod sample;
pub mod stroke;

pub use brush::{BrushSettings, PressureCurve, StrokeMode};
pub use color::Color;
pub use geometry::{Point, Rect, Size};
pub use history::{Command, History};
pub use sample::Sample;
pub use stroke::{StrokeId, StrokeIdGenerator};
