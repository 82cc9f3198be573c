//! Stroke commit
//!
//! A finished stroke becomes one [`StrokeCommand`]: applying it appends the
//! drawable and its [`StrokeRecord`] to a compositor in a single attach,
//! rolling it back detaches both and keeps them for a later redo.

use quill_core::{BrushSettings, Color, Command, Rect, Sample, StrokeId, StrokeMode};
use quill_gpu::Drawable;
use serde::{Deserialize, Serialize};

use crate::compositor::{Compositor, DrawableId, LayerEntry};

/// Serializable description of a committed stroke
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokeRecord {
    pub id: StrokeId,
    pub samples: Vec<Sample>,
    pub mode: StrokeMode,
    pub color: Color,
    pub opacity: f32,
    /// Brush diameter at full pressure
    pub size: f32,
    pub bounds: Rect,
    /// Set while the stroke is attached to a compositor
    pub drawable: Option<DrawableId>,
}

impl StrokeRecord {
    pub fn new(id: StrokeId, settings: &BrushSettings, samples: Vec<Sample>, bounds: Rect) -> Self {
        Self {
            id,
            samples,
            mode: settings.mode,
            color: settings.color,
            opacity: settings.opacity,
            size: settings.size,
            bounds,
            drawable: None,
        }
    }

    /// Brush snapshot the stroke was drawn with
    pub fn settings(&self) -> BrushSettings {
        BrushSettings {
            size: self.size,
            color: self.color,
            opacity: self.opacity,
            mode: self.mode,
        }
    }
}

/// Undoable unit for one stroke
#[derive(Debug)]
pub struct StrokeCommand {
    stroke: StrokeId,
    /// Held while detached
    entry: Option<LayerEntry>,
    attached: Option<DrawableId>,
}

impl StrokeCommand {
    pub fn stroke(&self) -> StrokeId {
        self.stroke
    }

    /// Compositor id while applied
    pub fn attached(&self) -> Option<DrawableId> {
        self.attached
    }

    pub fn is_applied(&self) -> bool {
        self.attached.is_some()
    }

    /// The stroke's record while the command holds it
    pub fn record(&self) -> Option<&StrokeRecord> {
        self.entry.as_ref().map(|e| &e.record)
    }
}

impl Command for StrokeCommand {
    type Target = dyn Compositor;

    fn apply(&mut self, target: &mut Self::Target) {
        match self.entry.take() {
            Some(entry) => self.attached = Some(target.attach(entry)),
            None => tracing::warn!("stroke {:?} is already applied", self.stroke),
        }
    }

    fn rollback(&mut self, target: &mut Self::Target) {
        let Some(id) = self.attached.take() else {
            tracing::warn!("stroke {:?} is not applied", self.stroke);
            return;
        };
        match target.detach(id) {
            Some(entry) => self.entry = Some(entry),
            None => tracing::warn!("stroke {:?} lost its drawable {:?}", self.stroke, id),
        }
    }

    fn label(&self) -> &str {
        "stroke"
    }
}

/// Package a finished stroke as an unapplied command
pub fn commit(record: StrokeRecord, drawable: Drawable) -> StrokeCommand {
    StrokeCommand {
        stroke: record.id,
        entry: Some(LayerEntry { drawable, record }),
        attached: None,
    }
}
