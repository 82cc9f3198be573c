//! Geometry error types

use thiserror::Error;

/// Failures while packing an outline into GPU geometry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Outline has too few points to enclose an area
    #[error("outline has {0} points, at least 3 are required")]
    Degenerate(usize),

    /// Neither ear clipping nor the repair tessellator produced a mesh
    #[error("tessellation failed: {0}")]
    Tessellation(String),
}

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, GeometryError>;
