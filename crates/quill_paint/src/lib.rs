//! Quill Paint
//!
//! CPU-side stroke geometry. Raw pointer samples go in, GPU-ready buffers
//! come out:
//!
//! - **Sampler**: gap-bounded resampling with pressure repair
//! - **Outline**: closed variable-width silhouettes with round caps
//! - **Pack**: fill triangulation and edge lists with outward normals
//! - **Raster**: hard-edged coverage masks for the fallback path

pub mod error;
pub mod outline;
pub mod pack;
pub mod raster;
pub mod sampler;

pub use error::{GeometryError, Result};
pub use outline::{OutlineBuilder, OutlineConfig, OutlinePolygon};
pub use pack::{Edge, EdgeBuffer, FillBuffer, FillVertex, GeometryPacker, PackConfig};
pub use raster::{fill_polygon, stamp_disks, CoverageMask};
pub use sampler::{Interpolation, Sampler, SamplerConfig, Smoothing};
