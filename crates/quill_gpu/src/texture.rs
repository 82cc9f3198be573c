//! Distance-field storage
//!
//! Texels of a finished field are `[signed distance, offset x, offset y,
//! edge id]`: distance in canvas pixels (negative inside), the offset from
//! the texel centre to the nearest boundary point, and the index of the
//! nearest edge (`-1` when none was found).

use std::sync::{mpsc, OnceLock};

use quill_core::{Point, Rect};

use crate::context::GpuContext;
use crate::synth::SynthesisError;

/// Distance written where no edge was found
pub const NO_EDGE_DISTANCE: f32 = 1.0e9;

/// Bytes per RGBA32F texel
pub const TEXEL_SIZE_BYTES: u32 = 16;

/// Two named slots, one of which is current
#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    current: usize,
}

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            current: 0,
        }
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    pub fn next(&self) -> &T {
        &self.slots[1 - self.current]
    }

    /// Read the current slot while writing the next one
    pub fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.slots;
        if self.current == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Make the next slot current
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Index of the current slot, for logging
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn into_current(self) -> T {
        let [a, b] = self.slots;
        if self.current == 0 {
            a
        } else {
            b
        }
    }
}

/// Texture placement: canvas bounds, texel grid and texel size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldExtent {
    pub bounds: Rect,
    pub width: u32,
    pub height: u32,
    /// Texel edge length in canvas pixels
    pub texel_size: f32,
}

impl FieldExtent {
    pub fn new(bounds: Rect, resolution_scale: f32) -> Self {
        let scale = resolution_scale.max(f32::EPSILON);
        Self {
            bounds,
            width: (bounds.width() * scale).ceil().max(1.0) as u32,
            height: (bounds.height() * scale).ceil().max(1.0) as u32,
            texel_size: 1.0 / scale,
        }
    }

    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Canvas-space centre of texel `(x, y)`
    pub fn texel_center(&self, x: u32, y: u32) -> Point {
        self.bounds.origin
            + Point::new(x as f32 + 0.5, y as f32 + 0.5) * self.texel_size
    }
}

/// A distance field in host memory
#[derive(Clone, Debug, PartialEq)]
pub struct HostField {
    extent: FieldExtent,
    texels: Vec<[f32; 4]>,
}

impl HostField {
    pub fn new(extent: FieldExtent, texels: Vec<[f32; 4]>) -> Self {
        debug_assert_eq!(texels.len(), extent.texel_count());
        Self { extent, texels }
    }

    pub fn extent(&self) -> &FieldExtent {
        &self.extent
    }

    pub fn bounds(&self) -> Rect {
        self.extent.bounds
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.extent.width + x) as usize]
    }

    pub fn distance(&self, x: u32, y: u32) -> f32 {
        self.texel(x, y)[0]
    }

    pub fn edge_id(&self, x: u32, y: u32) -> i32 {
        self.texel(x, y)[3] as i32
    }

    /// Canvas point nearest to texel `(x, y)` on the outline
    pub fn nearest_point(&self, x: u32, y: u32) -> Point {
        let t = self.texel(x, y);
        self.extent.texel_center(x, y) + Point::new(t[1], t[2])
    }

    /// Bilinearly interpolated signed distance at a canvas point
    ///
    /// Points outside the field are treated as far outside the stroke.
    pub fn sample(&self, p: Point) -> f32 {
        let bounds = self.extent.bounds;
        if !bounds.contains(p) {
            return NO_EDGE_DISTANCE;
        }
        let local = (p - bounds.origin) * (1.0 / self.extent.texel_size);
        let fx = (local.x - 0.5).clamp(0.0, (self.extent.width - 1) as f32);
        let fy = (local.y - 0.5).clamp(0.0, (self.extent.height - 1) as f32);
        let (x0, y0) = (fx.floor() as u32, fy.floor() as u32);
        let x1 = (x0 + 1).min(self.extent.width - 1);
        let y1 = (y0 + 1).min(self.extent.height - 1);
        let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

        let top = self.distance(x0, y0) * (1.0 - tx) + self.distance(x1, y0) * tx;
        let bottom = self.distance(x0, y1) * (1.0 - tx) + self.distance(x1, y1) * tx;
        top * (1.0 - ty) + bottom * ty
    }
}

/// A distance field resident on the device
#[derive(Debug)]
pub struct DeviceField {
    context: GpuContext,
    texture: wgpu::Texture,
    extent: FieldExtent,
    host: OnceLock<HostField>,
}

impl DeviceField {
    pub(crate) fn new(context: GpuContext, texture: wgpu::Texture, extent: FieldExtent) -> Self {
        Self {
            context,
            texture,
            extent,
            host: OnceLock::new(),
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn extent(&self) -> &FieldExtent {
        &self.extent
    }

    pub fn bounds(&self) -> Rect {
        self.extent.bounds
    }

    /// Copy the texture back to host memory
    ///
    /// Blocks until the copy has completed.
    pub fn read_back(&self) -> Result<HostField, SynthesisError> {
        let device = self.context.device();
        let (width, height) = (self.extent.width, self.extent.height);
        let unpadded = width * TEXEL_SIZE_BYTES;
        let padded = unpadded.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quill Field Readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Quill Field Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.wait_idle();
        rx.recv()
            .map_err(|e| SynthesisError::Readback(e.to_string()))?
            .map_err(|e| SynthesisError::Readback(e.to_string()))?;

        let mut texels = Vec::with_capacity(self.extent.texel_count());
        {
            let data = slice.get_mapped_range();
            for row in data.chunks_exact(padded as usize) {
                for texel in row[..unpadded as usize].chunks_exact(TEXEL_SIZE_BYTES as usize) {
                    texels.push(bytemuck::pod_read_unaligned::<[f32; 4]>(texel));
                }
            }
        }
        staging.unmap();

        Ok(HostField::new(self.extent, texels))
    }

    /// Host copy, read back once and cached
    pub fn host(&self) -> Result<&HostField, SynthesisError> {
        if let Some(host) = self.host.get() {
            return Ok(host);
        }
        let host = self.read_back()?;
        Ok(self.host.get_or_init(|| host))
    }
}

/// A synthesized field, on whichever side the backend produced it
#[derive(Debug)]
pub enum DistanceField {
    Host(HostField),
    Device(DeviceField),
}

impl DistanceField {
    pub fn extent(&self) -> &FieldExtent {
        match self {
            DistanceField::Host(field) => field.extent(),
            DistanceField::Device(field) => field.extent(),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.extent().bounds
    }

    /// Host view of the field, reading device fields back on first use
    pub fn host(&self) -> Result<&HostField, SynthesisError> {
        match self {
            DistanceField::Host(field) => Ok(field),
            DistanceField::Device(field) => field.host(),
        }
    }
}
