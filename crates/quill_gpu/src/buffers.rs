//! Device buffer management
//!
//! Geometry is uploaded through a [`BufferManager`] that hands out
//! generational handles. Allocations are reference counted: a submission
//! that cloned an allocation keeps it alive after the manager releases the
//! handle, and the allocation is freed when the last holder drops it.
//!
//! Two upload shapes are supported:
//!
//! - **Batch**: one [`BufferManager::upload`] per finalized stroke
//! - **Streaming**: per-sample [`BufferManager::stream_append`] into a fixed
//!   staging region, flushed into a device stream buffer that grows by
//!   doubling

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use quill_core::Sample;
use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::context::{env_usize, GpuContext};

new_key_type! {
    /// Handle to a managed device buffer
    pub struct BufferHandle;
}

/// Buffer allocation and transfer failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("out of device memory allocating {requested} bytes for {label}")]
    OutOfMemory { label: String, requested: u64 },

    #[error("buffer handle is not live")]
    InvalidHandle,

    #[error("write of {len} bytes at offset {offset} overflows a {size} byte buffer")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    #[error("no stream is open")]
    NoStream,

    #[error("device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, BufferError>;

/// What a buffer will be bound as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Read-only storage (edge lists)
    Storage,
    /// Growable sample stream
    Stream,
}

impl BufferUsage {
    pub fn to_wgpu(self) -> wgpu::BufferUsages {
        let transfer = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        match self {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX | transfer,
            BufferUsage::Index => wgpu::BufferUsages::INDEX | transfer,
            BufferUsage::Storage | BufferUsage::Stream => wgpu::BufferUsages::STORAGE | transfer,
        }
    }
}

/// One pointer sample as streamed to the device
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSample {
    pub position: [f32; 2],
    pub pressure: f32,
    /// Seconds since stroke start
    pub time: f32,
}

impl GpuSample {
    pub fn new(sample: &Sample, t0: f64) -> Self {
        Self {
            position: [sample.x, sample.y],
            pressure: sample.pressure,
            time: (sample.t - t0) as f32,
        }
    }

    /// Host sample, with the time made absolute again
    pub fn to_sample(&self, t0: f64) -> Sample {
        Sample::new(
            self.position[0],
            self.position[1],
            self.pressure,
            t0 + self.time as f64,
        )
    }
}

const SAMPLE_SIZE: u64 = std::mem::size_of::<GpuSample>() as u64;

// ─────────────────────────────────────────────────────────────────────────────
// Allocations
// ─────────────────────────────────────────────────────────────────────────────

/// Decrements the owning allocator's live count when dropped
#[derive(Debug)]
struct LiveToken {
    count: Arc<AtomicUsize>,
    bytes: Arc<AtomicU64>,
    size: u64,
}

impl LiveToken {
    fn new(count: &Arc<AtomicUsize>, bytes: &Arc<AtomicU64>, size: u64) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(size, Ordering::Relaxed);
        Self {
            count: count.clone(),
            bytes: bytes.clone(),
            size,
        }
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
        self.bytes.fetch_sub(self.size, Ordering::Relaxed);
    }
}

/// A backend buffer plus its bookkeeping
#[derive(Debug)]
pub struct Allocation<B> {
    raw: B,
    size: u64,
    usage: BufferUsage,
    _live: LiveToken,
}

impl<B> Allocation<B> {
    pub fn raw(&self) -> &B {
        &self.raw
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

/// Backend that owns the actual memory
pub trait BufferAllocator {
    type Buffer;

    fn allocate(&mut self, label: &str, size: u64, usage: BufferUsage)
        -> Result<Arc<Allocation<Self::Buffer>>>;

    fn write(&mut self, buffer: &Allocation<Self::Buffer>, offset: u64, data: &[u8]) -> Result<()>;

    /// Blocking copy of `len` bytes starting at `offset`
    fn read(&mut self, buffer: &Allocation<Self::Buffer>, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Copy the first `size` bytes of `src` to the start of `dst`
    fn copy(
        &mut self,
        src: &Allocation<Self::Buffer>,
        dst: &Allocation<Self::Buffer>,
        size: u64,
    ) -> Result<()>;

    /// Allocations not yet freed, including ones held only by submissions
    fn live_allocations(&self) -> usize;

    /// The wgpu buffer behind an allocation, for device-side consumers
    fn as_wgpu(_buffer: &Self::Buffer) -> Option<&wgpu::Buffer> {
        None
    }
}

/// Host memory buffer
#[derive(Debug, Default)]
pub struct HostBuffer {
    bytes: Mutex<Vec<u8>>,
}

impl HostBuffer {
    /// Copy of the current contents
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

/// CPU memory allocator with an optional byte budget
///
/// Exceeding the budget fails the same way a device allocation would.
#[derive(Debug, Default)]
pub struct HostAllocator {
    budget: Option<u64>,
    live: Arc<AtomicUsize>,
    bytes: Arc<AtomicU64>,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget: u64) -> Self {
        Self {
            budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl BufferAllocator for HostAllocator {
    type Buffer = HostBuffer;

    fn allocate(
        &mut self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> Result<Arc<Allocation<HostBuffer>>> {
        if let Some(budget) = self.budget {
            if self.bytes_in_use().saturating_add(size) > budget {
                return Err(BufferError::OutOfMemory {
                    label: label.to_string(),
                    requested: size,
                });
            }
        }
        Ok(Arc::new(Allocation {
            raw: HostBuffer {
                bytes: Mutex::new(vec![0; size as usize]),
            },
            size,
            usage,
            _live: LiveToken::new(&self.live, &self.bytes, size),
        }))
    }

    fn write(&mut self, buffer: &Allocation<HostBuffer>, offset: u64, data: &[u8]) -> Result<()> {
        check_range(buffer.size, offset, data.len() as u64)?;
        let mut bytes = buffer
            .raw
            .bytes
            .lock()
            .map_err(|e| BufferError::Device(e.to_string()))?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buffer: &Allocation<HostBuffer>, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_range(buffer.size, offset, len)?;
        let bytes = buffer
            .raw
            .bytes
            .lock()
            .map_err(|e| BufferError::Device(e.to_string()))?;
        let start = offset as usize;
        Ok(bytes[start..start + len as usize].to_vec())
    }

    fn copy(
        &mut self,
        src: &Allocation<HostBuffer>,
        dst: &Allocation<HostBuffer>,
        size: u64,
    ) -> Result<()> {
        check_range(src.size, 0, size)?;
        let data = {
            let bytes = src
                .raw
                .bytes
                .lock()
                .map_err(|e| BufferError::Device(e.to_string()))?;
            bytes[..size as usize].to_vec()
        };
        self.write(dst, 0, &data)
    }

    fn live_allocations(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

/// wgpu device allocator
///
/// Allocation failures are captured synchronously through an error scope.
#[derive(Debug)]
pub struct WgpuAllocator {
    context: GpuContext,
    live: Arc<AtomicUsize>,
    bytes: Arc<AtomicU64>,
}

impl WgpuAllocator {
    pub fn new(context: GpuContext) -> Self {
        Self {
            context,
            live: Arc::default(),
            bytes: Arc::default(),
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

impl BufferAllocator for WgpuAllocator {
    type Buffer = wgpu::Buffer;

    fn allocate(
        &mut self,
        label: &str,
        size: u64,
        usage: BufferUsage,
    ) -> Result<Arc<Allocation<wgpu::Buffer>>> {
        let device = self.context.device();
        // Buffer sizes must be a multiple of COPY_BUFFER_ALIGNMENT.
        let padded = size.max(1).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        if padded > self.context.limits().max_buffer_size {
            return Err(BufferError::OutOfMemory {
                label: label.to_string(),
                requested: size,
            });
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded,
            usage: usage.to_wgpu(),
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());

        if oom.is_some() {
            return Err(BufferError::OutOfMemory {
                label: label.to_string(),
                requested: size,
            });
        }
        if let Some(error) = validation {
            return Err(BufferError::Device(error.to_string()));
        }

        Ok(Arc::new(Allocation {
            raw: buffer,
            size,
            usage,
            _live: LiveToken::new(&self.live, &self.bytes, padded),
        }))
    }

    fn write(&mut self, buffer: &Allocation<wgpu::Buffer>, offset: u64, data: &[u8]) -> Result<()> {
        check_range(buffer.size, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }
        // queue.write_buffer needs 4-byte aligned lengths.
        let aligned = (data.len() as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if aligned == data.len() as u64 {
            self.context.queue().write_buffer(&buffer.raw, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(aligned as usize, 0);
            self.context.queue().write_buffer(&buffer.raw, offset, &padded);
        }
        Ok(())
    }

    fn read(&mut self, buffer: &Allocation<wgpu::Buffer>, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_range(buffer.size, offset, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        // Copies start and end on COPY_BUFFER_ALIGNMENT boundaries.
        let start = offset - offset % wgpu::COPY_BUFFER_ALIGNMENT;
        let skip = (offset - start) as usize;
        let size = (skip as u64 + len).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let device = self.context.device();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quill Buffer Readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Quill Buffer Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&buffer.raw, start, &staging, 0, size);
        self.context.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.wait_idle();
        rx.recv()
            .map_err(|e| BufferError::Device(e.to_string()))?
            .map_err(|e| BufferError::Device(e.to_string()))?;

        let bytes = slice.get_mapped_range()[skip..skip + len as usize].to_vec();
        staging.unmap();
        Ok(bytes)
    }

    fn copy(
        &mut self,
        src: &Allocation<wgpu::Buffer>,
        dst: &Allocation<wgpu::Buffer>,
        size: u64,
    ) -> Result<()> {
        check_range(src.size, 0, size)?;
        let size = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Quill Stream Grow Encoder"),
                });
        encoder.copy_buffer_to_buffer(&src.raw, 0, &dst.raw, 0, size);
        self.context.queue().submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn live_allocations(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn as_wgpu(buffer: &wgpu::Buffer) -> Option<&wgpu::Buffer> {
        Some(buffer)
    }
}

fn check_range(size: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BufferError::OutOfBounds { offset, len, size }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Buffer manager configuration
#[derive(Clone, Debug)]
pub struct BufferConfig {
    /// Samples held in the host staging region before an automatic flush
    pub staging_capacity: usize,
    /// Initial device stream capacity, in samples
    pub initial_stream_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            staging_capacity: 64,
            initial_stream_capacity: 256,
        }
    }
}

impl BufferConfig {
    /// Apply `QUILL_STREAM_STAGING_SAMPLES`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_usize("QUILL_STREAM_STAGING_SAMPLES") {
            self.staging_capacity = v.max(1);
            tracing::info!("buffer config override: staging_capacity={}", self.staging_capacity);
        }
        self
    }
}

/// A closed sample stream, owned by the manager until released
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamedSamples {
    pub handle: BufferHandle,
    /// Samples written to the device buffer
    pub len: usize,
    /// Absolute time the stored sample times are relative to
    pub t0: f64,
}

struct Stream<B> {
    staging: Vec<GpuSample>,
    device: Arc<Allocation<B>>,
    /// Samples already on the device
    len: usize,
    /// Device capacity, in samples
    capacity: usize,
    t0: Option<f64>,
}

/// Owns every device buffer of the stroke pipeline
pub struct BufferManager<A: BufferAllocator> {
    allocator: A,
    config: BufferConfig,
    buffers: SlotMap<BufferHandle, Arc<Allocation<A::Buffer>>>,
    stream: Option<Stream<A::Buffer>>,
    stream_growths: usize,
}

impl<A: BufferAllocator> BufferManager<A> {
    pub fn new(allocator: A, config: BufferConfig) -> Self {
        Self {
            allocator,
            config,
            buffers: SlotMap::with_key(),
            stream: None,
            stream_growths: 0,
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Allocate a buffer holding `data`
    pub fn upload(&mut self, label: &str, data: &[u8], usage: BufferUsage) -> Result<BufferHandle> {
        let allocation = self.allocator.allocate(label, data.len() as u64, usage)?;
        self.allocator.write(&allocation, 0, data)?;
        tracing::trace!("uploaded {} ({} bytes, {:?})", label, data.len(), usage);
        Ok(self.buffers.insert(allocation))
    }

    /// A new reference to a live allocation
    ///
    /// The clone keeps the memory alive independently of the handle.
    pub fn get(&self, handle: BufferHandle) -> Result<Arc<Allocation<A::Buffer>>> {
        self.buffers
            .get(handle)
            .cloned()
            .ok_or(BufferError::InvalidHandle)
    }

    /// Release the manager's reference; false if the handle was stale
    pub fn release(&mut self, handle: BufferHandle) -> bool {
        self.buffers.remove(handle).is_some()
    }

    /// Release every handle and any open stream
    pub fn release_all(&mut self) {
        let count = self.buffers.len() + usize::from(self.stream.is_some());
        if count > 0 {
            tracing::debug!("releasing {} buffers", count);
        }
        self.buffers.clear();
        self.stream = None;
    }

    /// Buffers currently owned by the manager, counting an open stream
    pub fn live_buffers(&self) -> usize {
        self.buffers.len() + usize::from(self.stream.is_some())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────────────────────────────────────

    /// Open the sample stream, replacing any previous one
    pub fn begin_stream(&mut self) -> Result<()> {
        self.stream = None;
        let capacity = self.config.initial_stream_capacity.max(1);
        let device = self.allocator.allocate(
            "Quill Sample Stream",
            capacity as u64 * SAMPLE_SIZE,
            BufferUsage::Stream,
        )?;
        self.stream = Some(Stream {
            staging: Vec::with_capacity(self.config.staging_capacity.max(1)),
            device,
            len: 0,
            capacity,
            t0: None,
        });
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Append one sample, flushing the staging region when it fills up
    pub fn stream_append(&mut self, sample: &Sample) -> Result<()> {
        let staging_capacity = self.config.staging_capacity.max(1);
        let stream = self.stream.as_mut().ok_or(BufferError::NoStream)?;
        let t0 = *stream.t0.get_or_insert(sample.t);
        stream.staging.push(GpuSample::new(sample, t0));
        if stream.staging.len() >= staging_capacity {
            self.flush_stream()?;
        }
        Ok(())
    }

    /// Move staged samples to the device stream buffer
    pub fn flush_stream(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(BufferError::NoStream)?;
        if stream.staging.is_empty() {
            return Ok(());
        }

        let needed = stream.len + stream.staging.len();
        if needed > stream.capacity {
            let mut capacity = stream.capacity;
            while capacity < needed {
                capacity *= 2;
            }
            let grown = self.allocator.allocate(
                "Quill Sample Stream",
                capacity as u64 * SAMPLE_SIZE,
                BufferUsage::Stream,
            )?;
            self.allocator
                .copy(&stream.device, &grown, stream.len as u64 * SAMPLE_SIZE)?;
            tracing::trace!("sample stream grew {} -> {} samples", stream.capacity, capacity);
            stream.device = grown;
            stream.capacity = capacity;
            self.stream_growths += 1;
        }

        self.allocator.write(
            &stream.device,
            stream.len as u64 * SAMPLE_SIZE,
            bytemuck::cast_slice(&stream.staging),
        )?;
        stream.len = needed;
        stream.staging.clear();
        Ok(())
    }

    /// Samples appended so far, staged or flushed
    pub fn stream_len(&self) -> usize {
        self.stream
            .as_ref()
            .map(|s| s.len + s.staging.len())
            .unwrap_or(0)
    }

    /// Device capacity of the stream, in samples
    pub fn stream_capacity(&self) -> usize {
        self.stream.as_ref().map(|s| s.capacity).unwrap_or(0)
    }

    /// How many times any stream had to grow
    pub fn stream_growths(&self) -> usize {
        self.stream_growths
    }

    /// Flush and close the stream, handing the device buffer over as a handle
    pub fn finish_stream(&mut self) -> Result<StreamedSamples> {
        self.flush_stream()?;
        let stream = self.stream.take().ok_or(BufferError::NoStream)?;
        tracing::debug!(
            "sample stream closed: {} samples, capacity {}",
            stream.len,
            stream.capacity
        );
        Ok(StreamedSamples {
            handle: self.buffers.insert(stream.device),
            len: stream.len,
            t0: stream.t0.unwrap_or(0.0),
        })
    }

    /// Read a closed stream back as host samples
    pub fn read_stream(&mut self, streamed: &StreamedSamples) -> Result<Vec<Sample>> {
        let allocation = self.get(streamed.handle)?;
        let bytes = self
            .allocator
            .read(&allocation, 0, streamed.len as u64 * SAMPLE_SIZE)?;
        Ok(bytes
            .chunks_exact(SAMPLE_SIZE as usize)
            .map(|chunk| bytemuck::pod_read_unaligned::<GpuSample>(chunk).to_sample(streamed.t0))
            .collect())
    }

    /// Drop the stream without keeping its contents
    pub fn abort_stream(&mut self) {
        self.stream = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize) -> Sample {
        Sample::new(i as f32, 0.0, 1.0, i as f64 * 0.01)
    }

    #[test]
    fn test_upload_release_tracks_live_counts() {
        let mut manager = BufferManager::new(HostAllocator::new(), BufferConfig::default());
        let a = manager.upload("a", &[1, 2, 3, 4], BufferUsage::Vertex).unwrap();
        let b = manager.upload("b", &[5; 8], BufferUsage::Index).unwrap();

        assert_eq!(manager.live_buffers(), 2);
        assert_eq!(manager.allocator().live_allocations(), 2);
        assert_eq!(manager.get(a).unwrap().raw().contents(), vec![1, 2, 3, 4]);

        assert!(manager.release(a));
        assert!(!manager.release(a));
        assert_eq!(manager.get(a).unwrap_err(), BufferError::InvalidHandle);

        manager.release_all();
        assert!(manager.get(b).is_err());
        assert_eq!(manager.live_buffers(), 0);
        assert_eq!(manager.allocator().live_allocations(), 0);
    }

    #[test]
    fn test_pending_reference_outlives_release() {
        let mut manager = BufferManager::new(HostAllocator::new(), BufferConfig::default());
        let handle = manager.upload("edges", &[0; 32], BufferUsage::Storage).unwrap();
        let in_flight = manager.get(handle).unwrap();

        manager.release(handle);
        assert_eq!(manager.live_buffers(), 0);
        assert_eq!(manager.allocator().live_allocations(), 1);

        drop(in_flight);
        assert_eq!(manager.allocator().live_allocations(), 0);
    }

    #[test]
    fn test_budget_exhaustion_is_out_of_memory() {
        let mut manager = BufferManager::new(HostAllocator::with_budget(16), BufferConfig::default());
        manager.upload("small", &[0; 12], BufferUsage::Vertex).unwrap();
        let err = manager.upload("big", &[0; 8], BufferUsage::Vertex).unwrap_err();
        assert!(matches!(err, BufferError::OutOfMemory { requested: 8, .. }));
        assert_eq!(manager.live_buffers(), 1);
    }

    #[test]
    fn test_stream_grows_by_doubling() {
        let config = BufferConfig {
            staging_capacity: 4,
            initial_stream_capacity: 8,
        };
        let mut manager = BufferManager::new(HostAllocator::new(), config);
        manager.begin_stream().unwrap();
        for i in 0..70 {
            manager.stream_append(&sample(i)).unwrap();
        }

        assert_eq!(manager.stream_len(), 70);
        // 8 -> 16 -> 32 -> 64 -> 128
        assert_eq!(manager.stream_capacity(), 128);
        assert_eq!(manager.stream_growths(), 4);
        // Old stream buffers are freed as soon as they are replaced.
        assert_eq!(manager.allocator().live_allocations(), 1);

        let streamed = manager.finish_stream().unwrap();
        assert_eq!(streamed.len, 70);
        let bytes = manager.get(streamed.handle).unwrap().raw().contents();
        let read = |i: usize| {
            let start = i * SAMPLE_SIZE as usize;
            bytemuck::pod_read_unaligned::<GpuSample>(&bytes[start..start + SAMPLE_SIZE as usize])
        };
        assert_eq!(read(0).position, [0.0, 0.0]);
        assert_eq!(read(69).position, [69.0, 0.0]);
        assert!((read(69).time - 0.69).abs() < 1e-5);
    }

    #[test]
    fn test_closed_stream_reads_back_as_samples() {
        let config = BufferConfig {
            staging_capacity: 3,
            initial_stream_capacity: 4,
        };
        let mut manager = BufferManager::new(HostAllocator::new(), config);
        manager.begin_stream().unwrap();
        let sent: Vec<Sample> = (0..10)
            .map(|i| Sample::new(i as f32 * 1.5, 2.0, 0.1 * i as f32, 5.0 + i as f64 * 0.01))
            .collect();
        for sample in &sent {
            manager.stream_append(sample).unwrap();
        }

        let streamed = manager.finish_stream().unwrap();
        assert_eq!(streamed.t0, 5.0);
        let read = manager.read_stream(&streamed).unwrap();
        assert_eq!(read.len(), sent.len());
        for (r, s) in read.iter().zip(&sent) {
            assert_eq!(r.position(), s.position());
            assert_eq!(r.pressure, s.pressure);
            assert!((r.t - s.t).abs() < 1e-5);
        }

        manager.release_all();
        assert_eq!(
            manager.read_stream(&streamed).unwrap_err(),
            BufferError::InvalidHandle
        );
    }

    #[test]
    fn test_host_read_checks_range() {
        let mut allocator = HostAllocator::new();
        let buffer = allocator.allocate("a", 8, BufferUsage::Storage).unwrap();
        allocator.write(&buffer, 4, &[7, 8, 9, 10]).unwrap();
        assert_eq!(allocator.read(&buffer, 4, 4).unwrap(), vec![7, 8, 9, 10]);
        assert!(matches!(
            allocator.read(&buffer, 6, 4),
            Err(BufferError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_stream_requires_begin() {
        let mut manager = BufferManager::new(HostAllocator::new(), BufferConfig::default());
        assert_eq!(manager.stream_append(&sample(0)), Err(BufferError::NoStream));

        manager.begin_stream().unwrap();
        manager.stream_append(&sample(0)).unwrap();
        manager.abort_stream();
        assert_eq!(manager.live_buffers(), 0);
        assert_eq!(manager.allocator().live_allocations(), 0);
    }
}
