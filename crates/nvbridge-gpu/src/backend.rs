//! Vendor-driver abstraction used by the bridge core.
//!
//! The real bridge binds these to resolved driver entry points; tests and the
//! simulator provide in-memory implementations. The traits are intentionally
//! small and object-safe so a single driver object can back all of them.

use std::time::Duration;

use thiserror::Error;

/// Opaque device address handed out by the driver for a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub u64);

/// Identifier for one submitted batch of command bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubmissionId(pub u64);

/// Opaque handle to a built pipeline state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);

/// Placement class for a memory reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryClass {
    System,
    Device,
    Shared,
}

/// Shader stage, also the numeric tag folded into shader cache keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ShaderStage {
    Vertex = 0,
    Fragment = 1,
    Compute = 2,
}

impl ShaderStage {
    pub fn tag(self) -> u32 {
        self as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("host memory access out of bounds: addr=0x{:x}, offset=0x{offset:x}, len=0x{len:x}", addr.0)]
pub struct HostMemoryError {
    pub addr: DeviceAddress,
    pub offset: u64,
    pub len: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("vendor driver rejected submission: {reason}")]
    Rejected { reason: String },
    #[error("timed out waiting for submission {:#x}", id.0)]
    Timeout { id: SubmissionId },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("shader source is empty")]
    EmptySource,
    #[error("shader translation failed: {reason}")]
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("pipeline build failed: {reason}")]
    Failed { reason: String },
}

/// Raw memory reservations on the device side.
///
/// `reserve` receives an already-aligned size; budget accounting happens in
/// the tracker, not here. Implementations must be pure table operations (no
/// blocking I/O) since the tracker calls them under its lock.
pub trait HostMemory: Send + Sync {
    fn reserve(
        &self,
        aligned_size: u64,
        class: MemoryClass,
        contiguous: bool,
    ) -> Option<DeviceAddress>;

    fn release(&self, addr: DeviceAddress);

    fn write(&self, addr: DeviceAddress, offset: u64, src: &[u8]) -> Result<(), HostMemoryError>;

    fn read(&self, addr: DeviceAddress, offset: u64, dst: &mut [u8])
        -> Result<(), HostMemoryError>;
}

/// Hand-off point for accumulated command bytes.
pub trait SubmissionBoundary: Send + Sync {
    fn submit(&self, bytes: &[u8]) -> Result<SubmissionId, SubmissionError>;

    /// Block the calling thread until the given submission retires.
    fn wait_for_completion(&self, id: SubmissionId, timeout: Duration)
        -> Result<(), SubmissionError>;
}

/// Source-to-device shader translation.
pub trait ShaderTranslator: Send + Sync {
    fn translate(
        &self,
        source: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Vec<u8>, TranslateError>;
}

/// Pipeline state object construction from translated shader blobs.
pub trait PipelineBuilder: Send + Sync {
    fn build_render(
        &self,
        vs: &[u8],
        fs: Option<&[u8]>,
        desc: &crate::pipeline_cache::RenderPipelineDesc,
    ) -> Result<PipelineHandle, BuildError>;

    fn build_compute(
        &self,
        cs: &[u8],
        desc: &crate::pipeline_cache::ComputePipelineDesc,
    ) -> Result<PipelineHandle, BuildError>;
}

/// Everything the bridge needs from one vendor driver object.
pub trait DriverBackend:
    HostMemory + SubmissionBoundary + ShaderTranslator + PipelineBuilder
{
}

impl<T: HostMemory + SubmissionBoundary + ShaderTranslator + PipelineBuilder> DriverBackend for T {}
