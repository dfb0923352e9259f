//! `nvbridge-gpu` is the host-side core of the NVBridge graphics bridge.
//!
//! It provides:
//! - VRAM budget tracking in front of the vendor allocator (see
//!   [`MemoryTracker`]).
//! - A bounded command-stream accumulator with implicit and watermark
//!   flushing (see [`CommandStream`]).
//! - Content-addressed shader and pipeline-state caches (see
//!   [`ShaderCache`], [`pipeline_cache::PipelineCache`]).
//! - The command-buffer lifecycle built on top of the stream (see
//!   [`CommandBuffer`]).
//!
//! The vendor driver is injected through the traits in [`backend`]; the
//! [`testing`] module provides in-memory implementations, and the
//! `nvbridge-sim` crate provides a full simulated driver.

mod memory;
mod slot_table;
mod stream;

mod command_buffer;
mod context;

pub mod backend;
pub mod cmd;
pub mod fingerprint;
pub mod pipeline_cache;
pub mod shader_cache;
pub mod testing;

pub use backend::{
    DeviceAddress, DriverBackend, MemoryClass, PipelineHandle, ShaderStage, SubmissionId,
};
pub use command_buffer::{
    CommandBuffer, CommandBufferError, CommandBufferState, ComputeEncoder, RenderEncoder,
};
pub use context::{
    BridgeConfig, BridgeContext, ContextError, GpuArchitecture, GpuInfo, PtxIsa, VENDOR_ID_NVIDIA,
};
pub use memory::{BudgetReport, MemoryError, MemoryTracker, VRAM_ALLOC_ALIGN};
pub use shader_cache::ShaderCache;
pub use stream::{CommandStream, StreamError, StreamStats, DEFAULT_STREAM_CAPACITY};

#[cfg(test)]
mod tests;
