//! Bridge context: one initialized device binding owning all four bridge
//! components. Multiple contexts are fully independent; there is no global
//! state.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{
    DriverBackend, HostMemory, PipelineBuilder, ShaderTranslator, SubmissionBoundary,
};
use crate::command_buffer::CommandBuffer;
use crate::memory::MemoryTracker;
use crate::pipeline_cache::{PipelineCache, PIPELINE_CACHE_CAPACITY};
use crate::shader_cache::{ShaderCache, SHADER_CACHE_CAPACITY};
use crate::stream::{CommandStream, DEFAULT_STREAM_CAPACITY};

pub const VENDOR_ID_NVIDIA: u16 = 0x10DE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuArchitecture {
    Maxwell,
    Pascal,
}

/// PTX ISA level used when translating shaders for this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtxIsa {
    Sm50,
    Sm52,
    Sm60,
    Sm61,
}

impl PtxIsa {
    /// The `.target` spelling in PTX text.
    pub fn target(self) -> &'static str {
        match self {
            PtxIsa::Sm50 => "sm_50",
            PtxIsa::Sm52 => "sm_52",
            PtxIsa::Sm60 => "sm_60",
            PtxIsa::Sm61 => "sm_61",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("unsupported device {vendor_id:04x}:{device_id:04x}")]
    UnsupportedDevice { vendor_id: u16, device_id: u16 },
}

/// Identity and capability data for one supported device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuInfo {
    pub vendor_id: u16,
    pub device_id: u16,
    pub architecture: GpuArchitecture,
    pub vram_size: u64,
    pub ptx_isa: PtxIsa,
}

const GIB: u64 = 1 << 30;

// Known device ids: (device id, architecture, VRAM, ISA).
const KNOWN_DEVICES: &[(u16, GpuArchitecture, u64, PtxIsa)] = &[
    // GM107 (GTX 750 Ti)
    (0x1380, GpuArchitecture::Maxwell, 2 * GIB, PtxIsa::Sm50),
    // GM204 (GTX 970)
    (0x13C2, GpuArchitecture::Maxwell, 4 * GIB, PtxIsa::Sm52),
    // GM200 (GTX 980 Ti)
    (0x17C8, GpuArchitecture::Maxwell, 6 * GIB, PtxIsa::Sm52),
    // GP100 (Quadro GP100)
    (0x15F8, GpuArchitecture::Pascal, 16 * GIB, PtxIsa::Sm60),
    // GP104 (GTX 1080)
    (0x1B81, GpuArchitecture::Pascal, 8 * GIB, PtxIsa::Sm61),
    // GP102 (GTX 1080 Ti)
    (0x1B06, GpuArchitecture::Pascal, 11 * GIB, PtxIsa::Sm61),
];

impl GpuInfo {
    /// Classify a PCI id pair against the supported-device table.
    pub fn probe(vendor_id: u16, device_id: u16) -> Result<Self, ContextError> {
        if vendor_id != VENDOR_ID_NVIDIA {
            return Err(ContextError::UnsupportedDevice {
                vendor_id,
                device_id,
            });
        }
        let (_, architecture, vram_size, ptx_isa) = KNOWN_DEVICES
            .iter()
            .copied()
            .find(|(id, _, _, _)| *id == device_id)
            .ok_or(ContextError::UnsupportedDevice {
                vendor_id,
                device_id,
            })?;
        Ok(GpuInfo {
            vendor_id,
            device_id,
            architecture,
            vram_size,
            ptx_isa,
        })
    }
}

/// Tunables for one bridge context. `Default` matches the shipped device
/// configuration; `vram_budget` of 0 means "use the probed VRAM size".
#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    pub vram_budget: u64,
    pub stream_capacity: usize,
    pub shader_cache_capacity: usize,
    pub pipeline_cache_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            vram_budget: 0,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            shader_cache_capacity: SHADER_CACHE_CAPACITY,
            pipeline_cache_capacity: PIPELINE_CACHE_CAPACITY,
        }
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("gpu", &self.gpu)
            .finish_non_exhaustive()
    }
}

/// One initialized bridge binding a device to a vendor driver.
pub struct BridgeContext {
    gpu: GpuInfo,
    memory: MemoryTracker,
    stream: Arc<CommandStream>,
    shaders: ShaderCache,
    pipelines: PipelineCache,
    boundary: Arc<dyn SubmissionBoundary>,
}

impl BridgeContext {
    pub fn new<D>(gpu: GpuInfo, config: BridgeConfig, driver: Arc<D>) -> Self
    where
        D: DriverBackend + 'static,
    {
        let budget = if config.vram_budget == 0 {
            gpu.vram_size
        } else {
            config.vram_budget
        };
        let host: Arc<dyn HostMemory> = driver.clone();
        let boundary: Arc<dyn SubmissionBoundary> = driver.clone();
        let translator: Arc<dyn ShaderTranslator> = driver.clone();
        let builder: Arc<dyn PipelineBuilder> = driver;

        debug!(
            device = %format_args!("{:04x}:{:04x}", gpu.vendor_id, gpu.device_id),
            budget,
            "bridge context created"
        );
        Self {
            gpu,
            memory: MemoryTracker::new(budget, host),
            stream: Arc::new(CommandStream::new(config.stream_capacity, boundary.clone())),
            shaders: ShaderCache::new(config.shader_cache_capacity, translator),
            pipelines: PipelineCache::new(config.pipeline_cache_capacity, builder),
            boundary,
        }
    }

    pub fn gpu(&self) -> &GpuInfo {
        &self.gpu
    }

    pub fn memory(&self) -> &MemoryTracker {
        &self.memory
    }

    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    pub fn stream(&self) -> &CommandStream {
        &self.stream
    }

    /// Create a command buffer recording into this context's stream.
    pub fn create_command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(self.stream.clone(), self.boundary.clone())
    }

    /// Tear down: flush pending bytes, drop cached state, force-free VRAM.
    pub fn shutdown(&self) {
        if let Err(err) = self.stream.flush() {
            warn!(error = %err, "final flush failed during shutdown; bytes dropped");
        }
        self.shaders.clear();
        self.pipelines.clear();
        self.memory.release_all();
        debug!("bridge context shut down");
    }
}
