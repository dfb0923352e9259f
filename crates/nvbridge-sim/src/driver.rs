//! The simulated vendor driver.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use hashbrown::HashMap;
use tracing::debug;

use nvbridge_gpu::backend::{
    BuildError, DeviceAddress, HostMemory, HostMemoryError, MemoryClass, PipelineBuilder,
    PipelineHandle, ShaderStage, ShaderTranslator, SubmissionBoundary, SubmissionError,
    SubmissionId, TranslateError,
};
use nvbridge_gpu::pipeline_cache::{ComputePipelineDesc, RenderPipelineDesc};
use nvbridge_gpu::PtxIsa;

/// Latency charged per submission, matching the hardware batch turnaround the
/// accumulator was tuned against.
pub const SIMULATED_SUBMIT_LATENCY: Duration = Duration::from_micros(50);

#[derive(Debug)]
struct SimState {
    regions: HashMap<u64, Vec<u8>>,
    submissions: Vec<Vec<u8>>,
    retired: u64,
}

/// In-memory driver implementing all of `nvbridge_gpu::backend`.
///
/// Submissions retire as soon as `submit` returns, so waits never block
/// beyond the simulated latency. `fail_submissions` turns every subsequent
/// submit into a rejection, for exercising failure paths end to end.
#[derive(Debug)]
pub struct SimDriver {
    isa: PtxIsa,
    state: Mutex<SimState>,
    next_addr: AtomicU64,
    next_submission: AtomicU64,
    next_handle: AtomicU64,
    submissions_fail: AtomicBool,
}

impl SimDriver {
    pub fn new(isa: PtxIsa) -> Self {
        Self {
            isa,
            state: Mutex::new(SimState {
                regions: HashMap::new(),
                submissions: Vec::new(),
                retired: 0,
            }),
            next_addr: AtomicU64::new(0x1_0000),
            next_submission: AtomicU64::new(1),
            next_handle: AtomicU64::new(1),
            submissions_fail: AtomicBool::new(false),
        }
    }

    /// Reject all future submissions (until re-enabled).
    pub fn fail_submissions(&self, fail: bool) {
        self.submissions_fail.store(fail, Ordering::SeqCst);
    }

    /// Every batch of bytes submitted so far, in order.
    pub fn submitted_batches(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn live_regions(&self) -> usize {
        self.state.lock().unwrap().regions.len()
    }

    /// Placeholder PTX prologue for this device's ISA level.
    fn ptx_prologue(&self) -> String {
        format!(
            ".version 6.0\n.target {}\n.address_size 64\n",
            self.isa.target()
        )
    }
}

impl HostMemory for SimDriver {
    fn reserve(
        &self,
        aligned_size: u64,
        class: MemoryClass,
        contiguous: bool,
    ) -> Option<DeviceAddress> {
        let addr = self.next_addr.fetch_add(aligned_size, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .regions
            .insert(addr, vec![0; aligned_size as usize]);
        debug!(addr, size = aligned_size, ?class, contiguous, "sim reserve");
        Some(DeviceAddress(addr))
    }

    fn release(&self, addr: DeviceAddress) {
        self.state.lock().unwrap().regions.remove(&addr.0);
    }

    fn write(&self, addr: DeviceAddress, offset: u64, src: &[u8]) -> Result<(), HostMemoryError> {
        let mut state = self.state.lock().unwrap();
        let err = HostMemoryError {
            addr,
            offset,
            len: src.len(),
        };
        let region = state.regions.get_mut(&addr.0).ok_or(err.clone())?;
        let start = usize::try_from(offset).map_err(|_| err.clone())?;
        let end = start.checked_add(src.len()).ok_or(err.clone())?;
        region.get_mut(start..end).ok_or(err)?.copy_from_slice(src);
        Ok(())
    }

    fn read(
        &self,
        addr: DeviceAddress,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<(), HostMemoryError> {
        let state = self.state.lock().unwrap();
        let err = HostMemoryError {
            addr,
            offset,
            len: dst.len(),
        };
        let region = state.regions.get(&addr.0).ok_or(err.clone())?;
        let start = usize::try_from(offset).map_err(|_| err.clone())?;
        let end = start.checked_add(dst.len()).ok_or(err.clone())?;
        dst.copy_from_slice(region.get(start..end).ok_or(err)?);
        Ok(())
    }
}

impl SubmissionBoundary for SimDriver {
    fn submit(&self, bytes: &[u8]) -> Result<SubmissionId, SubmissionError> {
        if self.submissions_fail.load(Ordering::SeqCst) {
            return Err(SubmissionError::Rejected {
                reason: "simulated channel error".into(),
            });
        }
        thread::sleep(SIMULATED_SUBMIT_LATENCY);
        let id = SubmissionId(self.next_submission.fetch_add(1, Ordering::SeqCst));
        let mut state = self.state.lock().unwrap();
        state.submissions.push(bytes.to_vec());
        state.retired = id.0;
        debug!(id = id.0, bytes = bytes.len(), "sim submit");
        Ok(id)
    }

    fn wait_for_completion(
        &self,
        id: SubmissionId,
        _timeout: Duration,
    ) -> Result<(), SubmissionError> {
        // Work retires at submit time, so anything we handed out is done.
        let retired = self.state.lock().unwrap().retired;
        if id.0 > retired {
            return Err(SubmissionError::Timeout { id });
        }
        Ok(())
    }
}

impl ShaderTranslator for SimDriver {
    fn translate(
        &self,
        source: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Vec<u8>, TranslateError> {
        if source.is_empty() {
            return Err(TranslateError::EmptySource);
        }
        // Output is a pure function of (isa, stage, entry point, source) so
        // cache-hit equality checks are meaningful.
        let mut blob = self.ptx_prologue().into_bytes();
        blob.extend_from_slice(
            format!(".visible .entry {entry_point}() {{\n    ret;\n}}\n").as_bytes(),
        );
        blob.push(stage.tag() as u8);
        blob.extend_from_slice(&nvbridge_gpu::fingerprint::djb2(source.as_bytes()).to_le_bytes());
        Ok(blob)
    }
}

impl PipelineBuilder for SimDriver {
    fn build_render(
        &self,
        vs: &[u8],
        _fs: Option<&[u8]>,
        _desc: &RenderPipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        if vs.is_empty() {
            return Err(BuildError::Failed {
                reason: "vertex shader blob is empty".into(),
            });
        }
        Ok(PipelineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn build_compute(
        &self,
        cs: &[u8],
        _desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        if cs.is_empty() {
            return Err(BuildError::Failed {
                reason: "compute shader blob is empty".into(),
            });
        }
        Ok(PipelineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }
}
