//! In-memory fakes for the driver traits, used by unit tests here and
//! available to dependent crates' tests.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hashbrown::HashMap;

use crate::backend::{
    BuildError, DeviceAddress, HostMemory, HostMemoryError, MemoryClass, PipelineBuilder,
    PipelineHandle, ShaderStage, ShaderTranslator, SubmissionBoundary, SubmissionError,
    SubmissionId, TranslateError,
};
use crate::pipeline_cache::{ComputePipelineDesc, RenderPipelineDesc};

/// Vec-backed reservation table. Addresses are handed out from a bump
/// counter; a reservation of N bytes is an N-byte zeroed buffer.
pub struct VecHostMemory {
    regions: Mutex<HashMap<u64, Vec<u8>>>,
    next_addr: AtomicU64,
    fail_next: AtomicU32,
}

impl VecHostMemory {
    pub fn new() -> Self {
        Self {
            regions: Mutex::new(HashMap::new()),
            next_addr: AtomicU64::new(0x1000),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Make the next `n` reservations fail.
    pub fn fail_next_reservations(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn live_regions(&self) -> usize {
        self.regions.lock().unwrap().len()
    }
}

impl Default for VecHostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemory for VecHostMemory {
    fn reserve(
        &self,
        aligned_size: u64,
        _class: MemoryClass,
        _contiguous: bool,
    ) -> Option<DeviceAddress> {
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        let addr = self.next_addr.fetch_add(aligned_size, Ordering::SeqCst);
        self.regions
            .lock()
            .unwrap()
            .insert(addr, vec![0; aligned_size as usize]);
        Some(DeviceAddress(addr))
    }

    fn release(&self, addr: DeviceAddress) {
        self.regions.lock().unwrap().remove(&addr.0);
    }

    fn write(&self, addr: DeviceAddress, offset: u64, src: &[u8]) -> Result<(), HostMemoryError> {
        let mut regions = self.regions.lock().unwrap();
        let err = HostMemoryError {
            addr,
            offset,
            len: src.len(),
        };
        let region = regions.get_mut(&addr.0).ok_or(err.clone())?;
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
        let regions = self.regions.lock().unwrap();
        let err = HostMemoryError {
            addr,
            offset,
            len: dst.len(),
        };
        let region = regions.get(&addr.0).ok_or(err.clone())?;
        let start = usize::try_from(offset).map_err(|_| err.clone())?;
        let end = start.checked_add(dst.len()).ok_or(err.clone())?;
        dst.copy_from_slice(region.get(start..end).ok_or(err)?);
        Ok(())
    }
}

/// Boundary that records every submitted batch and can be told to fail.
pub struct RecordingBoundary {
    submissions: Mutex<Vec<Vec<u8>>>,
    next_id: AtomicU64,
    fail_next: AtomicU32,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn fail_next_submissions(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.submissions.lock().unwrap().clone()
    }
}

impl Default for RecordingBoundary {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionBoundary for RecordingBoundary {
    fn submit(&self, bytes: &[u8]) -> Result<SubmissionId, SubmissionError> {
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmissionError::Rejected {
                reason: "injected failure".into(),
            });
        }
        self.submissions.lock().unwrap().push(bytes.to_vec());
        Ok(SubmissionId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn wait_for_completion(
        &self,
        _id: SubmissionId,
        _timeout: Duration,
    ) -> Result<(), SubmissionError> {
        Ok(())
    }
}

/// Translator returning a deterministic blob and counting invocations.
pub struct CountingTranslator {
    pub calls: AtomicU32,
    fail_next: AtomicU32,
}

impl CountingTranslator {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn fail_next_translations(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CountingTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderTranslator for CountingTranslator {
    fn translate(
        &self,
        source: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Vec<u8>, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(TranslateError::Failed {
                reason: "injected failure".into(),
            });
        }
        let mut blob = format!("{}:{}:", stage.tag(), entry_point).into_bytes();
        blob.extend_from_slice(source.as_bytes());
        Ok(blob)
    }
}

/// Builder handing out sequential handles and counting invocations.
pub struct CountingBuilder {
    pub calls: AtomicU32,
    next_handle: AtomicU64,
    fail_next: AtomicU32,
}

impl CountingBuilder {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            next_handle: AtomicU64::new(1),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn fail_next_builds(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<PipelineHandle, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(BuildError::Failed {
                reason: "injected failure".into(),
            });
        }
        Ok(PipelineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }
}

impl Default for CountingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder for CountingBuilder {
    fn build_render(
        &self,
        _vs: &[u8],
        _fs: Option<&[u8]>,
        _desc: &RenderPipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        self.next()
    }

    fn build_compute(
        &self,
        _cs: &[u8],
        _desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        self.next()
    }
}

/// All four fakes behind one object, for wiring a whole [`BridgeContext`].
///
/// [`BridgeContext`]: crate::context::BridgeContext
#[derive(Default)]
pub struct TestDriver {
    pub memory: VecHostMemory,
    pub boundary: RecordingBoundary,
    pub translator: CountingTranslator,
    pub builder: CountingBuilder,
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostMemory for TestDriver {
    fn reserve(
        &self,
        aligned_size: u64,
        class: MemoryClass,
        contiguous: bool,
    ) -> Option<DeviceAddress> {
        self.memory.reserve(aligned_size, class, contiguous)
    }

    fn release(&self, addr: DeviceAddress) {
        self.memory.release(addr)
    }

    fn write(&self, addr: DeviceAddress, offset: u64, src: &[u8]) -> Result<(), HostMemoryError> {
        self.memory.write(addr, offset, src)
    }

    fn read(
        &self,
        addr: DeviceAddress,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<(), HostMemoryError> {
        self.memory.read(addr, offset, dst)
    }
}

impl SubmissionBoundary for TestDriver {
    fn submit(&self, bytes: &[u8]) -> Result<SubmissionId, SubmissionError> {
        self.boundary.submit(bytes)
    }

    fn wait_for_completion(
        &self,
        id: SubmissionId,
        timeout: Duration,
    ) -> Result<(), SubmissionError> {
        self.boundary.wait_for_completion(id, timeout)
    }
}

impl ShaderTranslator for TestDriver {
    fn translate(
        &self,
        source: &str,
        entry_point: &str,
        stage: ShaderStage,
    ) -> Result<Vec<u8>, TranslateError> {
        self.translator.translate(source, entry_point, stage)
    }
}

impl PipelineBuilder for TestDriver {
    fn build_render(
        &self,
        vs: &[u8],
        fs: Option<&[u8]>,
        desc: &RenderPipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        self.builder.build_render(vs, fs, desc)
    }

    fn build_compute(
        &self,
        cs: &[u8],
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        self.builder.build_compute(cs, desc)
    }
}
