//! Content-addressed cache of built pipeline state objects.
//!
//! A pipeline is fingerprinted from its shader blobs followed by the raw
//! bytes of its flat descriptor struct; compute pipelines additionally fold
//! in [`COMPUTE_PIPELINE_SALT`] so they can never alias a render pipeline.

use std::sync::{Arc, Mutex};

use bytemuck::{bytes_of, Pod, Zeroable};
use tracing::debug;

use crate::backend::{BuildError, PipelineBuilder, PipelineHandle};
use crate::fingerprint::{Djb2, COMPUTE_PIPELINE_SALT};
use crate::slot_table::SlotTable;

/// Default capacity of the pipeline-state cache.
pub const PIPELINE_CACHE_CAPACITY: usize = 64;

/// Fixed-function state of a render pipeline. Flat `u32` fields only so the
/// raw struct bytes are a stable hash input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RenderPipelineDesc {
    pub color_format: u32,
    pub depth_format: u32,
    pub sample_count: u32,
    pub topology: u32,
    pub cull_mode: u32,
    pub front_face_ccw: u32,
    pub blend_enabled: u32,
    pub color_write_mask: u32,
}

/// Fixed-function state of a compute pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ComputePipelineDesc {
    pub threadgroup_x: u32,
    pub threadgroup_y: u32,
    pub threadgroup_z: u32,
    pub flags: u32,
}

pub(crate) fn render_pipeline_fingerprint(
    vs: &[u8],
    fs: Option<&[u8]>,
    desc: &RenderPipelineDesc,
) -> u64 {
    let mut h = Djb2::new();
    h.update(vs);
    if let Some(fs) = fs {
        h.update(fs);
    }
    h.update(bytes_of(desc));
    h.finish()
}

pub(crate) fn compute_pipeline_fingerprint(cs: &[u8], desc: &ComputePipelineDesc) -> u64 {
    let mut h = Djb2::new();
    h.update(cs);
    h.update(bytes_of(desc));
    h.fold(COMPUTE_PIPELINE_SALT);
    h.finish()
}

pub struct PipelineCache {
    builder: Arc<dyn PipelineBuilder>,
    table: Mutex<SlotTable<PipelineHandle>>,
}

impl PipelineCache {
    pub fn new(capacity: usize, builder: Arc<dyn PipelineBuilder>) -> Self {
        Self {
            builder,
            table: Mutex::new(SlotTable::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch or build the render pipeline for these shader blobs + state.
    ///
    /// The builder runs outside the cache lock (double-checked on re-entry);
    /// build failures propagate and insert nothing.
    pub fn get_or_build_render(
        &self,
        vs: &[u8],
        fs: Option<&[u8]>,
        desc: &RenderPipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        let fp = render_pipeline_fingerprint(vs, fs, desc);
        self.get_or_build(fp, || self.builder.build_render(vs, fs, desc))
    }

    /// Fetch or build the compute pipeline for this shader blob + state.
    pub fn get_or_build_compute(
        &self,
        cs: &[u8],
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle, BuildError> {
        let fp = compute_pipeline_fingerprint(cs, desc);
        self.get_or_build(fp, || self.builder.build_compute(cs, desc))
    }

    fn get_or_build(
        &self,
        fp: u64,
        build: impl FnOnce() -> Result<PipelineHandle, BuildError>,
    ) -> Result<PipelineHandle, BuildError> {
        if let Some(handle) = self.table.lock().unwrap().lookup(fp) {
            debug!(fingerprint = fp, handle = handle.0, "pipeline cache hit");
            return Ok(*handle);
        }

        let handle = build()?;

        let mut table = self.table.lock().unwrap();
        if let Some(existing) = table.lookup(fp) {
            return Ok(*existing);
        }
        debug!(fingerprint = fp, handle = handle.0, "pipeline cache fill");
        table.insert(fp, handle);
        Ok(handle)
    }

    pub fn clear(&self) {
        self.table.lock().unwrap().clear();
    }
}
