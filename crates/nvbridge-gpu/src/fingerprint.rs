//! Content fingerprints for the shader and pipeline-state caches.
//!
//! The hash is the classic DJB2 accumulation (`h = h * 33 + byte`, seed 0),
//! kept bit-for-bit stable because fingerprints are a wire-visible cache key
//! format, not an implementation detail.

use crate::backend::ShaderStage;

/// Extra fold applied to compute-pipeline fingerprints so a compute pipeline
/// can never collide with a render pipeline built from the same bytes.
pub const COMPUTE_PIPELINE_SALT: u64 = 0xC0FFEE;

/// Rolling DJB2 hasher.
#[derive(Clone, Copy, Debug, Default)]
pub struct Djb2 {
    h: u64,
}

impl Djb2 {
    pub fn new() -> Self {
        Self { h: 0 }
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        for &b in bytes {
            self.h = self.h.wrapping_mul(33).wrapping_add(u64::from(b));
        }
        self
    }

    /// Fold a single non-byte value into the hash, as one step.
    pub fn fold(&mut self, value: u64) -> &mut Self {
        self.h = self.h.wrapping_mul(33).wrapping_add(value);
        self
    }

    pub fn finish(&self) -> u64 {
        self.h
    }
}

/// DJB2 over a single byte slice.
pub fn djb2(bytes: &[u8]) -> u64 {
    let mut h = Djb2::new();
    h.update(bytes);
    h.finish()
}

/// Textual cache key for a shader: stage tag plus source hash plus entry
/// point. Two sources hashing equal produce the same key; distinct entry
/// points in one source do not.
pub fn shader_cache_key(stage: ShaderStage, source: &str, entry_point: &str) -> String {
    format!(
        "shader_{}_{}_{}",
        stage.tag(),
        djb2(source.as_bytes()),
        entry_point
    )
}

/// Fingerprint for a shader cache slot: DJB2 over the textual key.
pub fn shader_fingerprint(stage: ShaderStage, source: &str, entry_point: &str) -> u64 {
    djb2(shader_cache_key(stage, source, entry_point).as_bytes())
}
