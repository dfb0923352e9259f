//! Content-addressed cache of translated shader blobs.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::backend::{ShaderStage, ShaderTranslator, TranslateError};
use crate::fingerprint::shader_fingerprint;
use crate::slot_table::SlotTable;

/// Default capacity of the shader cache.
pub const SHADER_CACHE_CAPACITY: usize = 256;

pub struct ShaderCache {
    translator: Arc<dyn ShaderTranslator>,
    table: Mutex<SlotTable<Vec<u8>>>,
}

impl ShaderCache {
    pub fn new(capacity: usize, translator: Arc<dyn ShaderTranslator>) -> Self {
        Self {
            translator,
            table: Mutex::new(SlotTable::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached blob for this (stage, source, entry point), invoking
    /// the translator on a miss.
    ///
    /// The translator runs outside the cache lock; if a racing caller filled
    /// the slot in the meantime its blob wins and the fresh result is
    /// discarded. Translation failures propagate and insert nothing.
    pub fn compile_or_fetch(
        &self,
        stage: ShaderStage,
        source: &str,
        entry_point: &str,
    ) -> Result<Vec<u8>, TranslateError> {
        let fp = shader_fingerprint(stage, source, entry_point);

        if let Some(blob) = self.table.lock().unwrap().lookup(fp) {
            debug!(fingerprint = fp, "shader cache hit");
            return Ok(blob.clone());
        }

        let blob = self.translator.translate(source, entry_point, stage)?;

        let mut table = self.table.lock().unwrap();
        if let Some(existing) = table.lookup(fp) {
            return Ok(existing.clone());
        }
        debug!(fingerprint = fp, bytes = blob.len(), "shader cache fill");
        table.insert(fp, blob.clone());
        Ok(blob)
    }

    pub fn clear(&self) {
        self.table.lock().unwrap().clear();
    }
}
