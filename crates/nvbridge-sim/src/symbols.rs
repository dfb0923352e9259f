//! Vendor entry-point resolution.
//!
//! The real bridge binds driver entry points by name before anything else
//! runs; a missing required export is the one failure that aborts bridge
//! bring-up outright. The simulator models the same step with a name table.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use nvbridge_gpu::{BridgeConfig, BridgeContext, GpuInfo};

use crate::driver::SimDriver;

/// Entry points the bridge cannot run without.
pub const REQUIRED_SYMBOLS: &[&str] = &[
    "nvAllocateMemory",
    "nvFreeMemory",
    "nvSubmitCommandBuffer",
    "nvWaitForCompletion",
    "nvTranslateShader",
    "nvBuildPipeline",
];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("required driver symbol `{0}` not found")]
    MissingSymbol(&'static str),
}

/// Names exported by a driver build. The full set is the default; tests can
/// strip names to model incomplete drivers.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    names: Vec<&'static str>,
}

impl SymbolTable {
    pub fn complete() -> Self {
        Self {
            names: REQUIRED_SYMBOLS.to_vec(),
        }
    }

    pub fn without(mut self, name: &str) -> Self {
        self.names.retain(|n| *n != name);
        self
    }

    pub fn resolves(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }

    /// Check every required export, failing on the first gap.
    pub fn verify(&self) -> Result<(), InitError> {
        for name in REQUIRED_SYMBOLS.iter().copied() {
            if !self.resolves(name) {
                return Err(InitError::MissingSymbol(name));
            }
            debug!(symbol = name, "resolved driver symbol");
        }
        Ok(())
    }
}

/// Bring up a bridge context over the simulated driver, performing the same
/// symbol verification the real bridge does first.
pub fn init_bridge(
    gpu: GpuInfo,
    config: BridgeConfig,
    exports: &SymbolTable,
) -> Result<(BridgeContext, Arc<SimDriver>), InitError> {
    exports.verify()?;
    let driver = Arc::new(SimDriver::new(gpu.ptx_isa));
    Ok((BridgeContext::new(gpu, config, driver.clone()), driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvbridge_gpu::VENDOR_ID_NVIDIA;

    #[test]
    fn complete_table_initializes() {
        let gpu = GpuInfo::probe(VENDOR_ID_NVIDIA, 0x1B81).unwrap();
        let table = SymbolTable::complete();
        assert!(init_bridge(gpu, BridgeConfig::default(), &table).is_ok());
    }

    #[test]
    fn missing_required_symbol_is_fatal() {
        let gpu = GpuInfo::probe(VENDOR_ID_NVIDIA, 0x1B81).unwrap();
        let table = SymbolTable::complete().without("nvAllocateMemory");
        let err = init_bridge(gpu, BridgeConfig::default(), &table).unwrap_err();
        assert_eq!(err, InitError::MissingSymbol("nvAllocateMemory"));
    }
}
