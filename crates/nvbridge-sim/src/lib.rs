//! `nvbridge-sim` is an in-memory vendor driver for the NVBridge core.
//!
//! It implements every trait in `nvbridge_gpu::backend` without touching real
//! hardware: reservations are plain byte vectors, submissions sleep for the
//! observed driver latency and retire immediately, and shader translation
//! emits placeholder PTX for the device's ISA level. The [`symbols`] module
//! models the by-name entry-point resolution the real bridge performs at
//! startup.

mod driver;
pub mod symbols;

pub use driver::{SimDriver, SIMULATED_SUBMIT_LATENCY};
pub use symbols::{init_bridge, InitError, SymbolTable, REQUIRED_SYMBOLS};
