//! JavaScript bindings for `hydrobench_core`: load forcing CSV text, run any
//! solution variant and read back flows, losses and gradients.

mod system;

pub use system::{run_gr4j, WasmBenchmark};
