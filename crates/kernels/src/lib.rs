//! Kernel-library interface for kernelcheck.
//!
//! Problem descriptors, the GEMM and Conv2D entry points a library under test
//! implements, block-channel layout arithmetic, and a built-in `blocked`
//! library so the harness runs without an external one.

pub mod config;
pub mod conv;
pub mod gemm;
pub mod layout;
pub mod registry;
pub mod utils;

pub use config::*;
pub use conv::*;
pub use gemm::*;
pub use layout::*;
pub use registry::*;
pub use utils::*;
