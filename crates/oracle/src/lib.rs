//! Reference computations the kernels under test are checked against.
//!
//! Both oracles run single-threaded with a plain multiply-accumulate in the
//! working precision. They take the same problem descriptors and flat
//! operands as the kernel traits so a case can feed both from one set of
//! buffers.

pub mod conv;
pub mod gemm;

pub use conv::reference_conv2d;
pub use gemm::reference_gemm;
