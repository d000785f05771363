//! Guard-page backed buffers for kernel verification.
//!
//! A [`GuardedBuffer`] hands out slices whose last element sits immediately
//! below a reserved, inaccessible region. A kernel that reads or writes one
//! element past the slice faults on the spot instead of corrupting a
//! neighbouring allocation or silently passing.

pub mod buffer;
pub mod fill;
pub mod platform;

pub use buffer::*;
pub use fill::*;
pub use platform::*;
