//! Kernel verification harness.
//!
//! Sweep generators register named cases with a [`TestHost`]; each case runs
//! the kernel under test through an adapter, runs the oracle on the same
//! guarded inputs and compares the two outputs element by element.

pub mod adapter;
pub mod case;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod env;
pub mod reorder;
pub mod report;
pub mod runner;
pub mod session;
pub mod sweep;
pub mod tester;
pub mod verifier;

pub use adapter::*;
pub use case::*;
#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use env::*;
pub use report::*;
pub use runner::*;
pub use session::*;
pub use sweep::{register_all, RegistryState, SweepRegistry};
pub use tester::*;
pub use verifier::*;
