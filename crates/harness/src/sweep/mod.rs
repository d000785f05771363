//! Quick and exhaustive catalogs of sweep generators.
//!
//! Generators are registered once, before anything runs. Draining picks one
//! catalog, invokes each of its generators exactly once in registration
//! order and closes the registry for good.

pub mod conv;
pub mod gemm;

pub use conv::ConvSweep;
pub use gemm::GemmSweep;

use crate::adapter::{ConvLayout, GemmPath};
use crate::case::{CaseBody, TestHost};
use crate::config::{ExecutionMode, HarnessConfig};
use crate::env::ExecutionEnv;
use anyhow::{bail, ensure, Result};
use kernelcheck_kernels::config::{DataType, Element};
use kernelcheck_kernels::gemm::DynGemmKernel;
use kernelcheck_kernels::registry::KernelRegistry;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

/// Emits concrete cases into a host and returns how many it registered.
pub type SweepGenerator = Box<dyn FnOnce(&mut dyn TestHost) -> Result<usize>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Empty,
    Populated,
    Drained(ExecutionMode),
}

struct Entry {
    name: String,
    generator: SweepGenerator,
}

pub struct SweepRegistry {
    state: RegistryState,
    quick: Vec<Entry>,
    exhaustive: Vec<Entry>,
}

impl Default for SweepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepRegistry {
    pub fn new() -> Self {
        Self {
            state: RegistryState::Empty,
            quick: Vec::new(),
            exhaustive: Vec::new(),
        }
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// Number of generators waiting in a catalog.
    pub fn len(&self, mode: ExecutionMode) -> usize {
        match mode {
            ExecutionMode::Quick => self.quick.len(),
            ExecutionMode::Exhaustive => self.exhaustive.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quick.is_empty() && self.exhaustive.is_empty()
    }

    pub fn register<G>(
        &mut self,
        mode: ExecutionMode,
        name: impl Into<String>,
        generator: G,
    ) -> Result<()>
    where
        G: FnOnce(&mut dyn TestHost) -> Result<usize> + 'static,
    {
        let name = name.into();
        if let RegistryState::Drained(_) = self.state {
            bail!("cannot register generator {name} after the registry was drained");
        }
        let catalog = match mode {
            ExecutionMode::Quick => &mut self.quick,
            ExecutionMode::Exhaustive => &mut self.exhaustive,
        };
        catalog.push(Entry {
            name,
            generator: Box::new(generator),
        });
        self.state = RegistryState::Populated;
        Ok(())
    }

    /// Invokes every generator of `mode` against `host` and returns the total
    /// number of cases registered. The other catalog is discarded.
    pub fn drain(&mut self, mode: ExecutionMode, host: &mut dyn TestHost) -> Result<usize> {
        if let RegistryState::Drained(previous) = self.state {
            bail!("sweep registry was already drained for the {previous} catalog");
        }
        self.state = RegistryState::Drained(mode);

        let selected = match mode {
            ExecutionMode::Quick => mem::take(&mut self.quick),
            ExecutionMode::Exhaustive => mem::take(&mut self.exhaustive),
        };
        self.quick.clear();
        self.exhaustive.clear();

        let mut total = 0;
        for Entry { name, generator } in selected {
            let mut counter = CountingHost {
                inner: &mut *host,
                registered: 0,
            };
            let reported = generator(&mut counter)?;
            ensure!(
                reported == counter.registered,
                "generator {name} reported {reported} cases but registered {}",
                counter.registered
            );
            debug!(generator = %name, cases = reported, "generator drained");
            total += reported;
        }
        info!(mode = %mode, cases = total, "sweep registry drained");
        Ok(total)
    }
}

struct CountingHost<'a> {
    inner: &'a mut dyn TestHost,
    registered: usize,
}

impl TestHost for CountingHost<'_> {
    fn register_case(&mut self, suite: &str, name: &str, body: CaseBody) -> Result<()> {
        self.inner.register_case(suite, name, body)?;
        self.registered += 1;
        Ok(())
    }
}

/// Registers every generator the configured kernel library supports into
/// both catalogs.
pub fn register_all(
    registry: &mut SweepRegistry,
    kernels: &KernelRegistry,
    config: &HarnessConfig,
    env: &Arc<ExecutionEnv>,
) -> Result<()> {
    let name = config.kernel.as_str();
    for mode in ExecutionMode::ALL {
        for dtype in &config.dtypes {
            match dtype {
                DataType::F32 => match kernels.find_sgemm_kernel(name) {
                    Some(kernel) => register_gemm(registry, mode, kernel, env)?,
                    None => debug!(kernel = name, "no single precision gemm"),
                },
                DataType::F64 => match kernels.find_dgemm_kernel(name) {
                    Some(kernel) => register_gemm(registry, mode, kernel, env)?,
                    None => debug!(kernel = name, "no double precision gemm"),
                },
            }
        }

        if !config.checks_conv2d() {
            continue;
        }
        let Some(kernel) = kernels.find_conv2d_kernel(name) else {
            debug!(kernel = name, "no conv2d");
            continue;
        };
        for layout in ConvLayout::ALL {
            for threading in env.threadings() {
                let sweep = ConvSweep::new(kernel.clone(), layout, mode, threading, env.clone());
                let generator_name = sweep.suite().to_string();
                registry.register(mode, generator_name, move |host| sweep.register(host))?;
            }
        }
    }
    Ok(())
}

fn register_gemm<T: Element>(
    registry: &mut SweepRegistry,
    mode: ExecutionMode,
    kernel: DynGemmKernel<T>,
    env: &Arc<ExecutionEnv>,
) -> Result<()> {
    for path in GemmPath::ALL {
        for threading in env.threadings() {
            let sweep = GemmSweep::new(kernel.clone(), path, mode, threading, env.clone());
            let generator_name = format!("{}/{}", sweep.suite(), threading.label());
            registry.register(mode, generator_name, move |host| sweep.register(host))?;
        }
    }
    Ok(())
}
