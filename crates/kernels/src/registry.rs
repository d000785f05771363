//! Kernel registry for lookup and discovery.

use crate::config::DataType;
use crate::conv::{Conv2dKernel, DirectConv2d, DynConv2dKernel};
use crate::gemm::{BlockedGemm, DynGemmKernel, GemmKernel};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Kernel libraries the harness can check, keyed by name.
///
/// A library may provide any subset of single precision GEMM, double
/// precision GEMM and Conv2D; lookups by name return `None` for the rest.
#[derive(Default, Clone)]
pub struct KernelRegistry {
    sgemm_kernels: Vec<DynGemmKernel<f32>>,
    dgemm_kernels: Vec<DynGemmKernel<f64>>,
    conv2d_kernels: Vec<DynConv2dKernel>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_kernels() -> Self {
        let mut registry = Self::new();
        registry.register_gemm_kernel(BlockedGemm::new());
        registry.register_conv2d_kernel(DirectConv2d::new());
        registry
    }

    /// Registers one library for both GEMM element types.
    pub fn register_gemm_kernel<K>(&mut self, kernel: K)
    where
        K: GemmKernel<f32> + GemmKernel<f64> + 'static,
    {
        let kernel = Arc::new(kernel);
        debug!(kernel = GemmKernel::<f32>::name(&*kernel), "registered gemm library");
        self.sgemm_kernels.push(kernel.clone());
        self.dgemm_kernels.push(kernel);
    }

    pub fn register_sgemm_kernel<K>(&mut self, kernel: K)
    where
        K: GemmKernel<f32> + 'static,
    {
        self.sgemm_kernels.push(Arc::new(kernel));
    }

    pub fn register_dgemm_kernel<K>(&mut self, kernel: K)
    where
        K: GemmKernel<f64> + 'static,
    {
        self.dgemm_kernels.push(Arc::new(kernel));
    }

    pub fn register_conv2d_kernel<K>(&mut self, kernel: K)
    where
        K: Conv2dKernel + 'static,
    {
        debug!(kernel = kernel.name(), "registered conv2d library");
        self.conv2d_kernels.push(Arc::new(kernel));
    }

    pub fn sgemm_kernels(&self) -> &[DynGemmKernel<f32>] {
        &self.sgemm_kernels
    }

    pub fn dgemm_kernels(&self) -> &[DynGemmKernel<f64>] {
        &self.dgemm_kernels
    }

    pub fn conv2d_kernels(&self) -> &[DynConv2dKernel] {
        &self.conv2d_kernels
    }

    pub fn find_sgemm_kernel(&self, name: &str) -> Option<DynGemmKernel<f32>> {
        self.sgemm_kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }

    pub fn find_dgemm_kernel(&self, name: &str) -> Option<DynGemmKernel<f64>> {
        self.dgemm_kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }

    pub fn find_conv2d_kernel(&self, name: &str) -> Option<DynConv2dKernel> {
        self.conv2d_kernels
            .iter()
            .find(|kernel| kernel.name() == name)
            .map(Arc::clone)
    }

    /// Whether a library named `name` provides GEMM for `dtype`.
    pub fn has_gemm(&self, name: &str, dtype: DataType) -> bool {
        match dtype {
            DataType::F32 => self.find_sgemm_kernel(name).is_some(),
            DataType::F64 => self.find_dgemm_kernel(name).is_some(),
        }
    }

    /// Every library name known to the registry, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let names: BTreeSet<&'static str> = self
            .sgemm_kernels
            .iter()
            .map(|k| k.name())
            .chain(self.dgemm_kernels.iter().map(|k| k.name()))
            .chain(self.conv2d_kernels.iter().map(|k| k.name()))
            .collect();
        names.into_iter().collect()
    }
}
