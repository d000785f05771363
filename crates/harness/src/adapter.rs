//! Uniform invocation of the kernel under test.

use crate::reorder::{
    activation_from_blocked, activation_to_blocked, bias_to_blocked, filter_to_blocked,
};
use anyhow::{bail, ensure, Result};
use kernelcheck_guard::GuardedBuffer;
use kernelcheck_kernels::config::{Conv2dProblem, Element, GemmProblem};
use kernelcheck_kernels::conv::DynConv2dKernel;
use kernelcheck_kernels::gemm::DynGemmKernel;
use kernelcheck_kernels::layout::{BlockedActivation, BlockedFilter};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

/// How `B` reaches the GEMM kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GemmPath {
    Direct,
    /// Pack `B` into guarded scratch first, then call the packed entry.
    Packed,
}

impl GemmPath {
    pub const ALL: [GemmPath; 2] = [GemmPath::Direct, GemmPath::Packed];

    pub fn label(&self) -> &'static str {
        match self {
            GemmPath::Direct => "NoPack",
            GemmPath::Packed => "Pack",
        }
    }
}

pub struct GemmAdapter<T: Element> {
    kernel: DynGemmKernel<T>,
    path: GemmPath,
    packed_b: GuardedBuffer<u8>,
}

impl<T: Element> GemmAdapter<T> {
    pub fn new(kernel: DynGemmKernel<T>, path: GemmPath) -> Self {
        Self {
            kernel,
            path,
            packed_b: GuardedBuffer::new(),
        }
    }

    pub fn path(&self) -> GemmPath {
        self.path
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Packing is undefined for an empty `B`.
    pub fn supports(&self, problem: &GemmProblem) -> bool {
        match self.path {
            GemmPath::Direct => true,
            GemmPath::Packed => problem.n > 0 && problem.k > 0,
        }
    }

    pub fn run(
        &mut self,
        problem: &GemmProblem,
        a: &[T],
        b: &[T],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        match self.path {
            GemmPath::Direct => self.kernel.gemm(problem, a, b, c, pool),
            GemmPath::Packed => {
                ensure!(self.supports(problem), "cannot pack B for {problem}");
                let size = self.kernel.pack_b_size(problem.n, problem.k);
                let packed = self.packed_b.acquire(size, true);
                self.kernel
                    .pack_b(problem.trans_b, problem.n, problem.k, b, problem.ldb, packed)?;
                self.kernel.gemm_packed(problem, a, packed, c, pool)
            }
        }
    }
}

/// Tensor layout the Conv2D kernel is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvLayout {
    Natural,
    Nchwc,
}

impl ConvLayout {
    pub const ALL: [ConvLayout; 2] = [ConvLayout::Natural, ConvLayout::Nchwc];

    /// Suite prefix.
    pub fn label(&self) -> &'static str {
        match self {
            ConvLayout::Natural => "Conv2d",
            ConvLayout::Nchwc => "Conv2dNchwc",
        }
    }
}

/// Calls the Conv2D kernel in its natural or block layout. Operands and
/// results always cross this boundary in natural layout.
pub struct ConvAdapter {
    kernel: DynConv2dKernel,
    layout: ConvLayout,
    blocked_input: GuardedBuffer<f32>,
    blocked_filter: GuardedBuffer<f32>,
    blocked_bias: GuardedBuffer<f32>,
    blocked_output: GuardedBuffer<f32>,
}

impl ConvAdapter {
    pub fn new(kernel: DynConv2dKernel, layout: ConvLayout) -> Self {
        Self {
            kernel,
            layout,
            blocked_input: GuardedBuffer::new(),
            blocked_filter: GuardedBuffer::new(),
            blocked_bias: GuardedBuffer::new(),
            blocked_output: GuardedBuffer::new(),
        }
    }

    pub fn layout(&self) -> ConvLayout {
        self.layout
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// The block layout only covers single-group convolutions.
    pub fn supports(&self, problem: &Conv2dProblem) -> bool {
        match self.layout {
            ConvLayout::Natural => true,
            ConvLayout::Nchwc => problem.groups == 1 && self.kernel.nchwc_block_size().is_some(),
        }
    }

    pub fn run(
        &mut self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        match self.layout {
            ConvLayout::Natural => self.kernel.conv2d(problem, input, filter, bias, output, pool),
            ConvLayout::Nchwc => self.run_blocked(problem, input, filter, bias, output, pool),
        }
    }

    fn run_blocked(
        &mut self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        let Some(block) = self.kernel.nchwc_block_size() else {
            bail!("{} has no block layout", self.kernel.name());
        };
        ensure!(problem.groups == 1, "block layout needs a single group");
        let Some((out_h, out_w)) = problem.output_size() else {
            bail!("no output for {problem}");
        };

        let src = BlockedActivation::new(
            block,
            problem.batch,
            problem.input_channels,
            problem.input_height,
            problem.input_width,
        );
        let dst = BlockedActivation::new(block, problem.batch, problem.filter_count, out_h, out_w);
        let weights = BlockedFilter::new(
            block,
            problem.filter_count,
            problem.input_channels,
            problem.kernel_height,
            problem.kernel_width,
        );

        let blocked_input = self.blocked_input.acquire(src.len(), true);
        activation_to_blocked(&src, problem.input_channels, input, blocked_input);

        let blocked_filter = self.blocked_filter.acquire(weights.len(), true);
        filter_to_blocked(
            &weights,
            problem.filter_count,
            problem.input_channels,
            filter,
            blocked_filter,
        );

        let blocked_bias = self.blocked_bias.acquire(weights.filters, true);
        bias_to_blocked(&bias[..problem.filter_count], blocked_bias);

        let blocked_output = self.blocked_output.acquire(dst.len(), true);
        self.kernel.conv2d_nchwc(
            problem,
            blocked_input,
            blocked_filter,
            blocked_bias,
            blocked_output,
            pool,
        )?;

        activation_from_blocked(&dst, problem.filter_count, blocked_output, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelcheck_kernels::config::Transpose;
    use kernelcheck_kernels::conv::DirectConv2d;
    use kernelcheck_kernels::gemm::BlockedGemm;
    use std::sync::Arc;

    #[test]
    fn packed_path_needs_nonempty_b() {
        let adapter = GemmAdapter::<f32>::new(Arc::new(BlockedGemm::new()), GemmPath::Packed);
        let empty_k = GemmProblem::new(Transpose::No, Transpose::No, 4, 4, 0, 1.0, 0.0);
        let empty_n = GemmProblem::new(Transpose::No, Transpose::No, 4, 0, 4, 1.0, 0.0);
        let empty_m = GemmProblem::new(Transpose::No, Transpose::No, 0, 4, 4, 1.0, 0.0);
        assert!(!adapter.supports(&empty_k));
        assert!(!adapter.supports(&empty_n));
        assert!(adapter.supports(&empty_m));

        let direct = GemmAdapter::<f32>::new(Arc::new(BlockedGemm::new()), GemmPath::Direct);
        assert!(direct.supports(&empty_k));
    }

    #[test]
    fn packed_and_direct_paths_agree() {
        let problem = GemmProblem::new(Transpose::Yes, Transpose::No, 7, 5, 3, 1.0, 0.0);
        let a: Vec<f64> = (0..problem.a_len()).map(|v| v as f64 - 10.0).collect();
        let b: Vec<f64> = (0..problem.b_len()).map(|v| 3.0 - v as f64).collect();
        let mut outputs = Vec::new();
        for path in GemmPath::ALL {
            let mut adapter = GemmAdapter::<f64>::new(Arc::new(BlockedGemm::new()), path);
            let mut c = vec![-0.5; problem.c_len()];
            adapter.run(&problem, &a, &b, &mut c, None).expect("gemm");
            outputs.push(c);
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn block_layout_matches_natural_layout() {
        let problem = Conv2dProblem::new(2, 1, 5, (6, 7), 11, (3, 2))
            .with_padding([1, 0, 1, 1])
            .with_stride([1, 2]);
        let input: Vec<f32> = (0..problem.input_len()).map(|i| (i % 47) as f32 - 23.0).collect();
        let filter: Vec<f32> = (0..problem.filter_len()).map(|i| (i % 13) as f32 - 6.0).collect();
        let bias: Vec<f32> = (0..problem.bias_len()).map(|i| i as f32).collect();

        let mut outputs = Vec::new();
        for layout in ConvLayout::ALL {
            let kernel = Arc::new(DirectConv2d::with_block_size(4));
            let mut adapter = ConvAdapter::new(kernel, layout);
            assert!(adapter.supports(&problem));
            let mut output = vec![f32::NAN; problem.output_len()];
            adapter
                .run(&problem, &input, &filter, &bias, &mut output, None)
                .expect("conv");
            outputs.push(output);
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn block_layout_skips_grouped_problems() {
        let adapter = ConvAdapter::new(Arc::new(DirectConv2d::new()), ConvLayout::Nchwc);
        let grouped = Conv2dProblem::new(1, 4, 1, (8, 8), 1, (3, 3));
        assert!(!adapter.supports(&grouped));
    }
}
