//! Per-suite fixtures that own the guarded buffers a case runs in.

use crate::adapter::{ConvAdapter, ConvLayout, GemmAdapter, GemmPath};
use crate::case::{run_segment, CaseOutcome};
use crate::verifier::{compare_conv2d, compare_gemm};
use anyhow::{Context, Result};
use kernelcheck_guard::GuardedBuffer;
use kernelcheck_kernels::config::{Conv2dProblem, Element, GemmProblem};
use kernelcheck_kernels::conv::DynConv2dKernel;
use kernelcheck_kernels::gemm::DynGemmKernel;
use kernelcheck_oracle::{reference_conv2d, reference_gemm};
use rayon::ThreadPool;

/// Value both outputs start from before the kernel and the oracle write.
const GEMM_OUTPUT_FILL: f32 = -0.5;

pub struct GemmTester<T: Element> {
    adapter: GemmAdapter<T>,
    a: GuardedBuffer<T>,
    b: GuardedBuffer<T>,
    c: GuardedBuffer<T>,
    c_reference: GuardedBuffer<T>,
}

impl<T: Element> GemmTester<T> {
    pub fn new(kernel: DynGemmKernel<T>, path: GemmPath) -> Self {
        Self {
            adapter: GemmAdapter::new(kernel, path),
            a: GuardedBuffer::new(),
            b: GuardedBuffer::new(),
            c: GuardedBuffer::new(),
            c_reference: GuardedBuffer::new(),
        }
    }

    pub fn path(&self) -> GemmPath {
        self.adapter.path()
    }

    pub fn test(&mut self, problem: &GemmProblem, pool: Option<&ThreadPool>) -> Result<CaseOutcome> {
        if !self.adapter.supports(problem) {
            return Ok(CaseOutcome::skipped("B cannot be packed when N or K is zero"));
        }

        let a: &[T] = self.a.acquire(problem.a_len(), false);
        let b: &[T] = self.b.acquire(problem.b_len(), false);
        let c = self.c.acquire(problem.c_len(), false);
        let c_reference = self.c_reference.acquire(problem.c_len(), false);
        let fill = T::from_coefficient(GEMM_OUTPUT_FILL);
        c.fill(fill);
        c_reference.fill(fill);

        self.adapter
            .run(problem, a, b, c, pool)
            .with_context(|| format!("{} gemm failed on {problem}", self.adapter.kernel_name()))?;
        reference_gemm(problem, a, b, c_reference)?;

        Ok(match compare_gemm(problem, c_reference, c)? {
            Some(mismatch) => CaseOutcome::Failed(mismatch),
            None => CaseOutcome::Passed,
        })
    }

    pub fn test_all<I>(&mut self, problems: I, pool: Option<&ThreadPool>) -> Result<CaseOutcome>
    where
        I: IntoIterator<Item = GemmProblem>,
    {
        run_segment(problems, |problem| self.test(problem, pool))
    }
}

pub struct Conv2dTester {
    adapter: ConvAdapter,
    input: GuardedBuffer<f32>,
    filter: GuardedBuffer<f32>,
    bias: GuardedBuffer<f32>,
    output: GuardedBuffer<f32>,
    output_reference: GuardedBuffer<f32>,
}

impl Conv2dTester {
    pub fn new(kernel: DynConv2dKernel, layout: ConvLayout) -> Self {
        Self {
            adapter: ConvAdapter::new(kernel, layout),
            input: GuardedBuffer::new(),
            filter: GuardedBuffer::new(),
            bias: GuardedBuffer::new(),
            output: GuardedBuffer::new(),
            output_reference: GuardedBuffer::new(),
        }
    }

    pub fn layout(&self) -> ConvLayout {
        self.adapter.layout()
    }

    pub fn test(
        &mut self,
        problem: &Conv2dProblem,
        pool: Option<&ThreadPool>,
    ) -> Result<CaseOutcome> {
        if problem.output_size().is_none() {
            return Ok(CaseOutcome::skipped("kernel does not fit the padded input"));
        }
        if !self.adapter.supports(problem) {
            return Ok(CaseOutcome::skipped("block layout needs a single group"));
        }

        let input: &[f32] = self.input.acquire(problem.input_len(), false);
        let filter: &[f32] = self.filter.acquire(problem.filter_len(), false);
        let bias: &[f32] = self.bias.acquire(problem.bias_len(), false);
        let output = self.output.acquire(problem.output_len(), false);
        let output_reference = self.output_reference.acquire(problem.output_len(), false);

        self.adapter
            .run(problem, input, filter, bias, output, pool)
            .with_context(|| format!("{} conv2d failed on {problem}", self.adapter.kernel_name()))?;
        reference_conv2d(problem, input, filter, bias, output_reference)?;

        Ok(match compare_conv2d(problem, output_reference, output)? {
            Some(mismatch) => CaseOutcome::Failed(mismatch),
            None => CaseOutcome::Passed,
        })
    }

    pub fn test_all<I>(&mut self, problems: I, pool: Option<&ThreadPool>) -> Result<CaseOutcome>
    where
        I: IntoIterator<Item = Conv2dProblem>,
    {
        run_segment(problems, |problem| self.test(problem, pool))
    }
}
