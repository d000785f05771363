//! Conv2D parameter sweeps.

use crate::adapter::ConvLayout;
use crate::case::TestHost;
use crate::config::ExecutionMode;
use crate::env::{ExecutionEnv, Threading};
use crate::tester::Conv2dTester;
use anyhow::Result;
use kernelcheck_kernels::config::Conv2dProblem;
use kernelcheck_kernels::conv::DynConv2dKernel;
use parking_lot::Mutex;
use std::sync::Arc;

/// Channel and filter counts of the small-shape grid.
const GRID_CHANNELS: [usize; 3] = [32, 14, 1];
/// Input heights and widths of the small-shape grid.
const GRID_SIZES: [usize; 4] = [53, 11, 5, 1];
const GRID_KERNELS: [usize; 4] = [1, 2, 3, 5];

pub struct ConvSweep {
    suite: String,
    mode: ExecutionMode,
    threading: Threading,
    env: Arc<ExecutionEnv>,
    tester: Arc<Mutex<Conv2dTester>>,
}

impl ConvSweep {
    pub fn new(
        kernel: DynConv2dKernel,
        layout: ConvLayout,
        mode: ExecutionMode,
        threading: Threading,
        env: Arc<ExecutionEnv>,
    ) -> Self {
        Self {
            suite: format!("{}_{}_{}", layout.label(), mode.label(), threading.label()),
            mode,
            threading,
            env,
            tester: Arc::new(Mutex::new(Conv2dTester::new(kernel, layout))),
        }
    }

    pub fn suite(&self) -> &str {
        &self.suite
    }

    pub fn register(&self, host: &mut dyn TestHost) -> Result<usize> {
        match self.mode {
            ExecutionMode::Quick => self.register_quick(host),
            ExecutionMode::Exhaustive => self.register_exhaustive(host),
        }
    }

    /// Seven 16 to 32 channel configurations for every power-of-two input
    /// size up to 128.
    pub fn register_quick(&self, host: &mut dyn TestHost) -> Result<usize> {
        let mut count = 0;
        for size in (0..8).map(|shift| 1usize << shift) {
            let base = Conv2dProblem::new(1, 1, 16, (size, size), 32, (3, 3));
            let mut problems = vec![
                base,
                base.with_stride([2, 2]),
                base.with_dilation([2, 2]),
                base.with_padding([1, 1, 1, 1]),
                Conv2dProblem::new(1, 1, 16, (size, size), 32, (1, 1)),
            ];
            // A unit size turns the tall and wide kernels into the 1x1 case.
            if size > 1 {
                problems.push(Conv2dProblem::new(1, 1, 16, (size, size), 32, (size, 1)));
                problems.push(Conv2dProblem::new(1, 1, 16, (size, size), 32, (1, size)));
            }
            for problem in problems {
                count += self.register_problem(host, problem)?;
            }
        }
        Ok(count)
    }

    pub fn register_problem(
        &self,
        host: &mut dyn TestHost,
        problem: Conv2dProblem,
    ) -> Result<usize> {
        let tester = Arc::clone(&self.tester);
        let env = Arc::clone(&self.env);
        let threading = self.threading;
        host.register_case(
            &self.suite,
            &problem.to_string(),
            Box::new(move || {
                let mut fixture = tester.lock();
                fixture.test(&problem, threading.pool(&env))
            }),
        )?;
        Ok(1)
    }

    pub fn register_exhaustive(&self, host: &mut dyn TestHost) -> Result<usize> {
        let mut count = 0;
        for groups in [16, 32, 64, 128] {
            count += self.register_segment(host, format!("Depthwise/G{groups}"), move || {
                depthwise_segment(groups)
            })?;
        }
        for filters in 1..128 {
            count += self.register_segment(host, format!("FilterCount/F{filters}"), move || {
                filter_count_segment(filters)
            })?;
        }
        for height in 1..=32 {
            count += self.register_segment(host, format!("TallKernel/KH{height}"), move || {
                tall_kernel_segment(height)
            })?;
        }
        for batch in 1..64 {
            count += self.register_segment(host, format!("Batch/B{batch}"), move || {
                vec![Conv2dProblem::new(batch, 1, 64, (11, 11), 128, (3, 3))]
            })?;
        }
        for channels in GRID_CHANNELS {
            for height in GRID_SIZES {
                for width in GRID_SIZES {
                    count += self.register_segment(
                        host,
                        format!("Grid/C{channels}/H{height}/W{width}"),
                        move || grid_segment(channels, height, width),
                    )?;
                }
            }
        }
        Ok(count)
    }

    fn register_segment<F>(
        &self,
        host: &mut dyn TestHost,
        label: String,
        problems: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Vec<Conv2dProblem> + Send + 'static,
    {
        let tester = Arc::clone(&self.tester);
        let env = Arc::clone(&self.env);
        let threading = self.threading;
        host.register_case(
            &self.suite,
            &label,
            Box::new(move || {
                let mut fixture = tester.lock();
                fixture.test_all(problems(), threading.pool(&env))
            }),
        )?;
        Ok(1)
    }
}

fn depthwise_segment(groups: usize) -> Vec<Conv2dProblem> {
    let base = Conv2dProblem::new(1, groups, 1, (28, 28), 1, (3, 3));
    vec![
        base,
        base.with_stride([2, 2]),
        base.with_dilation([2, 2]),
        base.with_padding([1, 1, 1, 1]),
        Conv2dProblem::new(12, groups, 1, (11, 11), 1, (3, 3)).with_padding([1, 1, 1, 1]),
    ]
}

fn filter_count_segment(filters: usize) -> Vec<Conv2dProblem> {
    vec![
        Conv2dProblem::new(1, 1, 3, (34, 34), filters, (3, 3)),
        Conv2dProblem::new(1, 1, 16, (34, 34), filters, (3, 3)),
        Conv2dProblem::new(1, 1, 16, (34, 34), filters, (1, 1)),
    ]
}

fn tall_kernel_segment(height: usize) -> Vec<Conv2dProblem> {
    let grouped = Conv2dProblem::new(4, 18, 1, (32, 89), 48, (height, 89));
    vec![
        grouped,
        grouped.with_padding([1, 1, 1, 1]),
        Conv2dProblem::new(4, 18, 2, (32, 89), 48, (height, 89)),
        Conv2dProblem::new(2, 1, 8, (32, 89), 24, (height, 89)),
    ]
}

/// Every kernel, padding, dilation and stride combination for one input shape.
fn grid_segment(channels: usize, height: usize, width: usize) -> Vec<Conv2dProblem> {
    let mut problems = Vec::new();
    for filters in GRID_CHANNELS {
        for kernel_height in GRID_KERNELS {
            for kernel_width in GRID_KERNELS {
                for pads in 0..16usize {
                    let padding = [pads & 1, (pads >> 1) & 1, (pads >> 2) & 1, (pads >> 3) & 1];
                    for dilation in [[1, 1], [1, 2], [2, 1], [2, 2]] {
                        for stride in [[1, 1], [1, 2], [2, 1], [2, 2]] {
                            problems.push(
                                Conv2dProblem::new(
                                    1,
                                    1,
                                    channels,
                                    (height, width),
                                    filters,
                                    (kernel_height, kernel_width),
                                )
                                .with_padding(padding)
                                .with_dilation(dilation)
                                .with_stride(stride),
                            );
                        }
                    }
                }
            }
        }
    }
    problems
}
