//! Conv2D kernel interface and the built-in direct implementation.

use crate::config::Conv2dProblem;
use crate::layout::{BlockedActivation, BlockedFilter};
use crate::utils::validate_conv_operands;
use anyhow::{bail, ensure, Result};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

/// Entry points a convolution library exposes to the harness.
pub trait Conv2dKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plain layout: NCHW input and output, OIHW filter, one bias per filter.
    fn conv2d(
        &self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()>;

    /// Channel block of the block layout, `None` if the library has no such path.
    fn nchwc_block_size(&self) -> Option<usize>;

    /// Block layout: tensors arranged as described in [`crate::layout`].
    fn conv2d_nchwc(
        &self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()>;
}

pub type DynConv2dKernel = Arc<dyn Conv2dKernel>;

pub struct DirectConv2d {
    block_size: usize,
}

impl DirectConv2d {
    pub fn new() -> Self {
        Self { block_size: 8 }
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }
}

impl Default for DirectConv2d {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps an output coordinate and kernel tap to an input coordinate, if it
/// lands inside the unpadded input.
#[inline]
fn source_index(
    out: usize,
    tap: usize,
    stride: usize,
    dilation: usize,
    pad: usize,
    extent: usize,
) -> Option<usize> {
    (out * stride + tap * dilation)
        .checked_sub(pad)
        .filter(|&pos| pos < extent)
}

fn for_each_plane<F>(output: &mut [f32], plane: usize, pool: Option<&ThreadPool>, body: F)
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    if plane == 0 {
        return;
    }
    match pool {
        Some(pool) => pool.install(|| {
            output
                .par_chunks_mut(plane)
                .enumerate()
                .for_each(|(q, chunk)| body(q, chunk))
        }),
        None => output
            .chunks_mut(plane)
            .enumerate()
            .for_each(|(q, chunk)| body(q, chunk)),
    }
}

impl Conv2dKernel for DirectConv2d {
    fn name(&self) -> &'static str {
        "blocked"
    }

    fn conv2d(
        &self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        validate_conv_operands(problem, input.len(), filter.len(), bias.len(), output.len())?;
        let Some((out_h, out_w)) = problem.output_size() else {
            bail!("no output for {problem}");
        };

        let p = *problem;
        let source_y = |oy: usize, ky: usize| {
            source_index(oy, ky, p.stride[0], p.dilation[0], p.padding[0], p.input_height)
        };
        let source_x = |ox: usize, kx: usize| {
            source_index(ox, kx, p.stride[1], p.dilation[1], p.padding[1], p.input_width)
        };
        let in_plane = p.input_height * p.input_width;
        let kernel_size = p.kernel_size();
        let output = &mut output[..p.output_len()];

        for_each_plane(output, out_h * out_w, pool, |q, plane| {
            let f = q % p.filter_count;
            let g = (q / p.filter_count) % p.groups;
            let n = q / p.total_filters();
            let filter_index = g * p.filter_count + f;
            let weights = &filter[filter_index * p.input_channels * kernel_size..];
            let image = &input[(n * p.groups + g) * p.input_channels * in_plane..];

            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = bias[filter_index];
                    for c in 0..p.input_channels {
                        for ky in 0..p.kernel_height {
                            let Some(iy) = source_y(oy, ky) else {
                                continue;
                            };
                            for kx in 0..p.kernel_width {
                                let Some(ix) = source_x(ox, kx) else {
                                    continue;
                                };
                                acc += image[c * in_plane + iy * p.input_width + ix]
                                    * weights[(c * p.kernel_height + ky) * p.kernel_width + kx];
                            }
                        }
                    }
                    plane[oy * out_w + ox] = acc;
                }
            }
        });
        Ok(())
    }

    fn nchwc_block_size(&self) -> Option<usize> {
        Some(self.block_size)
    }

    fn conv2d_nchwc(
        &self,
        problem: &Conv2dProblem,
        input: &[f32],
        filter: &[f32],
        bias: &[f32],
        output: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        ensure!(problem.groups == 1, "block layout supports a single group");
        let Some((out_h, out_w)) = problem.output_size() else {
            bail!("no output for {problem}");
        };

        let p = *problem;
        let source_y = |oy: usize, ky: usize| {
            source_index(oy, ky, p.stride[0], p.dilation[0], p.padding[0], p.input_height)
        };
        let source_x = |ox: usize, kx: usize| {
            source_index(ox, kx, p.stride[1], p.dilation[1], p.padding[1], p.input_width)
        };
        let block = self.block_size;
        let src = BlockedActivation::new(
            block,
            p.batch,
            p.input_channels,
            p.input_height,
            p.input_width,
        );
        let dst = BlockedActivation::new(block, p.batch, p.filter_count, out_h, out_w);
        let weights = BlockedFilter::new(
            block,
            p.filter_count,
            p.input_channels,
            p.kernel_height,
            p.kernel_width,
        );

        for (name, needed, got) in [
            ("input", src.len(), input.len()),
            ("filter", weights.len(), filter.len()),
            ("bias", weights.filters, bias.len()),
            ("output", dst.len(), output.len()),
        ] {
            ensure!(got >= needed, "blocked {name} needs {needed} elements, got {got}");
        }

        let output = &mut output[..dst.len()];
        let in_blocks = src.channels / block;
        let out_blocks = dst.channels / block;

        for_each_plane(output, out_h * out_w * block, pool, |q, chunk| {
            let n = q / out_blocks;
            let fb = q % out_blocks;
            let mut acc = vec![0.0f32; block];

            for oy in 0..out_h {
                for ox in 0..out_w {
                    acc.copy_from_slice(&bias[fb * block..(fb + 1) * block]);
                    for cb in 0..in_blocks {
                        for ky in 0..p.kernel_height {
                            let Some(iy) = source_y(oy, ky) else {
                                continue;
                            };
                            for kx in 0..p.kernel_width {
                                let Some(ix) = source_x(ox, kx) else {
                                    continue;
                                };
                                let pixel = src.offset(n, cb * block, iy, ix);
                                let tile = weights.offset(fb * block, cb * block, ky, kx);
                                for bi in 0..block {
                                    let x = input[pixel + bi];
                                    let row = &filter[tile + bi * block..tile + (bi + 1) * block];
                                    for (lane, &w) in acc.iter_mut().zip(row) {
                                        *lane += x * w;
                                    }
                                }
                            }
                        }
                    }
                    let base = (oy * out_w + ox) * block;
                    chunk[base..base + block].copy_from_slice(&acc);
                }
            }
        });
        Ok(())
    }
}
