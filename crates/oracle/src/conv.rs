use anyhow::Result;
use kernelcheck_kernels::config::Conv2dProblem;
use kernelcheck_kernels::utils::validate_conv_operands;

/// Direct grouped convolution over NCHW input and OIHW filters.
///
/// Every output element starts from its filter's bias and accumulates
/// `input * filter` over the dilated, strided window. Window taps that land
/// in the padding are skipped, which is the same as multiplying by zero for
/// finite data.
pub fn reference_conv2d(
    problem: &Conv2dProblem,
    input: &[f32],
    filter: &[f32],
    bias: &[f32],
    output: &mut [f32],
) -> Result<()> {
    validate_conv_operands(problem, input.len(), filter.len(), bias.len(), output.len())?;
    let Some((out_h, out_w)) = problem.output_size() else {
        return Ok(());
    };

    let p = problem;
    let in_h = p.input_height as isize;
    let in_w = p.input_width as isize;
    let in_plane = p.input_height * p.input_width;
    let out_plane = out_h * out_w;
    let kernel_size = p.kernel_size();

    for n in 0..p.batch {
        for g in 0..p.groups {
            let image = (n * p.groups + g) * p.input_channels * in_plane;
            for f in 0..p.filter_count {
                let filter_index = g * p.filter_count + f;
                let weights = filter_index * p.input_channels * kernel_size;
                let plane = (n * p.total_filters() + filter_index) * out_plane;

                for oy in 0..out_h {
                    for ox in 0..out_w {
                        let mut acc = bias[filter_index];
                        for c in 0..p.input_channels {
                            for ky in 0..p.kernel_height {
                                let iy = (oy * p.stride[0] + ky * p.dilation[0]) as isize
                                    - p.padding[0] as isize;
                                if iy < 0 || iy >= in_h {
                                    continue;
                                }
                                for kx in 0..p.kernel_width {
                                    let ix = (ox * p.stride[1] + kx * p.dilation[1]) as isize
                                        - p.padding[1] as isize;
                                    if ix < 0 || ix >= in_w {
                                        continue;
                                    }
                                    let pixel = iy as usize * p.input_width + ix as usize;
                                    let tap = (c * p.kernel_height + ky) * p.kernel_width + kx;
                                    acc += input[image + c * in_plane + pixel] * filter[weights + tap];
                                }
                            }
                        }
                        output[plane + oy * out_w + ox] = acc;
                    }
                }
            }
        }
    }
    Ok(())
}
