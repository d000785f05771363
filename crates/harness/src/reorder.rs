//! Lossless moves between natural and block-channel tensor layouts.
//!
//! Natural activations are `[N][C][H][W]`, natural filters `[F][C][KH][KW]`.
//! Writing into the blocked form zeroes the padded lanes first.

use kernelcheck_kernels::layout::{BlockedActivation, BlockedFilter};

pub fn activation_to_blocked(
    layout: &BlockedActivation,
    channels: usize,
    natural: &[f32],
    blocked: &mut [f32],
) {
    let plane = layout.height * layout.width;
    blocked[..layout.len()].fill(0.0);
    for n in 0..layout.batch {
        for c in 0..channels {
            let source = &natural[(n * channels + c) * plane..][..plane];
            for y in 0..layout.height {
                for x in 0..layout.width {
                    blocked[layout.offset(n, c, y, x)] = source[y * layout.width + x];
                }
            }
        }
    }
}

/// Inverse of [`activation_to_blocked`]; padded lanes are dropped.
pub fn activation_from_blocked(
    layout: &BlockedActivation,
    channels: usize,
    blocked: &[f32],
    natural: &mut [f32],
) {
    let plane = layout.height * layout.width;
    for n in 0..layout.batch {
        for c in 0..channels {
            let target = &mut natural[(n * channels + c) * plane..][..plane];
            for y in 0..layout.height {
                for x in 0..layout.width {
                    target[y * layout.width + x] = blocked[layout.offset(n, c, y, x)];
                }
            }
        }
    }
}

pub fn filter_to_blocked(
    layout: &BlockedFilter,
    filters: usize,
    channels: usize,
    natural: &[f32],
    blocked: &mut [f32],
) {
    let taps = layout.kernel_height * layout.kernel_width;
    blocked[..layout.len()].fill(0.0);
    for f in 0..filters {
        for c in 0..channels {
            let source = &natural[(f * channels + c) * taps..][..taps];
            for ky in 0..layout.kernel_height {
                for kx in 0..layout.kernel_width {
                    blocked[layout.offset(f, c, ky, kx)] = source[ky * layout.kernel_width + kx];
                }
            }
        }
    }
}

pub fn filter_from_blocked(
    layout: &BlockedFilter,
    filters: usize,
    channels: usize,
    blocked: &[f32],
    natural: &mut [f32],
) {
    let taps = layout.kernel_height * layout.kernel_width;
    for f in 0..filters {
        for c in 0..channels {
            let target = &mut natural[(f * channels + c) * taps..][..taps];
            for ky in 0..layout.kernel_height {
                for kx in 0..layout.kernel_width {
                    target[ky * layout.kernel_width + kx] = blocked[layout.offset(f, c, ky, kx)];
                }
            }
        }
    }
}

/// Copies the bias and zeroes the lanes up to the padded filter count.
pub fn bias_to_blocked(bias: &[f32], blocked: &mut [f32]) {
    let (head, tail) = blocked.split_at_mut(bias.len());
    head.copy_from_slice(bias);
    tail.fill(0.0);
}

pub fn bias_from_blocked(blocked: &[f32], bias: &mut [f32]) {
    bias.copy_from_slice(&blocked[..bias.len()]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i % 47) as f32 - 23.0).collect()
    }

    #[test]
    fn activation_round_trip_pads_with_zero() {
        let (batch, channels, height, width) = (2, 5, 3, 4);
        let layout = BlockedActivation::new(4, batch, channels, height, width);
        let natural = ramp(batch * channels * height * width);

        let mut blocked = vec![f32::NAN; layout.len()];
        activation_to_blocked(&layout, channels, &natural, &mut blocked);
        for n in 0..batch {
            for c in channels..layout.channels {
                assert_eq!(blocked[layout.offset(n, c, 2, 3)], 0.0);
            }
        }

        let mut back = vec![0.0; natural.len()];
        activation_from_blocked(&layout, channels, &blocked, &mut back);
        assert_eq!(back, natural);
    }

    #[test]
    fn filter_round_trip() {
        let (filters, channels) = (3, 9);
        let layout = BlockedFilter::new(8, filters, channels, 2, 3);
        let natural = ramp(filters * channels * 6);

        let mut blocked = vec![f32::NAN; layout.len()];
        filter_to_blocked(&layout, filters, channels, &natural, &mut blocked);
        assert!(blocked.iter().all(|v| !v.is_nan()));

        let mut back = vec![0.0; natural.len()];
        filter_from_blocked(&layout, filters, channels, &blocked, &mut back);
        assert_eq!(back, natural);
    }

    #[test]
    fn bias_is_zero_padded() {
        let mut blocked = [9.0f32; 8];
        bias_to_blocked(&[1.0, -2.0, 3.0], &mut blocked);
        assert_eq!(blocked, [1.0, -2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let mut bias = [0.0; 3];
        bias_from_blocked(&blocked, &mut bias);
        assert_eq!(bias, [1.0, -2.0, 3.0]);
    }
}
