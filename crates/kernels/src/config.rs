//! Problem descriptions shared by kernels, oracles and the sweep.

use kernelcheck_guard::GuardElement;
use num_traits::{Float, NumCast};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    F32,
    F64,
}

impl DataType {
    pub fn element_size_bytes(&self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }
}

/// Floating-point element a kernel can be checked with.
pub trait Element:
    GuardElement + Float + NumCast + fmt::Display + fmt::Debug + Send + Sync
{
    const DTYPE: DataType;

    /// Raw IEEE bits, widened so every element type compares the same way.
    fn to_bits_u64(self) -> u64;

    /// Converts a coefficient given in single precision. Lossless for f32 and f64.
    fn from_coefficient(value: f32) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::nan)
    }
}

impl Element for f32 {
    const DTYPE: DataType = DataType::F32;

    fn to_bits_u64(self) -> u64 {
        <u64 as From<u32>>::from(self.to_bits())
    }
}

impl Element for f64 {
    const DTYPE: DataType = DataType::F64;

    fn to_bits_u64(self) -> u64 {
        self.to_bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transpose {
    No,
    Yes,
}

impl Transpose {
    pub fn from_flag(transposed: bool) -> Self {
        if transposed {
            Transpose::Yes
        } else {
            Transpose::No
        }
    }

    pub fn is_transposed(&self) -> bool {
        matches!(self, Transpose::Yes)
    }

    pub const ALL: [Transpose; 2] = [Transpose::No, Transpose::Yes];
}

/// `C := alpha * op(A) * op(B) + beta * C` over row-major operands.
///
/// `op(A)` is `m x k` and `op(B)` is `k x n`. The leading dimensions are the
/// tight ones for the stored (possibly transposed) operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GemmProblem {
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
    pub alpha: f32,
    pub beta: f32,
}

impl GemmProblem {
    pub fn new(
        trans_a: Transpose,
        trans_b: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        beta: f32,
    ) -> Self {
        Self {
            trans_a,
            trans_b,
            m,
            n,
            k,
            lda: if trans_a.is_transposed() { m } else { k },
            ldb: if trans_b.is_transposed() { k } else { n },
            ldc: n,
            alpha,
            beta,
        }
    }

    pub fn a_len(&self) -> usize {
        self.m * self.k
    }

    pub fn b_len(&self) -> usize {
        self.k * self.n
    }

    pub fn c_len(&self) -> usize {
        self.m * self.n
    }

    pub fn alpha_as<T: Element>(&self) -> T {
        T::from_coefficient(self.alpha)
    }

    pub fn beta_as<T: Element>(&self) -> T {
        T::from_coefficient(self.beta)
    }
}

impl fmt::Display for GemmProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/M:{}xN:{}xK:{}/Alpha:{}/Beta:{}",
            if self.trans_a.is_transposed() { "TransA" } else { "A" },
            if self.trans_b.is_transposed() { "TransB" } else { "B" },
            self.m,
            self.n,
            self.k,
            self.alpha,
            self.beta
        )
    }
}

/// Grouped 2D convolution over NCHW activations and OIHW filters.
///
/// Channel counts are per group: the input holds `groups * input_channels`
/// channels and the output `groups * filter_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conv2dProblem {
    pub batch: usize,
    pub groups: usize,
    pub input_channels: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub filter_count: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    /// Top, left, bottom, right.
    pub padding: [usize; 4],
    /// Height, width.
    pub dilation: [usize; 2],
    /// Height, width.
    pub stride: [usize; 2],
}

impl Conv2dProblem {
    pub fn new(
        batch: usize,
        groups: usize,
        input_channels: usize,
        input_size: (usize, usize),
        filter_count: usize,
        kernel_size: (usize, usize),
    ) -> Self {
        Self {
            batch,
            groups,
            input_channels,
            input_height: input_size.0,
            input_width: input_size.1,
            filter_count,
            kernel_height: kernel_size.0,
            kernel_width: kernel_size.1,
            padding: [0; 4],
            dilation: [1, 1],
            stride: [1, 1],
        }
    }

    pub fn with_padding(mut self, padding: [usize; 4]) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_dilation(mut self, dilation: [usize; 2]) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn with_stride(mut self, stride: [usize; 2]) -> Self {
        self.stride = stride;
        self
    }

    /// Output height and width, or `None` when the dilated kernel does not fit
    /// inside the padded input even once.
    pub fn output_size(&self) -> Option<(usize, usize)> {
        let height = output_extent(
            self.input_height,
            self.padding[0] + self.padding[2],
            self.kernel_height,
            self.dilation[0],
            self.stride[0],
        )?;
        let width = output_extent(
            self.input_width,
            self.padding[1] + self.padding[3],
            self.kernel_width,
            self.dilation[1],
            self.stride[1],
        )?;
        Some((height, width))
    }

    pub fn total_input_channels(&self) -> usize {
        self.groups * self.input_channels
    }

    pub fn total_filters(&self) -> usize {
        self.groups * self.filter_count
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_height * self.kernel_width
    }

    pub fn input_len(&self) -> usize {
        self.batch * self.total_input_channels() * self.input_height * self.input_width
    }

    pub fn filter_len(&self) -> usize {
        self.total_filters() * self.input_channels * self.kernel_size()
    }

    pub fn bias_len(&self) -> usize {
        self.total_filters()
    }

    pub fn output_len(&self) -> usize {
        self.output_size()
            .map(|(h, w)| self.batch * self.total_filters() * h * w)
            .unwrap_or(0)
    }
}

fn output_extent(
    input: usize,
    padding: usize,
    kernel: usize,
    dilation: usize,
    stride: usize,
) -> Option<usize> {
    if kernel == 0 || dilation == 0 || stride == 0 {
        return None;
    }
    let span = dilation * (kernel - 1) + 1;
    let padded = input + padding;
    if padded < span {
        return None;
    }
    Some((padded - span) / stride + 1)
}

impl fmt::Display for Conv2dProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "B{}/G{}/Cpg{}/Fpg{}/H{}/W{}/KH{}/KW{}/Pad{},{},{},{}/Dilation{},{}/Stride{},{}",
            self.batch,
            self.groups,
            self.input_channels,
            self.filter_count,
            self.input_height,
            self.input_width,
            self.kernel_height,
            self.kernel_width,
            self.padding[0],
            self.padding[1],
            self.padding[2],
            self.padding[3],
            self.dilation[0],
            self.dilation[1],
            self.stride[0],
            self.stride[1]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_bits_are_widened_without_change() {
        assert_eq!((-0.0f32).to_bits_u64(), 0x8000_0000);
        assert_eq!(1.0f32.to_bits_u64(), 0x3f80_0000);
        assert_eq!((-0.0f64).to_bits_u64(), 0x8000_0000_0000_0000);
    }

    #[test]
    fn gemm_leading_dimensions_follow_transposition() {
        let p = GemmProblem::new(Transpose::No, Transpose::No, 3, 5, 7, 1.0, 0.0);
        assert_eq!((p.lda, p.ldb, p.ldc), (7, 5, 5));
        let p = GemmProblem::new(Transpose::Yes, Transpose::Yes, 3, 5, 7, 1.0, 0.0);
        assert_eq!((p.lda, p.ldb, p.ldc), (3, 7, 5));
    }

    #[test]
    fn gemm_name_keeps_negative_zero() {
        let p = GemmProblem::new(Transpose::Yes, Transpose::No, 4, 4, 4, -0.0, 1.0);
        assert_eq!(p.to_string(), "TransA/B/M:4xN:4xK:4/Alpha:-0/Beta:1");
    }

    #[test]
    fn conv_output_size() {
        let p = Conv2dProblem::new(1, 1, 16, (8, 8), 32, (3, 3));
        assert_eq!(p.output_size(), Some((6, 6)));
        assert_eq!(p.with_stride([2, 2]).output_size(), Some((3, 3)));
        assert_eq!(p.with_dilation([2, 2]).output_size(), Some((4, 4)));
        assert_eq!(p.with_padding([1, 1, 1, 1]).output_size(), Some((8, 8)));

        let too_small = Conv2dProblem::new(1, 1, 16, (2, 2), 32, (3, 3));
        assert_eq!(too_small.output_size(), None);
        assert_eq!(too_small.output_len(), 0);
    }

    #[test]
    fn conv_name() {
        let p = Conv2dProblem::new(1, 1, 16, (4, 4), 32, (3, 3)).with_padding([1, 0, 1, 0]);
        assert_eq!(
            p.to_string(),
            "B1/G1/Cpg16/Fpg32/H4/W4/KH3/KW3/Pad1,0,1,0/Dilation1,1/Stride1,1"
        );
    }
}
