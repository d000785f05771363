//! Element-wise comparison of kernel output against the oracle.

use anyhow::{ensure, Result};
use kernelcheck_kernels::config::{Conv2dProblem, Element, GemmProblem};
use ndarray::{ArrayView, ArrayView2, ArrayView4, Dimension, IntoDimension};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First element where the kernel disagreed with the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Parameter set that produced the difference.
    pub config: String,
    /// Flat offset into the output.
    pub index: usize,
    /// `[row, col]` for GEMM, `[batch, channel, y, x]` for Conv2D.
    pub coordinate: Vec<usize>,
    pub expected: f64,
    pub actual: f64,
    pub expected_bits: u64,
    pub actual_bits: u64,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: diff @{:?} f={}: expected {} ({:#x}), got {} ({:#x})",
            self.config,
            self.coordinate,
            self.index,
            self.expected,
            self.expected_bits,
            self.actual,
            self.actual_bits
        )
    }
}

/// Bitwise GEMM comparison: `0.0` and `-0.0` are different results.
pub fn compare_gemm<T: Element>(
    problem: &GemmProblem,
    expected: &[T],
    actual: &[T],
) -> Result<Option<Mismatch>> {
    let len = problem.c_len();
    ensure!(
        expected.len() >= len && actual.len() >= len,
        "outputs shorter than {len} elements"
    );
    let shape = (problem.m, problem.n);
    let expected = ArrayView2::from_shape(shape, &expected[..len])?;
    let actual = ArrayView2::from_shape(shape, &actual[..len])?;
    Ok(first_difference(expected, actual, |e, a| {
        e.to_bits_u64() == a.to_bits_u64()
    })
    .map(|d| d.into_mismatch(problem.to_string())))
}

/// Exact IEEE comparison of Conv2D outputs in natural layout.
pub fn compare_conv2d(
    problem: &Conv2dProblem,
    expected: &[f32],
    actual: &[f32],
) -> Result<Option<Mismatch>> {
    let Some((height, width)) = problem.output_size() else {
        return Ok(None);
    };
    let len = problem.output_len();
    ensure!(
        expected.len() >= len && actual.len() >= len,
        "outputs shorter than {len} elements"
    );
    let shape = (problem.batch, problem.total_filters(), height, width);
    let expected = ArrayView4::from_shape(shape, &expected[..len])?;
    let actual = ArrayView4::from_shape(shape, &actual[..len])?;
    Ok(first_difference(expected, actual, |e, a| e == a)
        .map(|d| d.into_mismatch(problem.to_string())))
}

struct Difference<T> {
    index: usize,
    coordinate: Vec<usize>,
    expected: T,
    actual: T,
}

impl<T: Element> Difference<T> {
    fn into_mismatch(self, config: String) -> Mismatch {
        Mismatch {
            config,
            index: self.index,
            coordinate: self.coordinate,
            expected: self.expected.to_f64().unwrap_or(f64::NAN),
            actual: self.actual.to_f64().unwrap_or(f64::NAN),
            expected_bits: self.expected.to_bits_u64(),
            actual_bits: self.actual.to_bits_u64(),
        }
    }
}

fn first_difference<T, D, F>(
    expected: ArrayView<'_, T, D>,
    actual: ArrayView<'_, T, D>,
    same: F,
) -> Option<Difference<T>>
where
    T: Copy,
    D: Dimension,
    F: Fn(T, T) -> bool,
{
    expected
        .indexed_iter()
        .zip(actual.iter())
        .enumerate()
        .find(|(_, ((_, e), a))| !same(**e, **a))
        .map(|(index, ((pattern, &e), &a))| Difference {
            index,
            coordinate: pattern.into_dimension().slice().to_vec(),
            expected: e,
            actual: a,
        })
}
