//! Shared argument checks for kernel implementations.

use crate::config::{Conv2dProblem, GemmProblem};
use anyhow::{bail, ensure, Result};

pub fn validate_gemm_operands(
    problem: &GemmProblem,
    a_len: usize,
    b_len: usize,
    c_len: usize,
) -> Result<()> {
    let (a_rows, a_cols) = if problem.trans_a.is_transposed() {
        (problem.k, problem.m)
    } else {
        (problem.m, problem.k)
    };
    let (b_rows, b_cols) = if problem.trans_b.is_transposed() {
        (problem.n, problem.k)
    } else {
        (problem.k, problem.n)
    };

    check_matrix("A", a_rows, a_cols, problem.lda, a_len)?;
    check_matrix("B", b_rows, b_cols, problem.ldb, b_len)?;
    check_matrix("C", problem.m, problem.n, problem.ldc, c_len)?;
    Ok(())
}

fn check_matrix(name: &str, rows: usize, cols: usize, ld: usize, len: usize) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    if ld < cols {
        bail!("{name}: leading dimension {ld} smaller than {cols} columns");
    }
    let needed = (rows - 1) * ld + cols;
    ensure!(
        len >= needed,
        "{name}: {rows}x{cols} with ld {ld} needs {needed} elements, got {len}"
    );
    Ok(())
}

pub fn validate_conv_operands(
    problem: &Conv2dProblem,
    input_len: usize,
    filter_len: usize,
    bias_len: usize,
    output_len: usize,
) -> Result<()> {
    ensure!(problem.groups > 0, "group count must be positive");
    ensure!(
        problem.output_size().is_some(),
        "kernel {}x{} does not fit the padded {}x{} input",
        problem.kernel_height,
        problem.kernel_width,
        problem.input_height,
        problem.input_width
    );
    for (name, expected, got) in [
        ("input", problem.input_len(), input_len),
        ("filter", problem.filter_len(), filter_len),
        ("bias", problem.bias_len(), bias_len),
        ("output", problem.output_len(), output_len),
    ] {
        ensure!(got >= expected, "{name}: need {expected} elements, got {got}");
    }
    Ok(())
}
