use anyhow::Result;
use kernelcheck_kernels::config::{Element, GemmProblem, Transpose};
use kernelcheck_kernels::utils::validate_gemm_operands;

/// `C := alpha * op(A) * op(B) + beta * C`, one output element at a time.
///
/// The existing `C` value is always scaled and added, even for `beta == 0`,
/// so a `-0.0` cell times a zero `beta` keeps its IEEE sign semantics.
pub fn reference_gemm<T: Element>(
    problem: &GemmProblem,
    a: &[T],
    b: &[T],
    c: &mut [T],
) -> Result<()> {
    validate_gemm_operands(problem, a.len(), b.len(), c.len())?;

    let GemmProblem {
        trans_a,
        trans_b,
        m,
        n,
        k,
        lda,
        ldb,
        ldc,
        ..
    } = *problem;
    let alpha = problem.alpha_as::<T>();
    let beta = problem.beta_as::<T>();

    // (start of row i, step along k) for op(A); (start of column j, step along k) for op(B).
    let a_walk = |i: usize| match trans_a {
        Transpose::No => (i * lda, 1),
        Transpose::Yes => (i, lda),
    };
    let b_walk = |j: usize| match trans_b {
        Transpose::No => (j, ldb),
        Transpose::Yes => (j * ldb, 1),
    };

    for i in 0..m {
        let (a_start, a_step) = a_walk(i);
        for j in 0..n {
            let (b_start, b_step) = b_walk(j);
            let mut sum = T::zero();
            for p in 0..k {
                sum = sum + b[b_start + p * b_step] * a[a_start + p * a_step];
            }
            let cell = &mut c[i * ldc + j];
            *cell = *cell * beta + sum * alpha;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp<T: Element>(len: usize, offset: i32) -> Vec<T> {
        (0..len)
            .map(|i| T::from_ramp((i as i32 + offset) % 47 - 23))
            .collect()
    }

    fn bits<T: Element>(values: &[T]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits_u64()).collect()
    }

    #[test]
    fn alpha_zero_beta_one_leaves_c_untouched() {
        for (m, n, k) in [(0, 0, 0), (1, 1, 1), (3, 5, 7), (8, 1, 16), (4, 4, 0)] {
            for trans_a in Transpose::ALL {
                for trans_b in Transpose::ALL {
                    let problem = GemmProblem::new(trans_a, trans_b, m, n, k, 0.0, 1.0);
                    let a = ramp::<f32>(problem.a_len(), 0);
                    let b = ramp::<f32>(problem.b_len(), 11);
                    let mut c = vec![-0.5f32; problem.c_len()];
                    let before = bits(&c);

                    reference_gemm(&problem, &a, &b, &mut c).expect("oracle");
                    assert_eq!(bits(&c), before, "{problem}");
                }
            }
        }
    }

    #[test]
    fn alpha_zero_on_negative_zero_takes_the_sign_of_the_sum() {
        // -0 * 1 + sum * 0: the zero product carries the sign of the sum.
        let problem = GemmProblem::new(Transpose::No, Transpose::No, 1, 1, 1, 0.0, 1.0);
        let mut c = [-0.0f32];
        reference_gemm(&problem, &[2.0], &[3.0], &mut c).expect("oracle");
        assert_eq!(c[0].to_bits(), 0.0f32.to_bits());

        let mut c = [-0.0f32];
        reference_gemm(&problem, &[-2.0], &[3.0], &mut c).expect("oracle");
        assert_eq!(c[0].to_bits(), (-0.0f32).to_bits());
    }

    #[test]
    fn beta_zero_on_negative_zero_gives_signed_zero() {
        // (-0 * 0) + (0 * -0) is -0, while (-0 * 0) + (0 * 0) is +0.
        let problem = GemmProblem::new(Transpose::No, Transpose::No, 1, 1, 1, -0.0, 0.0);
        let mut c = [-0.0f64];
        reference_gemm(&problem, &[0.0], &[3.0], &mut c).expect("oracle");
        assert!(c[0] == 0.0 && c[0].is_sign_negative());

        let problem = GemmProblem::new(Transpose::No, Transpose::No, 1, 1, 1, 0.0, 0.0);
        let mut c = [-0.0f32];
        reference_gemm(&problem, &[0.0], &[3.0], &mut c).expect("oracle");
        assert!(c[0] == 0.0 && c[0].is_sign_positive());
    }

    #[test]
    fn beta_zero_does_not_skip_nan() {
        let problem = GemmProblem::new(Transpose::No, Transpose::No, 1, 1, 1, 1.0, 0.0);
        let mut c = [f32::NAN];
        reference_gemm(&problem, &[2.0], &[3.0], &mut c).expect("oracle");
        assert!(c[0].is_nan());
    }

    #[test]
    fn transposed_operands_agree() {
        // op(A) = [[1, 2], [3, 4]], op(B) = [[5, 6], [7, 8]]
        let expected = [19.0, 22.0, 43.0, 50.0];
        let a_plain = [1.0, 2.0, 3.0, 4.0];
        let a_trans = [1.0, 3.0, 2.0, 4.0];
        let b_plain = [5.0, 6.0, 7.0, 8.0];
        let b_trans = [5.0, 7.0, 6.0, 8.0];
        for trans_a in Transpose::ALL {
            for trans_b in Transpose::ALL {
                let problem = GemmProblem::new(trans_a, trans_b, 2, 2, 2, 1.0, 0.0);
                let a = if trans_a.is_transposed() { a_trans } else { a_plain };
                let b = if trans_b.is_transposed() { b_trans } else { b_plain };
                let mut c = [0.0f64; 4];
                reference_gemm(&problem, &a, &b, &mut c).expect("oracle");
                assert_eq!(c, expected, "{problem}");
            }
        }
    }

    #[test]
    fn short_output_is_rejected() {
        let problem = GemmProblem::new(Transpose::No, Transpose::No, 2, 2, 1, 1.0, 0.0);
        let mut c = [0.0f32; 3];
        assert!(reference_gemm(&problem, &[1.0; 2], &[1.0; 2], &mut c).is_err());
    }
}
