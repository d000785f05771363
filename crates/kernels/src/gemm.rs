//! GEMM kernel interface and the built-in blocked implementation.

use crate::config::{Element, GemmProblem, Transpose};
use crate::utils::validate_gemm_operands;
use anyhow::{anyhow, ensure, Result};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::mem;
use std::sync::Arc;

/// Entry points a GEMM library exposes to the harness.
///
/// Operands are row-major with explicit leading dimensions taken from the
/// problem; nothing is allocated on the caller's behalf.
pub trait GemmKernel<T: Element>: Send + Sync {
    fn name(&self) -> &'static str;

    fn gemm(
        &self,
        problem: &GemmProblem,
        a: &[T],
        b: &[T],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) -> Result<()>;

    /// Bytes of scratch [`pack_b`](Self::pack_b) needs for an `n x k` operand.
    fn pack_b_size(&self, n: usize, k: usize) -> usize;

    fn pack_b(
        &self,
        trans_b: Transpose,
        n: usize,
        k: usize,
        b: &[T],
        ldb: usize,
        packed: &mut [u8],
    ) -> Result<()>;

    /// Same as [`gemm`](Self::gemm) with `op(B)` taken from [`pack_b`](Self::pack_b) output.
    fn gemm_packed(
        &self,
        problem: &GemmProblem,
        a: &[T],
        packed_b: &[u8],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) -> Result<()>;
}

pub type DynGemmKernel<T> = Arc<dyn GemmKernel<T>>;

/// Packs `op(B)` into column panels and walks them in tiles of output columns.
///
/// Each output element is reduced over `k` in order and finished with
/// `c * beta + sum * alpha`, which is the rounding contract the oracle checks.
pub struct BlockedGemm {
    tile_n: usize,
}

impl BlockedGemm {
    pub fn new() -> Self {
        Self { tile_n: 16 }
    }

    pub fn with_tile_n(tile_n: usize) -> Self {
        Self {
            tile_n: tile_n.max(1),
        }
    }

    fn run_panels<T: Element>(
        &self,
        problem: &GemmProblem,
        a: &[T],
        panel: &[T],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) {
        let GemmProblem {
            trans_a,
            m,
            n,
            k,
            lda,
            ldc,
            ..
        } = *problem;
        if m == 0 || n == 0 {
            return;
        }

        let alpha = problem.alpha_as::<T>();
        let beta = problem.beta_as::<T>();
        let tile_n = self.tile_n;

        let row_kernel = |(i, c_row): (usize, &mut [T])| {
            for j0 in (0..n).step_by(tile_n) {
                for j in j0..(j0 + tile_n).min(n) {
                    let column = &panel[j * k..(j + 1) * k];
                    let mut sum = T::zero();
                    for (p, &b_pj) in column.iter().enumerate() {
                        let a_ip = if trans_a.is_transposed() {
                            a[p * lda + i]
                        } else {
                            a[i * lda + p]
                        };
                        sum = sum + b_pj * a_ip;
                    }
                    c_row[j] = c_row[j] * beta + sum * alpha;
                }
            }
        };

        match pool {
            Some(pool) => pool.install(|| {
                c.par_chunks_mut(ldc)
                    .take(m)
                    .enumerate()
                    .for_each(&row_kernel)
            }),
            None => c.chunks_mut(ldc).take(m).enumerate().for_each(&row_kernel),
        }
    }
}

impl Default for BlockedGemm {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> GemmKernel<T> for BlockedGemm {
    fn name(&self) -> &'static str {
        "blocked"
    }

    fn gemm(
        &self,
        problem: &GemmProblem,
        a: &[T],
        b: &[T],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        validate_gemm_operands(problem, a.len(), b.len(), c.len())?;
        let mut panel = vec![T::zero(); problem.n * problem.k];
        pack_panel(problem.trans_b, problem.n, problem.k, b, problem.ldb, &mut panel);
        self.run_panels(problem, a, &panel, c, pool);
        Ok(())
    }

    fn pack_b_size(&self, n: usize, k: usize) -> usize {
        n * k * mem::size_of::<T>()
    }

    fn pack_b(
        &self,
        trans_b: Transpose,
        n: usize,
        k: usize,
        b: &[T],
        ldb: usize,
        packed: &mut [u8],
    ) -> Result<()> {
        let size = GemmKernel::<T>::pack_b_size(self, n, k);
        ensure!(
            packed.len() >= size,
            "packed buffer holds {} bytes, {} required",
            packed.len(),
            size
        );
        let panel: &mut [T] = bytemuck::try_cast_slice_mut(&mut packed[..size])
            .map_err(|e| anyhow!("packed buffer unusable for {}: {e:?}", T::DTYPE.name()))?;
        pack_panel(trans_b, n, k, b, ldb, panel);
        Ok(())
    }

    fn gemm_packed(
        &self,
        problem: &GemmProblem,
        a: &[T],
        packed_b: &[u8],
        c: &mut [T],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        validate_gemm_operands(problem, a.len(), problem.b_len(), c.len())?;
        let size = GemmKernel::<T>::pack_b_size(self, problem.n, problem.k);
        ensure!(packed_b.len() >= size, "packed operand too small");
        let panel: &[T] = bytemuck::try_cast_slice(&packed_b[..size])
            .map_err(|e| anyhow!("packed operand unusable for {}: {e:?}", T::DTYPE.name()))?;
        self.run_panels(problem, a, panel, c, pool);
        Ok(())
    }
}

/// Lays `op(B)` out column by column: `panel[j * k + p] = op(B)[p][j]`.
fn pack_panel<T: Element>(
    trans_b: Transpose,
    n: usize,
    k: usize,
    b: &[T],
    ldb: usize,
    panel: &mut [T],
) {
    for j in 0..n {
        for p in 0..k {
            panel[j * k + p] = if trans_b.is_transposed() {
                b[j * ldb + p]
            } else {
                b[p * ldb + j]
            };
        }
    }
}
