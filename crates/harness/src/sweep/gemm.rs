//! GEMM parameter sweeps.

use crate::adapter::GemmPath;
use crate::case::TestHost;
use crate::config::ExecutionMode;
use crate::env::{ExecutionEnv, Threading};
use crate::tester::GemmTester;
use anyhow::Result;
use kernelcheck_kernels::config::{DataType, Element, GemmProblem, Transpose};
use kernelcheck_kernels::gemm::DynGemmKernel;
use parking_lot::Mutex;
use std::sync::Arc;

/// Coefficients crossed for `alpha` and `beta` in the quick catalog.
const QUICK_COEFFICIENTS: [f32; 3] = [0.0, -0.0, 1.0];
/// Coefficients crossed for `alpha` and `beta` in the exhaustive catalog.
const MULTIPLIERS: [f32; 6] = [0.0, -0.0, 0.25, -0.5, 1.0, -1.0];
/// Depths walked for every blocked `M x N` shape.
const BLOCK_DEPTHS: [usize; 22] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 20, 32, 48, 64, 118, 119, 120, 121, 122, 160, 240, 320,
];
/// `(dM, dN)` added to each blocked shape to hit partial tiles.
const EDGE_OFFSETS: [(usize, usize); 15] = [
    (0, 0),
    (1, 0),
    (0, 1),
    (1, 1),
    (3, 2),
    (4, 0),
    (0, 4),
    (4, 4),
    (3, 7),
    (8, 0),
    (0, 8),
    (12, 12),
    (13, 0),
    (0, 15),
    (15, 15),
];

/// One GEMM generator: an element type, a packing path, a catalog and a
/// threading variant, sharing a single fixture across all of its cases.
pub struct GemmSweep<T: Element> {
    suite: String,
    mode: ExecutionMode,
    threading: Threading,
    env: Arc<ExecutionEnv>,
    tester: Arc<Mutex<GemmTester<T>>>,
}

impl<T: Element> GemmSweep<T> {
    pub fn new(
        kernel: DynGemmKernel<T>,
        path: GemmPath,
        mode: ExecutionMode,
        threading: Threading,
        env: Arc<ExecutionEnv>,
    ) -> Self {
        let prefix = match T::DTYPE {
            DataType::F32 => "Sgemm",
            DataType::F64 => "Dgemm",
        };
        Self {
            suite: format!("{prefix}{}_{}", path.label(), mode.label()),
            mode,
            threading,
            env,
            tester: Arc::new(Mutex::new(GemmTester::new(kernel, path))),
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

    /// Square sizes up to 15, powers of two, a few large and transformer
    /// shapes, and the signed-zero coefficient grid.
    pub fn register_quick(&self, host: &mut dyn TestHost) -> Result<usize> {
        let mut count = 0;
        let sizes = (0..16)
            .chain((4..8).map(|shift| 1usize << shift))
            .chain([256, 288]);
        for size in sizes {
            count += self.register_shape(host, size, size, size, 1.0, 0.0)?;
        }

        count += self.register_shape(host, 128, 3072, 768, 1.0, 0.0)?;
        count += self.register_shape(host, 128, 768, 3072, 1.0, 0.0)?;

        for alpha in QUICK_COEFFICIENTS {
            for beta in QUICK_COEFFICIENTS {
                count += self.register_shape(host, 12, 20, 7, alpha, beta)?;
            }
        }
        Ok(count)
    }

    /// Registers one case per transpose combination of an `m x n x k` shape.
    pub fn register_shape(
        &self,
        host: &mut dyn TestHost,
        m: usize,
        n: usize,
        k: usize,
        alpha: f32,
        beta: f32,
    ) -> Result<usize> {
        let mut count = 0;
        for problem in transposed(m, n, k, alpha, beta) {
            let name = format!("{}/{problem}", self.threading.label());
            let tester = Arc::clone(&self.tester);
            let env = Arc::clone(&self.env);
            let threading = self.threading;
            host.register_case(
                &self.suite,
                &name,
                Box::new(move || {
                    let mut fixture = tester.lock();
                    fixture.test(&problem, threading.pool(&env))
                }),
            )?;
            count += 1;
        }
        Ok(count)
    }

    /// One case per outer-loop value; each case walks its dense inner ranges.
    pub fn register_exhaustive(&self, host: &mut dyn TestHost) -> Result<usize> {
        let mut count = 0;
        for n in 1..128 {
            count += self.register_segment(host, format!("Thin/N:{n}"), move || thin_segment(n))?;
        }
        for alpha in MULTIPLIERS {
            for beta in MULTIPLIERS {
                for m in (16..160).step_by(32) {
                    count += self.register_segment(
                        host,
                        format!("Blocks/Alpha:{alpha}/Beta:{beta}/M:{m}"),
                        move || block_segment(m, alpha, beta),
                    )?;
                }
            }
        }
        for m in 0..160 {
            count += self.register_segment(host, format!("Cube/M:{m}"), move || cube_segment(m))?;
        }
        for m in (160..320).step_by(24) {
            count +=
                self.register_segment(host, format!("Large/M:{m}"), move || large_segment(m))?;
        }
        Ok(count)
    }

    fn register_segment<F, I>(
        &self,
        host: &mut dyn TestHost,
        label: String,
        problems: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> I + Send + 'static,
        I: Iterator<Item = GemmProblem>,
    {
        let name = format!("{}/{label}", self.threading.label());
        let tester = Arc::clone(&self.tester);
        let env = Arc::clone(&self.env);
        let threading = self.threading;
        host.register_case(
            &self.suite,
            &name,
            Box::new(move || {
                let mut fixture = tester.lock();
                fixture.test_all(problems(), threading.pool(&env))
            }),
        )?;
        Ok(1)
    }
}

/// `NN`, `NT`, `TN`, `TT` in that order.
pub fn transposed(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    beta: f32,
) -> impl Iterator<Item = GemmProblem> {
    Transpose::ALL.into_iter().flat_map(move |trans_a| {
        Transpose::ALL
            .into_iter()
            .map(move |trans_b| GemmProblem::new(trans_a, trans_b, m, n, k, alpha, beta))
    })
}

fn coefficient_pairs() -> impl Iterator<Item = (f32, f32)> {
    MULTIPLIERS
        .into_iter()
        .flat_map(|alpha| MULTIPLIERS.into_iter().map(move |beta| (alpha, beta)))
}

/// `1 x n x K` and `n x 1 x K` for every depth below 128.
fn thin_segment(n: usize) -> impl Iterator<Item = GemmProblem> {
    (1..128).flat_map(move |k| {
        coefficient_pairs().flat_map(move |(alpha, beta)| {
            transposed(1, n, k, alpha, beta).chain(transposed(n, 1, k, alpha, beta))
        })
    })
}

fn block_segment(m: usize, alpha: f32, beta: f32) -> impl Iterator<Item = GemmProblem> {
    (16..160).step_by(32).flat_map(move |n| {
        BLOCK_DEPTHS.into_iter().flat_map(move |k| {
            EDGE_OFFSETS
                .into_iter()
                .flat_map(move |(dm, dn)| transposed(m + dm, n + dn, k, alpha, beta))
        })
    })
}

fn cube_segment(m: usize) -> impl Iterator<Item = GemmProblem> {
    (0..160).flat_map(move |n| (0..160).flat_map(move |k| transposed(m, n, k, 1.0, 0.0)))
}

fn large_segment(m: usize) -> impl Iterator<Item = GemmProblem> {
    (112..320).step_by(24).flat_map(move |n| {
        (0..16)
            .chain((16..160).step_by(32))
            .flat_map(move |k| transposed(m, n, k, 1.0, 0.0))
    })
}
