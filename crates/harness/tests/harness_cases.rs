use anyhow::Result;
use kernelcheck_harness::sweep::GemmSweep;
use kernelcheck_harness::{
    CaseBody, CaseOutcome, CaseRunner, Conv2dTester, ConvLayout, ExecutionEnv, ExecutionMode,
    GemmPath, GemmTester, HarnessConfig, HarnessSession, RegistryState, SweepRegistry, TestHost,
    Threading,
};
use kernelcheck_kernels::config::{Conv2dProblem, GemmProblem, Transpose};
use kernelcheck_kernels::conv::{Conv2dKernel, DirectConv2d};
use kernelcheck_kernels::gemm::{BlockedGemm, GemmKernel};
use kernelcheck_kernels::registry::KernelRegistry;
use rayon::ThreadPool;
use std::sync::Arc;

#[derive(Default)]
struct CollectingHost {
    names: Vec<String>,
}

impl TestHost for CollectingHost {
    fn register_case(&mut self, suite: &str, name: &str, _body: CaseBody) -> Result<()> {
        self.names.push(format!("{suite}.{name}"));
        Ok(())
    }
}

/// Correct everywhere except the last output element, which is nudged by one.
struct LastElementOff {
    inner: BlockedGemm,
}

impl LastElementOff {
    fn nudge(c: &mut [f32], problem: &GemmProblem) {
        if let Some(last) = c[..problem.c_len()].last_mut() {
            *last += 1.0;
        }
    }
}

impl GemmKernel<f32> for LastElementOff {
    fn name(&self) -> &'static str {
        "last-element-off"
    }

    fn gemm(
        &self,
        problem: &GemmProblem,
        a: &[f32],
        b: &[f32],
        c: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        self.inner.gemm(problem, a, b, c, pool)?;
        Self::nudge(c, problem);
        Ok(())
    }

    fn pack_b_size(&self, n: usize, k: usize) -> usize {
        GemmKernel::<f32>::pack_b_size(&self.inner, n, k)
    }

    fn pack_b(
        &self,
        trans_b: Transpose,
        n: usize,
        k: usize,
        b: &[f32],
        ldb: usize,
        packed: &mut [u8],
    ) -> Result<()> {
        GemmKernel::<f32>::pack_b(&self.inner, trans_b, n, k, b, ldb, packed)
    }

    fn gemm_packed(
        &self,
        problem: &GemmProblem,
        a: &[f32],
        packed_b: &[u8],
        c: &mut [f32],
        pool: Option<&ThreadPool>,
    ) -> Result<()> {
        self.inner.gemm_packed(problem, a, packed_b, c, pool)?;
        Self::nudge(c, problem);
        Ok(())
    }
}

/// Drops the bias of every output, which the ramp data makes visible.
struct ForgetsBias;

impl Conv2dKernel for ForgetsBias {
    fn name(&self) -> &'static str {
        "forgets-bias"
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
        let zeros = vec![0.0; bias.len()];
        DirectConv2d::new().conv2d(problem, input, filter, &zeros, output, pool)
    }

    fn nchwc_block_size(&self) -> Option<usize> {
        None
    }

    fn conv2d_nchwc(
        &self,
        _problem: &Conv2dProblem,
        _input: &[f32],
        _filter: &[f32],
        _bias: &[f32],
        _output: &mut [f32],
        _pool: Option<&ThreadPool>,
    ) -> Result<()> {
        anyhow::bail!("no block layout")
    }
}

#[test]
fn shape_registration_is_stable() {
    let env = Arc::new(ExecutionEnv::single_threaded());
    let sweep = GemmSweep::<f32>::new(
        Arc::new(BlockedGemm::new()),
        GemmPath::Direct,
        ExecutionMode::Quick,
        Threading::SingleThread,
        env,
    );

    let mut first = CollectingHost::default();
    assert_eq!(sweep.register_shape(&mut first, 4, 4, 4, 1.0, 0.0).unwrap(), 4);
    assert_eq!(
        first.names,
        vec![
            "SgemmNoPack_Quick.SingleThread/A/B/M:4xN:4xK:4/Alpha:1/Beta:0",
            "SgemmNoPack_Quick.SingleThread/A/TransB/M:4xN:4xK:4/Alpha:1/Beta:0",
            "SgemmNoPack_Quick.SingleThread/TransA/B/M:4xN:4xK:4/Alpha:1/Beta:0",
            "SgemmNoPack_Quick.SingleThread/TransA/TransB/M:4xN:4xK:4/Alpha:1/Beta:0",
        ]
    );

    let mut second = CollectingHost::default();
    sweep.register_shape(&mut second, 4, 4, 4, 1.0, 0.0).unwrap();
    assert_eq!(first.names, second.names);
}

#[test]
fn empty_depth_is_skipped_only_when_packing() {
    let problem = GemmProblem::new(Transpose::No, Transpose::No, 3, 5, 0, 1.0, 0.0);

    let mut packed = GemmTester::<f32>::new(Arc::new(BlockedGemm::new()), GemmPath::Packed);
    assert!(matches!(
        packed.test(&problem, None).unwrap(),
        CaseOutcome::Skipped { .. }
    ));

    let mut direct = GemmTester::<f32>::new(Arc::new(BlockedGemm::new()), GemmPath::Direct);
    assert_eq!(direct.test(&problem, None).unwrap(), CaseOutcome::Passed);
}

#[test]
fn blocked_gemm_passes_every_transpose_in_both_precisions() {
    let env = ExecutionEnv::new(2).unwrap();
    for path in GemmPath::ALL {
        let mut single = GemmTester::<f32>::new(Arc::new(BlockedGemm::new()), path);
        let mut double = GemmTester::<f64>::new(Arc::new(BlockedGemm::with_tile_n(5)), path);
        for trans_a in Transpose::ALL {
            for trans_b in Transpose::ALL {
                let problem = GemmProblem::new(trans_a, trans_b, 17, 9, 33, -0.5, 0.25);
                assert_eq!(single.test(&problem, env.pool()).unwrap(), CaseOutcome::Passed);
                assert_eq!(double.test(&problem, None).unwrap(), CaseOutcome::Passed);
            }
        }
    }
}

#[test]
fn faulty_gemm_is_reported_at_the_bad_element() {
    let problem = GemmProblem::new(Transpose::No, Transpose::Yes, 3, 4, 5, 1.0, 0.0);
    for path in GemmPath::ALL {
        let kernel = Arc::new(LastElementOff {
            inner: BlockedGemm::new(),
        });
        let mut tester = GemmTester::<f32>::new(kernel, path);
        let CaseOutcome::Failed(mismatch) = tester.test(&problem, None).unwrap() else {
            panic!("nudged output was not detected on {path:?}");
        };
        assert_eq!(mismatch.coordinate, vec![2, 3]);
        assert_eq!(mismatch.index, 11);
        assert_eq!(mismatch.actual, mismatch.expected + 1.0);
        assert!(mismatch.to_string().starts_with("A/TransB/M:3xN:4xK:5"));
    }
}

#[test]
fn missing_bias_fails_the_natural_layout() {
    let problem = Conv2dProblem::new(1, 1, 4, (6, 6), 3, (3, 3)).with_padding([1, 1, 1, 1]);
    let mut tester = Conv2dTester::new(Arc::new(ForgetsBias), ConvLayout::Natural);
    let outcome = tester.test(&problem, None).unwrap();
    let CaseOutcome::Failed(mismatch) = outcome else {
        panic!("missing bias went unnoticed: {outcome:?}");
    };
    assert_eq!(mismatch.coordinate, vec![0, 0, 0, 0]);

    let mut blocked = Conv2dTester::new(Arc::new(ForgetsBias), ConvLayout::Nchwc);
    assert!(matches!(
        blocked.test(&problem, None).unwrap(),
        CaseOutcome::Skipped { .. }
    ));
}

#[test]
fn direct_conv_passes_both_layouts() {
    let env = ExecutionEnv::new(2).unwrap();
    let problems = [
        Conv2dProblem::new(2, 1, 12, (9, 7), 10, (3, 2)).with_padding([1, 0, 2, 1]),
        Conv2dProblem::new(1, 1, 3, (11, 11), 17, (3, 3))
            .with_stride([2, 2])
            .with_dilation([2, 1]),
        Conv2dProblem::new(1, 4, 1, (5, 5), 1, (3, 3)).with_padding([1, 1, 1, 1]),
    ];
    for layout in ConvLayout::ALL {
        let mut tester = Conv2dTester::new(Arc::new(DirectConv2d::new()), layout);
        for problem in &problems {
            let outcome = tester.test(problem, env.pool()).unwrap();
            assert!(!outcome.is_failure(), "{problem} on {layout:?}: {outcome:?}");
        }
    }
}

#[test]
fn registry_lifecycle() {
    let mut registry = SweepRegistry::new();
    assert_eq!(registry.state(), RegistryState::Empty);

    registry
        .register(ExecutionMode::Quick, "one", |host: &mut dyn TestHost| {
            host.register_case("Suite", "a", Box::new(|| Ok(CaseOutcome::Passed)))?;
            Ok(1)
        })
        .unwrap();
    registry
        .register(ExecutionMode::Exhaustive, "never", |_host: &mut dyn TestHost| {
            panic!("exhaustive catalog must not run in quick mode")
        })
        .unwrap();
    assert_eq!(registry.state(), RegistryState::Populated);

    let mut runner = CaseRunner::new();
    assert_eq!(registry.drain(ExecutionMode::Quick, &mut runner).unwrap(), 1);
    assert_eq!(registry.state(), RegistryState::Drained(ExecutionMode::Quick));
    assert_eq!(runner.len(), 1);

    assert!(registry
        .register(ExecutionMode::Quick, "late", |_host: &mut dyn TestHost| Ok(0))
        .is_err());
    assert!(registry.drain(ExecutionMode::Quick, &mut runner).is_err());
}

#[test]
fn miscounting_generator_is_rejected() {
    let mut registry = SweepRegistry::new();
    registry
        .register(ExecutionMode::Quick, "liar", |host: &mut dyn TestHost| {
            host.register_case("Suite", "a", Box::new(|| Ok(CaseOutcome::Passed)))?;
            Ok(2)
        })
        .unwrap();
    let err = registry
        .drain(ExecutionMode::Quick, &mut CaseRunner::new())
        .unwrap_err();
    assert!(err.to_string().contains("liar"));
}

#[test]
fn filtered_quick_run_passes() {
    let config = HarnessConfig {
        filter: Some("M:5xN:5xK:5".into()),
        ..HarnessConfig::default()
    };
    let session = HarnessSession::new(config, KernelRegistry::with_default_kernels()).unwrap();
    let report = session.run().unwrap();

    // 2 dtypes x 2 paths x 2 threadings x 4 transposes
    assert_eq!(report.summary.executed(), 32);
    assert_eq!(report.summary.passed, 32);
    assert!(report.success());
}

#[test]
fn quick_conv_sizes_pass() {
    let config = HarnessConfig {
        threads: 0,
        filter: Some("Conv2d".into()),
        dtypes: vec![kernelcheck_kernels::config::DataType::F32],
        ..HarnessConfig::default()
    };
    let session = HarnessSession::new(config, KernelRegistry::with_default_kernels()).unwrap();
    let runner = session.prepare().unwrap();
    let small: Vec<String> = runner
        .case_names()
        .into_iter()
        .filter(|name| name.contains("/H4/W4/"))
        .collect();
    assert!(!small.is_empty());

    let config = HarnessConfig {
        threads: 0,
        filter: Some("/H4/W4/".into()),
        dtypes: vec![kernelcheck_kernels::config::DataType::F32],
        ..HarnessConfig::default()
    };
    let report = HarnessSession::new(config, KernelRegistry::with_default_kernels())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(report.summary.executed(), small.len());
    assert!(report.success(), "{:?}", report.failures().collect::<Vec<_>>());
}
