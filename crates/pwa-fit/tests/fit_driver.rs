use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use num_complex::Complex32;
use pwa_amp::{write_amp_file, NativeRegistry};
use pwa_core::{
    BinRanges, ErrorInfo, FcnFlag, FitContext, ParamId, ParameterSpec, PwaError, StartValue,
};
use pwa_fit::{
    Confirm, FitDriver, FitSpec, InterruptFlag, IterationStore, Minimizer, MinimizerOutcome,
    Objective, PromptConfirm,
};
use pwa_like::{FcnEvaluator, LikelihoodEvaluator};
use pwa_norm::{generate, GenerateOptions};
use tempfile::tempdir;

/// Fixed-rate gradient descent; converged once the gradient is tiny.
struct SteepestDescent {
    free: Vec<(ParamId, bool)>,
    start: Vec<f64>,
    rate: f64,
    max_steps: usize,
}

impl SteepestDescent {
    fn new(rate: f64, max_steps: usize) -> Self {
        Self {
            free: Vec::new(),
            start: vec![0.0],
            rate,
            max_steps,
        }
    }
}

impl Minimizer for SteepestDescent {
    fn clear(&mut self) {
        self.free.clear();
        self.start = vec![0.0];
    }

    fn define_parameter(
        &mut self,
        id: ParamId,
        spec: &ParameterSpec,
        start: f64,
    ) -> Result<(), PwaError> {
        if self.start.len() <= id.index() {
            self.start.resize(id.index() + 1, 0.0);
        }
        self.start[id.index()] = start;
        self.free.push((id, !spec.is_fixed()));
        Ok(())
    }

    fn minimize(&mut self, objective: &mut dyn Objective) -> Result<MinimizerOutcome, PwaError> {
        let mut params = self.start.clone();
        let mut fcn = f64::INFINITY;
        let mut converged = false;
        for _ in 0..self.max_steps {
            let (value, derivs) = objective.call(FcnFlag::Gradient, &params)?;
            let derivs = derivs.ok_or_else(|| PwaError::Fit(ErrorInfo::new("no-gradient", "")))?;
            fcn = value;
            let mut norm = 0.0;
            for (id, free) in &self.free {
                if *free {
                    norm += derivs[id.index()].powi(2);
                    params[id.index()] -= self.rate * derivs[id.index()];
                }
            }
            if norm.sqrt() < 1e-9 {
                converged = true;
                break;
            }
        }
        let (fcn_min, _) = objective.call(FcnFlag::Value, &params)?;
        let len = params.len();
        let mut covariance = vec![vec![0.0; len]; len];
        for (id, free) in &self.free {
            if *free {
                covariance[id.index()][id.index()] = 0.5;
            }
        }
        Ok(MinimizerOutcome {
            fcn_min: fcn_min.min(fcn),
            params,
            covariance,
            converged,
        })
    }
}

/// `Σ (p_i − c_i)²` with a log of reset starts; raises the interrupt flag once
/// the call count reaches the threshold.
struct Quadratic {
    centers: Vec<f64>,
    resets: Vec<Vec<f64>>,
    calls: usize,
    interrupt: Option<(InterruptFlag, usize)>,
}

impl Quadratic {
    fn new(centers: Vec<f64>) -> Self {
        Self {
            centers,
            resets: Vec::new(),
            calls: 0,
            interrupt: None,
        }
    }
}

impl FcnEvaluator for Quadratic {
    fn evaluate(
        &mut self,
        flag: FcnFlag,
        params: &[f64],
        derivs: Option<&mut [f64]>,
    ) -> Result<f64, PwaError> {
        self.calls += 1;
        if flag == FcnFlag::Reset {
            self.resets.push(params.to_vec());
        }
        if let Some((interrupt, at)) = &self.interrupt {
            if self.calls >= *at {
                interrupt.raise();
            }
        }
        let mut value = 0.0;
        for (idx, center) in self.centers.iter().enumerate().skip(1) {
            value += (params[idx] - center).powi(2);
        }
        if let (true, Some(out)) = (flag.wants_gradient(), derivs) {
            for (idx, center) in self.centers.iter().enumerate().skip(1) {
                out[idx] += 2.0 * (params[idx] - center);
            }
        }
        Ok(value)
    }
}

fn context(out_dir: &Path) -> FitContext {
    let mut ctx = FitContext::new("1800-1810".parse::<BinRanges>().unwrap(), out_dir);
    ctx.seed = 11;
    ctx.calls_per_print = 5;
    ctx.params.define(ParameterSpec::new(
        "a",
        StartValue::Uniform { min: -2.0, max: 2.0 },
    ));
    ctx.params.define(ParameterSpec::new(
        "b",
        StartValue::Uniform { min: 0.0, max: 1.0 },
    ));
    let mut fixed = ParameterSpec::new("c", StartValue::Fixed(3.0));
    fixed.step = 0.0;
    ctx.params.define(fixed);
    ctx
}

struct Accept;

impl Confirm for Accept {
    fn confirm(&mut self, _question: &str) -> bool {
        true
    }
}

#[test]
fn iterations_converge_and_are_persisted() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path());
    let mut evaluator = Quadratic::new(vec![0.0, 1.0, -0.5, 3.0]);
    let mut minimizer = SteepestDescent::new(0.25, 500);
    let records = FitDriver::new(&ctx, &mut evaluator, &mut minimizer)
        .with_recipe_digest("abc")
        .run(3)
        .unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert!(record.converged);
        assert_relative_eq!(record.param("a").unwrap(), 1.0, epsilon = 1e-8);
        assert_relative_eq!(record.param("b").unwrap(), -0.5, epsilon = 1e-8);
        assert_eq!(record.param("c"), Some(3.0));
        assert_eq!(record.covariance.len(), 3);
        assert_eq!(record.covariance[2][2], 0.0);
        assert_eq!(record.recipe_digest.as_deref(), Some("abc"));
    }

    let starts = evaluator.resets.clone();
    assert_eq!(starts.len(), 3);
    assert_ne!(starts[0], starts[1]);
    assert!(starts.iter().all(|start| start[3] == 3.0));

    let store = IterationStore::new(ctx.iteration_store_path());
    assert_eq!(store.path(), dir.path().join("1800-1810.json"));
    assert_eq!(store.load().unwrap().len(), 3);
    assert!(store.best("1800-1810").unwrap().is_some());

    let mut again = Quadratic::new(vec![0.0, 1.0, -0.5, 3.0]);
    let mut minimizer = SteepestDescent::new(0.25, 500);
    FitDriver::new(&ctx, &mut again, &mut minimizer).run(3).unwrap();
    assert_eq!(again.resets, starts);
}

#[test]
fn non_convergence_still_writes_a_record() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path());
    let mut evaluator = Quadratic::new(vec![0.0, 10.0, 10.0, 3.0]);
    let mut minimizer = SteepestDescent::new(0.01, 2);
    let records = FitDriver::new(&ctx, &mut evaluator, &mut minimizer)
        .run(1)
        .unwrap();
    assert!(!records[0].converged);
    assert!(records[0].fcn_min > 0.0);
    assert_eq!(records[0].calls, 4);
    let stored = IterationStore::new(ctx.iteration_store_path()).load().unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].converged);
    assert_relative_eq!(stored[0].fcn_min, records[0].fcn_min, max_relative = 1e-12);
}

#[test]
fn interrupt_without_confirmation_writes_nothing() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path());
    let interrupt = InterruptFlag::new();
    let mut evaluator = Quadratic::new(vec![0.0, 1.0, -0.5, 3.0]);
    evaluator.interrupt = Some((interrupt.clone(), 6));
    let mut minimizer = SteepestDescent::new(0.01, 500);
    let err = FitDriver::new(&ctx, &mut evaluator, &mut minimizer)
        .with_interrupt(interrupt)
        .run(2)
        .unwrap_err();
    assert!(err.is_interrupted());
    assert!(IterationStore::new(ctx.iteration_store_path())
        .load()
        .unwrap()
        .is_empty());
}

#[test]
fn confirmed_interrupt_writes_best_so_far() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path());
    let interrupt = InterruptFlag::new();
    let mut evaluator = Quadratic::new(vec![0.0, 1.0, -0.5, 3.0]);
    evaluator.interrupt = Some((interrupt.clone(), 6));
    let mut minimizer = SteepestDescent::new(0.01, 500);
    let err = FitDriver::new(&ctx, &mut evaluator, &mut minimizer)
        .with_interrupt(interrupt)
        .with_confirm(Accept)
        .run(2)
        .unwrap_err();
    assert!(err.is_interrupted());
    let stored = IterationStore::new(ctx.iteration_store_path()).load().unwrap();
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].converged);
    assert_eq!(stored[0].calls, 6);
    assert!(stored[0].covariance.is_empty());
}

#[test]
fn prompted_interrupt_answers_decide_the_write() {
    for (answer, written) in [("yes\n", 1), ("\n", 0), ("Y\n", 1), ("nope\n", 0)] {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path());
        let interrupt = InterruptFlag::new();
        let mut evaluator = Quadratic::new(vec![0.0, 1.0, -0.5, 3.0]);
        evaluator.interrupt = Some((interrupt.clone(), 6));
        let mut minimizer = SteepestDescent::new(0.01, 500);
        let mut prompt = Vec::new();
        let err = FitDriver::new(&ctx, &mut evaluator, &mut minimizer)
            .with_interrupt(interrupt)
            .with_confirm(PromptConfirm::new(answer.as_bytes(), &mut prompt))
            .run(1)
            .unwrap_err();
        assert!(err.is_interrupted());
        assert!(String::from_utf8(prompt).unwrap().ends_with("[y/N] "));
        let stored = IterationStore::new(ctx.iteration_store_path()).load().unwrap();
        assert_eq!(stored.len(), written, "answer {answer:?}");
    }
}

#[test]
fn closed_input_declines() {
    let mut prompt = Vec::new();
    let mut confirm = PromptConfirm::new(&b""[..], &mut prompt);
    assert!(!confirm.confirm("Write?"));
    assert_eq!(prompt, b"Write? [y/N] ");
}

#[test]
fn ctrlc_handler_installs_once_per_process() {
    let interrupt = InterruptFlag::new();
    interrupt.install_ctrlc().unwrap();
    assert!(!interrupt.is_raised());
    let err = InterruptFlag::new().install_ctrlc().unwrap_err();
    assert_eq!(err.info().code, "interrupt-handler");
}

fn write_amps(dir: &Path, files: &[(&str, [(f32, f32); 4])]) {
    fs::create_dir_all(dir).unwrap();
    for (file, column) in files {
        let values: Vec<_> = column.iter().map(|(re, im)| Complex32::new(*re, *im)).collect();
        write_amp_file(&dir.join(file), &values).unwrap();
    }
}

#[test]
fn recipe_builds_loadable_datasets_per_bin() {
    let root = tempdir().unwrap();
    let bin = "Wbin1800-1810";
    let data_dir = root.path().join("data").join(bin);
    let acc_dir = root.path().join("acc").join(bin);
    write_amps(
        &data_dir,
        &[
            ("wave=a:.amps", [(1.0, 0.0), (0.5, 0.5), (0.2, -0.1), (-0.7, 0.3)]),
            ("wave=b:.amps", [(0.0, 1.0), (0.3, 0.0), (0.9, 0.9), (0.1, 0.4)]),
        ],
    );
    write_amps(
        &acc_dir,
        &[
            ("wave=a:.amps", [(0.8, 0.1), (0.4, 0.2), (0.3, 0.3), (0.6, -0.2)]),
            ("wave=b:.amps", [(0.2, 0.7), (0.1, 0.5), (0.5, 0.1), (0.3, 0.3)]),
        ],
    );
    fs::create_dir_all(root.path().join("data").join("Wbin1900-1950")).unwrap();
    let opts = GenerateOptions {
        coherence_tags: Vec::new(),
        total_events: 8.0,
        cuts_file: None,
        scale_factors: Vec::new(),
        amp_match: None,
    };
    generate(&acc_dir, &opts)
        .unwrap()
        .store(&acc_dir.join(opts.file_name()))
        .unwrap();

    let recipe = format!(
        r#"
rules:
  - pattern: "wave=*"
    kernel: {{ type: native, name: cartesian }}
    params:
      re: {{ tags: [wave, bin], start: 1.0 }}
      im: {{ tags: [wave, bin], start: 0.5 }}
bin-roots: ["{root}/data"]
datasets:
  - name: photo
    type: events
    data: {{ dir: "{root}/data/{{bin}}" }}
    acc: {{ dir: "{root}/acc/{{bin}}", norm-int: "{norm}" }}
"#,
        root = root.path().display(),
        norm = opts.file_name(),
    );
    let spec = FitSpec::from_yaml(recipe.as_bytes()).unwrap();
    let mut ctx = FitContext::new("1800-1810".parse::<BinRanges>().unwrap(), root.path());
    let datasets = spec
        .build_datasets(&mut ctx, &NativeRegistry::default())
        .unwrap();
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].name(), "photo:Wbin1800-1810");
    assert_eq!(ctx.params.max_id(), 4);
    assert!(ctx.params.id("re:wave=a:Wbin1800-1810").is_ok());

    let mut evaluator = LikelihoodEvaluator::new(datasets);
    let reports = evaluator.load_for_fit().unwrap();
    assert!(reports[0].contains("4 events"));
    let mut rng = pwa_core::RngHandle::from_seed(0);
    let params = ctx.params.start_vector(&mut rng);
    let value = evaluator.evaluate(FcnFlag::Value, &params, None).unwrap();
    assert!(value.is_finite());
}
