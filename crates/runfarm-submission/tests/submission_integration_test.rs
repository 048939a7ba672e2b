//! End-to-end tests for `Submitter::submit_run` against the local farm.

use runfarm_submission::{
    ExtraFile, LocalLaunch, RunContext, RunFuncKwargs, RunFunctionRegistry, RunProgress, StaticIdentity, SubmitConfig,
    SubmitError, Submitter, read_snapshot,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    results: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("project");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("main.py"), "print('hello')\n").unwrap();
        let results = temp.path().join("results");
        Self { _temp: temp, source, results }
    }

    fn config(&self, desc: &str) -> SubmitConfig {
        let mut config = SubmitConfig::new(self.results.to_string_lossy(), desc);
        config.user_name = Some("alice".to_string());
        config
    }

    fn submitter(&self, registry: RunFunctionRegistry) -> Submitter {
        Submitter::new(registry).with_identity(StaticIdentity::new("svc", "box")).with_source_root(&self.source)
    }
}

fn noop_registry() -> RunFunctionRegistry {
    let mut registry = RunFunctionRegistry::new();
    registry.register("demo::noop", |_, _| Ok(())).unwrap();
    registry
}

fn run_dirs(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .map(|entries| entries.map(|e| e.unwrap().file_name().to_string_lossy().into_owned()).collect())
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn test_zero_or_unset_gpus_fail_before_any_directory() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());

    for num_gpus in [None, Some(0)] {
        let mut config = fx.config("gpus");
        config.num_gpus = num_gpus;
        let err = submitter.submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidGpuCount(_)));
        assert!(err.is_configuration());
    }
    assert!(!fx.results.exists());
}

#[test]
fn test_sequential_submissions_get_consecutive_ids() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());
    let config = fx.config("seq");

    let ids: Vec<u32> = (0..4)
        .map(|_| submitter.submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap().run_id)
        .collect();

    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(run_dirs(&fx.results), vec!["00000-seq", "00001-seq", "00002-seq", "00003-seq"]);
}

#[test]
fn test_caller_config_is_left_untouched() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());
    let config = fx.config("copy");
    let before = config.clone();

    let report = submitter.submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();

    assert_eq!(config, before);
    assert!(config.resolved().is_none());

    let mut snapshot = read_snapshot(&report.run_dir).unwrap();
    assert!(snapshot.resolved().is_some());
    snapshot.platform_extras.data_reader_process_count = 16;
    snapshot.local.as_mut().unwrap().do_not_copy_source_files = true;
    assert_eq!(config.platform_extras.data_reader_process_count, 0);
    assert!(!config.local.as_ref().unwrap().do_not_copy_source_files);
}

#[test]
fn test_task_name_and_snapshot_contents() {
    let fx = Fixture::new();
    for name in ["00000-old", "00001-old", "00002-old"] {
        std::fs::create_dir_all(fx.results.join(name)).unwrap();
    }
    let submitter = fx.submitter(noop_registry());
    let mut kwargs = RunFuncKwargs::new();
    kwargs.insert("seeds".to_string(), json!([1, 2, 3]));

    let report = submitter.submit_run(&fx.config("baseline"), "demo::noop", kwargs.clone()).unwrap().wait().unwrap();
    assert_eq!(report.run_id, 3);
    assert_eq!(report.task_name, "alice-00003-baseline");

    let snapshot = read_snapshot(&report.run_dir).unwrap();
    let resolved = snapshot.resolved().unwrap();
    assert_eq!(resolved.run_name(), "00003-baseline");
    assert_eq!(resolved.user_name(), "alice");
    assert_eq!(resolved.host_name(), "box");
    assert_eq!(resolved.run_func_name(), "demo::noop");
    assert_eq!(resolved.run_func_kwargs(), &kwargs);
    assert!(resolved.run_dir().is_absolute());
    assert!(resolved.venue().is_some());
}

#[test]
fn test_user_name_falls_back_to_identity() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());
    let mut config = fx.config("who");
    config.user_name = None;

    let report = submitter.submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();
    assert_eq!(report.task_name, "svc-00000-who");
}

#[test]
fn test_invalid_run_desc_fails_task_name_validation() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());

    for desc in ["a/b", "   "] {
        let err = submitter.submit_run(&fx.config(desc), "demo::noop", RunFuncKwargs::new()).unwrap_err();
        assert!(matches!(err, SubmitError::InvalidTaskName { .. }), "{err}");
    }

    // Allocated directories stay behind, but nothing was staged into them.
    for name in run_dirs(&fx.results) {
        assert!(!fx.results.join(name).join("submit_config.json").exists());
    }
}

#[test]
fn test_ignored_paths_are_not_staged() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.source.join("__pycache__")).unwrap();
    std::fs::write(fx.source.join("__pycache__/x.pyc"), "bytecode").unwrap();
    std::fs::create_dir_all(fx.source.join("training")).unwrap();
    std::fs::write(fx.source.join("training/loop.py"), "pass\n").unwrap();

    let submitter = fx.submitter(noop_registry());
    let report = submitter.submit_run(&fx.config("stage"), "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();

    let src = report.run_dir.join("src");
    assert!(src.join("main.py").is_file());
    assert!(src.join("training/loop.py").is_file());
    assert!(!src.join("__pycache__").exists());
}

#[test]
fn test_extra_files_are_staged() {
    let fx = Fixture::new();
    let extra = fx.source.parent().unwrap().join("stylegan2-ffhq.pkl");
    std::fs::write(&extra, "weights").unwrap();

    let mut config = fx.config("extras");
    config.run_dir_extra_files.push(ExtraFile::new(&extra, "networks/ffhq.pkl"));
    let submitter = fx.submitter(noop_registry());
    let report = submitter.submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();

    assert_eq!(std::fs::read_to_string(report.run_dir.join("src/networks/ffhq.pkl")).unwrap(), "weights");
}

#[test]
fn test_missing_local_options_is_a_configuration_error() {
    let fx = Fixture::new();
    let mut config = fx.config("nolocal");
    config.local = None;

    let err = fx.submitter(noop_registry()).submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap_err();
    assert!(matches!(err, SubmitError::MissingTargetOptions { .. }));
    assert!(err.is_configuration());
    assert!(run_dirs(&fx.results).is_empty());
}

#[test]
fn test_unknown_run_function_is_reported() {
    let fx = Fixture::new();
    let err = fx
        .submitter(noop_registry())
        .submit_run(&fx.config("missing"), "demo::does_not_exist", RunFuncKwargs::new())
        .unwrap_err();
    assert!(matches!(err, SubmitError::UnknownRunFunction(ref name) if name == "demo::does_not_exist"));
    assert!(run_dirs(&fx.results).is_empty());
}

#[test]
fn test_run_failure_propagates_and_marks_finished() {
    let fx = Fixture::new();
    let mut registry = RunFunctionRegistry::new();
    registry.register("demo::fail", |_, _| anyhow::bail!("loss is NaN")).unwrap();
    registry.register("demo::panic", |_, _| panic!("out of memory")).unwrap();

    let submitter = fx.submitter(registry);
    for name in ["demo::fail", "demo::panic"] {
        let err = submitter.submit_run(&fx.config("boom"), name, RunFuncKwargs::new()).unwrap_err();
        assert!(matches!(err, SubmitError::RunFailed { ref run_func_name, .. } if run_func_name == name));
    }

    for dir in run_dirs(&fx.results) {
        let run_dir = fx.results.join(dir);
        assert!(run_dir.join("_finished.txt").is_file());
        assert!(run_dir.join("log.txt").is_file());
    }
}

#[test]
fn test_resubmitting_a_snapshot_is_rejected() {
    let fx = Fixture::new();
    let submitter = fx.submitter(noop_registry());
    let report = submitter.submit_run(&fx.config("once"), "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();

    let snapshot = read_snapshot(&report.run_dir).unwrap();
    let err = submitter.submit_run(&snapshot, "demo::noop", RunFuncKwargs::new()).unwrap_err();
    assert!(matches!(err, SubmitError::AlreadySubmitted(_)));
}

#[test]
fn test_thread_launch_runs_body_with_run_context() {
    let fx = Fixture::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let mut registry = RunFunctionRegistry::new();
    registry
        .register("demo::train", move |config, kwargs| {
            let epochs = kwargs.get("epochs").and_then(serde_json::Value::as_u64).unwrap_or(1);
            assert_eq!(config.num_gpus, Some(2));
            RunContext::new(config)?.run(|ctx| {
                for epoch in 0..epochs {
                    if ctx.should_stop()? {
                        break;
                    }
                    seen.fetch_add(1, Ordering::SeqCst);
                    ctx.update(RunProgress::epoch(epoch + 1, Some(epochs)).with_loss(1.0 / (epoch + 1) as f64))?;
                }
                Ok(())
            })
        })
        .unwrap();

    let mut config = fx.config("threaded");
    config.num_gpus = Some(2);
    config.local.as_mut().unwrap().launch = LocalLaunch::Thread;
    let mut kwargs = RunFuncKwargs::new();
    kwargs.insert("epochs".to_string(), json!(5));

    let handle = fx.submitter(registry).submit_run(&config, "demo::train", kwargs).unwrap();
    let report = handle.wait().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert!(report.run_dir.join("_finished.txt").is_file());
    assert!(report.run_dir.join("run.txt").is_file());
    let status: serde_json::Value =
        serde_json::from_slice(&std::fs::read(report.run_dir.join("run_status.json")).unwrap()).unwrap();
    assert_eq!(status["status"], "completed");
    assert_eq!(status["update_count"], 5);
}

#[test]
fn test_templated_root_is_expanded() {
    let fx = Fixture::new();
    let mut config = fx.config("tmpl");
    config.run_dir_root = format!("{}/<USERNAME>/<HOST>", fx.results.display());

    let report = fx.submitter(noop_registry()).submit_run(&config, "demo::noop", RunFuncKwargs::new()).unwrap().wait().unwrap();
    assert_eq!(report.run_dir, fx.results.join("alice").join("box").join("00000-tmpl"));
}
