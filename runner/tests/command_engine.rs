#![cfg(unix)]

use orambench_runner::{
    engine::{Engine, EngineExit, Invocation},
    executors::{BuildExecutor, RunExecutor},
    BenchConfig, CommandEngine, ExperimentMatrix,
};
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};
use tempfile::TempDir;

// a script still open for writing in one test cannot be executed by a child
// forked in another, so creating and running scripts is serialized
static SPAWN: Mutex<()> = Mutex::new(());

fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// behaves like the OramSimulator: creates `--output`, writes `--output_file`
/// and logs every subcommand to `calls`
fn fake_simulator(dir: &Path) -> PathBuf {
    let calls = dir.join("calls");

    script(
        dir,
        "OramSimulator",
        &format!(
            r#"echo "$1" >> "{}"
while [ $# -gt 0 ]; do
    case "$1" in
        --output) mkdir -p "$2" ;;
        --output_file) printf 'rounds = 1\n' > "$2" ;;
    esac
    shift
done
exit 0
"#,
            calls.display()
        ),
    )
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn exit_status_is_reported() {
    let _guard = spawn_lock();
    let dir = TempDir::new().unwrap();
    let invocation = Invocation {
        args: vec!["create".into()],
        working_dir: None,
    };

    let ok = CommandEngine::new(&script(dir.path(), "ok", "exit 0\n")).unwrap();
    assert_eq!(ok.invoke(&invocation).unwrap(), EngineExit::Success);

    let failing = CommandEngine::new(&script(dir.path(), "failing", "exit 3\n")).unwrap();
    assert_eq!(failing.invoke(&invocation).unwrap(), EngineExit::Failure(Some(3)));

    let missing = CommandEngine::new(&dir.path().join("missing")).unwrap();
    assert!(missing.invoke(&invocation).is_err());
}

#[test]
fn arguments_and_working_directory_reach_the_engine() {
    let _guard = spawn_lock();
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    fs::create_dir(&out).unwrap();

    let engine = CommandEngine::new(&script(
        dir.path(),
        "echoing",
        &format!(
            "pwd > \"{0}/pwd\"\necho \"$@\" > \"{0}/args\"\n",
            out.display()
        ),
    ))
    .unwrap();

    let run_dir = dir.path().join("run");
    fs::create_dir(&run_dir).unwrap();
    let invocation = Invocation {
        args: vec!["recsys_sim".into(), "--rounds".into(), "7".into()],
        working_dir: Some(run_dir.clone()),
    };

    assert_eq!(engine.invoke(&invocation).unwrap(), EngineExit::Success);

    let pwd = fs::read_to_string(out.join("pwd")).unwrap();
    assert_eq!(
        fs::canonicalize(pwd.trim()).unwrap(),
        fs::canonicalize(&run_dir).unwrap()
    );
    assert_eq!(
        fs::read_to_string(out.join("args")).unwrap().trim(),
        "recsys_sim --rounds 7"
    );
}

#[test]
fn build_then_run_against_a_fake_simulator() {
    let _guard = spawn_lock();
    let dir = TempDir::new().unwrap();

    let mut config = BenchConfig::default();
    config.paths.executable = fake_simulator(dir.path());
    config.paths.oram_dir = dir.path().join("orams");
    config.paths.experiment_dir = dir.path().join("experiments");
    config.paths.trace_dir = dir.path().join("traces");
    config.paths.working_dir = dir.path().to_path_buf();
    config.matrix.sizes.truncate(1);
    config.matrix.samples_per_round = vec![10_000];
    config.matrix.datasets = vec!["kaggle".to_owned()];
    let config = config.validated().unwrap();

    fs::create_dir_all(&config.paths.trace_dir).unwrap();
    fs::write(
        config.paths.trace_dir.join("kaggle_synthetic_15M_10M.txt"),
        "",
    )
    .unwrap();

    let matrix = ExperimentMatrix::new(&config);
    let engine = CommandEngine::new(&config.paths.executable).unwrap();

    let built = BuildExecutor::new(&config, &engine)
        .execute(&matrix.build_vectors())
        .unwrap();
    assert_eq!(built.built.len(), 2);
    assert!(built.failed.is_empty());

    let ran = RunExecutor::new(&config, &engine)
        .execute(&matrix.run_configs())
        .unwrap();
    assert_eq!(ran.completed.len(), 4);
    assert!(ran.failed.is_empty());
    assert!(ran.skipped.is_empty());

    let first = calls(dir.path());
    assert_eq!(first.iter().filter(|call| *call == "create").count(), 2);
    assert_eq!(first.iter().filter(|call| *call == "recsys_sim").count(), 4);

    // nothing left to do on a second pass
    let built = BuildExecutor::new(&config, &engine)
        .execute(&matrix.build_vectors())
        .unwrap();
    let ran = RunExecutor::new(&config, &engine)
        .execute(&matrix.run_configs())
        .unwrap();

    assert_eq!(built.skipped.len(), 2);
    assert_eq!(ran.already_complete.len(), 4);
    assert_eq!(calls(dir.path()), first);
}
