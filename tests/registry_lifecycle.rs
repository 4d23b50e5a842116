// tests/registry_lifecycle.rs
//
// These tests spawn real `sh` children.
#![cfg(unix)]

mod common;
use crate::common::{
    CRASHING, ConfigFileBuilder, FakeToolRunner, LONG_RUNNING, STUBBORN, init_tracing, sh_config,
    supervisor, wait_until, with_timeout,
};

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use repovisor::errors::{NotFoundKind, SupervisorError};
use repovisor::registry::DeployProgress;
use repovisor::types::{InstanceId, InstanceStatus, StopOutcome};
use tokio::sync::mpsc;

const REPO: &str = "https://example/repo";

#[tokio::test]
async fn deploy_registers_a_running_instance() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();

    assert_eq!(deployment.id.as_str().len(), 6);
    assert_eq!(
        deployment.work_dir,
        dir.path().join(format!("bot_{}", deployment.id))
    );
    assert_eq!(deployment.entry_point, deployment.work_dir.join("main.sh"));
    assert!(deployment.pid.is_some());

    let list = sup.list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, deployment.id);
    assert_eq!(list[0].source_ref, REPO);
    assert_eq!(list[0].status, InstanceStatus::Running);

    sup.shutdown().await;
}

#[tokio::test]
async fn main_py_is_preferred_over_setup_py() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // `sh` happily runs these as shell scripts.
    let tools = FakeToolRunner::new().with_repo(
        REPO,
        &[("setup.py", "exit 1\n"), ("main.py", LONG_RUNNING)],
    );
    let cfg = ConfigFileBuilder::new()
        .in_dir(dir.path())
        .with_entry(&["*.py"], "sh")
        .build();
    let sup = supervisor(&cfg, &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();

    assert_eq!(
        deployment.entry_point.file_name().and_then(|n| n.to_str()),
        Some("main.py")
    );
    // No manifest: only the fetch ran.
    assert_eq!(tools.programs(), vec!["git".to_string()]);

    sup.shutdown().await;
}

#[tokio::test]
async fn progress_is_reported_in_order() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(
        REPO,
        &[("main.sh", LONG_RUNNING), ("requirements.txt", "requests\n")],
    );
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let (tx, mut rx) = mpsc::channel(8);
    let deployment = with_timeout(sup.registry().deploy(REPO, Some(tx)))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], DeployProgress::Fetching { source_ref, .. } if source_ref == REPO));
    assert!(
        matches!(&events[1], DeployProgress::Installing { manifest, .. } if manifest == "requirements.txt")
    );
    assert!(matches!(&events[2], DeployProgress::Starting { id, .. } if *id == deployment.id));

    let calls = tools.calls();
    assert_eq!(calls[1].program, "pip");
    assert_eq!(calls[1].cwd.as_ref(), Some(&deployment.work_dir));

    sup.shutdown().await;
}

#[tokio::test]
async fn concurrent_deploys_of_one_source_are_independent() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new()
        .with_repo(REPO, &[("main.sh", LONG_RUNNING)])
        .with_fetch_delay(Duration::from_millis(50));
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let (a, b) = with_timeout(async { tokio::join!(sup.deploy(REPO), sup.deploy(REPO)) }).await;
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.id, b.id);
    assert_ne!(a.work_dir, b.work_dir);
    assert_eq!(sup.list().len(), 2);

    let outcome = with_timeout(sup.stop_confirmed(&a.id)).await.unwrap();
    assert!(outcome.is_confirmed());
    let remaining: Vec<InstanceId> = sup.list().into_iter().map(|s| s.id).collect();
    assert_eq!(remaining, vec![b.id.clone()]);

    with_timeout(sup.stop_confirmed(&b.id)).await.unwrap();
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn stopped_instance_is_never_listed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    let outcome = sup.stop(&deployment.id).await.unwrap();

    assert_eq!(outcome, StopOutcome::Requested);
    assert!(sup.list().iter().all(|s| s.id != deployment.id));
    assert!(sup.registry().get(&deployment.id).is_err());
}

#[tokio::test]
async fn stop_of_unknown_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&sh_config(dir.path()), &FakeToolRunner::new());

    let err = sup.stop(&InstanceId::from("zzzzzz")).await.unwrap_err();
    match err {
        SupervisorError::NotFound { kind, id } => {
            assert_eq!(kind, NotFoundKind::Instance);
            assert_eq!(id, "zzzzzz");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn stopping_twice_reports_not_found() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    with_timeout(sup.stop_confirmed(&deployment.id)).await.unwrap();

    assert!(matches!(
        sup.stop(&deployment.id).await,
        Err(SupervisorError::NotFound { .. })
    ));
}

#[tokio::test]
async fn confirmed_stop_reports_exit() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    let outcome = with_timeout(sup.stop_confirmed(&deployment.id))
        .await
        .unwrap();

    // Terminated by SIGTERM, so there is no exit code.
    assert_eq!(outcome, StopOutcome::Exited { exit_code: None });
}

#[tokio::test]
async fn child_ignoring_sigterm_is_killed_after_timeout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", STUBBORN)]);
    let cfg = ConfigFileBuilder::new()
        .in_dir(dir.path())
        .with_stop_timeout(Duration::from_millis(200))
        .build();
    let sup = supervisor(&cfg, &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    let ready = deployment.work_dir.join("ready");
    wait_until(|| ready.exists()).await;

    let outcome = with_timeout(sup.stop_confirmed(&deployment.id))
        .await
        .unwrap();
    assert_eq!(outcome, StopOutcome::Killed);
}

#[tokio::test]
async fn child_that_exits_on_its_own_is_crashed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", CRASHING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    wait_until(|| {
        sup.list()
            .iter()
            .any(|s| s.id == deployment.id && s.status == InstanceStatus::Crashed)
    })
    .await;

    let summary = sup.registry().get(&deployment.id).unwrap();
    assert_eq!(summary.exit_code, Some(3));

    // Stopping a crashed instance still removes it.
    let outcome = sup.stop(&deployment.id).await.unwrap();
    assert_eq!(outcome, StopOutcome::AlreadyExited { exit_code: Some(3) });
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn child_writing_non_utf8_output_keeps_running() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    // \351 is 'é' in Latin-1, which is not valid UTF-8 on its own.
    let script = "printf 'caf\\351\\n'\n\
                  printf 'caf\\351\\n' >&2\n\
                  sleep 0.3\n\
                  i=0\n\
                  while [ $i -lt 50 ]; do echo hello; echo hello >&2; i=$((i+1)); done\n\
                  touch ready\n\
                  exec sleep 30\n";
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", script)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();
    let ready = deployment.work_dir.join("ready");
    wait_until(|| {
        ready.exists()
            || sup
                .registry()
                .get(&deployment.id)
                .map(|s| s.status == InstanceStatus::Crashed)
                .unwrap_or(true)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let summary = sup.registry().get(&deployment.id).unwrap();
    assert_eq!(summary.status, InstanceStatus::Running);
    assert!(ready.exists());

    sup.shutdown().await;
}

#[tokio::test]
async fn child_sees_the_store_snapshot_over_the_inherited_env() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let script = "printf '%s|%s' \"$GREETING\" \"$HOME\" > out.tmp && mv out.tmp out.txt\nexec sleep 30\n";
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", script)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);
    sup.config_set("GREETING", "hello=world").unwrap();
    sup.config_set("HOME", "/custom/home").unwrap();
    sup.config_set("RENDER_SECRET", "hidden").unwrap();

    let deployment = with_timeout(sup.deploy(REPO)).await.unwrap();

    // Later edits do not reach the running child or its recorded snapshot.
    sup.config_set("GREETING", "changed").unwrap();

    let out = deployment.work_dir.join("out.txt");
    wait_until(|| out.exists()).await;
    let seen = std::fs::read_to_string(&out).unwrap();
    assert_eq!(seen, "hello=world|/custom/home");

    let snapshot = sup.registry().env_snapshot(&deployment.id).unwrap();
    assert_eq!(snapshot.get("GREETING").map(String::as_str), Some("hello=world"));
    assert!(!snapshot.contains_key("RENDER_SECRET"));

    sup.shutdown().await;
}

#[tokio::test]
async fn failed_fetch_registers_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let sup = supervisor(&sh_config(dir.path()), &FakeToolRunner::new());

    let err = sup.deploy("https://example/missing").await.unwrap_err();

    assert!(matches!(err, SupervisorError::Fetch { .. }));
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn failed_install_keeps_the_work_dir_for_inspection() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new()
        .with_repo(REPO, &[("main.sh", LONG_RUNNING), ("requirements.txt", "x\n")])
        .failing("pip");
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let err = sup.deploy(REPO).await.unwrap_err();

    let work_dir = match err {
        SupervisorError::Install { work_dir, .. } => work_dir,
        other => panic!("expected Install, got {other:?}"),
    };
    assert!(work_dir.join("main.sh").exists());
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn repo_without_entry_point_is_rejected() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("README.md", "# nothing to run\n")]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let err = sup.deploy(REPO).await.unwrap_err();

    assert!(matches!(err, SupervisorError::NoEntryPoint { .. }));
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn unspawnable_interpreter_is_a_spawn_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let cfg = ConfigFileBuilder::new()
        .in_dir(dir.path())
        .with_entry(&["*.sh"], "definitely-not-an-interpreter")
        .build();
    let sup = supervisor(&cfg, &tools);

    let err = sup.deploy(REPO).await.unwrap_err();

    assert!(matches!(err, SupervisorError::Spawn { .. }));
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn background_deploy_does_not_block_other_requests() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new()
        .with_repo(REPO, &[("main.sh", LONG_RUNNING)])
        .with_fetch_delay(Duration::from_millis(300));
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let handle = sup.deploy_in_background(REPO, None);

    // While the fetch is in flight the registry stays usable and shows
    // nothing half-built.
    assert!(sup.list().is_empty());
    sup.config_set("DURING", "deploy").unwrap();
    assert!(sup.stop(&InstanceId::from("abcdef")).await.is_err());

    let deployment = with_timeout(handle).await.unwrap().unwrap();
    assert_eq!(sup.list().len(), 1);
    assert_eq!(sup.list()[0].id, deployment.id);

    sup.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_everything() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", LONG_RUNNING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let mut ids = HashSet::new();
    for _ in 0..3 {
        ids.insert(with_timeout(sup.deploy(REPO)).await.unwrap().id);
    }

    let results = with_timeout(sup.shutdown()).await;

    assert_eq!(results.len(), 3);
    let stopped: HashSet<InstanceId> = results.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(stopped, ids);
    assert!(results.iter().all(|(_, outcome)| outcome.is_confirmed()));
    assert!(sup.list().is_empty());
}

#[tokio::test]
async fn leftover_work_dirs_are_never_reused() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tools = FakeToolRunner::new().with_repo(REPO, &[("main.sh", CRASHING)]);
    let sup = supervisor(&sh_config(dir.path()), &tools);

    let first = with_timeout(sup.deploy(REPO)).await.unwrap();
    sup.stop(&first.id).await.unwrap();
    let second = with_timeout(sup.deploy(REPO)).await.unwrap();

    assert_ne!(first.work_dir, second.work_dir);
    let dirs: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    assert_eq!(dirs.len(), 2);

    sup.shutdown().await;
}
