//! Integration tests for the environment cache.

use async_trait::async_trait;
use chrono::Duration;
use lint_env_manager::{
    CancelToken, EnvError, EnvironmentKey, EnvironmentManager, EnvironmentState, ManagerConfig,
    ManualClock, Provisioner, MARKER_FILE,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Provisioner that counts invocations and drops a file into the env dir.
#[derive(Default)]
struct CountingProvisioner {
    calls: AtomicUsize,
    delay_ms: u64,
}

#[async_trait]
impl Provisioner for CountingProvisioner {
    async fn provision(&self, dir: &Path, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        std::fs::write(dir.join("tool"), b"installed")?;
        Ok(())
    }
}

struct FailingProvisioner;

#[async_trait]
impl Provisioner for FailingProvisioner {
    async fn provision(&self, dir: &Path, _cancel: &CancelToken) -> anyhow::Result<()> {
        std::fs::write(dir.join("partial"), b"half")?;
        anyhow::bail!("pip install exited with status 1")
    }
}

struct Fixture {
    _root: TempDir,
    repo: TempDir,
    clock: Arc<ManualClock>,
    manager: Arc<EnvironmentManager>,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let repo = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());
    let manager = Arc::new(EnvironmentManager::with_clock(
        ManagerConfig {
            root: root.path().join("envs"),
            staleness: Duration::days(7),
        },
        clock.clone(),
    ));
    Fixture {
        _root: root,
        repo,
        clock,
        manager,
    }
}

#[tokio::test]
async fn test_concurrent_acquire_provisions_once() {
    let fx = fixture();
    let provisioner = Arc::new(CountingProvisioner {
        delay_ms: 100,
        ..Default::default()
    });
    let cancel = CancelToken::new();

    let (a, b) = tokio::join!(
        fx.manager
            .acquire("python", fx.repo.path(), provisioner.as_ref(), &cancel),
        fx.manager
            .acquire("python", fx.repo.path(), provisioner.as_ref(), &cancel),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.dir, b.dir);
    assert_eq!(a.key, b.key);
    assert_eq!(a.state, EnvironmentState::Ready);
    assert_eq!(fx.manager.holds(&a.key), 2);
    assert!(a.dir.join(MARKER_FILE).exists());
}

#[tokio::test]
async fn test_distinct_languages_get_distinct_environments() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let py = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    let js = fx
        .manager
        .acquire("javascript", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_ne!(py.dir, js.dir);
    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fresh_environment_is_reused_across_managers() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let env = fx
        .manager
        .acquire("go", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&env).unwrap();

    // A second manager over the same root stands in for a later process.
    let later = EnvironmentManager::with_clock(
        ManagerConfig {
            root: fx.manager.root().to_path_buf(),
            staleness: Duration::days(7),
        },
        fx.clock.clone(),
    );
    let again = later
        .acquire("go", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_eq!(again.dir, env.dir);
    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_environment_is_reprovisioned() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let env = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&env).unwrap();

    fx.clock.advance(Duration::days(8));

    let listed = fx.manager.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, EnvironmentState::Stale);

    let fresh = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(fresh.created_at, fx.clock_now());
    assert_eq!(fresh.state, EnvironmentState::Ready);
}

#[tokio::test]
async fn test_stale_but_held_environment_is_not_torn_down() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let held = fx
        .manager
        .acquire("yaml", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.clock.advance(Duration::days(30));

    let second = fx
        .manager
        .acquire("yaml", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(second.dir, held.dir);
    assert!(held.dir.join("tool").exists());
}

#[tokio::test]
async fn test_provisioning_failure_tears_down_directory() {
    let fx = fixture();
    let cancel = CancelToken::new();

    let err = fx
        .manager
        .acquire("python", fx.repo.path(), &FailingProvisioner, &cancel)
        .await
        .unwrap_err();

    match &err {
        EnvError::ProvisioningFailed { language, source } => {
            assert_eq!(language, "python");
            assert!(source.to_string().contains("pip install"));
        }
        other => panic!("expected ProvisioningFailed, got {other:?}"),
    }
    assert_eq!(err.code(), "ProvisioningFailed");

    let key = EnvironmentKey::for_repository("python", fx.repo.path()).unwrap();
    assert!(!fx.manager.root().join(key.dir_name()).exists());
    assert!(!fx.manager.is_held(&key));
    assert!(fx.manager.list().unwrap().is_empty());

    // A later attempt provisions from scratch.
    let provisioner = CountingProvisioner::default();
    let env = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    assert!(!env.dir.join("partial").exists());
}

#[tokio::test]
async fn test_cancelled_acquire_leaves_nothing_behind() {
    let fx = fixture();
    let provisioner = CountingProvisioner {
        delay_ms: 5_000,
        ..Default::default()
    };
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = fx
        .manager
        .acquire("rust", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EnvError::Cancelled));
    let key = EnvironmentKey::for_repository("rust", fx.repo.path()).unwrap();
    assert!(!fx.manager.root().join(key.dir_name()).exists());
}

#[tokio::test]
async fn test_cleanup_removes_released_and_keeps_held() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let released = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&released).unwrap();

    let held = fx
        .manager
        .acquire("javascript", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    let report = fx.manager.evict_all().unwrap();

    assert_eq!(report.removed, vec![released.dir.clone()]);
    assert_eq!(report.retained, vec![held.dir.clone()]);
    assert!(!released.dir.exists());
    assert!(held.dir.join("tool").exists());

    fx.manager.release(&held).unwrap();
    let report = fx.manager.evict_all().unwrap();
    assert_eq!(report.removed, vec![held.dir.clone()]);
    assert!(fx.manager.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_with_no_holds_removes_every_directory() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    for language in ["python", "go", "yaml"] {
        let env = fx
            .manager
            .acquire(language, fx.repo.path(), &provisioner, &cancel)
            .await
            .unwrap();
        fx.manager.release(&env).unwrap();
    }
    // Leftover from an interrupted run, without a marker.
    std::fs::create_dir_all(fx.manager.root().join("orphan_0000")).unwrap();

    let report = fx.manager.evict_all().unwrap();
    assert_eq!(report.removed.len(), 4);
    assert!(report.retained.is_empty());
    let dirs_left = std::fs::read_dir(fx.manager.root())
        .unwrap()
        .filter(|entry| entry.as_ref().unwrap().path().is_dir())
        .count();
    assert_eq!(dirs_left, 0);
}

#[tokio::test]
async fn test_evict_expired_uses_last_used_time() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let old = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&old).unwrap();

    fx.clock.advance(Duration::hours(20));
    let recent = fx
        .manager
        .acquire("go", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&recent).unwrap();

    fx.clock.advance(Duration::hours(5));

    let report = fx.manager.evict_expired(Duration::hours(24)).unwrap();
    assert_eq!(report.removed, vec![old.dir.clone()]);
    assert!(recent.dir.exists());
}

#[tokio::test]
async fn test_cleanup_from_another_process_keeps_held_environment() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let held = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    // A second manager over the same root has no in-memory holds of its own.
    let other = EnvironmentManager::with_clock(
        ManagerConfig {
            root: fx.manager.root().to_path_buf(),
            staleness: Duration::days(7),
        },
        fx.clock.clone(),
    );
    fx.clock.advance(Duration::days(3));

    let report = other.evict_all().unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(report.retained, vec![held.dir.clone()]);
    let report = other.evict_expired(Duration::hours(1)).unwrap();
    assert!(report.removed.is_empty());
    assert!(held.dir.join("tool").exists());

    fx.manager.release(&held).unwrap();
    let report = other.evict_all().unwrap();
    assert_eq!(report.removed, vec![held.dir.clone()]);
    assert!(!held.dir.exists());
}

#[tokio::test]
async fn test_stale_environment_held_by_another_process_is_reused() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let held = fx
        .manager
        .acquire("go", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.clock.advance(Duration::days(30));

    let other = EnvironmentManager::with_clock(
        ManagerConfig {
            root: fx.manager.root().to_path_buf(),
            staleness: Duration::days(7),
        },
        fx.clock.clone(),
    );
    let env = other
        .acquire("go", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(env.dir, held.dir);
    assert!(held.dir.join("tool").exists());
    other.release(&env).unwrap();
    fx.manager.release(&held).unwrap();
}

#[tokio::test]
async fn test_acquire_stamps_last_used_in_marker() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();

    let env = fx
        .manager
        .acquire("yaml", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();
    fx.manager.release(&env).unwrap();

    fx.clock.advance(Duration::hours(30));
    let again = fx
        .manager
        .acquire("yaml", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    let marker = lint_env_manager::LanguageEnvironment::read_marker(&again.dir).unwrap();
    assert_eq!(marker.last_used_at, fx.clock_now());
    assert_eq!(again.last_used_at, fx.clock_now());

    // A later process must not treat the in-use environment as idle.
    let other = EnvironmentManager::with_clock(
        ManagerConfig {
            root: fx.manager.root().to_path_buf(),
            staleness: Duration::days(7),
        },
        fx.clock.clone(),
    );
    let listed = other.list().unwrap();
    assert_eq!(listed[0].last_used_at, fx.clock_now());
    fx.manager.release(&again).unwrap();
}

#[tokio::test]
async fn test_interrupted_provisioning_is_not_reused() {
    let fx = fixture();
    let slow = CountingProvisioner {
        delay_ms: 5_000,
        ..Default::default()
    };
    let cancel = CancelToken::new();

    // Dropping the future mid-provision skips the failure cleanup path.
    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        fx.manager
            .acquire("javascript", fx.repo.path(), &slow, &cancel),
    )
    .await;
    assert!(timed_out.is_err());

    let provisioner = CountingProvisioner::default();
    let env = fx
        .manager
        .acquire("javascript", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(env.state, EnvironmentState::Ready);
    assert!(env.dir.join("tool").exists());
    assert!(env.dir.join(MARKER_FILE).exists());
}

#[tokio::test]
async fn test_release_of_unknown_environment_fails() {
    let fx = fixture();
    let provisioner = CountingProvisioner::default();
    let cancel = CancelToken::new();
    let env = fx
        .manager
        .acquire("python", fx.repo.path(), &provisioner, &cancel)
        .await
        .unwrap();

    let other = EnvironmentManager::new(ManagerConfig {
        root: fx.manager.root().to_path_buf(),
        staleness: Duration::days(7),
    });
    let err = other.release(&env).unwrap_err();
    assert!(matches!(err, EnvError::UnknownEnvironment(_)));
}

impl Fixture {
    fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        use lint_env_manager::Clock;
        self.clock.now()
    }
}
