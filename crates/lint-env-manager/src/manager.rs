//! Environment cache with per-key provisioning locks and explicit holds.
//!
//! Every environment lives in its own directory under the cache root,
//! named after its [`EnvironmentKey`]. A ready environment carries a JSON
//! marker ([`MARKER_FILE`]) so a later process can reuse it.
//!
//! Concurrency rules:
//! - provisioning for one key runs under that key's async mutex, so a
//!   second caller waits and then reuses the result
//! - every hold keeps a shared advisory lock on the environment's lock
//!   file until release, so other processes see it too
//! - provisioning and eviction need the exclusive lock; eviction skips
//!   any environment whose lock is taken

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::environment::{EnvironmentKey, EnvironmentState, LanguageEnvironment, MARKER_FILE};
use crate::error::EnvError;
use crate::lock::DirLock;
use crate::Result;

const LOCK_RETRY: std::time::Duration = std::time::Duration::from_millis(25);

/// Installs a language's tooling into an empty environment directory.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()>;
}

/// Cache location and freshness policy.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory holding one subdirectory per environment
    pub root: PathBuf,
    /// Environments older than this (by creation time) are re-provisioned
    pub staleness: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("codefixer"),
            staleness: Duration::days(7),
        }
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Default, Clone)]
pub struct EvictionReport {
    /// Directories that were deleted
    pub removed: Vec<PathBuf>,
    /// Directories kept because a session in any process holds them or is
    /// provisioning them
    pub retained: Vec<PathBuf>,
}

#[derive(Default)]
struct Slot {
    provisioning: tokio::sync::Mutex<()>,
    record: Mutex<Option<LanguageEnvironment>>,
    /// One shared file lock per outstanding hold
    leases: Mutex<Vec<DirLock>>,
}

impl Slot {
    fn record(&self) -> Option<LanguageEnvironment> {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_record(&self, env: Option<LanguageEnvironment>) {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = env;
    }

    fn leases(&self) -> std::sync::MutexGuard<'_, Vec<DirLock>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn holds(&self) -> usize {
        self.leases().len()
    }
}

/// Creates, caches and evicts per-language environments.
pub struct EnvironmentManager {
    root: PathBuf,
    staleness: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<EnvironmentKey, Arc<Slot>>>,
}

impl std::fmt::Debug for EnvironmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentManager")
            .field("root", &self.root)
            .field("staleness", &self.staleness)
            .finish_non_exhaustive()
    }
}

impl EnvironmentManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: config.root,
            staleness: config.staleness,
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire a ready environment for `language` in the repository at `repo`.
    ///
    /// Returns the cached environment when it is still fresh, otherwise
    /// provisions a new one. The caller holds the returned environment
    /// until it passes it to [`release`](Self::release).
    pub async fn acquire(
        &self,
        language: &str,
        repo: &Path,
        provisioner: &dyn Provisioner,
        cancel: &CancelToken,
    ) -> Result<LanguageEnvironment> {
        let key = EnvironmentKey::for_repository(language, repo)?;
        self.acquire_key(key, provisioner, cancel).await
    }

    /// Acquire by explicit key.
    pub async fn acquire_key(
        &self,
        key: EnvironmentKey,
        provisioner: &dyn Provisioner,
        cancel: &CancelToken,
    ) -> Result<LanguageEnvironment> {
        let slot = self.slot(&key);

        let _guard = tokio::select! {
            guard = slot.provisioning.lock() => guard,
            _ = cancel.cancelled() => return Err(EnvError::Cancelled),
        };

        std::fs::create_dir_all(&self.root)?;
        let dir = self.root.join(key.dir_name());
        let lock_path = DirLock::path_for(&self.root, &key);
        let now = self.clock.now();

        // A record left behind by an interrupted provisioning run is not reusable.
        let cached = slot
            .record()
            .filter(|env| env.state == EnvironmentState::Ready)
            .or_else(|| self.ready_marker(&key, &dir));

        if let Some(env) = cached.clone() {
            if self.is_fresh(&env, now) || slot.holds() > 0 {
                let lease = self
                    .wait_for_lock(cancel, || DirLock::try_shared(&lock_path))
                    .await?;
                // Another process may have evicted it while we waited.
                if env.dir.exists() {
                    if self.is_fresh(&env, now) {
                        debug!(environment = %key, "reusing cached environment");
                    } else {
                        // Tearing it down would pull the directory out from
                        // under the session that holds it.
                        warn!(
                            environment = %key,
                            holds = slot.holds(),
                            "stale environment still held; reusing"
                        );
                    }
                    return Ok(self.hold(&slot, env, lease));
                }
            }
        }

        let lease = match DirLock::try_exclusive(&lock_path)? {
            Some(lease) => lease,
            None => {
                if let Some(env) = self.ready_marker(&key, &dir) {
                    if let Some(lease) = DirLock::try_shared(&lock_path)? {
                        warn!(environment = %key, "environment held by another process; reusing");
                        return Ok(self.hold(&slot, env, lease));
                    }
                }
                debug!(environment = %key, "waiting for another process to finish with environment");
                self.wait_for_lock(cancel, || DirLock::try_exclusive(&lock_path)).await?
            }
        };

        // Another process may have provisioned it while we waited.
        if let Some(env) = self
            .ready_marker(&key, &dir)
            .filter(|env| self.is_fresh(env, self.clock.now()))
        {
            lease.downgrade()?;
            debug!(environment = %key, "reusing environment provisioned elsewhere");
            return Ok(self.hold(&slot, env, lease));
        }

        if let Some(mut env) = cached {
            info!(environment = %key, created_at = %env.created_at, "environment stale; re-provisioning");
            env.state = EnvironmentState::Stale;
            slot.set_record(Some(env));
        }

        let env = self.provision(&key, &slot, &dir, provisioner, cancel).await?;
        lease.downgrade()?;
        Ok(self.hold(&slot, env, lease))
    }

    /// Register one hold: stamp the use time, persist it, and keep the lease.
    fn hold(
        &self,
        slot: &Slot,
        mut env: LanguageEnvironment,
        lease: DirLock,
    ) -> LanguageEnvironment {
        env.state = EnvironmentState::Ready;
        env.last_used_at = self.clock.now();
        if let Err(err) = env.write_marker() {
            warn!(environment = %env.key, error = %err, "failed to update environment marker");
        }
        slot.set_record(Some(env.clone()));
        slot.leases().push(lease);
        env
    }

    fn ready_marker(&self, key: &EnvironmentKey, dir: &Path) -> Option<LanguageEnvironment> {
        LanguageEnvironment::read_marker(dir)
            .filter(|env| &env.key == key && env.state == EnvironmentState::Ready)
    }

    async fn wait_for_lock<F>(&self, cancel: &CancelToken, mut attempt: F) -> Result<DirLock>
    where
        F: FnMut() -> std::io::Result<Option<DirLock>>,
    {
        loop {
            if let Some(lock) = attempt()? {
                return Ok(lock);
            }
            tokio::select! {
                _ = tokio::time::sleep(LOCK_RETRY) => {}
                _ = cancel.cancelled() => return Err(EnvError::Cancelled),
            }
        }
    }

    async fn provision(
        &self,
        key: &EnvironmentKey,
        slot: &Slot,
        dir: &Path,
        provisioner: &dyn Provisioner,
        cancel: &CancelToken,
    ) -> Result<LanguageEnvironment> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;

        let started = self.clock.now();
        slot.set_record(Some(LanguageEnvironment {
            key: key.clone(),
            dir: dir.to_path_buf(),
            state: EnvironmentState::Provisioning,
            created_at: started,
            last_used_at: started,
        }));

        info!(environment = %key, dir = %dir.display(), "provisioning environment");

        let outcome = tokio::select! {
            result = provisioner.provision(dir, cancel) => result,
            _ = cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
        };

        if let Err(err) = outcome {
            slot.set_record(None);
            if let Err(cleanup) = std::fs::remove_dir_all(dir) {
                warn!(dir = %dir.display(), error = %cleanup, "failed to tear down environment");
            }
            if cancel.is_cancelled() {
                return Err(EnvError::Cancelled);
            }
            warn!(environment = %key, error = %err, "provisioning failed");
            return Err(EnvError::ProvisioningFailed {
                language: key.language.clone(),
                source: err.into(),
            });
        }

        let now = self.clock.now();
        let env = LanguageEnvironment {
            key: key.clone(),
            dir: dir.to_path_buf(),
            state: EnvironmentState::Ready,
            created_at: now,
            last_used_at: now,
        };
        if let Err(err) = env.write_marker() {
            slot.set_record(None);
            let _ = std::fs::remove_dir_all(dir);
            return Err(err);
        }
        slot.set_record(Some(env.clone()));

        info!(
            event = "env.provisioned",
            environment = %key,
            duration_ms = (now - started).num_milliseconds(),
            "environment ready"
        );
        Ok(env)
    }

    /// Release a hold taken by `acquire`, stamping the last-used time.
    pub fn release(&self, env: &LanguageEnvironment) -> Result<()> {
        let slot = self
            .existing_slot(&env.key)
            .ok_or_else(|| EnvError::UnknownEnvironment(env.key.to_string()))?;

        let now = self.clock.now();
        let mut record = slot.record().unwrap_or_else(|| env.clone());
        record.last_used_at = now;
        if record.state == EnvironmentState::Ready {
            if let Err(err) = record.write_marker() {
                warn!(environment = %env.key, error = %err, "failed to update environment marker");
            }
        }
        slot.set_record(Some(record));

        // Dropping the lease releases its shared lock.
        drop(slot.leases().pop());
        debug!(environment = %env.key, holds = slot.holds(), "released environment");
        Ok(())
    }

    /// Number of in-flight holds on `key`.
    pub fn holds(&self, key: &EnvironmentKey) -> usize {
        self.existing_slot(key).map(|s| s.holds()).unwrap_or(0)
    }

    pub fn is_held(&self, key: &EnvironmentKey) -> bool {
        self.holds(key) > 0
    }

    /// Delete environments unused for longer than `max_age` that nobody holds.
    pub fn evict_expired(&self, max_age: Duration) -> Result<EvictionReport> {
        let now = self.clock.now();
        self.evict_where(|last_used| now - last_used > max_age)
    }

    /// Delete every environment that nobody holds.
    pub fn evict_all(&self) -> Result<EvictionReport> {
        self.evict_where(|_| true)
    }

    fn evict_where<F>(&self, should_evict: F) -> Result<EvictionReport>
    where
        F: Fn(DateTime<Utc>) -> bool,
    {
        let mut report = EvictionReport::default();
        if !self.root.exists() {
            return Ok(report);
        }

        let by_dir: HashMap<String, (EnvironmentKey, Arc<Slot>)> = self
            .lock_slots()
            .iter()
            .map(|(k, s)| (k.dir_name(), (k.clone(), Arc::clone(s))))
            .collect();

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let marker = LanguageEnvironment::read_marker(&dir);
            let slot = marker
                .as_ref()
                .and_then(|env| self.existing_slot(&env.key))
                .or_else(|| by_dir.get(&name).map(|(_, s)| Arc::clone(s)));

            // The guards keep acquires for this key out until the
            // directory is gone, in this process and in others.
            let _guard = match &slot {
                Some(slot) => {
                    if slot.holds() > 0 {
                        debug!(dir = %dir.display(), "environment held; skipping");
                        report.retained.push(dir);
                        continue;
                    }
                    match slot.provisioning.try_lock() {
                        Ok(guard) => Some(guard),
                        Err(_) => {
                            debug!(dir = %dir.display(), "environment busy; skipping");
                            report.retained.push(dir);
                            continue;
                        }
                    }
                }
                None => None,
            };
            let lock_path = DirLock::path_for_dir_name(&self.root, &name);
            let _lock = match DirLock::try_exclusive(&lock_path)? {
                Some(lock) => lock,
                None => {
                    debug!(dir = %dir.display(), "environment held by another process; skipping");
                    report.retained.push(dir);
                    continue;
                }
            };

            let last_used = match (&marker, slot.as_ref().and_then(|s| s.record())) {
                (_, Some(record)) => record.last_used_at,
                (Some(env), None) => env.last_used_at,
                (None, None) => modified_at(&dir).unwrap_or_else(|| self.clock.now()),
            };

            if !should_evict(last_used) {
                continue;
            }

            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    if let Some(slot) = &slot {
                        let deleted = slot.record().map(|mut env| {
                            env.state = EnvironmentState::Deleted;
                            env
                        });
                        slot.set_record(deleted);
                    }
                    info!(event = "env.evicted", dir = %dir.display(), "evicted environment");
                    report.removed.push(dir);
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "failed to evict environment");
                }
            }
        }

        Ok(report)
    }

    /// Every environment found under the cache root, sorted by key.
    ///
    /// State is reported as `Stale` once an environment is past the
    /// staleness threshold.
    pub fn list(&self) -> Result<Vec<LanguageEnvironment>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let mut envs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.join(MARKER_FILE).exists() {
                continue;
            }
            let Some(mut env) = LanguageEnvironment::read_marker(&path) else {
                continue;
            };
            if let Some(record) = self.existing_slot(&env.key).and_then(|s| s.record()) {
                env.last_used_at = record.last_used_at.max(env.last_used_at);
            }
            if env.state == EnvironmentState::Ready && !self.is_fresh(&env, now) {
                env.state = EnvironmentState::Stale;
            }
            envs.push(env);
        }
        envs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(envs)
    }

    fn is_fresh(&self, env: &LanguageEnvironment, now: DateTime<Utc>) -> bool {
        env.dir.exists() && now - env.created_at <= self.staleness
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<EnvironmentKey, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, key: &EnvironmentKey) -> Arc<Slot> {
        Arc::clone(self.lock_slots().entry(key.clone()).or_default())
    }

    fn existing_slot(&self, key: &EnvironmentKey) -> Option<Arc<Slot>> {
        self.lock_slots().get(key).cloned()
    }
}

fn modified_at(dir: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(dir).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
