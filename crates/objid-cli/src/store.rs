//! A [`ConsumptionStore`] over plain JSON files.
//!
//! Layout under the store directory, per application:
//!
//! - `<app>.json`: `{ "version": n, "record": { ... } }`. The version is the
//!   concurrency token.
//! - `<app>.lock`: exists only while a conditional write is in flight.
//! - `<app>.lease`: the optional update lease, holding the lease ID.
//!
//! `<app>` is the application ID with every byte outside `[A-Za-z0-9-]`
//! escaped as `_XX`, so distinct IDs never share a file.
//!
//! Lock and lease files are created with `create_new`, so exclusivity holds
//! across processes sharing the directory. A commit runs to completion on the
//! blocking pool and removes its lock itself, so dropping the caller's future
//! never strands the lock.

use std::{
    fmt::Write as _,
    fs::{self as std_fs, File},
    io::{ErrorKind, Write as _},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use objid::{AppId, ApplicationRecord, ConsumptionStore, LeaseId, Snapshot, StorageError};
use serde::{Deserialize, Serialize, de::IgnoredAny};
use tokio::{fs, task};

#[derive(Serialize, Deserialize)]
struct Stored<R> {
    version: u64,
    record: R,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates, if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|err| StorageError::transport(format!("creating {}", root.display()), err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, app_id: &AppId, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{extension}", file_stem(app_id)))
    }

    async fn read(&self, app_id: &AppId) -> Result<Option<Stored<ApplicationRecord>>, StorageError> {
        let path = self.path(app_id, "json");
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::transport(format!("reading {}", path.display()), err));
            }
        };
        let stored: Stored<ApplicationRecord> = serde_json::from_slice(&bytes)
            .map_err(|err| StorageError::transport(format!("parsing {}", path.display()), err))?;
        if stored.record.app_id != *app_id {
            return Err(StorageError::transport(
                format!("reading {}", path.display()),
                format!(
                    "file holds the record of `{}`, not `{app_id}`",
                    stored.record.app_id
                ),
            ));
        }
        Ok(Some(stored))
    }

    async fn lease_holder(&self, app_id: &AppId) -> Result<Option<LeaseId>, StorageError> {
        let path = self.path(app_id, "lease");
        match fs::read_to_string(&path).await {
            Ok(holder) => Ok(Some(LeaseId::new(holder.trim()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::transport(format!("reading {}", path.display()), err)),
        }
    }

    async fn write(
        &self,
        app_id: &AppId,
        record: &ApplicationRecord,
        expected: Option<u64>,
        lease: Option<&LeaseId>,
    ) -> Result<u64, StorageError> {
        if let Some(holder) = self.lease_holder(app_id).await? {
            if lease != Some(&holder) {
                return Err(StorageError::LeaseUnavailable {
                    app_id: app_id.clone(),
                });
            }
        }

        let commit = Commit {
            app_id: app_id.clone(),
            record: record.clone(),
            expected,
            lock: self.path(app_id, "lock"),
            path: self.path(app_id, "json"),
            staged: self.path(app_id, "json.tmp"),
        };
        task::spawn_blocking(move || commit.run())
            .await
            .map_err(|err| StorageError::transport("committing record", err))?
    }

    async fn lease(&self, app_id: &AppId) -> Result<Option<LeaseId>, StorageError> {
        let path = self.path(app_id, "lease");
        let owner = app_id.clone();
        let lease = new_lease_id();
        let id = lease.clone();
        // A caller dropped mid-acquire drops the returned guard too, which
        // removes the half-taken lease.
        let guard = task::spawn_blocking(move || take_lease(&owner, path, &id))
            .await
            .map_err(|err| StorageError::transport("acquiring lease", err))??;
        guard.keep();
        Ok(Some(lease))
    }

    async fn unlease(&self, app_id: &AppId, lease: LeaseId) -> Result<(), StorageError> {
        match self.lease_holder(app_id).await? {
            Some(holder) if holder == lease => {}
            // Already gone, or taken over by someone else after ours was removed.
            _ => return Ok(()),
        }
        let path = self.path(app_id, "lease");
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::transport(format!("removing {}", path.display()), err)),
        }
    }
}

impl ConsumptionStore for FileStore {
    type Token = u64;

    async fn fetch(&self, app_id: &AppId) -> Result<Snapshot<u64>, StorageError> {
        self.read(app_id)
            .await?
            .map(|stored| Snapshot {
                record: stored.record,
                token: stored.version,
            })
            .ok_or_else(|| StorageError::NotFound {
                app_id: app_id.clone(),
            })
    }

    async fn conditional_write(
        &self,
        app_id: &AppId,
        record: &ApplicationRecord,
        expected: Option<&u64>,
        lease: Option<&LeaseId>,
    ) -> Result<u64, StorageError> {
        self.write(app_id, record, expected.copied(), lease).await
    }

    async fn acquire_lease(&self, app_id: &AppId) -> Result<Option<LeaseId>, StorageError> {
        self.lease(app_id).await
    }

    async fn release_lease(&self, app_id: &AppId, lease: LeaseId) -> Result<(), StorageError> {
        self.unlease(app_id, lease).await
    }
}

/// One conditional write, executed synchronously under the commit lock.
struct Commit {
    app_id: AppId,
    record: ApplicationRecord,
    expected: Option<u64>,
    lock: PathBuf,
    path: PathBuf,
    staged: PathBuf,
}

impl Commit {
    fn run(self) -> Result<u64, StorageError> {
        let _lock = match create_new(&self.lock) {
            Ok(_) => Removal::new(self.lock.clone()),
            // Another writer is mid-commit; whatever it writes bumps the version.
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::Conflict {
                    app_id: self.app_id,
                });
            }
            Err(err) => {
                return Err(StorageError::transport(
                    format!("creating {}", self.lock.display()),
                    err,
                ));
            }
        };

        let current = self.version()?;
        if current != self.expected {
            return Err(StorageError::Conflict {
                app_id: self.app_id,
            });
        }

        let version = current.map_or(1, |version| version + 1);
        let bytes = serde_json::to_vec_pretty(&Stored {
            version,
            record: &self.record,
        })
        .map_err(|err| StorageError::transport("serializing record", err))?;
        std_fs::write(&self.staged, bytes).map_err(|err| {
            StorageError::transport(format!("writing {}", self.staged.display()), err)
        })?;
        std_fs::rename(&self.staged, &self.path).map_err(|err| {
            StorageError::transport(format!("replacing {}", self.path.display()), err)
        })?;

        tracing::debug!(app_id = %self.app_id, version, "record committed");
        Ok(version)
    }

    fn version(&self) -> Result<Option<u64>, StorageError> {
        let bytes = match std_fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(StorageError::transport(
                    format!("reading {}", self.path.display()),
                    err,
                ));
            }
        };
        serde_json::from_slice::<Stored<IgnoredAny>>(&bytes)
            .map(|stored| Some(stored.version))
            .map_err(|err| StorageError::transport(format!("parsing {}", self.path.display()), err))
    }
}

fn take_lease(app_id: &AppId, path: PathBuf, lease: &LeaseId) -> Result<Removal, StorageError> {
    let mut file = match create_new(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(StorageError::LeaseUnavailable {
                app_id: app_id.clone(),
            });
        }
        Err(err) => {
            return Err(StorageError::transport(format!("creating {}", path.display()), err));
        }
    };
    let guard = Removal::new(path);
    file.write_all(lease.as_str().as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| StorageError::transport(format!("writing {}", guard.path.display()), err))?;
    Ok(guard)
}

fn create_new(path: &Path) -> std::io::Result<File> {
    std_fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

/// Removes a lock or lease file when dropped, unless kept.
struct Removal {
    path: PathBuf,
    armed: bool,
}

impl Removal {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Removal {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std_fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove file");
            }
        }
    }
}

/// Maps an application ID onto a file name stem, one-to-one.
///
/// Bytes outside `[A-Za-z0-9-]` (`_` included) become `_XX` in uppercase hex.
fn file_stem(app_id: &AppId) -> String {
    let mut stem = String::with_capacity(app_id.as_str().len());
    for byte in app_id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            let _ = write!(stem, "_{byte:02X}");
        }
    }
    stem
}

fn new_lease_id() -> LeaseId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    LeaseId::new(format!("{}-{nanos}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use objid::{ConsumptionSet, Range, RangeSet, ReconcileConfig, Reconciler, TokioSleep};

    use super::*;

    fn record(app_id: &str, ids: &[u32]) -> ApplicationRecord {
        ApplicationRecord::new(app_id)
            .with_consumption(ConsumptionSet::from_unsorted([("table", ids.to_vec())]))
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.fetch(&AppId::from("nope")).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn writes_are_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");

        let v1 = store
            .conditional_write(&app, &record("app", &[1]), None, None)
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let v2 = store
            .conditional_write(&app, &record("app", &[1, 2]), Some(&v1), None)
            .await
            .unwrap();
        assert_eq!(v2, 2);

        let snapshot = store.fetch(&app).await.unwrap();
        assert_eq!(snapshot.token, 2);
        assert_eq!(snapshot.record, record("app", &[1, 2]));
    }

    #[tokio::test]
    async fn stale_token_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");

        store
            .conditional_write(&app, &record("app", &[1]), None, None)
            .await
            .unwrap();
        assert!(matches!(
            store
                .conditional_write(&app, &record("app", &[2]), None, None)
                .await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(matches!(
            store
                .conditional_write(&app, &record("app", &[2]), Some(&7), None)
                .await,
            Err(StorageError::Conflict { .. })
        ));
        assert!(!dir.path().join("app.lock").exists());
    }

    #[tokio::test]
    async fn inflight_commit_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("app.lock"), b"").unwrap();

        assert!(matches!(
            store
                .conditional_write(&AppId::from("app"), &record("app", &[1]), None, None)
                .await,
            Err(StorageError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn leases_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");

        let lease = store.acquire_lease(&app).await.unwrap().unwrap();
        assert!(matches!(
            store.acquire_lease(&app).await,
            Err(StorageError::LeaseUnavailable { .. })
        ));
        assert!(matches!(
            store
                .conditional_write(&app, &record("app", &[1]), None, None)
                .await,
            Err(StorageError::LeaseUnavailable { .. })
        ));
        store
            .conditional_write(&app, &record("app", &[1]), None, Some(&lease))
            .await
            .unwrap();

        store.release_lease(&app, lease).await.unwrap();
        assert!(!dir.path().join("app.lease").exists());
        assert!(store.acquire_lease(&app).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn app_ids_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("../escape/me");

        store
            .conditional_write(&app, &record("../escape/me", &[1]), None, None)
            .await
            .unwrap();
        assert!(dir.path().join("_2E_2E_2Fescape_2Fme.json").exists());
        assert_eq!(store.fetch(&app).await.unwrap().record.app_id, app);
    }

    #[tokio::test]
    async fn similar_app_ids_keep_separate_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let dotted = AppId::from("a.b");
        let underscored = AppId::from("a_b");

        store
            .conditional_write(&dotted, &record("a.b", &[1]), None, None)
            .await
            .unwrap();
        assert!(matches!(
            store.fetch(&underscored).await,
            Err(StorageError::NotFound { .. })
        ));

        store
            .conditional_write(&underscored, &record("a_b", &[2]), None, None)
            .await
            .unwrap();
        assert_eq!(store.fetch(&dotted).await.unwrap().record, record("a.b", &[1]));
        assert_eq!(
            store.fetch(&underscored).await.unwrap().record,
            record("a_b", &[2])
        );
        assert_ne!(file_stem(&dotted), file_stem(&underscored));
        assert_ne!(file_stem(&AppId::from("a/b")), file_stem(&AppId::from("a b")));
    }

    #[tokio::test]
    async fn record_of_another_app_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();

        store
            .conditional_write(&AppId::from("one"), &record("one", &[1]), None, None)
            .await
            .unwrap();
        std::fs::copy(dir.path().join("one.json"), dir.path().join("two.json")).unwrap();

        assert!(matches!(
            store.fetch(&AppId::from("two")).await,
            Err(StorageError::Transport { .. })
        ));
    }

    /// Waits for background commits and lease takes to settle.
    async fn until_gone(path: &Path) {
        for _ in 0..200 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} was never removed", path.display());
    }

    #[tokio::test]
    async fn cancelled_writes_release_the_commit_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");
        store
            .conditional_write(&app, &record("app", &[1]), None, None)
            .await
            .unwrap();

        for i in 0..200u32 {
            let rec = record("app", &[1, 2]);
            let write = store.conditional_write(&app, &rec, Some(&1), None);
            let _ = tokio::time::timeout(Duration::from_micros(20 + u64::from(i)), write).await;
        }
        until_gone(&dir.path().join("app.lock")).await;

        let reconciler = Reconciler::<_, TokioSleep>::new(
            store.clone(),
            ReconcileConfig::new()
                .with_max_attempts(20)
                .with_backoff(Duration::from_millis(10)),
        );
        let done = reconciler
            .reconcile(&app, &ConsumptionSet::from_unsorted([("table", [7])]))
            .await
            .unwrap();
        assert!(done.changed);
        assert!(store.fetch(&app).await.unwrap().record.consumption.contains("table", 7));
        until_gone(&dir.path().join("app.lock")).await;
    }

    #[tokio::test]
    async fn cancelled_lease_takes_are_undone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");

        for i in 0..200u32 {
            let take = store.acquire_lease(&app);
            if let Ok(Ok(Some(lease))) =
                tokio::time::timeout(Duration::from_micros(20 + u64::from(i)), take).await
            {
                store.release_lease(&app, lease).await.unwrap();
            }
        }
        let lease_file = dir.path().join("app.lease");
        until_gone(&lease_file).await;

        let mut lease = None;
        for _ in 0..50 {
            match store.acquire_lease(&app).await {
                Ok(taken) => {
                    lease = taken;
                    break;
                }
                Err(StorageError::LeaseUnavailable { .. }) => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        let lease = lease.expect("lease was never free again");
        store.release_lease(&app, lease).await.unwrap();
        assert!(!lease_file.exists());
    }

    #[tokio::test]
    async fn reconciles_through_the_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        let app = AppId::from("app");
        let ranges = RangeSet::new(vec![Range::new(50000, 50099)]).unwrap();
        let reconciler = Reconciler::<_, TokioSleep>::new(
            store.clone(),
            ReconcileConfig::new().with_lease(true),
        );

        let first = ConsumptionSet::from_unsorted([("table", [50000, 50001])]);
        let done = reconciler
            .reconcile_with_ranges(&app, &first, Some(&ranges))
            .await
            .unwrap();
        assert_eq!(done.token, Some(1));

        let second = ConsumptionSet::from_unsorted([("table", [50001, 50005])]);
        let done = reconciler.reconcile(&app, &second).await.unwrap();
        assert_eq!(done.token, Some(2));
        assert_eq!(done.added.ids("table"), &[50005]);

        let snapshot = store.fetch(&app).await.unwrap();
        assert_eq!(snapshot.record.ranges, ranges.to_vec());
        assert_eq!(
            snapshot.record.consumption.ids("table"),
            &[50000, 50001, 50005]
        );
        assert!(!dir.path().join("app.lease").exists());
    }
}
