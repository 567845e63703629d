use std::{path::Path, process::ExitCode};

use anyhow::Context;
use objid::{
    AllocationRequest, AllocationResponse, AppId, ApplicationRecord, ConsumptionError,
    ConsumptionSet, ConsumptionStore, Error, ErrorKind, Pool, PoolDirectory, PoolError, PoolId,
    RangeError, RangeSet, ReconcileError, Reconciler, StorageError, TokioSleep, allocate,
    resolve_effective_source,
};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;

use crate::{
    config::{CliArgs, Command, NextArgs, SyncConfig},
    store::FileStore,
};

pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let CliArgs {
        store_dir, command, ..
    } = args;
    match command {
        Command::Validate { ranges } => validate(&ranges).await,
        Command::Next(next) => next_ids(&store_dir, next).await,
        Command::Sync(sync) => self::sync(&store_dir, SyncConfig::try_from(sync)?).await,
        Command::Show { app_id } => show(&store_dir, AppId::from(app_id)).await,
    }
}

/// Maps a failed command onto a process exit code.
pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    match error_kind(err) {
        Some(ErrorKind::Invalid) => ExitCode::from(2),
        Some(ErrorKind::Retryable) => ExitCode::from(75),
        Some(ErrorKind::Fatal) | None => ExitCode::FAILURE,
    }
}

fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain().find_map(|cause| {
        if let Some(err) = cause.downcast_ref::<Error>() {
            Some(err.kind())
        } else if let Some(err) = cause.downcast_ref::<ReconcileError>() {
            Some(err.kind())
        } else if cause.is::<RangeError>()
            || cause.is::<ConsumptionError>()
            || cause.is::<PoolError>()
        {
            Some(ErrorKind::Invalid)
        } else {
            None
        }
    })
}

async fn validate(path: &Path) -> anyhow::Result<()> {
    let ranges = RangeSet::from_json(&read_json(path).await?)?;
    tracing::info!(ranges = ranges.len(), span = ranges.span(), "ranges are valid");
    print_json(&ranges)
}

async fn next_ids(store_dir: &Path, args: NextArgs) -> anyhow::Result<()> {
    let response = answer(store_dir, args).await?;
    for line in response.results.iter().filter(|line| !line.success) {
        tracing::warn!(
            object_type = %line.object_type,
            found = line.ids.len(),
            "not enough free IDs"
        );
    }
    print_json(&response)
}

/// Resolves the effective ranges and consumption for a request and allocates.
async fn answer(store_dir: &Path, args: NextArgs) -> anyhow::Result<AllocationResponse> {
    let request: AllocationRequest = serde_json::from_value(read_json(&args.request).await?)
        .with_context(|| format!("invalid allocation request in {}", args.request.display()))?;
    let store = FileStore::open(store_dir).await?;

    let mut record = ApplicationRecord::new(request.app_id.clone());
    if !request.ranges.is_empty() {
        record = record.with_ranges(&request.validate()?);
    }
    record.pool_id = match args.pool {
        Some(pool_id) => Some(PoolId::from(pool_id)),
        None => canonical(&store, &request.app_id)
            .await?
            .and_then(|stored| stored.pool_id),
    };

    let directory: PoolDirectory = match &args.pools {
        Some(path) => {
            let pools: Vec<Pool> = serde_json::from_value(read_json(path).await?)
                .with_context(|| format!("invalid pool list in {}", path.display()))?;
            pools.into_iter().collect()
        }
        None => PoolDirectory::new(),
    };
    let source = resolve_effective_source(&record, &directory)?;

    let consumption = match &args.consumption {
        Some(path) => ConsumptionSet::from_json(&read_json(path).await?)?,
        None => canonical(&store, &source.consumption_owner)
            .await?
            .map(|stored| stored.consumption)
            .unwrap_or_default(),
    };

    tracing::debug!(
        app_id = %request.app_id,
        pool_id = ?source.pool_id,
        consumption_owner = %source.consumption_owner,
        "allocating"
    );
    Ok(AllocationResponse {
        app_id: request.app_id,
        results: allocate(&source.ranges, &request.per_type, &consumption),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncReport<'a> {
    app_id: &'a AppId,
    version: Option<u64>,
    attempts: u32,
    changed: bool,
    added: &'a ConsumptionSet,
}

async fn sync(store_dir: &Path, config: SyncConfig) -> anyhow::Result<()> {
    let mut discovered = ConsumptionSet::new();
    for path in &config.discovered {
        let found = ConsumptionSet::from_json(&read_json(path).await?)
            .with_context(|| format!("invalid consumption in {}", path.display()))?;
        discovered = discovered.merge(&found);
    }
    let ranges = match &config.ranges {
        Some(path) => Some(
            RangeSet::from_json(&read_json(path).await?)
                .with_context(|| format!("invalid ranges in {}", path.display()))?,
        ),
        None => None,
    };

    let store = FileStore::open(store_dir).await?;
    tracing::info!(
        app_id = %config.app_id,
        store = %store.root().display(),
        files = config.discovered.len(),
        "syncing consumption"
    );
    let reconciler = Reconciler::<_, TokioSleep>::new(store, config.reconcile);
    let done = reconciler
        .reconcile_with_ranges(&config.app_id, &discovered, ranges.as_ref())
        .await?;

    print_json(&SyncReport {
        app_id: &config.app_id,
        version: done.token,
        attempts: done.attempts,
        changed: done.changed,
        added: &done.added,
    })
}

async fn show(store_dir: &Path, app_id: AppId) -> anyhow::Result<()> {
    let store = FileStore::open(store_dir).await?;
    let snapshot = store.fetch(&app_id).await?;
    print_json(&serde_json::json!({
        "version": snapshot.token,
        "record": snapshot.record,
    }))
}

/// The canonical record of `app_id`, if one has been stored.
async fn canonical(
    store: &FileStore,
    app_id: &AppId,
) -> anyhow::Result<Option<ApplicationRecord>> {
    match store.fetch(app_id).await {
        Ok(snapshot) => Ok(Some(snapshot.record)),
        Err(StorageError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn read_json(path: &Path) -> anyhow::Result<Value> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use objid::Range;

    use super::*;

    #[test]
    fn invalid_input_exits_with_2() {
        let err = anyhow::Error::from(RangeError::EmptyRangeSet).context("invalid ranges in x");
        assert_eq!(error_kind(&err), Some(ErrorKind::Invalid));
    }

    #[test]
    fn exhausted_retries_are_temporary() {
        let err = anyhow::Error::from(ReconcileError::AttemptsExhausted {
            app_id: AppId::from("app"),
            attempts: 5,
        });
        assert_eq!(error_kind(&err), Some(ErrorKind::Retryable));
    }

    #[test]
    fn transport_failures_are_fatal() {
        let err = anyhow::Error::from(ReconcileError::from(StorageError::transport(
            "reading",
            "disk on fire",
        )));
        assert_eq!(error_kind(&err), Some(ErrorKind::Fatal));
    }

    #[test]
    fn unrelated_errors_are_unclassified() {
        assert_eq!(error_kind(&anyhow::anyhow!("boom")), None);
    }

    async fn write_json(dir: &Path, name: &str, value: Value) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_vec(&value).unwrap())
            .await
            .unwrap();
        path
    }

    #[tokio::test]
    async fn sync_merges_every_discovered_file() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let a = write_json(dir.path(), "a.json", serde_json::json!({"table": [3, 1]})).await;
        let b = write_json(dir.path(), "b.json", serde_json::json!({"table": [2], "page": [9]})).await;
        let ranges = write_json(dir.path(), "r.json", serde_json::json!([{"from": 1, "to": 99}])).await;

        let config = SyncConfig {
            app_id: AppId::from("app"),
            discovered: vec![a, b],
            ranges: Some(ranges),
            reconcile: objid::ReconcileConfig::new(),
        };
        sync(&store_dir, config).await.unwrap();

        let store = FileStore::open(&store_dir).await.unwrap();
        let snapshot = store.fetch(&AppId::from("app")).await.unwrap();
        assert_eq!(snapshot.record.ranges, vec![Range::new(1, 99)]);
        assert_eq!(snapshot.record.consumption.ids("table"), &[1, 2, 3]);
        assert_eq!(snapshot.record.consumption.ids("page"), &[9]);
    }

    #[tokio::test]
    async fn sync_rejects_malformed_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_json(dir.path(), "bad.json", serde_json::json!({"table": "nope"})).await;

        let config = SyncConfig {
            app_id: AppId::from("app"),
            discovered: vec![bad],
            ranges: None,
            reconcile: objid::ReconcileConfig::new(),
        };
        let err = sync(&dir.path().join("store"), config).await.unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Invalid));
    }

    #[tokio::test]
    async fn next_uses_pool_owner_ranges_and_shared_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("store");
        let request = write_json(
            dir.path(),
            "request.json",
            serde_json::json!({
                "appId": "member",
                "ranges": [],
                "perType": [{"type": "table"}]
            }),
        )
        .await;
        let pools = write_json(
            dir.path(),
            "pools.json",
            serde_json::json!([{
                "poolId": "p",
                "owner": {"appId": "owner", "ranges": [{"from": 100, "to": 110}]},
                "sharedConsumption": true
            }]),
        )
        .await;

        let store = FileStore::open(&store_dir).await.unwrap();
        let owner = ApplicationRecord::new("owner")
            .with_consumption(ConsumptionSet::from_unsorted([("table", [100, 101])]));
        store
            .conditional_write(&AppId::from("owner"), &owner, None, None)
            .await
            .unwrap();

        let args = NextArgs {
            request,
            consumption: None,
            pools: Some(pools),
            pool: Some("p".to_owned()),
        };
        let response = answer(&store_dir, args).await.unwrap();
        assert_eq!(response.app_id, AppId::from("member"));
        assert_eq!(response.results[0].ids, vec![102]);
        assert!(response.results[0].success);
    }

    #[tokio::test]
    async fn next_without_ranges_or_pool_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let request = write_json(
            dir.path(),
            "request.json",
            serde_json::json!({"appId": "solo", "ranges": [], "perType": []}),
        )
        .await;
        let args = NextArgs {
            request,
            consumption: None,
            pools: None,
            pool: None,
        };
        let err = answer(&dir.path().join("store"), args)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PoolError>(),
            Some(PoolError::NoRanges { .. })
        ));
        assert_eq!(error_kind(&err), Some(ErrorKind::Invalid));
    }
}
