//! The storage contract the reconciliation coordinator depends on.
//!
//! Durable storage is an external collaborator. The engine only needs three
//! primitives: read a snapshot with an opaque concurrency token, write back
//! conditionally on that token, and optionally hold an update lease.

use core::{fmt, future::Future};
use std::sync::Arc;

use crate::{AppId, ApplicationRecord};

/// A canonical record together with the token identifying its version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<T> {
    pub record: ApplicationRecord,
    pub token: T,
}

/// Identifies an update lease held on one application's record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LeaseId(String);

impl LeaseId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures reported by a [`ConsumptionStore`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// No record exists yet for this application.
    #[error("no record stored for application {app_id}")]
    NotFound { app_id: AppId },

    /// The expected token no longer matches: another writer got there first.
    #[error("record of application {app_id} was modified concurrently")]
    Conflict { app_id: AppId },

    /// Another writer currently holds the update lease.
    #[error("update lease for application {app_id} is held by another writer")]
    LeaseUnavailable { app_id: AppId },

    /// The backend could not be reached or failed unexpectedly.
    #[error("storage failure: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StorageError {
    /// A transport failure with a cause.
    pub fn transport(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Returns `true` for failures caused by a concurrent writer, which the
    /// coordinator resolves by fetching again.
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::LeaseUnavailable { .. })
    }
}

/// Durable, per-application storage of canonical records.
///
/// Implementations must make [`Self::conditional_write`] atomic: either the
/// stored token equals `expected` and the record is replaced, or nothing
/// changes and [`StorageError::Conflict`] is returned. That single primitive
/// is all the coordinator relies on to serialize concurrent writers, which may
/// live in different processes.
///
/// Leases are optional. The default implementations report that leasing is
/// unsupported, in which case the coordinator relies on optimistic retries
/// alone.
pub trait ConsumptionStore {
    /// Opaque version token, e.g. an ETag or a revision counter.
    type Token: Clone + fmt::Debug + Send + Sync;

    /// Reads the current record and its token.
    ///
    /// Returns [`StorageError::NotFound`] for an application never written.
    fn fetch(
        &self,
        app_id: &AppId,
    ) -> impl Future<Output = Result<Snapshot<Self::Token>, StorageError>> + Send;

    /// Replaces the record if the stored token still equals `expected`.
    ///
    /// `expected == None` means create-if-absent. Returns the new token.
    fn conditional_write(
        &self,
        app_id: &AppId,
        record: &ApplicationRecord,
        expected: Option<&Self::Token>,
        lease: Option<&LeaseId>,
    ) -> impl Future<Output = Result<Self::Token, StorageError>> + Send;

    /// Acquires an update lease. `Ok(None)` means leasing is unsupported.
    fn acquire_lease(
        &self,
        app_id: &AppId,
    ) -> impl Future<Output = Result<Option<LeaseId>, StorageError>> + Send {
        let _ = app_id;
        core::future::ready(Ok(None))
    }

    /// Releases a lease obtained from [`Self::acquire_lease`].
    fn release_lease(
        &self,
        app_id: &AppId,
        lease: LeaseId,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        let _ = (app_id, lease);
        core::future::ready(Ok(()))
    }
}

impl<S: ConsumptionStore + Send + Sync + ?Sized> ConsumptionStore for Arc<S> {
    type Token = S::Token;

    fn fetch(
        &self,
        app_id: &AppId,
    ) -> impl Future<Output = Result<Snapshot<Self::Token>, StorageError>> + Send {
        (**self).fetch(app_id)
    }

    fn conditional_write(
        &self,
        app_id: &AppId,
        record: &ApplicationRecord,
        expected: Option<&Self::Token>,
        lease: Option<&LeaseId>,
    ) -> impl Future<Output = Result<Self::Token, StorageError>> + Send {
        (**self).conditional_write(app_id, record, expected, lease)
    }

    fn acquire_lease(
        &self,
        app_id: &AppId,
    ) -> impl Future<Output = Result<Option<LeaseId>, StorageError>> + Send {
        (**self).acquire_lease(app_id)
    }

    fn release_lease(
        &self,
        app_id: &AppId,
        lease: LeaseId,
    ) -> impl Future<Output = Result<(), StorageError>> + Send {
        (**self).release_lease(app_id, lease)
    }
}
