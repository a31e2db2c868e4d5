//! Access Gateway: capability checks and bounded-staleness snapshots.
//!
//! Every request moves `Authenticated → Authorized → Executed`, or
//! `Authenticated → Denied` when the role lacks the capability. Principals
//! are resolved by the external identity layer; the gateway trusts that
//! resolution and enforces capabilities only.
//!
//! Owners mutate and query the live index. Read-only principals (backup
//! and reporting consumers) only query, and only against a cached snapshot
//! refreshed once it exceeds the configured staleness bound.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChantierConfig;
use crate::error::{Error, Result};
use crate::index::{IndexSnapshot, IndexStats, SearchIndex};
use crate::record::{
    ChangeNotification, RecordId, Role, TaskPatch, TaskRecord, UserRecord,
};
use crate::search::{CancelToken, SearchHit, SearchRequest, SimilarityEngine};
use crate::store::CatalogStore;

/// Capability classes checked by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `search` and `get`.
    Read,
    /// Record mutations and user management.
    Write,
    /// Administrative operations (`rebuild`).
    Admin,
}

impl Role {
    /// Whether this role grants a capability.
    #[must_use]
    pub const fn allows(&self, capability: Capability) -> bool {
        match self {
            Self::Owner => true,
            Self::ReadOnly => matches!(capability, Capability::Read),
        }
    }
}

/// A resolved request principal.
///
/// Produced by the identity/session layer from a [`UserRecord`]; the core
/// only reads the role.
#[derive(Debug, Clone)]
pub struct Principal {
    /// Id of the resolved user.
    pub user_id: RecordId,
    /// Username, carried for audit logging.
    pub username: String,
    /// Capability role.
    pub role: Role,
}

impl Principal {
    /// Builds a principal from a resolved user record.
    #[must_use]
    pub fn for_user(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Healthcheck report for operational tooling.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Index size, version, and rebuild state.
    pub index: IndexStats,
    /// Version observed by the current read-only snapshot.
    pub snapshot_version: u64,
    /// Age of the read-only snapshot in milliseconds.
    pub snapshot_age_ms: u64,
}

/// Role-gated entry point over store, index, and similarity engine.
pub struct AccessGateway<S: CatalogStore> {
    store: Arc<S>,
    index: Arc<SearchIndex>,
    engine: SimilarityEngine,
    pending: Receiver<ChangeNotification>,
    staleness_bound: Duration,
    /// Snapshot served to read-only principals.
    ro_snapshot: Mutex<IndexSnapshot>,
}

impl<S: CatalogStore> AccessGateway<S> {
    /// Wires a gateway over a store and index, subscribing to the store's
    /// change notifications.
    #[must_use]
    pub fn new(store: Arc<S>, index: Arc<SearchIndex>, config: &ChantierConfig) -> Self {
        let pending = store.subscribe();
        let ro_snapshot = Mutex::new(index.snapshot());
        Self {
            store,
            index,
            engine: SimilarityEngine::new(config.search.clone()),
            pending,
            staleness_bound: Duration::from_millis(config.gateway.snapshot_staleness_ms),
            ro_snapshot,
        }
    }

    fn authorize(
        &self,
        principal: &Principal,
        capability: Capability,
        operation: &'static str,
    ) -> Result<()> {
        if principal.role.allows(capability) {
            Ok(())
        } else {
            tracing::warn!(
                user = %principal.username,
                role = %principal.role,
                operation,
                "request denied"
            );
            Err(Error::PermissionDenied {
                role: principal.role,
                operation,
            })
        }
    }

    /// Drains pending change notifications into the index.
    ///
    /// An incremental failure degrades to a scheduled full rebuild rather
    /// than leaving partial state; queries keep running on the last good
    /// index until the rebuild lands.
    fn sync_index(&self) {
        while let Ok(change) = self.pending.try_recv() {
            if let Err(err) = self.index.apply(self.store.as_ref(), &change) {
                tracing::warn!(
                    error = %err,
                    record = %change.id,
                    "incremental index update failed, scheduling rebuild"
                );
                self.index.schedule_rebuild();
                break;
            }
        }
        if self.index.rebuild_pending() {
            self.index.rebuild_from(self.store.scan_tasks());
        }
    }

    /// Snapshot selection per role: owners get a fresh view, read-only
    /// principals the cached one, refreshed past the staleness bound.
    fn read_snapshot(&self, role: Role) -> IndexSnapshot {
        match role {
            Role::Owner => {
                self.sync_index();
                self.index.snapshot()
            }
            Role::ReadOnly => {
                let mut cached = self.ro_snapshot.lock();
                if cached.age() > self.staleness_bound {
                    self.sync_index();
                    *cached = self.index.snapshot();
                    tracing::debug!(version = cached.version, "read-only snapshot refreshed");
                }
                cached.clone()
            }
        }
    }

    /// Creates a task. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for read-only principals, plus any
    /// store-level error.
    pub fn create_task(&self, principal: &Principal, record: TaskRecord) -> Result<RecordId> {
        self.authorize(principal, Capability::Write, "create")?;
        let id = self.store.create_task(record)?;
        self.sync_index();
        Ok(id)
    }

    /// Applies a partial update to a task. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for read-only principals,
    /// [`Error::NotFound`] if the id is absent.
    pub fn update_task(
        &self,
        principal: &Principal,
        id: RecordId,
        patch: &TaskPatch,
    ) -> Result<()> {
        self.authorize(principal, Capability::Write, "update")?;
        self.store.update_task(id, patch)?;
        self.sync_index();
        Ok(())
    }

    /// Deletes a task. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for read-only principals,
    /// [`Error::NotFound`] if the id is absent.
    pub fn delete_task(&self, principal: &Principal, id: RecordId) -> Result<()> {
        self.authorize(principal, Capability::Write, "delete")?;
        self.store.delete_task(id)?;
        self.sync_index();
        Ok(())
    }

    /// Fetches a task by id. Available to every role.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id is absent.
    pub fn get_task(&self, principal: &Principal, id: RecordId) -> Result<TaskRecord> {
        self.authorize(principal, Capability::Read, "get")?;
        self.store.get_task(id)
    }

    /// Exact-name task lookup. Available to every role.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] is the only failure; an unknown name
    /// yields an empty list.
    pub fn find_tasks_by_name(
        &self,
        principal: &Principal,
        name: &str,
    ) -> Result<Vec<TaskRecord>> {
        self.authorize(principal, Capability::Read, "find_by_name")?;
        Ok(self.store.find_tasks_by_name(name))
    }

    /// Runs a fuzzy search. Available to every role.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] / [`Error::Timeout`] from the token.
    pub fn search(
        &self,
        principal: &Principal,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchHit>> {
        self.authorize(principal, Capability::Read, "search")?;
        let snapshot = self.read_snapshot(principal.role);
        self.engine
            .search(&snapshot, self.store.as_ref(), request, cancel)
    }

    /// Creates a user, enforcing email/username uniqueness. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateKey`] naming the conflicting field.
    pub fn create_user(&self, principal: &Principal, record: UserRecord) -> Result<RecordId> {
        self.authorize(principal, Capability::Write, "create_user")?;
        self.store.create_user(record)
    }

    /// Deletes a user. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id is absent.
    pub fn delete_user(&self, principal: &Principal, id: RecordId) -> Result<()> {
        self.authorize(principal, Capability::Write, "delete_user")?;
        self.store.delete_user(id)
    }

    /// Discards the index and rebuilds it from a full store scan. Owner only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for read-only principals.
    pub fn rebuild(&self, principal: &Principal) -> Result<()> {
        self.authorize(principal, Capability::Admin, "rebuild")?;
        self.index.rebuild_from(self.store.scan_tasks());
        Ok(())
    }

    /// Reports index size, version, rebuild state, and read-only snapshot
    /// staleness. Available to every role.
    ///
    /// # Errors
    ///
    /// Never fails authorization for known roles; kept fallible for parity
    /// with the rest of the surface.
    pub fn healthcheck(&self, principal: &Principal) -> Result<HealthReport> {
        self.authorize(principal, Capability::Read, "healthcheck")?;
        let snapshot = self.ro_snapshot.lock();
        Ok(HealthReport {
            index: self.index.stats(),
            snapshot_version: snapshot.version,
            snapshot_age_ms: snapshot.age().as_millis() as u64,
        })
    }
}

impl<S: CatalogStore> std::fmt::Debug for AccessGateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGateway")
            .field("staleness_bound", &self.staleness_bound)
            .finish_non_exhaustive()
    }
}
