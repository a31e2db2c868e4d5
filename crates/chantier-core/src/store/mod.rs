//! Catalog Store Adapter: narrow interface over the durable record store.
//!
//! Everything else in the crate reads through this interface. Per-record
//! atomicity is the contract: no two concurrent mutations to the same
//! identifier interleave, while cross-record writes proceed in parallel.
//! Every successful task mutation emits a [`ChangeNotification`] consumed
//! by the trigram indexer; delivery is at-least-once.

use crossbeam_channel::{Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::{
    ChangeKind, ChangeNotification, FieldKind, RecordId, TaskPatch, TaskRecord, UserRecord,
};


/// Narrow read/write interface over the durable record store.
///
/// The core does not re-implement persistence; this trait is the seam a
/// durable backend plugs into. The in-memory implementation below carries
/// the same atomicity and notification contract.
pub trait CatalogStore: Send + Sync {
    /// Creates a task record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the id already exists and
    /// [`Error::InvalidRecord`] if facet invariants are violated.
    fn create_task(&self, record: TaskRecord) -> Result<RecordId>;

    /// Applies a partial update to a task, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is absent.
    fn update_task(&self, id: RecordId, patch: &TaskPatch) -> Result<()>;

    /// Deletes a task record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is absent.
    fn delete_task(&self, id: RecordId) -> Result<()>;

    /// Fetches a task record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is absent.
    fn get_task(&self, id: RecordId) -> Result<TaskRecord>;

    /// Returns a finite, restartable snapshot scan of all task records.
    fn scan_tasks(&self) -> Vec<TaskRecord>;

    /// Exact-name task lookup.
    ///
    /// Names are not unique; every record carrying the name is returned.
    /// An unknown name yields an empty list.
    fn find_tasks_by_name(&self, name: &str) -> Vec<TaskRecord>;

    /// Creates a user record, enforcing email and username uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] naming the conflicting field.
    fn create_user(&self, record: UserRecord) -> Result<RecordId>;

    /// Fetches a user record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is absent.
    fn get_user(&self, id: RecordId) -> Result<UserRecord>;

    /// Looks up a user by unique username.
    fn find_user_by_username(&self, username: &str) -> Option<UserRecord>;

    /// Deletes a user record, releasing its unique keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the id is absent.
    fn delete_user(&self, id: RecordId) -> Result<()>;

    /// Subscribes to change notifications for task mutations.
    ///
    /// Notifications are sent after the durable write, outside any index
    /// lock. Delivery is at-least-once.
    fn subscribe(&self) -> Receiver<ChangeNotification>;
}

/// In-memory store with the full adapter contract.
///
/// `DashMap` entry locks serialize mutations per record while keeping
/// cross-record writes parallel. Unique keys for users are claimed through
/// dedicated maps with atomic check-and-insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: DashMap<RecordId, TaskRecord>,
    users: DashMap<RecordId, UserRecord>,
    /// Exact index: task name → ids. Names are not unique.
    names: DashMap<String, Vec<RecordId>>,
    /// Unique index: email → user id.
    emails: DashMap<String, RecordId>,
    /// Unique index: username → user id.
    usernames: DashMap<String, RecordId>,
    subscribers: Mutex<Vec<Sender<ChangeNotification>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of task records.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn notify(&self, notification: &ChangeNotification) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    fn unlink_name(&self, name: &str, id: RecordId) {
        if let Some(mut ids) = self.names.get_mut(name) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                drop(ids);
                self.names.remove_if(name, |_, ids| ids.is_empty());
            }
        }
    }
}

impl CatalogStore for MemoryStore {
    fn create_task(&self, record: TaskRecord) -> Result<RecordId> {
        record.validate()?;
        let id = record.id;
        let name = record.name.clone();
        match self.tasks.entry(id) {
            Entry::Occupied(_) => return Err(Error::DuplicateKey { field: "id" }),
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
        self.names.entry(name).or_default().push(id);
        tracing::debug!(%id, "task created");
        self.notify(&ChangeNotification {
            id,
            kind: ChangeKind::Create,
            affected_fields: FieldKind::ALL.to_vec(),
        });
        Ok(id)
    }

    fn update_task(&self, id: RecordId, patch: &TaskPatch) -> Result<()> {
        let affected_fields = {
            // Entry lock serializes concurrent mutations of the same record,
            // which also keeps the name index move in mutation order.
            let mut entry = self.tasks.get_mut(&id).ok_or(Error::NotFound(id))?;
            let mut updated = entry.clone();
            patch.apply_to(&mut updated);
            updated.validate()?;
            if entry.name != updated.name {
                self.unlink_name(&entry.name, id);
                self.names.entry(updated.name.clone()).or_default().push(id);
            }
            *entry = updated;
            patch.affected_fields()
        };
        tracing::debug!(%id, "task updated");
        self.notify(&ChangeNotification {
            id,
            kind: ChangeKind::Update,
            affected_fields,
        });
        Ok(())
    }

    fn delete_task(&self, id: RecordId) -> Result<()> {
        let (_, record) = self.tasks.remove(&id).ok_or(Error::NotFound(id))?;
        self.unlink_name(&record.name, id);
        tracing::debug!(%id, "task deleted");
        self.notify(&ChangeNotification {
            id,
            kind: ChangeKind::Delete,
            affected_fields: Vec::new(),
        });
        Ok(())
    }

    fn get_task(&self, id: RecordId) -> Result<TaskRecord> {
        self.tasks
            .get(&id)
            .map(|r| r.clone())
            .ok_or(Error::NotFound(id))
    }

    fn scan_tasks(&self) -> Vec<TaskRecord> {
        self.tasks.iter().map(|r| r.clone()).collect()
    }

    fn find_tasks_by_name(&self, name: &str) -> Vec<TaskRecord> {
        // Clone the id list before touching the task map so no two shard
        // locks are ever held at once.
        let ids = self
            .names
            .get(name)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|id| self.tasks.get(&id).map(|r| r.clone()))
            .collect()
    }

    fn create_user(&self, record: UserRecord) -> Result<RecordId> {
        let id = record.id;

        // Claim unique keys first; roll back the username claim if the
        // email is already taken.
        match self.usernames.entry(record.username.clone()) {
            Entry::Occupied(_) => return Err(Error::DuplicateKey { field: "username" }),
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }
        match self.emails.entry(record.email.clone()) {
            Entry::Occupied(_) => {
                self.usernames.remove(&record.username);
                return Err(Error::DuplicateKey { field: "email" });
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        match self.users.entry(id) {
            Entry::Occupied(_) => {
                self.usernames.remove(&record.username);
                self.emails.remove(&record.email);
                Err(Error::DuplicateKey { field: "id" })
            }
            Entry::Vacant(entry) => {
                tracing::debug!(%id, username = %record.username, "user created");
                entry.insert(record);
                Ok(id)
            }
        }
    }

    fn get_user(&self, id: RecordId) -> Result<UserRecord> {
        self.users
            .get(&id)
            .map(|r| r.clone())
            .ok_or(Error::NotFound(id))
    }

    fn find_user_by_username(&self, username: &str) -> Option<UserRecord> {
        let id = *self.usernames.get(username)?;
        self.users.get(&id).map(|r| r.clone())
    }

    fn delete_user(&self, id: RecordId) -> Result<()> {
        let (_, record) = self.users.remove(&id).ok_or(Error::NotFound(id))?;
        self.usernames.remove(&record.username);
        self.emails.remove(&record.email);
        tracing::debug!(%id, "user deleted");
        Ok(())
    }

    fn subscribe(&self) -> Receiver<ChangeNotification> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }
}
