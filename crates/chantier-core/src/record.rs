//! Catalog record types: tasks, users, roles, change notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque, globally unique record identifier.
///
/// Random 128-bit values generated without coordination; collision
/// probability is treated as negligible, not handled as an error path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID (deserialization, tests).
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// An estimation task in the catalog.
///
/// `discipline` and `resource_type` are categorical facets; `description`
/// is the free text the fuzzy index matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique identifier, immutable after creation.
    pub id: RecordId,
    /// Short task label (exact lookup, not fuzzy-indexed).
    pub name: String,
    /// Discipline facet, e.g. "structural", "electrical". Never empty.
    pub discipline: String,
    /// Resource type facet, e.g. "concrete", "steel". Never empty.
    pub resource_type: String,
    /// Free-text description, fuzzy-indexed.
    pub description: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Last mutation time, epoch milliseconds.
    pub updated_at: i64,
}

impl TaskRecord {
    /// Builds a new task with a generated id and current timestamps.
    #[must_use]
    pub fn new(name: &str, discipline: &str, resource_type: &str, description: &str) -> Self {
        let now = now_millis();
        Self {
            id: RecordId::generate(),
            name: name.to_string(),
            discipline: discipline.to_string(),
            resource_type: resource_type.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the indexing invariants: facets must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRecord`] if `discipline` or
    /// `resource_type` is blank.
    pub fn validate(&self) -> crate::Result<()> {
        if self.discipline.trim().is_empty() {
            return Err(crate::Error::InvalidRecord(
                "discipline must not be empty".to_string(),
            ));
        }
        if self.resource_type.trim().is_empty() {
            return Err(crate::Error::InvalidRecord(
                "resource_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update for a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New task label, if changed.
    pub name: Option<String>,
    /// New discipline facet, if changed.
    pub discipline: Option<String>,
    /// New resource type facet, if changed.
    pub resource_type: Option<String>,
    /// New description, if changed.
    pub description: Option<String>,
}

impl TaskPatch {
    /// Returns the indexed fields this patch touches.
    #[must_use]
    pub fn affected_fields(&self) -> Vec<FieldKind> {
        let mut fields = Vec::with_capacity(3);
        if self.description.is_some() {
            fields.push(FieldKind::Description);
        }
        if self.discipline.is_some() {
            fields.push(FieldKind::Discipline);
        }
        if self.resource_type.is_some() {
            fields.push(FieldKind::ResourceType);
        }
        fields
    }

    /// Applies the patch in place and bumps `updated_at`.
    pub fn apply_to(&self, record: &mut TaskRecord) {
        if let Some(name) = &self.name {
            record.name.clone_from(name);
        }
        if let Some(discipline) = &self.discipline {
            record.discipline.clone_from(discipline);
        }
        if let Some(resource_type) = &self.resource_type {
            record.resource_type.clone_from(resource_type);
        }
        if let Some(description) = &self.description {
            record.description.clone_from(description);
        }
        record.updated_at = now_millis();
    }
}

/// Access role of a catalog user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Full read-write access, including administrative operations.
    Owner,
    /// Query-only access served from a bounded-staleness snapshot.
    /// Used by backup and reporting consumers.
    ReadOnly,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// A catalog user. `email` and `username` are unique across the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// Unique login name.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Capability role.
    pub role: Role,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
}

impl UserRecord {
    /// Builds a new user with a generated id.
    #[must_use]
    pub fn new(username: &str, email: &str, role: Role) -> Self {
        Self {
            id: RecordId::generate(),
            username: username.to_string(),
            email: email.to_string(),
            role,
            created_at: now_millis(),
        }
    }
}

/// Indexed text fields of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Free-text description.
    Description,
    /// Discipline facet.
    Discipline,
    /// Resource type facet.
    ResourceType,
}

impl FieldKind {
    /// All indexed fields, in storage order.
    pub const ALL: [Self; 3] = [Self::Description, Self::Discipline, Self::ResourceType];

    /// Extracts this field's value from a task.
    #[must_use]
    pub fn value_of<'a>(&self, record: &'a TaskRecord) -> &'a str {
        match self {
            Self::Description => &record.description,
            Self::Discipline => &record.discipline,
            Self::ResourceType => &record.resource_type,
        }
    }
}

/// Kind of mutation a change notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Record was created.
    Create,
    /// Record was updated in place.
    Update,
    /// Record was deleted.
    Delete,
}

/// Emitted by the store after every successful task mutation.
///
/// Delivery is at-least-once; the indexer's update path is idempotent so
/// duplicates never corrupt the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Affected record.
    pub id: RecordId,
    /// Kind of mutation.
    pub kind: ChangeKind,
    /// Indexed fields touched by the mutation. Empty for deletes.
    pub affected_fields: Vec<FieldKind>,
}
