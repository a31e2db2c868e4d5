//! # Chantier Core
//!
//! Fuzzy catalog search engine for construction-estimation data.
//!
//! Chantier keeps a mutable catalog of task records (discipline, resource
//! type, free-text description) and serves approximate string matching
//! over it: trigram shingles, facet pre-filtering, Jaccard scoring. The
//! index is derived and disposable; it is rebuilt from a full store scan
//! whenever incremental state is suspect. Access is two-tier: read-write
//! owners and read-only consumers served from a bounded-staleness snapshot.
//!
//! ## Quick Start
//!
//! ```rust
//! use chantier_core::{Catalog, Principal, Role, SearchRequest, TaskRecord, UserRecord};
//! use chantier_core::search::CancelToken;
//!
//! let catalog = Catalog::with_defaults().unwrap();
//! let owner = Principal::for_user(&UserRecord::new("chef", "chef@site.fr", Role::Owner));
//!
//! let task = TaskRecord::new(
//!     "slab pour",
//!     "structural",
//!     "concrete",
//!     "pour concrete foundation slab",
//! );
//! catalog.gateway().create_task(&owner, task).unwrap();
//!
//! let hits = catalog
//!     .gateway()
//!     .search(&owner, &SearchRequest::new("concrete foundaton", 10), &CancelToken::none())
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // Acceptable for Jaccard scoring
#![allow(clippy::cast_possible_truncation)] // Millisecond durations fit u64
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod index;
pub mod record;
#[cfg(test)]
mod record_tests;
pub mod search;
#[cfg(test)]
mod search_tests;
pub mod store;

pub use config::{ChantierConfig, ConfigError, GatewayConfig, IndexConfig, SearchConfig};
pub use error::{Error, Result};
pub use gateway::{AccessGateway, Capability, HealthReport, Principal};
pub use index::{FacetFilters, IndexSnapshot, IndexStats, SearchIndex};
pub use record::{
    ChangeKind, ChangeNotification, FieldKind, RecordId, Role, TaskPatch, TaskRecord, UserRecord,
};
pub use search::{CancelToken, SearchHit, SearchRequest, SimilarityEngine};
pub use store::{CatalogStore, MemoryStore};

use std::sync::Arc;

/// Catalog instance wiring store, index, and gateway together.
///
/// Owns the shared structures explicitly; lifecycle is init-on-startup,
/// teardown-on-drop, index rebuildable on demand.
pub struct Catalog {
    store: Arc<MemoryStore>,
    index: Arc<SearchIndex>,
    gateway: AccessGateway<MemoryStore>,
    config: ChantierConfig,
}

impl Catalog {
    /// Creates a catalog with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: ChantierConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(SearchIndex::new(config.index.shard_count));
        let gateway = AccessGateway::new(Arc::clone(&store), Arc::clone(&index), &config);

        tracing::info!(
            shard_count = config.index.shard_count,
            staleness_ms = config.gateway.snapshot_staleness_ms,
            "catalog initialized"
        );

        Ok(Self {
            store,
            index,
            gateway,
            config,
        })
    }

    /// Creates a catalog with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the defaults fail validation (they do
    /// not; kept fallible for parity with [`Catalog::new`]).
    pub fn with_defaults() -> Result<Self> {
        Self::new(ChantierConfig::default())
    }

    /// The role-gated request surface.
    #[must_use]
    pub fn gateway(&self) -> &AccessGateway<MemoryStore> {
        &self.gateway
    }

    /// Direct store access, for wiring a durable backend or tests.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The shared search index.
    #[must_use]
    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ChantierConfig {
        &self.config
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("tasks", &self.store.task_count())
            .field("index_version", &self.index.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::CancelToken;

    fn owner() -> Principal {
        Principal::for_user(&UserRecord::new("chef", "chef@site.fr", Role::Owner))
    }

    #[test]
    fn test_catalog_with_defaults() {
        let catalog = Catalog::with_defaults().unwrap();
        assert_eq!(catalog.store().task_count(), 0);
        assert_eq!(catalog.index().version(), 0);
    }

    #[test]
    fn test_catalog_rejects_invalid_config() {
        let mut config = ChantierConfig::default();
        config.search.default_min_score = 1.5;
        assert!(Catalog::new(config).is_err());
    }

    #[test]
    fn test_create_and_search_roundtrip() {
        let catalog = Catalog::with_defaults().unwrap();
        let owner = owner();

        let task = TaskRecord::new(
            "slab pour",
            "structural",
            "concrete",
            "pour concrete foundation slab",
        );
        let id = catalog.gateway().create_task(&owner, task).unwrap();

        let hits = catalog
            .gateway()
            .search(
                &owner,
                &SearchRequest::new("pour concrete foundation slab", 10),
                &CancelToken::none(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[test]
    fn test_debug_does_not_panic() {
        let catalog = Catalog::with_defaults().unwrap();
        let rendered = format!("{catalog:?}");
        assert!(rendered.contains("Catalog"));
    }
}
