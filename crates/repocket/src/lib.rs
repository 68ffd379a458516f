//! Active-record mapping of typed records onto a key-value store.
//!
//! Each record is stored as one hash entry whose values are self-describing
//! envelopes, plus one plain string entry per streaming field:
//!
//! ```text
//! repocket:App:User:<uuid>             hash   field -> {"module": ..., "type": ..., "value": ...}
//! repocket:App:User:<uuid>:field:bio   string raw bytes, append-only
//! ```
//!
//! Pointer fields store the hash key of another record and are resolved
//! back into full records on load.
//!
//! # Example
//!
//! ```
//! use repocket::{Attribute, RecordType, Repocket};
//!
//! let session = Repocket::in_memory();
//! let users = session
//!     .register(
//!         RecordType::builder("App", "User")
//!             .field("email", Attribute::text())
//!             .build()?,
//!     )?;
//! let user = users.create([("email", "foo@bar.com")])?;
//! assert_eq!(users.get(user.id().unwrap())?, Some(user));
//! # Ok::<(), repocket::RepocketError>(())
//! ```

pub mod attribute;
pub mod config;
pub mod error;
pub mod manager;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod schema;
pub mod value;

use std::sync::Arc;

pub use attribute::{Attribute, AttributeKind, EmptyValue, TextEncoding};
pub use config::RepocketConfig;
pub use error::{RepocketError, RepocketResult};
pub use manager::Manager;
pub use record::{Record, SavedKeys, SerializedRecord};
pub use registry::Registry;
pub use resolve::{Loader, PointerResolver};
pub use schema::{Field, RecordType, RecordTypeBuilder};
pub use value::Value;

pub use repocket_store::{InMemoryStore, KeyValueStore, StoreError};
pub use repocket_types::{Decimal, Envelope, HashKey, TypeError};

/// A store, a registry of record types, and configuration.
#[derive(Clone)]
pub struct Repocket {
    registry: Arc<Registry>,
    store: Arc<dyn KeyValueStore>,
    config: Arc<RepocketConfig>,
}

impl Repocket {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            store,
            config: Arc::new(RepocketConfig::default()),
        }
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: RepocketConfig) -> RepocketResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(Registry::new()),
            store,
            config: Arc::new(config),
        })
    }

    /// A session over a fresh [`InMemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Register a record type and return its manager.
    pub fn register(&self, record_type: RecordType) -> RepocketResult<Manager> {
        let record_type = self.registry.register(record_type)?;
        Ok(self.manager(record_type))
    }

    /// Manager of an already registered type, by `<namespace>.<TypeName>`.
    pub fn objects(&self, compound_name: &str) -> RepocketResult<Manager> {
        self.registry
            .get(compound_name)
            .map(|t| self.manager(t))
            .ok_or_else(|| {
                RepocketError::Resolution(format!("{compound_name} is not a registered record type"))
            })
    }

    fn manager(&self, record_type: Arc<RecordType>) -> Manager {
        Manager::new(
            record_type,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.config),
        )
    }

    /// A loader for decoding pointers outside a manager.
    pub fn loader(&self) -> Loader<'_> {
        Loader::new(&self.registry, self.store.as_ref(), &self.config)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &RepocketConfig {
        &self.config
    }
}

impl std::fmt::Debug for Repocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repocket")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
