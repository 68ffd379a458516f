use std::sync::{Arc, RwLock};

use crate::error::{RepocketError, RepocketResult};
use crate::schema::RecordType;

/// Registered record types, keyed by `<namespace>.<TypeName>`.
///
/// Insertion-ordered and safe to share between threads. Pointer resolution
/// looks target types up here.
pub struct Registry {
    types: RwLock<Vec<Arc<RecordType>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(Vec::new()),
        }
    }

    /// Add a record type. Registering the same compound name twice fails.
    pub fn register(&self, record_type: RecordType) -> RepocketResult<Arc<RecordType>> {
        let name = record_type.compound_name();
        let mut types = self
            .types
            .write()
            .map_err(|e| RepocketError::Definition(format!("registry lock poisoned: {e}")))?;
        if types.iter().any(|t| t.compound_name() == name) {
            return Err(RepocketError::Definition(format!(
                "{name} is already registered"
            )));
        }
        let record_type = Arc::new(record_type);
        types.push(Arc::clone(&record_type));
        tracing::debug!(record_type = %name, "registered record type");
        Ok(record_type)
    }

    pub fn get(&self, compound_name: &str) -> Option<Arc<RecordType>> {
        self.types
            .read()
            .ok()?
            .iter()
            .find(|t| t.compound_name() == compound_name)
            .cloned()
    }

    /// Compound names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.types
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|t| t.compound_name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.types.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().expect("lock poisoned").is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.names())
            .finish()
    }
}
