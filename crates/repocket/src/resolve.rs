//! Loading records from the store, following pointers.

use std::cell::RefCell;
use std::sync::Arc;

use repocket_store::KeyValueStore;
use repocket_types::{Envelope, HashKey};

use crate::config::RepocketConfig;
use crate::error::{RepocketError, RepocketResult};
use crate::record::Record;
use crate::registry::Registry;
use crate::schema::RecordType;
use crate::value::Value;

/// Looks up the record a pointer refers to.
pub trait PointerResolver {
    /// Load the record stored at `key`, or `None` when nothing is stored
    /// there.
    fn resolve_pointer(&self, key: &HashKey) -> RepocketResult<Option<Record>>;
}

/// Reconstructs records from hash entries and streaming strings.
///
/// One loader serves one top-level read. It tracks the chain of records
/// being loaded so that pointer cycles and overly deep chains fail with a
/// resolution error instead of recursing forever.
pub struct Loader<'a> {
    registry: &'a Registry,
    store: &'a dyn KeyValueStore,
    config: &'a RepocketConfig,
    visiting: RefCell<Vec<String>>,
}

impl<'a> Loader<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a dyn KeyValueStore,
        config: &'a RepocketConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            visiting: RefCell::new(Vec::new()),
        }
    }

    /// Load one record of `record_type` stored at `key`.
    ///
    /// Store read failures are logged and reported as absent.
    pub fn load(
        &self,
        record_type: &Arc<RecordType>,
        key: &HashKey,
    ) -> RepocketResult<Option<Record>> {
        let key_text = key.to_string();
        {
            let visiting = self.visiting.borrow();
            if visiting.contains(&key_text) {
                return Err(RepocketError::Resolution(format!(
                    "pointer cycle: {} -> {key_text}",
                    visiting.join(" -> ")
                )));
            }
            if visiting.len() >= self.config.max_pointer_depth {
                return Err(RepocketError::Resolution(format!(
                    "pointer chain deeper than {} at {key_text}",
                    self.config.max_pointer_depth
                )));
            }
        }

        self.visiting.borrow_mut().push(key_text);
        let result = self.load_entry(record_type, key);
        self.visiting.borrow_mut().pop();
        result
    }

    fn load_entry(
        &self,
        record_type: &Arc<RecordType>,
        key: &HashKey,
    ) -> RepocketResult<Option<Record>> {
        let entry = match self.store.hash_get_all(&key.to_string()) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "store read failed; treating record as absent");
                return Ok(None);
            }
        };

        let mut values: Vec<Option<Value>> = vec![None; record_type.fields().len()];
        for (name, text) in &entry {
            let Some(index) = record_type.field_index(name) else {
                if self.config.skip_unknown_fields {
                    tracing::warn!(key = %key, field = %name, "skipping undeclared stored field");
                    continue;
                }
                return Err(RepocketError::Resolution(format!(
                    "{key} stores field {name:?}, which {record_type} does not declare"
                )));
            };
            let field = record_type.field_at(index);
            if field.is_streaming() {
                continue;
            }
            let envelope = Envelope::from_json(text)?;
            values[index] = Some(field.attribute().decode_envelope(&envelope, Some(self))?);
        }

        for (index, field) in record_type.fields().iter().enumerate() {
            if !field.is_streaming() {
                continue;
            }
            let stream_key = key.field_key(field.name());
            let bytes = match self.store.string_get(&stream_key) {
                Ok(bytes) => bytes.unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(key = %stream_key, error = %e, "store read failed; stream left empty");
                    Vec::new()
                }
            };
            values[index] = Some(Value::Bytes(bytes));
        }

        let pk = record_type.primary_key_index();
        if values[pk].is_none() {
            let attribute = record_type.field_at(pk).attribute();
            values[pk] = Some(attribute.cast(key.primary_key())?);
        }

        tracing::debug!(key = %key, "loaded record");
        Ok(Some(Record::from_parts(Arc::clone(record_type), values)))
    }
}

impl PointerResolver for Loader<'_> {
    fn resolve_pointer(&self, key: &HashKey) -> RepocketResult<Option<Record>> {
        let name = key.compound_name();
        let record_type = self.registry.get(&name).ok_or_else(|| {
            RepocketError::Reference(format!("{name} is not a registered record type"))
        })?;
        self.load(&record_type, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use repocket_store::{HashEntry, InMemoryStore};

    struct Fixture {
        registry: Registry,
        store: InMemoryStore,
        config: RepocketConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Registry::new();
            registry
                .register(
                    RecordType::builder("App", "Node")
                        .field("label", Attribute::text())
                        .field("next", Attribute::pointer("App.Node").nullable())
                        .field("log", Attribute::byte_stream())
                        .build()
                        .unwrap(),
                )
                .unwrap();
            Self {
                registry,
                store: InMemoryStore::new(),
                config: RepocketConfig::default(),
            }
        }

        fn node_type(&self) -> Arc<RecordType> {
            self.registry.get("App.Node").unwrap()
        }

        fn loader(&self) -> Loader<'_> {
            Loader::new(&self.registry, &self.store, &self.config)
        }

        fn save_node(&self, label: &str, next: Option<&Record>) -> Record {
            let mut node = Record::new(self.node_type(), [("label", label)]).unwrap();
            if let Some(next) = next {
                node.set("next", next.clone()).unwrap();
            }
            node.save(&self.store).unwrap();
            node
        }

        /// Point the stored `from` node at `to`.
        fn link(&self, from: &Record, to: &Record) {
            let envelope = Envelope::new("Pointer", Some(to.hash_key().unwrap().to_string()));
            let fields: HashEntry =
                [("next".to_string(), envelope.to_json().unwrap())].into_iter().collect();
            self.store
                .hash_set(&from.hash_key().unwrap().to_string(), &fields)
                .unwrap();
        }
    }

    #[test]
    fn loads_saved_record() {
        let fx = Fixture::new();
        let mut node = fx.save_node("a", None);
        node.append(&fx.store, "log", "line\n").unwrap();
        let loaded = fx
            .loader()
            .load(&fx.node_type(), &node.hash_key().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(loaded, node);
        assert_eq!(loaded.get("log").unwrap(), &Value::from(b"line\n"));
        assert_eq!(loaded.get("next").unwrap(), &Value::Null);
    }

    #[test]
    fn missing_record_is_none() {
        let fx = Fixture::new();
        let key = fx.node_type().hash_key("3112edba-4b5d-11e5-b02e-6c4008a70392");
        assert!(fx.loader().load(&fx.node_type(), &key).unwrap().is_none());
    }

    #[test]
    fn follows_pointer_chains() {
        let fx = Fixture::new();
        let c = fx.save_node("c", None);
        let b = fx.save_node("b", Some(&c));
        let a = fx.save_node("a", Some(&b));
        let loaded = fx
            .loader()
            .resolve_pointer(&a.hash_key().unwrap())
            .unwrap()
            .unwrap();
        let b_loaded = loaded.get("next").unwrap().as_record().unwrap();
        let c_loaded = b_loaded.get("next").unwrap().as_record().unwrap();
        assert_eq!(b_loaded.get("label").unwrap(), &Value::from("b"));
        assert_eq!(c_loaded.get("label").unwrap(), &Value::from("c"));
    }

    #[test]
    fn cycles_are_resolution_errors() {
        let fx = Fixture::new();
        let b = fx.save_node("b", None);
        let a = fx.save_node("a", Some(&b));
        fx.link(&b, &a);
        let err = fx
            .loader()
            .load(&fx.node_type(), &a.hash_key().unwrap())
            .unwrap_err();
        assert!(matches!(err, RepocketError::Resolution(ref msg) if msg.contains("cycle")), "{err}");

        // Self-reference.
        let c = fx.save_node("c", None);
        fx.link(&c, &c);
        assert!(matches!(
            fx.loader().load(&fx.node_type(), &c.hash_key().unwrap()),
            Err(RepocketError::Resolution(_))
        ));
    }

    #[test]
    fn depth_limit_applies() {
        let mut fx = Fixture::new();
        fx.config.max_pointer_depth = 2;
        let c = fx.save_node("c", None);
        let b = fx.save_node("b", Some(&c));
        let a = fx.save_node("a", Some(&b));
        assert!(fx.loader().load(&fx.node_type(), &b.hash_key().unwrap()).is_ok());
        assert!(matches!(
            fx.loader().load(&fx.node_type(), &a.hash_key().unwrap()),
            Err(RepocketError::Resolution(_))
        ));
    }

    #[test]
    fn dangling_pointer_resolves_to_null() {
        let fx = Fixture::new();
        let b = fx.save_node("b", None);
        let a = fx.save_node("a", Some(&b));
        b.delete(&fx.store).unwrap();
        let loaded = fx
            .loader()
            .load(&fx.node_type(), &a.hash_key().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get("next").unwrap(), &Value::Null);
    }

    #[test]
    fn unregistered_pointer_type_is_a_reference_error() {
        let fx = Fixture::new();
        let key = HashKey::new("Other", "Thing", "3112edba-4b5d-11e5-b02e-6c4008a70392");
        assert!(matches!(
            fx.loader().resolve_pointer(&key),
            Err(RepocketError::Reference(_))
        ));
    }

    #[test]
    fn unknown_stored_fields() {
        let mut fx = Fixture::new();
        let node = fx.save_node("a", None);
        let key = node.hash_key().unwrap();
        let extra: HashEntry = [(
            "legacy".to_string(),
            Envelope::new("Unicode", Some("old".into())).to_json().unwrap(),
        )]
        .into_iter()
        .collect();
        fx.store.hash_set(&key.to_string(), &extra).unwrap();

        let loaded = fx.loader().load(&fx.node_type(), &key).unwrap().unwrap();
        assert_eq!(loaded, node);

        fx.config.skip_unknown_fields = false;
        assert!(matches!(
            fx.loader().load(&fx.node_type(), &key),
            Err(RepocketError::Resolution(_))
        ));
    }

    #[test]
    fn unknown_envelope_type_fails_the_load() {
        let fx = Fixture::new();
        let node = fx.save_node("a", None);
        let key = node.hash_key().unwrap();
        let bad: HashEntry = [(
            "label".to_string(),
            Envelope::new("Complex", Some("1+2j".into())).to_json().unwrap(),
        )]
        .into_iter()
        .collect();
        fx.store.hash_set(&key.to_string(), &bad).unwrap();
        assert!(matches!(
            fx.loader().load(&fx.node_type(), &key),
            Err(RepocketError::Resolution(_))
        ));
    }

    #[test]
    fn offline_store_reads_as_absent() {
        let fx = Fixture::new();
        let node = fx.save_node("a", None);
        fx.store.set_available(false);
        assert!(fx
            .loader()
            .load(&fx.node_type(), &node.hash_key().unwrap())
            .unwrap()
            .is_none());
    }
}
