use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use arbor_types::ObjectId;

use crate::client::Client;
use crate::error::{StoreError, StoreResult};
use crate::meta::ObjectMeta;
use crate::object::Object;

/// Reconstructs one concrete object shape from registered metadata.
pub type ObjectFactory = fn(&ObjectMeta, &dyn Client) -> StoreResult<Box<dyn Object>>;

/// Runtime type registry: descriptor string -> factory.
///
/// The read-side half of the variant pattern. Writers register a factory per
/// concrete type descriptor (or per family name); readers resolve any
/// published object from its descriptor alone, with no compile-time knowledge
/// of which variant they received. Resolution tries the exact descriptor
/// first, then the family name before `<`.
pub struct TypeRegistry {
    factories: RwLock<HashMap<String, ObjectFactory>>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory under a descriptor or family name. Re-registration
    /// replaces the prior factory.
    pub fn register(&self, descriptor: impl Into<String>, factory: ObjectFactory) {
        let descriptor = descriptor.into();
        debug!(%descriptor, "registered object factory");
        self.factories
            .write()
            .expect("lock poisoned")
            .insert(descriptor, factory);
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.read().expect("lock poisoned").is_empty()
    }

    /// Reconstruct a published object from metadata already in hand.
    pub fn resolve_meta(
        &self,
        meta: &ObjectMeta,
        client: &dyn Client,
    ) -> StoreResult<Box<dyn Object>> {
        let type_name = meta.type_name();
        let factory = {
            let factories = self.factories.read().expect("lock poisoned");
            factories
                .get(type_name.as_str())
                .or_else(|| factories.get(type_name.base()))
                .copied()
        };
        match factory {
            Some(factory) => factory(meta, client),
            None => Err(StoreError::UnknownType(type_name.to_string())),
        }
    }

    /// Fetch an object's metadata and reconstruct it.
    pub fn resolve(&self, client: &dyn Client, id: ObjectId) -> StoreResult<Box<dyn Object>> {
        let meta = client.get_meta(id)?;
        self.resolve_meta(&meta, client)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("factories", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InProcessClient;
    use arbor_types::TypeName;
    use std::any::Any;

    struct Plain {
        id: ObjectId,
        meta: ObjectMeta,
    }

    impl Object for Plain {
        fn id(&self) -> ObjectId {
            self.id
        }
        fn meta(&self) -> &ObjectMeta {
            &self.meta
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn plain_factory(meta: &ObjectMeta, _client: &dyn Client) -> StoreResult<Box<dyn Object>> {
        Ok(Box::new(Plain {
            id: meta.id(),
            meta: meta.clone(),
        }))
    }

    fn publish(client: &InProcessClient, descriptor: &str) -> ObjectId {
        let meta = ObjectMeta::new(TypeName::parse(descriptor).unwrap());
        client.register_object(meta).unwrap().id()
    }

    #[test]
    fn resolve_by_exact_descriptor() {
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain<int64>", plain_factory);

        let id = publish(&client, "arbor::Plain<int64>");
        let resolved = registry.resolve(&client, id).unwrap();
        assert_eq!(resolved.id(), id);
    }

    #[test]
    fn resolve_falls_back_to_family_name() {
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain", plain_factory);

        let id = publish(&client, "arbor::Plain<string>");
        let resolved = registry.resolve(&client, id).unwrap();
        assert_eq!(resolved.meta().type_name().base(), "arbor::Plain");
    }

    #[test]
    fn exact_descriptor_wins_over_family() {
        fn family_factory(_: &ObjectMeta, _: &dyn Client) -> StoreResult<Box<dyn Object>> {
            Err(StoreError::UnknownType("family factory hit".to_string()))
        }
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain", family_factory);
        registry.register("arbor::Plain<int64>", plain_factory);

        let id = publish(&client, "arbor::Plain<int64>");
        assert!(registry.resolve(&client, id).is_ok());
    }

    #[test]
    fn unknown_descriptor_fails() {
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        let id = publish(&client, "arbor::Nobody");
        let Err(err) = registry.resolve(&client, id) else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, StoreError::UnknownType(_)));
    }

    #[test]
    fn resolve_missing_object_fails() {
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain", plain_factory);
        let Err(err) = registry.resolve(&client, ObjectId::from_parts(client.instance(), 999))
        else {
            panic!("expected resolve to fail");
        };
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn downcast_through_as_any() {
        let client = InProcessClient::new();
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain", plain_factory);

        let id = publish(&client, "arbor::Plain");
        let resolved = registry.resolve(&client, id).unwrap();
        let plain = resolved
            .as_any()
            .downcast_ref::<Plain>()
            .expect("should downcast");
        assert_eq!(plain.id, id);
    }

    #[test]
    fn reregistration_replaces() {
        let registry = TypeRegistry::new();
        registry.register("arbor::Plain", plain_factory);
        registry.register("arbor::Plain", plain_factory);
        assert_eq!(registry.len(), 1);
    }
}
