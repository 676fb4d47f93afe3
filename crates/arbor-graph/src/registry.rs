use serde::de::DeserializeOwned;
use serde::Serialize;

use arbor_client::{Client, Object, ObjectMeta, StoreResult, TypeRegistry};
use arbor_types::TypeTag;

use crate::vertex_map::{
    GlobalVertexMap, GlobalVertexMapBuilder, LocalVertexMap, LocalVertexMapBuilder, VertexId,
};

/// Register factories for the whole closed set of vertex-map variants:
/// both index backends, crossed with `int64`/`string` external identifiers
/// and `uint32`/`uint64` internal widths.
///
/// After this, a reader resolves any published vertex map from its type
/// descriptor alone and downcasts to the concrete variant via `as_any`.
pub fn register_vertex_maps(registry: &TypeRegistry) {
    register_variant::<i64, u32>(registry);
    register_variant::<i64, u64>(registry);
    register_variant::<String, u32>(registry);
    register_variant::<String, u64>(registry);
}

fn register_variant<O, V>(registry: &TypeRegistry)
where
    O: Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
    V: VertexId + Serialize + DeserializeOwned,
{
    fn global_factory<O, V>(meta: &ObjectMeta, client: &dyn Client) -> StoreResult<Box<dyn Object>>
    where
        O: Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
        V: VertexId + Serialize + DeserializeOwned,
    {
        GlobalVertexMap::<O, V>::from_meta(client, meta.clone())
            .map(|map| Box::new(map) as Box<dyn Object>)
    }

    fn local_factory<O, V>(meta: &ObjectMeta, client: &dyn Client) -> StoreResult<Box<dyn Object>>
    where
        O: Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
        V: VertexId + Serialize + DeserializeOwned,
    {
        LocalVertexMap::<O, V>::from_meta(client, meta.clone())
            .map(|map| Box::new(map) as Box<dyn Object>)
    }

    registry.register(
        GlobalVertexMapBuilder::<O, V>::object_type().as_str(),
        global_factory::<O, V>,
    );
    registry.register(
        LocalVertexMapBuilder::<O, V>::object_type().as_str(),
        local_factory::<O, V>,
    );
}
