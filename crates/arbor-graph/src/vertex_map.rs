use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use arbor_client::{Client, Object, ObjectBuilder, ObjectMeta, StoreError, StoreResult};
use arbor_types::{ObjectId, TypeName, TypeTag};
use arbor_ds::{Hashmap, HashmapBuilder};

/// Internal vertex-identifier width: one of the closed set of integer types
/// a fragment may number its vertices with.
pub trait VertexId: TypeTag + Copy + Eq + Hash + Send + Sync + 'static {
    /// Width of the identifier in bits.
    const BITS: u32;

    /// Narrowing conversion; `None` when `raw` exceeds the width.
    fn from_u64(raw: u64) -> Option<Self>;

    /// Widening conversion.
    fn to_u64(self) -> u64;
}

impl VertexId for u32 {
    const BITS: u32 = 32;

    fn from_u64(raw: u64) -> Option<Self> {
        u32::try_from(raw).ok()
    }

    fn to_u64(self) -> u64 {
        self as u64
    }
}

impl VertexId for u64 {
    const BITS: u32 = 64;

    fn from_u64(raw: u64) -> Option<Self> {
        Some(raw)
    }

    fn to_u64(self) -> u64 {
        self
    }
}

/// Bits needed to tell `partition_count` partitions apart.
fn partition_bits(partition_count: usize) -> u32 {
    if partition_count <= 1 {
        0
    } else {
        (partition_count - 1).ilog2() + 1
    }
}

// ---------------------------------------------------------------------------
// Globally-coordinated backend
// ---------------------------------------------------------------------------

/// Builder for a globally-coordinated vertex map.
///
/// Assigns every external vertex identifier an internal id that is unique
/// across all partitions: the partition number rides in the high bits, a
/// dense per-partition index in the low bits. One oid-to-vid hashmap per
/// partition persists as a child object.
pub struct GlobalVertexMapBuilder<O, V> {
    partition_bits: u32,
    partitions: Vec<HashmapBuilder<O, V>>,
}

impl<O, V> GlobalVertexMapBuilder<O, V>
where
    O: Hash + Eq,
    V: VertexId,
{
    /// A builder spanning `partition_count` partitions.
    pub fn new(partition_count: usize) -> StoreResult<Self> {
        if partition_count == 0 {
            return Err(StoreError::InvalidLayout(
                "vertex map needs at least one partition".to_string(),
            ));
        }
        let bits = partition_bits(partition_count);
        if bits >= V::BITS {
            return Err(StoreError::InvalidLayout(format!(
                "{partition_count} partitions do not fit a {}-bit vertex id",
                V::BITS
            )));
        }
        Ok(Self {
            partition_bits: bits,
            partitions: (0..partition_count).map(|_| HashmapBuilder::new()).collect(),
        })
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total vertices registered across all partitions.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(HashmapBuilder::len).sum()
    }

    /// Returns `true` if no vertex has been registered.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(HashmapBuilder::is_empty)
    }

    /// Register an external identifier in a partition and return its
    /// internal id. Registering the same identifier again returns the id
    /// already assigned.
    pub fn add_vertex(&mut self, partition: usize, oid: O) -> StoreResult<V> {
        let partition_count = self.partitions.len();
        let map = self.partitions.get_mut(partition).ok_or_else(|| {
            StoreError::InvalidLayout(format!(
                "partition {partition} out of range (partition count {partition_count})"
            ))
        })?;
        if let Some(vid) = map.get(&oid) {
            return Ok(*vid);
        }
        let index = map.len() as u64;
        let vid = Self::encode(self.partition_bits, partition, index)?;
        map.insert(oid, vid);
        Ok(vid)
    }

    fn encode(bits: u32, partition: usize, index: u64) -> StoreResult<V> {
        let shift = V::BITS - bits;
        if shift < 64 && index >= (1u64 << shift) {
            return Err(StoreError::InvalidLayout(format!(
                "partition {partition} exhausted its {}-bit index range",
                shift
            )));
        }
        let raw = if bits == 0 {
            index
        } else {
            ((partition as u64) << shift) | index
        };
        V::from_u64(raw).ok_or_else(|| {
            StoreError::InvalidLayout(format!(
                "vertex id {raw} exceeds the {}-bit identifier width",
                V::BITS
            ))
        })
    }
}

impl<O, V> GlobalVertexMapBuilder<O, V>
where
    O: TypeTag,
    V: TypeTag,
{
    pub(crate) fn object_type() -> TypeName {
        TypeName::parameterized("arbor::GlobalVertexMap", &[O::type_tag(), V::type_tag()])
    }
}

impl<O, V> fmt::Debug for GlobalVertexMapBuilder<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalVertexMapBuilder")
            .field("partition_count", &self.partitions.len())
            .field("partition_bits", &self.partition_bits)
            .finish()
    }
}

impl<O, V> ObjectBuilder for GlobalVertexMapBuilder<O, V>
where
    O: Hash + Eq + Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
    V: VertexId + Serialize + DeserializeOwned,
{
    type Output = GlobalVertexMap<O, V>;

    fn finalize(self, client: &dyn Client) -> StoreResult<GlobalVertexMap<O, V>> {
        let partition_bits = self.partition_bits;
        let num_vertices = self.len() as u64;

        let mut meta = ObjectMeta::new(Self::object_type());
        meta.set_uint("partition_count", self.partitions.len() as u64);
        meta.set_uint("num_vertices", num_vertices);

        let mut partitions = Vec::with_capacity(self.partitions.len());
        for (p, map) in self.partitions.into_iter().enumerate() {
            let sealed = map.finalize(client)?;
            meta.set_member(&format!("oid_to_vid_{p}"), sealed.id());
            partitions.push(sealed);
        }

        let meta = client.register_object(meta)?;
        debug!(id = %meta.id(), num_vertices, "sealed global vertex map");

        Ok(GlobalVertexMap {
            id: meta.id(),
            meta,
            partition_bits,
            num_vertices,
            partitions,
        })
    }
}

/// A persisted, globally-coordinated vertex map.
#[derive(Clone, Debug)]
pub struct GlobalVertexMap<O, V> {
    id: ObjectId,
    meta: ObjectMeta,
    partition_bits: u32,
    num_vertices: u64,
    partitions: Vec<Hashmap<O, V>>,
}

impl<O, V> GlobalVertexMap<O, V>
where
    O: Serialize + DeserializeOwned + TypeTag,
    V: VertexId + Serialize + DeserializeOwned,
{
    /// Reconstruct from registered metadata.
    pub fn from_meta(client: &dyn Client, meta: ObjectMeta) -> StoreResult<Self> {
        meta.expect_type(&GlobalVertexMapBuilder::<O, V>::object_type())?;
        let partition_count = meta.get_uint("partition_count")? as usize;
        let num_vertices = meta.get_uint("num_vertices")?;

        let mut partitions = Vec::with_capacity(partition_count);
        for p in 0..partition_count {
            let id = meta.get_member(&format!("oid_to_vid_{p}"))?;
            partitions.push(Hashmap::fetch(client, id)?);
        }
        let recovered: u64 = partitions.iter().map(|m| m.len() as u64).sum();
        if recovered != num_vertices {
            return Err(StoreError::InvalidLayout(format!(
                "partitions hold {recovered} vertices, num_vertices is {num_vertices}"
            )));
        }

        Ok(Self {
            id: meta.id(),
            meta,
            partition_bits: partition_bits(partition_count),
            num_vertices,
            partitions,
        })
    }

    /// Fetch and reconstruct by id.
    pub fn fetch(client: &dyn Client, id: ObjectId) -> StoreResult<Self> {
        let meta = client.get_meta(id)?;
        Self::from_meta(client, meta)
    }
}

impl<O, V> GlobalVertexMap<O, V> {
    /// Total vertices across all partitions.
    pub fn len(&self) -> usize {
        self.num_vertices as usize
    }

    /// Returns `true` if the map holds no vertices.
    pub fn is_empty(&self) -> bool {
        self.num_vertices == 0
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// The persisted oid-to-vid index of one partition.
    pub fn partition(&self, partition: usize) -> Option<&Hashmap<O, V>> {
        self.partitions.get(partition)
    }
}

impl<O, V> GlobalVertexMap<O, V>
where
    O: PartialEq,
    V: VertexId,
{
    /// Internal id assigned to an external identifier, if registered.
    pub fn vid(&self, oid: &O) -> Option<V> {
        self.partitions.iter().find_map(|m| m.get(oid).copied())
    }

    /// The partition encoded in an internal id's high bits.
    pub fn partition_of(&self, vid: V) -> usize {
        if self.partition_bits == 0 {
            0
        } else {
            (vid.to_u64() >> (V::BITS - self.partition_bits)) as usize
        }
    }
}

impl<O, V> Object for GlobalVertexMap<O, V>
where
    O: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn id(&self) -> ObjectId {
        self.id
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Partition-local backend
// ---------------------------------------------------------------------------

/// Builder for a partition-local vertex map.
///
/// Numbers vertices densely from zero within a single partition; no global
/// coordination, so identical internal ids may recur in other partitions.
pub struct LocalVertexMapBuilder<O, V> {
    partition: u64,
    map: HashmapBuilder<O, V>,
}

impl<O, V> LocalVertexMapBuilder<O, V>
where
    O: Hash + Eq,
    V: VertexId,
{
    /// A builder for the given partition.
    pub fn new(partition: u64) -> Self {
        Self {
            partition,
            map: HashmapBuilder::new(),
        }
    }

    /// This builder's partition number.
    pub fn partition(&self) -> u64 {
        self.partition
    }

    /// Vertices registered so far.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no vertex has been registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Register an external identifier and return its dense local id.
    /// Registering the same identifier again returns the id already
    /// assigned.
    pub fn add_vertex(&mut self, oid: O) -> StoreResult<V> {
        if let Some(vid) = self.map.get(&oid) {
            return Ok(*vid);
        }
        let index = self.map.len() as u64;
        let vid = V::from_u64(index).ok_or_else(|| {
            StoreError::InvalidLayout(format!(
                "vertex index {index} exceeds the {}-bit identifier width",
                V::BITS
            ))
        })?;
        self.map.insert(oid, vid);
        Ok(vid)
    }
}

impl<O, V> LocalVertexMapBuilder<O, V>
where
    O: TypeTag,
    V: TypeTag,
{
    pub(crate) fn object_type() -> TypeName {
        TypeName::parameterized("arbor::LocalVertexMap", &[O::type_tag(), V::type_tag()])
    }
}

impl<O, V> fmt::Debug for LocalVertexMapBuilder<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalVertexMapBuilder")
            .field("partition", &self.partition)
            .field("len", &self.map.len())
            .finish()
    }
}

impl<O, V> ObjectBuilder for LocalVertexMapBuilder<O, V>
where
    O: Hash + Eq + Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
    V: VertexId + Serialize + DeserializeOwned,
{
    type Output = LocalVertexMap<O, V>;

    fn finalize(self, client: &dyn Client) -> StoreResult<LocalVertexMap<O, V>> {
        let partition = self.partition;
        let num_vertices = self.map.len() as u64;
        let sealed = self.map.finalize(client)?;

        let mut meta = ObjectMeta::new(Self::object_type());
        meta.set_uint("partition", partition);
        meta.set_uint("num_vertices", num_vertices);
        meta.set_member("oid_to_vid", sealed.id());
        let meta = client.register_object(meta)?;
        debug!(id = %meta.id(), partition, num_vertices, "sealed local vertex map");

        Ok(LocalVertexMap {
            id: meta.id(),
            meta,
            partition,
            map: sealed,
        })
    }
}

/// A persisted, partition-local vertex map.
#[derive(Clone, Debug)]
pub struct LocalVertexMap<O, V> {
    id: ObjectId,
    meta: ObjectMeta,
    partition: u64,
    map: Hashmap<O, V>,
}

impl<O, V> LocalVertexMap<O, V>
where
    O: Serialize + DeserializeOwned + TypeTag,
    V: VertexId + Serialize + DeserializeOwned,
{
    /// Reconstruct from registered metadata.
    pub fn from_meta(client: &dyn Client, meta: ObjectMeta) -> StoreResult<Self> {
        meta.expect_type(&LocalVertexMapBuilder::<O, V>::object_type())?;
        let partition = meta.get_uint("partition")?;
        let num_vertices = meta.get_uint("num_vertices")?;
        let map = Hashmap::fetch(client, meta.get_member("oid_to_vid")?)?;
        if map.len() as u64 != num_vertices {
            return Err(StoreError::InvalidLayout(format!(
                "index holds {} vertices, num_vertices is {num_vertices}",
                map.len()
            )));
        }
        Ok(Self {
            id: meta.id(),
            meta,
            partition,
            map,
        })
    }

    /// Fetch and reconstruct by id.
    pub fn fetch(client: &dyn Client, id: ObjectId) -> StoreResult<Self> {
        let meta = client.get_meta(id)?;
        Self::from_meta(client, meta)
    }
}

impl<O, V> LocalVertexMap<O, V> {
    /// This map's partition number.
    pub fn partition(&self) -> u64 {
        self.partition
    }

    /// Vertices in this partition.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the partition holds no vertices.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The persisted oid-to-vid index.
    pub fn index(&self) -> &Hashmap<O, V> {
        &self.map
    }
}

impl<O, V> LocalVertexMap<O, V>
where
    O: PartialEq,
    V: Copy,
{
    /// Local id assigned to an external identifier, if registered.
    pub fn vid(&self, oid: &O) -> Option<V> {
        self.map.get(oid).copied()
    }
}

impl<O, V> Object for LocalVertexMap<O, V>
where
    O: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn id(&self) -> ObjectId {
        self.id
    }

    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_client::InProcessClient;

    #[test]
    fn partition_bits_for_counts() {
        assert_eq!(partition_bits(1), 0);
        assert_eq!(partition_bits(2), 1);
        assert_eq!(partition_bits(3), 2);
        assert_eq!(partition_bits(4), 2);
        assert_eq!(partition_bits(5), 3);
    }

    #[test]
    fn global_ids_are_unique_across_partitions() {
        let mut builder: GlobalVertexMapBuilder<i64, u64> =
            GlobalVertexMapBuilder::new(4).unwrap();
        let mut seen = std::collections::BTreeSet::new();
        for p in 0..4 {
            for oid in 0..10i64 {
                let vid = builder.add_vertex(p, oid * 100 + p as i64).unwrap();
                assert!(seen.insert(vid), "vid {vid} assigned twice");
            }
        }
        assert_eq!(builder.len(), 40);
    }

    #[test]
    fn add_vertex_deduplicates() {
        let mut builder: GlobalVertexMapBuilder<String, u32> =
            GlobalVertexMapBuilder::new(2).unwrap();
        let first = builder.add_vertex(0, "v0".to_string()).unwrap();
        let again = builder.add_vertex(0, "v0".to_string()).unwrap();
        assert_eq!(first, again);
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn partition_out_of_range() {
        let mut builder: GlobalVertexMapBuilder<i64, u64> =
            GlobalVertexMapBuilder::new(2).unwrap();
        let err = builder.add_vertex(2, 1).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout(_)));
    }

    #[test]
    fn zero_partitions_rejected() {
        let err = GlobalVertexMapBuilder::<i64, u64>::new(0).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout(_)));
    }

    #[test]
    fn global_finalize_and_fetch() {
        let client = InProcessClient::new();
        let mut builder: GlobalVertexMapBuilder<String, u64> =
            GlobalVertexMapBuilder::new(2).unwrap();
        let a = builder.add_vertex(0, "a".to_string()).unwrap();
        let b = builder.add_vertex(1, "b".to_string()).unwrap();
        let sealed = builder.finalize(&client).unwrap();

        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed.partition_count(), 2);
        assert_eq!(sealed.vid(&"a".to_string()), Some(a));
        assert_eq!(sealed.vid(&"b".to_string()), Some(b));
        assert_eq!(sealed.vid(&"c".to_string()), None);
        assert_eq!(sealed.partition_of(a), 0);
        assert_eq!(sealed.partition_of(b), 1);

        let fetched = GlobalVertexMap::<String, u64>::fetch(&client, sealed.id()).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched.vid(&"a".to_string()), Some(a));
    }

    #[test]
    fn global_metadata_shape() {
        let client = InProcessClient::new();
        let mut builder: GlobalVertexMapBuilder<i64, u32> =
            GlobalVertexMapBuilder::new(2).unwrap();
        builder.add_vertex(0, 10).unwrap();
        let sealed = builder.finalize(&client).unwrap();

        let meta = client.get_meta(sealed.id()).unwrap();
        assert_eq!(
            meta.type_name().as_str(),
            "arbor::GlobalVertexMap<int64,uint32>"
        );
        assert_eq!(meta.get_uint("partition_count").unwrap(), 2);
        assert_eq!(meta.get_uint("num_vertices").unwrap(), 1);
        assert!(meta.get_member("oid_to_vid_0").is_ok());
        assert!(meta.get_member("oid_to_vid_1").is_ok());
    }

    #[test]
    fn local_assigns_dense_ids_from_zero() {
        let mut builder: LocalVertexMapBuilder<String, u32> = LocalVertexMapBuilder::new(3);
        assert_eq!(builder.add_vertex("x".to_string()).unwrap(), 0);
        assert_eq!(builder.add_vertex("y".to_string()).unwrap(), 1);
        assert_eq!(builder.add_vertex("x".to_string()).unwrap(), 0);
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn local_finalize_and_fetch() {
        let client = InProcessClient::new();
        let mut builder: LocalVertexMapBuilder<i64, u32> = LocalVertexMapBuilder::new(7);
        builder.add_vertex(100).unwrap();
        builder.add_vertex(200).unwrap();
        let sealed = builder.finalize(&client).unwrap();

        assert_eq!(sealed.partition(), 7);
        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed.vid(&100), Some(0));
        assert_eq!(sealed.vid(&200), Some(1));

        let fetched = LocalVertexMap::<i64, u32>::fetch(&client, sealed.id()).unwrap();
        assert_eq!(fetched.partition(), 7);
        assert_eq!(fetched.vid(&200), Some(1));
    }

    #[test]
    fn local_metadata_shape() {
        let client = InProcessClient::new();
        let mut builder: LocalVertexMapBuilder<String, u64> = LocalVertexMapBuilder::new(0);
        builder.add_vertex("only".to_string()).unwrap();
        let sealed = builder.finalize(&client).unwrap();

        let meta = client.get_meta(sealed.id()).unwrap();
        assert_eq!(
            meta.type_name().as_str(),
            "arbor::LocalVertexMap<string,uint64>"
        );
        assert_eq!(meta.get_uint("partition").unwrap(), 0);
        assert_eq!(meta.get_uint("num_vertices").unwrap(), 1);
        assert!(meta.get_member("oid_to_vid").is_ok());
    }

    #[test]
    fn corrupt_vertex_count_is_invalid_layout() {
        let client = InProcessClient::new();
        let mut builder: LocalVertexMapBuilder<i64, u32> = LocalVertexMapBuilder::new(1);
        builder.add_vertex(1).unwrap();
        let sealed = builder.finalize(&client).unwrap();

        let mut doctored = client.get_meta(sealed.id()).unwrap();
        doctored.set_uint("num_vertices", 5);
        let id = client.register_object(doctored).unwrap().id();

        let err = LocalVertexMap::<i64, u32>::fetch(&client, id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout(_)));
    }
}
