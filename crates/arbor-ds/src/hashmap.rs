use std::fmt;
use std::hash::{BuildHasher, Hash};

use ahash::RandomState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use arbor_client::{Blob, Client, Object, ObjectBuilder, ObjectMeta, StoreError, StoreResult};
use arbor_types::{ObjectId, TypeName, TypeTag};

use crate::array::{Array, ArrayBuilder};

/// Probe-distance floor; tiny tables still get a usable overflow region.
const MIN_LOOKUPS: usize = 4;

/// One physical slot of the table, and the persisted entry record.
///
/// The in-memory table and the persisted entries array share this type, so
/// finalize writes the slot vector bit-for-bit in slot order and a reader
/// recovers every record by position alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntrySlot<K, V> {
    /// Unoccupied slot.
    Empty,
    /// Occupied slot carrying one mapping.
    Occupied { key: K, value: V },
}

impl<K, V> EntrySlot<K, V> {
    /// Returns `true` for an occupied slot.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied { .. })
    }

    fn as_pair(&self) -> Option<(&K, &V)> {
        match self {
            Self::Occupied { key, value } => Some((key, value)),
            Self::Empty => None,
        }
    }
}

impl<K: TypeTag, V: TypeTag> TypeTag for EntrySlot<K, V> {
    fn type_tag() -> String {
        format!("entry<{},{}>", K::type_tag(), V::type_tag())
    }
}

/// Mutable open-addressing hashmap and builder for its persisted form.
///
/// Collisions resolve by linear probing bounded to `max_lookups` slots from
/// the home bucket; an insertion that cannot land within the bound grows the
/// table and rehashes. The bucket array is `num_slots_minus_one + 1` slots
/// (a power of two) and the physical slot vector always carries
/// `num_slots_minus_one + max_lookups + 1` entries, so every bucket may
/// probe its full distance without wrapping. There is no deletion path; the
/// builder exists to accumulate a mapping and harden it.
///
/// The builder is process-local and single-owner: no internal
/// synchronization, callers serialize access, and finalize consumes it.
pub struct HashmapBuilder<K, V, S = RandomState> {
    slots: Vec<EntrySlot<K, V>>,
    num_slots_minus_one: usize,
    max_lookups: usize,
    len: usize,
    hasher: S,
    data_buffer: Option<Blob>,
}

enum Placed<K, V> {
    /// Key existed; prior value returned.
    Replaced(V),
    /// New key landed in an empty slot.
    Inserted,
    /// No admissible slot within the probe bound, or the load cap was hit.
    NeedsGrow(K, V),
}

impl<K, V> HashmapBuilder<K, V, RandomState> {
    /// An empty map with a freshly seeded default hasher.
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V> Default for HashmapBuilder<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> HashmapBuilder<K, V, S> {
    /// An empty map using the given hash builder.
    pub fn with_hasher(hasher: S) -> Self {
        let max_lookups = Self::max_lookups_for(1);
        Self {
            slots: Self::empty_slots(0, max_lookups),
            num_slots_minus_one: 0,
            max_lookups,
            len: 0,
            hasher,
            data_buffer: None,
        }
    }

    /// Logical number of mappings.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no mappings are present.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bucket-array size minus one.
    pub fn num_slots_minus_one(&self) -> usize {
        self.num_slots_minus_one
    }

    /// Bound on probe distance.
    pub fn max_lookups(&self) -> usize {
        self.max_lookups
    }

    /// Iterate over mappings in slot order.
    ///
    /// The order is implementation-defined and not stable across growth.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.slots.iter().filter_map(EntrySlot::as_pair)
    }

    /// Attach an auxiliary data buffer to persist alongside the map.
    ///
    /// At most one association is kept; calling this again replaces the
    /// prior one.
    pub fn associate_data_buffer(&mut self, blob: Blob) {
        self.data_buffer = Some(blob);
    }

    fn max_lookups_for(buckets: usize) -> usize {
        MIN_LOOKUPS.max(buckets.trailing_zeros() as usize)
    }

    fn empty_slots(num_slots_minus_one: usize, max_lookups: usize) -> Vec<EntrySlot<K, V>> {
        (0..num_slots_minus_one + max_lookups + 1)
            .map(|_| EntrySlot::Empty)
            .collect()
    }

    fn take_entries(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.slots)
            .into_iter()
            .filter_map(|slot| match slot {
                EntrySlot::Occupied { key, value } => Some((key, value)),
                EntrySlot::Empty => None,
            })
            .collect()
    }
}

impl<K, V, S> HashmapBuilder<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn bucket_of(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) as usize) & self.num_slots_minus_one
    }

    /// Create-or-update: map `key` to `value`, returning the prior value if
    /// the key was present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut pending = (key, value);
        loop {
            match self.try_place(pending.0, pending.1) {
                Placed::Replaced(prior) => return Some(prior),
                Placed::Inserted => return None,
                Placed::NeedsGrow(key, value) => {
                    self.grow();
                    pending = (key, value);
                }
            }
        }
    }

    /// Insert-if-absent: returns `true` if the mapping was inserted, `false`
    /// if the key already existed (the existing value is kept and `value` is
    /// dropped).
    pub fn emplace(&mut self, key: K, value: V) -> bool {
        if self.get(&key).is_some() {
            return false;
        }
        self.insert(key, value);
        true
    }

    /// Look up a key, present-or-absent.
    pub fn get(&self, key: &K) -> Option<&V> {
        let bucket = self.bucket_of(key);
        for slot in &self.slots[bucket..=bucket + self.max_lookups] {
            match slot {
                EntrySlot::Occupied { key: k, value } if k == key => return Some(value),
                // No deletion exists, so the probe sequence of a present key
                // has no holes: an empty slot ends the search.
                EntrySlot::Empty => return None,
                EntrySlot::Occupied { .. } => {}
            }
        }
        None
    }

    /// Look up a key, failing with [`StoreError::KeyNotFound`] if absent.
    pub fn at(&self, key: &K) -> StoreResult<&V>
    where
        K: fmt::Debug,
    {
        self.get(key)
            .ok_or_else(|| StoreError::KeyNotFound(format!("{key:?}")))
    }

    /// Pre-size the table for `capacity` mappings.
    pub fn reserve(&mut self, capacity: usize) {
        let target = Self::buckets_for(capacity);
        if target > self.num_slots_minus_one + 1 {
            let entries = self.take_entries();
            self.rebuild_from(entries, target);
        }
    }

    /// Compact the table to its minimum footprint for the current element
    /// count. Future insertions pay for it with immediate growth; finalize
    /// calls this because no further mutation will occur.
    pub fn shrink_to_fit(&mut self) {
        let target = Self::buckets_for(self.len);
        if target < self.num_slots_minus_one + 1 {
            let entries = self.take_entries();
            self.rebuild_from(entries, target);
        }
    }

    /// Smallest power-of-two bucket count holding `elements` at the 0.5 load
    /// cap.
    fn buckets_for(elements: usize) -> usize {
        (elements * 2).next_power_of_two()
    }

    fn try_place(&mut self, key: K, value: V) -> Placed<K, V> {
        let bucket = self.bucket_of(&key);
        let mut free = None;
        for idx in bucket..=bucket + self.max_lookups {
            match &mut self.slots[idx] {
                EntrySlot::Occupied { key: k, value: v } if *k == key => {
                    return Placed::Replaced(std::mem::replace(v, value));
                }
                EntrySlot::Empty => {
                    free = Some(idx);
                    break;
                }
                EntrySlot::Occupied { .. } => {}
            }
        }
        // Load cap at one half keeps probe sequences short on average.
        if self.len + 1 > (self.num_slots_minus_one + 1) / 2 {
            return Placed::NeedsGrow(key, value);
        }
        match free {
            Some(idx) => {
                self.slots[idx] = EntrySlot::Occupied { key, value };
                self.len += 1;
                Placed::Inserted
            }
            None => Placed::NeedsGrow(key, value),
        }
    }

    fn grow(&mut self) {
        let target = (self.num_slots_minus_one + 1) * 2;
        let entries = self.take_entries();
        self.rebuild_from(entries, target);
    }

    /// Rehash every entry into a table of at least `buckets` buckets,
    /// doubling until bounded probing admits them all.
    fn rebuild_from(&mut self, entries: Vec<(K, V)>, mut buckets: usize) {
        const UNPLACED: usize = usize::MAX;
        let mut staged: Vec<Option<(K, V)>> = entries.into_iter().map(Some).collect();
        loop {
            let num_slots_minus_one = buckets - 1;
            let max_lookups = Self::max_lookups_for(buckets);
            let total = num_slots_minus_one + max_lookups + 1;

            // Dry-run placement over key references so a failed attempt
            // keeps ownership of every entry.
            let mut placed: Vec<usize> = vec![UNPLACED; total];
            let mut admitted = true;
            'entries: for (i, entry) in staged.iter().enumerate() {
                let Some((key, _)) = entry.as_ref() else {
                    continue;
                };
                let bucket = (self.hasher.hash_one(key) as usize) & num_slots_minus_one;
                for slot in placed.iter_mut().skip(bucket).take(max_lookups + 1) {
                    if *slot == UNPLACED {
                        *slot = i;
                        continue 'entries;
                    }
                }
                admitted = false;
                break;
            }
            if !admitted {
                buckets *= 2;
                continue;
            }

            let mut slots = Self::empty_slots(num_slots_minus_one, max_lookups);
            for (idx, &entry_idx) in placed.iter().enumerate() {
                if entry_idx != UNPLACED {
                    if let Some((key, value)) = staged[entry_idx].take() {
                        slots[idx] = EntrySlot::Occupied { key, value };
                    }
                }
            }
            debug!(
                from_buckets = self.num_slots_minus_one + 1,
                to_buckets = buckets,
                elements = self.len,
                "rehashed table"
            );
            self.slots = slots;
            self.num_slots_minus_one = num_slots_minus_one;
            self.max_lookups = max_lookups;
            return;
        }
    }
}

impl<K, V, S> HashmapBuilder<K, V, S>
where
    K: TypeTag,
    V: TypeTag,
{
    fn object_type() -> TypeName {
        TypeName::parameterized("arbor::Hashmap", &[K::type_tag(), V::type_tag()])
    }
}

impl<K, V> FromIterator<(K, V)> for HashmapBuilder<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K, V, S> fmt::Debug for HashmapBuilder<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashmapBuilder")
            .field("len", &self.len)
            .field("num_slots_minus_one", &self.num_slots_minus_one)
            .field("max_lookups", &self.max_lookups)
            .finish()
    }
}

impl<K, V, S> ObjectBuilder for HashmapBuilder<K, V, S>
where
    K: Hash + Eq + Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
    S: BuildHasher,
{
    type Output = Hashmap<K, V>;

    /// Harden the table into its persisted form.
    ///
    /// Compacts to minimum footprint, persists the physical slot vector in
    /// slot order as the entries array, stamps the layout parameters, and
    /// registers the parent. The auxiliary pair is stamped uniformly: a zero
    /// offset plus the associated blob, or a zero offset plus the shared
    /// empty blob, so readers never branch on field presence.
    fn finalize(mut self, client: &dyn Client) -> StoreResult<Hashmap<K, V>> {
        self.shrink_to_fit();

        let entry_count = self.num_slots_minus_one + self.max_lookups + 1;
        if self.slots.len() != entry_count {
            return Err(StoreError::InvalidLayout(format!(
                "slot vector holds {} entries, layout parameters require {}",
                self.slots.len(),
                entry_count
            )));
        }

        let num_slots_minus_one = self.num_slots_minus_one as u64;
        let max_lookups = self.max_lookups as u64;
        let num_elements = self.len as u64;
        let entries = ArrayBuilder::from_vec(self.slots).finalize(client)?;

        let data_buffer_mapped = match self.data_buffer {
            Some(blob) => blob,
            None => client.empty_blob()?,
        };
        // The association always covers the whole blob, so the persisted
        // offset into it is zero either way.
        let data_buffer = 0u64;

        let mut meta = ObjectMeta::new(Self::object_type());
        meta.set_uint("num_slots_minus_one", num_slots_minus_one);
        meta.set_uint("max_lookups", max_lookups);
        meta.set_uint("num_elements", num_elements);
        meta.set_member("entries", entries.id());
        meta.set_uint("data_buffer", data_buffer);
        meta.set_member("data_buffer_mapped", data_buffer_mapped.id());
        let meta = client.register_object(meta)?;
        debug!(id = %meta.id(), num_elements, "sealed hashmap");

        Ok(Hashmap {
            id: meta.id(),
            meta,
            num_slots_minus_one,
            max_lookups,
            num_elements,
            entries,
            data_buffer,
            data_buffer_mapped,
        })
    }
}

/// A persisted, immutable hashmap.
///
/// The cold representation is a flat, position-addressable entries array; a
/// reader recovers every mapping by scanning or indexing it and never runs
/// the hashing/probing logic. Safe for unsynchronized concurrent reads.
#[derive(Clone, Debug)]
pub struct Hashmap<K, V> {
    id: ObjectId,
    meta: ObjectMeta,
    num_slots_minus_one: u64,
    max_lookups: u64,
    num_elements: u64,
    entries: Array<EntrySlot<K, V>>,
    data_buffer: u64,
    data_buffer_mapped: Blob,
}

impl<K, V> Hashmap<K, V>
where
    K: Serialize + DeserializeOwned + TypeTag,
    V: Serialize + DeserializeOwned + TypeTag,
{
    /// Reconstruct from registered metadata.
    pub fn from_meta(client: &dyn Client, meta: ObjectMeta) -> StoreResult<Self> {
        meta.expect_type(&HashmapBuilder::<K, V>::object_type())?;
        let num_slots_minus_one = meta.get_uint("num_slots_minus_one")?;
        let max_lookups = meta.get_uint("max_lookups")?;
        let num_elements = meta.get_uint("num_elements")?;
        let entries: Array<EntrySlot<K, V>> = Array::fetch(client, meta.get_member("entries")?)?;
        let data_buffer = meta.get_uint("data_buffer")?;
        let data_buffer_mapped = client.get_blob(meta.get_member("data_buffer_mapped")?)?;

        if entries.len() as u64 != num_slots_minus_one + max_lookups + 1 {
            return Err(StoreError::InvalidLayout(format!(
                "entries array holds {} records, layout parameters require {}",
                entries.len(),
                num_slots_minus_one + max_lookups + 1
            )));
        }
        let occupied = entries.iter().filter(|slot| slot.is_occupied()).count() as u64;
        if occupied != num_elements {
            return Err(StoreError::InvalidLayout(format!(
                "entries array holds {occupied} occupied records, num_elements is {num_elements}"
            )));
        }

        Ok(Self {
            id: meta.id(),
            meta,
            num_slots_minus_one,
            max_lookups,
            num_elements,
            entries,
            data_buffer,
            data_buffer_mapped,
        })
    }

    /// Fetch and reconstruct by id.
    pub fn fetch(client: &dyn Client, id: ObjectId) -> StoreResult<Self> {
        let meta = client.get_meta(id)?;
        Self::from_meta(client, meta)
    }
}

impl<K, V> Hashmap<K, V> {
    /// Logical number of mappings.
    pub fn len(&self) -> usize {
        self.num_elements as usize
    }

    /// Returns `true` if no mappings are present.
    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    /// Bucket-array size minus one, as persisted.
    pub fn num_slots_minus_one(&self) -> u64 {
        self.num_slots_minus_one
    }

    /// Probe-distance bound, as persisted.
    pub fn max_lookups(&self) -> u64 {
        self.max_lookups
    }

    /// The physical entries array, in slot order.
    pub fn entries(&self) -> &[EntrySlot<K, V>] {
        self.entries.as_slice()
    }

    /// Iterate over mappings in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().filter_map(EntrySlot::as_pair)
    }

    /// Byte offset of the auxiliary payload within the mapped blob.
    pub fn data_buffer_offset(&self) -> u64 {
        self.data_buffer
    }

    /// The auxiliary blob; zero-length when no buffer was associated.
    pub fn data_buffer_mapped(&self) -> &Blob {
        &self.data_buffer_mapped
    }

    /// The auxiliary payload, if one was associated.
    pub fn auxiliary(&self) -> Option<&[u8]> {
        if self.data_buffer_mapped.is_empty() {
            None
        } else {
            Some(&self.data_buffer_mapped.data()[self.data_buffer as usize..])
        }
    }
}

impl<K, V> Hashmap<K, V>
where
    K: PartialEq,
{
    /// Look up a key by linear scan of the entries array.
    ///
    /// Deliberately hash-free: this is the path a reader in any language
    /// uses against the flat persisted layout.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.iter()
            .find_map(|(k, v)| if k == key { Some(v) } else { None })
    }
}

impl<K, V> Hashmap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Rebuild a live, resizable table from the persisted form.
    ///
    /// This is the only route from persisted back to mutable: an explicit
    /// conversion that re-inserts every mapping, never an aliasing of the
    /// persisted buffer.
    pub fn to_builder(&self) -> HashmapBuilder<K, V, RandomState> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V> Object for Hashmap<K, V>
where
    K: Send + Sync + 'static,
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
