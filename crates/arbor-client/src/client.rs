use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use tracing::debug;

use arbor_types::ObjectId;

use crate::blob::{Blob, BlobWriter};
use crate::error::{StoreError, StoreResult};
use crate::meta::ObjectMeta;

/// Handle to the arena/registry a builder publishes into.
///
/// All implementations must satisfy these invariants:
/// - Publication is atomic: a reader never observes a blob or an object
///   metadata map in a partially written state.
/// - Published blobs and objects are immutable; the store is append-only.
/// - Ids are assigned exactly once, at successful seal/registration.
/// - All failures are reported through the result value, never panicked.
pub trait Client: Send + Sync {
    /// Allocate a writable buffer of `len` bytes with a pre-assigned id.
    ///
    /// Capacity is validated here but only charged at seal, so an abandoned
    /// writer costs nothing.
    fn create_blob(&self, len: usize) -> StoreResult<BlobWriter>;

    /// Publish a filled writer as an immutable blob.
    fn seal_blob(&self, writer: BlobWriter) -> StoreResult<Blob>;

    /// Allocate, fill, and publish a blob in one step.
    fn put_blob(&self, data: &[u8]) -> StoreResult<Blob> {
        let mut writer = self.create_blob(data.len())?;
        writer.as_mut_slice().copy_from_slice(data);
        self.seal_blob(writer)
    }

    /// The zero-length blob shared by every object that has no real payload.
    fn empty_blob(&self) -> StoreResult<Blob>;

    /// Fetch a published blob by id.
    fn get_blob(&self, id: ObjectId) -> StoreResult<Blob>;

    /// Atomically publish an object's metadata and assign its identity.
    ///
    /// Returns the metadata as published, id filled in.
    fn register_object(&self, meta: ObjectMeta) -> StoreResult<ObjectMeta>;

    /// Fetch a published object's metadata by id.
    fn get_meta(&self, id: ObjectId) -> StoreResult<ObjectMeta>;
}

/// Options for [`InProcessClient`].
#[derive(Clone, Debug)]
pub struct ClientOptions {
    capacity: u64,
}

impl ClientOptions {
    /// Default arena capacity.
    const DEFAULT_CAPACITY: u64 = 256 * 1024 * 1024;

    pub fn new() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
        }
    }

    /// Cap the arena byte budget.
    pub fn capacity(mut self, bytes: u64) -> Self {
        self.capacity = bytes;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct State {
    blobs: HashMap<ObjectId, Blob>,
    objects: HashMap<ObjectId, ObjectMeta>,
    used: u64,
    next_seq: u64,
}

/// In-process reference client.
///
/// Stands in for the IPC transport when the arena lives in the same process:
/// blob and object tables behind a `RwLock`, a byte budget enforced at
/// allocation, and ids minted from a random instance nonce plus a sequence.
/// [`close`] severs the client; every call afterwards fails with
/// [`StoreError::Connectivity`], mirroring a lost registry connection.
///
/// [`close`]: InProcessClient::close
pub struct InProcessClient {
    instance: u16,
    capacity: u64,
    closed: AtomicBool,
    state: RwLock<State>,
    empty: Blob,
}

impl InProcessClient {
    /// Connect with default options.
    pub fn new() -> Self {
        Self::with_options(ClientOptions::new())
    }

    /// Connect with explicit options.
    pub fn with_options(options: ClientOptions) -> Self {
        let instance: u16 = rand::random();
        // Sequence 1 is reserved for the shared empty blob.
        let empty = Blob::new(ObjectId::from_parts(instance, 1), Bytes::new());
        let mut blobs = HashMap::new();
        blobs.insert(empty.id(), empty.clone());
        debug!(instance, capacity = options.capacity, "in-process client connected");
        Self {
            instance,
            capacity: options.capacity,
            closed: AtomicBool::new(false),
            state: RwLock::new(State {
                blobs,
                objects: HashMap::new(),
                used: 0,
                next_seq: 2,
            }),
            empty,
        }
    }

    /// Nonce folded into every id this client assigns.
    pub fn instance(&self) -> u16 {
        self.instance
    }

    /// Sever the client. Irreversible; subsequent calls fail with
    /// [`StoreError::Connectivity`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Number of published objects.
    pub fn object_count(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    /// Number of published blobs, the shared empty blob included.
    pub fn blob_count(&self) -> usize {
        self.state.read().expect("lock poisoned").blobs.len()
    }

    /// Arena bytes charged so far.
    pub fn used_bytes(&self) -> u64 {
        self.state.read().expect("lock poisoned").used
    }

    /// Arena byte budget.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Connectivity("client closed".to_string()));
        }
        Ok(())
    }

    fn next_id(&self, state: &mut State) -> ObjectId {
        let id = ObjectId::from_parts(self.instance, state.next_seq);
        state.next_seq += 1;
        id
    }
}

impl Default for InProcessClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Client for InProcessClient {
    fn create_blob(&self, len: usize) -> StoreResult<BlobWriter> {
        self.ensure_open()?;
        let mut state = self.state.write().expect("lock poisoned");
        let available = self.capacity - state.used;
        if len as u64 > available {
            return Err(StoreError::AllocationExhausted {
                requested: len as u64,
                available,
            });
        }
        let id = self.next_id(&mut state);
        Ok(BlobWriter::new(id, len))
    }

    fn seal_blob(&self, writer: BlobWriter) -> StoreResult<Blob> {
        self.ensure_open()?;
        let (id, data) = writer.into_parts();
        let len = data.len() as u64;
        let mut state = self.state.write().expect("lock poisoned");
        let available = self.capacity - state.used;
        if len > available {
            return Err(StoreError::AllocationExhausted {
                requested: len,
                available,
            });
        }
        let blob = Blob::new(id, Bytes::from(data));
        state.used += len;
        state.blobs.insert(id, blob.clone());
        debug!(%id, len, "sealed blob");
        Ok(blob)
    }

    fn empty_blob(&self) -> StoreResult<Blob> {
        self.ensure_open()?;
        Ok(self.empty.clone())
    }

    fn get_blob(&self, id: ObjectId) -> StoreResult<Blob> {
        self.ensure_open()?;
        let state = self.state.read().expect("lock poisoned");
        state
            .blobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn register_object(&self, mut meta: ObjectMeta) -> StoreResult<ObjectMeta> {
        self.ensure_open()?;
        let mut state = self.state.write().expect("lock poisoned");
        let id = self.next_id(&mut state);
        meta.assign_id(id);
        // The whole field map lands under one lock acquisition: readers see
        // the object entirely or not at all.
        debug!(%id, type_name = %meta.type_name(), fields = meta.len(), "registered object");
        state.objects.insert(id, meta.clone());
        Ok(meta)
    }

    fn get_meta(&self, id: ObjectId) -> StoreResult<ObjectMeta> {
        self.ensure_open()?;
        let state = self.state.read().expect("lock poisoned");
        state
            .objects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

impl std::fmt::Debug for InProcessClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessClient")
            .field("instance", &self.instance)
            .field("objects", &self.object_count())
            .field("blobs", &self.blob_count())
            .field("used_bytes", &self.used_bytes())
            .finish()
    }
}
