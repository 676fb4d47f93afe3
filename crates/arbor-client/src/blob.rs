use bytes::Bytes;

use arbor_types::ObjectId;

use crate::client::Client;
use crate::error::StoreResult;

/// Immutable shared byte range, the storage primitive everything else is
/// laid out on.
///
/// A blob's length is fixed at creation and its bytes are never partially
/// visible: a `Blob` handle only exists for fully published data. Clones are
/// cheap and share the underlying range; the range stays alive for as long as
/// any handle or any referencing object holds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    id: ObjectId,
    data: Bytes,
}

impl Blob {
    pub(crate) fn new(id: ObjectId, data: Bytes) -> Self {
        Self { id, data }
    }

    /// The zero-length blob, used whenever no real payload exists so callers
    /// never need a null/missing case.
    pub fn make_empty(client: &dyn Client) -> StoreResult<Self> {
        client.empty_blob()
    }

    /// Identity of this blob in the store.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The byte range, valid within this process's own mapping of the arena.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for the zero-length blob.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fixed-size writable buffer with a pre-assigned id, sealed into a [`Blob`].
///
/// Created by [`Client::create_blob`]. The writer is exclusively owned until
/// [`seal`] publishes it; dropping an unsealed writer publishes nothing and
/// costs no arena space.
///
/// [`seal`]: BlobWriter::seal
#[derive(Debug)]
pub struct BlobWriter {
    id: ObjectId,
    data: Vec<u8>,
}

impl BlobWriter {
    pub(crate) fn new(id: ObjectId, len: usize) -> Self {
        Self {
            id,
            data: vec![0u8; len],
        }
    }

    /// The id this writer's blob will carry once sealed.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Length in bytes, fixed at creation.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer is zero-length.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writable view of the whole buffer.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy `src` into the buffer starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + src.len()` exceeds the buffer length, like any
    /// out-of-bounds slice write.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) {
        self.data[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Publish the buffer as an immutable blob, consuming the writer.
    pub fn seal(self, client: &dyn Client) -> StoreResult<Blob> {
        client.seal_blob(self)
    }

    pub(crate) fn into_parts(self) -> (ObjectId, Vec<u8>) {
        (self.id, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_exposes_its_bytes() {
        let blob = Blob::new(ObjectId::from_parts(1, 1), Bytes::from_static(b"abc"));
        assert_eq!(blob.data(), b"abc");
        assert_eq!(blob.len(), 3);
        assert!(!blob.is_empty());
    }

    #[test]
    fn clones_share_the_range() {
        let blob = Blob::new(ObjectId::from_parts(1, 2), Bytes::from_static(b"shared"));
        let other = blob.clone();
        assert_eq!(blob, other);
        assert_eq!(blob.data().as_ptr(), other.data().as_ptr());
    }

    #[test]
    fn writer_is_zeroed_at_creation() {
        let writer = BlobWriter::new(ObjectId::from_parts(1, 3), 4);
        assert_eq!(writer.len(), 4);
        assert!(writer.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_at_fills_the_buffer() {
        let mut writer = BlobWriter::new(ObjectId::from_parts(1, 4), 6);
        writer.write_at(2, b"xy");
        assert_eq!(&writer.data, &[0, 0, b'x', b'y', 0, 0]);
    }

    #[test]
    fn as_mut_slice_covers_whole_buffer() {
        let mut writer = BlobWriter::new(ObjectId::from_parts(1, 5), 3);
        writer.as_mut_slice().copy_from_slice(b"abc");
        let (_, data) = writer.into_parts();
        assert_eq!(data, b"abc");
    }
}
