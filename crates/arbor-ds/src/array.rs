use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use arbor_client::{Blob, Client, Object, ObjectBuilder, ObjectMeta, StoreError, StoreResult};
use arbor_types::{ObjectId, TypeName, TypeTag};

/// Builder for a persisted typed array.
///
/// Accumulates values in process-local memory; finalize encodes them as one
/// flat buffer, publishes the buffer as a blob, and registers the array
/// object referencing it.
#[derive(Clone, Debug)]
pub struct ArrayBuilder<T> {
    values: Vec<T>,
}

impl<T> Default for ArrayBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ArrayBuilder<T> {
    /// An empty builder.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Take ownership of already-collected values.
    pub fn from_vec(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Append one value.
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Append every value from an iterator.
    pub fn extend(&mut self, values: impl IntoIterator<Item = T>) {
        self.values.extend(values);
    }

    /// Pre-size the backing storage.
    pub fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    /// Number of values collected so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no values have been collected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: TypeTag> ArrayBuilder<T> {
    fn object_type() -> TypeName {
        TypeName::parameterized("arbor::Array", &[T::type_tag()])
    }
}

impl<T> ObjectBuilder for ArrayBuilder<T>
where
    T: Serialize + DeserializeOwned + TypeTag + Send + Sync + 'static,
{
    type Output = Array<T>;

    fn finalize(self, client: &dyn Client) -> StoreResult<Array<T>> {
        let encoded = bincode::serialize(&self.values)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let buffer = client.put_blob(&encoded)?;

        let mut meta = ObjectMeta::new(Self::object_type());
        meta.set_uint("length", self.values.len() as u64);
        meta.set_member("buffer", buffer.id());
        let meta = client.register_object(meta)?;
        debug!(id = %meta.id(), length = self.values.len(), "sealed array");

        Ok(Array {
            id: meta.id(),
            meta,
            values: self.values,
            buffer,
        })
    }
}

/// A persisted, position-addressable typed array.
///
/// The values live in one flat blob; readers in any process decode them by
/// position without consulting the writer.
#[derive(Clone, Debug)]
pub struct Array<T> {
    id: ObjectId,
    meta: ObjectMeta,
    values: Vec<T>,
    buffer: Blob,
}

impl<T> Array<T>
where
    T: Serialize + DeserializeOwned + TypeTag,
{
    /// Reconstruct from registered metadata.
    pub fn from_meta(client: &dyn Client, meta: ObjectMeta) -> StoreResult<Self> {
        meta.expect_type(&ArrayBuilder::<T>::object_type())?;
        let length = meta.get_uint("length")?;
        let buffer = client.get_blob(meta.get_member("buffer")?)?;
        let values: Vec<T> = bincode::deserialize(buffer.data())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if values.len() as u64 != length {
            return Err(StoreError::InvalidLayout(format!(
                "array length field {} disagrees with decoded buffer of {} values",
                length,
                values.len()
            )));
        }
        Ok(Self {
            id: meta.id(),
            meta,
            values,
            buffer,
        })
    }

    /// Fetch and reconstruct by id.
    pub fn fetch(client: &dyn Client, id: ObjectId) -> StoreResult<Self> {
        let meta = client.get_meta(id)?;
        Self::from_meta(client, meta)
    }
}

impl<T> Array<T> {
    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` for a zero-length array.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// All values in position order.
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Iterate in position order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    /// The flat backing blob.
    pub fn buffer(&self) -> &Blob {
        &self.buffer
    }
}

impl<T: Send + Sync + 'static> Object for Array<T> {
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
    fn finalize_and_fetch_roundtrip() {
        let client = InProcessClient::new();
        let mut builder = ArrayBuilder::new();
        builder.extend([10i64, 20, 30]);
        let array = builder.finalize(&client).unwrap();
        assert_eq!(array.len(), 3);

        let fetched = Array::<i64>::fetch(&client, array.id()).unwrap();
        assert_eq!(fetched.as_slice(), &[10, 20, 30]);
        assert_eq!(fetched.id(), array.id());
    }

    #[test]
    fn empty_array_roundtrip() {
        let client = InProcessClient::new();
        let array = ArrayBuilder::<u64>::new().finalize(&client).unwrap();
        assert!(array.is_empty());

        let fetched = Array::<u64>::fetch(&client, array.id()).unwrap();
        assert!(fetched.is_empty());
    }

    #[test]
    fn metadata_shape() {
        let client = InProcessClient::new();
        let array = ArrayBuilder::from_vec(vec![1i32, 2]).finalize(&client).unwrap();
        let meta = client.get_meta(array.id()).unwrap();
        assert_eq!(meta.type_name().as_str(), "arbor::Array<int32>");
        assert_eq!(meta.get_uint("length").unwrap(), 2);
        assert!(!meta.get_member("buffer").unwrap().is_null());
    }

    #[test]
    fn position_addressing() {
        let client = InProcessClient::new();
        let array = ArrayBuilder::from_vec(vec!["a".to_string(), "b".to_string()])
            .finalize(&client)
            .unwrap();
        assert_eq!(array.get(1).unwrap(), "b");
        assert!(array.get(2).is_none());
    }

    #[test]
    fn fetch_rejects_foreign_type() {
        let client = InProcessClient::new();
        let array = ArrayBuilder::from_vec(vec![1i64]).finalize(&client).unwrap();
        let err = Array::<f64>::fetch(&client, array.id()).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn length_mismatch_is_invalid_layout() {
        let client = InProcessClient::new();
        let buffer = client
            .put_blob(&bincode::serialize(&vec![1i64, 2]).unwrap())
            .unwrap();
        let mut meta = ObjectMeta::new(TypeName::parse("arbor::Array<int64>").unwrap());
        meta.set_uint("length", 5);
        meta.set_member("buffer", buffer.id());
        let id = client.register_object(meta).unwrap().id();

        let err = Array::<i64>::fetch(&client, id).unwrap_err();
        assert!(matches!(err, StoreError::InvalidLayout(_)));
    }
}
