use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use arbor_types::{ObjectId, TypeName};

use crate::error::{StoreError, StoreResult};

/// A single metadata field value: a scalar or a reference to a child object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    /// Unsigned integer scalar.
    Uint(u64),
    /// Signed integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// Boolean scalar.
    Bool(bool),
    /// String scalar.
    String(String),
    /// Reference to a child object (blob, array, or composite).
    Member(ObjectId),
}

impl MetaValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Member(_) => "member",
        }
    }
}

/// The metadata of a published (or about-to-be-published) object: a type
/// descriptor plus named fields.
///
/// Builders stamp fields during finalize and register the whole map at once;
/// readers observe it only as a whole. Setters overwrite silently (last write
/// wins), typed getters fail with [`StoreError::MissingField`] or
/// [`StoreError::TypeMismatch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    id: ObjectId,
    type_name: TypeName,
    fields: BTreeMap<String, MetaValue>,
}

impl ObjectMeta {
    /// Start metadata for an object of the given type. The id stays null
    /// until the client assigns one at registration.
    pub fn new(type_name: TypeName) -> Self {
        Self {
            id: ObjectId::null(),
            type_name,
            fields: BTreeMap::new(),
        }
    }

    /// Identity assigned at registration; null before publish.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    /// The type descriptor readers dispatch on.
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields have been stamped yet.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `true` if the field exists.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterate over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_uint(&mut self, key: &str, value: u64) {
        self.fields.insert(key.to_string(), MetaValue::Uint(value));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.fields.insert(key.to_string(), MetaValue::Int(value));
    }

    pub fn set_float(&mut self, key: &str, value: f64) {
        self.fields.insert(key.to_string(), MetaValue::Float(value));
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.fields.insert(key.to_string(), MetaValue::Bool(value));
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.fields
            .insert(key.to_string(), MetaValue::String(value.into()));
    }

    /// Stamp a reference to a child object.
    pub fn set_member(&mut self, key: &str, id: ObjectId) {
        self.fields.insert(key.to_string(), MetaValue::Member(id));
    }

    fn get(&self, key: &str) -> StoreResult<&MetaValue> {
        self.fields
            .get(key)
            .ok_or_else(|| StoreError::MissingField(key.to_string()))
    }

    fn mismatch(key: &str, expected: &str, actual: &MetaValue) -> StoreError {
        StoreError::TypeMismatch {
            field: key.to_string(),
            expected: expected.to_string(),
            actual: actual.kind().to_string(),
        }
    }

    pub fn get_uint(&self, key: &str) -> StoreResult<u64> {
        match self.get(key)? {
            MetaValue::Uint(v) => Ok(*v),
            other => Err(Self::mismatch(key, "uint", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> StoreResult<i64> {
        match self.get(key)? {
            MetaValue::Int(v) => Ok(*v),
            other => Err(Self::mismatch(key, "int", other)),
        }
    }

    pub fn get_float(&self, key: &str) -> StoreResult<f64> {
        match self.get(key)? {
            MetaValue::Float(v) => Ok(*v),
            other => Err(Self::mismatch(key, "float", other)),
        }
    }

    pub fn get_bool(&self, key: &str) -> StoreResult<bool> {
        match self.get(key)? {
            MetaValue::Bool(v) => Ok(*v),
            other => Err(Self::mismatch(key, "bool", other)),
        }
    }

    pub fn get_string(&self, key: &str) -> StoreResult<&str> {
        match self.get(key)? {
            MetaValue::String(v) => Ok(v),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    /// Read a child-object reference.
    pub fn get_member(&self, key: &str) -> StoreResult<ObjectId> {
        match self.get(key)? {
            MetaValue::Member(id) => Ok(*id),
            other => Err(Self::mismatch(key, "member", other)),
        }
    }

    /// The metadata wire form: one JSON document per object.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Parse the metadata wire form.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Fail with [`StoreError::TypeMismatch`] unless this metadata carries
    /// the expected type descriptor.
    pub fn expect_type(&self, expected: &TypeName) -> StoreResult<()> {
        if &self.type_name != expected {
            return Err(StoreError::TypeMismatch {
                field: "type".to_string(),
                expected: expected.to_string(),
                actual: self.type_name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ObjectMeta {
        ObjectMeta::new(TypeName::parse("arbor::Test").unwrap())
    }

    #[test]
    fn scalar_roundtrip() {
        let mut m = meta();
        m.set_uint("num_elements", 3);
        m.set_int("signed", -7);
        m.set_float("ratio", 0.5);
        m.set_bool("flag", true);
        m.set_string("name", "entries");

        assert_eq!(m.get_uint("num_elements").unwrap(), 3);
        assert_eq!(m.get_int("signed").unwrap(), -7);
        assert_eq!(m.get_float("ratio").unwrap(), 0.5);
        assert!(m.get_bool("flag").unwrap());
        assert_eq!(m.get_string("name").unwrap(), "entries");
    }

    #[test]
    fn member_roundtrip() {
        let mut m = meta();
        let id = ObjectId::from_parts(1, 9);
        m.set_member("entries", id);
        assert_eq!(m.get_member("entries").unwrap(), id);
    }

    #[test]
    fn missing_field() {
        let err = meta().get_uint("absent").unwrap_err();
        assert!(matches!(err, StoreError::MissingField(_)));
    }

    #[test]
    fn type_mismatch_names_both_kinds() {
        let mut m = meta();
        m.set_string("num_elements", "three");
        let err = m.get_uint("num_elements").unwrap_err();
        match err {
            StoreError::TypeMismatch {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "num_elements");
                assert_eq!(expected, "uint");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn id_starts_null() {
        assert!(meta().id().is_null());
    }

    #[test]
    fn last_write_wins() {
        let mut m = meta();
        m.set_uint("x", 1);
        m.set_uint("x", 2);
        assert_eq!(m.get_uint("x").unwrap(), 2);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn expect_type_matches() {
        let m = meta();
        assert!(m.expect_type(&TypeName::parse("arbor::Test").unwrap()).is_ok());
        let err = m
            .expect_type(&TypeName::parse("arbor::Other").unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn wire_form_roundtrip() {
        let mut m = meta();
        m.set_uint("num_slots_minus_one", 7);
        m.set_member("entries", ObjectId::from_parts(2, 4));
        let json = m.to_json().unwrap();
        let parsed = ObjectMeta::from_json(&json).unwrap();
        assert_eq!(m, parsed);
    }

    #[test]
    fn malformed_wire_form_fails() {
        let err = ObjectMeta::from_json("{not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn iter_is_key_ordered() {
        let mut m = meta();
        m.set_uint("b", 2);
        m.set_uint("a", 1);
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
