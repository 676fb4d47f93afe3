use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Opaque identifier for any published object.
///
/// An `ObjectId` is assigned exactly once, by the client, when an object is
/// successfully registered. The high 16 bits carry the nonce of the client
/// instance that assigned it and the low 48 bits a per-instance sequence, so
/// ids assigned by unrelated clients attached to the same store never collide.
///
/// The zero id is reserved and means "no object".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

/// Bits available for the per-instance sequence.
const SEQUENCE_BITS: u32 = 48;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

impl ObjectId {
    /// Compose an id from an instance nonce and a sequence number.
    ///
    /// The sequence is truncated to its low 48 bits.
    pub fn from_parts(instance: u16, sequence: u64) -> Self {
        Self(((instance as u64) << SEQUENCE_BITS) | (sequence & SEQUENCE_MASK))
    }

    /// Reconstruct an id from its raw wire value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The null object id. Represents "no object".
    pub const fn null() -> Self {
        Self(0)
    }

    /// Returns `true` if this is the null id.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// The raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Nonce of the client instance that assigned this id.
    pub fn instance(&self) -> u16 {
        (self.0 >> SEQUENCE_BITS) as u16
    }

    /// Per-instance sequence number.
    pub fn sequence(&self) -> u64 {
        self.0 & SEQUENCE_MASK
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{:016x}", self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix('o')
            .ok_or_else(|| TypeError::InvalidObjectId(s.to_string()))?;
        if digits.len() != 16 {
            return Err(TypeError::InvalidObjectId(s.to_string()));
        }
        let raw = u64::from_str_radix(digits, 16)
            .map_err(|_| TypeError::InvalidObjectId(s.to_string()))?;
        Ok(Self(raw))
    }
}

impl From<ObjectId> for u64 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_zero() {
        let null = ObjectId::null();
        assert!(null.is_null());
        assert_eq!(null.as_u64(), 0);
    }

    #[test]
    fn from_parts_roundtrip() {
        let id = ObjectId::from_parts(0xBEEF, 42);
        assert_eq!(id.instance(), 0xBEEF);
        assert_eq!(id.sequence(), 42);
        assert!(!id.is_null());
    }

    #[test]
    fn sequence_is_truncated_to_48_bits() {
        let id = ObjectId::from_parts(1, u64::MAX);
        assert_eq!(id.sequence(), (1 << 48) - 1);
        assert_eq!(id.instance(), 1);
    }

    #[test]
    fn display_is_o_prefixed_hex() {
        let id = ObjectId::from_raw(0xDEAD);
        assert_eq!(format!("{id}"), "o000000000000dead");
    }

    #[test]
    fn parse_roundtrip() {
        let id = ObjectId::from_parts(7, 1234);
        let parsed: ObjectId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        let err = "000000000000dead".parse::<ObjectId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidObjectId(_)));
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!("odead".parse::<ObjectId>().is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!("o00000000000000zz".parse::<ObjectId>().is_err());
    }

    #[test]
    fn ids_from_different_instances_differ() {
        let a = ObjectId::from_parts(1, 5);
        let b = ObjectId::from_parts(2, 5);
        assert_ne!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        let id = ObjectId::from_parts(3, 99);
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(ObjectId::from_raw(1) < ObjectId::from_raw(2));
    }
}
