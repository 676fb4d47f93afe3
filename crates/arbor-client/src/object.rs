use std::any::Any;

use arbor_types::ObjectId;

use crate::client::Client;
use crate::error::StoreResult;
use crate::meta::ObjectMeta;

/// A published, immutable, typed object.
///
/// Once a value implements this trait it is already in the store: its id is
/// assigned, its metadata is registered, and no mutation path exists.
/// Unsynchronized concurrent reads are safe. `as_any` supports downcasting
/// after a registry resolve returns `Box<dyn Object>`.
pub trait Object: Any + Send + Sync {
    /// Identity assigned at registration.
    fn id(&self) -> ObjectId;

    /// The registered metadata.
    fn meta(&self) -> &ObjectMeta;

    /// Downcast support for registry-resolved objects.
    fn as_any(&self) -> &dyn Any;
}

/// The call-once finalize contract every builder implements.
///
/// `finalize` is the single point where nested mutable structures are
/// converted to persisted layout, child objects are registered and receive
/// their own identities, scalar fields are stamped, and the parent itself is
/// registered. It consumes the builder, so invoking it twice is a compile
/// error rather than a runtime policy: once a builder is finalized it no
/// longer exists.
///
/// On failure nothing of the parent is published. Children persisted before
/// the failing step remain as unreferenced arena objects for the arena's own
/// collection policy to reclaim; the parent object is never partially
/// visible.
pub trait ObjectBuilder {
    /// The persisted object this builder hardens into.
    type Output: Object;

    /// Persist, register, and publish. Consumes the builder.
    fn finalize(self, client: &dyn Client) -> StoreResult<Self::Output>;
}
