//! Foundation types for the Arbor object store.
//!
//! This crate provides the identity and type-descriptor vocabulary shared by
//! every other Arbor crate. Every persisted object carries an [`ObjectId`]
//! assigned by the store and a [`TypeName`] describing its concrete layout so
//! that readers in any process (or any language binding) can reconstruct it
//! without compile-time knowledge of the writer.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- opaque 64-bit identity, assigned exactly once at publish
//! - [`TypeName`] -- runtime type descriptor, e.g. `arbor::Hashmap<int64,float64>`
//! - [`TypeTag`] -- maps Rust types to descriptor atoms (`i64` -> `int64`)

pub mod error;
pub mod id;
pub mod typename;

pub use error::TypeError;
pub use id::ObjectId;
pub use typename::{TypeName, TypeTag};
