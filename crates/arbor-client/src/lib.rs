//! Store boundary for the Arbor object store.
//!
//! This crate defines the contract a builder must satisfy to harden a
//! mutable, process-local structure into an immutable, self-describing
//! object shared through the arena: blobs, typed object metadata, the
//! [`Client`] handle to the arena/registry, and the call-once
//! [`ObjectBuilder`] finalize protocol.
//!
//! # Design Rules
//!
//! 1. Publication is all-or-nothing: a reader never observes a subset of an
//!    object's fields or a partially written blob.
//! 2. Published objects and blobs are immutable; the store is append-only.
//! 3. Ids are assigned exactly once, by the client, at successful publish.
//! 4. Finalize consumes the builder -- re-entry is a compile error, not a
//!    runtime policy.
//! 5. Builders are single-owner and carry no internal synchronization;
//!    callers serialize access. Published objects are safe for
//!    unsynchronized concurrent reads.
//! 6. Every failure is reported through the result value; no failure
//!    corrupts an already-published object.
//!
//! # Collaborators
//!
//! The IPC transport that maps arena segments between processes is out of
//! scope; [`InProcessClient`] is the reference [`Client`] for same-process
//! use and tests.

pub mod blob;
pub mod client;
pub mod error;
pub mod meta;
pub mod object;
pub mod registry;

pub use blob::{Blob, BlobWriter};
pub use client::{Client, ClientOptions, InProcessClient};
pub use error::{StoreError, StoreResult};
pub use meta::{MetaValue, ObjectMeta};
pub use object::{Object, ObjectBuilder};
pub use registry::{ObjectFactory, TypeRegistry};
