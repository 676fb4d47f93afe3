//! Persisted data structures for the Arbor object store.
//!
//! The pattern throughout: a hot, mutable, process-local representation is
//! decoupled from a cold, immutable, shared one. Builders accumulate state
//! with cache-friendly in-memory layouts; finalize hardens that state into
//! flat, position-addressable buffers a reader in any process (or language)
//! can consume without the builder's internal logic.
//!
//! # Types
//!
//! - [`ArrayBuilder`] / [`Array`] -- typed flat array over one blob
//! - [`HashmapBuilder`] / [`Hashmap`] -- open-addressing map persisted as a
//!   slot-ordered entries array
//!
//! # Design Rules
//!
//! 1. Finalize consumes the builder; a builder is gone once its object
//!    exists.
//! 2. The persisted layout is self-describing: layout parameters travel in
//!    the object metadata, payloads in flat blobs.
//! 3. Readers validate layout invariants before trusting a buffer and
//!    reconstruct mutable state only through explicit conversion.

pub mod array;
pub mod hashmap;

pub use array::{Array, ArrayBuilder};
pub use hashmap::{EntrySlot, Hashmap, HashmapBuilder};
