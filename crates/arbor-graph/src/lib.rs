//! Graph-partition objects for the Arbor object store.
//!
//! A distributed graph is split into fragments, and each fragment carries a
//! vertex map translating external vertex identifiers into the internal ids
//! traversal works with. The maps come in a closed set of variants along
//! three independent axes -- identifier representation (`int64`/`string`),
//! identifier width (`uint32`/`uint64`), and index backend
//! (globally-coordinated vs partition-local) -- and every variant hardens
//! through the same finalize contract; only the payload schema differs.
//!
//! [`register_vertex_maps`] wires the whole set into a type registry so a
//! reader reconstructs any variant from its runtime descriptor alone.

pub mod registry;
pub mod vertex_map;

pub use registry::register_vertex_maps;
pub use vertex_map::{
    GlobalVertexMap, GlobalVertexMapBuilder, LocalVertexMap, LocalVertexMapBuilder, VertexId,
};
