//! Nearest-neighbour index over text embeddings.
//!
//! ## Key Components
//!
//! - **VectorIndex**: flat L2 index with a binary snapshot format
//! - **VectorIndexManager**: pairs the index with an embedding provider and
//!   keeps the position to text id mapping
//!
//! The index is append-only. It is loaded (or created empty) at startup, grows
//! during a vectorization pass and is written back once at the end of it.

pub mod index;
pub mod manager;

pub use index::{Neighbor, VectorIndex};
pub use manager::{SearchHit, VectorIndexManager, metadata_path};
