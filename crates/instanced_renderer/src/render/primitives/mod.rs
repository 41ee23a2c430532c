//! Backend-agnostic geometry primitives

pub mod mesh;

pub use mesh::{partition_submeshes, MeshData, Submesh, Vertex, VertexDeduplicator};
