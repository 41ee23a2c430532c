//! Device-resident resources built from loaded assets

pub mod geometry_store;

pub use geometry_store::{GeometryStore, Material, MeshId, MeshRecord};
