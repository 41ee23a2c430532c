//! # Rendering System
//!
//! GPU resource and instance plumbing for an instanced mesh renderer.
//!
//! ## Architecture
//!
//! - **Primitives**: vertex format, mesh data, deduplication and submeshes
//! - **Resources**: the geometry store that owns uploaded meshes and materials
//! - **Vulkan Backend**: device seam, staged uploads, textures, descriptors,
//!   the per-instance uniform block and frame draw recording
//!
//! Window, swapchain, render pass and pipeline creation live outside this
//! crate. They hand in a device and a command buffer and consume the bound
//! buffers and descriptor sets.

// Core primitives
pub mod primitives;

// Resources
pub mod resources;

/// Graphics backend implementations
pub mod backends;

pub use primitives::{MeshData, Submesh, Vertex};
pub use resources::{GeometryStore, Material, MeshId, MeshRecord};
