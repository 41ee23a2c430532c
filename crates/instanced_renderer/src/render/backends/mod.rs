//! Graphics backend implementations
//!
//! Vulkan is the only backend.

pub mod vulkan;
