//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types and model-matrix composition
//! - Logging utilities

pub mod math;
pub mod logging;
