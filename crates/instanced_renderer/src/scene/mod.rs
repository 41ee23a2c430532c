//! Scene state updated every frame

pub mod instance_table;

pub use instance_table::{InstanceId, InstanceTable, DEFAULT_ROTATION_SPEED};
