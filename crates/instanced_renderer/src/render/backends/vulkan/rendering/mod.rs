// Vulkan draw-time components

pub mod draw_recorder;
pub mod frame_binding;
pub mod vertex_layout;

pub use draw_recorder::*;
pub use frame_binding::*;
pub use vertex_layout::*;
