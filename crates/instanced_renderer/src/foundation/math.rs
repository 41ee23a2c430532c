//! Math utilities and types
//!
//! Provides the nalgebra aliases used across the renderer and the model-matrix
//! composition shared by every instance.

pub use nalgebra::{Matrix4, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type (column-major, matches GLSL `mat4`)
pub type Mat4 = Matrix4<f32>;

/// Size of one `mat4` as laid out in a uniform block
pub const MAT4_SIZE: u64 = std::mem::size_of::<[f32; 16]>() as u64;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Convert degrees to radians
pub fn deg_to_rad(degrees: f32) -> f32 {
    degrees * constants::DEG_TO_RAD
}

/// Build a model matrix from a translation, Euler rotation in degrees and a
/// non-uniform scale.
///
/// The composition is `T * Rz * Ry * Rx * S`: rotations are applied to the
/// scaled model about X first, then Y, then Z. Changing this order changes
/// every rendered instance.
pub fn model_matrix_zyx(position: &Vec3, rotation_degrees: &Vec3, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position)
        * Mat4::from_axis_angle(&Vec3::z_axis(), deg_to_rad(rotation_degrees.z))
        * Mat4::from_axis_angle(&Vec3::y_axis(), deg_to_rad(rotation_degrees.y))
        * Mat4::from_axis_angle(&Vec3::x_axis(), deg_to_rad(rotation_degrees.x))
        * Mat4::new_nonuniform_scaling(scale)
}

/// View a matrix as the 64 bytes a shader reads
pub fn mat4_bytes(matrix: &Mat4) -> &[u8] {
    bytemuck::cast_slice(matrix.as_slice())
}
