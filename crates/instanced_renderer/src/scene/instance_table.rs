//! Per-instance placement stored as parallel columns
//!
//! Every column has one entry per instance and all columns always have the
//! same length. Instances are addressed by [`InstanceId`], handed out in
//! increasing order and never reused; there is no removal.
//!
//! Model matrices are cached. Any change to position, rotation or scale marks
//! the row dirty, and [`InstanceTable::update_model_matrices`] recomputes only
//! dirty rows, clearing the flag.

use std::collections::HashMap;

use log::trace;

use crate::foundation::math::{model_matrix_zyx, Mat4, Vec3};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::resources::geometry_store::MeshId;

/// Spin applied to every new instance, in degrees per second about each axis
pub const DEFAULT_ROTATION_SPEED: Vec3 = Vec3::new(0.0, 0.0, 10.0);

/// Index of a row in the instance table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub usize);

/// Transform state for every placed object
#[derive(Debug, Default)]
pub struct InstanceTable {
    mesh_ids: Vec<MeshId>,
    positions: Vec<Vec3>,
    rotations: Vec<Vec3>,
    scales: Vec<Vec3>,
    moving_directions: Vec<Vec3>,
    moving_speeds: Vec<f32>,
    rotation_speeds: Vec<Vec3>,
    model_matrices: Vec<Mat4>,
    dirty: Vec<bool>,

    // Reserved for smoothed transitions. Written by the setters, read by
    // nothing: they have no effect on update or the model matrix.
    target_positions: Vec<Vec3>,
    target_rotations: Vec<Vec3>,
    target_scales: Vec<Vec3>,
    changing_position: Vec<bool>,
    changing_rotation: Vec<bool>,
    changing_scale: Vec<bool>,

    instances_by_mesh: HashMap<MeshId, Vec<InstanceId>>,
}

impl InstanceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance at the origin with unit scale and the default spin
    pub fn add_instance(&mut self, mesh_id: MeshId) -> InstanceId {
        self.add_instance_with(mesh_id, Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0))
    }

    /// Add an instance with an explicit placement; rotation is Euler degrees
    pub fn add_instance_with(
        &mut self,
        mesh_id: MeshId,
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
    ) -> InstanceId {
        let id = InstanceId(self.mesh_ids.len());

        self.mesh_ids.push(mesh_id);
        self.positions.push(position);
        self.rotations.push(rotation);
        self.scales.push(scale);
        self.moving_directions.push(Vec3::zeros());
        self.moving_speeds.push(0.0);
        self.rotation_speeds.push(DEFAULT_ROTATION_SPEED);
        self.model_matrices.push(Mat4::identity());
        self.dirty.push(true);

        self.target_positions.push(Vec3::zeros());
        self.target_rotations.push(Vec3::zeros());
        self.target_scales.push(Vec3::zeros());
        self.changing_position.push(false);
        self.changing_rotation.push(false);
        self.changing_scale.push(false);

        self.instances_by_mesh.entry(mesh_id).or_default().push(id);
        id
    }

    /// Advance motion by `dt` seconds
    ///
    /// Moves every instance with a non-zero speed along its direction and
    /// spins every instance with a non-zero rotation speed, marking both
    /// dirty. Matrices are not recomputed here.
    pub fn update(&mut self, dt: f32) {
        for i in 0..self.len() {
            if self.moving_speeds[i] != 0.0 {
                self.positions[i] += self.moving_directions[i] * (dt * self.moving_speeds[i]);
                self.dirty[i] = true;
            }
            if self.rotation_speeds[i] != Vec3::zeros() {
                self.rotations[i] += self.rotation_speeds[i] * dt;
                self.dirty[i] = true;
            }
        }
    }

    /// Recompute the model matrix of every dirty instance
    ///
    /// Returns how many matrices were rebuilt. A second call with no
    /// mutation in between rebuilds nothing.
    pub fn update_model_matrices(&mut self) -> usize {
        let mut rebuilt = 0;
        for i in 0..self.len() {
            if self.dirty[i] {
                self.model_matrices[i] =
                    model_matrix_zyx(&self.positions[i], &self.rotations[i], &self.scales[i]);
                self.dirty[i] = false;
                rebuilt += 1;
            }
        }
        trace!("Rebuilt {} of {} model matrices", rebuilt, self.len());
        rebuilt
    }

    fn row(&self, id: InstanceId) -> VulkanResult<usize> {
        if id.0 < self.len() {
            Ok(id.0)
        } else {
            Err(VulkanError::ResourceNotFound {
                kind: "instance",
                id: id.0 as u64,
            })
        }
    }

    /// Record a target position. Reserved: does not move the instance.
    pub fn set_position(&mut self, id: InstanceId, position: Vec3) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.target_positions[i] = position;
        self.changing_position[i] = true;
        Ok(())
    }

    /// Record a target rotation. Reserved: does not rotate the instance.
    pub fn set_rotation(&mut self, id: InstanceId, rotation: Vec3) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.target_rotations[i] = rotation;
        self.changing_rotation[i] = true;
        Ok(())
    }

    /// Record a target scale. Reserved: does not rescale the instance.
    pub fn set_scale(&mut self, id: InstanceId, scale: Vec3) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.target_scales[i] = scale;
        self.changing_scale[i] = true;
        Ok(())
    }

    /// Set spin in degrees per second: yaw about X, pitch about Y, roll about Z
    pub fn set_rotation_speed(&mut self, id: InstanceId, yaw: f32, pitch: f32, roll: f32) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.rotation_speeds[i] = Vec3::new(yaw, pitch, roll);
        Ok(())
    }

    /// Set linear speed in units per second
    pub fn set_moving_speed(&mut self, id: InstanceId, speed: f32) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.moving_speeds[i] = speed;
        Ok(())
    }

    /// Set the direction of travel; non-zero vectors are normalized
    pub fn set_moving_direction(&mut self, id: InstanceId, direction: Vec3) -> VulkanResult<()> {
        let i = self.row(id)?;
        self.moving_directions[i] = direction.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros);
        Ok(())
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.mesh_ids.len()
    }

    /// Whether the table has no instances
    pub fn is_empty(&self) -> bool {
        self.mesh_ids.is_empty()
    }

    /// Cached model matrix; stale until `update_model_matrices` if dirty
    pub fn model_matrix(&self, id: InstanceId) -> Option<&Mat4> {
        self.model_matrices.get(id.0)
    }

    /// All cached model matrices in instance order
    pub fn model_matrices(&self) -> &[Mat4] {
        &self.model_matrices
    }

    /// Mesh drawn by an instance
    pub fn mesh_id(&self, id: InstanceId) -> Option<MeshId> {
        self.mesh_ids.get(id.0).copied()
    }

    /// Current position
    pub fn position(&self, id: InstanceId) -> Option<Vec3> {
        self.positions.get(id.0).copied()
    }

    /// Current Euler rotation in degrees
    pub fn rotation(&self, id: InstanceId) -> Option<Vec3> {
        self.rotations.get(id.0).copied()
    }

    /// Current scale
    pub fn scale(&self, id: InstanceId) -> Option<Vec3> {
        self.scales.get(id.0).copied()
    }

    /// Whether the cached matrix is stale
    pub fn is_dirty(&self, id: InstanceId) -> Option<bool> {
        self.dirty.get(id.0).copied()
    }

    /// Instances drawing `mesh_id`, in creation order
    pub fn instances_for_mesh(&self, mesh_id: MeshId) -> &[InstanceId] {
        self.instances_by_mesh
            .get(&mesh_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate instance ids in creation order
    pub fn ids(&self) -> impl Iterator<Item = InstanceId> {
        (0..self.len()).map(InstanceId)
    }

    #[cfg(test)]
    fn column_lengths(&self) -> [usize; 15] {
        [
            self.mesh_ids.len(),
            self.positions.len(),
            self.rotations.len(),
            self.scales.len(),
            self.moving_directions.len(),
            self.moving_speeds.len(),
            self.rotation_speeds.len(),
            self.model_matrices.len(),
            self.dirty.len(),
            self.target_positions.len(),
            self.target_rotations.len(),
            self.target_scales.len(),
            self.changing_position.len(),
            self.changing_rotation.len(),
            self.changing_scale.len(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::deg_to_rad;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_every_column_grows_with_each_add() {
        let mut table = InstanceTable::new();
        for n in 1..=8 {
            if n % 2 == 0 {
                table.add_instance(MeshId(n % 3));
            } else {
                table.add_instance_with(MeshId(0), Vec3::new(n as f32, 0.0, 0.0), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
            }
            assert!(table.column_lengths().iter().all(|&len| len == n));
            assert_eq!(table.len(), n);
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut table = InstanceTable::new();
        assert_eq!(table.add_instance(MeshId(0)), InstanceId(0));
        assert_eq!(table.add_instance(MeshId(1)), InstanceId(1));
        assert_eq!(table.add_instance(MeshId(0)), InstanceId(2));
        assert_eq!(table.ids().collect::<Vec<_>>(), vec![InstanceId(0), InstanceId(1), InstanceId(2)]);
    }

    #[test]
    fn test_new_instance_is_dirty_with_default_spin() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        assert_eq!(table.is_dirty(id), Some(true));
        assert_eq!(table.position(id), Some(Vec3::zeros()));
        assert_eq!(table.scale(id), Some(Vec3::new(1.0, 1.0, 1.0)));
        assert_eq!(table.rotation_speeds[0], Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn test_identity_placement_gives_identity_matrix() {
        let mut table = InstanceTable::new();
        let id = table.add_instance_with(MeshId(0), Vec3::zeros(), Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        table.update_model_matrices();
        assert_eq!(table.model_matrix(id), Some(&Mat4::identity()));
        assert_eq!(table.is_dirty(id), Some(false));
    }

    #[test]
    fn test_default_spin_rotates_about_z() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        table.update_model_matrices();

        table.update(0.5);
        assert_relative_eq!(table.rotation(id).unwrap().z, 5.0, epsilon = EPSILON);
        assert_eq!(table.is_dirty(id), Some(true));

        table.update_model_matrices();
        let expected = Mat4::from_axis_angle(&Vec3::z_axis(), deg_to_rad(5.0));
        assert_relative_eq!(*table.model_matrix(id).unwrap(), expected, epsilon = EPSILON);
    }

    #[test]
    fn test_update_model_matrices_is_idempotent() {
        let mut table = InstanceTable::new();
        table.add_instance_with(MeshId(0), Vec3::new(1.0, -2.0, 3.0), Vec3::new(10.0, 20.0, 30.0), Vec3::new(2.0, 2.0, 2.0));
        table.add_instance(MeshId(1));
        table.update(0.25);

        assert_eq!(table.update_model_matrices(), 2);
        let first: Vec<Mat4> = table.model_matrices().to_vec();
        assert_eq!(table.update_model_matrices(), 0);
        let second = table.model_matrices();

        for (a, b) in first.iter().zip(second) {
            let a_bits: Vec<u32> = a.iter().map(|f| f.to_bits()).collect();
            let b_bits: Vec<u32> = b.iter().map(|f| f.to_bits()).collect();
            assert_eq!(a_bits, b_bits);
        }
    }

    #[test]
    fn test_moving_instance_advances_along_direction() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        table.set_rotation_speed(id, 0.0, 0.0, 0.0).unwrap();
        table.set_moving_direction(id, Vec3::new(0.0, 3.0, 4.0)).unwrap();
        table.set_moving_speed(id, 2.0).unwrap();
        table.update_model_matrices();

        table.update(0.5);
        assert_relative_eq!(table.position(id).unwrap(), Vec3::new(0.0, 0.6, 0.8), epsilon = EPSILON);
        assert_eq!(table.is_dirty(id), Some(true));

        table.update_model_matrices();
        let m = table.model_matrix(id).unwrap();
        assert_relative_eq!(m.m24, 0.6, epsilon = EPSILON);
        assert_relative_eq!(m.m34, 0.8, epsilon = EPSILON);
    }

    #[test]
    fn test_still_instance_stays_clean() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        table.set_rotation_speed(id, 0.0, 0.0, 0.0).unwrap();
        table.update_model_matrices();

        table.update(1.0);
        assert_eq!(table.is_dirty(id), Some(false));
        assert_eq!(table.update_model_matrices(), 0);
    }

    #[test]
    fn test_target_setters_are_inert() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        table.set_rotation_speed(id, 0.0, 0.0, 0.0).unwrap();
        table.update_model_matrices();

        table.set_position(id, Vec3::new(5.0, 5.0, 5.0)).unwrap();
        table.set_rotation(id, Vec3::new(90.0, 0.0, 0.0)).unwrap();
        table.set_scale(id, Vec3::new(3.0, 3.0, 3.0)).unwrap();
        assert!(table.changing_position[0] && table.changing_rotation[0] && table.changing_scale[0]);
        assert_eq!(table.target_positions[0], Vec3::new(5.0, 5.0, 5.0));

        table.update(1.0);
        assert_eq!(table.is_dirty(id), Some(false));
        assert_eq!(table.position(id), Some(Vec3::zeros()));
        assert_eq!(table.model_matrix(id), Some(&Mat4::identity()));
    }

    #[test]
    fn test_unknown_instance_is_reported() {
        let mut table = InstanceTable::new();
        table.add_instance(MeshId(0));
        let err = table.set_moving_speed(InstanceId(4), 1.0).unwrap_err();
        assert!(matches!(err, VulkanError::ResourceNotFound { kind: "instance", id: 4 }));
        assert!(table.model_matrix(InstanceId(4)).is_none());
        assert!(table.mesh_id(InstanceId(4)).is_none());
    }

    #[test]
    fn test_instances_are_indexed_by_mesh() {
        let mut table = InstanceTable::new();
        let a = table.add_instance(MeshId(0));
        let b = table.add_instance(MeshId(1));
        let c = table.add_instance(MeshId(0));

        assert_eq!(table.instances_for_mesh(MeshId(0)), &[a, c]);
        assert_eq!(table.instances_for_mesh(MeshId(1)), &[b]);
        assert!(table.instances_for_mesh(MeshId(7)).is_empty());
        assert_eq!(table.mesh_id(b), Some(MeshId(1)));
    }

    #[test]
    fn test_zero_direction_stays_zero() {
        let mut table = InstanceTable::new();
        let id = table.add_instance(MeshId(0));
        table.set_moving_direction(id, Vec3::zeros()).unwrap();
        table.set_moving_speed(id, 5.0).unwrap();
        table.update(1.0);
        assert_eq!(table.position(id), Some(Vec3::zeros()));
    }
}
