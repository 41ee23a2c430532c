//! Mesh representation for indexed triangle geometry
//!
//! Pure host-side data: vertices, a flat index stream and the submesh runs
//! that partition it by material. Nothing here touches the GPU.

use std::collections::HashMap;

/// Vertex data structure with position, texture coordinate and color
///
/// Equality and hashing both work on canonical component bits: `-0.0`
/// compares equal to `0.0`, and every NaN compares equal to every other NaN.
/// Identical vertices therefore collapse to a single entry during loading.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],

    /// Vertex color
    pub color: [f32; 3],
}

// Only f32 arrays, no padding
unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

fn canonical_bits(component: f32) -> u32 {
    if component == 0.0 {
        0.0f32.to_bits()
    } else if component.is_nan() {
        f32::NAN.to_bits()
    } else {
        component.to_bits()
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl std::hash::Hash for Vertex {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], tex_coord: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position,
            tex_coord,
            color,
        }
    }

    fn key(&self) -> [u32; 8] {
        let [px, py, pz] = self.position;
        let [u, v] = self.tex_coord;
        let [r, g, b] = self.color;
        [px, py, pz, u, v, r, g, b].map(canonical_bits)
    }
}

/// A contiguous run of indices drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    /// Index into the owning mesh's material list, `None` for faces without one
    pub material_id: Option<usize>,
    /// First index of the run
    pub start_index: u32,
    /// Number of indices in the run
    pub index_count: u32,
}

/// Deduplicated geometry ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Unique vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
    /// Material runs covering `indices` exactly once, in order
    pub submeshes: Vec<Submesh>,
}

impl MeshData {
    /// Get number of indices
    ///
    /// Saturates at `u32::MAX`; `validate` rejects meshes that large.
    pub fn index_count(&self) -> u32 {
        u32::try_from(self.indices.len()).unwrap_or(u32::MAX)
    }

    /// Get number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check the mesh is drawable: non-empty, whole triangles, indices in range
    /// and submeshes tiling the index stream
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.is_empty() {
            return Err("mesh has no faces".to_string());
        }
        if u32::try_from(self.indices.len()).is_err() {
            return Err(format!("index count {} does not fit in u32", self.indices.len()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(format!("index count {} is not a multiple of 3", self.indices.len()));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(format!("index {bad} out of range for {} vertices", self.vertices.len()));
        }

        let mut expected_start: u64 = 0;
        for submesh in &self.submeshes {
            if u64::from(submesh.start_index) != expected_start {
                return Err(format!(
                    "submesh starts at {} but previous run ended at {expected_start}",
                    submesh.start_index
                ));
            }
            expected_start += u64::from(submesh.index_count);
        }
        if expected_start != self.indices.len() as u64 {
            return Err(format!(
                "submeshes cover {expected_start} of {} indices",
                self.index_count()
            ));
        }
        Ok(())
    }
}

/// Builds a unique vertex list and its index stream
#[derive(Debug, Default)]
pub struct VertexDeduplicator {
    lookup: HashMap<Vertex, u32>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl VertexDeduplicator {
    /// Create an empty deduplicator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one index, storing the vertex only if it has not been seen
    ///
    /// Fails once a new vertex would not be addressable by a `u32` index.
    pub fn push(&mut self, vertex: Vertex) -> Result<u32, String> {
        let index = match self.lookup.get(&vertex) {
            Some(&index) => index,
            None => {
                let index = u32::try_from(self.vertices.len())
                    .map_err(|_| format!("more than {} unique vertices", u32::MAX))?;
                self.lookup.insert(vertex, index);
                self.vertices.push(vertex);
                index
            }
        };
        self.indices.push(index);
        Ok(index)
    }

    /// Number of unique vertices so far
    pub fn unique_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Consume into `(vertices, indices)`
    pub fn finish(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

/// Split a triangle list into runs of consecutive faces sharing a material
///
/// `face_materials[f]` is the material of face `f`; every face covers three
/// indices. Adjacent faces with the same material share one submesh.
/// Fails when the index stream would not be addressable by `u32`.
pub fn partition_submeshes(face_materials: &[Option<usize>]) -> Result<Vec<Submesh>, String> {
    let index_total = face_materials
        .len()
        .checked_mul(3)
        .and_then(|total| u32::try_from(total).ok())
        .ok_or_else(|| format!("{} faces exceed the u32 index range", face_materials.len()))?;
    let mut submeshes: Vec<Submesh> = Vec::new();

    for (start_index, &material_id) in (0..index_total).step_by(3).zip(face_materials) {
        match submeshes.last_mut() {
            Some(current) if current.material_id == material_id => current.index_count += 3,
            _ => submeshes.push(Submesh {
                material_id,
                start_index,
                index_count: 3,
            }),
        }
    }

    Ok(submeshes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

    fn quad() -> MeshData {
        let corners = [
            Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0], WHITE),
            Vertex::new([1.0, 0.0, 0.0], [1.0, 1.0], WHITE),
            Vertex::new([1.0, 1.0, 0.0], [1.0, 0.0], WHITE),
            Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0], WHITE),
        ];
        let mut dedup = VertexDeduplicator::new();
        for corner in [0, 1, 2, 2, 3, 0] {
            dedup.push(corners[corner]).unwrap();
        }
        let (vertices, indices) = dedup.finish();
        MeshData {
            vertices,
            indices,
            submeshes: partition_submeshes(&[Some(0), Some(0)]).unwrap(),
        }
    }

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_shared_corners_are_stored_once() {
        let mesh = quad();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_texcoord_difference_keeps_vertices_apart() {
        let mut dedup = VertexDeduplicator::new();
        dedup.push(Vertex::new([0.0; 3], [0.0, 0.0], WHITE)).unwrap();
        dedup.push(Vertex::new([0.0; 3], [0.0, 1.0], WHITE)).unwrap();
        dedup.push(Vertex::new([0.0; 3], [0.0, 0.0], WHITE)).unwrap();
        assert_eq!(dedup.unique_vertices(), 2);
        let (_, indices) = dedup.finish();
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_partition_merges_adjacent_faces() {
        let runs = partition_submeshes(&[Some(0), Some(0), Some(1), None, None, Some(0)]).unwrap();
        assert_eq!(
            runs,
            vec![
                Submesh { material_id: Some(0), start_index: 0, index_count: 6 },
                Submesh { material_id: Some(1), start_index: 6, index_count: 3 },
                Submesh { material_id: None, start_index: 9, index_count: 6 },
                Submesh { material_id: Some(0), start_index: 15, index_count: 3 },
            ]
        );
    }

    #[test]
    fn test_partition_of_no_faces_is_empty() {
        assert!(partition_submeshes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_signed_zero_components_share_one_vertex() {
        let positive = Vertex::new([0.0, 1.0, 0.0], [0.0, 0.5], WHITE);
        let negative = Vertex::new([-0.0, 1.0, -0.0], [-0.0, 0.5], WHITE);
        assert_eq!(positive, negative);

        let mut dedup = VertexDeduplicator::new();
        assert_eq!(dedup.push(positive).unwrap(), 0);
        assert_eq!(dedup.push(negative).unwrap(), 0);
        assert_eq!(dedup.unique_vertices(), 1);
    }

    #[test]
    fn test_nan_components_compare_equal_to_themselves() {
        let odd = Vertex::new([f32::NAN, 0.0, 0.0], [0.0, 0.0], WHITE);
        assert_eq!(odd, odd);

        let mut dedup = VertexDeduplicator::new();
        dedup.push(odd).unwrap();
        dedup.push(odd).unwrap();
        assert_eq!(dedup.unique_vertices(), 1);
    }

    #[test]
    fn test_validate_rejects_broken_meshes() {
        assert!(MeshData::default().validate().is_err());

        let mut out_of_range = quad();
        out_of_range.indices[0] = 9;
        assert!(out_of_range.validate().is_err());

        let mut gap = quad();
        gap.submeshes[0].index_count = 3;
        assert!(gap.validate().is_err());
    }
}
