//! OBJ file loader for 3D models
//!
//! Parses Wavefront OBJ (and its MTL library) with `tobj`, then builds a
//! deduplicated [`MeshData`] whose submeshes follow the per-face material ids.
//! Every shape in the file lands in one shared vertex list and index stream.

use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use crate::assets::AssetError;
use crate::render::primitives::mesh::{partition_submeshes, MeshData, Vertex, VertexDeduplicator};

/// Color assigned to every loaded vertex
pub const DEFAULT_VERTEX_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// Material description read from an MTL library
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSource {
    /// Material name
    pub name: String,
    /// Diffuse texture path, resolved against the OBJ directory
    pub diffuse_texture: Option<PathBuf>,
    /// Specular texture path
    pub specular_texture: Option<PathBuf>,
    /// Bump/normal texture path
    pub bump_texture: Option<PathBuf>,
    /// Ambient color
    pub ambient: [f32; 3],
    /// Diffuse color
    pub diffuse: [f32; 3],
    /// Specular color
    pub specular: [f32; 3],
}

/// Geometry plus the materials its submeshes refer to
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedObj {
    /// Deduplicated geometry
    pub mesh: MeshData,
    /// Materials indexed by `Submesh::material_id`
    pub materials: Vec<MaterialSource>,
}

/// OBJ loading entry points
pub struct ObjLoader;

impl ObjLoader {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ..Default::default()
        }
    }

    /// Load an OBJ file and the MTL library it references
    ///
    /// A missing or malformed material library is not fatal: the geometry
    /// still loads and every face ends up without a material.
    pub fn load_file<P: AsRef<Path>>(path: P, flip_v: bool) -> Result<LoadedObj, AssetError> {
        let path = path.as_ref();
        let (models, materials) = tobj::load_obj(path, &Self::load_options())
            .map_err(|e| AssetError::LoadFailed(format!("{}: {e}", path.display())))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                log::warn!("No usable material library for {}: {}", path.display(), e);
                Vec::new()
            }
        };

        let loaded = Self::build(&models, &materials, base_dir, flip_v)?;
        log::info!(
            "Loaded {}: {} unique vertices, {} indices, {} submeshes, {} materials",
            path.display(),
            loaded.mesh.vertices.len(),
            loaded.mesh.indices.len(),
            loaded.mesh.submeshes.len(),
            loaded.materials.len()
        );
        Ok(loaded)
    }

    /// Load OBJ source text, resolving `mtllib` against the given MTL text
    pub fn load_from_str(obj: &str, mtl: Option<&str>, flip_v: bool) -> Result<LoadedObj, AssetError> {
        let mut reader = BufReader::new(Cursor::new(obj));
        let (models, materials) = tobj::load_obj_buf(&mut reader, &Self::load_options(), |_| {
            mtl.map_or(Err(tobj::LoadError::OpenFileFailed), |text| {
                tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(text)))
            })
        })
        .map_err(|e| AssetError::LoadFailed(format!("in-memory obj: {e}")))?;

        Self::build(&models, &materials.unwrap_or_default(), Path::new(""), flip_v)
    }

    fn build(
        models: &[tobj::Model],
        materials: &[tobj::Material],
        base_dir: &Path,
        flip_v: bool,
    ) -> Result<LoadedObj, AssetError> {
        let mut dedup = VertexDeduplicator::new();
        let mut face_materials = Vec::new();

        for model in models {
            let mesh = &model.mesh;
            for (corner, &position_index) in mesh.indices.iter().enumerate() {
                let p = position_index as usize * 3;
                let position = mesh
                    .positions
                    .get(p..p + 3)
                    .ok_or_else(|| {
                        AssetError::InvalidData(format!(
                            "shape '{}' references missing position {position_index}",
                            model.name
                        ))
                    })?;

                let tex_coord = mesh
                    .texcoord_indices
                    .get(corner)
                    .and_then(|&t| mesh.texcoords.get(t as usize * 2..t as usize * 2 + 2))
                    .map_or([0.0, 0.0], |uv| {
                        [uv[0], if flip_v { 1.0 - uv[1] } else { uv[1] }]
                    });

                dedup
                    .push(Vertex::new(
                        [position[0], position[1], position[2]],
                        tex_coord,
                        DEFAULT_VERTEX_COLOR,
                    ))
                    .map_err(AssetError::InvalidData)?;
            }

            let material_id = mesh.material_id.filter(|&id| id < materials.len());
            face_materials.extend(std::iter::repeat(material_id).take(mesh.indices.len() / 3));
        }

        let submeshes = partition_submeshes(&face_materials).map_err(AssetError::InvalidData)?;
        let (vertices, indices) = dedup.finish();
        let mesh = MeshData {
            vertices,
            indices,
            submeshes,
        };
        mesh.validate().map_err(AssetError::InvalidData)?;

        let materials = materials
            .iter()
            .map(|material| Self::material_source(material, base_dir))
            .collect();

        Ok(LoadedObj { mesh, materials })
    }

    fn material_source(material: &tobj::Material, base_dir: &Path) -> MaterialSource {
        let resolve = |texture: &Option<String>| {
            texture
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(|name| base_dir.join(name))
        };

        MaterialSource {
            name: material.name.clone(),
            diffuse_texture: resolve(&material.diffuse_texture),
            specular_texture: resolve(&material.specular_texture),
            bump_texture: resolve(&material.normal_texture),
            ambient: material.ambient.unwrap_or([0.0; 3]),
            diffuse: material.diffuse.unwrap_or([1.0; 3]),
            specular: material.specular.unwrap_or([0.0; 3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TWO_MATERIAL_CUBE_FACE: &str = "\
mtllib face.mtl
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
usemtl red
f 1/1 2/2 3/3
f 3/3 4/4 1/1
usemtl blue
f 1/1 3/3 4/4
";

    const FACE_MTL: &str = "\
newmtl red
Kd 1 0 0
map_Kd red.png
newmtl blue
Kd 0 0 1
Ks 0.5 0.5 0.5
map_Bump blue_normal.png
";

    #[test]
    fn test_shared_corners_deduplicate() {
        let loaded = ObjLoader::load_from_str(TWO_MATERIAL_CUBE_FACE, Some(FACE_MTL), true).unwrap();
        assert_eq!(loaded.mesh.vertices.len(), 4);
        assert_eq!(loaded.mesh.indices.len(), 9);
    }

    #[test]
    fn test_v_coordinate_is_flipped() {
        let loaded = ObjLoader::load_from_str(TWO_MATERIAL_CUBE_FACE, Some(FACE_MTL), true).unwrap();
        let first = loaded.mesh.vertices[0];
        assert_relative_eq!(first.tex_coord[1], 1.0);
        assert_eq!(first.color, DEFAULT_VERTEX_COLOR);

        let unflipped = ObjLoader::load_from_str(TWO_MATERIAL_CUBE_FACE, Some(FACE_MTL), false).unwrap();
        assert_relative_eq!(unflipped.mesh.vertices[0].tex_coord[1], 0.0);
    }

    #[test]
    fn test_submeshes_follow_material_groups() {
        let loaded = ObjLoader::load_from_str(TWO_MATERIAL_CUBE_FACE, Some(FACE_MTL), true).unwrap();
        let submeshes = &loaded.mesh.submeshes;
        assert_eq!(submeshes.len(), 2);

        let red = loaded.materials[submeshes[0].material_id.unwrap()].clone();
        assert_eq!(red.name, "red");
        assert_eq!((submeshes[0].start_index, submeshes[0].index_count), (0, 6));
        assert_eq!(red.diffuse_texture, Some(PathBuf::from("red.png")));

        let blue = loaded.materials[submeshes[1].material_id.unwrap()].clone();
        assert_eq!(blue.name, "blue");
        assert_eq!((submeshes[1].start_index, submeshes[1].index_count), (6, 3));
        assert_eq!(blue.diffuse_texture, None);
        assert_eq!(blue.bump_texture, Some(PathBuf::from("blue_normal.png")));
        assert_eq!(blue.specular, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_missing_material_library_still_loads_geometry() {
        let loaded = ObjLoader::load_from_str(TWO_MATERIAL_CUBE_FACE, None, true).unwrap();
        assert!(loaded.materials.is_empty());
        assert_eq!(loaded.mesh.submeshes.len(), 1);
        assert_eq!(loaded.mesh.submeshes[0].material_id, None);
        assert_eq!(loaded.mesh.submeshes[0].index_count, 9);
    }

    #[test]
    fn test_missing_texcoords_default_to_origin() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let loaded = ObjLoader::load_from_str(obj, None, true).unwrap();
        assert!(loaded.mesh.vertices.iter().all(|v| v.tex_coord == [0.0, 0.0]));
    }

    #[test]
    fn test_negative_zero_position_reuses_existing_vertex() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv -0 0 -0.000000\nf 1 2 3\nf 4 2 3\n";
        let loaded = ObjLoader::load_from_str(obj, None, false).unwrap();
        assert_eq!(loaded.mesh.vertices.len(), 3);
        assert_eq!(loaded.mesh.indices, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_source_without_faces_is_rejected() {
        let err = ObjLoader::load_from_str("v 0 0 0\n", None, true).unwrap_err();
        assert!(matches!(err, AssetError::InvalidData(_)));
    }

    #[test]
    fn test_unreadable_file_is_a_load_failure() {
        let err = ObjLoader::load_file("/nonexistent/model.obj", true).unwrap_err();
        assert!(matches!(err, AssetError::LoadFailed(_)));
    }
}
