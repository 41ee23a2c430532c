//! Device-resident meshes and their materials
//!
//! `GeometryStore` owns every uploaded mesh. Loading parses the source,
//! deduplicates vertices, uploads vertex and index data through staging
//! buffers and builds one sampler descriptor set per material. Meshes are
//! immutable once stored and live until [`GeometryStore::destroy`].

use std::path::Path;

use ash::vk;
use log::{debug, info, warn};

use crate::assets::{AssetError, LoadedObj, MaterialSource, ObjLoader};
use crate::config::RendererConfig;
use crate::render::backends::vulkan::device::{DescriptorWrite, GpuDevice};
use crate::render::backends::vulkan::resources::buffer::DeviceLocalBuffer;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorAllocator;
use crate::render::backends::vulkan::resources::texture::{MaterialTextureBinder, TextureHandle};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::primitives::mesh::{MeshData, Submesh, Vertex};

/// Index of a mesh in the geometry store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Surface description shared by the submeshes that reference it
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name from the library
    pub name: String,
    /// Diffuse texture, `INVALID` if absent or failed to load
    pub diffuse_texture: TextureHandle,
    /// Specular texture
    pub specular_texture: TextureHandle,
    /// Bump texture
    pub bump_texture: TextureHandle,
    /// Ambient color
    pub ambient: [f32; 3],
    /// Diffuse color
    pub diffuse: [f32; 3],
    /// Specular color
    pub specular: [f32; 3],
    descriptor_set: vk::DescriptorSet,
}

impl Material {
    /// Set 2 binding: the diffuse texture, or the white fallback
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// One uploaded mesh
#[derive(Debug)]
pub struct MeshRecord {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    submeshes: Vec<Submesh>,
    materials: Vec<Material>,
    vertex_buffer: DeviceLocalBuffer,
    index_buffer: DeviceLocalBuffer,
    fallback_descriptor: vk::DescriptorSet,
}

impl MeshRecord {
    /// Source path or name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique vertices as uploaded
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index stream as uploaded
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Material runs over the index stream
    pub fn submeshes(&self) -> &[Submesh] {
        &self.submeshes
    }

    /// Materials referenced by `Submesh::material_id`
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    /// Device vertex buffer
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Device index buffer
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Number of indices in the index buffer
    pub fn index_count(&self) -> u32 {
        self.index_buffer.element_count()
    }

    /// Descriptor for a submesh's material, or the white fallback
    pub fn submesh_descriptor(&self, submesh: &Submesh) -> vk::DescriptorSet {
        submesh
            .material_id
            .and_then(|id| self.materials.get(id))
            .map_or(self.fallback_descriptor, Material::descriptor_set)
    }

    /// Descriptor bound for whole-mesh draws: the first submesh's material
    pub fn mesh_descriptor(&self) -> vk::DescriptorSet {
        self.submeshes
            .first()
            .map_or(self.fallback_descriptor, |submesh| self.submesh_descriptor(submesh))
    }
}

/// Owns all meshes and the material descriptor pool
pub struct GeometryStore {
    meshes: Vec<MeshRecord>,
    descriptors: DescriptorAllocator,
    white_descriptor: Option<vk::DescriptorSet>,
    flip_texcoord_v: bool,
}

impl GeometryStore {
    /// Create an empty store
    ///
    /// `material_layout` must hold a combined image sampler at binding 0, see
    /// `DescriptorSetLayoutBuilder::material_sampler`.
    pub fn new(
        device: &dyn GpuDevice,
        material_layout: vk::DescriptorSetLayout,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let descriptors = DescriptorAllocator::new(
            device,
            material_layout,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            config.max_material_descriptor_sets,
        )?;

        Ok(Self {
            meshes: Vec::new(),
            descriptors,
            white_descriptor: None,
            flip_texcoord_v: config.flip_texcoord_v,
        })
    }

    /// Load an OBJ file, its materials and their textures
    ///
    /// Texture paths are resolved relative to the OBJ file. A texture that
    /// fails to load leaves its material slot `INVALID`; a material without a
    /// diffuse texture samples the white fallback.
    pub fn load_mesh(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
        path: &Path,
    ) -> VulkanResult<MeshId> {
        let name = path.display().to_string();
        let loaded = ObjLoader::load_file(path, self.flip_texcoord_v).map_err(|e| load_error(&name, &e))?;
        self.add_mesh(device, textures, &name, loaded)
    }

    /// Load OBJ source text with an optional MTL library
    pub fn load_mesh_from_str(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
        name: &str,
        obj: &str,
        mtl: Option<&str>,
    ) -> VulkanResult<MeshId> {
        let loaded = ObjLoader::load_from_str(obj, mtl, self.flip_texcoord_v)
            .map_err(|e| load_error(name, &e))?;
        self.add_mesh(device, textures, name, loaded)
    }

    /// Upload already parsed geometry and its materials
    pub fn add_mesh(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
        name: &str,
        loaded: LoadedObj,
    ) -> VulkanResult<MeshId> {
        let LoadedObj { mesh, materials } = loaded;
        mesh.validate().map_err(|reason| VulkanError::Load {
            path: name.to_string(),
            reason,
        })?;

        let vertex_buffer = DeviceLocalBuffer::upload(device, &mesh.vertices, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer = match DeviceLocalBuffer::upload(device, &mesh.indices, vk::BufferUsageFlags::INDEX_BUFFER) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.destroy(device);
                return Err(e);
            }
        };

        let (materials, fallback_descriptor) = match self.bind_materials(device, textures, &materials) {
            Ok(bound) => bound,
            Err(e) => {
                vertex_buffer.destroy(device);
                index_buffer.destroy(device);
                return Err(e);
            }
        };

        let id = MeshId(self.meshes.len());
        let MeshData {
            vertices,
            indices,
            submeshes,
        } = mesh;
        info!(
            "Mesh {} stored as {:?}: {} vertices, {} indices, {} submeshes, {} materials",
            name,
            id,
            vertices.len(),
            indices.len(),
            submeshes.len(),
            materials.len()
        );

        self.meshes.push(MeshRecord {
            name: name.to_string(),
            vertices,
            indices,
            submeshes,
            materials,
            vertex_buffer,
            index_buffer,
            fallback_descriptor,
        });
        Ok(id)
    }

    /// Materials of one mesh plus the descriptor for material-less submeshes
    fn bind_materials(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
        sources: &[MaterialSource],
    ) -> VulkanResult<(Vec<Material>, vk::DescriptorSet)> {
        let mut materials = Vec::with_capacity(sources.len());
        for source in sources {
            match self.bind_material(device, textures, source) {
                Ok(material) => materials.push(material),
                Err(e) => {
                    self.release_materials(device, &materials);
                    return Err(e);
                }
            }
        }
        match self.white_descriptor(device, textures) {
            Ok(fallback) => Ok((materials, fallback)),
            Err(e) => {
                self.release_materials(device, &materials);
                Err(e)
            }
        }
    }

    /// Hand the descriptor sets of a partially bound mesh back to the pool
    fn release_materials(&mut self, device: &dyn GpuDevice, materials: &[Material]) {
        let sets: Vec<_> = materials.iter().map(Material::descriptor_set).collect();
        if let Err(e) = self.descriptors.free(device, &sets) {
            warn!("Could not release {} material descriptor sets: {}", sets.len(), e);
        }
    }

    fn bind_material(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
        source: &MaterialSource,
    ) -> VulkanResult<Material> {
        let mut load = |path: Option<&Path>| {
            path.map_or(TextureHandle::INVALID, |p| textures.load_texture_or_invalid(device, p))
        };
        let diffuse_texture = load(source.diffuse_texture.as_deref());
        let specular_texture = load(source.specular_texture.as_deref());
        let bump_texture = load(source.bump_texture.as_deref());

        let sampled = if diffuse_texture.is_valid() {
            diffuse_texture
        } else {
            debug!("Material {} samples the white fallback", source.name);
            textures.white_fallback(device)?
        };
        let descriptor_set = self.sampler_descriptor(device, textures, sampled)?;

        Ok(Material {
            name: source.name.clone(),
            diffuse_texture,
            specular_texture,
            bump_texture,
            ambient: source.ambient,
            diffuse: source.diffuse,
            specular: source.specular,
            descriptor_set,
        })
    }

    fn sampler_descriptor(
        &mut self,
        device: &dyn GpuDevice,
        textures: &MaterialTextureBinder,
        texture: TextureHandle,
    ) -> VulkanResult<vk::DescriptorSet> {
        let record = textures.texture(texture).ok_or(VulkanError::ResourceNotFound {
            kind: "texture",
            id: texture.0 as u64,
        })?;
        let set = self.descriptors.allocate(device)?;
        device.write_descriptor(&DescriptorWrite::CombinedImageSampler {
            set,
            binding: 0,
            view: record.image_view(),
            sampler: record.sampler(),
        });
        Ok(set)
    }

    fn white_descriptor(
        &mut self,
        device: &dyn GpuDevice,
        textures: &mut MaterialTextureBinder,
    ) -> VulkanResult<vk::DescriptorSet> {
        if let Some(set) = self.white_descriptor {
            return Ok(set);
        }
        let white = textures.white_fallback(device)?;
        let set = self.sampler_descriptor(device, textures, white)?;
        self.white_descriptor = Some(set);
        Ok(set)
    }

    fn record(&self, id: MeshId) -> VulkanResult<&MeshRecord> {
        self.meshes.get(id.0).ok_or(VulkanError::ResourceNotFound {
            kind: "mesh",
            id: id.0 as u64,
        })
    }

    /// Look up a mesh
    pub fn mesh(&self, id: MeshId) -> Option<&MeshRecord> {
        self.meshes.get(id.0)
    }

    /// Device vertex buffer of a mesh
    pub fn vertex_buffer(&self, id: MeshId) -> VulkanResult<vk::Buffer> {
        self.record(id).map(MeshRecord::vertex_buffer)
    }

    /// Device index buffer of a mesh
    pub fn index_buffer(&self, id: MeshId) -> VulkanResult<vk::Buffer> {
        self.record(id).map(MeshRecord::index_buffer)
    }

    /// Index count of a mesh
    pub fn index_count(&self, id: MeshId) -> VulkanResult<u32> {
        self.record(id).map(MeshRecord::index_count)
    }

    /// Submeshes of a mesh
    pub fn submeshes(&self, id: MeshId) -> VulkanResult<&[Submesh]> {
        self.record(id).map(MeshRecord::submeshes)
    }

    /// Number of stored meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Source name of a mesh
    pub fn mesh_name(&self, id: MeshId) -> Option<&str> {
        self.mesh(id).map(MeshRecord::name)
    }

    /// Free every mesh buffer and the material descriptor pool
    ///
    /// Textures belong to the binder and are destroyed there. The store is
    /// empty afterwards but its descriptor pool is gone, so it cannot load
    /// again.
    pub fn destroy(self, device: &dyn GpuDevice) {
        let count = self.meshes.len();
        for mesh in self.meshes {
            mesh.vertex_buffer.destroy(device);
            mesh.index_buffer.destroy(device);
        }
        self.descriptors.destroy(device);
        debug!("GeometryStore released {} meshes", count);
    }
}

fn load_error(name: &str, error: &AssetError) -> VulkanError {
    VulkanError::Load {
        path: name.to_string(),
        reason: error.to_string(),
    }
}
