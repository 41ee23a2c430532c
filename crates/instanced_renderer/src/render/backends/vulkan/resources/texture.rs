//! Vulkan texture management
//!
//! `MaterialTextureBinder` decodes images, uploads them through a staging
//! buffer into optimally tiled device images and creates the view and sampler
//! used by material descriptors. Textures are addressed by stable integer
//! handles; `TextureHandle::INVALID` marks an absent or failed texture.

use std::path::Path;

use ash::vk;
use log::{debug, warn};

use crate::assets::ImageData;
use crate::config::RendererConfig;
use crate::render::backends::vulkan::device::{
    AllocatedImage, BufferDesc, GpuDevice, ImageBarrier, ImageDesc, SamplerDesc, TransferCommand,
};
use crate::render::backends::vulkan::resources::buffer::write_data;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Texel format of every material texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Stable texture identifier, `-1` when no texture is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub i32);

impl TextureHandle {
    /// No texture
    pub const INVALID: Self = Self(-1);

    /// Whether the handle refers to a loaded texture
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Build the barrier for a layout transition
///
/// Only the pairs below are legal; anything else is
/// `UnsupportedLayoutTransition` and is never recorded.
///
/// | old             | new                              |
/// |-----------------|----------------------------------|
/// | PREINITIALIZED  | TRANSFER_SRC_OPTIMAL             |
/// | PREINITIALIZED  | TRANSFER_DST_OPTIMAL             |
/// | UNDEFINED       | TRANSFER_DST_OPTIMAL             |
/// | TRANSFER_DST    | SHADER_READ_ONLY_OPTIMAL         |
/// | UNDEFINED       | DEPTH_STENCIL_ATTACHMENT_OPTIMAL |
pub fn transition_barrier(
    image: vk::Image,
    format: vk::Format,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<ImageBarrier> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (src_access_mask, dst_access_mask, src_stage, dst_stage) = match (old_layout, new_layout) {
        (L::PREINITIALIZED, L::TRANSFER_SRC_OPTIMAL) => {
            (A::HOST_WRITE, A::TRANSFER_READ, S::HOST, S::TRANSFER)
        }
        (L::PREINITIALIZED, L::TRANSFER_DST_OPTIMAL) => {
            (A::HOST_WRITE, A::TRANSFER_WRITE, S::HOST, S::TRANSFER)
        }
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        (old, new) => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    };

    let aspect_mask = if new_layout == L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    };

    Ok(ImageBarrier {
        image,
        old_layout,
        new_layout,
        aspect_mask,
        src_access_mask,
        dst_access_mask,
        src_stage,
        dst_stage,
    })
}

fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Device-resident texture
#[derive(Debug)]
pub struct TextureRecord {
    image: AllocatedImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
    name: String,
}

impl TextureRecord {
    /// Get the image view for descriptor set binding
    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the sampler for descriptor set binding
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Source path or name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texture extent in texels
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent
    }

    fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_sampler(self.sampler);
        device.destroy_image_view(self.view);
        device.destroy_image(self.image);
    }
}

/// Loads textures and hands out stable handles
pub struct MaterialTextureBinder {
    textures: Vec<TextureRecord>,
    sampler_desc: SamplerDesc,
    white: Option<TextureHandle>,
}

impl MaterialTextureBinder {
    /// Create an empty binder; sampler settings come from `config`
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            textures: Vec::new(),
            sampler_desc: SamplerDesc {
                filter: vk::Filter::LINEAR,
                address_mode: vk::SamplerAddressMode::REPEAT,
                max_anisotropy: config.max_anisotropy,
            },
            white: None,
        }
    }

    /// Decode an image file and upload it
    pub fn load_texture(&mut self, device: &dyn GpuDevice, path: &Path) -> VulkanResult<TextureHandle> {
        let image = ImageData::from_file(path).map_err(|e| VulkanError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.load_from_image_data(device, &path.display().to_string(), &image)
    }

    /// Load a texture, logging and returning `TextureHandle::INVALID` on failure
    pub fn load_texture_or_invalid(&mut self, device: &dyn GpuDevice, path: &Path) -> TextureHandle {
        self.load_texture(device, path).unwrap_or_else(|e| {
            warn!("Texture {} unavailable: {}", path.display(), e);
            TextureHandle::INVALID
        })
    }

    /// Upload already decoded RGBA8 pixels
    pub fn load_from_image_data(
        &mut self,
        device: &dyn GpuDevice,
        name: &str,
        image: &ImageData,
    ) -> VulkanResult<TextureHandle> {
        image.validate().map_err(|e| VulkanError::Load {
            path: name.to_string(),
            reason: e.to_string(),
        })?;
        let handle = TextureHandle(i32::try_from(self.textures.len()).map_err(|_| {
            VulkanError::CapacityExceeded {
                capacity: i32::MAX as usize,
                requested: self.textures.len() + 1,
            }
        })?);

        let extent = vk::Extent2D {
            width: image.width,
            height: image.height,
        };
        let allocated = device.create_image(&ImageDesc {
            extent,
            format: TEXTURE_FORMAT,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            initial_layout: vk::ImageLayout::UNDEFINED,
        })?;

        let record = match self.finish_texture(device, allocated, &image.data, name) {
            Ok(record) => record,
            Err(e) => {
                device.destroy_image(allocated);
                return Err(e);
            }
        };

        debug!("Texture {} loaded as handle {} ({}x{})", name, handle.0, extent.width, extent.height);
        self.textures.push(record);
        Ok(handle)
    }

    fn finish_texture(
        &self,
        device: &dyn GpuDevice,
        image: AllocatedImage,
        pixels: &[u8],
        name: &str,
    ) -> VulkanResult<TextureRecord> {
        Self::upload_pixels(device, &image, pixels)?;

        let view = device.create_image_view(image.image, image.format)?;
        let sampler = match device.create_sampler(&self.sampler_desc) {
            Ok(sampler) => sampler,
            Err(e) => {
                device.destroy_image_view(view);
                return Err(e);
            }
        };

        Ok(TextureRecord {
            image,
            view,
            sampler,
            name: name.to_string(),
        })
    }

    /// Stage pixels and move the image to `SHADER_READ_ONLY_OPTIMAL`
    fn upload_pixels(device: &dyn GpuDevice, image: &AllocatedImage, pixels: &[u8]) -> VulkanResult<()> {
        let to_transfer = transition_barrier(
            image.image,
            image.format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let to_shader_read = transition_barrier(
            image.image,
            image.format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let staging = device.create_buffer(&BufferDesc::staging(pixels.len() as vk::DeviceSize))?;
        let result = write_data(device, &staging, pixels, false).and_then(|()| {
            device.execute_one_time(&[
                TransferCommand::ImageBarrier(to_transfer),
                TransferCommand::CopyBufferToImage {
                    src: staging.buffer,
                    image: image.image,
                    extent: image.extent,
                },
                TransferCommand::ImageBarrier(to_shader_read),
            ])
        });
        device.destroy_buffer(staging);
        result
    }

    /// 1x1 opaque white texture, created on first use
    pub fn white_fallback(&mut self, device: &dyn GpuDevice) -> VulkanResult<TextureHandle> {
        if let Some(handle) = self.white {
            return Ok(handle);
        }
        let handle = self.load_from_image_data(
            device,
            "<white>",
            &ImageData::solid_color(1, 1, [255, 255, 255, 255]),
        )?;
        self.white = Some(handle);
        Ok(handle)
    }

    /// Look up a texture record
    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureRecord> {
        handle.index().and_then(|i| self.textures.get(i))
    }

    /// Number of loaded textures, fallback included
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Source name of a texture
    pub fn texture_name(&self, handle: TextureHandle) -> Option<&str> {
        self.texture(handle).map(TextureRecord::name)
    }

    /// Image view of a texture
    pub fn image_view(&self, handle: TextureHandle) -> Option<vk::ImageView> {
        self.texture(handle).map(TextureRecord::image_view)
    }

    /// Sampler of a texture
    pub fn sampler(&self, handle: TextureHandle) -> Option<vk::Sampler> {
        self.texture(handle).map(TextureRecord::sampler)
    }

    /// Destroy every texture; previously returned handles become dangling
    pub fn destroy(&mut self, device: &dyn GpuDevice) {
        for texture in self.textures.drain(..) {
            texture.destroy(device);
        }
        self.white = None;
    }
}
