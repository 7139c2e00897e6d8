// Images: views, sampled textures and layout transitions

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::{allocate_memory, Buffer};
use super::commands::submit_one_time;
use super::VulkanDevice;

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

pub fn create_image_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(COLOR_RANGE);

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

/// Access masks and pipeline stages for a supported layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => anyhow::bail!("Unsupported layout transition: {:?} -> {:?}", old, new),
    }
}

fn transition_image_layout(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    image: vk::Image,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let transition = layout_transition(old, new)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(COLOR_RANGE)
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access)
        .build();

    submit_one_time(device, command_pool, |cmd| unsafe {
        device.device.cmd_pipeline_barrier(
            cmd,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

fn copy_buffer_to_image(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    };

    submit_one_time(device, command_pool, |cmd| unsafe {
        device.device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    })
}

/// A sampled 2D texture: image, memory, view and sampler
pub struct Texture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    device: Arc<VulkanDevice>,
}

impl Texture {
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Upload tightly packed RGBA8 pixels into a device-local texture
    pub fn from_rgba(
        device: &Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            anyhow::bail!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            );
        }

        let staging =
            Buffer::host_visible_with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, pixels)?;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(Self::FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create texture image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let memory =
            match allocate_memory(device, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(memory) => memory,
                Err(e) => {
                    unsafe { device.device.destroy_image(image, None) };
                    return Err(e);
                }
            };

        // From here on Drop releases whatever has been created
        let mut texture = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            device: device.clone(),
        };

        unsafe { device.device.bind_image_memory(image, memory, 0) }
            .context("Failed to bind texture image memory")?;

        transition_image_layout(
            device,
            command_pool,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        copy_buffer_to_image(device, command_pool, staging.buffer, image, width, height)?;
        transition_image_layout(
            device,
            command_pool,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        texture.view = create_image_view(device, image, Self::FORMAT)?;
        texture.sampler = create_sampler(device)?;

        log::debug!("Uploaded {}x{} texture", width, height);
        Ok(texture)
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

fn create_sampler(device: &VulkanDevice) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(device.properties.limits.max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.device.create_sampler(&sampler_info, None) }
        .context("Failed to create texture sampler")
}

/// RGBA8 checkerboard of `size`x`size` pixels with `cells` squares per side
pub fn checkerboard(size: u32, cells: u32) -> Vec<u8> {
    const LIGHT: [u8; 4] = [235, 235, 235, 255];
    const DARK: [u8; 4] = [40, 40, 48, 255];

    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);

    for y in 0..size {
        for x in 0..size {
            let texel = if (x / cell + y / cell) % 2 == 0 { LIGHT } else { DARK };
            pixels.extend_from_slice(&texel);
        }
    }

    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(pixels: &[u8], size: u32, x: u32, y: u32) -> &[u8] {
        let offset = ((y * size + x) * 4) as usize;
        &pixels[offset..offset + 4]
    }

    #[test]
    fn checkerboard_has_rgba_size_and_alternates() {
        let pixels = checkerboard(8, 2);
        assert_eq!(pixels.len(), 8 * 8 * 4);

        assert_eq!(texel(&pixels, 8, 0, 0), texel(&pixels, 8, 3, 3));
        assert_ne!(texel(&pixels, 8, 0, 0), texel(&pixels, 8, 4, 0));
        assert_ne!(texel(&pixels, 8, 0, 0), texel(&pixels, 8, 0, 4));
        assert_eq!(texel(&pixels, 8, 0, 0), texel(&pixels, 8, 4, 4));
    }

    #[test]
    fn checkerboard_is_opaque_and_tolerates_zero_cells() {
        let pixels = checkerboard(4, 0);
        assert!(pixels.chunks(4).all(|t| t[3] == 255));
    }

    #[test]
    fn upload_transitions_are_supported() {
        let to_transfer =
            layout_transition(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .unwrap();
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let to_shader = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        assert!(layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_err());
    }
}
