// Descriptor pool and per-image descriptor sets
//
// Binding 0: uniform buffer (vertex stage)
// Binding 1: combined image sampler (fragment stage)

use anyhow::{Context, Result};
use ash::vk;

use super::buffer::Buffer;
use super::image::Texture;
use super::VulkanDevice;

pub fn create_descriptor_pool(device: &VulkanDevice, count: u32) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: count,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: count,
        },
    ];

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&pool_sizes)
        .max_sets(count);

    unsafe { device.device.create_descriptor_pool(&pool_info, None) }
        .context("Failed to create descriptor pool")
}

/// One set per uniform buffer, each also pointing at the shared texture
pub fn allocate_descriptor_sets(
    device: &VulkanDevice,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform_buffers: &[Buffer],
    texture: &Texture,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; uniform_buffers.len()];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
        .context("Failed to allocate descriptor sets")?;

    let image_info = [vk::DescriptorImageInfo {
        sampler: texture.sampler,
        image_view: texture.view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];

    for (&set, uniform) in sets.iter().zip(uniform_buffers) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: uniform.buffer,
            offset: 0,
            range: uniform.size,
        }];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
        ];

        unsafe { device.device.update_descriptor_sets(&writes, &[]) };
    }

    Ok(sets)
}
