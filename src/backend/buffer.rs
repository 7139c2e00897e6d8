// Buffer utilities for vertex, index, uniform and staging buffers
//
// Memory is allocated explicitly per buffer with a manually selected
// memory type.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::commands::submit_one_time;
use super::VulkanDevice;

/// Find a memory type allowed by `type_filter` that has all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .with_context(|| format!("Failed to find suitable memory type for {:?}", properties))
}

/// Allocate and bind dedicated memory for `requirements`
pub fn allocate_memory(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        &device.memory_properties,
        requirements.memory_type_bits,
        properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.device.allocate_memory(&alloc_info, None) }
        .context("Failed to allocate device memory")
}

/// A buffer together with the memory backing it
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };
        let memory = match allocate_memory(device, requirements, memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let buffer = Self {
            buffer,
            memory,
            size,
            device: device.clone(),
        };

        unsafe { device.device.bind_buffer_memory(buffer.buffer, buffer.memory, 0) }
            .context("Failed to bind buffer memory")?;

        Ok(buffer)
    }

    /// Host-visible, coherent buffer holding a copy of `data`
    pub fn host_visible_with_data<T: bytemuck::Pod>(
        device: &Arc<VulkanDevice>,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(
            device,
            bytes.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Device-local buffer filled through a staging buffer
    pub fn device_local_with_data<T: bytemuck::Pod>(
        device: &Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let staging =
            Self::host_visible_with_data(device, vk::BufferUsageFlags::TRANSFER_SRC, data)?;

        let buffer = Self::new(
            device,
            staging.size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: staging.size,
        };
        submit_one_time(device, command_pool, |cmd| unsafe {
            device
                .device
                .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
        })?;

        Ok(buffer)
    }

    /// Copy `data` into a host-visible buffer
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            anyhow::bail!(
                "Write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            );
        }

        unsafe {
            let ptr = self
                .device
                .device
                .map_memory(
                    self.memory,
                    0,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .context("Failed to map buffer memory")? as *mut u8;

            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.device.device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            *slot = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn picks_first_type_with_all_properties() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, wanted).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
    }

    #[test]
    fn respects_type_filter_bits() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            1
        );
    }

    #[test]
    fn ignores_types_past_the_reported_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        assert!(find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
