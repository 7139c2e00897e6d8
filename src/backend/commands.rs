// Command pools, one-shot transfer submissions and draw recording

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

pub fn create_command_pool(device: &VulkanDevice) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(device.graphics_queue_family)
        .flags(vk::CommandPoolCreateFlags::empty());

    unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")
}

pub fn allocate_command_buffers(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")
}

/// Record commands with `record`, submit them on the graphics queue and
/// block until they have executed.
pub fn submit_one_time<F>(device: &VulkanDevice, command_pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = allocate_command_buffers(device, command_pool, 1)?[0];
    let command_buffers = [cmd];

    let result = (|| -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin one-time command buffer")?;

            record(cmd);

            device
                .device
                .end_command_buffer(cmd)
                .context("Failed to end one-time command buffer")?;

            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit one-time commands")?;
            device
                .device
                .queue_wait_idle(device.graphics_queue)
                .context("Failed to wait for graphics queue")?;
        }
        Ok(())
    })();

    unsafe { device.device.free_command_buffers(command_pool, &command_buffers) };
    result
}

/// Everything one pre-recorded draw needs
pub struct DrawCommand {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_set: vk::DescriptorSet,
}

/// Record the quad draw into `cmd`; the buffer is replayed every frame
pub fn record_draw(device: &ash::Device, cmd: vk::CommandBuffer, draw: &DrawCommand) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder();

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: draw.clear_color,
        },
    }];

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(draw.render_pass)
        .framebuffer(draw.framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: draw.extent,
        })
        .clear_values(&clear_values);

    unsafe {
        device
            .begin_command_buffer(cmd, &begin_info)
            .context("Failed to begin recording command buffer")?;

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
        device.cmd_bind_vertex_buffers(cmd, 0, &[draw.vertex_buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, draw.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            draw.pipeline_layout,
            0,
            &[draw.descriptor_set],
            &[],
        );
        device.cmd_draw_indexed(cmd, draw.index_count, 1, 0, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .context("Failed to record command buffer")?;
    }

    Ok(())
}
