// Renderer: owns every GPU resource and drives the frame loop
//
// Resources come in two lifetimes. Long-lived ones (command pool, descriptor
// layout, texture, geometry, sync objects) live as long as the renderer.
// Everything sized to or baked against the swapchain lives in a
// SwapchainBundle and is rebuilt as a unit on recreation.

use anyhow::{Context, Result};
use ash::vk;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Instant;

use crate::backend::buffer::Buffer;
use crate::backend::commands::{self, DrawCommand};
use crate::backend::descriptor;
use crate::backend::image::{self, Texture};
use crate::backend::pipeline;
use crate::backend::swapchain::AcquiredImage;
use crate::backend::sync::{FrameSync, FrameTracker};
use crate::backend::{Swapchain, VulkanDevice};
use crate::scene::{UniformBufferObject, QUAD_INDICES, QUAD_VERTICES};

const TEXTURE_SIZE: u32 = 256;
const TEXTURE_CELLS: u32 = 8;

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub clear_color: [f32; 4],
    pub present_mode: vk::PresentModeKHR,
    pub frames_in_flight: usize,
    pub dump_info: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The swapchain no longer matches the surface and must be recreated
    Stale,
}

/// Shared, swapchain-independent inputs to a bundle
struct BundleInputs<'a> {
    command_pool: vk::CommandPool,
    set_layout: vk::DescriptorSetLayout,
    texture: &'a Texture,
    vertex_buffer: &'a Buffer,
    index_buffer: &'a Buffer,
}

/// Everything that depends on the swapchain's format, extent or image count
struct SwapchainBundle {
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    framebuffers: Vec<vk::Framebuffer>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    // Dropped after the handles above, in this order
    uniform_buffers: Vec<Buffer>,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
}

impl SwapchainBundle {
    fn new(
        device: &Arc<VulkanDevice>,
        settings: &RendererSettings,
        inputs: &BundleInputs,
        framebuffer_extent: vk::Extent2D,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(
            device.clone(),
            framebuffer_extent,
            settings.present_mode,
            settings.dump_info,
        )?;
        let image_count = swapchain.image_count();

        // Handles start null so Drop can clean up a partially built bundle
        let mut bundle = Self {
            render_pass: vk::RenderPass::null(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            framebuffers: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            command_pool: inputs.command_pool,
            command_buffers: Vec::new(),
            uniform_buffers: Vec::with_capacity(image_count),
            swapchain,
            device: device.clone(),
        };

        let extent = bundle.swapchain.extent;

        bundle.render_pass = pipeline::create_render_pass(device, bundle.swapchain.format)?;
        let (graphics_pipeline, pipeline_layout) =
            pipeline::create_graphics_pipeline(device, bundle.render_pass, extent, inputs.set_layout)?;
        bundle.pipeline = graphics_pipeline;
        bundle.pipeline_layout = pipeline_layout;

        bundle.framebuffers = pipeline::create_framebuffers(
            device,
            &bundle.swapchain.image_views,
            bundle.render_pass,
            extent,
        )?;

        for _ in 0..image_count {
            bundle.uniform_buffers.push(Buffer::new(
                device,
                size_of::<UniformBufferObject>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?);
        }

        bundle.descriptor_pool = descriptor::create_descriptor_pool(device, image_count as u32)?;
        bundle.descriptor_sets = descriptor::allocate_descriptor_sets(
            device,
            bundle.descriptor_pool,
            inputs.set_layout,
            &bundle.uniform_buffers,
            inputs.texture,
        )?;

        bundle.command_buffers =
            commands::allocate_command_buffers(device, inputs.command_pool, image_count as u32)?;

        for (i, &cmd) in bundle.command_buffers.iter().enumerate() {
            let draw = DrawCommand {
                render_pass: bundle.render_pass,
                framebuffer: bundle.framebuffers[i],
                extent,
                clear_color: settings.clear_color,
                pipeline: bundle.pipeline,
                pipeline_layout: bundle.pipeline_layout,
                vertex_buffer: inputs.vertex_buffer.buffer,
                index_buffer: inputs.index_buffer.buffer,
                index_count: QUAD_INDICES.len() as u32,
                descriptor_set: bundle.descriptor_sets[i],
            };
            commands::record_draw(&device.device, cmd, &draw)?;
        }

        log::info!("Recorded {} command buffers", bundle.command_buffers.len());
        Ok(bundle)
    }
}

impl Drop for SwapchainBundle {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
            // Sets are freed with their pool
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub struct Renderer {
    settings: RendererSettings,
    bundle: Option<SwapchainBundle>,
    frame_sync: Vec<FrameSync>,
    tracker: FrameTracker,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    texture: Texture,
    set_layout: vk::DescriptorSetLayout,
    command_pool: vk::CommandPool,
    start: Instant,
    wait_stages: [vk::PipelineStageFlags; 1],
    device: Arc<VulkanDevice>,
}

impl Renderer {
    pub fn new(
        device: Arc<VulkanDevice>,
        settings: RendererSettings,
        framebuffer_extent: vk::Extent2D,
    ) -> Result<Self> {
        let command_pool = commands::create_command_pool(&device)?;

        // Guard pool and layout until the renderer owns them
        let set_layout = match pipeline::create_descriptor_set_layout(&device) {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.device.destroy_command_pool(command_pool, None) };
                return Err(e);
            }
        };

        match Self::with_pool(device.clone(), settings, framebuffer_extent, command_pool, set_layout) {
            Ok(renderer) => Ok(renderer),
            Err(e) => {
                unsafe {
                    device.device.destroy_descriptor_set_layout(set_layout, None);
                    device.device.destroy_command_pool(command_pool, None);
                }
                Err(e)
            }
        }
    }

    fn with_pool(
        device: Arc<VulkanDevice>,
        settings: RendererSettings,
        framebuffer_extent: vk::Extent2D,
        command_pool: vk::CommandPool,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let pixels = image::checkerboard(TEXTURE_SIZE, TEXTURE_CELLS);
        let texture = Texture::from_rgba(&device, command_pool, TEXTURE_SIZE, TEXTURE_SIZE, &pixels)?;

        let vertex_buffer = Buffer::device_local_with_data(
            &device,
            command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &QUAD_VERTICES,
        )?;
        let index_buffer = Buffer::device_local_with_data(
            &device,
            command_pool,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &QUAD_INDICES,
        )?;

        let mut frame_sync = Vec::with_capacity(settings.frames_in_flight);
        for _ in 0..settings.frames_in_flight.max(1) {
            match FrameSync::new(&device) {
                Ok(sync) => frame_sync.push(sync),
                Err(e) => {
                    for sync in &frame_sync {
                        sync.destroy(&device.device);
                    }
                    return Err(e);
                }
            }
        }

        let inputs = BundleInputs {
            command_pool,
            set_layout,
            texture: &texture,
            vertex_buffer: &vertex_buffer,
            index_buffer: &index_buffer,
        };
        let bundle = match SwapchainBundle::new(&device, &settings, &inputs, framebuffer_extent) {
            Ok(bundle) => bundle,
            Err(e) => {
                for sync in &frame_sync {
                    sync.destroy(&device.device);
                }
                return Err(e);
            }
        };

        let tracker = FrameTracker::new(frame_sync.len(), bundle.swapchain.image_count());
        log::info!(
            "Renderer ready: {} frames in flight, {} swapchain images",
            tracker.frames_in_flight(),
            tracker.image_count()
        );

        Ok(Self {
            settings,
            bundle: Some(bundle),
            frame_sync,
            tracker,
            vertex_buffer,
            index_buffer,
            texture,
            set_layout,
            command_pool,
            start: Instant::now(),
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            device,
        })
    }

    /// Render and present one frame.
    ///
    /// Returns `Stale` when the swapchain must be recreated before the next
    /// frame; the frame slot only advances when something was submitted.
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        let device = &self.device;
        let bundle = self.bundle.as_ref().context("Swapchain not initialized")?;
        let sync = &self.frame_sync[self.tracker.current()];

        unsafe {
            device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .context("Failed to wait for in-flight fence")?;
        }

        // Bail before resetting the fence, otherwise the next wait on this
        // slot would never return
        let (image_index, suboptimal) =
            match bundle.swapchain.acquire_next_image(u64::MAX, sync.image_available)? {
                AcquiredImage::Ready { index, suboptimal } => (index, suboptimal),
                AcquiredImage::OutOfDate => return Ok(FrameStatus::Stale),
            };

        if let Some(previous) = self.tracker.claim_image(image_index as usize, sync.in_flight_fence) {
            unsafe {
                device
                    .device
                    .wait_for_fences(&[previous], true, u64::MAX)
                    .context("Failed to wait for image fence")?;
            }
        }

        unsafe {
            device
                .device
                .reset_fences(&[sync.in_flight_fence])
                .context("Failed to reset in-flight fence")?;
        }

        let elapsed = self.start.elapsed().as_secs_f32();
        let ubo = UniformBufferObject::at(elapsed, bundle.swapchain.extent);
        bundle.uniform_buffers[image_index as usize].write(&[ubo])?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [bundle.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], sync.in_flight_fence)
                .context("Failed to submit draw command buffer")?;
        }

        let stale = bundle
            .swapchain
            .present(device.present_queue, image_index, &signal_semaphores)?;

        self.tracker.advance();

        if stale || suboptimal {
            Ok(FrameStatus::Stale)
        } else {
            Ok(FrameStatus::Presented)
        }
    }

    /// Rebuild every swapchain-dependent object for `framebuffer_extent`
    pub fn recreate(&mut self, framebuffer_extent: vk::Extent2D) -> Result<()> {
        log::info!(
            "Recreating swapchain for {}x{}",
            framebuffer_extent.width,
            framebuffer_extent.height
        );

        self.device.wait_idle()?;
        self.bundle = None;

        let inputs = BundleInputs {
            command_pool: self.command_pool,
            set_layout: self.set_layout,
            texture: &self.texture,
            vertex_buffer: &self.vertex_buffer,
            index_buffer: &self.index_buffer,
        };
        let bundle = SwapchainBundle::new(&self.device, &self.settings, &inputs, framebuffer_extent)?;

        // Device is idle, so no image is owned by a pending submission
        self.tracker.reset_images(bundle.swapchain.image_count());
        self.bundle = Some(bundle);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Releasing renderer resources");

        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {:?}", e);
        }

        for sync in &self.frame_sync {
            sync.destroy(&self.device.device);
        }

        // Command buffers go back to the pool before the pool goes
        self.bundle = None;

        unsafe {
            self.device.device.destroy_descriptor_set_layout(self.set_layout, None);
            self.device.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
