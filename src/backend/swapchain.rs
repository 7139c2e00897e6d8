// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The negotiation helpers are plain functions so they can be tested
// without a GPU.

use anyhow::{Context, Result};
use ash::extensions::khr::Surface;
use ash::vk;
use std::sync::Arc;

use super::image::create_image_view;
use super::VulkanDevice;

/// What the surface supports on a given physical device
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(device: &VulkanDevice) -> Result<Self> {
        Self::query_raw(&device.surface_loader, device.physical_device, device.surface)
    }

    pub fn query_raw(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .context("Failed to query present modes")?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    fn log(&self, level: log::Level) {
        let caps = &self.capabilities;
        log::log!(level, "Swapchain support:");
        log::log!(level, "  {:28}{}..{}", "Image Count:", caps.min_image_count, caps.max_image_count);
        log::log!(
            level,
            "  {:28}{}x{}",
            "Current Extent:",
            caps.current_extent.width,
            caps.current_extent.height
        );
        log::log!(
            level,
            "  {:28}{}x{} .. {}x{}",
            "Image Extent Range:",
            caps.min_image_extent.width,
            caps.min_image_extent.height,
            caps.max_image_extent.width,
            caps.max_image_extent.height
        );
        log::log!(level, "  {:28}{:?}", "Current Transform:", caps.current_transform);
        log::log!(level, "  {:28}{:?}", "Composite Alpha:", caps.supported_composite_alpha);
        log::log!(level, "  {:28}{:?}", "Usage Flags:", caps.supported_usage_flags);
        for format in &self.formats {
            log::log!(level, "  Format: {:?} / {:?}", format.format, format.color_space);
        }
        for mode in &self.present_modes {
            log::log!(level, "  Present Mode: {:?}", mode);
        }
    }
}

/// Prefer sRGB BGRA, otherwise take whatever the surface lists first.
///
/// Returns `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use `preferred` when available, then MAILBOX, then FIFO.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    [preferred, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is the one mode every surface must support
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports the `u32::MAX` sentinel,
/// in which case the framebuffer size is clamped into the supported range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: framebuffer.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: framebuffer.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped when the surface has a maximum (0 = none)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        image_count
    }
}

/// Outcome of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    Ready { index: u32, suboptimal: bool },
    /// The surface changed under us; the swapchain must be rebuilt
    OutOfDate,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        framebuffer: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        dump_info: bool,
    ) -> Result<Self> {
        // Queried fresh: capabilities change with the window
        let support = SwapchainSupport::query(&device)?;
        support.log(if dump_info { log::Level::Info } else { log::Level::Debug });

        let surface_format =
            choose_surface_format(&support.formats).context("No suitable surface format")?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, framebuffer);
        let image_count = choose_image_count(&support.capabilities);

        log::info!(
            "Creating swapchain: {}x{}, {:?}, {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let swapchain_loader = ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let queue_family_indices = [device.graphics_queue_family, device.present_queue_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = if device.has_separate_present_queue() {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| create_image_view(&device, image, surface_format.format))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format.format,
            extent,
            device,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<AcquiredImage> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Present rendered image to screen.
    ///
    /// Returns `true` when the swapchain is stale (suboptimal or out of date).
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: current,
            min_image_extent: extent(100, 50),
            max_image_extent: extent(1920, 1080),
            ..Default::default()
        }
    }

    #[test]
    fn prefers_srgb_bgra_format() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            preferred,
        ];
        assert_eq!(choose_surface_format(&formats), Some(preferred));
    }

    #[test]
    fn falls_back_to_first_listed_format() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn chosen_format_is_always_a_member() {
        let candidates = [
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::R8G8B8A8_SRGB,
            vk::Format::A2B10G10R10_UNORM_PACK32,
        ];
        let spaces = [vk::ColorSpaceKHR::SRGB_NONLINEAR, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT];

        for len in 1..=candidates.len() {
            for space in spaces {
                let formats: Vec<_> = candidates[..len].iter().map(|&f| format(f, space)).collect();
                let chosen = choose_surface_format(&formats).unwrap();
                assert!(formats.contains(&chosen));
            }
        }
    }

    #[test]
    fn prefers_requested_present_mode() {
        let available = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::FIFO_RELAXED];
        let chosen = choose_present_mode(&available, vk::PresentModeKHR::MAILBOX);
        assert_eq!(chosen, vk::PresentModeKHR::FIFO);
        assert!(available.contains(&chosen));
    }

    #[test]
    fn present_mode_prefers_mailbox_over_fifo_when_preferred_is_missing() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::FIFO_RELAXED),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn current_extent_is_returned_verbatim() {
        // Even outside the min/max range: the surface has the final word
        let caps = capabilities(extent(4000, 10));
        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(4000, 10));
    }

    #[test]
    fn sentinel_extent_clamps_framebuffer_size() {
        let caps = capabilities(extent(u32::MAX, u32::MAX));

        assert_eq!(choose_extent(&caps, extent(800, 600)), extent(800, 600));
        assert_eq!(choose_extent(&caps, extent(10, 10)), extent(100, 50));
        assert_eq!(choose_extent(&caps, extent(5000, 5000)), extent(1920, 1080));
        assert_eq!(choose_extent(&caps, extent(0, 700)), extent(100, 700));
    }

    #[test]
    fn clamped_extent_stays_in_range_for_many_inputs() {
        let caps = capabilities(extent(u32::MAX, u32::MAX));
        for width in (0..4000).step_by(97) {
            for height in (0..3000).step_by(89) {
                let chosen = choose_extent(&caps, extent(width, height));
                assert!((100..=1920).contains(&chosen.width));
                assert!((50..=1080).contains(&chosen.height));
            }
        }
    }

    #[test]
    fn image_count_is_min_plus_one_capped_by_max() {
        let mut caps = capabilities(extent(800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn adequacy_needs_formats_and_modes() {
        let mut support = SwapchainSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR));
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());
    }
}
