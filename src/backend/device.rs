// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface creation
// - Physical device selection (queue families, extensions, swapchain support)
// - Logical device + graphics/present queue retrieval

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use scopeguard::ScopeGuard;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::swapchain::SwapchainSupport;

const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

/// Device features the renderer enables (anisotropic texture filtering)
const REQUIRED_DEVICE_FEATURES: vk::PhysicalDeviceFeatures = vk::PhysicalDeviceFeatures {
    sampler_anisotropy: vk::TRUE,
    ..unsafe { std::mem::zeroed() }
};

fn required_device_extensions() -> [&'static CStr; 1] {
    [ash::extensions::khr::Swapchain::name()]
}

/// Graphics and present queue family indices; they may coincide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self.graphics.into_iter().chain(self.present).collect();
        families.dedup();
        families
    }
}

/// Scan queue families for graphics capability and presentation support.
pub fn find_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut present_support: F,
) -> Result<QueueFamilyIndices>
where
    F: FnMut(u32) -> Result<bool>,
{
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && present_support(index)? {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Convert a fixed-size, nul-terminated Vulkan name into a String
pub fn vk_name(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Names from `required` that no entry of `available` provides
pub fn missing_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> Vec<String> {
    let available: Vec<String> = available.iter().map(|e| vk_name(&e.extension_name)).collect();
    missing_names(&available, required)
}

pub fn missing_layers(available: &[vk::LayerProperties], required: &[&CStr]) -> Vec<String> {
    let available: Vec<String> = available.iter().map(|l| vk_name(&l.layer_name)).collect();
    missing_names(&available, required)
}

fn missing_names(available: &[String], required: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.contains(name))
        .collect()
}

/// Everything the selection logic needs to know about one adapter
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    /// At least one surface format and one present mode
    pub swapchain_adequate: bool,
    pub sampler_anisotropy: bool,
}

impl DeviceCandidate {
    fn inspect(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let (props, features, families, extensions) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_features(physical_device),
                instance.get_physical_device_queue_family_properties(physical_device),
                instance
                    .enumerate_device_extension_properties(physical_device)
                    .context("Failed to enumerate device extensions")?,
            )
        };

        let queue_families = find_queue_families(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .context("Failed to query surface support")
        })?;

        let missing_extensions = missing_extensions(&extensions, &required_device_extensions());

        // Surface queries are only valid once the swapchain extension is known to exist
        let swapchain_adequate = if missing_extensions.is_empty() {
            SwapchainSupport::query_raw(surface_loader, physical_device, surface)?.is_adequate()
        } else {
            false
        };

        Ok(Self {
            name: vk_name(&props.device_name),
            device_type: props.device_type,
            queue_families,
            missing_extensions,
            swapchain_adequate,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        })
    }

    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_complete()
            && self.missing_extensions.is_empty()
            && self.swapchain_adequate
            && self.sampler_anisotropy
    }

    /// Preference among suitable devices (prefer discrete GPU)
    pub fn score(&self) -> u32 {
        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            _ => 1,
        }
    }
}

/// Index of the highest-scoring suitable candidate; earlier entries win ties.
pub fn pick_best(candidates: &[DeviceCandidate]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.is_suitable() {
            continue;
        }
        let score = candidate.score();
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((index, score));
        }
    }

    best.map(|(index, _)| index)
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached for buffer/sampler setup)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the instance, surface and logical device for `window`.
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers
    /// * `dump_info` - Log adapter details at info instead of debug level
    pub fn new<W>(
        app_name: &str,
        enable_validation: bool,
        dump_info: bool,
        window: &W,
    ) -> Result<Arc<Self>>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);
        let report_level = if dump_info { log::Level::Info } else { log::Level::Debug };

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        log_instance_extensions(&entry, report_level)?;

        // Each guard destroys its object if a later step fails; they unwind
        // in reverse creation order
        let instance = Self::create_instance(&entry, app_name, enable_validation, window)?;
        let instance = scopeguard::guard(instance, |instance| unsafe {
            instance.destroy_instance(None);
        });

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };
        let debug_utils = scopeguard::guard(debug_utils, |debug_utils| {
            if let Some((debug_utils, messenger)) = debug_utils {
                unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
            }
        });

        let surface_loader = Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;
        let surface = scopeguard::guard(surface, {
            let surface_loader = surface_loader.clone();
            move |surface| unsafe { surface_loader.destroy_surface(surface, None) }
        });

        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, *surface)?;
        let graphics_queue_family = queue_families
            .graphics
            .context("Selected GPU has no graphics queue family")?;
        let present_queue_family = queue_families
            .present
            .context("Selected GPU has no present queue family")?;

        let device = Self::create_logical_device(&instance, physical_device, &queue_families)?;
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_queue_family, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!("Selected GPU: {}", vk_name(&properties.device_name));
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log_device_properties(&properties, report_level);
        log_queue_families(
            &unsafe { instance.get_physical_device_queue_family_properties(physical_device) },
            report_level,
        );

        // Fully built: ownership moves to Self and its Drop
        Ok(Arc::new(Self {
            device,
            physical_device,
            surface: ScopeGuard::into_inner(surface),
            surface_loader,
            instance: ScopeGuard::into_inner(instance),
            _entry: entry,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
            debug_utils: ScopeGuard::into_inner(debug_utils),
            properties,
            memory_properties,
        }))
    }

    fn create_instance<W: HasRawDisplayHandle>(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        window: &W,
    ) -> Result<ash::Instance> {
        if enable_validation {
            let available = entry
                .enumerate_instance_layer_properties()
                .context("Failed to enumerate instance layers")?;
            let missing = missing_layers(&available, &VALIDATION_LAYERS);
            if !missing.is_empty() {
                anyhow::bail!("Validation layers requested, but not available: {:?}", missing);
            }
        }

        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Window-system extensions (VK_KHR_surface + the platform one)
        let mut extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .context("Failed to query required surface extensions")?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<*const c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
        } else {
            vec![]
        };

        // Chained so instance creation and destruction are covered too
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);
        let create_info = debug_messenger_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to set up debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("Failed to find GPUs with Vulkan support");
        }

        let candidates = devices
            .iter()
            .map(|&device| DeviceCandidate::inspect(instance, surface_loader, surface, device))
            .collect::<Result<Vec<_>>>()?;

        for candidate in &candidates {
            log::debug!(
                "GPU candidate {:?} ({:?}): suitable={} families={:?} missing_extensions={:?}",
                candidate.name,
                candidate.device_type,
                candidate.is_suitable(),
                candidate.queue_families,
                candidate.missing_extensions
            );
        }

        let best = pick_best(&candidates).context("Failed to find a suitable GPU")?;
        Ok((devices[best], candidates[best].queue_families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&REQUIRED_DEVICE_FEATURES);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }

    /// The two queue families are distinct (swapchain images must be shared)
    pub fn has_separate_present_queue(&self) -> bool {
        self.graphics_queue_family != self.present_queue_family
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::error!("Failed to wait for device idle: {:?}", e);
        }

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
    }

    vk::FALSE
}

// -----------------------------------------------------------------------------
// Diagnostics
// -----------------------------------------------------------------------------

fn log_instance_extensions(entry: &Entry, level: log::Level) -> Result<()> {
    if !log::log_enabled!(level) {
        return Ok(());
    }

    let extensions = entry
        .enumerate_instance_extension_properties(None)
        .context("Failed to enumerate instance extensions")?;

    log::log!(level, "Available instance extensions: {}", extensions.len());
    for extension in &extensions {
        log::log!(level, "  {}", vk_name(&extension.extension_name));
    }
    Ok(())
}

fn log_device_properties(properties: &vk::PhysicalDeviceProperties, level: log::Level) {
    if !log::log_enabled!(level) {
        return;
    }

    let limits = &properties.limits;
    log::log!(level, "Physical device properties:");
    log::log!(level, "  {:20}{}", "Driver Version:", properties.driver_version);
    log::log!(level, "  {:20}{:#06x}", "Vendor ID:", properties.vendor_id);
    log::log!(level, "  {:20}{:#06x}", "Device ID:", properties.device_id);
    log::log!(level, "  {:20}{:?}", "Device Type:", properties.device_type);
    log::log!(level, "  Device limits:");
    log::log!(level, "    {:32}{}", "Max Image Dimension 2D:", limits.max_image_dimension2_d);
    log::log!(level, "    {:32}{}", "Max UniformBuffer Range:", limits.max_uniform_buffer_range);
    log::log!(level, "    {:32}{}", "Max PushConstants Size:", limits.max_push_constants_size);
    log::log!(level, "    {:32}{}", "Max MemoryAllocation Count:", limits.max_memory_allocation_count);
    log::log!(level, "    {:32}{}", "Max SamplerAllocation Count:", limits.max_sampler_allocation_count);
    log::log!(level, "    {:32}{}", "Max Sampler Anisotropy:", limits.max_sampler_anisotropy);
    log::log!(level, "    {:32}{}", "Max VertexInputAttributes:", limits.max_vertex_input_attributes);
    log::log!(
        level,
        "    {:32}{}x{}",
        "Max Framebuffer Size:",
        limits.max_framebuffer_width,
        limits.max_framebuffer_height
    );
}

fn log_queue_families(families: &[vk::QueueFamilyProperties], level: log::Level) {
    log::log!(level, "Queue family count: {}", families.len());
    for (index, family) in families.iter().enumerate() {
        log::log!(
            level,
            "  [{}] Queue Count: {:2}, Queue Flags: {:?}",
            index,
            family.queue_count,
            family.queue_flags
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.as_bytes()) {
            *dst = src as c_char;
        }
        props
    }

    fn candidate() -> DeviceCandidate {
        DeviceCandidate {
            name: "Test GPU".to_string(),
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            queue_families: QueueFamilyIndices { graphics: Some(0), present: Some(0) },
            missing_extensions: vec![],
            swapchain_adequate: true,
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn queue_families_can_coincide() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices, QueueFamilyIndices { graphics: Some(0), present: Some(0) });
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn queue_families_can_be_split() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = find_queue_families(&families, |index| Ok(index == 2)).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.unique(), vec![0, 2]);
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| Ok(false)).unwrap();
        assert!(!indices.is_complete());
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| anyhow::bail!("lost surface"));
        assert!(result.is_err());
    }

    #[test]
    fn detects_missing_extensions() {
        let available = [extension("VK_KHR_swapchain"), extension("VK_KHR_maintenance1")];
        assert!(missing_extensions(&available, &[c"VK_KHR_swapchain"]).is_empty());

        let available = [extension("VK_KHR_maintenance1")];
        assert_eq!(
            missing_extensions(&available, &[c"VK_KHR_swapchain"]),
            vec!["VK_KHR_swapchain".to_string()]
        );
    }

    #[test]
    fn vk_name_stops_at_nul() {
        assert_eq!(vk_name(&extension("VK_EXT_debug_utils").extension_name), "VK_EXT_debug_utils");
    }

    #[test]
    fn complete_candidate_is_suitable() {
        assert!(candidate().is_suitable());
    }

    #[test]
    fn suitability_rejects_each_missing_requirement() {
        let mut no_present = candidate();
        no_present.queue_families.present = None;

        let mut no_graphics = candidate();
        no_graphics.queue_families.graphics = None;

        let mut no_swapchain_ext = candidate();
        no_swapchain_ext.missing_extensions = vec!["VK_KHR_swapchain".to_string()];

        let mut no_formats = candidate();
        no_formats.swapchain_adequate = false;

        let mut no_anisotropy = candidate();
        no_anisotropy.sampler_anisotropy = false;

        for rejected in [no_present, no_graphics, no_swapchain_ext, no_formats, no_anisotropy] {
            assert!(!rejected.is_suitable(), "{:?}", rejected);
        }
    }

    #[test]
    fn pick_best_prefers_discrete_and_skips_unsuitable() {
        let integrated = candidate();

        let mut broken_discrete = candidate();
        broken_discrete.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        broken_discrete.swapchain_adequate = false;

        let mut discrete = candidate();
        discrete.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;

        assert_eq!(pick_best(&[integrated.clone(), broken_discrete.clone()]), Some(0));
        assert_eq!(pick_best(&[integrated, broken_discrete, discrete]), Some(2));
    }

    // Mirrors the guard chain in VulkanDevice::new
    fn build_chain(fail_after: usize, destroyed: &RefCell<Vec<&'static str>>) -> Result<()> {
        let mut created = 0;
        let mut step = move |name: &'static str| -> Result<_> {
            if created == fail_after {
                anyhow::bail!("{} failed", name);
            }
            created += 1;
            Ok(scopeguard::guard(name, move |name| destroyed.borrow_mut().push(name)))
        };

        let instance = step("instance")?;
        let messenger = step("messenger")?;
        let surface = step("surface")?;
        let device = step("device")?;

        ScopeGuard::into_inner(device);
        ScopeGuard::into_inner(surface);
        ScopeGuard::into_inner(messenger);
        ScopeGuard::into_inner(instance);
        Ok(())
    }

    #[test]
    fn failed_device_creation_unwinds_in_reverse_order() {
        let destroyed = RefCell::new(Vec::new());
        assert!(build_chain(3, &destroyed).is_err());
        assert_eq!(*destroyed.borrow(), vec!["surface", "messenger", "instance"]);

        let destroyed = RefCell::new(Vec::new());
        assert!(build_chain(1, &destroyed).is_err());
        assert_eq!(*destroyed.borrow(), vec!["instance"]);
    }

    #[test]
    fn successful_device_creation_keeps_everything() {
        let destroyed = RefCell::new(Vec::new());
        assert!(build_chain(usize::MAX, &destroyed).is_ok());
        assert!(destroyed.borrow().is_empty());
    }

    #[test]
    fn pick_best_keeps_first_on_ties_and_none_when_empty() {
        assert_eq!(pick_best(&[candidate(), candidate()]), Some(0));
        assert_eq!(pick_best(&[]), None);

        let mut cpu = candidate();
        cpu.device_type = vk::PhysicalDeviceType::CPU;
        cpu.sampler_anisotropy = false;
        assert_eq!(pick_best(&[cpu]), None);
    }
}
