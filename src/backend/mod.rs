// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Objects that own Vulkan handles hold an
// Arc<VulkanDevice> so the device always outlives them.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
