// Shader module loading
//
// SPIR-V is produced by build.rs and embedded into the binary.

use anyhow::{Context, Result};
use ash::vk;
use super::VulkanDevice;

/// Decode SPIR-V bytes and create a shader module
pub fn create_shader_module(device: &VulkanDevice, name: &str, code: &[u8]) -> Result<vk::ShaderModule> {
    if code.is_empty() {
        anyhow::bail!(
            "Shader {} is empty; install glslc (Vulkan SDK) and rebuild",
            name
        );
    }

    // read_spv checks the length and copies into u32-aligned words
    let words = ash::util::read_spv(&mut std::io::Cursor::new(code))
        .with_context(|| format!("Shader {} is not valid SPIR-V", name))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .with_context(|| format!("Failed to create shader module {}", name))
}

/// Create a shader module from SPIR-V compiled into `OUT_DIR` by build.rs
#[macro_export]
macro_rules! load_shader {
    ($device:expr, $file:literal) => {{
        let bytes: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/", $file));
        $crate::backend::shader::create_shader_module($device, $file, bytes)
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn spirv_decoding_rejects_truncated_words() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00];
        assert!(ash::util::read_spv(&mut std::io::Cursor::new(&bytes[..])).is_err());
    }

    #[test]
    fn spirv_decoding_keeps_the_magic_number() {
        let bytes = 0x0723_0203u32.to_le_bytes();
        let words = ash::util::read_spv(&mut std::io::Cursor::new(&bytes[..])).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
    }
}
