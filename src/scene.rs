// Quad geometry and the per-frame transform uniform

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::mem::{offset_of, size_of};

/// Vertex layout matching the inputs of quad.vert
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex_coord) as u32,
            },
        ]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { pos: [-0.5, -0.5], color: [1.0, 0.0, 0.0], tex_coord: [1.0, 0.0] },
    Vertex { pos: [0.5, -0.5], color: [0.0, 1.0, 0.0], tex_coord: [0.0, 0.0] },
    Vertex { pos: [0.5, 0.5], color: [0.0, 0.0, 1.0], tex_coord: [0.0, 1.0] },
    Vertex { pos: [-0.5, 0.5], color: [1.0, 1.0, 1.0], tex_coord: [1.0, 1.0] },
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Model, view and projection matrices, rewritten every frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    const DEGREES_PER_SECOND: f32 = 90.0;

    /// Transforms for `elapsed_secs` after start, projected onto `extent`
    pub fn at(elapsed_secs: f32, extent: vk::Extent2D) -> Self {
        let model = Mat4::from_rotation_z((elapsed_secs * Self::DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);

        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 7 * 4);
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 28);

        let offsets: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 20]);
        let locations: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }

    #[test]
    fn indices_reference_existing_vertices() {
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert_eq!(QUAD_INDICES.len() % 3, 0);
    }

    #[test]
    fn uniform_is_three_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 3 * 64);
    }

    #[test]
    fn model_rotates_ninety_degrees_per_second() {
        let ubo = UniformBufferObject::at(1.0, extent(800, 600));
        let rotated = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((rotated.x).abs() < 1e-5);
        assert!((rotated.y - 1.0).abs() < 1e-5);

        let start = UniformBufferObject::at(0.0, extent(800, 600));
        assert_eq!(start.model, Mat4::IDENTITY);
    }

    #[test]
    fn projection_flips_y_and_uses_aspect() {
        let ubo = UniformBufferObject::at(0.0, extent(800, 400));
        assert!(ubo.proj.y_axis.y < 0.0);
        let ratio = ubo.proj.y_axis.y.abs() / ubo.proj.x_axis.x;
        assert!((ratio - 2.0).abs() < 1e-4);
    }

    #[test]
    fn zero_height_does_not_produce_nan() {
        let ubo = UniformBufferObject::at(0.5, extent(800, 0));
        assert!(!ubo.proj.is_nan());
    }

    #[test]
    fn camera_looks_at_origin() {
        let ubo = UniformBufferObject::at(0.0, extent(1, 1));
        let origin = ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!(origin.x.abs() < 1e-5);
        assert!(origin.y.abs() < 1e-5);
        assert!((origin.z + 12f32.sqrt()).abs() < 1e-4);
    }
}
