//! Device capability probe.
//!
//! Queried once when a device is (re)initialised and read-only afterwards.
//! Everything the renderer clamps against (texture sizes, unit counts,
//! sample counts, vertex inputs) comes from here.

/// Limits and optional features of the active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub max_texture_size: u32,
    pub max_cube_map_size: u32,
    pub max_array_layers: u32,
    /// Texture units one program may sample simultaneously.
    pub max_texture_units: u32,
    /// Vertex input locations one program may declare.
    pub max_vertex_attributes: u32,
    /// Distinct vertex buffers one draw may bind.
    pub max_vertex_buffers: u32,
    pub max_color_attachments: u32,
    pub max_samples: u32,
    pub max_uniform_block_size: u32,
    pub float_render_targets: bool,
    pub half_float_render_targets: bool,
    pub float_filtering: bool,
}

impl Default for Capabilities {
    /// Baseline guaranteed by every WebGPU implementation.
    fn default() -> Self {
        Self::from_limits(&wgpu::Limits::default(), wgpu::Features::empty())
    }
}

impl Capabilities {
    #[must_use]
    pub fn from_limits(limits: &wgpu::Limits, features: wgpu::Features) -> Self {
        Self {
            max_texture_size: limits.max_texture_dimension_2d,
            max_cube_map_size: limits.max_texture_dimension_2d,
            max_array_layers: limits.max_texture_array_layers,
            max_texture_units: limits
                .max_sampled_textures_per_shader_stage
                .min(limits.max_samplers_per_shader_stage),
            max_vertex_attributes: limits.max_vertex_attributes,
            max_vertex_buffers: limits.max_vertex_buffers,
            max_color_attachments: limits.max_color_attachments,
            max_samples: 4,
            max_uniform_block_size: limits.max_uniform_buffer_binding_size as u32,
            float_render_targets: true,
            half_float_render_targets: true,
            float_filtering: features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        }
    }

    /// Largest supported sample count not above `requested`.
    #[must_use]
    pub fn clamp_samples(&self, requested: u32) -> u32 {
        let mut samples = 1;
        for candidate in [2, 4, 8, 16] {
            if candidate <= requested && candidate <= self.max_samples {
                samples = candidate;
            }
        }
        samples
    }

    pub(crate) fn log_summary(&self) {
        log::info!(
            "Device capabilities: max_texture_size={} texture_units={} vertex_attributes={} vertex_buffers={} max_samples={} float_targets={}",
            self.max_texture_size,
            self.max_texture_units,
            self.max_vertex_attributes,
            self.max_vertex_buffers,
            self.max_samples,
            self.float_render_targets,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_snaps_to_supported_power_of_two() {
        let caps = Capabilities {
            max_samples: 4,
            ..Capabilities::default()
        };
        assert_eq!(caps.clamp_samples(0), 1);
        assert_eq!(caps.clamp_samples(1), 1);
        assert_eq!(caps.clamp_samples(3), 2);
        assert_eq!(caps.clamp_samples(8), 4);
    }
}
