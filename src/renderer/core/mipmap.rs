//! Mip chain generation for the wgpu backend.
//!
//! Every level is a 2x2 box reduction of its parent, matching the CPU
//! downscale used for oversized uploads. Cube and array textures are
//! reduced one layer at a time.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

/// One parent/child step of a mip chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MipStep {
    layer: u32,
    parent: u32,
}

impl MipStep {
    fn chain(layers: u32, levels: u32) -> impl Iterator<Item = MipStep> {
        (0..layers).flat_map(move |layer| (0..levels.saturating_sub(1)).map(move |parent| MipStep { layer, parent }))
    }

    fn view(self, texture: &wgpu::Texture, level: u32, usage: wgpu::TextureUsages) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: self.layer,
            array_layer_count: Some(1),
            usage: Some(usage),
            ..Default::default()
        })
    }
}

pub(crate) struct MipmapGenerator {
    shader: wgpu::ShaderModule,
    parent_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// Reduction pipelines by target format, created on first use.
    reducers: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapGenerator {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kiln mip reduce"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("blit.wgsl"))),
        });
        let parent_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kiln mip parent"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kiln mip reduce"),
            bind_group_layouts: &[Some(&parent_layout)],
            immediate_size: 0,
        });
        Self {
            shader,
            parent_layout,
            pipeline_layout,
            reducers: FxHashMap::default(),
        }
    }

    fn reducer(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let (shader, layout) = (&self.shader, &self.pipeline_layout);
        self.reducers.entry(format).or_insert_with(|| {
            log::debug!("Mipmaps: reduction pipeline for {format:?}");
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("kiln mip reduce"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(format.into())],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    /// Records the reductions for every level below 0 of `texture`.
    pub(crate) fn generate(&mut self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        let levels = texture.mip_level_count();
        if levels < 2 {
            return;
        }
        let reducer = self.reducer(device, texture.format()).clone();

        for step in MipStep::chain(texture.depth_or_array_layers(), levels) {
            let parent = step.view(texture, step.parent, wgpu::TextureUsages::TEXTURE_BINDING);
            let child = step.view(texture, step.parent + 1, wgpu::TextureUsages::RENDER_ATTACHMENT);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &self.parent_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&parent),
                }],
            });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln mip reduce"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &child,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&reducer);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_visits_every_parent_of_every_layer() {
        let steps: Vec<(u32, u32)> = MipStep::chain(2, 3).map(|s| (s.layer, s.parent)).collect();
        assert_eq!(steps, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn single_level_has_no_steps() {
        assert_eq!(MipStep::chain(6, 1).count(), 0);
    }
}
