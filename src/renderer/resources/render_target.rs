//! Framebuffer cache for render targets.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::ConfigurationError;
use crate::renderer::core::capabilities::Capabilities;
use crate::renderer::core::device::{Framebuffer, FramebufferDesc, GpuDevice, TextureDesc, TextureId};
use crate::resources::render_target::RenderTarget;
use crate::resources::version_tracker::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRenderTarget {
    pub framebuffer: Framebuffer,
    pub version: u64,
    pub width: u32,
    pub height: u32,
    /// Effective sample count after clamping to the device.
    pub samples: u32,
    pub generate_mipmaps: bool,
}

impl GpuRenderTarget {
    /// Sampleable color texture of attachment `index`.
    #[must_use]
    pub fn color_texture(&self, index: usize) -> Option<TextureId> {
        self.framebuffer.color_textures.get(index).copied()
    }
}

#[derive(Debug, Default)]
pub struct RenderTargetCache {
    entries: FxHashMap<ResourceId, GpuRenderTarget>,
}

impl RenderTargetCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, target: ResourceId) -> Option<&GpuRenderTarget> {
        self.entries.get(&target)
    }

    /// Creates the framebuffer of `target` on first use and recreates it
    /// when the target changed (resize, format or sample count).
    pub fn update<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        target: &RenderTarget,
        caps: &Capabilities,
    ) -> Result<&GpuRenderTarget, ConfigurationError> {
        let id = target.id();
        let stale = self
            .entries
            .get(&id)
            .is_none_or(|entry| entry.version != target.version());
        if stale {
            let (width, height) = target.size();
            if target.color_formats.is_empty() && target.depth.format().is_none() {
                return Err(ConfigurationError::InvalidRenderTarget(format!(
                    "render target {id} has no attachments"
                )));
            }
            for &format in &target.color_formats {
                target.sampler.validate_for(format)?;
            }
            if target.color_formats.len() > caps.max_color_attachments as usize {
                return Err(ConfigurationError::InvalidRenderTarget(format!(
                    "render target {id} has {} color attachments, the device supports {}",
                    target.color_formats.len(),
                    caps.max_color_attachments
                )));
            }
            if width > caps.max_texture_size || height > caps.max_texture_size {
                return Err(ConfigurationError::InvalidRenderTarget(format!(
                    "render target {id} is {width}x{height}, larger than the device limit {}",
                    caps.max_texture_size
                )));
            }

            if let Some(old) = self.entries.remove(&id) {
                device.destroy_framebuffer(old.framebuffer.id);
            }
            let samples = caps.clamp_samples(target.samples);
            let mip_levels = if target.generate_mipmaps {
                TextureDesc::mip_count(width, height)
            } else {
                1
            };
            let desc = FramebufferDesc {
                label: if target.name.is_empty() {
                    format!("render target {id}")
                } else {
                    target.name.clone()
                },
                width,
                height,
                samples,
                color_formats: target.color_formats.iter().copied().collect::<SmallVec<_>>(),
                depth_format: target.depth.format(),
                mip_levels,
                sampler: target.sampler,
            };
            let framebuffer = device.create_framebuffer(&desc);
            log::debug!("Render target {id}: created {width}x{height} x{samples}");
            self.entries.insert(
                id,
                GpuRenderTarget {
                    framebuffer,
                    version: target.version(),
                    width,
                    height,
                    samples,
                    generate_mipmaps: target.generate_mipmaps,
                },
            );
        }
        self.entries
            .get(&id)
            .ok_or_else(|| ConfigurationError::InvalidRenderTarget(format!("render target {id}")))
    }

    /// Resolves multisampled attachments and regenerates mipmaps when the
    /// target asks for them.
    pub fn resolve<D: GpuDevice + ?Sized>(&self, device: &mut D, target: ResourceId) -> bool {
        let Some(entry) = self.entries.get(&target) else {
            return false;
        };
        if entry.samples > 1 {
            device.resolve_framebuffer(entry.framebuffer.id);
        }
        if entry.generate_mipmaps {
            for &texture in &entry.framebuffer.color_textures {
                device.generate_mipmaps(texture);
            }
        }
        true
    }

    pub fn remove<D: GpuDevice + ?Sized>(&mut self, device: &mut D, target: ResourceId) -> bool {
        match self.entries.remove(&target) {
            Some(entry) => {
                device.destroy_framebuffer(entry.framebuffer.id);
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
