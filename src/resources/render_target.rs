//! Offscreen render targets.

use super::texture::SamplerDesc;
use super::version_tracker::{ChangeTracker, ResourceId};

/// Depth/stencil attachment of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthBuffer {
    None,
    #[default]
    Depth24,
    Depth24Stencil8,
    Depth32Float,
}

impl DepthBuffer {
    #[must_use]
    pub fn format(self) -> Option<wgpu::TextureFormat> {
        match self {
            Self::None => None,
            Self::Depth24 => Some(wgpu::TextureFormat::Depth24Plus),
            Self::Depth24Stencil8 => Some(wgpu::TextureFormat::Depth24PlusStencil8),
            Self::Depth32Float => Some(wgpu::TextureFormat::Depth32Float),
        }
    }
}

#[derive(Debug)]
pub struct RenderTarget {
    id: ResourceId,
    pub name: String,
    width: u32,
    height: u32,
    /// MSAA sample count; 1 disables multisampling.
    pub samples: u32,
    /// One format per color attachment (more than one for MRT).
    pub color_formats: Vec<wgpu::TextureFormat>,
    pub depth: DepthBuffer,
    /// Regenerate the mip chain of the resolved color texture after each
    /// render into this target.
    pub generate_mipmaps: bool,
    /// Sampling of the color attachments when read as textures.
    pub sampler: SamplerDesc,
    tracker: ChangeTracker,
}

impl Clone for RenderTarget {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            samples: self.samples,
            color_formats: self.color_formats.clone(),
            depth: self.depth,
            generate_mipmaps: self.generate_mipmaps,
            sampler: self.sampler,
            tracker: ChangeTracker::new(),
        }
    }
}

impl RenderTarget {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: ResourceId::next(),
            name: String::new(),
            width: width.max(1),
            height: height.max(1),
            samples: 1,
            color_formats: vec![wgpu::TextureFormat::Rgba8Unorm],
            depth: DepthBuffer::default(),
            generate_mipmaps: false,
            sampler: SamplerDesc::default(),
            tracker: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.color_formats = vec![format];
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.sampler = sampler;
        self
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples.max(1);
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: DepthBuffer) -> Self {
        self.depth = depth;
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.tracker.version()
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resizes the target; its device attachments are recreated on next use.
    pub fn set_size(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.tracker.changed();
        }
    }

    /// Flags format or attachment changes.
    pub fn needs_update(&mut self) {
        self.tracker.changed();
    }

    #[must_use]
    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }
}
