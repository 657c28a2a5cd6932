//! Textures and their sampling parameters.

use super::version_tracker::{ChangeTracker, MutGuard, ResourceId};
use crate::assets::RenderTargetHandle;
use crate::errors::ConfigurationError;

/// Color space the texel data is encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    #[default]
    Linear,
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    Cube,
    D2Array,
}

/// Sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub wrap_u: wgpu::AddressMode,
    pub wrap_v: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::MipmapFilterMode,
    pub anisotropy: u16,
    pub compare: Option<wgpu::CompareFunction>,
}

impl SamplerDesc {
    /// Compare samplers only read depth formats.
    pub fn validate_for(&self, format: wgpu::TextureFormat) -> Result<(), ConfigurationError> {
        match self.compare {
            Some(compare) if !format.is_depth_stencil_format() => {
                Err(ConfigurationError::InvalidShadowConfiguration(format!(
                    "compare sampler ({compare:?}) on non-depth format {format:?}"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            wrap_u: wgpu::AddressMode::ClampToEdge,
            wrap_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            anisotropy: 1,
            compare: None,
        }
    }
}

impl SamplerDesc {
    /// Nearest filtering, no mipmaps. Used for data textures.
    #[must_use]
    pub fn nearest() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn repeat() -> Self {
        Self {
            wrap_u: wgpu::AddressMode::Repeat,
            wrap_v: wgpu::AddressMode::Repeat,
            ..Self::default()
        }
    }
}

/// CPU texel data, all layers (6 for cube maps) stored back to back.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub data: Vec<u8>,
}

/// Where a texture's texels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    /// Uploaded from CPU memory.
    Image(TextureImage),
    /// The resolved color attachment of a render target.
    RenderTarget {
        target: RenderTargetHandle,
        attachment: usize,
    },
}

#[derive(Debug)]
pub struct Texture {
    id: ResourceId,
    pub name: String,
    source: TextureSource,
    pub format: wgpu::TextureFormat,
    pub dimension: TextureDimension,
    pub sampler: SamplerDesc,
    pub generate_mipmaps: bool,
    pub color_space: ColorSpace,
    tracker: ChangeTracker,
}

impl Clone for Texture {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            name: self.name.clone(),
            source: self.source.clone(),
            format: self.format,
            dimension: self.dimension,
            sampler: self.sampler,
            generate_mipmaps: self.generate_mipmaps,
            color_space: self.color_space,
            tracker: ChangeTracker::new(),
        }
    }
}

impl Texture {
    /// 2D RGBA8 texture from tightly packed texel data.
    #[must_use]
    pub fn new_2d(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::from_source(TextureSource::Image(TextureImage {
            width,
            height,
            layers: 1,
            data,
        }))
    }

    /// Single-color 2D texture.
    #[must_use]
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new_2d(1, 1, rgba.to_vec())
    }

    /// Cube texture from six faces of `size` x `size` RGBA8 texels in
    /// +X, -X, +Y, -Y, +Z, -Z order.
    #[must_use]
    pub fn new_cube(size: u32, data: Vec<u8>) -> Self {
        let mut texture = Self::from_source(TextureSource::Image(TextureImage {
            width: size,
            height: size,
            layers: 6,
            data,
        }));
        texture.dimension = TextureDimension::Cube;
        texture
    }

    /// Texture sampling the color attachment of a render target.
    #[must_use]
    pub fn from_render_target(target: RenderTargetHandle, attachment: usize) -> Self {
        let mut texture = Self::from_source(TextureSource::RenderTarget { target, attachment });
        texture.generate_mipmaps = false;
        texture
    }

    fn from_source(source: TextureSource) -> Self {
        Self {
            id: ResourceId::next(),
            name: String::new(),
            source,
            format: wgpu::TextureFormat::Rgba8Unorm,
            dimension: TextureDimension::D2,
            sampler: SamplerDesc::default(),
            generate_mipmaps: true,
            color_space: ColorSpace::Linear,
            tracker: ChangeTracker::new(),
        }
    }

    #[must_use]
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: SamplerDesc) -> Self {
        self.sampler = sampler;
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
    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    #[must_use]
    pub fn image(&self) -> Option<&TextureImage> {
        match &self.source {
            TextureSource::Image(image) => Some(image),
            TextureSource::RenderTarget { .. } => None,
        }
    }

    /// Mutable access to the texel data; the texture is re-uploaded on the
    /// next frame it is used.
    pub fn image_mut(&mut self) -> Option<MutGuard<'_, TextureImage>> {
        match &mut self.source {
            TextureSource::Image(image) => Some(MutGuard::new(image, &mut self.tracker)),
            TextureSource::RenderTarget { .. } => None,
        }
    }

    /// Flags sampler or format changes for the next upload.
    pub fn needs_update(&mut self) {
        self.tracker.changed();
    }

    /// Format the device texture is created with, after color space.
    #[must_use]
    pub fn device_format(&self) -> wgpu::TextureFormat {
        match (self.format, self.color_space) {
            (wgpu::TextureFormat::Rgba8Unorm, ColorSpace::Srgb) => {
                wgpu::TextureFormat::Rgba8UnormSrgb
            }
            (format, _) => format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_sampler_needs_a_depth_format() {
        let sampler = SamplerDesc {
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..SamplerDesc::default()
        };
        assert!(sampler.validate_for(wgpu::TextureFormat::Depth32Float).is_ok());
        assert!(matches!(
            sampler.validate_for(wgpu::TextureFormat::Rgba8Unorm),
            Err(ConfigurationError::InvalidShadowConfiguration(_))
        ));
        assert!(SamplerDesc::default().validate_for(wgpu::TextureFormat::Rgba8Unorm).is_ok());
    }

    #[test]
    fn clone_is_a_separate_resource() {
        let texture = Texture::solid([1, 2, 3, 255]);
        assert_ne!(texture.clone().id(), texture.id());
    }
}
