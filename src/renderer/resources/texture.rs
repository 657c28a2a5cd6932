//! Sampled texture cache.
//!
//! Textures are uploaded when their version moves. Unlike buffers they are
//! not fixed-layout: a change of size, format or sampler recreates the
//! device texture. Images larger than the device limit are box-filtered
//! down before upload, with a one-time warning per texture.

use rustc_hash::FxHashMap;

use crate::renderer::core::capabilities::Capabilities;
use crate::renderer::core::device::{GpuDevice, TextureDesc, TextureId};
use crate::resources::texture::{Texture, TextureDimension, TextureImage};
use crate::resources::version_tracker::ResourceId;
use crate::utils::warn_once;

#[derive(Debug, Clone, PartialEq)]
pub struct GpuTexture {
    pub id: TextureId,
    pub version: u64,
    pub desc: TextureDesc,
}

#[derive(Debug, Default)]
pub struct TextureCache {
    entries: FxHashMap<ResourceId, GpuTexture>,
    warnings: u32,
}

impl TextureCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, texture: ResourceId) -> Option<&GpuTexture> {
        self.entries.get(&texture)
    }

    /// Uploads `texture` when its version changed. Returns `None` for
    /// render-target textures (those are owned by the render target cache)
    /// and for images without texels.
    pub fn update<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        texture: &Texture,
        caps: &Capabilities,
    ) -> Option<TextureId> {
        let id = texture.id();
        if let Some(entry) = self.entries.get(&id)
            && entry.version == texture.version()
        {
            return Some(entry.id);
        }
        let image = texture.image()?;
        if image.width == 0 || image.height == 0 || image.data.is_empty() {
            return None;
        }

        let limit = match texture.dimension {
            TextureDimension::Cube => caps.max_cube_map_size,
            _ => caps.max_texture_size,
        };
        let scaled;
        let image = if image.width > limit || image.height > limit {
            let (width, height) = clamp_size(image.width, image.height, limit);
            if warn_once(
                "textures",
                &format!(
                    "texture {id} is {}x{}, larger than the device limit {limit}; resized to {width}x{height}",
                    image.width, image.height
                ),
            ) {
                self.warnings += 1;
            }
            scaled = box_downscale(image, width, height);
            &scaled
        } else {
            image
        };

        let mip_levels = if texture.generate_mipmaps {
            TextureDesc::mip_count(image.width, image.height)
        } else {
            1
        };
        let desc = TextureDesc {
            label: if texture.name.is_empty() {
                format!("texture {id}")
            } else {
                texture.name.clone()
            },
            width: image.width,
            height: image.height,
            layers: image.layers.max(1),
            mip_levels,
            format: texture.device_format(),
            dimension: texture.dimension,
            sampler: texture.sampler,
            render_attachment: false,
            samples: 1,
        };

        let device_id = match self.entries.get(&id) {
            Some(entry) if entry.desc == desc => entry.id,
            Some(entry) => {
                device.destroy_texture(entry.id);
                device.create_texture(&desc)
            }
            None => device.create_texture(&desc),
        };

        let layers = desc.layers as usize;
        let layer_bytes = image.data.len() / layers;
        for (layer, chunk) in image.data.chunks(layer_bytes.max(1)).take(layers).enumerate() {
            device.write_texture(device_id, layer as u32, 0, chunk);
        }
        if mip_levels > 1 {
            device.generate_mipmaps(device_id);
        }
        log::debug!("Texture {id}: uploaded {}x{} ({mip_levels} mips)", desc.width, desc.height);

        self.entries.insert(
            id,
            GpuTexture {
                id: device_id,
                version: texture.version(),
                desc,
            },
        );
        Some(device_id)
    }

    pub fn remove<D: GpuDevice + ?Sized>(&mut self, device: &mut D, texture: ResourceId) -> Option<TextureId> {
        let entry = self.entries.remove(&texture)?;
        device.destroy_texture(entry.id);
        Some(entry.id)
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

    /// Resource warnings raised since the last call.
    pub fn take_warnings(&mut self) -> u32 {
        std::mem::take(&mut self.warnings)
    }
}

/// Target size that fits within `limit`, preserving aspect. Power-of-two
/// inputs stay power-of-two.
#[must_use]
pub fn clamp_size(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let scale = limit as f32 / width.max(height) as f32;
    let fit = |v: u32| -> u32 {
        let scaled = ((v as f32 * scale).floor() as u32).clamp(1, limit);
        if v.is_power_of_two() {
            1 << (31 - scaled.leading_zeros())
        } else {
            scaled
        }
    };
    (fit(width), fit(height))
}

/// Averages blocks of texels into a `width` x `height` image. Works on any
/// format with whole-byte channels by averaging byte-wise per texel.
#[must_use]
pub fn box_downscale(image: &TextureImage, width: u32, height: u32) -> TextureImage {
    let layers = image.layers.max(1) as usize;
    let (sw, sh) = (image.width as usize, image.height as usize);
    let (dw, dh) = (width as usize, height as usize);
    let texel = image.data.len() / (sw * sh * layers).max(1);
    let mut data = vec![0u8; dw * dh * texel * layers];
    let mut acc = vec![0u32; texel];

    for layer in 0..layers {
        let src = &image.data[layer * sw * sh * texel..(layer + 1) * sw * sh * texel];
        let dst = &mut data[layer * dw * dh * texel..(layer + 1) * dw * dh * texel];
        for y in 0..dh {
            let (y0, y1) = (y * sh / dh, ((y + 1) * sh / dh).max(y * sh / dh + 1));
            for x in 0..dw {
                let (x0, x1) = (x * sw / dw, ((x + 1) * sw / dw).max(x * sw / dw + 1));
                acc.iter_mut().for_each(|a| *a = 0);
                for sy in y0..y1 {
                    for sx in x0..x1 {
                        let base = (sy * sw + sx) * texel;
                        for (a, &b) in acc.iter_mut().zip(&src[base..base + texel]) {
                            *a += u32::from(b);
                        }
                    }
                }
                let count = ((y1 - y0) * (x1 - x0)) as u32;
                let base = (y * dw + x) * texel;
                for (d, a) in dst[base..base + texel].iter_mut().zip(&acc) {
                    *d = (a / count) as u8;
                }
            }
        }
    }

    TextureImage {
        width,
        height,
        layers: image.layers,
        data,
    }
}
