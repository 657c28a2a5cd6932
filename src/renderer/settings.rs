//! Renderer Settings
//!
//! [`RendererSettings`] is a plain struct with a [`Default`] impl; the
//! renderer reads it at the start of every frame, so edits take effect on
//! the next [`Renderer::render`](crate::renderer::Renderer::render) call.
//!
//! Settings that feed program keys (tone mapping, output color space,
//! shadow technique, clipping planes, precision, reversed depth) change
//! which program variant materials resolve to; their old programs stay
//! cached until the owning materials release them.
//!
//! # Example
//!
//! ```rust,ignore
//! let settings = RendererSettings {
//!     tone_mapping: ToneMapping::AcesFilmic,
//!     shadow_map: ShadowMapSettings { enabled: true, ..Default::default() },
//!     ..Default::default()
//! };
//! ```

use std::hash::{BuildHasher, Hash, Hasher};

use glam::Vec4;
use rustc_hash::FxBuildHasher;

use crate::resources::texture::ColorSpace;

// ============================================================================
// Tone Mapping
// ============================================================================

/// Operator applied to linear HDR color before output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
    AgX,
    Neutral,
}

impl ToneMapping {
    /// Stable index, used as a template switch.
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Linear => 1,
            Self::Reinhard => 2,
            Self::Cineon => 3,
            Self::AcesFilmic => 4,
            Self::AgX => 5,
            Self::Neutral => 6,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Linear => "linear",
            Self::Reinhard => "reinhard",
            Self::Cineon => "cineon",
            Self::AcesFilmic => "aces_filmic",
            Self::AgX => "agx",
            Self::Neutral => "neutral",
        }
    }
}

// ============================================================================
// Shadows
// ============================================================================

/// Shadow filtering technique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowMapKind {
    /// Single depth comparison.
    Basic,
    /// 3x3 percentage-closer filtering.
    #[default]
    Pcf,
    /// Wider PCF kernel scaled by the light's shadow radius.
    PcfSoft,
    /// Variance shadow maps: depth moments with a separable blur.
    Vsm,
}

impl ShadowMapKind {
    #[inline]
    #[must_use]
    pub fn index(self) -> u32 {
        match self {
            Self::Basic => 0,
            Self::Pcf => 1,
            Self::PcfSoft => 2,
            Self::Vsm => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowMapSettings {
    pub enabled: bool,
    pub kind: ShadowMapKind,
    /// Re-render shadow maps every frame.
    pub auto_update: bool,
    /// Re-render shadow maps on the next frame only; cleared after use.
    pub needs_update: bool,
}

impl Default for ShadowMapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: ShadowMapKind::default(),
            auto_update: true,
            needs_update: false,
        }
    }
}

// ============================================================================
// Frame Buffer Clearing
// ============================================================================

/// Buffers cleared at the start of each render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoClear {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl Default for AutoClear {
    fn default() -> Self {
        Self {
            color: true,
            depth: true,
            stencil: true,
        }
    }
}

// ============================================================================
// Precision & Readback
// ============================================================================

/// Requested float precision of generated programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

impl Precision {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Polling schedule of asynchronous pixel readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadbackSettings {
    /// Fence checks before the readback resolves with a timeout.
    pub max_attempts: u32,
    /// Cap of the exponential backoff between checks, in frames.
    pub max_backoff_frames: u32,
}

impl Default for ReadbackSettings {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            max_backoff_frames: 16,
        }
    }
}

// ============================================================================
// Renderer Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Linear RGBA the color buffer is cleared to.
    pub clear_color: [f64; 4],
    pub auto_clear: AutoClear,
    /// Sort render lists; disabled lists keep traversal order.
    pub sort_objects: bool,
    pub tone_mapping: ToneMapping,
    pub tone_mapping_exposure: f32,
    /// Encoding of the final color written to the screen.
    pub output_color_space: ColorSpace,
    /// Map near to 1 and far to 0 for better depth precision.
    pub reversed_depth: bool,
    pub shadow_map: ShadowMapSettings,
    /// Global clipping planes as (normal, constant) in world space.
    pub clipping_planes: Vec<Vec4>,
    /// Honor per-material clipping planes.
    pub local_clipping_enabled: bool,
    /// Size of the transmission background relative to the drawing buffer.
    pub transmission_resolution_scale: f32,
    /// Sample count of offscreen passes the renderer owns.
    pub msaa_samples: u32,
    pub precision: Precision,
    pub readback: ReadbackSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            auto_clear: AutoClear::default(),
            sort_objects: true,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            output_color_space: ColorSpace::Srgb,
            reversed_depth: false,
            shadow_map: ShadowMapSettings::default(),
            clipping_planes: Vec::new(),
            local_clipping_enabled: false,
            transmission_resolution_scale: 1.0,
            msaa_samples: 4,
            precision: Precision::High,
            readback: ReadbackSettings::default(),
        }
    }
}

impl RendererSettings {
    /// Hash of every setting that can change a derived program key.
    ///
    /// Materials re-derive their keys only when this, their own version or
    /// the lights version moved since their last draw.
    #[must_use]
    pub fn program_hash(&self) -> u64 {
        let mut h = FxBuildHasher.build_hasher();
        self.tone_mapping.hash(&mut h);
        self.output_color_space.hash(&mut h);
        self.reversed_depth.hash(&mut h);
        self.shadow_map.enabled.hash(&mut h);
        self.shadow_map.kind.hash(&mut h);
        self.clipping_planes.len().hash(&mut h);
        self.local_clipping_enabled.hash(&mut h);
        self.precision.hash(&mut h);
        h.finish()
    }

    /// Clear color as `f32`, the form device clears take.
    #[inline]
    #[must_use]
    pub fn clear_color_f32(&self) -> [f32; 4] {
        self.clear_color.map(|c| c as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_settings_do_not_move_program_hash() {
        let mut settings = RendererSettings::default();
        let hash = settings.program_hash();
        settings.tone_mapping_exposure = 2.0;
        settings.clear_color = [1.0, 0.0, 0.0, 1.0];
        assert_eq!(settings.program_hash(), hash);

        settings.tone_mapping = ToneMapping::AgX;
        assert_ne!(settings.program_hash(), hash);
    }

    #[test]
    fn clipping_plane_count_moves_program_hash() {
        let mut settings = RendererSettings::default();
        let hash = settings.program_hash();
        settings.clipping_planes.push(Vec4::new(0.0, 1.0, 0.0, 0.0));
        assert_ne!(settings.program_hash(), hash);
    }
}
