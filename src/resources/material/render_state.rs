//! Fixed-function state a material requests from the device.

use wgpu::{BlendComponent, BlendFactor, BlendOperation, BlendState, CompareFunction};

/// Which faces are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Explicit blend equation for [`Blending::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomBlending {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub equation: BlendOperation,
    /// Alpha channel overrides; `None` reuses the color values.
    pub src_alpha: Option<BlendFactor>,
    pub dst_alpha: Option<BlendFactor>,
    pub equation_alpha: Option<BlendOperation>,
}

impl Default for CustomBlending {
    fn default() -> Self {
        Self {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            equation: BlendOperation::Add,
            src_alpha: None,
            dst_alpha: None,
            equation_alpha: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    None,
    #[default]
    Normal,
    Additive,
    Subtractive,
    Multiply,
    Custom(CustomBlending),
}

const fn component(src: BlendFactor, dst: BlendFactor) -> BlendComponent {
    BlendComponent {
        src_factor: src,
        dst_factor: dst,
        operation: BlendOperation::Add,
    }
}

/// Resolves a blending mode to the device blend state.
///
/// `None` disables blending. Premultiplied alpha switches the preset
/// equations to their premultiplied forms.
#[must_use]
pub fn resolve_blend_state(blending: Blending, premultiplied_alpha: bool) -> Option<BlendState> {
    use BlendFactor::{One, OneMinusSrc, OneMinusSrcAlpha, Src, SrcAlpha, Zero};
    let (color, alpha) = match (blending, premultiplied_alpha) {
        (Blending::None, _) => return None,
        (Blending::Normal, false) => (component(SrcAlpha, OneMinusSrcAlpha), component(One, OneMinusSrcAlpha)),
        (Blending::Normal, true) => (component(One, OneMinusSrcAlpha), component(One, OneMinusSrcAlpha)),
        (Blending::Additive, false) => (component(SrcAlpha, One), component(One, One)),
        (Blending::Additive, true) => (component(One, One), component(One, One)),
        (Blending::Subtractive, false) => (component(Zero, OneMinusSrc), component(Zero, One)),
        (Blending::Subtractive, true) => (component(Zero, OneMinusSrc), component(Zero, OneMinusSrcAlpha)),
        (Blending::Multiply, _) => (component(Zero, Src), component(Zero, SrcAlpha)),
        (Blending::Custom(custom), _) => {
            let color = BlendComponent {
                src_factor: custom.src,
                dst_factor: custom.dst,
                operation: custom.equation,
            };
            let alpha = BlendComponent {
                src_factor: custom.src_alpha.unwrap_or(custom.src),
                dst_factor: custom.dst_alpha.unwrap_or(custom.dst),
                operation: custom.equation_alpha.unwrap_or(custom.equation),
            };
            (color, alpha)
        }
    };
    Some(BlendState { color, alpha })
}

/// Stencil configuration of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilSettings {
    pub enabled: bool,
    pub write_mask: u32,
    pub func: CompareFunction,
    pub reference: u32,
    pub func_mask: u32,
    pub fail: wgpu::StencilOperation,
    pub depth_fail: wgpu::StencilOperation,
    pub pass: wgpu::StencilOperation,
}

impl Default for StencilSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            write_mask: 0xff,
            func: CompareFunction::Always,
            reference: 0,
            func_mask: 0xff,
            fail: wgpu::StencilOperation::Keep,
            depth_fail: wgpu::StencilOperation::Keep,
            pass: wgpu::StencilOperation::Keep,
        }
    }
}

/// Constant and slope-scaled depth bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    pub factor: f32,
    pub units: f32,
}

impl Eq for PolygonOffset {}

impl std::hash::Hash for PolygonOffset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.factor.to_bits().hash(state);
        self.units.to_bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_blending() {
        assert_eq!(resolve_blend_state(Blending::None, false), None);
    }

    #[test]
    fn premultiplied_normal_uses_one_source_factor() {
        let state = resolve_blend_state(Blending::Normal, true).unwrap();
        assert_eq!(state.color.src_factor, BlendFactor::One);
        assert_eq!(state.color.dst_factor, BlendFactor::OneMinusSrcAlpha);
        let straight = resolve_blend_state(Blending::Normal, false).unwrap();
        assert_eq!(straight.color.src_factor, BlendFactor::SrcAlpha);
    }

    #[test]
    fn custom_alpha_falls_back_to_color_factors() {
        let custom = CustomBlending {
            src: BlendFactor::One,
            dst: BlendFactor::One,
            equation: BlendOperation::Max,
            ..CustomBlending::default()
        };
        let state = resolve_blend_state(Blending::Custom(custom), false).unwrap();
        assert_eq!(state.alpha.operation, BlendOperation::Max);
        assert_eq!(state.alpha.src_factor, BlendFactor::One);
    }
}
