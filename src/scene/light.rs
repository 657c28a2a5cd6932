use glam::Vec3;

use crate::errors::ConfigurationError;
use crate::resources::ResourceId;

/// Shadow parameters of a shadow-casting light.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    /// PCF-soft kernel radius, VSM blur radius.
    pub radius: f32,
    /// Blur taps per direction for variance shadow maps.
    pub blur_samples: u32,
    /// Map size in texels. Point lights render six faces into a 4x2 atlas
    /// of `map_size` cells, `(4 * w, 2 * h)` texels in total.
    pub map_size: (u32, u32),
    pub near: f32,
    pub far: f32,
    /// Half extent of the orthographic shadow volume of directional lights.
    pub ortho_extent: f32,
    /// Shadow darkness in [0, 1].
    pub intensity: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.0,
            normal_bias: 0.0,
            radius: 1.0,
            blur_samples: 8,
            map_size: (512, 512),
            near: 0.5,
            far: 500.0,
            ortho_extent: 5.0,
            intensity: 1.0,
        }
    }
}

impl ShadowConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.map_size.0 == 0 || self.map_size.1 == 0 {
            return Err(ConfigurationError::InvalidShadowConfiguration(format!(
                "shadow map size must be non-zero (got {}x{})",
                self.map_size.0, self.map_size.1
            )));
        }
        if self.near.is_nan() || self.near <= 0.0 || self.far <= self.near {
            return Err(ConfigurationError::InvalidShadowConfiguration(format!(
                "shadow camera range {}..{} is empty",
                self.near, self.far
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Ambient,
    Hemisphere {
        ground_color: Vec3,
    },
    /// Shines from the light position towards `target` (world space).
    Directional {
        target: Vec3,
    },
    Point {
        /// Cutoff distance; 0 means unlimited.
        distance: f32,
        decay: f32,
    },
    Spot {
        distance: f32,
        decay: f32,
        /// Cone half angle in radians.
        angle: f32,
        /// Fraction of the cone attenuated by the penumbra, in [0, 1].
        penumbra: f32,
        target: Vec3,
    },
}

/// Cloning yields a light with its own id and shadow map.
#[derive(Debug, PartialEq)]
pub struct Light {
    id: ResourceId,
    pub color: Vec3,
    pub intensity: f32,
    pub kind: LightKind,
    pub cast_shadow: bool,
    pub shadow: ShadowConfig,
}

impl Clone for Light {
    fn clone(&self) -> Self {
        Self {
            id: ResourceId::next(),
            color: self.color,
            intensity: self.intensity,
            kind: self.kind.clone(),
            cast_shadow: self.cast_shadow,
            shadow: self.shadow.clone(),
        }
    }
}

impl Light {
    #[must_use]
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            id: ResourceId::next(),
            color,
            intensity,
            kind,
            cast_shadow: false,
            shadow: ShadowConfig::default(),
        }
    }

    #[must_use]
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Ambient, color, intensity)
    }

    #[must_use]
    pub fn hemisphere(sky: Vec3, ground: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Hemisphere { ground_color: ground }, sky, intensity)
    }

    #[must_use]
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Directional { target: Vec3::ZERO }, color, intensity)
    }

    #[must_use]
    pub fn point(color: Vec3, intensity: f32, distance: f32) -> Self {
        Self::new(
            LightKind::Point {
                distance,
                decay: 2.0,
            },
            color,
            intensity,
        )
    }

    #[must_use]
    pub fn spot(color: Vec3, intensity: f32, distance: f32, angle: f32, penumbra: f32) -> Self {
        Self::new(
            LightKind::Spot {
                distance,
                decay: 2.0,
                angle,
                penumbra,
                target: Vec3::ZERO,
            },
            color,
            intensity,
        )
    }

    #[must_use]
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.cast_shadow = true;
        self.shadow = shadow;
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Whether this light renders a shadow map.
    #[must_use]
    pub fn casts_shadow(&self) -> bool {
        self.cast_shadow
            && matches!(
                self.kind,
                LightKind::Directional { .. } | LightKind::Point { .. } | LightKind::Spot { .. }
            )
    }

    #[must_use]
    pub fn is_point(&self) -> bool {
        matches!(self.kind, LightKind::Point { .. })
    }
}
