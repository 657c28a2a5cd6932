//! Per-frame light aggregate.
//!
//! [`LightsState::setup`] folds the lights collected during list building
//! into packed uniform arrays in world space. Colors are premultiplied by
//! intensity. Within each light type, shadow casters come first, so the
//! i-th shadow map of a type belongs to the i-th light of that type.
//!
//! [`LightsHash`] holds the per-type counts that shape programs; `version`
//! moves only when the hash changes, so moving or recoloring lights never
//! triggers key derivation.

use glam::{Vec3, Vec4};

use crate::scene::light::LightKind;
use crate::scene::{NodeHandle, Scene};
use crate::utils::warn_once;

/// Upper bound of lights of one type evaluated by a program.
pub const MAX_LIGHTS_PER_KIND: usize = 16;

/// Light counts that change generated programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LightsHash {
    pub directional: u8,
    pub point: u8,
    pub spot: u8,
    pub hemisphere: u8,
    pub directional_shadows: u8,
    pub point_shadows: u8,
    pub spot_shadows: u8,
}

impl LightsHash {
    #[must_use]
    pub fn shadow_count(&self) -> usize {
        usize::from(self.directional_shadows)
            + usize::from(self.point_shadows)
            + usize::from(self.spot_shadows)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Type of light a shadow map is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowLightKind {
    Directional,
    Spot,
    Point,
}

/// A shadow-casting light, in the order its maps are bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCaster {
    pub node: NodeHandle,
    pub kind: ShadowLightKind,
    /// Index among shadow maps of the same kind.
    pub slot: usize,
    pub position: Vec3,
    /// Light target for directional and spot lights.
    pub target: Vec3,
}

/// Packed light uniforms, rebuilt every frame.
#[derive(Debug, Default)]
pub struct LightsState {
    pub ambient: Vec3,
    /// Two texels per light: `[direction, 0]`, `[color, 0]`.
    pub directional: Vec<Vec4>,
    /// Two texels per light: `[position, distance]`, `[color, decay]`.
    pub point: Vec<Vec4>,
    /// Four texels per light: `[position, distance]`, `[direction, decay]`,
    /// `[color, cone_cos]`, `[penumbra_cos, 0, 0, 0]`.
    pub spot: Vec<Vec4>,
    /// Three texels per light: `[up, 0]`, `[sky, 0]`, `[ground, 0]`.
    pub hemisphere: Vec<Vec4>,
    pub shadow_casters: Vec<ShadowCaster>,
    hash: LightsHash,
    version: u64,
    scratch: Vec<Collected>,
}

#[derive(Debug, Clone, Copy)]
struct Collected {
    node: NodeHandle,
    shadow: bool,
}

impl LightsState {
    pub const DIRECTIONAL_STRIDE: usize = 2;
    pub const POINT_STRIDE: usize = 2;
    pub const SPOT_STRIDE: usize = 4;
    pub const HEMISPHERE_STRIDE: usize = 3;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> LightsHash {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rebuilds the aggregate from the lights visible this frame.
    pub fn setup(&mut self, scene: &Scene, lights: &[NodeHandle], shadows_enabled: bool) {
        self.ambient = Vec3::ZERO;
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.hemisphere.clear();
        self.shadow_casters.clear();

        let mut hash = LightsHash::default();
        let mut scratch = std::mem::take(&mut self.scratch);

        for pass in [Pass::Directional, Pass::Point, Pass::Spot, Pass::Hemisphere] {
            scratch.clear();
            for &node in lights {
                let Some(light) = scene.get(node).and_then(|n| n.as_light()) else {
                    continue;
                };
                if pass == Pass::Directional && matches!(light.kind, LightKind::Ambient) {
                    self.ambient += light.color * light.intensity;
                }
                if pass.matches(&light.kind) {
                    scratch.push(Collected {
                        node,
                        shadow: shadows_enabled && light.casts_shadow(),
                    });
                }
            }
            // Shadow casters first; sort is stable so scene order holds within each half.
            scratch.sort_by_key(|c| !c.shadow);
            if scratch.len() > MAX_LIGHTS_PER_KIND {
                warn_once(
                    "lights",
                    &format!(
                        "{} {} lights in view, only {MAX_LIGHTS_PER_KIND} are evaluated",
                        scratch.len(),
                        pass.name()
                    ),
                );
                scratch.truncate(MAX_LIGHTS_PER_KIND);
            }

            for collected in &scratch {
                let Some(node) = scene.get(collected.node) else {
                    continue;
                };
                let Some(light) = node.as_light() else {
                    continue;
                };
                let position: Vec3 = node.world_matrix().translation.into();
                let color = light.color * light.intensity;
                match light.kind {
                    LightKind::Directional { target } => {
                        let direction = direction_or_up(position - target);
                        self.directional.push(direction.extend(0.0));
                        self.directional.push(color.extend(0.0));
                        if collected.shadow {
                            self.shadow_casters.push(ShadowCaster {
                                node: collected.node,
                                kind: ShadowLightKind::Directional,
                                slot: usize::from(hash.directional_shadows),
                                position,
                                target,
                            });
                            hash.directional_shadows += 1;
                        }
                        hash.directional += 1;
                    }
                    LightKind::Point { distance, decay } => {
                        self.point.push(position.extend(distance));
                        self.point.push(color.extend(decay));
                        if collected.shadow {
                            self.shadow_casters.push(ShadowCaster {
                                node: collected.node,
                                kind: ShadowLightKind::Point,
                                slot: usize::from(hash.point_shadows),
                                position,
                                target: position,
                            });
                            hash.point_shadows += 1;
                        }
                        hash.point += 1;
                    }
                    LightKind::Spot {
                        distance,
                        decay,
                        angle,
                        penumbra,
                        target,
                    } => {
                        let direction = direction_or_up(position - target);
                        let cone_cos = angle.cos();
                        let penumbra_cos = (angle * (1.0 - penumbra.clamp(0.0, 1.0))).cos();
                        self.spot.push(position.extend(distance));
                        self.spot.push(direction.extend(decay));
                        self.spot.push(color.extend(cone_cos));
                        self.spot.push(Vec4::new(penumbra_cos, 0.0, 0.0, 0.0));
                        if collected.shadow {
                            self.shadow_casters.push(ShadowCaster {
                                node: collected.node,
                                kind: ShadowLightKind::Spot,
                                slot: usize::from(hash.spot_shadows),
                                position,
                                target,
                            });
                            hash.spot_shadows += 1;
                        }
                        hash.spot += 1;
                    }
                    LightKind::Hemisphere { ground_color } => {
                        self.hemisphere.push(direction_or_up(position).extend(0.0));
                        self.hemisphere.push(color.extend(0.0));
                        self.hemisphere
                            .push((ground_color * light.intensity).extend(0.0));
                        hash.hemisphere += 1;
                    }
                    LightKind::Ambient => {}
                }
            }
        }
        self.scratch = scratch;

        if hash != self.hash {
            log::debug!("Lights layout changed: {hash:?}");
            self.hash = hash;
            self.version += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Directional,
    Point,
    Spot,
    Hemisphere,
}

impl Pass {
    fn matches(self, kind: &LightKind) -> bool {
        matches!(
            (self, kind),
            (Self::Directional, LightKind::Directional { .. })
                | (Self::Point, LightKind::Point { .. })
                | (Self::Spot, LightKind::Spot { .. })
                | (Self::Hemisphere, LightKind::Hemisphere { .. })
        )
    }

    fn name(self) -> &'static str {
        match self {
            Self::Directional => "directional",
            Self::Point => "point",
            Self::Spot => "spot",
            Self::Hemisphere => "hemisphere",
        }
    }
}

fn direction_or_up(v: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(Vec3::Y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::light::{Light, ShadowConfig};
    use crate::scene::node::Node;
    use crate::scene::transform::Transform;

    fn scene_with(lights: Vec<Light>) -> (Scene, Vec<NodeHandle>) {
        let mut scene = Scene::new();
        let handles = lights
            .into_iter()
            .map(|l| {
                scene.add(Node::light(l).with_transform(Transform::from_position(Vec3::new(0.0, 5.0, 0.0))))
            })
            .collect();
        scene.update_world_matrices();
        (scene, handles)
    }

    #[test]
    fn moving_a_light_keeps_version() {
        let (mut scene, handles) = scene_with(vec![Light::point(Vec3::ONE, 1.0, 0.0)]);
        let mut state = LightsState::new();
        state.setup(&scene, &handles, false);
        let version = state.version();
        assert_eq!(state.hash().point, 1);

        if let Some(node) = scene.get_mut(handles[0]) {
            node.transform.position = Vec3::new(3.0, 0.0, 0.0);
            node.transform.mark_dirty();
        }
        scene.update_world_matrices();
        state.setup(&scene, &handles, false);
        assert_eq!(state.version(), version);
        assert_eq!(state.point[0].truncate(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn shadow_casters_sort_first() {
        let plain = Light::directional(Vec3::ONE, 1.0);
        let shadowed = Light::directional(Vec3::new(1.0, 0.0, 0.0), 2.0).with_shadow(ShadowConfig::default());
        let (scene, handles) = scene_with(vec![plain, shadowed]);
        let mut state = LightsState::new();
        state.setup(&scene, &handles, true);
        assert_eq!(state.hash().directional, 2);
        assert_eq!(state.hash().directional_shadows, 1);
        assert_eq!(state.shadow_casters[0].node, handles[1]);
        // Color premultiplied by intensity.
        assert_eq!(state.directional[1].truncate(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn shadows_disabled_counts_no_shadow_maps() {
        let shadowed = Light::spot(Vec3::ONE, 1.0, 0.0, 0.5, 0.1).with_shadow(ShadowConfig::default());
        let (scene, handles) = scene_with(vec![shadowed]);
        let mut state = LightsState::new();
        state.setup(&scene, &handles, false);
        assert_eq!(state.hash().spot, 1);
        assert_eq!(state.hash().shadow_count(), 0);
        assert!(state.shadow_casters.is_empty());
    }

    #[test]
    fn ambient_lights_accumulate() {
        let (scene, handles) = scene_with(vec![
            Light::ambient(Vec3::ONE, 0.25),
            Light::ambient(Vec3::ONE, 0.5),
        ]);
        let mut state = LightsState::new();
        state.setup(&scene, &handles, false);
        assert_eq!(state.ambient, Vec3::splat(0.75));
        assert!(state.hash().is_empty());
    }
}
